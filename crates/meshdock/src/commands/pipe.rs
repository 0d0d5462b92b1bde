//! Pipe subcommand: stdin/stdout bridged through a raw channel.
//!
//! Uses the host-network dialer, so the target must be reachable from this
//! machine directly.

use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use meshdock_api::HostDialer;
use meshdock_core::{ByteChannel, ChannelMessage, ChannelOptions, CloseReason, RawChannel};

use crate::cli::{GlobalOpts, PipeArgs};
use crate::commands::util;
use crate::error::CliError;

const STDIN_CHUNK: usize = 64 * 1024;

pub async fn handle(args: PipeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let channels = cfg.channels.to_channel_config()?;
    let options = ChannelOptions {
        read_buffer_size: args
            .proto
            .map_or(channels.default_read_buffer, |p| channels.read_buffer_for(p)),
        connect_timeout: args
            .timeout
            .map(Duration::from_secs)
            .or(channels.connect_timeout),
        write_buffer_size: None,
    };

    let (out_tx, out_rx) = mpsc::unbounded_channel::<Bytes>();
    let stdout_task = tokio::spawn(copy_to_stdout(out_rx));

    let dialer = HostDialer::default();
    let channel = RawChannel::open_with_receiver(
        &dialer,
        args.host.clone(),
        args.port,
        options,
        Some(Box::new(move |chunk| {
            let _ = out_tx.send(chunk);
        })),
    )
    .await?;
    info!(remote = channel.remote_addr(), "pipe open");

    let (close_tx, close_rx) = oneshot::channel();
    channel.on_close(Box::new(move |reason| {
        let _ = close_tx.send(reason);
    }));

    let reason = pump(&channel, close_rx, args.close_on_eof).await;
    channel.close().await;
    drop(channel);

    // The receive handler (and with it the sender) is gone once the channel
    // has closed, so this finishes after the last chunk is written.
    if let Ok(Err(e)) = stdout_task.await {
        debug!(error = %e, "stdout closed early");
    }

    debug!(?reason, "pipe finished");
    match reason {
        CloseReason::ReadError(reason) | CloseReason::WriteError(reason) => {
            Err(CliError::ChannelClosed { reason })
        }
        CloseReason::Local | CloseReason::RemoteClosed => Ok(()),
    }
}

/// Forward stdin into the channel until it closes.
async fn pump<C: ByteChannel>(
    channel: &C,
    mut closed: oneshot::Receiver<CloseReason>,
    close_on_eof: bool,
) -> CloseReason {
    let mut stdin = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            reason = &mut closed => return reason.unwrap_or(CloseReason::Local),

            chunk = stdin.recv(), if stdin_open => match chunk {
                Some(chunk) => channel.send(ChannelMessage::Binary(chunk)),
                None => {
                    debug!(close_on_eof, "stdin reached end of input");
                    stdin_open = false;
                    if close_on_eof {
                        channel.close().await;
                    }
                }
            },

            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                channel.close().await;
            }
        }
    }
}

/// Read stdin on a plain thread; a blocking read there never holds up
/// process exit.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Bytes> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = vec![0u8; STDIN_CHUNK];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

async fn copy_to_stdout(mut rx: mpsc::UnboundedReceiver<Bytes>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = rx.recv().await {
        stdout.write_all(&chunk).await?;
        stdout.flush().await?;
    }
    Ok(())
}
