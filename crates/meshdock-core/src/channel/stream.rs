// ── Async byte-stream view of a raw channel ──
//
// Protocol stacks that want a socket (TLS handshakes, RDP connectors) drive
// the channel through `AsyncRead`/`AsyncWrite` instead of push events.
// Inbound chunks queue behind the reader; a read error surfaces once as an
// `io::Error`, then the stream reads as EOF.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use meshdock_api::{TcpDialer, TcpSession};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::StreamReader;
use tracing::trace;

use super::{
    ByteChannel, ChannelMessage, ChannelOptions, CloseHandler, CloseReason, RawChannel,
    ReceiveHandler,
};

type Reader = StreamReader<UnboundedReceiverStream<io::Result<Bytes>>, Bytes>;

/// Receiving half handed out before the channel exists, so nothing the
/// server sends first is lost.
pub(crate) struct Inbound {
    reader: Reader,
    on_close: CloseHandler,
}

pub(crate) fn inbound() -> (ReceiveHandler, Inbound) {
    let (tx, rx) = mpsc::unbounded_channel::<io::Result<Bytes>>();
    let errors = tx.clone();

    let receiver: ReceiveHandler = Box::new(move |chunk| {
        let _ = tx.send(Ok(chunk));
    });
    let on_close: CloseHandler = Box::new(move |reason| {
        let (kind, message) = match reason {
            CloseReason::ReadError(e) => (io::ErrorKind::ConnectionReset, e),
            CloseReason::WriteError(e) => (io::ErrorKind::BrokenPipe, e),
            CloseReason::Local | CloseReason::RemoteClosed => return,
        };
        let _ = errors.send(Err(io::Error::new(kind, message)));
    });

    let reader = StreamReader::new(UnboundedReceiverStream::new(rx));
    (receiver, Inbound { reader, on_close })
}

/// A [`RawChannel`] as a `tokio::io` duplex stream.
///
/// Owns the channel's receive and close handlers. Writes are queued on the
/// channel's writer, so `poll_flush` has nothing to wait for; `poll_shutdown`
/// drains the queue and closes the session. Dropping the stream closes the
/// channel too.
pub struct ChannelStream<S: TcpSession> {
    channel: Arc<RawChannel<S>>,
    reader: Reader,
    closing: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
}

impl<S: TcpSession> ChannelStream<S> {
    /// Open `hostname:port` with the stream's reader installed from the
    /// first byte.
    pub async fn open<D>(
        dialer: &D,
        hostname: impl Into<String>,
        port: u16,
        options: ChannelOptions,
    ) -> Result<Self, meshdock_api::Error>
    where
        D: TcpDialer<Session = S> + ?Sized,
    {
        let (receiver, inbound) = inbound();
        let channel =
            RawChannel::open_with_receiver(dialer, hostname, port, options, Some(receiver))
                .await?;
        Ok(Self::assemble(channel, inbound))
    }

    /// Wrap a channel that is already open. Anything it received before
    /// this call was dropped.
    pub fn from_channel(channel: RawChannel<S>) -> Self {
        let (receiver, inbound) = inbound();
        channel.on_receive(receiver);
        Self::assemble(channel, inbound)
    }

    pub(crate) fn assemble(channel: RawChannel<S>, inbound: Inbound) -> Self {
        channel.on_close(inbound.on_close);
        Self {
            channel: Arc::new(channel),
            reader: inbound.reader,
            closing: None,
        }
    }

    pub fn channel(&self) -> &RawChannel<S> {
        &self.channel
    }
}

impl<S: TcpSession> AsyncRead for ChannelStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

impl<S: TcpSession> AsyncWrite for ChannelStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.closing.is_some() || this.channel.is_closed() {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        trace!(channel = this.channel.id(), len = buf.len(), "stream write");
        this.channel
            .send(ChannelMessage::Binary(Bytes::copy_from_slice(buf)));
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let channel = Arc::clone(&this.channel);
        let closing = this
            .closing
            .get_or_insert_with(|| Box::pin(async move { channel.close().await }));
        closing.as_mut().poll(cx).map(Ok)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn close_reasons_map_to_io_errors() {
        let (mut receiver, inbound) = inbound();
        receiver(Bytes::from_static(b"ok"));
        (inbound.on_close)(CloseReason::ReadError("reset".into()));
        drop(receiver);

        let mut reader = inbound.reader;
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ok");

        let err = reader.read_u8().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn clean_close_reads_as_eof() {
        let (receiver, inbound) = inbound();
        (inbound.on_close)(CloseReason::RemoteClosed);
        drop(receiver);

        let mut rest = Vec::new();
        let mut reader = inbound.reader;
        assert_eq!(reader.read_to_end(&mut rest).await.unwrap(), 0);
    }
}
