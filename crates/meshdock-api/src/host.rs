// ── Host-network passthrough ──
//
// `HostDialer` and `HostFetcher` satisfy the stack's TCP and fetch traits
// using the local network directly, without the mesh. Used for local
// development against reachable hosts and by the CLI's `pipe` command.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::stack::{ReadEvent, TcpDialer, TcpOptions, TcpSession};

// ── TransportConfig ─────────────────────────────────────────────────

/// Shared transport settings for the passthrough dialer and fetcher.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout for fetches.
    pub timeout: Duration,
    /// TCP connect timeout when the caller does not supply one.
    pub connect_timeout: Duration,
    /// Accept self-signed certificates on fetches.
    pub danger_accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            danger_accept_invalid_certs: false,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .danger_accept_invalid_certs(self.danger_accept_invalid_certs)
            .user_agent(concat!("meshdock/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)
    }
}

// ── HostDialer ──────────────────────────────────────────────────────

/// Opens raw TCP sessions over the host network.
#[derive(Debug, Clone, Default)]
pub struct HostDialer {
    config: TransportConfig,
}

impl HostDialer {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl TcpDialer for HostDialer {
    type Session = HostSession;

    async fn open_tcp(&self, options: TcpOptions) -> Result<HostSession, Error> {
        let TcpOptions {
            hostname,
            port,
            mut read_callback,
            read_buffer_size,
            connect_timeout,
            write_buffer_size,
        } = options;

        let timeout = connect_timeout.unwrap_or(self.config.connect_timeout);
        debug!(%hostname, port, ?timeout, "opening host TCP session");

        let stream =
            match tokio::time::timeout(timeout, TcpStream::connect((hostname.as_str(), port)))
                .await
            {
                Err(_) => {
                    return Err(Error::Timeout {
                        timeout_secs: timeout.as_secs(),
                    });
                }
                Ok(Err(e)) => {
                    return Err(Error::Connect {
                        host: hostname,
                        port,
                        reason: e.to_string(),
                    });
                }
                Ok(Ok(stream)) => stream,
            };

        stream.set_nodelay(true)?;
        let remote_addr = stream
            .peer_addr()
            .map_or_else(|_| format!("{hostname}:{port}"), |a| a.to_string());
        if let Some(size) = write_buffer_size {
            trace!(size, "write buffer size is left to the OS for host sockets");
        }

        let (mut reader, writer) = stream.into_split();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let chunk_size = read_buffer_size.max(1);

        tokio::spawn(async move {
            let mut buf = vec![0u8; chunk_size];
            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    result = reader.read(&mut buf) => match result {
                        Ok(0) => {
                            read_callback(ReadEvent::Eof);
                            break;
                        }
                        Ok(n) => {
                            let chunk = buf.get(..n).map(Bytes::copy_from_slice).unwrap_or_default();
                            read_callback(ReadEvent::Data(chunk));
                        }
                        Err(e) => {
                            warn!(error = %e, "host TCP read failed");
                            read_callback(ReadEvent::Error(e.to_string()));
                            break;
                        }
                    },
                }
            }
            trace!("host TCP reader finished");
        });

        Ok(HostSession {
            remote_addr,
            writer: Arc::new(Mutex::new(Some(writer))),
            cancel,
        })
    }
}

/// A TCP session opened by [`HostDialer`].
#[derive(Debug)]
pub struct HostSession {
    remote_addr: String,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    cancel: CancellationToken,
}

impl TcpSession for HostSession {
    fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    async fn write(&self, data: Bytes) -> Result<usize, Error> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::SessionClosed)?;
        writer.write_all(&data).await?;
        Ok(data.len())
    }

    async fn close(&self) -> Result<(), Error> {
        self.cancel.cancel();
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "shutdown on closing host session");
            }
            debug!(remote = %self.remote_addr, "host TCP session closed");
        }
        Ok(())
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── HostFetcher ─────────────────────────────────────────────────────

/// Fetch bridge over the host network.
#[derive(Debug, Clone)]
pub struct HostFetcher {
    http: reqwest::Client,
}

impl HostFetcher {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Wrap an existing `reqwest::Client` (used by tests).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Fetcher for HostFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        let url = url::Url::parse(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidMethod(request.method.clone()))?;

        debug!(%method, %url, "fetch");
        let mut builder = self.http.request(method, url);
        for (name, values) in &request.headers {
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_owned(), v.to_owned())))
            .collect();
        let body = response.text().await?;

        Ok(FetchResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            body,
        })
    }
}
