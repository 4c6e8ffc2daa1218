//! Trait abstraction for the collector connection to enable testing
//!
//! Framing: every request is one UTF-8 line terminated by `\n`, and every
//! reply is one line terminated by `\n`. Exactly one request is outstanding
//! at a time.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Upper bound on a single reply line
pub const MAX_REPLY_BYTES: u64 = 64 * 1024;

/// One open request/reply session with the collector
#[async_trait]
pub trait Exchange: Send {
    /// Send one request line and wait for exactly one reply.
    ///
    /// Returns the reply without its line terminator, lossily decoded.
    async fn request(&mut self, line: &str) -> Result<String>;
}

/// Opens sessions to a `host:port` address
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn Exchange>>;
}

/// TCP connector with bounded send and receive windows
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    send_timeout: Duration,
    receive_timeout: Duration,
}

impl TcpConnector {
    /// # Arguments
    ///
    /// * `send_timeout` - Bound on connect and on each request write
    /// * `receive_timeout` - Bound on waiting for each reply
    #[must_use]
    pub fn new(send_timeout: Duration, receive_timeout: Duration) -> Self {
        Self {
            send_timeout,
            receive_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Exchange>> {
        let stream = timeout(self.send_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| SyncError::Timeout(format!("connect to {}", address)))?
            .map_err(|e| SyncError::Connection(format!("Failed to connect to {}: {}", address, e)))?;

        stream.set_nodelay(true)?;
        debug!("Connected to collector at {}", address);

        let (read_half, write_half) = stream.into_split();
        Ok(Box::new(TcpExchange {
            reader: BufReader::new(read_half),
            writer: write_half,
            send_timeout: self.send_timeout,
            receive_timeout: self.receive_timeout,
        }))
    }
}

/// Line-framed request/reply over one TCP connection
pub struct TcpExchange {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    send_timeout: Duration,
    receive_timeout: Duration,
}

impl std::fmt::Debug for TcpExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpExchange")
            .field("peer", &self.writer.peer_addr().ok())
            .finish_non_exhaustive()
    }
}

/// Build the wire frame for one request line
fn encode_request(line: &str) -> BytesMut {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut frame = BytesMut::with_capacity(line.len() + 1);
    frame.put_slice(line.as_bytes());
    frame.put_u8(b'\n');
    frame
}

/// Validate one raw reply line and render it for logging.
///
/// Reply bytes are opaque; anything non-blank followed by `\n` counts as
/// an acknowledgement.
fn decode_reply(raw: &[u8]) -> Result<String> {
    let Some(body) = raw.strip_suffix(b"\n") else {
        return Err(SyncError::Protocol(format!(
            "incomplete reply ({} bytes before close)",
            raw.len()
        )));
    };

    let body = body.strip_suffix(b"\r").unwrap_or(body);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(SyncError::Protocol("empty reply".to_string()));
    }

    Ok(String::from_utf8_lossy(body).into_owned())
}

#[async_trait]
impl Exchange for TcpExchange {
    async fn request(&mut self, line: &str) -> Result<String> {
        let frame = encode_request(line);

        timeout(self.send_timeout, async {
            self.writer.write_all(&frame).await?;
            self.writer.flush().await
        })
        .await
        .map_err(|_| SyncError::Timeout("request write".to_string()))?
        .map_err(|e| SyncError::Connection(format!("Failed to send request: {}", e)))?;

        let mut reply = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_REPLY_BYTES);
        timeout(self.receive_timeout, limited.read_until(b'\n', &mut reply))
            .await
            .map_err(|_| SyncError::Timeout("no reply from collector".to_string()))?
            .map_err(|e| SyncError::Connection(format!("Failed to read reply: {}", e)))?;

        decode_reply(&reply)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Failure injected by the mock connector
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Fault {
        Timeout,
        Connection,
        Protocol,
    }

    impl Fault {
        fn into_error(self) -> SyncError {
            match self {
                Fault::Timeout => SyncError::Timeout("mock reply".to_string()),
                Fault::Connection => SyncError::Connection("mock refused".to_string()),
                Fault::Protocol => SyncError::Protocol("mock empty reply".to_string()),
            }
        }
    }

    /// Mock connector that acknowledges every request with "ok" unless a
    /// fault is scheduled for it
    #[derive(Clone, Default)]
    pub struct MockConnector {
        pub requests: Arc<Mutex<Vec<String>>>,
        pub connects: Arc<AtomicUsize>,
        pub connect_fault: Arc<Mutex<Option<Fault>>>,
        /// Fail the n-th request (0-based, counted across all sessions)
        pub request_fault: Arc<Mutex<Option<(usize, Fault)>>>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn refuse_connections(&self) {
            *self.connect_fault.lock().unwrap() = Some(Fault::Connection);
        }

        pub fn fail_request(&self, index: usize, fault: Fault) {
            *self.request_fault.lock().unwrap() = Some((index, fault));
        }

        /// Requests that were acknowledged, in order
        pub fn acknowledged(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    struct MockExchange {
        connector: MockConnector,
    }

    #[async_trait]
    impl Exchange for MockExchange {
        async fn request(&mut self, line: &str) -> Result<String> {
            let n = self.connector.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some((index, fault)) = *self.connector.request_fault.lock().unwrap() {
                if index == n {
                    return Err(fault.into_error());
                }
            }
            self.connector.requests.lock().unwrap().push(line.to_string());
            Ok("ok".to_string())
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _address: &str) -> Result<Box<dyn Exchange>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(fault) = *self.connect_fault.lock().unwrap() {
                return Err(fault.into_error());
            }
            Ok(Box::new(MockExchange {
                connector: self.clone(),
            }))
        }
    }

    /// Loopback collector that answers each request line with the raw
    /// bytes of `reply`.
    ///
    /// With `close_after = Some(n)` the connection is dropped after `n`
    /// replies. Returns the bound address and the lines received.
    pub async fn spawn_collector(
        reply: &'static [u8],
        close_after: Option<usize>,
    ) -> io::Result<(String, Arc<Mutex<Vec<String>>>)> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?.to_string();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let (read_half, mut write_half) = stream.into_split();
                    let mut lines = BufReader::new(read_half).lines();
                    let mut replies = 0;
                    while let Ok(Some(line)) = lines.next_line().await {
                        if close_after == Some(replies) {
                            return;
                        }
                        sink.lock().unwrap().push(line);
                        if write_half.write_all(reply).await.is_err() {
                            return;
                        }
                        replies += 1;
                    }
                });
            }
        });

        Ok((address, received))
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::spawn_collector;
    use super::*;

    fn connector() -> TcpConnector {
        TcpConnector::new(Duration::from_millis(2000), Duration::from_millis(2000))
    }

    #[test]
    fn test_encode_request_appends_single_newline() {
        assert_eq!(&encode_request("{\"a\":1}")[..], b"{\"a\":1}\n");
        assert_eq!(&encode_request("{\"a\":1}\n")[..], b"{\"a\":1}\n");
    }

    #[tokio::test]
    async fn test_request_reply_round() {
        let (address, received) = spawn_collector(b"ok\n", None).await.unwrap();

        let mut exchange = connector().connect(&address).await.unwrap();
        assert_eq!(exchange.request("first").await.unwrap(), "ok");
        assert_eq!(exchange.request("second").await.unwrap(), "ok");

        assert_eq!(*received.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_empty_reply_is_protocol_error() {
        let (address, _) = spawn_collector(b"\n", None).await.unwrap();

        let mut exchange = connector().connect(&address).await.unwrap();
        let err = exchange.request("line").await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)), "got {:?}", err);
    }

    #[test]
    fn test_decode_reply() {
        assert_eq!(decode_reply(b"ok\n").unwrap(), "ok");
        assert_eq!(decode_reply(b"ok\r\n").unwrap(), "ok");
        assert!(matches!(decode_reply(b"ok"), Err(SyncError::Protocol(_))));
        assert!(matches!(decode_reply(b" \t\r\n"), Err(SyncError::Protocol(_))));
        assert_eq!(decode_reply(b"\x00\x01\n").unwrap(), "\u{0}\u{1}");
    }

    #[tokio::test]
    async fn test_binary_reply_is_acknowledgement() {
        let (address, received) = spawn_collector(b"\xffACK\n", None).await.unwrap();

        let mut exchange = connector().connect(&address).await.unwrap();
        assert_eq!(exchange.request("line").await.unwrap(), "\u{FFFD}ACK");
        assert_eq!(*received.lock().unwrap(), vec!["line"]);
    }

    #[tokio::test]
    async fn test_close_without_reply_is_protocol_error() {
        let (address, _) = spawn_collector(b"ok\n", Some(0)).await.unwrap();

        let mut exchange = connector().connect(&address).await.unwrap();
        let err = exchange.request("line").await.unwrap_err();
        assert!(err.is_delivery_failure(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_silent_collector_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let connector = TcpConnector::new(Duration::from_millis(500), Duration::from_millis(200));
        let mut exchange = connector.connect(&address).await.unwrap();
        let err = exchange.request("line").await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = connector().connect(&address).await.err().unwrap();
        assert!(err.is_delivery_failure(), "got {:?}", err);
    }
}
