// ============================================
// File: crates/veilink-transport/src/sam/testing.rs
// ============================================
//! Scripted router for protocol tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use veilink_core::identity::{Identity, Keypair};

use super::client::SamConfig;

/// What the fake router does after reading a command line.
pub(crate) enum Response {
    /// Write a reply line.
    Line(String),
    /// Write raw bytes.
    Bytes(Vec<u8>),
    /// Wait, then continue with the next response.
    Delay(Duration),
    /// Echo everything from now on.
    Echo,
    /// Drop the connection.
    Close,
}

impl Response {
    pub(crate) fn line(line: impl Into<String>) -> Self {
        Self::Line(line.into())
    }
}

type Handler = Arc<dyn Fn(&str) -> Vec<Response> + Send + Sync>;

/// Router stand-in on `127.0.0.1:0`.
pub(crate) struct FakeRouter {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakeRouter {
    /// Answers `HELLO` itself and hands every other line to `handler`.
    pub(crate) async fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Vec<Response> + Send + Sync + 'static,
    {
        Self::start(Arc::new(move |line: &str| {
            if line.starts_with("HELLO VERSION") {
                vec![Response::line("HELLO REPLY RESULT=OK VERSION=3.1")]
            } else {
                handler(line)
            }
        }))
        .await
    }

    /// Hands every line, `HELLO` included, to `handler`.
    pub(crate) async fn spawn_raw<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Vec<Response> + Send + Sync + 'static,
    {
        Self::start(Arc::new(handler)).await
    }

    async fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let payloads = Arc::new(Mutex::new(Vec::new()));

        let (req, pay) = (Arc::clone(&requests), Arc::clone(&payloads));
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(
                    socket,
                    Arc::clone(&handler),
                    Arc::clone(&req),
                    Arc::clone(&pay),
                ));
            }
        });

        Self {
            addr,
            requests,
            payloads,
        }
    }

    pub(crate) fn config(&self) -> SamConfig {
        SamConfig::new(self.addr.to_string()).with_reply_timeout(Duration::from_secs(5))
    }

    /// Every command line received so far, across connections.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Payloads of `DATAGRAM SEND` commands.
    pub(crate) fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }
}

async fn serve(
    socket: TcpStream,
    handler: Handler,
    requests: Arc<Mutex<Vec<String>>>,
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
) {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let line = line.trim_end().to_string();

        if line.starts_with("DATAGRAM SEND") {
            let size = line
                .split_whitespace()
                .find_map(|t| t.strip_prefix("SIZE="))
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(0);
            let mut payload = vec![0u8; size];
            if reader.read_exact(&mut payload).await.is_err() {
                return;
            }
            payloads.lock().push(payload);
        }
        requests.lock().push(line.clone());

        for response in handler(&line) {
            match response {
                Response::Line(reply) => {
                    if writer.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                        return;
                    }
                }
                Response::Bytes(bytes) => {
                    if writer.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                Response::Delay(duration) => tokio::time::sleep(duration).await,
                Response::Echo => {
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    return;
                }
                Response::Close => return,
            }
        }
    }
}

/// Deterministic keypair: a 387-byte destination of `seed` bytes and a
/// private blob that extends it.
pub(crate) fn test_keypair(seed: u8) -> Keypair {
    let public = Identity::from_bytes(vec![seed; 387]).unwrap();
    let mut private = public.as_bytes().to_vec();
    private.extend_from_slice(&[seed.wrapping_add(1); 64]);
    let private = Identity::from_bytes(private).unwrap();
    Keypair::from_parts(public.to_base64(), private.to_base64()).unwrap()
}
