use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use sigprobe::protocol::{Frame, OpCode, compute_accept_key};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the in-process signalling server treats each connection.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Behavior {
    /// Echo text frames, answer close frames.
    Echo,
    /// Send one text frame after the handshake, then behave like `Echo`.
    Greet(String),
    /// Like `Greet`, but with a binary frame.
    GreetBinary(Vec<u8>),
    /// Send one masked text frame after the handshake, which clients must reject.
    GreetMasked(String),
    /// Accept TCP but never answer the upgrade request.
    NeverHandshake,
    /// Answer the upgrade with this HTTP status.
    Reject(u16),
    /// Complete the handshake, swallow everything, never answer close.
    IgnoreClose,
    /// Complete the handshake and close from the server side after a delay.
    CloseAfter(Duration),
}

/// What the server saw, in order, across all connections.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum ServerEvent {
    Accepted,
    Request(String),
    Text(String),
    Close(Option<u16>),
    Disconnected,
}

pub struct TestServer {
    pub addr: SocketAddr,
    log: Arc<Mutex<Vec<ServerEvent>>>,
    task: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let task_log = Arc::clone(&log);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&task_log);
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    push(&log, ServerEvent::Accepted);
                    serve(stream, behavior, &log).await;
                    push(&log, ServerEvent::Disconnected);
                });
            }
        });

        Self { addr, log, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.log.lock().unwrap().clone()
    }

    /// Poll the log until `pred` holds or a second has passed.
    pub async fn wait_for(&self, pred: impl Fn(&[ServerEvent]) -> bool) -> bool {
        for _ in 0..100 {
            if pred(&self.events()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn push(log: &Mutex<Vec<ServerEvent>>, event: ServerEvent) {
    log.lock().unwrap().push(event);
}

async fn serve(mut stream: TcpStream, behavior: Behavior, log: &Mutex<Vec<ServerEvent>>) {
    let Some((target, key, mut buf)) = read_request(&mut stream).await else {
        return;
    };
    push(log, ServerEvent::Request(target));

    match behavior {
        Behavior::NeverHandshake => {
            let mut sink = [0u8; 256];
            while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
            return;
        }
        Behavior::Reject(status) => {
            let reply = format!("HTTP/1.1 {status} Rejected\r\nContent-Length: 0\r\n\r\n");
            let _ = stream.write_all(reply.as_bytes()).await;
            return;
        }
        _ => {}
    }

    let reply = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(&key)
    );
    if stream.write_all(reply.as_bytes()).await.is_err() {
        return;
    }

    match &behavior {
        Behavior::Greet(text) => {
            if send(&mut stream, &Frame::text(text.as_bytes())).await.is_err() {
                return;
            }
        }
        Behavior::GreetBinary(data) => {
            if send(&mut stream, &Frame::binary(data.clone())).await.is_err() {
                return;
            }
        }
        Behavior::GreetMasked(text) => {
            let mut out = BytesMut::new();
            Frame::text(text.as_bytes()).write(&mut out, Some([0x37, 0xfa, 0x21, 0x3d]));
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }
        Behavior::CloseAfter(delay) => {
            tokio::time::sleep(*delay).await;
            if send(&mut stream, &Frame::close(Some(1001), "going away")).await.is_err() {
                return;
            }
        }
        _ => {}
    }

    while let Some(frame) = read_frame(&mut stream, &mut buf).await {
        match frame.opcode {
            OpCode::Text => {
                let text = String::from_utf8_lossy(frame.payload()).into_owned();
                push(log, ServerEvent::Text(text.clone()));
                if matches!(behavior, Behavior::Echo | Behavior::Greet(_) | Behavior::GreetBinary(_)) {
                    let _ = send(&mut stream, &Frame::text(text.into_bytes())).await;
                }
            }
            OpCode::Close => {
                let code = frame
                    .payload()
                    .get(..2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]));
                push(log, ServerEvent::Close(code));
                match behavior {
                    Behavior::IgnoreClose => {}
                    Behavior::CloseAfter(_) => return,
                    _ => {
                        let _ = send(&mut stream, &Frame::close(code, "")).await;
                        return;
                    }
                }
            }
            _ => {}
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<(String, String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..end]).into_owned();
    let target = head.split_whitespace().nth(1)?.to_string();
    let key = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })?;
    Some((target, key, buf[end..].to_vec()))
}

async fn read_frame(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Option<Frame> {
    let mut chunk = [0u8; 1024];
    loop {
        if let Ok((frame, consumed)) = Frame::parse(buf) {
            buf.drain(..consumed);
            return Some(frame);
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn send(stream: &mut TcpStream, frame: &Frame) -> std::io::Result<()> {
    let mut out = BytesMut::new();
    frame.write(&mut out, None);
    stream.write_all(&out).await
}
