use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::codec::WebSocketCodec;
use crate::config::{Config, Limits};
use crate::connection::ConnectionState;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::handshake::find_head_end;
use crate::protocol::{ClientRequest, Frame, HandshakeResponse, OpCode};

/// Open a TCP stream to `endpoint` and perform the opening handshake.
///
/// # Errors
///
/// `Error::Io` for resolution and socket failures, `Error::InvalidHandshake`
/// or `Error::HandshakeTooLarge` when the server's answer is not an upgrade.
pub async fn connect(endpoint: &Endpoint, config: &Config) -> Result<Connection<TcpStream>> {
    debug!(endpoint = %endpoint, "opening tcp stream");
    let mut stream = TcpStream::connect(endpoint.authority()).await?;
    stream.set_nodelay(true)?;

    let leftover = client_handshake(&mut stream, endpoint, config).await?;
    debug!(endpoint = %endpoint, "handshake accepted");
    Ok(Connection::new(stream, leftover, config))
}

/// Send the upgrade request over `io` and validate the response.
///
/// Returns whatever the server sent after the response head; those bytes
/// belong to the first frames.
///
/// # Errors
///
/// See [`connect`].
pub async fn client_handshake<T>(io: &mut T, endpoint: &Endpoint, config: &Config) -> Result<BytesMut>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let request = ClientRequest::for_endpoint(endpoint)?;
    let mut out = Vec::with_capacity(256);
    request.write(&mut out);
    io.write_all(&out).await?;
    io.flush().await?;
    trace!(path = %request.path, "upgrade request sent");

    let mut buf = BytesMut::with_capacity(config.read_buffer_size);
    let head_end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        config.limits.check_handshake_size(buf.len())?;
        if io.read_buf(&mut buf).await? == 0 {
            return Err(Error::InvalidHandshake(
                "Connection closed during handshake".into(),
            ));
        }
    };

    let head = buf.split_to(head_end);
    HandshakeResponse::parse(&head)?.verify(&request)?;
    Ok(buf)
}

/// Message-level view of an established client connection.
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    state: ConnectionState,
    limits: Limits,
    partial: Option<(OpCode, Vec<u8>)>,
}

impl<T> Connection<T> {
    /// Wrap a stream whose handshake already succeeded.
    #[must_use]
    pub fn new(io: T, leftover: BytesMut, config: &Config) -> Self {
        Self {
            codec: WebSocketCodec::new(io, leftover, config.limits.clone()),
            state: ConnectionState::Open,
            limits: config.limits.clone(),
            partial: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Drop the stream without a close handshake.
    pub fn terminate(self) {
        trace!(state = %self.state, "terminating stream");
        drop(self.codec.into_inner());
    }

    fn assemble(&self, opcode: OpCode, payload: Vec<u8>) -> Result<Message> {
        match opcode {
            OpCode::Text => String::from_utf8(payload)
                .map(Message::Text)
                .map_err(|_| Error::InvalidUtf8),
            OpCode::Binary => Ok(Message::Binary(payload)),
            other => Err(Error::ProtocolViolation(format!(
                "unexpected data opcode {other}"
            ))),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Send a message. `Message::Close` starts the close handshake.
    ///
    /// # Errors
    ///
    /// `Error::ProtocolViolation` unless the connection is open, otherwise
    /// I/O errors.
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ProtocolViolation(format!(
                "cannot send while {}",
                self.state
            )));
        }

        let frame = match message {
            Message::Text(text) => Frame::text(text.into_bytes()),
            Message::Binary(data) => Frame::binary(data),
            Message::Ping(data) => Frame::ping(data),
            Message::Pong(data) => Frame::pong(data),
            Message::Close(close) => {
                let (code, reason) = close
                    .map(|cf| (cf.code, cf.reason))
                    .unwrap_or_default();
                return self.close(code, &reason).await;
            }
        };
        self.codec.write_frame(&frame).await
    }

    /// Receive the next message.
    ///
    /// Pings are answered before being returned. A close frame from the peer
    /// is answered while open and returned as `Message::Close`; afterwards,
    /// and on end of stream, this returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Protocol violations and I/O errors.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Ok(None);
        }

        loop {
            let frame = match self.codec.read_frame().await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed(_)) => {
                    trace!(state = %self.state, "stream ended");
                    self.state = self.state.on_close_received();
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            frame.validate()?;

            match frame.opcode {
                OpCode::Ping => {
                    let payload = frame.into_payload();
                    if self.state.can_send() {
                        self.codec.write_frame(&Frame::pong(payload.clone())).await?;
                    }
                    return Ok(Some(Message::Ping(payload)));
                }
                OpCode::Pong => return Ok(Some(Message::Pong(frame.into_payload()))),
                OpCode::Close => {
                    let close = CloseFrame::from_payload(frame.payload());
                    if self.state == ConnectionState::Open {
                        let code = CloseFrame::reply_code(frame.payload());
                        let reply = Frame::close(code.map(|c| c.as_u16()), "");
                        if let Err(e) = self.codec.write_frame(&reply).await {
                            debug!(error = %e, "close reply not delivered");
                        }
                    }
                    self.state = self.state.on_close_received();
                    return Ok(Some(Message::Close(close)));
                }
                OpCode::Text | OpCode::Binary => {
                    if self.partial.is_some() {
                        return Err(Error::ProtocolViolation(
                            "data frame inside a fragmented message".into(),
                        ));
                    }
                    let opcode = frame.opcode;
                    if frame.fin {
                        return self.assemble(opcode, frame.into_payload()).map(Some);
                    }
                    self.partial = Some((opcode, frame.into_payload()));
                }
                OpCode::Continuation => {
                    let Some((opcode, mut payload)) = self.partial.take() else {
                        return Err(Error::ProtocolViolation(
                            "continuation without a started message".into(),
                        ));
                    };
                    payload.extend_from_slice(frame.payload());
                    self.limits.check_frame_size(payload.len())?;
                    if frame.fin {
                        return self.assemble(opcode, payload).map(Some);
                    }
                    self.partial = Some((opcode, payload));
                }
            }
        }
    }

    /// Send a close frame and move to `Closing`. No-op unless open.
    ///
    /// Keep calling [`recv`](Self::recv) to see the peer's answer.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        self.codec
            .write_frame(&Frame::close(Some(code.as_u16()), reason))
            .await?;
        self.state = self.state.on_close_sent();
        trace!(code = code.as_u16(), "close frame sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::compute_accept_key;
    use tokio::io::{DuplexStream, duplex};

    fn endpoint() -> Endpoint {
        Endpoint::parse("ws://127.0.0.1:8888/type=player&insid=123456&projectid=ABCDEF").unwrap()
    }

    async fn read_head(io: &mut DuplexStream) -> String {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        while !buf.ends_with(b"\r\n\r\n") {
            io.read_exact(&mut byte).await.unwrap();
            buf.push(byte[0]);
        }
        String::from_utf8(buf).unwrap()
    }

    fn key_of(head: &str) -> String {
        head.lines()
            .find_map(|l| l.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .to_string()
    }

    fn accept_response(key: &str) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
            compute_accept_key(key)
        )
    }

    fn server_frame(frame: &Frame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        frame.write(&mut buf, None);
        buf.to_vec()
    }

    async fn read_client_frame(io: &mut DuplexStream) -> Frame {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            if let Ok((frame, _)) = Frame::parse(&buf) {
                return frame;
            }
            let n = io.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before a full frame");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn open_pair() -> (Connection<DuplexStream>, DuplexStream) {
        let (mut client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let head = read_head(&mut server).await;
            server
                .write_all(accept_response(&key_of(&head)).as_bytes())
                .await
                .unwrap();
            server
        });
        let config = Config::default();
        let leftover = client_handshake(&mut client, &endpoint(), &config)
            .await
            .unwrap();
        let server = server_task.await.unwrap();
        (Connection::new(client, leftover, &config), server)
    }

    #[tokio::test]
    async fn test_handshake_sends_path_verbatim() {
        let (mut client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            let head = read_head(&mut server).await;
            server
                .write_all(accept_response(&key_of(&head)).as_bytes())
                .await
                .unwrap();
            head
        });

        client_handshake(&mut client, &endpoint(), &Config::default())
            .await
            .unwrap();
        let head = server_task.await.unwrap();
        assert!(head.starts_with("GET /type=player&insid=123456&projectid=ABCDEF HTTP/1.1\r\n"));
        assert!(head.contains("Host: 127.0.0.1:8888\r\n"));
        assert!(head.contains("Sec-WebSocket-Version: 13\r\n"));
    }

    #[tokio::test]
    async fn test_handshake_keeps_bytes_after_head() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            let head = read_head(&mut server).await;
            let mut reply = accept_response(&key_of(&head)).into_bytes();
            reply.extend(server_frame(&Frame::text("welcome")));
            server.write_all(&reply).await.unwrap();
            server
        });

        let config = Config::default();
        let leftover = client_handshake(&mut client, &endpoint(), &config)
            .await
            .unwrap();
        let mut conn = Connection::new(client, leftover, &config);
        assert_eq!(conn.recv().await.unwrap(), Some(Message::text("welcome")));
    }

    #[tokio::test]
    async fn test_handshake_rejected_status() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            read_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            server
        });

        let err = client_handshake(&mut client, &endpoint(), &Config::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidHandshake("Unexpected server response: 404".into())
        );
    }

    #[tokio::test]
    async fn test_handshake_wrong_accept() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            read_head(&mut server).await;
            server
                .write_all(accept_response("not-the-key").as_bytes())
                .await
                .unwrap();
            server
        });

        let err = client_handshake(&mut client, &endpoint(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("Accept")));
    }

    #[tokio::test]
    async fn test_handshake_eof() {
        let (mut client, mut server) = duplex(4096);
        tokio::spawn(async move {
            read_head(&mut server).await;
            drop(server);
        });

        let err = client_handshake(&mut client, &endpoint(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(_)));
    }

    #[tokio::test]
    async fn test_handshake_too_large() {
        let (mut client, mut server) = duplex(64 * 1024);
        tokio::spawn(async move {
            read_head(&mut server).await;
            let junk = format!("HTTP/1.1 101 OK\r\nX-Junk: {}\r\n", "a".repeat(10_000));
            server.write_all(junk.as_bytes()).await.unwrap();
            server
        });

        let err = client_handshake(&mut client, &endpoint(), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_send_text_is_masked_frame() {
        let (mut conn, mut server) = open_pair().await;
        conn.send(Message::text(r#"{"type":"ping","time":1}"#))
            .await
            .unwrap();

        let frame = read_client_frame(&mut server).await;
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload(), br#"{"type":"ping","time":1}"#);
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let (mut conn, mut server) = open_pair().await;
        server
            .write_all(&server_frame(&Frame::ping(b"hb".to_vec())))
            .await
            .unwrap();

        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Message::Ping(b"hb".to_vec()))
        );
        let pong = read_client_frame(&mut server).await;
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload(), b"hb");
    }

    #[tokio::test]
    async fn test_fragmented_text_is_assembled() {
        let (mut conn, mut server) = open_pair().await;
        let mut bytes = server_frame(&Frame::new(false, OpCode::Text, b"Hel".to_vec()));
        bytes.extend(server_frame(&Frame::new(true, OpCode::Continuation, b"lo".to_vec())));
        server.write_all(&bytes).await.unwrap();

        assert_eq!(conn.recv().await.unwrap(), Some(Message::text("Hello")));
    }

    #[tokio::test]
    async fn test_invalid_utf8_text() {
        let (mut conn, mut server) = open_pair().await;
        server
            .write_all(&server_frame(&Frame::text(vec![0xff, 0xfe])))
            .await
            .unwrap();

        assert_eq!(conn.recv().await.unwrap_err(), Error::InvalidUtf8);
    }

    #[tokio::test]
    async fn test_local_close_handshake() {
        let (mut conn, mut server) = open_pair().await;
        conn.close(CloseCode::Normal, "").await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.send(Message::text("late")).await.is_err());

        let frame = read_client_frame(&mut server).await;
        assert_eq!(frame.opcode, OpCode::Close);
        assert_eq!(frame.payload(), &1000u16.to_be_bytes());

        server
            .write_all(&server_frame(&Frame::close(Some(1000), "")))
            .await
            .unwrap();
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Message::Close(Some(CloseFrame::new(CloseCode::Normal, ""))))
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remote_close_is_echoed() {
        let (mut conn, mut server) = open_pair().await;
        server
            .write_all(&server_frame(&Frame::close(Some(1001), "bye")))
            .await
            .unwrap();

        let msg = conn.recv().await.unwrap().unwrap();
        assert!(msg.is_close());
        assert_eq!(conn.state(), ConnectionState::Closed);

        let echo = read_client_frame(&mut server).await;
        assert_eq!(echo.opcode, OpCode::Close);
        assert_eq!(echo.payload(), &1001u16.to_be_bytes());
    }

    async fn echo_of(payload: Vec<u8>) -> Frame {
        let (mut conn, mut server) = open_pair().await;
        server
            .write_all(&server_frame(&Frame::new(true, OpCode::Close, payload)))
            .await
            .unwrap();

        assert!(conn.recv().await.unwrap().unwrap().is_close());
        read_client_frame(&mut server).await
    }

    #[tokio::test]
    async fn test_close_echo_drops_invalid_utf8_reason() {
        let mut payload = 1000u16.to_be_bytes().to_vec();
        payload.extend(std::iter::repeat_n(0xff, 123));

        let echo = echo_of(payload).await;
        assert_eq!(echo.opcode, OpCode::Close);
        assert!(echo.payload().len() <= 125);
        assert_eq!(echo.payload(), &1007u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_close_echo_rejects_reserved_codes() {
        for code in [999u16, 1005, 1006, 2000] {
            let echo = echo_of(code.to_be_bytes().to_vec()).await;
            assert_eq!(echo.payload(), &1002u16.to_be_bytes(), "code {code}");
        }
    }

    #[tokio::test]
    async fn test_close_echo_without_status() {
        let echo = echo_of(Vec::new()).await;
        assert_eq!(echo.opcode, OpCode::Close);
        assert!(echo.payload().is_empty());
    }

    #[tokio::test]
    async fn test_eof_closes() {
        let (mut conn, server) = open_pair().await;
        drop(server);
        assert_eq!(conn.recv().await.unwrap(), None);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
