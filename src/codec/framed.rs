use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameHeader, MaskGenerator};

/// Frame reader/writer for the client end of a WebSocket stream.
///
/// Outgoing frames are always masked; incoming frames must not be.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    limits: Limits,
    masks: MaskGenerator,
}

impl<T> WebSocketCodec<T> {
    /// Wrap `io`. `leftover` holds bytes read past the handshake head.
    #[must_use]
    pub fn new(io: T, leftover: BytesMut, limits: Limits) -> Self {
        Self {
            io,
            read_buf: leftover,
            write_buf: BytesMut::with_capacity(1024),
            limits,
            masks: MaskGenerator::new(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    fn check_incoming(&self, header: &FrameHeader) -> Result<()> {
        if header.mask.is_some() {
            return Err(Error::MaskedServerFrame);
        }
        self.limits.check_frame_size(header.payload_len)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next complete frame.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed(None)` on a clean end of stream, otherwise
    /// protocol or I/O errors.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.read_buf) {
                Ok(header) => {
                    self.check_incoming(&header)?;
                    match Frame::parse(&self.read_buf) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            self.read_buf.reserve(4096);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    /// Mask and write a frame, then flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_buf.clear();
        frame.write(&mut self.write_buf, Some(self.masks.next_mask()));
        self.io.write_all(&self.write_buf).await?;
        self.io.flush().await?;
        Ok(())
    }
}
