use std::io;

use log::debug;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::packet::{ClientPacket, PacketError, FRAME_SIZE};

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] PacketError),
    #[error("error reading from connection: {0}")]
    Io(#[from] io::Error),
}

/// Splits a byte stream into fixed size frames and decodes them.
///
/// `read_packet` yields `Ok(None)` once the stream has ended. A trailing
/// partial frame at end of stream is dropped. After a decode or I/O error the
/// reader is finished and only yields `Ok(None)`.
pub struct FrameReader<R> {
    read_stream: R,
    data: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(read_stream: R) -> FrameReader<R> {
        FrameReader {
            read_stream,
            data: Vec::new(),
            finished: false,
        }
    }

    pub async fn read_packet(&mut self) -> Result<Option<ClientPacket>, FrameError> {
        if self.finished {
            return Ok(None);
        }
        let result = self.next_packet().await;
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    async fn next_packet(&mut self) -> Result<Option<ClientPacket>, FrameError> {
        loop {
            if self.data.len() >= FRAME_SIZE {
                let mut frame = [0; FRAME_SIZE];
                frame.copy_from_slice(&self.data[..FRAME_SIZE]);
                self.data.drain(..FRAME_SIZE);
                return Ok(Some(ClientPacket::parse(&frame)?));
            }

            let mut buffer = [0; READ_BUFFER_SIZE];
            let size = self.read_stream.read(&mut buffer).await?;
            if size == 0 {
                if !self.data.is_empty() {
                    debug!(
                        "Stream ended with {} bytes of an incomplete frame",
                        self.data.len()
                    );
                }
                return Ok(None);
            }
            self.data.extend_from_slice(&buffer[..size]);
        }
    }
}
