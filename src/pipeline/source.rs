//! Byte sources feeding the pipeline.
//!
//! The pipeline never opens or configures a device. It is handed something
//! that is already open and only asks it for the next chunk of text.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 1024;

/// An already-open stream of text chunks.
#[async_trait]
pub trait ByteSource: Send {
    /// Wait for the next chunk. `Ok(None)` signals end of stream.
    async fn read_chunk(&mut self) -> io::Result<Option<String>>;

    /// Release the underlying resource. Later reads return `Ok(None)`.
    async fn close(&mut self) -> io::Result<()>;
}

/// Adapts any [`AsyncRead`] (device file, stdin, socket) into text chunks.
///
/// Bytes are decoded as UTF-8 incrementally: a multi-byte character split
/// across reads is carried into the next chunk, and invalid sequences become
/// U+FFFD.
pub struct ReaderSource<R> {
    reader: Option<R>,
    buf: Vec<u8>,
    carry: Vec<u8>,
}

impl<R> ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            buf: vec![0; READ_BUFFER_SIZE],
            carry: Vec::new(),
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let mut text = String::new();

        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.carry.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.carry[..valid_up_to]));
                    match e.error_len() {
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid_up_to + invalid);
                        }
                        None => {
                            // Incomplete character at the end, wait for more bytes
                            self.carry.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }

        text
    }
}

#[async_trait]
impl<R> ByteSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self) -> io::Result<Option<String>> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            let n = reader.read(&mut self.buf).await?;
            if n == 0 {
                if self.carry.is_empty() {
                    return Ok(None);
                }
                let tail = String::from_utf8_lossy(&self.carry).into_owned();
                self.carry.clear();
                return Ok(Some(tail));
            }

            let bytes = self.buf[..n].to_vec();
            let text = self.decode(&bytes);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.reader.take().is_some() {
            debug!("Reader source closed");
        }
        self.carry.clear();
        Ok(())
    }
}

/// A source fed through an in-memory channel.
///
/// The stream ends when every sender has been dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Create a source together with the sender that feeds it.
    pub fn pair(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl ByteSource for ChannelSource {
    async fn read_chunk(&mut self) -> io::Result<Option<String>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.rx.close();
        Ok(())
    }
}
