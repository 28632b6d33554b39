//! Artifact files, optionally gzip-compressed.
//!
//! Writers compress in memory and hand compressed chunks to a bounded
//! [`BufWriter`]; readers decompress on a pump task that feeds a bounded
//! in-memory pipe. Either way at most a few buffers of data are resident.

use flate2::write::{GzDecoder, GzEncoder};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter, DuplexStream};
use tokio::task::JoinHandle;

/// Capacity of file buffers and of the decompression pipe
pub const STREAM_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    pub fn from_flag(compress: bool) -> Self {
        if compress {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// Streaming artifact sink
pub struct ArtifactWriter {
    path: PathBuf,
    file: BufWriter<File>,
    encoder: Option<GzEncoder<Vec<u8>>>,
    bytes_in: u64,
}

impl ArtifactWriter {
    pub async fn create(path: impl AsRef<Path>, compression: Compression) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        let encoder = match compression {
            Compression::None => None,
            Compression::Gzip => Some(GzEncoder::new(
                Vec::with_capacity(STREAM_BUFFER_BYTES),
                flate2::Compression::default(),
            )),
        };
        Ok(Self {
            path,
            file: BufWriter::with_capacity(STREAM_BUFFER_BYTES, file),
            encoder,
            bytes_in: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_compressed(&self) -> bool {
        self.encoder.is_some()
    }

    /// Uncompressed bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_in
    }

    /// Returns once the sink has room for `buf`
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.bytes_in += buf.len() as u64;
        match self.encoder.as_mut() {
            None => self.file.write_all(buf).await,
            Some(encoder) => {
                encoder.write_all(buf)?;
                if encoder.get_ref().len() >= STREAM_BUFFER_BYTES {
                    let chunk = std::mem::take(encoder.get_mut());
                    self.file.write_all(&chunk).await?;
                }
                Ok(())
            }
        }
    }

    pub async fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.write_all(text.as_bytes()).await
    }

    /// Flush buffers and, when compressing, the gzip trailer
    pub async fn finish(mut self) -> io::Result<u64> {
        if let Some(encoder) = self.encoder.take() {
            let tail = encoder.finish()?;
            self.file.write_all(&tail).await?;
        }
        self.file.flush().await?;
        Ok(self.bytes_in)
    }
}

/// Streaming artifact source yielding decompressed bytes
pub struct ArtifactReader {
    path: PathBuf,
    reader: BufReader<Source>,
    pump: Option<JoinHandle<io::Result<()>>>,
}

enum Source {
    Plain(File),
    Piped(DuplexStream),
}

impl AsyncRead for Source {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Source::Plain(file) => std::pin::Pin::new(file).poll_read(cx, buf),
            Source::Piped(pipe) => std::pin::Pin::new(pipe).poll_read(cx, buf),
        }
    }
}

impl ArtifactReader {
    pub async fn open(path: impl AsRef<Path>, compression: Compression) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let (source, pump) = match compression {
            Compression::None => (Source::Plain(file), None),
            Compression::Gzip => {
                let (reader, writer) = tokio::io::duplex(STREAM_BUFFER_BYTES);
                let pump = tokio::spawn(pump_gzip(file, writer));
                (Source::Piped(reader), Some(pump))
            }
        };
        Ok(Self {
            path,
            reader: BufReader::with_capacity(STREAM_BUFFER_BYTES, source),
            pump,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffered access to the decompressed stream
    pub fn reader(&mut self) -> &mut (impl tokio::io::AsyncBufRead + Unpin) {
        &mut self.reader
    }

    /// Surface any decompression error once the stream is drained
    pub async fn finish(mut self) -> io::Result<()> {
        match self.pump.take() {
            None => Ok(()),
            Some(pump) => {
                drop(self.reader);
                pump.await.map_err(io::Error::other)?
            }
        }
    }
}

/// Decode `file` into `pipe`; `write_all` parks while the reader lags
async fn pump_gzip(mut file: File, mut pipe: DuplexStream) -> io::Result<()> {
    let mut decoder = GzDecoder::new(Vec::with_capacity(STREAM_BUFFER_BYTES));
    let mut chunk = vec![0u8; STREAM_BUFFER_BYTES];
    loop {
        let read = file.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        decoder.write_all(&chunk[..read])?;
        let decoded = std::mem::take(decoder.get_mut());
        if !decoded.is_empty() {
            pipe.write_all(&decoded).await?;
        }
    }
    let decoded = decoder.finish()?;
    if !decoded.is_empty() {
        pipe.write_all(&decoded).await?;
    }
    pipe.shutdown().await
}
