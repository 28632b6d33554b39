//! Flow-controlled copies from a byte or line source into an artifact sink.
//!
//! Every write awaits [`ArtifactWriter::write_all`], which only returns once
//! the bounded sink buffer has room, so a slow sink pauses the reader.

use crate::codec::{ArtifactWriter, STREAM_BUFFER_BYTES};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

/// Code-dump lines longer than this many UTF-16 code units are skipped
pub const MAX_DUMP_LINE_CHARS: usize = 500;

/// Byte budget that can still hold [`MAX_DUMP_LINE_CHARS`] UTF-16 units
const MAX_DUMP_LINE_BYTES: usize = MAX_DUMP_LINE_CHARS * 4 + 1;

/// Copy raw bytes verbatim; returns the number of bytes copied
pub async fn copy_bytes<R: AsyncRead + Unpin>(
    reader: &mut R,
    sink: &mut ArtifactWriter,
) -> io::Result<u64> {
    let mut chunk = vec![0u8; STREAM_BUFFER_BYTES];
    let mut copied = 0u64;
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok(copied);
        }
        sink.write_all(&chunk[..read]).await?;
        copied += read as u64;
    }
}

/// A line read with a length cap
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Text(String),
    /// Longer than the cap; contents were discarded while reading
    Oversized,
}

/// Splits a byte stream on `\n`, `\r\n` or a lone `\r`, decoding lossily
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    limit: usize,
    /// Previous line ended on `\r`; a leading `\n` belongs to it
    after_cr: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, usize::MAX)
    }

    /// Lines over `limit` bytes are reported as [`Line::Oversized`] without
    /// being buffered
    pub fn with_limit(inner: R, limit: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            limit,
            after_cr: false,
        }
    }

    pub async fn next_line(&mut self) -> io::Result<Option<Line>> {
        self.buf.clear();
        if self.after_cr {
            self.after_cr = false;
            if self.inner.fill_buf().await?.first() == Some(&b'\n') {
                self.inner.consume(1);
            }
        }
        let mut oversized = false;
        let mut seen_any = false;
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if !seen_any {
                    return Ok(None);
                }
                break;
            }
            seen_any = true;
            let newline = available
                .iter()
                .position(|byte| *byte == b'\n' || *byte == b'\r');
            let (content, consumed) = match newline {
                Some(idx) => {
                    self.after_cr = available[idx] == b'\r';
                    (&available[..idx], idx + 1)
                }
                None => (available, available.len()),
            };
            if !oversized {
                if self.buf.len() + content.len() > self.limit {
                    oversized = true;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(content);
                }
            }
            self.inner.consume(consumed);
            if newline.is_some() {
                break;
            }
        }
        if oversized {
            return Ok(Some(Line::Oversized));
        }
        Ok(Some(Line::Text(String::from_utf8_lossy(&self.buf).into_owned())))
    }

    /// Next line, treating the cap as absent
    pub async fn next_text(&mut self) -> io::Result<Option<String>> {
        match self.next_line().await? {
            None => Ok(None),
            Some(Line::Text(text)) => Ok(Some(text)),
            Some(Line::Oversized) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", self.limit),
            )),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DumpStats {
    pub lines_read: u64,
    pub lines_written: u64,
}

/// Write `<label>:<line number>:<line>\n` for every line worth indexing.
///
/// Line numbers are 1-based and count skipped lines too.
pub async fn dump_numbered_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    label: &str,
    sink: &mut ArtifactWriter,
) -> io::Result<DumpStats> {
    let mut lines = LineReader::with_limit(reader, MAX_DUMP_LINE_BYTES);
    let mut stats = DumpStats::default();
    while let Some(line) = lines.next_line().await? {
        stats.lines_read += 1;
        let Line::Text(text) = line else {
            continue;
        };
        if text.encode_utf16().count() > MAX_DUMP_LINE_CHARS || text.trim().is_empty() {
            continue;
        }
        sink.write_str(&format!("{label}:{}:{text}\n", stats.lines_read))
            .await?;
        stats.lines_written += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    async fn collect_lines(input: &[u8], limit: usize) -> Vec<Line> {
        // Tiny buffer so lines straddle fill_buf boundaries
        let mut reader = LineReader::with_limit(BufReader::with_capacity(3, input), limit);
        let mut out = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            out.push(line);
        }
        out
    }

    fn text(s: &str) -> Line {
        Line::Text(s.to_string())
    }

    #[tokio::test]
    async fn splits_lines_like_readline() {
        assert_eq!(
            collect_lines(b"one\r\ntwo\n\nthree", usize::MAX).await,
            vec![text("one"), text("two"), text(""), text("three")]
        );
        assert!(collect_lines(b"", usize::MAX).await.is_empty());
        assert_eq!(collect_lines(b"x\n", usize::MAX).await, vec![text("x")]);
    }

    #[tokio::test]
    async fn lone_carriage_return_ends_a_line() {
        assert_eq!(
            collect_lines(b"a\rb\r\r\nc\r", usize::MAX).await,
            vec![text("a"), text("b"), text(""), text("c")]
        );
    }

    #[tokio::test]
    async fn old_mac_line_endings_are_numbered() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mac.txt");
        let mut sink = ArtifactWriter::create(&path, Compression::None).await.unwrap();
        dump_numbered_lines(&b"var a;\r\rvar b;\r"[..], "p/m.js", &mut sink)
            .await
            .unwrap();
        sink.finish().await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "p/m.js:1:var a;\np/m.js:3:var b;\n"
        );
    }

    #[tokio::test]
    async fn line_length_counts_utf16_units() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wide.txt");
        let mut sink = ArtifactWriter::create(&path, Compression::None).await.unwrap();
        let fits = "\u{1F600}".repeat(250);
        let over = "\u{1F600}".repeat(251);
        let source = format!("{fits}\n{over}\n");
        dump_numbered_lines(source.as_bytes(), "p", &mut sink)
            .await
            .unwrap();
        sink.finish().await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            format!("p:1:{fits}\n")
        );
    }

    #[tokio::test]
    async fn oversized_lines_are_not_buffered() {
        let input = format!("short\n{}\nafter", "z".repeat(50));
        assert_eq!(
            collect_lines(input.as_bytes(), 10).await,
            vec![text("short"), Line::Oversized, text("after")]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        assert_eq!(
            collect_lines(b"ok\xff\n", usize::MAX).await,
            vec![text("ok\u{fffd}")]
        );
    }

    #[tokio::test]
    async fn dump_skips_blank_and_long_lines_but_counts_them() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slim.code.js.txt");
        let mut sink = ArtifactWriter::create(&path, Compression::None).await.unwrap();

        let long = "x".repeat(501);
        let exact = "y".repeat(500);
        let source = format!("var a = 1;\n   \n{long}\n{exact}\n\tb();\n");
        let stats = dump_numbered_lines(source.as_bytes(), "p.tgz/a.js", &mut sink)
            .await
            .unwrap();
        sink.finish().await.unwrap();

        assert_eq!(
            stats,
            DumpStats {
                lines_read: 5,
                lines_written: 3
            }
        );
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            written,
            format!("p.tgz/a.js:1:var a = 1;\np.tgz/a.js:4:{exact}\np.tgz/a.js:5:\tb();\n")
        );
    }

    #[tokio::test]
    async fn multibyte_line_within_char_limit_is_kept() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.txt");
        let mut sink = ArtifactWriter::create(&path, Compression::None).await.unwrap();
        let wide = "é".repeat(500);
        dump_numbered_lines(wide.as_bytes(), "p", &mut sink)
            .await
            .unwrap();
        sink.finish().await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            format!("p:1:{wide}\n")
        );
    }

    #[tokio::test]
    async fn copy_bytes_is_verbatim() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("copy.bin");
        let mut sink = ArtifactWriter::create(&path, Compression::None).await.unwrap();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let copied = copy_bytes(&mut payload.as_slice(), &mut sink).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(copied, payload.len() as u64);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), payload);
    }
}
