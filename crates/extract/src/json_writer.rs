//! Incremental writer for one large JSON object.
//!
//! Output shape, one member per line:
//!
//! ```text
//! {
//!  "pkg.tgz/a.js": {...},
//!  "pkg.tgz/b.js": "minified"
//! }
//! ```
//!
//! The line-per-member layout lets several objects be merged later by
//! splicing member lines (see [`member_line`]) without parsing them.

use crate::codec::ArtifactWriter;
use serde::Serialize;
use std::io;

pub struct JsonObjectWriter<'a> {
    sink: &'a mut ArtifactWriter,
    members: u64,
}

impl<'a> JsonObjectWriter<'a> {
    /// Write the opening brace
    pub async fn begin(sink: &'a mut ArtifactWriter) -> io::Result<Self> {
        sink.write_str("{").await?;
        Ok(Self { sink, members: 0 })
    }

    pub fn members(&self) -> u64 {
        self.members
    }

    /// Serialize one `"key": value` member
    pub async fn member<V: Serialize + ?Sized>(&mut self, key: &str, value: &V) -> io::Result<()> {
        let mut line = Vec::new();
        line.extend_from_slice(self.separator().as_bytes());
        line.push(b' ');
        serde_json::to_writer(&mut line, key)?;
        line.extend_from_slice(b": ");
        serde_json::to_writer(&mut line, value)?;
        self.sink.write_all(&line).await?;
        self.members += 1;
        Ok(())
    }

    /// Append an already-encoded `"key": value` member
    pub async fn raw_member(&mut self, member: &str) -> io::Result<()> {
        let separator = self.separator();
        self.sink.write_str(separator).await?;
        self.sink.write_str(member).await?;
        self.members += 1;
        Ok(())
    }

    /// Write the closing brace; returns the member count
    pub async fn finish(self) -> io::Result<u64> {
        self.sink.write_str("\n}\n").await?;
        Ok(self.members)
    }

    fn separator(&self) -> &'static str {
        if self.members == 0 {
            "\n"
        } else {
            ",\n"
        }
    }
}

/// Member text of one line of a line-per-member object, or `None` for
/// structural and blank lines. A trailing member comma is dropped.
pub fn member_line(line: &str) -> Option<&str> {
    if line == "{" || line == "}" || line.trim().is_empty() {
        return None;
    }
    Some(line.strip_suffix(',').unwrap_or(line))
}
