// geowarden/src/consumer/source.rs
//
// Partitioned stream sources.
//
// A source exposes a fixed set of shards; each shard is read through an
// opaque cursor. A fetch returns a batch of raw records plus the cursor for
// the next fetch, or no cursor once the shard is permanently closed.
//
// FileStreamSource maps a directory of JSONL files onto that model:
//   <dir>/<shard>.jsonl   one file per shard, one record per line
//   cursor                byte offset of the next unread line
// In follow mode files are tailed forever (EOF = empty batch, same cursor).
// Otherwise reaching EOF closes the shard.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use clap::ValueEnum;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::error::FetchError;

pub type ShardId = String;

/// Position within one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(pub u64);

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch {
    pub records: Vec<Bytes>,
    /// None once the shard is closed and fully read.
    pub next:    Option<Cursor>,
}

#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn shards(&self) -> Result<Vec<ShardId>, FetchError>;

    async fn initial_cursor(&self, shard: &str) -> Result<Cursor, FetchError>;

    async fn fetch(&self, shard: &str, cursor: Cursor, limit: usize) -> Result<FetchBatch, FetchError>;
}

// ── JSONL directory source ────────────────────────────────────────────────────

/// Where a fresh worker starts reading a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StartPosition {
    TrimHorizon, // oldest record
    Latest,      // only records appended after startup
}

pub struct FileStreamSource {
    dir:    PathBuf,
    follow: bool,
    start:  StartPosition,
}

impl FileStreamSource {
    pub fn new(dir: impl Into<PathBuf>, follow: bool, start: StartPosition) -> Self {
        Self { dir: dir.into(), follow, start }
    }

    fn shard_path(&self, shard: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", shard))
    }

    async fn require(&self, shard: &str) -> Result<PathBuf, FetchError> {
        let path = self.shard_path(shard);
        if !tokio::fs::try_exists(&path).await? {
            return Err(FetchError::ShardNotFound(shard.to_string()));
        }
        Ok(path)
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end   = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn shard_id(path: &Path) -> Option<ShardId> {
    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

#[async_trait]
impl StreamSource for FileStreamSource {
    async fn shards(&self) -> Result<Vec<ShardId>, FetchError> {
        let mut out     = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = shard_id(&entry.path()) {
                out.push(id);
            }
        }
        out.sort();
        Ok(out)
    }

    async fn initial_cursor(&self, shard: &str) -> Result<Cursor, FetchError> {
        let path = self.require(shard).await?;
        match self.start {
            StartPosition::TrimHorizon => Ok(Cursor(0)),
            StartPosition::Latest      => Ok(Cursor(tokio::fs::metadata(&path).await?.len())),
        }
    }

    async fn fetch(&self, shard: &str, cursor: Cursor, limit: usize) -> Result<FetchBatch, FetchError> {
        let path = self.require(shard).await?;
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(SeekFrom::Start(cursor.0)).await?;

        let mut reader  = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset  = cursor.0;
        let mut at_eof  = false;
        let mut line    = Vec::new();

        while records.len() < limit {
            line.clear();
            let n = reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                at_eof = true;
                break;
            }
            if line.last() != Some(&b'\n') && self.follow {
                // writer is mid-line, pick it up on the next fetch
                at_eof = true;
                break;
            }
            offset += n as u64;
            // raw bytes, decoding (and rejecting) them is the handler's job
            let record = trim_ascii(&line);
            if !record.is_empty() {
                records.push(Bytes::copy_from_slice(record));
            }
        }

        let next = if at_eof && !self.follow { None } else { Some(Cursor(offset)) };
        Ok(FetchBatch { records, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("geowarden-{}-{}", tag, std::process::id()));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::write(self.0.join(name), content).unwrap();
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn strings(batch: &FetchBatch) -> Vec<String> {
        batch.records.iter().map(|r| String::from_utf8_lossy(r).into_owned()).collect()
    }

    #[tokio::test]
    async fn lists_jsonl_files_as_shards() {
        let dir = TempDir::new("shards");
        dir.write("shard-b.jsonl", "");
        dir.write("shard-a.jsonl", "");
        dir.write("notes.txt", "");

        let source = FileStreamSource::new(&dir.0, false, StartPosition::TrimHorizon);
        assert_eq!(source.shards().await.unwrap(), vec!["shard-a", "shard-b"]);
    }

    #[tokio::test]
    async fn reads_in_batches_and_closes_at_eof() {
        let dir = TempDir::new("batches");
        dir.write("s.jsonl", "{\"n\":1}\n\n{\"n\":2}\n{\"n\":3}\n");
        let source = FileStreamSource::new(&dir.0, false, StartPosition::TrimHorizon);

        let start = source.initial_cursor("s").await.unwrap();
        assert_eq!(start, Cursor(0));

        let first = source.fetch("s", start, 2).await.unwrap();
        assert_eq!(strings(&first), vec!["{\"n\":1}", "{\"n\":2}"]);
        let next = first.next.unwrap();

        let second = source.fetch("s", next, 2).await.unwrap();
        assert_eq!(strings(&second), vec!["{\"n\":3}"]);
        assert_eq!(second.next, None);
    }

    #[tokio::test]
    async fn follow_mode_waits_for_complete_lines() {
        let dir = TempDir::new("follow");
        dir.write("s.jsonl", "{\"n\":1}\n{\"n\":");
        let source = FileStreamSource::new(&dir.0, true, StartPosition::TrimHorizon);

        let batch = source.fetch("s", Cursor(0), 10).await.unwrap();
        assert_eq!(strings(&batch), vec!["{\"n\":1}"]);
        assert_eq!(batch.next, Some(Cursor(8)));

        dir.write("s.jsonl", "{\"n\":1}\n{\"n\":2}\n");
        let batch = source.fetch("s", Cursor(8), 10).await.unwrap();
        assert_eq!(strings(&batch), vec!["{\"n\":2}"]);
        assert_eq!(batch.next, Some(Cursor(16)));

        let idle = source.fetch("s", Cursor(16), 10).await.unwrap();
        assert!(idle.records.is_empty());
        assert_eq!(idle.next, Some(Cursor(16)));
    }

    #[tokio::test]
    async fn undecodable_line_is_passed_through_not_fatal() {
        let dir = TempDir::new("binary");
        std::fs::write(dir.0.join("s.jsonl"), b"{\"n\":1}\n\xff\xfe\n{\"n\":2}\n").unwrap();
        let source = FileStreamSource::new(&dir.0, false, StartPosition::TrimHorizon);

        let batch = source.fetch("s", Cursor(0), 10).await.unwrap();
        assert_eq!(batch.records.len(), 3);
        assert_eq!(&batch.records[0][..], b"{\"n\":1}");
        assert_eq!(&batch.records[1][..], b"\xff\xfe");
        assert_eq!(&batch.records[2][..], b"{\"n\":2}");
        assert_eq!(batch.next, None);

        // resuming right after the first line also moves past the bad one
        let resumed = source.fetch("s", Cursor(8), 1).await.unwrap();
        assert_eq!(&resumed.records[0][..], b"\xff\xfe");
        assert_eq!(resumed.next, Some(Cursor(11)));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(trim_ascii(b"  {}\r\n"), b"{}");
        assert_eq!(trim_ascii(b" \n"), b"");
    }

    #[tokio::test]
    async fn latest_starts_at_end_of_file() {
        let dir = TempDir::new("latest");
        dir.write("s.jsonl", "{\"n\":1}\n");
        let source = FileStreamSource::new(&dir.0, true, StartPosition::Latest);
        assert_eq!(source.initial_cursor("s").await.unwrap(), Cursor(8));
    }

    #[tokio::test]
    async fn missing_shard_is_an_error() {
        let dir    = TempDir::new("missing");
        let source = FileStreamSource::new(&dir.0, false, StartPosition::TrimHorizon);
        assert!(matches!(
            source.fetch("nope", Cursor(0), 10).await,
            Err(FetchError::ShardNotFound(_))
        ));
    }
}
