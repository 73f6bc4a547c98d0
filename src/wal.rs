//! Append-only write-ahead log, the durability authority for a node.
//!
//! Records are newline-terminated text lines, `SET,key,value` or `DEL,key`.
//! The op and key may not contain commas (the node rejects such keys at the
//! HTTP boundary); the value is captured as the remainder of the line, so it
//! may contain commas freely. This asymmetry is a deliberate exception to the
//! plain split, not a general escaping scheme.
//!
//! Once appended, a record is never rewritten or reordered. The store's
//! post-recovery content must equal a full replay of this log in append
//! order, last write per key winning.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

/// Mutation kind carried by a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Del,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Set => "SET",
            Op::Del => "DEL",
        }
    }
}

/// One durable mutation. `value` is empty and ignored for [`Op::Del`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub op: Op,
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op: Op::Set,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self {
            op: Op::Del,
            key: key.into(),
            value: String::new(),
        }
    }

    fn encode(&self) -> String {
        match self.op {
            Op::Set => format!("{},{},{}\n", self.op.as_str(), self.key, self.value),
            Op::Del => format!("{},{}\n", self.op.as_str(), self.key),
        }
    }

    /// Parses one log line. Returns `None` for lines that do not carry a
    /// well-formed record (wrong field count, unknown op).
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, ',');
        let op = fields.next()?;
        let key = fields.next()?.to_string();
        match op {
            "SET" => {
                let value = fields.next()?.to_string();
                Some(Record { op: Op::Set, key, value })
            }
            // A trailing field on DEL is ignored, matching the write format's
            // promise that DEL carries no value.
            "DEL" => Some(Record::del(key)),
            _ => None,
        }
    }
}

/// When the log is flushed to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// `sync_data` after every append. Slower, no loss window.
    Always,
    /// Flush to the OS only. Faster; a crash can lose the last few writes.
    Buffered,
}

/// How replay treats malformed lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Skip malformed lines, warn, and count them. Prioritizes availability.
    Lenient,
    /// Fail startup on the first malformed line.
    Strict,
}

/// Open append handle to the log file.
pub struct Wal {
    file: File,
    durability: Durability,
}

impl Wal {
    /// Opens (or creates) the log file in append mode.
    pub async fn open(path: impl AsRef<Path>, durability: Durability) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open wal file {}", path.display()))?;
        Ok(Self { file, durability })
    }

    /// Persists one record. The caller must not apply the corresponding store
    /// mutation unless this returns `Ok`, so the store never runs ahead of
    /// the log.
    pub async fn append(&mut self, record: &Record) -> Result<()> {
        self.file
            .write_all(record.encode().as_bytes())
            .await
            .context("failed to append wal record")?;
        self.file.flush().await.context("failed to flush wal")?;
        if self.durability == Durability::Always {
            self.file
                .sync_data()
                .await
                .context("failed to sync wal to disk")?;
        }
        Ok(())
    }
}

/// Outcome of reading the log from the beginning.
#[derive(Debug)]
pub struct Replay {
    /// Records in original append order.
    pub records: Vec<Record>,
    /// Malformed lines encountered and skipped (lenient mode only).
    pub skipped: usize,
}

/// Reads every record from the start of the log file.
///
/// A missing file is an empty log, so first boot needs no special casing.
pub async fn replay(path: impl AsRef<Path>, recovery: Recovery) -> Result<Replay> {
    let path = path.as_ref();
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Replay {
                records: Vec::new(),
                skipped: 0,
            })
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open wal file {}", path.display()))
        }
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut line_no = 0usize;
    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await.context("failed to read wal line")? {
        line_no += 1;
        if line.is_empty() {
            continue;
        }
        match Record::parse(&line) {
            Some(record) => records.push(record),
            None => match recovery {
                Recovery::Lenient => {
                    warn!(line = line_no, "skipping malformed wal record");
                    skipped += 1;
                }
                Recovery::Strict => {
                    bail!("malformed wal record at line {line_no}: {line:?}")
                }
            },
        }
    }

    Ok(Replay { records, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wal() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("data.log");
        (dir, path)
    }

    #[tokio::test]
    async fn append_then_replay_preserves_order() {
        let (_dir, path) = temp_wal();
        let mut wal = Wal::open(&path, Durability::Buffered).await.expect("open wal");
        wal.append(&Record::set("a", "1")).await.expect("append");
        wal.append(&Record::set("b", "2")).await.expect("append");
        wal.append(&Record::del("a")).await.expect("append");

        let replay = replay(&path, Recovery::Strict).await.expect("replay");
        assert_eq!(
            replay.records,
            vec![Record::set("a", "1"), Record::set("b", "2"), Record::del("a")]
        );
        assert_eq!(replay.skipped, 0);
    }

    #[tokio::test]
    async fn value_may_contain_commas() {
        let (_dir, path) = temp_wal();
        let mut wal = Wal::open(&path, Durability::Buffered).await.expect("open wal");
        wal.append(&Record::set("csv", "a,b,c")).await.expect("append");

        let replay = replay(&path, Recovery::Strict).await.expect("replay");
        assert_eq!(replay.records, vec![Record::set("csv", "a,b,c")]);
    }

    #[tokio::test]
    async fn lenient_replay_skips_and_counts_malformed_lines() {
        let (_dir, path) = temp_wal();
        tokio::fs::write(&path, "SET,a,1\ngarbage\nSET,b,2\n")
            .await
            .expect("write wal");

        let replay = replay(&path, Recovery::Lenient).await.expect("replay");
        assert_eq!(
            replay.records,
            vec![Record::set("a", "1"), Record::set("b", "2")]
        );
        assert_eq!(replay.skipped, 1);
    }

    #[tokio::test]
    async fn strict_replay_fails_on_malformed_line() {
        let (_dir, path) = temp_wal();
        tokio::fs::write(&path, "SET,a,1\nBOGUS,x,y\n")
            .await
            .expect("write wal");

        let err = replay(&path, Recovery::Strict).await.expect_err("should fail");
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn missing_file_is_empty_log() {
        let (_dir, path) = temp_wal();
        let replay = replay(&path, Recovery::Strict).await.expect("replay");
        assert!(replay.records.is_empty());
        assert_eq!(replay.skipped, 0);
    }

    #[tokio::test]
    async fn sync_always_mode_appends_normally() {
        let (_dir, path) = temp_wal();
        let mut wal = Wal::open(&path, Durability::Always).await.expect("open wal");
        wal.append(&Record::set("k", "v")).await.expect("append");

        let replay = replay(&path, Recovery::Strict).await.expect("replay");
        assert_eq!(replay.records, vec![Record::set("k", "v")]);
    }

    #[tokio::test]
    async fn reopened_wal_appends_after_existing_records() {
        let (_dir, path) = temp_wal();
        {
            let mut wal = Wal::open(&path, Durability::Buffered).await.expect("open wal");
            wal.append(&Record::set("a", "1")).await.expect("append");
        }
        {
            let mut wal = Wal::open(&path, Durability::Buffered).await.expect("reopen wal");
            wal.append(&Record::set("a", "2")).await.expect("append");
        }

        let replay = replay(&path, Recovery::Strict).await.expect("replay");
        assert_eq!(
            replay.records,
            vec![Record::set("a", "1"), Record::set("a", "2")]
        );
    }
}
