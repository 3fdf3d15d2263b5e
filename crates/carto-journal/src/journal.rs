use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use carto_engine::Mutation;

use crate::error::{JournalError, Result};

/// Journal entry: one applied mutation with its transaction id and the
/// epoch second it was accepted at.
///
/// On-disk format:
/// ```text
/// [4 bytes: entry length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON-serialized JournalEntry)]
/// ```
///
/// The payload is JSON rather than a fixed binary layout: record bodies
/// carry arbitrary JSON property values, which need a self-describing
/// format to round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub tid: u64,
    pub at: i64,
    #[serde(flatten)]
    pub op: Mutation,
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Appends reach the OS immediately; `fsync` runs on a timer that
    /// calls [`Journal::sync`] at this interval.
    Periodic(Duration),
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::Periodic(Duration::from_secs(5))
    }
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Internal mutable state for the journal writer.
struct JournalWriter {
    writer: BufWriter<File>,
    /// Current write offset in the journal file.
    offset: u64,
}

/// Crash-recoverable mutation journal.
///
/// Entries are framed with a length prefix and a CRC32 checksum and
/// appended to a single file. On recovery the file is read front-to-back;
/// entries that fail the CRC check are skipped, and a torn tail (an entry
/// whose frame runs past end of file) is truncated away so later appends
/// start at a clean frame boundary.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) the journal file at the given path.
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let offset = file.metadata()?.len();
        let writer = BufWriter::new(file);

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter { writer, offset }),
            sync_mode,
        })
    }

    /// Append a single entry. Returns the byte offset of the entry.
    pub fn append(&self, entry: &JournalEntry) -> Result<u64> {
        let payload = serde_json::to_vec(entry)
            .map_err(|e| JournalError::Serialization(e.to_string()))?;

        let length = payload.len() as u32;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().expect("lock poisoned");
        let entry_offset = w.offset;

        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(&payload)?;

        w.writer.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }

        w.offset += HEADER_SIZE as u64 + payload.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Push buffered appends to durable storage. The periodic flush task
    /// calls this at the configured interval.
    pub fn sync(&self) -> Result<()> {
        let mut w = self.writer.lock().expect("lock poisoned");
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Recover all valid entries from the journal.
    ///
    /// Reads the file front-to-back. Entries that fail CRC validation are
    /// logged and skipped. Recovery stops at an invalid length or a frame
    /// running past end of file; anything after that point is a torn write
    /// from a crash and gets truncated so the next append starts clean.
    pub fn recover(&self) -> Result<Vec<JournalEntry>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header_buf = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let length = u32::from_le_bytes([header_buf[0], header_buf[1], header_buf[2], header_buf[3]]);
            let expected_crc = u32::from_le_bytes([header_buf[4], header_buf[5], header_buf[6], header_buf[7]]);

            if length == 0 || (offset + HEADER_SIZE as u64 + length as u64) > file_len {
                warn!(
                    offset,
                    length,
                    file_len,
                    "invalid journal entry length; stopping recovery"
                );
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal entry; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping entry"
                );
                offset += HEADER_SIZE as u64 + length as u64;
                continue;
            }

            match serde_json::from_slice::<JournalEntry>(&payload) {
                Ok(entry) => {
                    entries.push(entry);
                }
                Err(e) => {
                    warn!(offset, error = %e, "failed to deserialize journal entry; skipping");
                }
            }

            offset += HEADER_SIZE as u64 + length as u64;
        }

        drop(file);
        if offset < file_len {
            warn!(
                keep = offset,
                file_len,
                "truncating torn journal tail"
            );
            self.reset_writer_to(offset)?;
        }

        debug!(recovered = entries.len(), "journal recovery complete");
        Ok(entries)
    }

    /// Replace the journal with a compact equivalent stream.
    ///
    /// The entries are written to a sibling `.tmp` file, synced, and
    /// renamed over the live journal, so a crash mid-rewrite leaves the
    /// old file intact. Appends are blocked for the duration.
    pub fn rewrite(&self, entries: &[JournalEntry]) -> Result<u64> {
        let mut w = self.writer.lock().expect("lock poisoned");

        let tmp_path = self.path.with_extension("tmp");
        let tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut tmp_writer = BufWriter::new(tmp);

        let mut offset: u64 = 0;
        for entry in entries {
            let payload = serde_json::to_vec(entry)
                .map_err(|e| JournalError::Serialization(e.to_string()))?;
            tmp_writer.write_all(&(payload.len() as u32).to_le_bytes())?;
            tmp_writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            tmp_writer.write_all(&payload)?;
            offset += HEADER_SIZE as u64 + payload.len() as u64;
        }
        tmp_writer.flush()?;
        tmp_writer.get_ref().sync_all()?;
        drop(tmp_writer);

        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = offset;

        debug!(entries = entries.len(), bytes = offset, "journal rewritten");
        Ok(offset)
    }

    /// Current write offset.
    pub fn offset(&self) -> u64 {
        self.writer.lock().expect("lock poisoned").offset
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the file to `offset` and point the writer at it again.
    fn reset_writer_to(&self, offset: u64) -> Result<()> {
        let mut w = self.writer.lock().expect("lock poisoned");

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(offset)?;
        file.sync_all()?;
        drop(file);

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = offset;
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("offset", &self.offset())
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_engine::{Mutation, PutRequest};
    use carto_types::Position;

    fn make_entry(seq: u64) -> JournalEntry {
        JournalEntry {
            tid: seq,
            at: 1_700_000_000 + seq as i64,
            op: Mutation::PutRecord {
                layer: "cities".into(),
                key: format!("key-{seq}"),
                body: PutRequest {
                    position: Some(Position::new(48.85, 2.35)),
                    ..PutRequest::default()
                },
            },
        }
    }

    #[test]
    fn append_and_recover_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.journal");
        let journal = Journal::open(&path, SyncMode::default()).unwrap();

        let entry1 = make_entry(1);
        let entry2 = make_entry(2);
        let entry3 = make_entry(3);

        journal.append(&entry1).unwrap();
        journal.append(&entry2).unwrap();
        journal.append(&entry3).unwrap();

        let recovered = journal.recover().unwrap();
        assert_eq!(recovered.len(), 3);
        assert_eq!(recovered[0], entry1);
        assert_eq!(recovered[1], entry2);
        assert_eq!(recovered[2], entry3);
    }

    #[test]
    fn recover_empty_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.journal");
        let journal = Journal::open(&path, SyncMode::default()).unwrap();

        let recovered = journal.recover().unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn entry_payload_is_tagged_json() {
        let entry = JournalEntry {
            tid: 7,
            at: 42,
            op: Mutation::CreateLayer {
                layer: "cities".into(),
            },
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["tid"], 7);
        assert_eq!(value["at"], 42);
        assert_eq!(value["op"], "create_layer");
        assert_eq!(value["layer"], "cities");
    }

    #[test]
    fn crc_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.journal");
        let journal = Journal::open(&path, SyncMode::default()).unwrap();

        journal.append(&make_entry(1)).unwrap();
        journal.append(&make_entry(2)).unwrap();
        drop(journal);

        // Flip a byte in the first entry's payload (byte 8 is the first
        // payload byte).
        {
            let mut file = OpenOptions::new()
                .write(true)
                .read(true)
                .open(&path)
                .unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE as u64)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let journal = Journal::open(&path, SyncMode::default()).unwrap();
        let recovered = journal.recover().unwrap();

        // The corrupted entry is skipped; the one after it survives.
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0], make_entry(2));
    }

    #[test]
    fn recovery_truncates_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.journal");
        let journal = Journal::open(&path, SyncMode::default()).unwrap();

        journal.append(&make_entry(1)).unwrap();
        let tail_start = journal.append(&make_entry(2)).unwrap();
        let total_len = journal.offset();
        drop(journal);

        // Chop the file mid-entry.
        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(total_len - 4).unwrap();
        }

        let journal = Journal::open(&path, SyncMode::default()).unwrap();
        let recovered = journal.recover().unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0], make_entry(1));
        assert_eq!(journal.offset(), tail_start);

        // Appends after recovery land on a clean boundary.
        journal.append(&make_entry(3)).unwrap();
        let recovered = journal.recover().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[1], make_entry(3));
    }

    #[test]
    fn rewrite_replaces_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewrite.journal");
        let journal = Journal::open(&path, SyncMode::default()).unwrap();

        for seq in 1..=10 {
            journal.append(&make_entry(seq)).unwrap();
        }
        let before = journal.offset();

        // A compacted stream: only the last two entries survive.
        let compact = vec![make_entry(9), make_entry(10)];
        let after = journal.rewrite(&compact).unwrap();
        assert!(after < before);
        assert_eq!(journal.offset(), after);

        let recovered = journal.recover().unwrap();
        assert_eq!(recovered, compact);

        // The journal keeps accepting appends afterwards.
        journal.append(&make_entry(11)).unwrap();
        assert_eq!(journal.recover().unwrap().len(), 3);
    }

    #[test]
    fn append_returns_increasing_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsets.journal");
        let journal = Journal::open(&path, SyncMode::default()).unwrap();

        let off1 = journal.append(&make_entry(1)).unwrap();
        let off2 = journal.append(&make_entry(2)).unwrap();
        let off3 = journal.append(&make_entry(3)).unwrap();

        assert_eq!(off1, 0);
        assert!(off2 > off1);
        assert!(off3 > off2);
    }

    #[test]
    fn sync_every_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.journal");
        let journal = Journal::open(&path, SyncMode::EveryWrite).unwrap();

        journal.append(&make_entry(1)).unwrap();
        journal.sync().unwrap();
        let recovered = journal.recover().unwrap();
        assert_eq!(recovered.len(), 1);
    }
}
