use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Fill `buf` completely. `Ok(false)` on a clean or torn end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact record and its encoded size, or `None` at the end of the valid prefix.
fn read_record(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None); // torn tail
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    let size = 8 + payload.len() as u64;
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, size)))
}

/// Append-only write-ahead log of marketplace events.
///
/// Each record is `[u32 len][bincode Event][u32 crc32]`, little-endian. A record cut short
/// by a crash fails its length or CRC check and ends replay there. Opening the log cuts
/// such a tail off, so new records always follow the last intact one.
pub struct Wal {
    file: File,
    /// Encoded records not yet written. Dropped as a whole when a commit fails.
    pending: Vec<u8>,
    pending_records: u64,
    /// Length of the file up to the last committed record.
    durable_len: u64,
    /// Set when a failed commit could not be rolled back. Every later append fails.
    broken: bool,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(wal, _)| wal)
    }

    /// Replay the log, truncate anything after the valid prefix and open it for appends.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = Self::scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        if len > valid_len {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = len - valid_len,
                "truncating WAL after last intact record"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            file,
            pending: Vec::new(),
            pending_records: 0,
            durable_len: valid_len,
            broken: false,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        };
        Ok((wal, events))
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one record. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::other("WAL unusable after failed rollback"));
        }
        encode_event(&mut self.pending, event)?;
        self.pending_records += 1;
        Ok(())
    }

    /// Write the buffer and fsync. One call commits a whole group. On failure the group is
    /// discarded and the file is cut back to the last committed record.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::other("WAL unusable after failed rollback"));
        }
        let written = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.sync_all());
        match written {
            Ok(()) => {
                self.durable_len += self.pending.len() as u64;
                self.appends_since_compact += self.pending_records;
                self.pending.clear();
                self.pending_records = 0;
                Ok(())
            }
            Err(e) => {
                self.discard_pending();
                Err(e)
            }
        }
    }

    /// Drop buffered records and any of their bytes that reached the file.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_records = 0;
        let truncated = self
            .file
            .set_len(self.durable_len)
            .and_then(|()| self.file.sync_all());
        if let Err(e) = truncated {
            tracing::error!(path = %self.path.display(), "WAL rollback failed: {e}");
            self.broken = true;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write the compacted log next to `path` and fsync it. The live log is untouched.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.file = file;
        self.pending.clear();
        self.pending_records = 0;
        self.broken = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in the log, oldest first. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Self::scan(path).map(|(events, _)| events)
    }

    /// Intact events plus the byte length of the prefix holding them.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0u64;
        while let Some((event, size)) = read_record(&mut reader)? {
            events.push(event);
            valid_len += size;
        }
        if !events.is_empty() {
            tracing::debug!(path = %path.display(), records = events.len(), "WAL replayed");
        }
        Ok((events, valid_len))
    }
}
