//! Utility functions for shard files
//!
//! A shard file is a small header followed by length- and checksum-framed
//! JSON records, one per entry:
//!
//! ```text
//! magic(4) version(4) next_seq(8) | len(4) crc32(4) json(len) | ...
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use tracing::warn;

use crate::entry::LogEntry;
use crate::shard::{ShardId, ShardLog, StoreError, ShardResult, SHARD_MAGIC, SHARD_VERSION};

/// Bytes taken by the file header
const HEADER_LEN: u64 = 16;

/// Bytes taken by a record's length and checksum
const RECORD_PREFIX_LEN: u64 = 8;

/// Contents of a shard file as read from disk
#[derive(Debug)]
pub struct LoadedShard {
    /// Entries recovered from the file
    pub log: ShardLog,
    /// Length of the valid prefix, set when a partial record was dropped
    pub torn_at: Option<u64>,
}

/// Get the path for a shard file
pub fn shard_path(base_dir: &Path, shard_id: ShardId) -> PathBuf {
    base_dir.join("shards").join(format!("{:05}.shard", shard_id))
}

/// Compute the checksum of a record body
fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn write_header<W: Write>(writer: &mut W, next_seq: u64) -> io::Result<()> {
    writer.write_all(SHARD_MAGIC)?;
    writer.write_u32::<LittleEndian>(SHARD_VERSION)?;
    writer.write_u64::<LittleEndian>(next_seq)?;
    Ok(())
}

fn write_record<W: Write>(writer: &mut W, entry: &LogEntry) -> ShardResult<()> {
    let data = serde_json::to_vec(entry)?;
    writer.write_u32::<LittleEndian>(data.len() as u32)?;
    writer.write_u32::<LittleEndian>(checksum(&data))?;
    writer.write_all(&data)?;
    Ok(())
}

/// Write a complete shard file, replacing any existing one atomically
pub fn save_shard(path: &Path, log: &ShardLog) -> ShardResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::file_error(parent, &e))?;
    }

    let tmp_path = path.with_extension("shard.tmp");
    {
        let file = File::create(&tmp_path).map_err(|e| StoreError::file_error(&tmp_path, &e))?;
        let mut writer = BufWriter::new(file);

        write_header(&mut writer, log.next_seq())?;
        for entry in log.entries() {
            write_record(&mut writer, entry)?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path).map_err(|e| StoreError::file_error(path, &e))?;
    Ok(())
}

/// Append one entry to an existing shard file
pub fn append_record(path: &Path, entry: &LogEntry) -> ShardResult<()> {
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| StoreError::file_error(path, &e))?;

    let mut writer = BufWriter::new(file);
    write_record(&mut writer, entry)?;
    writer.flush()?;
    Ok(())
}

/// Load a shard file.
///
/// A record cut short at the end of the file (an interrupted append) is
/// dropped and reported through [`LoadedShard::torn_at`]; a record whose
/// checksum does not match is corruption.
pub fn load_shard(path: &Path) -> ShardResult<LoadedShard> {
    let file = File::open(path).map_err(|e| StoreError::file_error(path, &e))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != *SHARD_MAGIC {
        return Err(StoreError::corruption(path, format!("invalid header {:?}", magic)));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != SHARD_VERSION {
        return Err(StoreError::corruption(path, format!("unsupported version {}", version)));
    }

    let next_seq = reader.read_u64::<LittleEndian>()?;

    let mut entries = Vec::new();
    let mut valid_len = HEADER_LEN;
    let mut torn_at = None;

    loop {
        let len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // A clean end, or fewer than four bytes of a length prefix
                if reader.get_ref().metadata()?.len() > valid_len {
                    torn_at = Some(valid_len);
                }
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let expected = match reader.read_u32::<LittleEndian>() {
            Ok(crc) => crc,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                torn_at = Some(valid_len);
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                torn_at = Some(valid_len);
                break;
            }
            Err(e) => return Err(e.into()),
        }

        if checksum(&data) != expected {
            return Err(StoreError::corruption(
                path,
                format!("checksum mismatch in record {}", entries.len()),
            ));
        }

        entries.push(serde_json::from_slice::<LogEntry>(&data)?);
        valid_len += RECORD_PREFIX_LEN + len as u64;
    }

    if let Some(offset) = torn_at {
        warn!(path = %path.display(), offset, "dropping partial record at end of shard file");
    }

    Ok(LoadedShard {
        log: ShardLog::from_parts(entries, next_seq),
        torn_at,
    })
}

/// Cut a shard file back to its first `len` bytes
pub fn truncate_shard(path: &Path, len: u64) -> ShardResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| StoreError::file_error(path, &e))?;
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}
