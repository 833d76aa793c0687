//! C4: Chunk Store.
//!
//! Sparse chunked file content. A file's bytes are stored as up-to-4096-byte
//! blobs keyed by `(inode_id, chunk_num)`; a missing row for a chunk index
//! inside the file's size is a hole and reads back as zeros.

use rusqlite::{params, OptionalExtension, Transaction};

use crate::error::{FsError, FsResult};
use crate::inode;
use crate::storage::now;

pub const CHUNK_SIZE: u64 = 4096;

fn chunk_of(offset: u64) -> u64 {
    offset / CHUNK_SIZE
}

fn load_chunk(txn: &Transaction, inode_id: u64, chunk_num: u64) -> FsResult<Option<Vec<u8>>> {
    let data = txn
        .query_row(
            "SELECT data FROM file_data WHERE inode_id = ?1 AND chunk_num = ?2",
            params![inode_id, chunk_num],
            |row| row.get(0),
        )
        .optional()?;
    Ok(data)
}

fn store_chunk(txn: &Transaction, inode_id: u64, chunk_num: u64, data: &[u8]) -> FsResult<()> {
    txn.execute(
        "INSERT INTO file_data (inode_id, chunk_num, data) VALUES (?1, ?2, ?3)
         ON CONFLICT(inode_id, chunk_num) DO UPDATE SET data = excluded.data",
        params![inode_id, chunk_num, data],
    )?;
    Ok(())
}

/// Writes `bytes` at `offset`, growing `size`/`mtime` as needed. Returns the
/// number of bytes written (always `bytes.len()`).
pub fn write(txn: &Transaction, inode_id: u64, offset: u64, bytes: &[u8]) -> FsResult<u32> {
    let current = inode::fetch(txn, inode_id)?.ok_or(FsError::NotFound)?;
    if bytes.is_empty() {
        return Ok(0);
    }
    let write_end = offset + bytes.len() as u64;
    let new_size = current.size.max(write_end);
    inode::update_size(txn, inode_id, new_size, now())?;

    let start_chunk = chunk_of(offset);
    let end_chunk = chunk_of(write_end - 1);

    for chunk_num in start_chunk..=end_chunk {
        let chunk_start = chunk_num * CHUNK_SIZE;
        let chunk_end = chunk_start + CHUNK_SIZE;
        let overlap_start = offset.max(chunk_start);
        let overlap_end = write_end.min(chunk_end);
        if overlap_start >= overlap_end {
            continue;
        }

        let mut buf = match load_chunk(txn, inode_id, chunk_num)? {
            Some(mut existing) => {
                if (existing.len() as u64) < CHUNK_SIZE {
                    existing.resize(CHUNK_SIZE as usize, 0);
                }
                existing
            }
            None => vec![0u8; CHUNK_SIZE as usize],
        };

        let in_chunk_start = (overlap_start - chunk_start) as usize;
        let in_chunk_len = (overlap_end - overlap_start) as usize;
        let src_start = (overlap_start - offset) as usize;
        buf[in_chunk_start..in_chunk_start + in_chunk_len]
            .copy_from_slice(&bytes[src_start..src_start + in_chunk_len]);

        store_chunk(txn, inode_id, chunk_num, &buf)?;
    }

    Ok(bytes.len() as u32)
}

/// Reads up to `length` bytes starting at `offset`, clamped to the file's
/// current size; holes synthesize as zeros.
pub fn read(txn: &Transaction, inode_id: u64, offset: u64, length: u32) -> FsResult<Vec<u8>> {
    let current = match inode::fetch(txn, inode_id)? {
        Some(i) => i,
        None => return Ok(Vec::new()),
    };
    if offset >= current.size {
        return Ok(Vec::new());
    }
    let length = (length as u64).min(current.size - offset) as usize;
    if length == 0 {
        return Ok(Vec::new());
    }

    let read_end = offset + length as u64;
    let start_chunk = chunk_of(offset);
    let end_chunk = chunk_of(read_end - 1);

    let mut out = Vec::with_capacity(length);
    for chunk_num in start_chunk..=end_chunk {
        let chunk_start = chunk_num * CHUNK_SIZE;
        let stored = load_chunk(txn, inode_id, chunk_num)?;
        let chunk_len = match &stored {
            Some(data) => data.len() as u64,
            None => CHUNK_SIZE.min(current.size - chunk_start),
        };
        let chunk_end = (chunk_start + chunk_len).min(current.size);

        let overlap_start = offset.max(chunk_start);
        let overlap_end = read_end.min(chunk_end);
        if overlap_start >= overlap_end {
            continue;
        }
        let in_chunk_start = (overlap_start - chunk_start) as usize;
        let in_chunk_len = (overlap_end - overlap_start) as usize;

        match &stored {
            Some(data) => out.extend_from_slice(&data[in_chunk_start..in_chunk_start + in_chunk_len]),
            None => out.extend(std::iter::repeat(0u8).take(in_chunk_len)),
        }
    }
    Ok(out)
}

/// Truncates the file to `new_length`, preserving hole fidelity in both
/// directions: shrinking drops trailing chunks (and shortens the new tail
/// chunk), growing pads the old tail chunk but never creates new storage.
pub fn truncate(txn: &Transaction, inode_id: u64, new_length: u64) -> FsResult<()> {
    let current = inode::fetch(txn, inode_id)?.ok_or(FsError::NotFound)?;
    let old_size = current.size;
    inode::update_size(txn, inode_id, new_length, now())?;

    if new_length < old_size {
        let first_dead_chunk = new_length.div_ceil(CHUNK_SIZE);
        txn.execute(
            "DELETE FROM file_data WHERE inode_id = ?1 AND chunk_num >= ?2",
            params![inode_id, first_dead_chunk],
        )?;
        if new_length > 0 && new_length % CHUNK_SIZE != 0 {
            let last_chunk = chunk_of(new_length - 1);
            if let Some(data) = load_chunk(txn, inode_id, last_chunk)? {
                let keep = (new_length - last_chunk * CHUNK_SIZE) as usize;
                if data.len() > keep {
                    store_chunk(txn, inode_id, last_chunk, &data[..keep])?;
                }
            }
        }
    } else if new_length > old_size
        && old_size > 0
        && old_size % CHUNK_SIZE != 0
    {
        let last_chunk = chunk_of(old_size - 1);
        if let Some(mut data) = load_chunk(txn, inode_id, last_chunk)? {
            if (data.len() as u64) < CHUNK_SIZE {
                data.resize(CHUNK_SIZE as usize, 0);
                store_chunk(txn, inode_id, last_chunk, &data)?;
            }
        }
    }
    Ok(())
}
