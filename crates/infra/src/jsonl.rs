//! JSON-lines files shared by the filesystem backends.
//!
//! Each record is one line terminated by `\n`; a record only counts once its
//! newline is on disk. A crash or failed write can leave a partial final
//! line, which is cut off when the file is next loaded or appended to.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::StoreError;

/// File-name-safe form of an arbitrary identifier.
///
/// Bytes outside `[A-Za-z0-9_-]` are written as `%XX`, which keeps distinct
/// ids distinct (`canvas:c1` and `canvas%3Ac1` never collide).
pub fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

pub fn jsonl_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", encode_file_stem(id)))
}

/// Load every complete record, truncating a torn tail in place.
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io("read journal")(e)),
    };

    let complete_len = raw.iter().rposition(|b| *b == b'\n').map_or(0, |pos| pos + 1);
    if complete_len < raw.len() {
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = raw.len() - complete_len,
            "truncating torn journal tail"
        );
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(StoreError::io("open journal"))?;
        file.set_len(complete_len as u64)
            .await
            .map_err(StoreError::io("truncate journal"))?;
        file.sync_data().await.map_err(StoreError::io("sync journal"))?;
    }

    let mut records = Vec::new();
    for (idx, line) in raw[..complete_len].split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record = serde_json::from_slice(line).map_err(|e| {
            StoreError::Serialization(format!(
                "{} line {}: {e}",
                path.display(),
                idx + 1
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Append one record and wait until it is on disk.
///
/// Bytes after the last newline are never part of a record, so they are cut
/// before writing. A write that fails part way is cut back the same way and
/// cannot fuse with the next record.
pub async fn append<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await
        .map_err(StoreError::io("open journal"))?;

    let (len, committed) = committed_len(&mut file).await?;
    if committed < len {
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = len - committed,
            "cutting partial record before append"
        );
        file.set_len(committed)
            .await
            .map_err(StoreError::io("truncate journal"))?;
    }

    if let Err(e) = write_line(&mut file, &line).await {
        if let Err(rollback) = file.set_len(committed).await {
            tracing::error!(
                path = %path.display(),
                error = %rollback,
                "could not roll back failed append; next append will cut it"
            );
        }
        return Err(e);
    }
    Ok(())
}

async fn write_line(file: &mut File, line: &[u8]) -> Result<(), StoreError> {
    file.write_all(line).await.map_err(StoreError::io("append journal"))?;
    file.flush().await.map_err(StoreError::io("flush journal"))?;
    file.sync_data().await.map_err(StoreError::io("sync journal"))
}

/// File length and the length up to and including its last newline.
async fn committed_len(file: &mut File) -> Result<(u64, u64), StoreError> {
    const CHUNK: u64 = 4096;

    let len = file
        .metadata()
        .await
        .map_err(StoreError::io("stat journal"))?
        .len();
    let mut end = len;
    let mut buf = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(StoreError::io("seek journal"))?;
        file.read_exact(chunk)
            .await
            .map_err(StoreError::io("read journal"))?;
        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            return Ok((len, start + pos as u64 + 1));
        }
        end = start;
    }
    Ok((len, 0))
}

/// Replace `path` with `value` via write-to-temp and rename.
pub async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");

    let mut tmp = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)
        .await
        .map_err(StoreError::io("open snapshot"))?;
    tmp.write_all(&bytes).await.map_err(StoreError::io("write snapshot"))?;
    tmp.sync_all().await.map_err(StoreError::io("sync snapshot"))?;
    drop(tmp);

    fs::rename(&tmp_path, path).await.map_err(StoreError::io("rename snapshot"))?;
    Ok(())
}

pub async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).await.map_err(StoreError::io("create data dir"))
}
