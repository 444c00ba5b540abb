//! Directory-backed persistence: one checksummed file per key.

use super::Persistence;
use crate::error::{Result, StoreError};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for entry files.
const ENTRY_MAGIC: &[u8; 4] = b"RCK\0";

/// Current entry format version.
const ENTRY_VERSION: u8 = 1;

/// Header size: magic + version + payload length.
const ENTRY_HEADER_SIZE: usize = 4 + 1 + 8;

/// Trailer size: CRC32 of the payload.
const ENTRY_TRAILER_SIZE: usize = 4;

const ENTRY_EXTENSION: &str = "rck";
const TEMP_EXTENSION: &str = "tmp";

/// Persistence backend storing each key in its own file under a directory.
///
/// The directory is locked exclusively for the lifetime of the backend, so
/// a key space has a single owner. Writes go to a temp file that is synced
/// and renamed into place, so a reader never sees a torn value.
#[derive(Debug)]
pub struct FilePersistence {
    dir: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl FilePersistence {
    /// Open (creating if needed) a persistence directory.
    ///
    /// Fails with [`StoreError::Locked`] if another backend holds the directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock_file = Self::acquire_lock(&dir)?;
        Self::remove_stale_temp_files(&dir)?;

        tracing::debug!(target: "record_chain::persistence", dir = %dir.display(), "opened file persistence");

        Ok(Self {
            dir,
            _lock_file: lock_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_file = File::create(dir.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }

    fn remove_stale_temp_files(dir: &Path) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                tracing::warn!(
                    target: "record_chain::persistence",
                    path = %path.display(),
                    "removing temp file left by an interrupted write"
                );
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", escape_key(key), ENTRY_EXTENSION))
    }
}

impl Persistence for FilePersistence {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut file = match File::open(self.entry_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        decode_entry(&bytes).map(Some)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key);
        let temp_path = path.with_extension(TEMP_EXTENSION);

        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&encode_entry(value))?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;

        tracing::trace!(
            target: "record_chain::persistence",
            key,
            bytes = value.len(),
            "wrote entry"
        );
        Ok(())
    }
}

/// Map a key to a file-name-safe stem. Bytes outside `[A-Za-z0-9._-]`
/// become `%XX`.
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => escaped.push(byte as char),
            // A leading dot would hide the file; escape it there.
            b'.' if !escaped.is_empty() => escaped.push('.'),
            _ => escaped.push_str(&format!("%{:02X}", byte)),
        }
    }
    escaped
}

fn encode_entry(value: &str) -> Vec<u8> {
    let payload = value.as_bytes();
    let mut bytes = Vec::with_capacity(ENTRY_HEADER_SIZE + payload.len() + ENTRY_TRAILER_SIZE);

    bytes.extend_from_slice(ENTRY_MAGIC);
    bytes.push(ENTRY_VERSION);
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());

    bytes
}

fn decode_entry(bytes: &[u8]) -> Result<String> {
    if bytes.len() < ENTRY_HEADER_SIZE + ENTRY_TRAILER_SIZE {
        return Err(StoreError::InvalidFormat("entry too short".into()));
    }

    if &bytes[0..4] != ENTRY_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid entry magic".into()));
    }

    if bytes[4] != ENTRY_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported entry version: {}",
            bytes[4]
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[5..ENTRY_HEADER_SIZE]);
    let payload_len = u64::from_le_bytes(len_bytes) as usize;

    let expected_len = ENTRY_HEADER_SIZE
        .checked_add(payload_len)
        .and_then(|n| n.checked_add(ENTRY_TRAILER_SIZE));
    if expected_len != Some(bytes.len()) {
        return Err(StoreError::InvalidFormat(format!(
            "entry length mismatch: header says {} payload bytes, file has {}",
            payload_len,
            bytes.len()
        )));
    }

    let payload = &bytes[ENTRY_HEADER_SIZE..ENTRY_HEADER_SIZE + payload_len];

    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[ENTRY_HEADER_SIZE + payload_len..]);
    let expected = u32::from_le_bytes(crc_bytes);
    let got = crc32fast::hash(payload);
    if expected != got {
        return Err(StoreError::ChecksumMismatch { expected, got });
    }

    String::from_utf8(payload.to_vec())
        .map_err(|e| StoreError::InvalidFormat(format!("entry is not UTF-8: {}", e)))
}
