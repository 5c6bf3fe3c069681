//! Journal block writer.
//!
//! Appends one block per packet to the current journal file and rotates to a
//! fresh file on request. Files are named
//!   {output_dir}/{prefix}_{unix_secs}_{seq}.avro
//! where `seq` increases with every file this writer opens, so several
//! rotations inside one second never collide. Files are opened with
//! `create_new`, so an existing file is never reopened or overwritten.
//!
//! `bytes_written` always equals the size of the current file: a block is
//! counted only after it has been fully handed to the OS, and a block that
//! fails partway is cut off again before the error is returned.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use relay_core::config::StorageConfig;
use relay_core::wire::{self, MAX_BLOCK_SIZE, SYNC_MARKER, SYNC_MARKER_SIZE};

/// How many sequence numbers to try before giving up on finding a free name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(PathBuf, io::Error),
    #[error("failed to open journal file {0}: {1}")]
    Open(PathBuf, io::Error),
    #[error("no free journal file name in {0}")]
    NameExhausted(PathBuf),
    #[error("failed to write block to {0}: {1}")]
    Write(PathBuf, io::Error),
    #[error("journal writer is closed")]
    Closed,
}

/// Where and how journal files are created.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub sync_each_block: bool,
}

impl WriterOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: String::from("data"),
            sync_each_block: false,
        }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            output_dir: storage.output_dir.clone(),
            file_prefix: storage.file_prefix.clone(),
            sync_each_block: storage.sync_each_block,
        }
    }
}

/// Writer for the current journal file.
pub struct BlockWriter {
    options: WriterOptions,
    file: Option<File>,
    path: PathBuf,
    bytes_written: u64,
    sync_marker: [u8; SYNC_MARKER_SIZE],
    sequence: u64,
    /// Reused for every block so one packet costs one write call.
    scratch: Vec<u8>,
}

impl BlockWriter {
    /// Create the output directory if needed and open a new journal file.
    pub fn open(options: WriterOptions) -> Result<Self, WriterError> {
        let mut writer = Self {
            options,
            file: None,
            path: PathBuf::new(),
            bytes_written: 0,
            sync_marker: SYNC_MARKER,
            sequence: 0,
            scratch: Vec::with_capacity(MAX_BLOCK_SIZE),
        };
        writer.open_next()?;
        Ok(writer)
    }

    fn open_next(&mut self) -> Result<(), WriterError> {
        let dir = &self.options.output_dir;
        fs::create_dir_all(dir).map_err(|e| WriterError::CreateDir(dir.clone(), e))?;

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = dir.join(format!(
                "{}_{}_{:04}.avro",
                self.options.file_prefix, secs, self.sequence
            ));
            self.sequence += 1;

            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "journal file created");
                    self.file = Some(file);
                    self.path = path;
                    self.bytes_written = 0;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(path = %path.display(), "journal name taken, trying next");
                }
                Err(e) => return Err(WriterError::Open(path, e)),
            }
        }

        Err(WriterError::NameExhausted(dir.clone()))
    }

    /// Append one block carrying `data`. Returns the encoded block size.
    ///
    /// On error `bytes_written` is unchanged and the file is truncated back
    /// to it (best effort).
    pub fn append_block(&mut self, data: &[u8]) -> Result<u64, WriterError> {
        let sync = self.options.sync_each_block;
        self.append_block_with(data, |file, block| write_block(file, block, sync))
    }

    /// Encode `data` and hand the block to `write`, truncating whatever
    /// `write` left behind if it fails.
    fn append_block_with(
        &mut self,
        data: &[u8],
        write: impl FnOnce(&mut File, &[u8]) -> io::Result<()>,
    ) -> Result<u64, WriterError> {
        let file = self.file.as_mut().ok_or(WriterError::Closed)?;

        self.scratch.clear();
        wire::encode_block(data, &mut self.scratch);
        let block_len = self.scratch.len() as u64;

        if let Err(e) = write(file, &self.scratch) {
            if let Err(trunc) = file.set_len(self.bytes_written) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %trunc,
                    "failed to truncate partial block"
                );
            }
            return Err(WriterError::Write(self.path.clone(), e));
        }

        self.bytes_written += block_len;
        Ok(block_len)
    }

    /// Close the current file and open a fresh one. Returns the closed path.
    ///
    /// If opening the new file fails the writer stays closed.
    pub fn rotate(&mut self) -> Result<PathBuf, WriterError> {
        let previous = self.path.clone();
        let size = self.bytes_written;
        self.close();
        self.open_next()?;
        tracing::info!(
            previous = %previous.display(),
            size,
            current = %self.path.display(),
            "journal rotated"
        );
        Ok(previous)
    }

    /// Sync and release the current file. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                tracing::warn!(path = %self.path.display(), error = %e, "journal sync on close failed");
            }
            tracing::debug!(
                path = %self.path.display(),
                bytes = self.bytes_written,
                "journal file closed"
            );
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Bytes appended to the current file since it was opened.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path of the current (or last) journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_marker(&self) -> &[u8; SYNC_MARKER_SIZE] {
        &self.sync_marker
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_block(file: &mut File, block: &[u8], sync: bool) -> io::Result<()> {
    file.write_all(block)?;
    file.flush()?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}
