//! Active hourly file: rotation, dictionary reload and corruption recovery

use super::dictionary::{IntString, StringIdMap};
use super::encoding::{encode_observation, PersistSink};
use super::files::{record_file_path, start_of_hour};
use super::record::{write_record, RecordKind, RecordReader};
use super::{StoreConfig, StoreError};
use crate::compaction::RetentionSweeper;
use crate::data::Observation;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file stays writable until the start of the hour containing `opened + GRACE`
const ROTATION_GRACE_MINUTES: i64 = 61;

/// Snapshot of the active file for status reads.
/// Republished on open, on every sync and after each write that added
/// dictionary entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveFileInfo {
    pub path: PathBuf,
    pub opened_at: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub dictionary_len: usize,
    /// Approximate in-memory size of the dictionary
    pub dictionary_bytes: usize,
}

/// Shared, read-only view of the active file. Only the file manager writes it.
pub type ActiveFileStatus = Arc<RwLock<Option<ActiveFileInfo>>>;

/// The currently open hourly file and its dictionary
#[derive(Debug)]
pub struct WriteFile {
    pub path: PathBuf,
    pub opened_at: DateTime<Utc>,
    /// Writes after this instant trigger a rotation
    pub end: DateTime<Utc>,
    pub file: File,
    pub dictionary: StringIdMap,
}

impl WriteFile {
    fn info(&self) -> ActiveFileInfo {
        ActiveFileInfo {
            path: self.path.clone(),
            opened_at: self.opened_at,
            end: self.end,
            dictionary_len: self.dictionary.len(),
            dictionary_bytes: self.dictionary.memory_usage(),
        }
    }

    fn close(self) {
        if let Err(e) = self.file.sync_all() {
            tracing::warn!(path = %self.path.display(), error = %e, "closing file failed");
        }
    }
}

/// Append-only record sink that can be cut back to an earlier length
pub trait RecordLog: Write + PersistSink {
    fn position(&mut self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl RecordLog for File {
    fn position(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl RecordLog for Vec<u8> {
    fn position(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        Vec::truncate(self, len as usize);
        Ok(())
    }
}

/// Append one observation and the dictionary entries it introduces.
/// On failure the log is cut back to its previous length and the new keys are
/// forgotten, so a partial frame never precedes later records.
pub fn append_observation<L: RecordLog + ?Sized>(
    log: &mut L,
    dictionary: &mut StringIdMap,
    obs: &Observation,
) -> Result<(), StoreError> {
    let start = log.position()?;
    let checkpoint = dictionary.checkpoint();

    let result = encode_observation(obs, dictionary, log)
        .and_then(|encoded| write_record(log, RecordKind::Observation, &encoded.to_bytes()));

    if let Err(e) = result {
        dictionary.rollback(checkpoint);
        if let Err(cut) = log.truncate(start) {
            tracing::error!(error = %cut, "cannot remove partial record");
        }
        return Err(e.into());
    }
    Ok(())
}

/// End of validity for a file opened at `opened_at`
pub fn rotation_deadline(opened_at: DateTime<Utc>) -> DateTime<Utc> {
    start_of_hour(opened_at + Duration::minutes(ROTATION_GRACE_MINUTES))
}

/// Rebuild the dictionary of an existing file from its `StringId` records,
/// with the same validation queries apply. A missing file yields an empty
/// dictionary.
pub fn load_dictionary(path: &Path) -> Result<StringIdMap, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StringIdMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dictionary = StringIdMap::new();
    for record in RecordReader::new(BufReader::new(file)) {
        let record = record?;
        match record.kind {
            RecordKind::StringId => dictionary.append(IntString::from_bytes(&record.payload)?)?,
            RecordKind::Observation | RecordKind::Open => {}
        }
    }

    Ok(dictionary)
}

/// Owns the single active [`WriteFile`] and decides when to rotate it
pub struct HourlyFileManager {
    directory: PathBuf,
    prefix: String,
    current: Option<WriteFile>,
    sweeper: RetentionSweeper,
    status: ActiveFileStatus,
}

impl HourlyFileManager {
    /// Create the manager, creating the store directory if needed
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.directory)?;

        Ok(Self {
            directory: config.directory.clone(),
            prefix: config.prefix.clone(),
            current: None,
            sweeper: RetentionSweeper::new(config),
            status: Arc::new(RwLock::new(None)),
        })
    }

    /// Handle for reading snapshots of the active file
    pub fn status(&self) -> ActiveFileStatus {
        Arc::clone(&self.status)
    }

    /// The file to write to at `now`, rotating first if the current one expired
    pub fn active_file(&mut self, now: DateTime<Utc>) -> Result<&mut WriteFile, StoreError> {
        let file = match self.current.take() {
            Some(file) if now <= file.end => file,
            previous => {
                self.sweeper.trigger(now);
                if let Some(old) = previous {
                    old.close();
                }
                *self.status.write() = None;
                self.open(now)?
            }
        };

        Ok(self.current.insert(file))
    }

    /// Write one observation to the file active at `now`
    pub fn append(&mut self, now: DateTime<Utc>, obs: &Observation) -> Result<(), StoreError> {
        let file = self.active_file(now)?;
        let before = file.dictionary.len();
        append_observation(&mut file.file, &mut file.dictionary, obs)?;
        if file.dictionary.len() != before {
            let info = file.info();
            *self.status.write() = Some(info);
        }
        Ok(())
    }

    /// Flush the active file to stable storage, rotating first if needed
    pub fn sync(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let file = self.active_file(now)?;
        file.file.sync_all()?;
        let info = file.info();
        *self.status.write() = Some(info);
        Ok(())
    }

    /// Sync and close the active file, if any
    pub fn close(&mut self) {
        if let Some(file) = self.current.take() {
            tracing::info!(path = %file.path.display(), "closing observation file");
            file.close();
        }
        *self.status.write() = None;
    }

    fn open(&self, now: DateTime<Utc>) -> Result<WriteFile, StoreError> {
        let path = record_file_path(&self.directory, &self.prefix, now);

        let dictionary = match load_dictionary(&path) {
            Ok(dictionary) => dictionary,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "loading dictionary failed");
                tracing::info!(path = %path.display(), "deleting corrupt file");
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "cannot delete file");
                }
                StringIdMap::new()
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        write_record(&mut file, RecordKind::Open, now.format("%H:%M:%S").to_string().as_bytes())?;

        tracing::info!(
            path = %path.display(),
            dictionary_len = dictionary.len(),
            "opened observation file"
        );

        let file = WriteFile {
            path,
            opened_at: now,
            end: rotation_deadline(now),
            file,
            dictionary,
        };
        *self.status.write() = Some(file.info());
        Ok(file)
    }
}

impl Drop for HourlyFileManager {
    fn drop(&mut self) {
        self.close();
    }
}
