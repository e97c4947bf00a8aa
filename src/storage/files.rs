//! Hourly file naming and discovery
//!
//! Files are named `<prefix>-<YYYY-MM-DD-HH>.records`, one per UTC hour.

use super::StoreError;
use chrono::{DateTime, Duration, DurationRound, Utc};
use std::path::{Path, PathBuf};

/// File extension of observation files
pub const RECORDS_EXTENSION: &str = "records";

const HOUR_FORMAT: &str = "%Y-%m-%d-%H";

/// Truncate a timestamp to the start of its UTC hour
pub fn start_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::hours(1)).unwrap_or(t)
}

/// File name for the hour bucket containing `t`
pub fn record_file_name(prefix: &str, t: DateTime<Utc>) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        start_of_hour(t).format(HOUR_FORMAT),
        RECORDS_EXTENSION
    )
}

/// Full path of the hour bucket containing `t`
pub fn record_file_path(directory: &Path, prefix: &str, t: DateTime<Utc>) -> PathBuf {
    directory.join(record_file_name(prefix, t))
}

/// Existing files for every hour bucket from `start` to `end`, inclusive, in hour order.
/// Missing hours are skipped; a directory where a file is expected is an error.
pub fn record_files_between(
    directory: &Path,
    prefix: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<PathBuf>, StoreError> {
    let end_hour = start_of_hour(end);
    let mut hour = start_of_hour(start);
    let mut files = Vec::new();

    while hour <= end_hour {
        let path = record_file_path(directory, prefix, hour);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => return Err(StoreError::NotAFile(path)),
            Ok(_) => files.push(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        hour += Duration::hours(1);
    }

    Ok(files)
}

/// Every `*.records` file in `directory`, optionally also one level of subdirectories.
/// Used for offline inspection of collected files, where each agent's files
/// sit in their own subdirectory.
pub fn all_record_files(directory: &Path, include_subdirs: bool) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            if include_subdirs {
                files.extend(all_record_files(&path, false)?);
            }
            continue;
        }

        if path.extension().is_some_and(|ext| ext == RECORDS_EXTENSION) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_start_of_hour() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 59, 59).unwrap()
            + Duration::milliseconds(999);
        assert_eq!(start_of_hour(t), at(10, 0));
        assert_eq!(start_of_hour(at(10, 0)), at(10, 0));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            record_file_name("obs", at(7, 42)),
            "obs-2024-05-01-07.records"
        );
    }

    #[test]
    fn test_files_between_skips_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(record_file_path(dir.path(), "obs", at(9, 0)), b"").unwrap();
        std::fs::write(record_file_path(dir.path(), "obs", at(11, 0)), b"").unwrap();
        std::fs::write(record_file_path(dir.path(), "other", at(10, 0)), b"").unwrap();

        let files = record_files_between(dir.path(), "obs", at(8, 30), at(11, 5)).unwrap();
        assert_eq!(
            files,
            vec![
                record_file_path(dir.path(), "obs", at(9, 0)),
                record_file_path(dir.path(), "obs", at(11, 0)),
            ]
        );

        let none = record_files_between(dir.path(), "obs", at(12, 0), at(11, 0)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_files_between_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let path = record_file_path(dir.path(), "obs", at(10, 0));
        std::fs::create_dir(&path).unwrap();

        let result = record_files_between(dir.path(), "obs", at(10, 0), at(10, 30));
        assert!(matches!(result, Err(StoreError::NotAFile(p)) if p == path));
    }

    #[test]
    fn test_all_record_files() {
        let dir = TempDir::new().unwrap();
        let agent = dir.path().join("agent-1");
        std::fs::create_dir(&agent).unwrap();
        std::fs::write(dir.path().join("a-2024-05-01-10.records"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(agent.join("b-2024-05-01-10.records"), b"").unwrap();

        assert_eq!(all_record_files(dir.path(), false).unwrap().len(), 1);
        assert_eq!(all_record_files(dir.path(), true).unwrap().len(), 2);
    }
}
