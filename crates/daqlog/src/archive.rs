// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bucket archiver: packs a closed bucket directory into `<period>.zip`.
//!
//! The archive is written next to the bucket directory, never inside it, and
//! entry names start with `<period>/` so extracting it reproduces the tree.

use crate::period::PeriodKey;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Extension of produced archives.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Archiver errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("zip error on {path}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
}

/// A compressed, transportable copy of one closed bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub period: PeriodKey,
    pub path: PathBuf,
    /// Number of files packed.
    pub entries: usize,
    pub size_bytes: u64,
}

/// Packs bucket directories into archives.
#[derive(Debug, Clone)]
pub struct BucketArchiver {
    base_dir: PathBuf,
    lock_suffixes: Vec<String>,
}

impl BucketArchiver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            lock_suffixes: vec![".lock".to_string()],
        }
    }

    /// Replace the set of in-progress suffixes to skip.
    pub fn with_lock_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.lock_suffixes = suffixes;
        self
    }

    /// Directory of a period's bucket.
    pub fn bucket_dir(&self, period: &PeriodKey) -> PathBuf {
        self.base_dir.join(period.to_string())
    }

    /// Where the archive for `period` is written.
    pub fn artifact_path(&self, period: &PeriodKey) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}", period, ARCHIVE_EXTENSION))
    }

    /// Archive a closed bucket.
    ///
    /// Returns `Ok(None)` when the bucket directory does not exist or holds no
    /// eligible file. An existing archive of the same name is replaced.
    pub fn archive(&self, period: &PeriodKey) -> Result<Option<Artifact>, ArchiveError> {
        let dir = self.bucket_dir(period);
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "No bucket directory to archive");
            return Ok(None);
        }

        let zip_path = self.artifact_path(period);
        remove_if_exists(&zip_path).map_err(|source| ArchiveError::Io {
            path: zip_path.clone(),
            source,
        })?;

        let mut files = Vec::new();
        collect_files(&dir, &mut files).map_err(|source| ArchiveError::Io {
            path: dir.clone(),
            source,
        })?;
        files.sort();

        let root = dir.parent().unwrap_or(&self.base_dir).to_path_buf();
        let zip_name = zip_path.file_name().map(|n| n.to_os_string());

        let file = File::create(&zip_path).map_err(|source| ArchiveError::Io {
            path: zip_path.clone(),
            source,
        })?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        let packed = self.pack(&mut zip, &files, &root, zip_name.as_deref());
        let finished = zip.finish();
        let entries = match packed {
            Ok(entries) => entries,
            Err(err) => {
                let _ = fs::remove_file(&zip_path);
                return Err(err);
            }
        };
        finished
            .map_err(|source| ArchiveError::Zip {
                path: zip_path.clone(),
                source,
            })?
            .flush()
            .map_err(|source| ArchiveError::Io {
                path: zip_path.clone(),
                source,
            })?;

        if entries == 0 {
            tracing::info!(period = %period, "Bucket has no files to archive");
            let _ = fs::remove_file(&zip_path);
            return Ok(None);
        }

        let size_bytes = fs::metadata(&zip_path)
            .map_err(|source| ArchiveError::Io {
                path: zip_path.clone(),
                source,
            })?
            .len();

        tracing::info!(
            period = %period,
            entries,
            size_kb = size_bytes as f64 / 1024.0,
            "Bucket archived"
        );

        Ok(Some(Artifact {
            period: *period,
            path: zip_path,
            entries,
            size_bytes,
        }))
    }

    /// Add eligible files to `zip`, returning how many were added.
    fn pack<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        files: &[PathBuf],
        root: &Path,
        zip_name: Option<&OsStr>,
    ) -> Result<usize, ArchiveError> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut entries = 0;

        for path in files {
            if path.file_name() == zip_name || self.is_locked(path) {
                tracing::debug!(file = %path.display(), "Skipping file");
                continue;
            }

            // Files may vanish between listing and reading.
            let mut source = match File::open(path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(ArchiveError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            };

            zip.start_file(entry_name(root, path), options)
                .map_err(|source| ArchiveError::Zip {
                    path: path.clone(),
                    source,
                })?;
            io::copy(&mut source, zip).map_err(|source| ArchiveError::Io {
                path: path.clone(),
                source,
            })?;
            entries += 1;
        }

        Ok(entries)
    }

    /// Data files of a bucket that the archiver would pack.
    pub fn bucket_files(&self, period: &PeriodKey) -> io::Result<Vec<PathBuf>> {
        let dir = self.bucket_dir(period);
        let mut files = Vec::new();
        if dir.is_dir() {
            collect_files(&dir, &mut files)?;
        }
        files.retain(|p| !self.is_locked(p));
        files.sort();
        Ok(files)
    }

    fn is_locked(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.lock_suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && name.ends_with(suffix.as_str()))
    }
}

/// Recursively list regular files, ignoring entries that disappear mid-walk.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }

    Ok(())
}

/// Archive entry name: `path` relative to `root`, `/`-separated.
fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn day() -> PeriodKey {
        PeriodKey::day(NaiveDate::from_ymd_opt(2025, 11, 25).unwrap())
    }

    fn populate(base: &Path, names: &[&str]) {
        let dir = base.join("2025_11_25");
        fs::create_dir_all(&dir).unwrap();
        for name in names {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, format!("Time,Value\r\n00:00:01,{}\r\n", name)).unwrap();
        }
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_archive_counts_files() {
        let temp_dir = TempDir::new().unwrap();
        populate(
            temp_dir.path(),
            &[
                "2025_11_25_temperature.csv",
                "2025_11_25_humidity.csv",
                "2025_11_25_radiation.csv",
            ],
        );

        let archiver = BucketArchiver::new(temp_dir.path());
        let artifact = archiver.archive(&day()).unwrap().unwrap();

        assert_eq!(artifact.entries, 3);
        assert_eq!(artifact.path, temp_dir.path().join("2025_11_25.zip"));
        assert!(artifact.size_bytes > 0);
        assert_eq!(
            entry_names(&artifact.path),
            vec![
                "2025_11_25/2025_11_25_humidity.csv",
                "2025_11_25/2025_11_25_radiation.csv",
                "2025_11_25/2025_11_25_temperature.csv",
            ]
        );
    }

    #[test]
    fn test_archive_preserves_content_and_nesting() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), &["nested/extra.csv"]);

        let archiver = BucketArchiver::new(temp_dir.path());
        let artifact = archiver.archive(&day()).unwrap().unwrap();

        let mut archive = ZipArchive::new(File::open(&artifact.path).unwrap()).unwrap();
        let mut entry = archive.by_name("2025_11_25/nested/extra.csv").unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "Time,Value\r\n00:00:01,nested/extra.csv\r\n");
    }

    #[test]
    fn test_missing_bucket_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let archiver = BucketArchiver::new(temp_dir.path());

        assert!(archiver.archive(&day()).unwrap().is_none());
        assert!(!archiver.artifact_path(&day()).exists());
    }

    #[test]
    fn test_empty_or_locked_bucket_is_none() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), &["2025_11_25_temperature.csv.lock"]);

        let archiver = BucketArchiver::new(temp_dir.path());
        assert!(archiver.archive(&day()).unwrap().is_none());
        assert!(!archiver.artifact_path(&day()).exists());
    }

    #[test]
    fn test_lock_files_skipped() {
        let temp_dir = TempDir::new().unwrap();
        populate(
            temp_dir.path(),
            &["a.csv", "b.csv", "b.csv.lock", "c.csv.part"],
        );

        let archiver = BucketArchiver::new(temp_dir.path())
            .with_lock_suffixes(vec![".lock".into(), ".part".into()]);
        let artifact = archiver.archive(&day()).unwrap().unwrap();

        assert_eq!(artifact.entries, 2);
        assert_eq!(
            entry_names(&artifact.path),
            vec!["2025_11_25/a.csv", "2025_11_25/b.csv"]
        );
    }

    #[test]
    fn test_stray_archive_inside_bucket_skipped() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), &["a.csv", "2025_11_25.zip"]);

        let archiver = BucketArchiver::new(temp_dir.path());
        let artifact = archiver.archive(&day()).unwrap().unwrap();
        assert_eq!(entry_names(&artifact.path), vec!["2025_11_25/a.csv"]);
    }

    #[test]
    fn test_archive_twice_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), &["a.csv", "b.csv"]);

        let archiver = BucketArchiver::new(temp_dir.path());
        let first = archiver.archive(&day()).unwrap().unwrap();
        let first_names = entry_names(&first.path);
        let second = archiver.archive(&day()).unwrap().unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(first.entries, second.entries);
        assert_eq!(first_names, entry_names(&second.path));
    }

    #[test]
    fn test_vanished_file_skipped() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), &["a.csv", "b.csv"]);
        let archiver = BucketArchiver::new(temp_dir.path());
        let files = archiver.bucket_files(&day()).unwrap();
        fs::remove_file(&files[0]).unwrap();

        let mut zip = ZipWriter::new(io::Cursor::new(Vec::new()));
        let entries = archiver
            .pack(&mut zip, &files, temp_dir.path(), None)
            .unwrap();
        assert_eq!(entries, 1);

        let buf = zip.finish().unwrap().into_inner();
        let archive = ZipArchive::new(io::Cursor::new(buf)).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.file_names().next(), Some("2025_11_25/b.csv"));
    }

    #[test]
    fn test_bucket_files_excludes_locks() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path(), &["a.csv", "a.csv.lock"]);

        let archiver = BucketArchiver::new(temp_dir.path());
        let files = archiver.bucket_files(&day()).unwrap();
        assert_eq!(files, vec![temp_dir.path().join("2025_11_25").join("a.csv")]);
    }

    #[test]
    fn test_entry_name() {
        let root = Path::new("/home/log");
        let path = Path::new("/home/log/2025_11/daqlog-uploader.log");
        assert_eq!(entry_name(root, path), "2025_11/daqlog-uploader.log");
    }
}
