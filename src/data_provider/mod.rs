use log::{debug, info};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::models::snapshot::Snapshot;
use crate::errors::{Result, SnapshotError};
use crate::util::{self, csv_utils};

/// 快照文件名格式：YYYYMMDD-HHMMSS.csv，首尾都锚定
pub const SNAPSHOT_FILENAME_PATTERN: &str = r"^\d{8}-\d{6}\.csv$";

fn snapshot_filename_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(SNAPSHOT_FILENAME_PATTERN).expect("snapshot filename pattern is valid"))
}

/// 文件名是否为合法的快照文件名
pub fn is_snapshot_filename(name: &str) -> bool {
    snapshot_filename_regex().is_match(name)
}

/// A snapshot read back from disk together with its timestamp label.
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub filename: String,
    pub label: String,
    pub path: PathBuf,
    pub snapshot: Snapshot,
}

/// 快照目录访问者，负责挑选最新文件并读取
pub struct SnapshotProvider {
    dir: PathBuf,
}

impl SnapshotProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 目录中所有符合命名规则的快照文件，按时间升序
    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            // 跟随符号链接；目录和失效链接不算
            if !entry.path().is_file() {
                continue;
            }
            // 非 UTF-8 文件名不可能匹配
            let Some(name) = entry.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            if is_snapshot_filename(&name) {
                names.push(name);
            } else {
                debug!("Ignoring {} in {}", name, self.dir.display());
            }
        }

        // 定宽补零的时间戳，字典序即时间序
        names.sort();
        Ok(names)
    }

    /// Name of the newest snapshot file in the directory.
    pub fn latest_file(&self) -> Result<String> {
        let names = self.list_snapshots()?;
        let count = names.len();

        let latest = names.into_iter().last().ok_or_else(|| SnapshotError::NoSnapshot {
            dir: self.dir.clone(),
        })?;

        info!(
            "Directory {} contains {} files with appropriate filenames: the latest one is {}.",
            self.dir.display(),
            count,
            latest
        );
        Ok(latest)
    }

    pub fn load(&self, filename: &str) -> Result<LoadedSnapshot> {
        let path = self.dir.join(filename);
        let snapshot = csv_utils::read_snapshot_from_csv(&path)?;

        Ok(LoadedSnapshot {
            filename: filename.to_string(),
            label: util::remove_filename_extension(filename).to_string(),
            path,
            snapshot,
        })
    }

    /// 挑选并读取最新的快照
    pub fn load_latest(&self) -> Result<LoadedSnapshot> {
        let filename = self.latest_file()?;
        self.load(&filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn pattern_accepts_only_exact_timestamp_names() {
        assert!(is_snapshot_filename("20240101-235900.csv"));

        for name in [
            "data.csv",
            "2024-01-01.csv",
            "20240101-1200.csv",
            "202401011-120000.csv",
            "20240101_120000.csv",
            "20240101-120000.csv.bak",
            "x20240101-120000.csv",
            "20240101-120000.CSV",
            "20240101-120000.png",
        ] {
            assert!(!is_snapshot_filename(name), "{name} should not match");
        }
    }

    #[test]
    fn latest_file_crosses_day_boundary() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "20240101-235900.csv");
        touch(tmp.path(), "20240102-000100.csv");
        touch(tmp.path(), "20231231-120000.csv");

        let provider = SnapshotProvider::new(tmp.path());
        assert_eq!(provider.latest_file().unwrap(), "20240102-000100.csv");
        assert_eq!(
            provider.list_snapshots().unwrap(),
            vec!["20231231-120000.csv", "20240101-235900.csv", "20240102-000100.csv"]
        );
    }

    #[test]
    fn non_matching_names_are_never_selected() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "20240101-120000.csv");
        touch(tmp.path(), "data.csv");
        touch(tmp.path(), "2024-01-01.csv");
        touch(tmp.path(), "20240101-1200.csv");
        touch(tmp.path(), "20991231-235959.csv.bak");
        fs::create_dir(tmp.path().join("20991231-235959.csv")).unwrap();

        let provider = SnapshotProvider::new(tmp.path());
        assert_eq!(provider.latest_file().unwrap(), "20240101-120000.csv");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_snapshot_is_selected() {
        let tmp = tempdir().unwrap();
        let store = tmp.path().join("store");
        let data = tmp.path().join("data");
        fs::create_dir_all(&store).unwrap();
        fs::create_dir_all(&data).unwrap();
        fs::write(
            store.join("real.csv"),
            "Price,Close\nTicker,AAPL\n2024-01-02 14:30:00+00:00,185.5\n",
        )
        .unwrap();
        std::os::unix::fs::symlink(store.join("real.csv"), data.join("20240102-143000.csv")).unwrap();
        // 指向不存在文件的链接不参与选择
        std::os::unix::fs::symlink(store.join("gone.csv"), data.join("20991231-235959.csv")).unwrap();

        let provider = SnapshotProvider::new(&data);
        assert_eq!(provider.latest_file().unwrap(), "20240102-143000.csv");
        assert_eq!(provider.load_latest().unwrap().snapshot.len(), 1);
    }

    #[test]
    fn empty_directory_reports_no_snapshot() {
        let tmp = tempdir().unwrap();
        touch(tmp.path(), "notes.txt");

        let provider = SnapshotProvider::new(tmp.path());
        match provider.latest_file() {
            Err(SnapshotError::NoSnapshot { dir }) => assert_eq!(dir, tmp.path()),
            other => panic!("expected NoSnapshot, got {other:?}"),
        }
    }

    #[test]
    fn load_latest_derives_label_from_filename() {
        let tmp = tempdir().unwrap();
        fs::write(
            tmp.path().join("20240102-143000.csv"),
            "Price,Close\nTicker,AAPL\n2024-01-02 14:30:00+00:00,185.5\n",
        )
        .unwrap();

        let loaded = SnapshotProvider::new(tmp.path()).load_latest().unwrap();
        assert_eq!(loaded.label, "20240102-143000");
        assert_eq!(loaded.filename, "20240102-143000.csv");
        assert_eq!(loaded.snapshot.len(), 1);
    }

    #[test]
    fn corrupt_latest_file_is_reported_as_corrupt() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("20240102-143000.csv"), "garbage\n").unwrap();

        assert!(matches!(
            SnapshotProvider::new(tmp.path()).load_latest(),
            Err(SnapshotError::CorruptSnapshot { .. })
        ));
    }
}
