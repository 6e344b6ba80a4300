use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Filesystem storage rooted at a base directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.resolve(path)).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(full_path, data).await?;
        Ok(())
    }

    async fn list_files(&self, dir: &str, extension: &str) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(self.resolve(dir)).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(extension) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn exists(&self, path: &str) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }
}

pub fn join(dir: &str, file: &str) -> String {
    Path::new(dir).join(file).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_dirs_and_reads_back() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage
            .write_file("data/clean/patients_clean.csv", b"patient_id\n1\n")
            .await
            .unwrap();

        assert!(storage.exists("data/clean/patients_clean.csv").await);
        let data = storage.read_file("data/clean/patients_clean.csv").await.unwrap();
        assert_eq!(data, b"patient_id\n1\n");
    }

    #[tokio::test]
    async fn test_list_files_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage.write_file("raw/visits.csv", b"a\n").await.unwrap();
        storage.write_file("raw/doctors.csv", b"a\n").await.unwrap();
        storage.write_file("raw/notes.txt", b"a\n").await.unwrap();
        storage.write_file("raw/nested/patients.csv", b"a\n").await.unwrap();

        let files = storage.list_files("raw", "csv").await.unwrap();
        assert_eq!(files, vec!["doctors.csv", "visits.csv"]);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        assert!(!storage.exists("raw/missing.csv").await);
        assert!(matches!(
            storage.read_file("raw/missing.csv").await,
            Err(crate::utils::error::EtlError::IoError(_))
        ));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("data/raw", "patients.csv"), "data/raw/patients.csv");
    }
}
