use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::ports::Cache;
use crate::utils::error::Result;

/// Cache-dir file store backing the static reference tables.
#[derive(Debug, Clone)]
pub struct LocalCache {
    base_path: PathBuf,
}

impl LocalCache {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, name: &str) -> PathBuf {
        Path::new(&self.base_path).join(name)
    }
}

#[async_trait]
impl Cache for LocalCache {
    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.full_path(name))?;
        Ok(data)
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(name);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full_path, data)?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        self.full_path(name).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());

        assert!(!cache.exists("stations.csv").await);
        cache.write_file("stations.csv", b"stop_id\n30161\n").await.unwrap();
        assert!(cache.exists("stations.csv").await);
        let data = cache.read_file("stations.csv").await.unwrap();
        assert_eq!(data, b"stop_id\n30161\n");
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        assert!(cache.read_file("nope.csv").await.is_err());
    }
}
