use async_trait::async_trait;

use crate::utils::error::Result;

/// File store for the static reference tables (GTFS text files, station
/// catalog, bus route list). Keys are plain file names.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;
    async fn exists(&self, name: &str) -> bool;
}
