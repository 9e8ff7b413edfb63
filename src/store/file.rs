use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

use super::StateStore;

/// One JSON file per key under a data directory.
#[derive(Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .with_context(|| format!("Failed to create data dir {:?}", self.base_path))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StateStore for FileStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.blob_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read blob file {:?}", path))?;
        Ok(Some(content))
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        let path = self.blob_path(key);
        fs::write(&path, value)
            .await
            .with_context(|| format!("Failed to write blob file {:?}", path))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove blob file {:?}", path))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().to_path_buf());
        store.init().await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn file_store_set_and_get_round_trip() {
        let (store, _temp) = create_test_store().await;

        store.set_raw("session", "{}".to_string()).await.unwrap();
        let loaded = store.get_raw("session").await.unwrap();
        assert_eq!(loaded, Some("{}".to_string()));
    }

    #[tokio::test]
    async fn file_store_get_missing_returns_none() {
        let (store, _temp) = create_test_store().await;
        assert!(store.get_raw("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_remove_deletes_blob() {
        let (store, _temp) = create_test_store().await;

        store.set_raw("config", "{}".to_string()).await.unwrap();
        store.remove("config").await.unwrap();
        assert!(store.get_raw("config").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_remove_missing_is_ok() {
        let (store, _temp) = create_test_store().await;
        store.remove("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_set_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("nested"));

        store.set_raw("session", "{}".to_string()).await.unwrap();
        assert!(store.get_raw("session").await.unwrap().is_some());
    }
}
