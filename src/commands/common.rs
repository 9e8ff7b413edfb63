use anyhow::Result;
use std::path::PathBuf;

use roundtable::config::AppConfig;
use roundtable::models::{ConversationSession, HistoryEntry};
use roundtable::store::{self, FileStore, KEY_HISTORY, KEY_SESSION};

/// Open the blob store named by the operator config (or its default
/// location).
pub async fn open_store(config_path: Option<PathBuf>) -> Result<(AppConfig, FileStore)> {
    let app = AppConfig::load(config_path)?;
    let store = FileStore::new(app.data_dir.clone());
    store.init().await?;
    Ok((app, store))
}

/// The session blob omits the transcript; attach it from its own key.
pub async fn load_session(store: &FileStore) -> Result<ConversationSession> {
    let mut session: ConversationSession =
        store::load(store, KEY_SESSION).await?.unwrap_or_default();
    session.restore_history(load_history(store).await?);
    Ok(session)
}

pub async fn load_history(store: &FileStore) -> Result<Vec<HistoryEntry>> {
    Ok(store::load(store, KEY_HISTORY).await?.unwrap_or_default())
}
