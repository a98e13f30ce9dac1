//! Durable storage for user-added token sources.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use shared::{Error, Result, Token};

const LIST_URIS_SLOT: &str = "token_list_uris";
const USER_TOKENS_SLOT: &str = "user_tokens";

/// Durable storage for the two user-owned slots: extra token-list URIs and
/// individually added tokens.
///
/// Both slots are read once on initialization and written whenever the user
/// adds an item. An absent slot reads as empty, never as an error.
#[async_trait]
pub trait UserTokenStore: Send + Sync {
    async fn load_list_uris(&self) -> Result<Vec<String>>;

    async fn save_list_uris(&self, uris: &[String]) -> Result<()>;

    async fn load_user_tokens(&self) -> Result<Vec<Token>>;

    async fn save_user_tokens(&self, tokens: &[Token]) -> Result<()>;
}

/// File-backed store keeping each slot as a JSON array in its own file
/// under one directory.
///
/// Writes go through a temp file followed by a rename, so a crash mid-write
/// leaves the previous slot content intact.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slot))
    }

    async fn read_slot<T: DeserializeOwned>(&self, slot: &str) -> Result<Vec<T>> {
        let path = self.slot_path(slot);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Storage(format!("Corrupt slot {}: {}", slot, e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to read slot {}: {}",
                slot, e
            ))),
        }
    }

    async fn write_slot<T: Serialize>(&self, slot: &str, items: &[T]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create storage dir: {}", e)))?;

        let bytes = serde_json::to_vec_pretty(items)
            .map_err(|e| Error::Storage(format!("Failed to encode slot {}: {}", slot, e)))?;

        let path = self.slot_path(slot);
        let tmp = self.dir.join(format!("{}.json.tmp", slot));

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write slot {}: {}", slot, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to replace slot {}: {}", slot, e)))?;

        debug!("Wrote {} items to {}", items.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl UserTokenStore for FileTokenStore {
    async fn load_list_uris(&self) -> Result<Vec<String>> {
        self.read_slot(LIST_URIS_SLOT).await
    }

    async fn save_list_uris(&self, uris: &[String]) -> Result<()> {
        self.write_slot(LIST_URIS_SLOT, uris).await
    }

    async fn load_user_tokens(&self) -> Result<Vec<Token>> {
        self.read_slot(USER_TOKENS_SLOT).await
    }

    async fn save_user_tokens(&self, tokens: &[Token]) -> Result<()> {
        self.write_slot(USER_TOKENS_SLOT, tokens).await
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read_slot<T: DeserializeOwned>(&self, slot: &str) -> Result<Vec<T>> {
        let slots = self.slots.read().await;
        match slots.get(slot) {
            Some(body) => serde_json::from_str(body)
                .map_err(|e| Error::Storage(format!("Corrupt slot {}: {}", slot, e))),
            None => Ok(Vec::new()),
        }
    }

    async fn write_slot<T: Serialize>(&self, slot: &str, items: &[T]) -> Result<()> {
        let body = serde_json::to_string(items)
            .map_err(|e| Error::Storage(format!("Failed to encode slot {}: {}", slot, e)))?;

        let mut slots = self.slots.write().await;
        slots.insert(slot.to_string(), body);
        Ok(())
    }
}

#[async_trait]
impl UserTokenStore for MemoryTokenStore {
    async fn load_list_uris(&self) -> Result<Vec<String>> {
        self.read_slot(LIST_URIS_SLOT).await
    }

    async fn save_list_uris(&self, uris: &[String]) -> Result<()> {
        self.write_slot(LIST_URIS_SLOT, uris).await
    }

    async fn load_user_tokens(&self) -> Result<Vec<Token>> {
        self.read_slot(USER_TOKENS_SLOT).await
    }

    async fn save_user_tokens(&self, tokens: &[Token]) -> Result<()> {
        self.write_slot(USER_TOKENS_SLOT, tokens).await
    }
}
