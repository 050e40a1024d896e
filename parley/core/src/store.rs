//! Conversation Persistence
//!
//! One [`PersistedConversation`] per conversation id: the dialog stack plus
//! the conversation state, saved after every turn. The orchestrator holds the
//! conversation's lock across load and save, so stores need no ordering of
//! their own.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::dialog::DialogStack;
use crate::error::StoreError;
use crate::messages::ConversationId;
use crate::state::ConversationState;

/// What is saved between turns
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedConversation {
    /// Conversation the record belongs to
    pub conversation: Option<ConversationId>,
    /// Suspended flows
    pub stack: DialogStack,
    /// Collected slots
    pub state: ConversationState,
    /// Last save
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedConversation {
    /// Empty record for a new conversation
    #[must_use]
    pub fn new(conversation: ConversationId) -> Self {
        Self {
            conversation: Some(conversation),
            ..Self::default()
        }
    }

    /// Stamp before saving
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Load/save one record per conversation
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a record, `None` for an unknown conversation
    async fn load(&self, id: &ConversationId)
        -> Result<Option<PersistedConversation>, StoreError>;

    /// Save a record, replacing any previous one
    async fn save(&self, id: &ConversationId, record: &PersistedConversation)
        -> Result<(), StoreError>;

    /// Forget a conversation
    async fn delete(&self, id: &ConversationId) -> Result<(), StoreError>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<ConversationId, PersistedConversation>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no conversation is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<PersistedConversation>, StoreError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn save(
        &self,
        id: &ConversationId,
        record: &PersistedConversation,
    ) -> Result<(), StoreError> {
        self.records.insert(id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<(), StoreError> {
        self.records.remove(id);
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// One JSON file per conversation under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$XDG_DATA_HOME/parley/conversations`
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("parley").join("conversations"))
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `id`; the name is the hex of the id so distinct ids never share a file
    fn path_for(&self, id: &ConversationId) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(id.as_str())))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<PersistedConversation>, StoreError> {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let record: PersistedConversation = serde_json::from_slice(&bytes)?;
        if let Some(ref owner) = record.conversation {
            if owner != id {
                return Err(StoreError::Corrupt(format!(
                    "{} holds conversation {owner}, expected {id}",
                    path.display()
                )));
            }
        }
        Ok(Some(record))
    }

    async fn save(
        &self,
        id: &ConversationId,
        record: &PersistedConversation,
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let path = self.path_for(id);
        let json = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<(), StoreError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}
