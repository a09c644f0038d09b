//! The external directory that owns alliance, corporation and character truth.

pub mod esi;
pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

pub use esi::EsiClient;
pub use memory::MemoryDirectory;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AllianceRecord {
    pub name: String,
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CorporationRecord {
    pub name: String,
    pub ticker: String,
    #[serde(default)]
    pub alliance_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CharacterRecord {
    pub name: String,
    #[serde(default)]
    pub corporation_id: i64,
}

/// Read-only view of the directory. `Ok(None)` means the entity is gone;
/// any error is transient.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_alliance(&self, id: i64) -> Result<Option<AllianceRecord>>;
    async fn get_corporation(&self, id: i64) -> Result<Option<CorporationRecord>>;
    async fn get_character(&self, id: i64) -> Result<Option<CharacterRecord>>;
}
