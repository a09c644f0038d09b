use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{AllianceRecord, CharacterRecord, CorporationRecord, Directory};
use crate::error::{Error, Result};

#[derive(Default)]
struct Records {
    alliances: HashMap<i64, AllianceRecord>,
    corporations: HashMap<i64, CorporationRecord>,
    characters: HashMap<i64, CharacterRecord>,
    /// Ids whose lookups fail as if the directory were unreachable.
    unavailable: HashSet<i64>,
}

/// Directory backed by maps, editable from tests.
#[derive(Default)]
pub struct MemoryDirectory {
    records: RwLock<Records>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alliance(&self, id: i64, name: &str, ticker: &str) {
        self.records.write().alliances.insert(
            id,
            AllianceRecord {
                name: name.to_string(),
                ticker: ticker.to_string(),
            },
        );
    }

    pub fn set_corporation(&self, id: i64, name: &str, ticker: &str, alliance_id: Option<i64>) {
        self.records.write().corporations.insert(
            id,
            CorporationRecord {
                name: name.to_string(),
                ticker: ticker.to_string(),
                alliance_id,
            },
        );
    }

    pub fn set_character(&self, id: i64, name: &str, corporation_id: i64) {
        self.records.write().characters.insert(
            id,
            CharacterRecord {
                name: name.to_string(),
                corporation_id,
            },
        );
    }

    pub fn remove_alliance(&self, id: i64) {
        self.records.write().alliances.remove(&id);
    }

    pub fn remove_corporation(&self, id: i64) {
        self.records.write().corporations.remove(&id);
    }

    pub fn remove_character(&self, id: i64) {
        self.records.write().characters.remove(&id);
    }

    pub fn set_unavailable(&self, id: i64, unavailable: bool) {
        let mut records = self.records.write();
        if unavailable {
            records.unavailable.insert(id);
        } else {
            records.unavailable.remove(&id);
        }
    }

    fn lookup<T: Clone>(
        &self,
        id: i64,
        table: impl FnOnce(&Records) -> &HashMap<i64, T>,
    ) -> Result<Option<T>> {
        let records = self.records.read();
        if records.unavailable.contains(&id) {
            return Err(Error::transient(format!("directory unavailable for {id}")));
        }
        Ok(table(&records).get(&id).cloned())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_alliance(&self, id: i64) -> Result<Option<AllianceRecord>> {
        self.lookup(id, |r| &r.alliances)
    }

    async fn get_corporation(&self, id: i64) -> Result<Option<CorporationRecord>> {
        self.lookup(id, |r| &r.corporations)
    }

    async fn get_character(&self, id: i64) -> Result<Option<CharacterRecord>> {
        self.lookup(id, |r| &r.characters)
    }
}
