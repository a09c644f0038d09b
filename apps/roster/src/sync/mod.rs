//! Pulls alliance, corporation and character truth from the directory and
//! folds it into roles, filters and filter membership.
//!
//! Alliance and corporation tickers double as the short names of their
//! `role`-kind roles, so a unit's filter is the one named after its ticker.

pub mod report;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio_util::sync::CancellationToken;

use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::models::{Alliance, Character, Corporation, FilterRef, NewRole, RoleKind, RolePatch};
use crate::reconcile::MemberReconciler;
use crate::store::{default_filter_name, Store};

pub use report::{ClassReport, PollReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterOutcome {
    Synced,
    Deleted,
    /// Another pass holds this character.
    InFlight,
}

pub struct DirectorySync {
    store: Arc<dyn Store>,
    directory: Arc<dyn Directory>,
    members: Arc<MemberReconciler>,
    in_flight: DashSet<i64>,
    cancel: CancellationToken,
}

/// Releases a character's single-flight claim on drop.
struct Claim<'a> {
    set: &'a DashSet<i64>,
    id: i64,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl DirectorySync {
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn Directory>,
        members: Arc<MemberReconciler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            directory,
            members,
            in_flight: DashSet::new(),
            cancel,
        }
    }

    /// Poll immediately, then on every tick of `interval` until cancelled.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = timer.tick() => {}
            }
            self.poll_once().await;
        }

        tracing::info!("directory sync stopped");
    }

    pub async fn poll_once(&self) -> PollReport {
        let report = PollReport {
            alliances: self.poll_alliances().await,
            corporations: self.poll_corporations().await,
            characters: self.poll_characters().await,
        };

        tracing::info!(
            alliances = %report.alliances,
            corporations = %report.corporations,
            characters = %report.characters,
            "directory poll finished"
        );
        report
    }

    async fn poll_alliances(&self) -> ClassReport {
        let alliances = match self.store.list_alliances().await {
            Ok(alliances) => alliances,
            Err(err) => {
                tracing::warn!(?err, "listing alliances failed");
                return ClassReport::aborted();
            }
        };

        let mut report = ClassReport::default();
        for alliance in alliances {
            if self.cancel.is_cancelled() {
                report.skipped += 1;
                continue;
            }
            match self.sync_alliance(alliance.id).await {
                Ok(_) => report.processed += 1,
                Err(err) => {
                    tracing::warn!(alliance_id = alliance.id, ?err, "alliance sync failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn poll_corporations(&self) -> ClassReport {
        let corporations = match self.store.list_corporations().await {
            Ok(corporations) => corporations,
            Err(err) => {
                tracing::warn!(?err, "listing corporations failed");
                return ClassReport::aborted();
            }
        };

        let mut report = ClassReport::default();
        for corporation in corporations {
            if self.cancel.is_cancelled() {
                report.skipped += 1;
                continue;
            }
            match self.sync_corporation(corporation.id).await {
                Ok(_) => report.processed += 1,
                Err(err) => {
                    tracing::warn!(corporation_id = corporation.id, ?err, "corporation sync failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn poll_characters(&self) -> ClassReport {
        let characters = match self.store.list_characters().await {
            Ok(characters) => characters,
            Err(err) => {
                tracing::warn!(?err, "listing characters failed");
                return ClassReport::aborted();
            }
        };

        let mut report = ClassReport::default();
        for character in characters {
            if self.cancel.is_cancelled() {
                report.skipped += 1;
                continue;
            }
            match self.sync_character(character.id).await {
                Ok(CharacterOutcome::InFlight) => report.skipped += 1,
                Ok(_) => report.processed += 1,
                Err(err) => {
                    tracing::warn!(character_id = character.id, ?err, "character sync failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Refresh one alliance. `None` means it is gone and has been removed.
    pub async fn sync_alliance(&self, id: i64) -> Result<Option<Alliance>> {
        let stored = self.store.get_alliance(id).await?;

        let Some(record) = self.fetch(self.directory.get_alliance(id)).await? else {
            tracing::info!(alliance_id = id, "alliance dissolved");
            if let Some(stored) = &stored {
                self.delete_unit_role(&stored.ticker).await?;
            }
            self.store.delete_alliance(id).await?;
            return Ok(None);
        };

        let alliance = Alliance {
            id,
            name: record.name,
            ticker: record.ticker,
        };
        if stored.as_ref() != Some(&alliance) {
            self.store.upsert_alliance(&alliance).await?;
        }
        self.ensure_unit_role(
            stored.as_ref().map(|a| a.ticker.as_str()),
            &alliance.ticker,
            &alliance.name,
        )
        .await?;

        Ok(Some(alliance))
    }

    /// Refresh one corporation, migrating its members between alliance
    /// filters when its alliance changed.
    pub async fn sync_corporation(&self, id: i64) -> Result<Option<Corporation>> {
        let stored = self.store.get_corporation(id).await?;

        let Some(record) = self.fetch(self.directory.get_corporation(id)).await? else {
            tracing::info!(corporation_id = id, "corporation closed");
            if let Some(stored) = &stored {
                self.delete_unit_role(&stored.ticker).await?;
            }
            self.store.delete_corporation(id).await?;
            return Ok(None);
        };

        let corporation = Corporation {
            id,
            name: record.name,
            ticker: record.ticker,
            alliance_id: record.alliance_id,
        };
        if stored.as_ref() != Some(&corporation) {
            self.store.upsert_corporation(&corporation).await?;
        }
        self.ensure_unit_role(
            stored.as_ref().map(|c| c.ticker.as_str()),
            &corporation.ticker,
            &corporation.name,
        )
        .await?;

        let old_alliance = stored.as_ref().and_then(|c| c.alliance_id);
        if old_alliance != corporation.alliance_id {
            self.migrate_corporation(&corporation, old_alliance).await?;
        } else if let Some(alliance_id) = corporation.alliance_id {
            if self.store.get_alliance(alliance_id).await?.is_none() {
                self.sync_alliance(alliance_id).await?;
            }
        }

        Ok(Some(corporation))
    }

    async fn migrate_corporation(
        &self,
        corporation: &Corporation,
        old_alliance: Option<i64>,
    ) -> Result<()> {
        tracing::info!(
            corporation_id = corporation.id,
            ?old_alliance,
            new_alliance = ?corporation.alliance_id,
            "corporation changed alliance"
        );

        let members = match self
            .store
            .get_role_entitlement(&corporation.ticker, RoleKind::Role)
            .await
        {
            Ok(members) => members,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err),
        };

        if let Some(old) = old_alliance {
            if let Some(alliance) = self.store.get_alliance(old).await? {
                for user_id in &members {
                    self.leave_unit(&alliance.ticker, user_id).await?;
                }
            }
        }

        if let Some(new) = corporation.alliance_id {
            if let Some(alliance) = self.sync_alliance(new).await? {
                for user_id in &members {
                    self.join_unit(&alliance.ticker, user_id).await?;
                }
            }
        }

        Ok(())
    }

    /// Refresh one character and queue the role changes its user needs.
    pub async fn sync_character(&self, id: i64) -> Result<CharacterOutcome> {
        if !self.in_flight.insert(id) {
            tracing::debug!(character_id = id, "character already in flight");
            return Ok(CharacterOutcome::InFlight);
        }
        let _claim = Claim {
            set: &self.in_flight,
            id,
        };

        let Some(stored) = self.store.get_character(id).await? else {
            return Ok(CharacterOutcome::Deleted);
        };

        let Some(record) = self.fetch(self.directory.get_character(id)).await? else {
            tracing::info!(character_id = id, "character gone, deleting");
            self.store.delete_character(id).await?;
            return Ok(CharacterOutcome::Deleted);
        };

        if record.corporation_id == 0 {
            return Err(Error::transient(format!(
                "directory reported no corporation for character {id}"
            )));
        }

        let new_corp = self.known_corporation(record.corporation_id).await?;
        let old_corp = if stored.corporation_id == record.corporation_id {
            None
        } else {
            self.store.get_corporation(stored.corporation_id).await?
        };

        let character = Character {
            id,
            name: record.name,
            corporation_id: record.corporation_id,
            token: stored.token.clone(),
        };
        if character != stored {
            self.store.upsert_character(&character).await?;
        }

        let Some(user_id) = self.store.user_for_character(id).await? else {
            return Ok(CharacterOutcome::Synced);
        };

        if let Some(old_corp) = &old_corp {
            tracing::info!(
                character_id = id,
                from = old_corp.id,
                to = new_corp.id,
                "character changed corporation"
            );
            self.leave_unit(&old_corp.ticker, &user_id).await?;
            if old_corp.alliance_id != new_corp.alliance_id {
                if let Some(alliance) = self.alliance_of(old_corp).await? {
                    self.leave_unit(&alliance.ticker, &user_id).await?;
                }
            }
        }

        self.join_unit(&new_corp.ticker, &user_id).await?;
        if let Some(alliance) = self.alliance_of(&new_corp).await? {
            self.join_unit(&alliance.ticker, &user_id).await?;
        }

        match self.members.reconcile_user(&user_id).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                tracing::debug!(character_id = id, user = %user_id, "user is not on the platform");
            }
            Err(err) => return Err(err),
        }

        Ok(CharacterOutcome::Synced)
    }

    /// Start tracking a character the directory knows about.
    pub async fn register_character(&self, id: i64, token: &str) -> Result<Character> {
        let record = self
            .fetch(self.directory.get_character(id))
            .await?
            .ok_or_else(|| Error::not_found(format!("character {id} not found")))?;
        if record.corporation_id == 0 {
            return Err(Error::transient(format!(
                "directory reported no corporation for character {id}"
            )));
        }

        self.known_corporation(record.corporation_id).await?;
        let character = Character {
            id,
            name: record.name,
            corporation_id: record.corporation_id,
            token: token.to_string(),
        };
        self.store.upsert_character(&character).await?;
        tracing::info!(character_id = id, "character registered");
        Ok(character)
    }

    /// The stored corporation, synced first if unknown. Falls back to a stub
    /// row when the directory cannot be reached.
    async fn known_corporation(&self, id: i64) -> Result<Corporation> {
        if let Some(corporation) = self.store.get_corporation(id).await? {
            return Ok(corporation);
        }
        match self.sync_corporation(id).await {
            Ok(Some(corporation)) => Ok(corporation),
            Ok(None) => self.stub_corporation(id).await,
            Err(err) if err.is_transient() => {
                tracing::warn!(corporation_id = id, ?err, "corporation fetch failed, storing stub");
                self.stub_corporation(id).await
            }
            Err(err) => Err(err),
        }
    }

    async fn stub_corporation(&self, id: i64) -> Result<Corporation> {
        self.store.insert_corporation_stub(id).await?;
        Ok(Corporation::stub(id))
    }

    async fn alliance_of(&self, corporation: &Corporation) -> Result<Option<Alliance>> {
        match corporation.alliance_id {
            Some(alliance_id) => self.store.get_alliance(alliance_id).await,
            None => Ok(None),
        }
    }

    /// Create, rename or retitle the `role`-kind role of a unit.
    async fn ensure_unit_role(&self, old_ticker: Option<&str>, ticker: &str, name: &str) -> Result<()> {
        if ticker.is_empty() {
            return Ok(());
        }

        if let Some(old) = old_ticker.filter(|old| !old.is_empty() && *old != ticker) {
            match self.store.get_role(old, RoleKind::Role).await {
                Ok(_) => {
                    tracing::info!(from = %old, to = %ticker, "renaming unit role");
                    self.store
                        .rename_role(old, RoleKind::Role, ticker, name)
                        .await?;
                    return Ok(());
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }

        match self.store.get_role(ticker, RoleKind::Role).await {
            Ok(role) if role.name == name => Ok(()),
            Ok(_) => {
                let patch = RolePatch {
                    name: Some(name.to_string()),
                    ..RolePatch::default()
                };
                self.store
                    .update_role_attributes(ticker, RoleKind::Role, &patch)
                    .await?;
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                tracing::info!(role = %ticker, "creating unit role");
                self.store
                    .create_role(&NewRole::new(RoleKind::Role, ticker, name).synced(true))
                    .await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn delete_unit_role(&self, ticker: &str) -> Result<()> {
        if ticker.is_empty() {
            return Ok(());
        }
        match self.store.delete_role(ticker, RoleKind::Role).await {
            Err(err) if !err.is_not_found() => Err(err),
            _ => Ok(()),
        }
    }

    async fn join_unit(&self, ticker: &str, user_id: &str) -> Result<()> {
        if ticker.is_empty() {
            return Ok(());
        }
        let filter = default_filter_name(ticker);
        match self
            .store
            .add_filter_member(FilterRef::Name(&filter), user_id)
            .await
        {
            Err(err) if !err.is_noop() && !err.is_not_found() => Err(err),
            _ => Ok(()),
        }
    }

    async fn leave_unit(&self, ticker: &str, user_id: &str) -> Result<()> {
        if ticker.is_empty() {
            return Ok(());
        }
        let filter = default_filter_name(ticker);
        match self
            .store
            .remove_filter_member(FilterRef::Name(&filter), user_id)
            .await
        {
            Err(err) if !err.is_not_found() => Err(err),
            _ => Ok(()),
        }
    }

    /// Race a directory call against cancellation.
    async fn fetch<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::transient("directory sync cancelled")),
            res = call => res,
        }
    }
}
