//! Relational state: filters, roles, the directory mirror and permissions.
//!
//! Every call is one logical operation against fresh state; nothing is cached
//! between calls. [`PgStore`] is the production backend, [`MemoryStore`]
//! backs tests and local runs with the same semantics.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use roster_common::Set;

use crate::error::Result;
use crate::models::{
    Alliance, Character, Corporation, Filter, FilterRef, NewRole, Permission, Role, RoleKind,
    RolePatch,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait FilterStore: Send + Sync {
    /// Fails `AlreadyExists` on a duplicate name.
    async fn create_filter(&self, name: &str, description: &str) -> Result<String>;
    /// Deletes the filter with its memberships and role links.
    async fn delete_filter(&self, filter: FilterRef<'_>) -> Result<()>;
    async fn get_filter(&self, filter: FilterRef<'_>) -> Result<Filter>;
    async fn list_filters(&self) -> Result<Vec<Filter>>;
    /// Fails `AlreadyMember` if the user is already in the filter.
    async fn add_filter_member(&self, filter: FilterRef<'_>, user_id: &str) -> Result<()>;
    /// Removing a non-member succeeds.
    async fn remove_filter_member(&self, filter: FilterRef<'_>, user_id: &str) -> Result<()>;
    async fn list_filter_members(&self, filter: FilterRef<'_>) -> Result<Vec<String>>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Creates the role together with its default filter and link.
    async fn create_role(&self, role: &NewRole) -> Result<String>;
    /// Deletes the role, every attached filter and their memberships.
    async fn delete_role(&self, short_name: &str, kind: RoleKind) -> Result<()>;
    async fn get_role(&self, short_name: &str, kind: RoleKind) -> Result<Role>;
    async fn list_roles(&self, kind: Option<RoleKind>) -> Result<Vec<Role>>;
    async fn role_by_chat_id(&self, chat_id: &str) -> Result<Option<Role>>;
    async fn update_role_attributes(
        &self,
        short_name: &str,
        kind: RoleKind,
        patch: &RolePatch,
    ) -> Result<Role>;
    async fn set_role_chat_id(&self, role_id: &str, chat_id: Option<&str>) -> Result<()>;
    /// Changes the short name and display name; the default filter follows.
    async fn rename_role(
        &self,
        short_name: &str,
        kind: RoleKind,
        new_short_name: &str,
        new_name: &str,
    ) -> Result<Role>;
    async fn role_filters(&self, short_name: &str, kind: RoleKind) -> Result<Vec<Filter>>;
    /// Roles the filter is attached to.
    async fn filter_roles(&self, filter: FilterRef<'_>) -> Result<Vec<Role>>;
    async fn attach_filter(
        &self,
        short_name: &str,
        kind: RoleKind,
        filter: FilterRef<'_>,
    ) -> Result<()>;
    async fn detach_filter(
        &self,
        short_name: &str,
        kind: RoleKind,
        filter: FilterRef<'_>,
    ) -> Result<()>;
    /// Users that are members of every filter attached to the role.
    async fn get_role_entitlement(&self, short_name: &str, kind: RoleKind) -> Result<Vec<String>>;
    /// Every role, of either kind, the user is entitled to.
    async fn user_entitlements(&self, user_id: &str) -> Result<Vec<Role>>;
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn list_alliances(&self) -> Result<Vec<Alliance>>;
    async fn get_alliance(&self, id: i64) -> Result<Option<Alliance>>;
    async fn upsert_alliance(&self, alliance: &Alliance) -> Result<()>;
    async fn delete_alliance(&self, id: i64) -> Result<()>;

    async fn list_corporations(&self) -> Result<Vec<Corporation>>;
    async fn get_corporation(&self, id: i64) -> Result<Option<Corporation>>;
    async fn upsert_corporation(&self, corporation: &Corporation) -> Result<()>;
    /// Inserts a placeholder row unless the corporation is already known.
    async fn insert_corporation_stub(&self, id: i64) -> Result<()>;
    async fn delete_corporation(&self, id: i64) -> Result<()>;

    async fn list_characters(&self) -> Result<Vec<Character>>;
    async fn get_character(&self, id: i64) -> Result<Option<Character>>;
    async fn upsert_character(&self, character: &Character) -> Result<()>;
    /// Deletes the character with its auth codes and user mapping.
    async fn delete_character(&self, id: i64) -> Result<()>;

    async fn user_for_character(&self, character_id: i64) -> Result<Option<String>>;
    async fn link_character(&self, user_id: &str, character_id: i64) -> Result<()>;
    async fn create_auth_code(&self, character_id: i64) -> Result<String>;
    /// Consumes a one-time code and links the character to `user_id`.
    async fn redeem_auth_code(&self, code: &str, user_id: &str) -> Result<Character>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn ensure_permission(&self, name: &str, description: &str) -> Result<Permission>;
    async fn grant_permission(&self, name: &str, user_id: &str) -> Result<()>;
    async fn revoke_permission(&self, name: &str, user_id: &str) -> Result<()>;
    async fn has_permission(&self, user_id: &str, name: &str) -> Result<bool>;
}

/// Everything the service needs from the relational store.
pub trait Store: FilterStore + RoleStore + DirectoryStore + PermissionStore {}

impl<T: FilterStore + RoleStore + DirectoryStore + PermissionStore> Store for T {}

/// Name of the filter created alongside a role.
pub fn default_filter_name(short_name: &str) -> String {
    short_name.to_string()
}

/// Intersection of every set; no sets means nobody.
pub fn intersect_all(mut sets: impl Iterator<Item = Set<String>>) -> Set<String> {
    let Some(first) = sets.next() else {
        return Set::new();
    };
    sets.fold(first, |acc, s| acc.intersection(&s))
}

/// A fresh one-time auth code.
pub fn generate_auth_code() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> Set<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn intersect_all_of_nothing_is_empty() {
        assert!(intersect_all(std::iter::empty()).is_empty());
    }

    #[test]
    fn intersect_all_is_conjunctive() {
        let out = intersect_all(vec![set(&["a", "b"]), set(&["b", "c"])].into_iter());
        assert_eq!(out.to_sorted_vec(), vec!["b"]);
    }

    #[test]
    fn auth_codes_are_uppercase_alphanumeric() {
        let code = generate_auth_code();
        assert_eq!(code.len(), 12);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
