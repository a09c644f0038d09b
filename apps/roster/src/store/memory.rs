use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use roster_common::id::{prefix, prefixed_ulid};
use roster_common::Set;

use super::{
    default_filter_name, generate_auth_code, intersect_all, DirectoryStore, FilterStore,
    PermissionStore, RoleStore,
};
use crate::error::{Error, Result};
use crate::models::{
    Alliance, Character, Corporation, Filter, FilterRef, NewRole, Permission, Role, RoleKind,
    RolePatch,
};

#[derive(Default)]
struct State {
    filters: HashMap<String, Filter>,
    /// (filter_id, user_id)
    memberships: HashSet<(String, String)>,
    roles: HashMap<String, Role>,
    /// (role_id, filter_id)
    role_filters: HashSet<(String, String)>,
    alliances: BTreeMap<i64, Alliance>,
    corporations: BTreeMap<i64, Corporation>,
    characters: BTreeMap<i64, Character>,
    user_map: HashMap<i64, String>,
    /// code -> (character_id, used)
    auth_codes: HashMap<String, (i64, bool)>,
    permissions: HashMap<String, Permission>,
    /// (permission_id, user_id)
    permission_members: HashSet<(String, String)>,
}

impl State {
    fn filter(&self, filter: FilterRef<'_>) -> Result<&Filter> {
        self.filters
            .values()
            .find(|f| filter.matches(f))
            .ok_or_else(|| Error::not_found(format!("filter `{filter}` not found")))
    }

    fn role(&self, short_name: &str, kind: RoleKind) -> Result<&Role> {
        self.roles
            .values()
            .find(|r| r.short_name == short_name && r.kind == kind)
            .ok_or_else(|| {
                Error::not_found(format!("{} `{short_name}` not found", kind.label()))
            })
    }

    fn role_id(&self, short_name: &str, kind: RoleKind) -> Result<String> {
        self.role(short_name, kind).map(|r| r.id.clone())
    }

    fn filter_ids_of(&self, role_id: &str) -> Vec<String> {
        self.role_filters
            .iter()
            .filter(|(r, _)| r == role_id)
            .map(|(_, f)| f.clone())
            .collect()
    }

    fn members_of(&self, filter_id: &str) -> Set<String> {
        self.memberships
            .iter()
            .filter(|(f, _)| f == filter_id)
            .map(|(_, u)| u.clone())
            .collect()
    }

    fn entitlement(&self, role_id: &str) -> Set<String> {
        intersect_all(
            self.filter_ids_of(role_id)
                .iter()
                .map(|f| self.members_of(f)),
        )
    }

    fn remove_filter(&mut self, filter_id: &str) {
        self.memberships.retain(|(f, _)| f != filter_id);
        self.role_filters.retain(|(_, f)| f != filter_id);
        self.filters.remove(filter_id);
    }
}

/// In-memory [`Store`](super::Store) for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilterStore for MemoryStore {
    async fn create_filter(&self, name: &str, description: &str) -> Result<String> {
        let mut state = self.state.lock();
        if state.filters.values().any(|f| f.name == name) {
            return Err(Error::already_exists(format!("filter `{name}` already exists")));
        }
        let id = prefixed_ulid(prefix::FILTER);
        state.filters.insert(
            id.clone(),
            Filter {
                id: id.clone(),
                name: name.to_string(),
                description: description.to_string(),
            },
        );
        Ok(id)
    }

    async fn delete_filter(&self, filter: FilterRef<'_>) -> Result<()> {
        let mut state = self.state.lock();
        let id = state.filter(filter)?.id.clone();
        state.remove_filter(&id);
        Ok(())
    }

    async fn get_filter(&self, filter: FilterRef<'_>) -> Result<Filter> {
        self.state.lock().filter(filter).cloned()
    }

    async fn list_filters(&self) -> Result<Vec<Filter>> {
        let mut list: Vec<Filter> = self.state.lock().filters.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn add_filter_member(&self, filter: FilterRef<'_>, user_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let id = state.filter(filter)?.id.clone();
        if !state.memberships.insert((id, user_id.to_string())) {
            return Err(Error::already_member(format!(
                "{user_id} is already a member of `{filter}`"
            )));
        }
        Ok(())
    }

    async fn remove_filter_member(&self, filter: FilterRef<'_>, user_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let id = state.filter(filter)?.id.clone();
        state.memberships.remove(&(id, user_id.to_string()));
        Ok(())
    }

    async fn list_filter_members(&self, filter: FilterRef<'_>) -> Result<Vec<String>> {
        let state = self.state.lock();
        let id = state.filter(filter)?.id.clone();
        Ok(state.members_of(&id).to_sorted_vec())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn create_role(&self, role: &NewRole) -> Result<String> {
        role.validate()?;
        let mut state = self.state.lock();
        if state.role(&role.short_name, role.kind).is_ok() {
            return Err(Error::already_exists(format!(
                "{} `{}` already exists",
                role.kind.label(),
                role.short_name
            )));
        }
        let filter_name = default_filter_name(&role.short_name);
        if state.filters.values().any(|f| f.name == filter_name) {
            return Err(Error::already_exists(format!(
                "filter `{filter_name}` already exists"
            )));
        }

        let filter_id = prefixed_ulid(prefix::FILTER);
        state.filters.insert(
            filter_id.clone(),
            Filter {
                id: filter_id.clone(),
                name: filter_name,
                description: format!("Auto-created filter for {} {}", role.kind, role.short_name),
            },
        );

        let role_id = prefixed_ulid(prefix::ROLE);
        state.roles.insert(
            role_id.clone(),
            Role {
                id: role_id.clone(),
                kind: role.kind,
                short_name: role.short_name.clone(),
                name: role.name.clone(),
                chat_type: role.chat_type.clone(),
                joinable: role.joinable,
                sync: role.initial_sync(),
                chat_id: None,
                color: 0,
                hoist: false,
                position: 0,
                permissions: 0,
                mentionable: false,
                managed: false,
            },
        );
        state.role_filters.insert((role_id.clone(), filter_id));
        Ok(role_id)
    }

    async fn delete_role(&self, short_name: &str, kind: RoleKind) -> Result<()> {
        let mut state = self.state.lock();
        let role_id = state.role_id(short_name, kind)?;
        for filter_id in state.filter_ids_of(&role_id) {
            state.remove_filter(&filter_id);
        }
        state.role_filters.retain(|(r, _)| *r != role_id);
        state.roles.remove(&role_id);
        Ok(())
    }

    async fn get_role(&self, short_name: &str, kind: RoleKind) -> Result<Role> {
        self.state.lock().role(short_name, kind).cloned()
    }

    async fn list_roles(&self, kind: Option<RoleKind>) -> Result<Vec<Role>> {
        let mut list: Vec<Role> = self
            .state
            .lock()
            .roles
            .values()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        Ok(list)
    }

    async fn role_by_chat_id(&self, chat_id: &str) -> Result<Option<Role>> {
        Ok(self
            .state
            .lock()
            .roles
            .values()
            .find(|r| r.chat_id.as_deref() == Some(chat_id))
            .cloned())
    }

    async fn update_role_attributes(
        &self,
        short_name: &str,
        kind: RoleKind,
        patch: &RolePatch,
    ) -> Result<Role> {
        patch.validate()?;
        let mut state = self.state.lock();
        let role_id = state.role_id(short_name, kind)?;
        let role = state
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| Error::not_found("role vanished"))?;
        role.apply(patch);
        Ok(role.clone())
    }

    async fn set_role_chat_id(&self, role_id: &str, chat_id: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        let role = state
            .roles
            .get_mut(role_id)
            .ok_or_else(|| Error::not_found(format!("role {role_id} not found")))?;
        role.chat_id = chat_id.map(str::to_string);
        Ok(())
    }

    async fn rename_role(
        &self,
        short_name: &str,
        kind: RoleKind,
        new_short_name: &str,
        new_name: &str,
    ) -> Result<Role> {
        let mut state = self.state.lock();
        let role_id = state.role_id(short_name, kind)?;
        if new_short_name != short_name && state.role(new_short_name, kind).is_ok() {
            return Err(Error::already_exists(format!(
                "{} `{new_short_name}` already exists",
                kind.label()
            )));
        }

        let old_filter = default_filter_name(short_name);
        let new_filter = default_filter_name(new_short_name);
        let linked = state.filter_ids_of(&role_id);
        if let Some(filter) = state
            .filters
            .values_mut()
            .find(|f| f.name == old_filter && linked.contains(&f.id))
        {
            filter.name = new_filter;
        }

        let role = state
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| Error::not_found("role vanished"))?;
        role.short_name = new_short_name.to_string();
        role.name = new_name.to_string();
        Ok(role.clone())
    }

    async fn role_filters(&self, short_name: &str, kind: RoleKind) -> Result<Vec<Filter>> {
        let state = self.state.lock();
        let role_id = state.role_id(short_name, kind)?;
        let mut list: Vec<Filter> = state
            .filter_ids_of(&role_id)
            .iter()
            .filter_map(|id| state.filters.get(id).cloned())
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn filter_roles(&self, filter: FilterRef<'_>) -> Result<Vec<Role>> {
        let state = self.state.lock();
        let filter_id = state.filter(filter)?.id.clone();
        let mut list: Vec<Role> = state
            .role_filters
            .iter()
            .filter(|(_, f)| *f == filter_id)
            .filter_map(|(r, _)| state.roles.get(r).cloned())
            .collect();
        list.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        Ok(list)
    }

    async fn attach_filter(
        &self,
        short_name: &str,
        kind: RoleKind,
        filter: FilterRef<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let role_id = state.role_id(short_name, kind)?;
        let filter_id = state.filter(filter)?.id.clone();
        if !state.role_filters.insert((role_id, filter_id)) {
            return Err(Error::already_exists(format!(
                "filter `{filter}` is already attached to `{short_name}`"
            )));
        }
        Ok(())
    }

    async fn detach_filter(
        &self,
        short_name: &str,
        kind: RoleKind,
        filter: FilterRef<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let role_id = state.role_id(short_name, kind)?;
        let filter_id = state.filter(filter)?.id.clone();
        if !state.role_filters.remove(&(role_id, filter_id)) {
            return Err(Error::not_found(format!(
                "filter `{filter}` is not attached to `{short_name}`"
            )));
        }
        Ok(())
    }

    async fn get_role_entitlement(&self, short_name: &str, kind: RoleKind) -> Result<Vec<String>> {
        let state = self.state.lock();
        let role_id = state.role_id(short_name, kind)?;
        Ok(state.entitlement(&role_id).to_sorted_vec())
    }

    async fn user_entitlements(&self, user_id: &str) -> Result<Vec<Role>> {
        let state = self.state.lock();
        let user = user_id.to_string();
        let mut list: Vec<Role> = state
            .roles
            .values()
            .filter(|r| state.entitlement(&r.id).contains(&user))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        Ok(list)
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn list_alliances(&self) -> Result<Vec<Alliance>> {
        Ok(self.state.lock().alliances.values().cloned().collect())
    }

    async fn get_alliance(&self, id: i64) -> Result<Option<Alliance>> {
        Ok(self.state.lock().alliances.get(&id).cloned())
    }

    async fn upsert_alliance(&self, alliance: &Alliance) -> Result<()> {
        self.state
            .lock()
            .alliances
            .insert(alliance.id, alliance.clone());
        Ok(())
    }

    async fn delete_alliance(&self, id: i64) -> Result<()> {
        self.state.lock().alliances.remove(&id);
        Ok(())
    }

    async fn list_corporations(&self) -> Result<Vec<Corporation>> {
        Ok(self.state.lock().corporations.values().cloned().collect())
    }

    async fn get_corporation(&self, id: i64) -> Result<Option<Corporation>> {
        Ok(self.state.lock().corporations.get(&id).cloned())
    }

    async fn upsert_corporation(&self, corporation: &Corporation) -> Result<()> {
        self.state
            .lock()
            .corporations
            .insert(corporation.id, corporation.clone());
        Ok(())
    }

    async fn insert_corporation_stub(&self, id: i64) -> Result<()> {
        self.state
            .lock()
            .corporations
            .entry(id)
            .or_insert_with(|| Corporation::stub(id));
        Ok(())
    }

    async fn delete_corporation(&self, id: i64) -> Result<()> {
        self.state.lock().corporations.remove(&id);
        Ok(())
    }

    async fn list_characters(&self) -> Result<Vec<Character>> {
        Ok(self.state.lock().characters.values().cloned().collect())
    }

    async fn get_character(&self, id: i64) -> Result<Option<Character>> {
        Ok(self.state.lock().characters.get(&id).cloned())
    }

    async fn upsert_character(&self, character: &Character) -> Result<()> {
        self.state
            .lock()
            .characters
            .insert(character.id, character.clone());
        Ok(())
    }

    async fn delete_character(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.auth_codes.retain(|_, (c, _)| *c != id);
        state.user_map.remove(&id);
        state.characters.remove(&id);
        Ok(())
    }

    async fn user_for_character(&self, character_id: i64) -> Result<Option<String>> {
        Ok(self.state.lock().user_map.get(&character_id).cloned())
    }

    async fn link_character(&self, user_id: &str, character_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        if !state.characters.contains_key(&character_id) {
            return Err(Error::not_found(format!("character {character_id} not found")));
        }
        state.user_map.retain(|_, u| u != user_id);
        state.user_map.insert(character_id, user_id.to_string());
        Ok(())
    }

    async fn create_auth_code(&self, character_id: i64) -> Result<String> {
        let mut state = self.state.lock();
        if !state.characters.contains_key(&character_id) {
            return Err(Error::not_found(format!("character {character_id} not found")));
        }
        let code = generate_auth_code();
        state.auth_codes.insert(code.clone(), (character_id, false));
        Ok(code)
    }

    async fn redeem_auth_code(&self, code: &str, user_id: &str) -> Result<Character> {
        let mut state = self.state.lock();
        let character_id = match state.auth_codes.get_mut(code) {
            Some((character_id, used)) if !*used => {
                *used = true;
                *character_id
            }
            _ => return Err(Error::not_found("unknown or used auth code")),
        };
        let character = state
            .characters
            .get(&character_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("character {character_id} not found")))?;
        state.user_map.retain(|_, u| u != user_id);
        state.user_map.insert(character_id, user_id.to_string());
        Ok(character)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn ensure_permission(&self, name: &str, description: &str) -> Result<Permission> {
        let mut state = self.state.lock();
        let permission = state
            .permissions
            .entry(name.to_string())
            .or_insert_with(|| Permission {
                id: prefixed_ulid(prefix::PERMISSION),
                name: name.to_string(),
                description: description.to_string(),
            });
        Ok(permission.clone())
    }

    async fn grant_permission(&self, name: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let id = state
            .permissions
            .get(name)
            .map(|p| p.id.clone())
            .ok_or_else(|| Error::not_found(format!("permission `{name}` not found")))?;
        if !state.permission_members.insert((id, user_id.to_string())) {
            return Err(Error::already_member(format!("{user_id} already holds `{name}`")));
        }
        Ok(())
    }

    async fn revoke_permission(&self, name: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let id = state
            .permissions
            .get(name)
            .map(|p| p.id.clone())
            .ok_or_else(|| Error::not_found(format!("permission `{name}` not found")))?;
        state.permission_members.remove(&(id, user_id.to_string()));
        Ok(())
    }

    async fn has_permission(&self, user_id: &str, name: &str) -> Result<bool> {
        let state = self.state.lock();
        Ok(state.permissions.get(name).is_some_and(|p| {
            state
                .permission_members
                .contains(&(p.id.clone(), user_id.to_string()))
        }))
    }
}
