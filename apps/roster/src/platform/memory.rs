//! In-process guild used by tests and local runs.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use roster_common::SnowflakeGenerator;

use super::{ChatPlatform, Member, PlatformError, PlatformResult, PlatformRole, RoleAttrs};

#[derive(Default)]
struct Guild {
    roles: Vec<PlatformRole>,
    members: HashMap<String, BTreeSet<String>>,
    /// Errors returned, in order, by the next mutating calls.
    faults: VecDeque<PlatformError>,
    mutations: usize,
    /// Accept a create whose name is taken, as Discord does.
    duplicate_names: bool,
    /// Latency added to `list_roles` after its snapshot is taken.
    list_delay: Duration,
}

/// A single guild kept in memory. By default role names are unique and a
/// second create under the same name fails `AlreadyExists`;
/// [`MemoryPlatform::allow_duplicate_names`] switches to Discord's behaviour.
pub struct MemoryPlatform {
    guild_id: String,
    ids: SnowflakeGenerator,
    guild: Mutex<Guild>,
}

impl MemoryPlatform {
    pub fn new(guild_id: &str) -> Self {
        let platform = Self {
            guild_id: guild_id.to_string(),
            ids: SnowflakeGenerator::new(1),
            guild: Mutex::new(Guild::default()),
        };
        // The everyone role shares the guild's id.
        platform.guild.lock().roles.push(PlatformRole {
            id: guild_id.to_string(),
            name: "@everyone".to_string(),
            color: 0,
            hoist: false,
            position: 0,
            permissions: 0,
            mentionable: false,
            managed: false,
        });
        platform
    }

    /// Seed a role directly, bypassing the mutation counters.
    pub fn seed_role(&self, attrs: &RoleAttrs, managed: bool) -> String {
        let id = self.ids.generate_string();
        self.guild.lock().roles.push(PlatformRole {
            id: id.clone(),
            name: attrs.name.clone(),
            color: attrs.color,
            hoist: attrs.hoist,
            position: attrs.position,
            permissions: attrs.permissions,
            mentionable: attrs.mentionable,
            managed,
        });
        id
    }

    /// Put a user in the guild with the given role ids.
    pub fn seed_member(&self, user_id: &str, roles: &[&str]) {
        self.guild.lock().members.insert(
            user_id.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
    }

    /// Make the next mutating call fail with `err`.
    pub fn fail_next(&self, err: PlatformError) {
        self.guild.lock().faults.push_back(err);
    }

    pub fn allow_duplicate_names(&self) {
        self.guild.lock().duplicate_names = true;
    }

    /// Make every role listing return a snapshot that is `delay` old.
    pub fn set_list_delay(&self, delay: Duration) {
        self.guild.lock().list_delay = delay;
    }

    pub fn roles(&self) -> Vec<PlatformRole> {
        self.guild.lock().roles.clone()
    }

    pub fn role_named(&self, name: &str) -> Option<PlatformRole> {
        self.guild
            .lock()
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    pub fn member_roles(&self, user_id: &str) -> Vec<String> {
        self.guild
            .lock()
            .members
            .get(user_id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of successful mutating calls so far.
    pub fn mutations(&self) -> usize {
        self.guild.lock().mutations
    }

    fn check_guild(&self, guild_id: &str) -> PlatformResult<()> {
        if guild_id != self.guild_id {
            return Err(PlatformError::NotFound(format!("guild {guild_id}")));
        }
        Ok(())
    }
}

impl Guild {
    fn begin_mutation(&mut self) -> PlatformResult<()> {
        if let Some(err) = self.faults.pop_front() {
            return Err(err);
        }
        self.mutations += 1;
        Ok(())
    }

    fn role_mut(&mut self, role_id: &str) -> PlatformResult<&mut PlatformRole> {
        self.roles
            .iter_mut()
            .find(|r| r.id == role_id)
            .ok_or_else(|| PlatformError::NotFound(format!("role {role_id}")))
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    async fn create_role(&self, guild_id: &str, attrs: &RoleAttrs) -> PlatformResult<PlatformRole> {
        self.check_guild(guild_id)?;
        let mut guild = self.guild.lock();
        if !guild.duplicate_names && guild.roles.iter().any(|r| r.name == attrs.name) {
            return Err(PlatformError::AlreadyExists(attrs.name.clone()));
        }
        guild.begin_mutation()?;

        let role = PlatformRole {
            id: self.ids.generate_string(),
            name: attrs.name.clone(),
            color: attrs.color,
            hoist: attrs.hoist,
            position: attrs.position,
            permissions: attrs.permissions,
            mentionable: attrs.mentionable,
            managed: false,
        };
        guild.roles.push(role.clone());
        Ok(role)
    }

    async fn edit_role(
        &self,
        guild_id: &str,
        role_id: &str,
        attrs: &RoleAttrs,
    ) -> PlatformResult<PlatformRole> {
        self.check_guild(guild_id)?;
        let mut guild = self.guild.lock();
        guild.role_mut(role_id)?;
        guild.begin_mutation()?;

        let role = guild.role_mut(role_id)?;
        role.name = attrs.name.clone();
        role.color = attrs.color;
        role.hoist = attrs.hoist;
        role.position = attrs.position;
        role.permissions = attrs.permissions;
        role.mentionable = attrs.mentionable;
        Ok(role.clone())
    }

    async fn delete_role(&self, guild_id: &str, role_id: &str) -> PlatformResult<()> {
        self.check_guild(guild_id)?;
        let mut guild = self.guild.lock();
        guild.role_mut(role_id)?;
        guild.begin_mutation()?;

        guild.roles.retain(|r| r.id != role_id);
        for roles in guild.members.values_mut() {
            roles.remove(role_id);
        }
        Ok(())
    }

    async fn list_roles(&self, guild_id: &str) -> PlatformResult<Vec<PlatformRole>> {
        self.check_guild(guild_id)?;
        let (roles, delay) = {
            let guild = self.guild.lock();
            (guild.roles.clone(), guild.list_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(roles)
    }

    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> PlatformResult<()> {
        self.check_guild(guild_id)?;
        let mut guild = self.guild.lock();
        guild.role_mut(role_id)?;
        if !guild.members.contains_key(user_id) {
            return Err(PlatformError::NotFound(format!("member {user_id}")));
        }
        guild.begin_mutation()?;

        if let Some(roles) = guild.members.get_mut(user_id) {
            roles.insert(role_id.to_string());
        }
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> PlatformResult<()> {
        self.check_guild(guild_id)?;
        let mut guild = self.guild.lock();
        if !guild.members.contains_key(user_id) {
            return Err(PlatformError::NotFound(format!("member {user_id}")));
        }
        guild.begin_mutation()?;

        if let Some(roles) = guild.members.get_mut(user_id) {
            roles.remove(role_id);
        }
        Ok(())
    }

    async fn get_member(&self, guild_id: &str, user_id: &str) -> PlatformResult<Member> {
        self.check_guild(guild_id)?;
        let guild = self.guild.lock();
        let roles = guild
            .members
            .get(user_id)
            .ok_or_else(|| PlatformError::NotFound(format!("member {user_id}")))?;
        Ok(Member {
            user_id: user_id.to_string(),
            roles: roles.iter().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(name: &str) -> RoleAttrs {
        RoleAttrs {
            name: name.to_string(),
            ..RoleAttrs::default()
        }
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let platform = MemoryPlatform::new("1");
        platform.create_role("1", &attrs("AAA")).await.unwrap();
        let err = platform.create_role("1", &attrs("AAA")).await.unwrap_err();
        assert!(matches!(err, PlatformError::AlreadyExists(_)));
        assert_eq!(platform.mutations(), 1);
    }

    #[tokio::test]
    async fn lenient_guild_accepts_duplicate_names() {
        let platform = MemoryPlatform::new("1");
        platform.allow_duplicate_names();
        platform.create_role("1", &attrs("AAA")).await.unwrap();
        platform.create_role("1", &attrs("AAA")).await.unwrap();
        let named = platform.roles().into_iter().filter(|r| r.name == "AAA").count();
        assert_eq!(named, 2);
    }

    #[tokio::test]
    async fn deleting_a_role_strips_it_from_members() {
        let platform = MemoryPlatform::new("1");
        let role = platform.create_role("1", &attrs("AAA")).await.unwrap();
        platform.seed_member("u1", &[&role.id]);

        platform.delete_role("1", &role.id).await.unwrap();

        assert!(platform.member_roles("u1").is_empty());
        let err = platform.delete_role("1", &role.id).await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let platform = MemoryPlatform::new("1");
        platform.fail_next(PlatformError::Transport("reset".into()));

        assert!(platform.create_role("1", &attrs("AAA")).await.is_err());
        assert!(platform.create_role("1", &attrs("AAA")).await.is_ok());
    }
}
