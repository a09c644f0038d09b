//! Wire format of the actions exchanged between the reconcilers and the actuator.

use serde::{Deserialize, Serialize};

use crate::models::Role;
use crate::platform::RoleAttrs;

pub const ROLES_TOPIC: &str = "roles";
pub const MEMBERS_TOPIC: &str = "members";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleActionKind {
    Create,
    #[serde(alias = "update")]
    Upsert,
    Delete,
}

/// Role attributes as carried on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePayload {
    /// Platform id, when the role is known to exist there.
    #[serde(default)]
    pub id: Option<String>,
    /// Store id of the role the action was derived from.
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(flatten)]
    pub attrs: RoleAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAction {
    pub action: RoleActionKind,
    pub role: RolePayload,
}

impl RoleAction {
    pub fn create(role: &Role) -> Self {
        Self {
            action: RoleActionKind::Create,
            role: RolePayload {
                id: None,
                store_id: Some(role.id.clone()),
                attrs: RoleAttrs::from(role),
            },
        }
    }

    pub fn upsert(role: &Role, platform_id: &str) -> Self {
        Self {
            action: RoleActionKind::Upsert,
            role: RolePayload {
                id: Some(platform_id.to_string()),
                store_id: Some(role.id.clone()),
                attrs: RoleAttrs::from(role),
            },
        }
    }

    pub fn delete(platform_id: &str, name: &str) -> Self {
        Self {
            action: RoleActionKind::Delete,
            role: RolePayload {
                id: Some(platform_id.to_string()),
                store_id: None,
                attrs: RoleAttrs {
                    name: name.to_string(),
                    ..RoleAttrs::default()
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberActionKind {
    Add,
    #[serde(alias = "update")]
    Upsert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAction {
    pub action: MemberActionKind,
    pub guild_id: String,
    pub member_id: String,
    pub role_id: String,
}

impl MemberAction {
    pub fn add(guild_id: &str, member_id: &str, role_id: &str) -> Self {
        Self::new(MemberActionKind::Add, guild_id, member_id, role_id)
    }

    pub fn delete(guild_id: &str, member_id: &str, role_id: &str) -> Self {
        Self::new(MemberActionKind::Delete, guild_id, member_id, role_id)
    }

    fn new(action: MemberActionKind, guild_id: &str, member_id: &str, role_id: &str) -> Self {
        Self {
            action,
            guild_id: guild_id.to_string(),
            member_id: member_id.to_string(),
            role_id: role_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_action_uses_camel_case_keys() {
        let json = serde_json::to_value(MemberAction::add("1", "2", "3")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"action":"add","guildId":"1","memberId":"2","roleId":"3"})
        );
    }

    #[test]
    fn update_is_accepted_as_upsert() {
        let action: MemberAction = serde_json::from_str(
            r#"{"action":"update","guildId":"1","memberId":"2","roleId":"3"}"#,
        )
        .unwrap();
        assert_eq!(action.action, MemberActionKind::Upsert);
    }

    #[test]
    fn role_payload_flattens_attributes() {
        let action: RoleAction = serde_json::from_str(
            r#"{"action":"create","role":{"name":"BBB","color":255,"mentionable":true}}"#,
        )
        .unwrap();
        assert_eq!(action.action, RoleActionKind::Create);
        assert_eq!(action.role.id, None);
        assert_eq!(action.role.attrs.name, "BBB");
        assert_eq!(action.role.attrs.color, 255);
        assert!(action.role.attrs.mentionable);
        assert!(!action.role.attrs.hoist);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let res: Result<RoleAction, _> =
            serde_json::from_str(r#"{"action":"rename","role":{"name":"x"}}"#);
        assert!(res.is_err());
    }
}
