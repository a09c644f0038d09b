use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::roles;
use crate::error::Error;

/// The two families of roles.
///
/// `Role` is organizational (alliances, corporations, staff). `Sig` is an
/// opt-in special interest group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Role,
    Sig,
}

impl RoleKind {
    pub const ALL: [RoleKind; 2] = [RoleKind::Role, RoleKind::Sig];

    /// Value stored in the `roles.kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            RoleKind::Role => "role",
            RoleKind::Sig => "sig",
        }
    }

    /// Human-readable label used in messages.
    pub fn label(self) -> &'static str {
        match self {
            RoleKind::Role => "Role",
            RoleKind::Sig => "SIG",
        }
    }

    /// Permission a user needs to create, edit or delete roles of this kind.
    pub fn admin_permission(self) -> &'static str {
        match self {
            RoleKind::Role => "role_admins",
            RoleKind::Sig => "sig_admins",
        }
    }

    /// Opt-in groups are platform-synced from creation; organizational roles are not.
    pub fn default_sync(self) -> bool {
        matches!(self, RoleKind::Sig)
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "role" | "roles" => Ok(RoleKind::Role),
            "sig" | "sigs" => Ok(RoleKind::Sig),
            other => Err(Error::invalid_input(format!("unknown role kind `{other}`"))),
        }
    }
}

/// A role as the rest of the crate sees it.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Role {
    pub id: String,
    pub kind: RoleKind,
    pub short_name: String,
    pub name: String,
    pub chat_type: String,
    pub joinable: bool,
    pub sync: bool,
    /// Identifier of the matching platform role, once it exists.
    pub chat_id: Option<String>,
    pub color: i32,
    pub hoist: bool,
    pub position: i32,
    pub permissions: i64,
    pub mentionable: bool,
    pub managed: bool,
}

impl Role {
    /// Apply every field present in `patch`.
    pub fn apply(&mut self, patch: &RolePatch) {
        if let Some(ref name) = patch.name {
            self.name = name.clone();
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(hoist) = patch.hoist {
            self.hoist = hoist;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(permissions) = patch.permissions {
            self.permissions = permissions;
        }
        if let Some(joinable) = patch.joinable {
            self.joinable = joinable;
        }
        if let Some(managed) = patch.managed {
            self.managed = managed;
        }
        if let Some(mentionable) = patch.mentionable {
            self.mentionable = mentionable;
        }
        if let Some(sync) = patch.sync {
            self.sync = sync;
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = roles)]
pub struct RoleRow {
    pub id: String,
    pub kind: String,
    pub short_name: String,
    pub name: String,
    pub chat_type: String,
    pub joinable: bool,
    pub sync: bool,
    pub chat_id: Option<String>,
    pub color: i32,
    pub hoist: bool,
    pub position: i32,
    pub permissions: i64,
    pub mentionable: bool,
    pub managed: bool,
}

impl TryFrom<RoleRow> for Role {
    type Error = Error;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(Role {
            kind: row.kind.parse().map_err(|_| {
                Error::fatal(format!("role {} has corrupt kind `{}`", row.id, row.kind))
            })?,
            id: row.id,
            short_name: row.short_name,
            name: row.name,
            chat_type: row.chat_type,
            joinable: row.joinable,
            sync: row.sync,
            chat_id: row.chat_id,
            color: row.color,
            hoist: row.hoist,
            position: row.position,
            permissions: row.permissions,
            mentionable: row.mentionable,
            managed: row.managed,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = roles)]
pub struct NewRoleRow<'a> {
    pub id: &'a str,
    pub kind: &'a str,
    pub short_name: &'a str,
    pub name: &'a str,
    pub chat_type: &'a str,
    pub joinable: bool,
    pub sync: bool,
    pub created_at: DateTime<Utc>,
}

/// Parameters of a role creation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewRole {
    pub kind: RoleKind,
    pub short_name: String,
    pub name: String,
    #[serde(default = "default_chat_type")]
    pub chat_type: String,
    #[serde(default)]
    pub joinable: bool,
    /// Overrides the kind's default sync flag.
    #[serde(default)]
    pub sync: Option<bool>,
}

fn default_chat_type() -> String {
    "discord".to_string()
}

impl NewRole {
    pub fn new(kind: RoleKind, short_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            short_name: short_name.into(),
            name: name.into(),
            chat_type: default_chat_type(),
            joinable: false,
            sync: None,
        }
    }

    pub fn joinable(mut self, joinable: bool) -> Self {
        self.joinable = joinable;
        self
    }

    pub fn synced(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    /// The sync flag the role is created with.
    pub fn initial_sync(&self) -> bool {
        self.sync.unwrap_or_else(|| self.kind.default_sync())
    }

    pub fn validate(&self) -> Result<(), Error> {
        let short = self.short_name.trim();
        if short.is_empty() {
            return Err(Error::invalid_input("short name is required"));
        }
        if short.chars().any(char::is_whitespace) {
            return Err(Error::invalid_input("short name cannot contain whitespace"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid_input("name is required"));
        }
        if self.name.len() > 100 {
            return Err(Error::invalid_input("name must be 100 characters or fewer"));
        }
        Ok(())
    }
}

/// Typed update over the editable role attributes. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, AsChangeset, ToSchema)]
#[serde(deny_unknown_fields)]
#[diesel(table_name = roles)]
pub struct RolePatch {
    pub name: Option<String>,
    pub color: Option<i32>,
    pub hoist: Option<bool>,
    pub position: Option<i32>,
    pub permissions: Option<i64>,
    pub joinable: Option<bool>,
    pub managed: Option<bool>,
    pub mentionable: Option<bool>,
    pub sync: Option<bool>,
}

impl RolePatch {
    /// Build a patch from `key=value` pairs as typed in a chat command.
    ///
    /// Keys outside the editable set and unparsable values are rejected.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut patch = RolePatch::default();
        for (key, value) in pairs {
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => patch.name = Some(value.to_string()),
                "color" => patch.color = Some(parse_color(value)?),
                "hoist" => patch.hoist = Some(parse_bool(key, value)?),
                "position" => patch.position = Some(parse_number(key, value)?),
                "permissions" => patch.permissions = Some(parse_number(key, value)?),
                "joinable" => patch.joinable = Some(parse_bool(key, value)?),
                "managed" => patch.managed = Some(parse_bool(key, value)?),
                "mentionable" => patch.mentionable = Some(parse_bool(key, value)?),
                "sync" => patch.sync = Some(parse_bool(key, value)?),
                other => return Err(Error::invalid_input(format!("invalid key `{other}`"))),
            }
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        *self == RolePatch::default()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let Some(ref name) = self.name {
            if name.trim().is_empty() {
                return Err(Error::invalid_input("name cannot be empty"));
            }
        }
        if let Some(color) = self.color {
            if !(0..=0xFF_FF_FF).contains(&color) {
                return Err(Error::invalid_input("color must be between 0 and #FFFFFF"));
            }
        }
        Ok(())
    }
}

/// Parse a color given either as decimal or as `#RRGGBB`.
pub fn parse_color(value: &str) -> Result<i32, Error> {
    let parsed = match value.strip_prefix('#') {
        Some(hex) if hex.len() == 6 => i32::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => value.parse::<i32>().ok(),
    };
    parsed
        .filter(|c| (0..=0xFF_FF_FF).contains(c))
        .ok_or_else(|| Error::invalid_input(format!("invalid color `{value}`")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_input(format!("`{key}` expects true or false"))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::invalid_input(format!("`{key}` expects a number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in RoleKind::ALL {
            assert_eq!(kind.as_str().parse::<RoleKind>().unwrap(), kind);
        }
        assert_eq!("SIGS".parse::<RoleKind>().unwrap(), RoleKind::Sig);
        assert!("group".parse::<RoleKind>().is_err());
    }

    #[test]
    fn kind_carries_admin_permission_and_default_sync() {
        assert_eq!(RoleKind::Role.admin_permission(), "role_admins");
        assert_eq!(RoleKind::Sig.admin_permission(), "sig_admins");
        assert!(RoleKind::Sig.default_sync());
        assert!(!RoleKind::Role.default_sync());
    }

    #[test]
    fn new_role_sync_can_override_the_kind_default() {
        assert!(!NewRole::new(RoleKind::Role, "AAA", "Alpha").initial_sync());
        assert!(NewRole::new(RoleKind::Role, "AAA", "Alpha")
            .synced(true)
            .initial_sync());
        assert!(!NewRole::new(RoleKind::Sig, "miners", "Miners")
            .synced(false)
            .initial_sync());
    }

    #[test]
    fn color_accepts_decimal_and_hex() {
        assert_eq!(parse_color("16711680").unwrap(), 0xFF0000);
        assert_eq!(parse_color("#ff0000").unwrap(), 16711680);
        assert_eq!(parse_color("#00FF00").unwrap(), 0x00FF00);
        assert!(parse_color("#fff").is_err());
        assert!(parse_color("red").is_err());
        assert!(parse_color("-1").is_err());
    }

    #[test]
    fn patch_from_pairs() {
        let patch = RolePatch::from_pairs([
            ("color", "#0000ff"),
            ("Hoist", "yes"),
            ("position", "4"),
            ("sync", "false"),
        ])
        .unwrap();
        assert_eq!(patch.color, Some(255));
        assert_eq!(patch.hoist, Some(true));
        assert_eq!(patch.position, Some(4));
        assert_eq!(patch.sync, Some(false));
        assert!(patch.name.is_none());
    }

    #[test]
    fn patch_rejects_unknown_key() {
        let err = RolePatch::from_pairs([("chat_id", "123")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn patch_rejects_bad_value() {
        assert!(RolePatch::from_pairs([("hoist", "maybe")]).is_err());
        assert!(RolePatch::from_pairs([("position", "top")]).is_err());
    }

    #[test]
    fn patch_json_rejects_unknown_field() {
        let res: Result<RolePatch, _> = serde_json::from_str(r#"{"kind":"sig"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn new_role_validation() {
        assert!(NewRole::new(RoleKind::Sig, "pvp", "PvP").validate().is_ok());
        assert!(NewRole::new(RoleKind::Sig, "", "PvP").validate().is_err());
        assert!(NewRole::new(RoleKind::Sig, "p v p", "PvP").validate().is_err());
        assert!(NewRole::new(RoleKind::Sig, "pvp", " ").validate().is_err());
    }
}
