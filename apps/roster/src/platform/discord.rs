//! Discord REST client (API v10, bot token).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::{ChatPlatform, Member, PlatformError, PlatformResult, PlatformRole, RoleAttrs};

const API_BASE: &str = "https://discord.com/api/v10";

#[derive(Clone)]
pub struct DiscordClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

/// Role object as Discord serializes it. `permissions` is a decimal string.
#[derive(Debug, Deserialize)]
struct DiscordRole {
    id: String,
    name: String,
    #[serde(default)]
    color: i32,
    #[serde(default)]
    hoist: bool,
    #[serde(default)]
    position: i32,
    #[serde(default)]
    permissions: String,
    #[serde(default)]
    managed: bool,
    #[serde(default)]
    mentionable: bool,
}

impl From<DiscordRole> for PlatformRole {
    fn from(role: DiscordRole) -> Self {
        Self {
            id: role.id,
            name: role.name,
            color: role.color,
            hoist: role.hoist,
            position: role.position,
            permissions: role.permissions.parse().unwrap_or(0),
            mentionable: role.mentionable,
            managed: role.managed,
        }
    }
}

#[derive(Debug, Serialize)]
struct RoleBody<'a> {
    name: &'a str,
    color: i32,
    hoist: bool,
    permissions: String,
    mentionable: bool,
}

impl<'a> From<&'a RoleAttrs> for RoleBody<'a> {
    fn from(attrs: &'a RoleAttrs) -> Self {
        Self {
            name: &attrs.name,
            color: attrs.color,
            hoist: attrs.hoist,
            permissions: attrs.permissions.to_string(),
            mentionable: attrs.mentionable,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscordMember {
    user: Option<DiscordUser>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

impl DiscordClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(API_BASE, token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> PlatformResult<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await.map_err(|e| {
            tracing::warn!(?e, %method, %path, "discord request failed");
            PlatformError::Transport(e.to_string())
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        match status {
            StatusCode::NOT_FOUND => Err(PlatformError::NotFound(path.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|b| b.retry_after)
                    .map(Duration::from_secs_f64);
                tracing::warn!(?retry_after, %path, "discord rate limit hit");
                Err(PlatformError::RateLimited { retry_after })
            }
            _ => {
                let message = resp.text().await.unwrap_or_default();
                Err(PlatformError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    async fn json<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> PlatformResult<T> {
        resp.json()
            .await
            .map_err(|e| PlatformError::Transport(format!("malformed discord response: {e}")))
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn create_role(&self, guild_id: &str, attrs: &RoleAttrs) -> PlatformResult<PlatformRole> {
        let path = format!("/guilds/{guild_id}/roles");
        let resp = self
            .send(Method::POST, &path, Some(&RoleBody::from(attrs)))
            .await?;
        Ok(Self::json::<DiscordRole>(resp).await?.into())
    }

    async fn edit_role(
        &self,
        guild_id: &str,
        role_id: &str,
        attrs: &RoleAttrs,
    ) -> PlatformResult<PlatformRole> {
        let path = format!("/guilds/{guild_id}/roles/{role_id}");
        let resp = self
            .send(Method::PATCH, &path, Some(&RoleBody::from(attrs)))
            .await?;
        Ok(Self::json::<DiscordRole>(resp).await?.into())
    }

    async fn delete_role(&self, guild_id: &str, role_id: &str) -> PlatformResult<()> {
        let path = format!("/guilds/{guild_id}/roles/{role_id}");
        self.send::<()>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn list_roles(&self, guild_id: &str) -> PlatformResult<Vec<PlatformRole>> {
        let path = format!("/guilds/{guild_id}/roles");
        let resp = self.send::<()>(Method::GET, &path, None).await?;
        let roles: Vec<DiscordRole> = Self::json(resp).await?;
        Ok(roles.into_iter().map(PlatformRole::from).collect())
    }

    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> PlatformResult<()> {
        let path = format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.send::<()>(Method::PUT, &path, None).await?;
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> PlatformResult<()> {
        let path = format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.send::<()>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn get_member(&self, guild_id: &str, user_id: &str) -> PlatformResult<Member> {
        let path = format!("/guilds/{guild_id}/members/{user_id}");
        let resp = self.send::<()>(Method::GET, &path, None).await?;
        let member: DiscordMember = Self::json(resp).await?;
        Ok(Member {
            user_id: member
                .user
                .map(|u| u.id)
                .unwrap_or_else(|| user_id.to_string()),
            roles: member.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_permissions_parse_from_string() {
        let role: DiscordRole = serde_json::from_str(
            r#"{"id":"42","name":"ALLI","color":255,"hoist":true,"position":3,
                "permissions":"1071698660929","managed":false,"mentionable":true}"#,
        )
        .unwrap();
        let role = PlatformRole::from(role);
        assert_eq!(role.permissions, 1_071_698_660_929);
        assert_eq!(role.color, 255);
        assert!(role.mentionable);
    }

    #[test]
    fn role_body_sends_permissions_as_string() {
        let attrs = RoleAttrs {
            name: "BBB".into(),
            permissions: 8,
            ..RoleAttrs::default()
        };
        let body = serde_json::to_value(RoleBody::from(&attrs)).unwrap();
        assert_eq!(body["permissions"], "8");
        assert!(body.get("position").is_none());
    }
}
