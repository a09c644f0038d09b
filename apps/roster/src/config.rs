use std::time::Duration;

/// Roster configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Redis connection string (action queue).
    pub redis_url: String,
    /// Bot token for the Discord REST API.
    pub discord_token: String,
    /// The guild whose roles are managed.
    pub guild_id: String,
    /// Bearer secret the chat bot front-end presents to the admin API.
    pub admin_token: String,
    /// Base URL of the EVE Swagger Interface.
    pub esi_url: String,
    /// Port the admin HTTP server binds to.
    pub port: u16,
    /// Interval between external directory polls.
    pub sync_interval: Duration,
    /// Interval between role reconciliation passes.
    pub reconcile_interval: Duration,
    /// Queue consumers started per topic.
    pub actuator_workers: usize,
    /// Platform role names that are never created, edited, deleted or assigned.
    pub ignored_roles: Vec<String>,
    /// Key prefix for queue lists in Redis.
    pub queue_prefix: String,
    /// Chat users granted `server_admins` at startup.
    pub server_admins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            discord_token: required_var("DISCORD_TOKEN"),
            guild_id: required_var("DISCORD_GUILD_ID"),
            admin_token: required_var("ADMIN_TOKEN"),
            esi_url: std::env::var("ESI_URL")
                .unwrap_or_else(|_| "https://esi.evetech.net/latest".to_string()),
            port: parsed_var("PORT").unwrap_or(4003),
            sync_interval: Duration::from_secs(parsed_var("SYNC_INTERVAL_SECS").unwrap_or(3600)),
            reconcile_interval: Duration::from_secs(
                parsed_var("RECONCILE_INTERVAL_SECS").unwrap_or(300),
            ),
            actuator_workers: parsed_var("ACTUATOR_WORKERS").unwrap_or(1).max(1),
            ignored_roles: std::env::var("IGNORED_ROLES")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            queue_prefix: std::env::var("QUEUE_PREFIX").unwrap_or_else(|_| "roster".to_string()),
            server_admins: std::env::var("SERVER_ADMINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        }
    }

    /// Whether the platform role named `name` is off-limits.
    pub fn is_ignored_role(&self, name: &str) -> bool {
        name == "@everyone" || self.ignored_roles.iter().any(|r| r == name)
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(" Server Booster, ,Bots "),
            vec!["Server Booster".to_string(), "Bots".to_string()]
        );
        assert!(split_list("").is_empty());
    }
}
