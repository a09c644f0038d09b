//! Standalone migration runner for roster.
//!
//! Usage:
//!   cargo run -p roster --bin roster-migrate
//!   cargo run -p roster --bin roster-migrate -- --test
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let Ok(mut database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL env var is required");
        std::process::exit(2);
    };

    if std::env::args().any(|arg| arg == "--test") {
        database_url = test_database_url(&database_url);
    }

    println!("Connecting to database...");
    let mut conn = match PgConnection::establish(&database_url) {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("failed to connect to database: {err}");
            std::process::exit(1);
        }
    };

    println!("Running pending migrations...");
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) if applied.is_empty() => println!("No pending migrations."),
        Ok(applied) => {
            for migration in &applied {
                println!("  Applied: {migration}");
            }
            println!("{} migration(s) applied.", applied.len());
        }
        Err(err) => {
            eprintln!("failed to run migrations: {err}");
            std::process::exit(1);
        }
    }
}

/// `postgres://host/roster?x=y` becomes `postgres://host/roster_test?x=y`.
fn test_database_url(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };
    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}
