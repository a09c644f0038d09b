use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use crate::error::Error;

pub type DbPool = Pool<AsyncPgConnection>;

/// Connections held by the sync poller, the reconciler, actuator workers and
/// the admin API together.
const MAX_CONNECTIONS: usize = 16;

/// Create a Diesel async connection pool. Connections are opened lazily.
pub fn connect(database_url: &str) -> Result<DbPool, Error> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager)
        .max_size(MAX_CONNECTIONS)
        .build()
        .map_err(|e| Error::fatal(format!("failed to build connection pool: {e}")))?;

    tracing::info!(max_size = MAX_CONNECTIONS, "database pool created");

    Ok(pool)
}
