use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::permissions;

/// Grants everything the per-kind admin permissions grant.
pub const SERVER_ADMINS: &str = "server_admins";

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = permissions)]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub description: String,
}
