//! Mirror rows of the external directory.

use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::{alliances, characters, corporations};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = alliances)]
pub struct Alliance {
    pub id: i64,
    pub name: String,
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = corporations)]
pub struct Corporation {
    pub id: i64,
    pub name: String,
    pub ticker: String,
    pub alliance_id: Option<i64>,
}

impl Corporation {
    /// A placeholder row known only by id, populated by a later poll.
    pub fn stub(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            ticker: String::new(),
            alliance_id: None,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.ticker.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = characters)]
pub struct Character {
    pub id: i64,
    pub name: String,
    pub corporation_id: i64,
    #[serde(skip_serializing)]
    pub token: String,
}
