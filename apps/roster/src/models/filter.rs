use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::filters;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = filters)]
pub struct Filter {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = filters)]
pub struct NewFilter<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Addresses a filter by name or by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRef<'a> {
    Id(&'a str),
    Name(&'a str),
}

impl<'a> FilterRef<'a> {
    /// Ids carry the `flt_` ULID prefix; anything else is taken as a name.
    pub fn parse(value: &'a str) -> Self {
        if roster_common::id::has_prefix(value, roster_common::id::prefix::FILTER) {
            FilterRef::Id(value)
        } else {
            FilterRef::Name(value)
        }
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        match self {
            FilterRef::Id(id) => filter.id == *id,
            FilterRef::Name(name) => filter.name == *name,
        }
    }
}

impl std::fmt::Display for FilterRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterRef::Id(id) => f.write_str(id),
            FilterRef::Name(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_ids_from_names() {
        let id = roster_common::id::prefixed_ulid(roster_common::id::prefix::FILTER);
        assert_eq!(FilterRef::parse(&id), FilterRef::Id(&id));
        assert_eq!(FilterRef::parse("ALLI"), FilterRef::Name("ALLI"));
        assert_eq!(FilterRef::parse("flt_"), FilterRef::Name("flt_"));
    }
}
