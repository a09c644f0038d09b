use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use roster_common::id::{prefix, prefixed_ulid};
use scoped_futures::ScopedFutureExt;

use super::{
    default_filter_name, generate_auth_code, DirectoryStore, FilterStore, PermissionStore,
    RoleStore,
};
use crate::db::pool::DbPool;
use crate::db::schema::{
    alliances, auth_codes, characters, corporations, filter_memberships, filters,
    permission_memberships, permissions, role_filters, roles, user_character_map,
};
use crate::error::{Error, ErrorKind, Result};
use crate::models::filter::NewFilter;
use crate::models::role::{NewRoleRow, RoleRow};
use crate::models::{
    Alliance, Character, Corporation, Filter, FilterRef, NewRole, Permission, Role, RoleKind,
    RolePatch,
};

/// Postgres-backed store. Each operation checks out its own connection.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> Result<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }
}

/// Replace the generic unique-violation message with a readable one.
fn on_conflict(err: diesel::result::Error, message: impl FnOnce() -> String) -> Error {
    let err = Error::from(err);
    if err.kind == ErrorKind::AlreadyExists {
        Error::already_exists(message())
    } else {
        err
    }
}

async fn load_filter(conn: &mut AsyncPgConnection, filter: FilterRef<'_>) -> Result<Filter> {
    let query = filters::table.select(Filter::as_select()).into_boxed();
    let query = match filter {
        FilterRef::Id(id) => query.filter(filters::id.eq(id)),
        FilterRef::Name(name) => query.filter(filters::name.eq(name)),
    };
    query
        .first::<Filter>(conn)
        .await
        .optional()?
        .ok_or_else(|| Error::not_found(format!("filter `{filter}` not found")))
}

async fn load_role(conn: &mut AsyncPgConnection, short_name: &str, kind: RoleKind) -> Result<Role> {
    roles::table
        .filter(roles::short_name.eq(short_name))
        .filter(roles::kind.eq(kind.as_str()))
        .select(RoleRow::as_select())
        .first::<RoleRow>(conn)
        .await
        .optional()?
        .ok_or_else(|| Error::not_found(format!("{} `{short_name}` not found", kind.label())))?
        .try_into()
}

async fn filter_ids_of(conn: &mut AsyncPgConnection, role_id: &str) -> Result<Vec<String>> {
    Ok(role_filters::table
        .filter(role_filters::role_id.eq(role_id))
        .select(role_filters::filter_id)
        .load::<String>(conn)
        .await?)
}

fn into_roles(rows: Vec<RoleRow>) -> Result<Vec<Role>> {
    rows.into_iter().map(Role::try_from).collect()
}

#[async_trait]
impl FilterStore for PgStore {
    async fn create_filter(&self, name: &str, description: &str) -> Result<String> {
        let mut conn = self.conn().await?;
        let id = prefixed_ulid(prefix::FILTER);

        diesel::insert_into(filters::table)
            .values(NewFilter {
                id: &id,
                name,
                description,
                created_at: Utc::now(),
            })
            .execute(&mut conn)
            .await
            .map_err(|e| on_conflict(e, || format!("filter `{name}` already exists")))?;

        Ok(id)
    }

    async fn delete_filter(&self, filter: FilterRef<'_>) -> Result<()> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let found = load_filter(conn, filter).await?;

                diesel::delete(
                    filter_memberships::table.filter(filter_memberships::filter_id.eq(&found.id)),
                )
                .execute(conn)
                .await?;
                diesel::delete(role_filters::table.filter(role_filters::filter_id.eq(&found.id)))
                    .execute(conn)
                    .await?;
                diesel::delete(filters::table.find(&found.id))
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn get_filter(&self, filter: FilterRef<'_>) -> Result<Filter> {
        let mut conn = self.conn().await?;
        load_filter(&mut conn, filter).await
    }

    async fn list_filters(&self) -> Result<Vec<Filter>> {
        let mut conn = self.conn().await?;
        Ok(filters::table
            .order(filters::name.asc())
            .select(Filter::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn add_filter_member(&self, filter: FilterRef<'_>, user_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let found = load_filter(&mut conn, filter).await?;

        let inserted = diesel::insert_into(filter_memberships::table)
            .values((
                filter_memberships::filter_id.eq(&found.id),
                filter_memberships::user_id.eq(user_id),
            ))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;

        if inserted == 0 {
            return Err(Error::already_member(format!(
                "{user_id} is already a member of `{}`",
                found.name
            )));
        }
        Ok(())
    }

    async fn remove_filter_member(&self, filter: FilterRef<'_>, user_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let found = load_filter(&mut conn, filter).await?;

        diesel::delete(
            filter_memberships::table
                .filter(filter_memberships::filter_id.eq(&found.id))
                .filter(filter_memberships::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;

        Ok(())
    }

    async fn list_filter_members(&self, filter: FilterRef<'_>) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let found = load_filter(&mut conn, filter).await?;

        Ok(filter_memberships::table
            .filter(filter_memberships::filter_id.eq(&found.id))
            .order(filter_memberships::user_id.asc())
            .select(filter_memberships::user_id)
            .load(&mut conn)
            .await?)
    }
}

#[async_trait]
impl RoleStore for PgStore {
    async fn create_role(&self, role: &NewRole) -> Result<String> {
        role.validate()?;
        let mut conn = self.conn().await?;
        let role_id = prefixed_ulid(prefix::ROLE);
        let filter_id = prefixed_ulid(prefix::FILTER);
        let filter_name = default_filter_name(&role.short_name);
        let description = format!("Auto-created filter for {} {}", role.kind, role.short_name);
        let now = Utc::now();

        conn.transaction::<_, Error, _>(|conn| {
            let role_id = &role_id;
            async move {
                let existing: i64 = roles::table
                    .filter(roles::short_name.eq(&role.short_name))
                    .filter(roles::kind.eq(role.kind.as_str()))
                    .count()
                    .get_result(conn)
                    .await?;
                if existing > 0 {
                    return Err(Error::already_exists(format!(
                        "{} `{}` already exists",
                        role.kind.label(),
                        role.short_name
                    )));
                }

                diesel::insert_into(filters::table)
                    .values(NewFilter {
                        id: &filter_id,
                        name: &filter_name,
                        description: &description,
                        created_at: now,
                    })
                    .execute(conn)
                    .await
                    .map_err(|e| on_conflict(e, || format!("filter `{filter_name}` already exists")))?;

                diesel::insert_into(roles::table)
                    .values(NewRoleRow {
                        id: role_id,
                        kind: role.kind.as_str(),
                        short_name: &role.short_name,
                        name: &role.name,
                        chat_type: &role.chat_type,
                        joinable: role.joinable,
                        sync: role.initial_sync(),
                        created_at: now,
                    })
                    .execute(conn)
                    .await?;

                diesel::insert_into(role_filters::table)
                    .values((
                        role_filters::role_id.eq(role_id),
                        role_filters::filter_id.eq(&filter_id),
                    ))
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(role_id)
    }

    async fn delete_role(&self, short_name: &str, kind: RoleKind) -> Result<()> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let role = load_role(conn, short_name, kind).await?;
                let filter_ids = filter_ids_of(conn, &role.id).await?;

                diesel::delete(
                    filter_memberships::table
                        .filter(filter_memberships::filter_id.eq_any(&filter_ids)),
                )
                .execute(conn)
                .await?;
                diesel::delete(role_filters::table.filter(role_filters::role_id.eq(&role.id)))
                    .execute(conn)
                    .await?;
                diesel::delete(
                    role_filters::table.filter(role_filters::filter_id.eq_any(&filter_ids)),
                )
                .execute(conn)
                .await?;
                diesel::delete(filters::table.filter(filters::id.eq_any(&filter_ids)))
                    .execute(conn)
                    .await?;
                diesel::delete(roles::table.find(&role.id))
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn get_role(&self, short_name: &str, kind: RoleKind) -> Result<Role> {
        let mut conn = self.conn().await?;
        load_role(&mut conn, short_name, kind).await
    }

    async fn list_roles(&self, kind: Option<RoleKind>) -> Result<Vec<Role>> {
        let mut conn = self.conn().await?;
        let mut query = roles::table
            .order(roles::short_name.asc())
            .select(RoleRow::as_select())
            .into_boxed();
        if let Some(kind) = kind {
            query = query.filter(roles::kind.eq(kind.as_str()));
        }
        into_roles(query.load(&mut conn).await?)
    }

    async fn role_by_chat_id(&self, chat_id: &str) -> Result<Option<Role>> {
        let mut conn = self.conn().await?;
        roles::table
            .filter(roles::chat_id.eq(chat_id))
            .select(RoleRow::as_select())
            .first::<RoleRow>(&mut conn)
            .await
            .optional()?
            .map(Role::try_from)
            .transpose()
    }

    async fn update_role_attributes(
        &self,
        short_name: &str,
        kind: RoleKind,
        patch: &RolePatch,
    ) -> Result<Role> {
        patch.validate()?;
        let mut conn = self.conn().await?;
        if patch.is_empty() {
            return load_role(&mut conn, short_name, kind).await;
        }

        diesel::update(
            roles::table
                .filter(roles::short_name.eq(short_name))
                .filter(roles::kind.eq(kind.as_str())),
        )
        .set(patch)
        .returning(RoleRow::as_returning())
        .get_result::<RoleRow>(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| Error::not_found(format!("{} `{short_name}` not found", kind.label())))?
        .try_into()
    }

    async fn set_role_chat_id(&self, role_id: &str, chat_id: Option<&str>) -> Result<()> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(roles::table.find(role_id))
            .set(roles::chat_id.eq(chat_id))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(Error::not_found(format!("role {role_id} not found")));
        }
        Ok(())
    }

    async fn rename_role(
        &self,
        short_name: &str,
        kind: RoleKind,
        new_short_name: &str,
        new_name: &str,
    ) -> Result<Role> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let role = load_role(conn, short_name, kind).await?;
                let filter_ids = filter_ids_of(conn, &role.id).await?;

                if new_short_name != short_name {
                    diesel::update(
                        filters::table
                            .filter(filters::id.eq_any(&filter_ids))
                            .filter(filters::name.eq(default_filter_name(short_name))),
                    )
                    .set(filters::name.eq(default_filter_name(new_short_name)))
                    .execute(conn)
                    .await
                    .map_err(|e| {
                        on_conflict(e, || format!("filter `{new_short_name}` already exists"))
                    })?;
                }

                diesel::update(roles::table.find(&role.id))
                    .set((
                        roles::short_name.eq(new_short_name),
                        roles::name.eq(new_name),
                    ))
                    .returning(RoleRow::as_returning())
                    .get_result::<RoleRow>(conn)
                    .await
                    .map_err(|e| {
                        on_conflict(e, || {
                            format!("{} `{new_short_name}` already exists", kind.label())
                        })
                    })?
                    .try_into()
            }
            .scope_boxed()
        })
        .await
    }

    async fn role_filters(&self, short_name: &str, kind: RoleKind) -> Result<Vec<Filter>> {
        let mut conn = self.conn().await?;
        let role = load_role(&mut conn, short_name, kind).await?;

        Ok(role_filters::table
            .inner_join(filters::table)
            .filter(role_filters::role_id.eq(&role.id))
            .order(filters::name.asc())
            .select(Filter::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn filter_roles(&self, filter: FilterRef<'_>) -> Result<Vec<Role>> {
        let mut conn = self.conn().await?;
        let filter = load_filter(&mut conn, filter).await?;

        into_roles(
            role_filters::table
                .inner_join(roles::table)
                .filter(role_filters::filter_id.eq(&filter.id))
                .order(roles::short_name.asc())
                .select(RoleRow::as_select())
                .load(&mut conn)
                .await?,
        )
    }

    async fn attach_filter(
        &self,
        short_name: &str,
        kind: RoleKind,
        filter: FilterRef<'_>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let role = load_role(&mut conn, short_name, kind).await?;
        let found = load_filter(&mut conn, filter).await?;

        let inserted = diesel::insert_into(role_filters::table)
            .values((
                role_filters::role_id.eq(&role.id),
                role_filters::filter_id.eq(&found.id),
            ))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        if inserted == 0 {
            return Err(Error::already_exists(format!(
                "filter `{}` is already attached to `{short_name}`",
                found.name
            )));
        }
        Ok(())
    }

    async fn detach_filter(
        &self,
        short_name: &str,
        kind: RoleKind,
        filter: FilterRef<'_>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let role = load_role(&mut conn, short_name, kind).await?;
        let found = load_filter(&mut conn, filter).await?;

        let deleted = diesel::delete(
            role_filters::table
                .filter(role_filters::role_id.eq(&role.id))
                .filter(role_filters::filter_id.eq(&found.id)),
        )
        .execute(&mut conn)
        .await?;
        if deleted == 0 {
            return Err(Error::not_found(format!(
                "filter `{}` is not attached to `{short_name}`",
                found.name
            )));
        }
        Ok(())
    }

    async fn get_role_entitlement(&self, short_name: &str, kind: RoleKind) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let role = load_role(&mut conn, short_name, kind).await?;
        let filter_ids = filter_ids_of(&mut conn, &role.id).await?;
        if filter_ids.is_empty() {
            return Ok(Vec::new());
        }

        // A user qualifies when they have one membership row per attached filter.
        Ok(filter_memberships::table
            .filter(filter_memberships::filter_id.eq_any(&filter_ids))
            .group_by(filter_memberships::user_id)
            .having(diesel::dsl::count_star().eq(filter_ids.len() as i64))
            .order(filter_memberships::user_id.asc())
            .select(filter_memberships::user_id)
            .load(&mut conn)
            .await?)
    }

    async fn user_entitlements(&self, user_id: &str) -> Result<Vec<Role>> {
        let mut conn = self.conn().await?;

        let totals: Vec<(String, i64)> = role_filters::table
            .group_by(role_filters::role_id)
            .select((role_filters::role_id, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        let matched: Vec<(String, i64)> = role_filters::table
            .inner_join(
                filter_memberships::table
                    .on(filter_memberships::filter_id.eq(role_filters::filter_id)),
            )
            .filter(filter_memberships::user_id.eq(user_id))
            .group_by(role_filters::role_id)
            .select((role_filters::role_id, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        let entitled: Vec<String> = matched
            .into_iter()
            .filter(|(role_id, n)| totals.iter().any(|(r, total)| r == role_id && total == n))
            .map(|(role_id, _)| role_id)
            .collect();
        if entitled.is_empty() {
            return Ok(Vec::new());
        }

        into_roles(
            roles::table
                .filter(roles::id.eq_any(&entitled))
                .order(roles::short_name.asc())
                .select(RoleRow::as_select())
                .load(&mut conn)
                .await?,
        )
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn list_alliances(&self) -> Result<Vec<Alliance>> {
        let mut conn = self.conn().await?;
        Ok(alliances::table
            .order(alliances::id.asc())
            .select(Alliance::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn get_alliance(&self, id: i64) -> Result<Option<Alliance>> {
        let mut conn = self.conn().await?;
        Ok(alliances::table
            .find(id)
            .select(Alliance::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn upsert_alliance(&self, alliance: &Alliance) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(alliances::table)
            .values(alliance)
            .on_conflict(alliances::id)
            .do_update()
            .set((
                alliances::name.eq(&alliance.name),
                alliances::ticker.eq(&alliance.ticker),
                alliances::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_alliance(&self, id: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::delete(alliances::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_corporations(&self) -> Result<Vec<Corporation>> {
        let mut conn = self.conn().await?;
        Ok(corporations::table
            .order(corporations::id.asc())
            .select(Corporation::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn get_corporation(&self, id: i64) -> Result<Option<Corporation>> {
        let mut conn = self.conn().await?;
        Ok(corporations::table
            .find(id)
            .select(Corporation::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn upsert_corporation(&self, corporation: &Corporation) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(corporations::table)
            .values(corporation)
            .on_conflict(corporations::id)
            .do_update()
            .set((
                corporations::name.eq(&corporation.name),
                corporations::ticker.eq(&corporation.ticker),
                corporations::alliance_id.eq(corporation.alliance_id),
                corporations::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn insert_corporation_stub(&self, id: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(corporations::table)
            .values(&Corporation::stub(id))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_corporation(&self, id: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::delete(corporations::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_characters(&self) -> Result<Vec<Character>> {
        let mut conn = self.conn().await?;
        Ok(characters::table
            .order(characters::id.asc())
            .select(Character::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn get_character(&self, id: i64) -> Result<Option<Character>> {
        let mut conn = self.conn().await?;
        Ok(characters::table
            .find(id)
            .select(Character::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn upsert_character(&self, character: &Character) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::insert_into(characters::table)
            .values(character)
            .on_conflict(characters::id)
            .do_update()
            .set((
                characters::name.eq(&character.name),
                characters::corporation_id.eq(character.corporation_id),
                characters::token.eq(&character.token),
                characters::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_character(&self, id: i64) -> Result<()> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, Error, _>(|conn| {
            async move {
                diesel::delete(auth_codes::table.filter(auth_codes::character_id.eq(id)))
                    .execute(conn)
                    .await?;
                diesel::delete(
                    user_character_map::table.filter(user_character_map::character_id.eq(id)),
                )
                .execute(conn)
                .await?;
                diesel::delete(characters::table.find(id))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    async fn user_for_character(&self, character_id: i64) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(user_character_map::table
            .find(character_id)
            .select(user_character_map::user_id)
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn link_character(&self, user_id: &str, character_id: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, Error, _>(|conn| {
            async move { link(conn, user_id, character_id).await }.scope_boxed()
        })
        .await
    }

    async fn create_auth_code(&self, character_id: i64) -> Result<String> {
        let mut conn = self.conn().await?;
        let code = generate_auth_code();
        diesel::insert_into(auth_codes::table)
            .values((
                auth_codes::code.eq(&code),
                auth_codes::character_id.eq(character_id),
                auth_codes::used.eq(false),
                auth_codes::created_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(code)
    }

    async fn redeem_auth_code(&self, code: &str, user_id: &str) -> Result<Character> {
        let mut conn = self.conn().await?;

        conn.transaction::<_, Error, _>(|conn| {
            async move {
                let character_id: i64 = diesel::update(
                    auth_codes::table
                        .filter(auth_codes::code.eq(code))
                        .filter(auth_codes::used.eq(false)),
                )
                .set(auth_codes::used.eq(true))
                .returning(auth_codes::character_id)
                .get_result(conn)
                .await
                .optional()?
                .ok_or_else(|| Error::not_found("unknown or used auth code"))?;

                let character: Character = characters::table
                    .find(character_id)
                    .select(Character::as_select())
                    .first(conn)
                    .await?;

                link(conn, user_id, character_id).await?;
                Ok(character)
            }
            .scope_boxed()
        })
        .await
    }
}

/// Point `user_id` at `character_id`, dropping any previous link of the user.
async fn link(conn: &mut AsyncPgConnection, user_id: &str, character_id: i64) -> Result<()> {
    diesel::delete(user_character_map::table.filter(user_character_map::user_id.eq(user_id)))
        .execute(conn)
        .await?;
    diesel::insert_into(user_character_map::table)
        .values((
            user_character_map::character_id.eq(character_id),
            user_character_map::user_id.eq(user_id),
        ))
        .on_conflict(user_character_map::character_id)
        .do_update()
        .set(user_character_map::user_id.eq(user_id))
        .execute(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn ensure_permission(&self, name: &str, description: &str) -> Result<Permission> {
        let mut conn = self.conn().await?;
        diesel::insert_into(permissions::table)
            .values(&Permission {
                id: prefixed_ulid(prefix::PERMISSION),
                name: name.to_string(),
                description: description.to_string(),
            })
            .on_conflict(permissions::name)
            .do_nothing()
            .execute(&mut conn)
            .await?;

        Ok(permissions::table
            .filter(permissions::name.eq(name))
            .select(Permission::as_select())
            .first(&mut conn)
            .await?)
    }

    async fn grant_permission(&self, name: &str, user_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let permission_id: String = permissions::table
            .filter(permissions::name.eq(name))
            .select(permissions::id)
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| Error::not_found(format!("permission `{name}` not found")))?;

        let inserted = diesel::insert_into(permission_memberships::table)
            .values((
                permission_memberships::permission_id.eq(&permission_id),
                permission_memberships::user_id.eq(user_id),
            ))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        if inserted == 0 {
            return Err(Error::already_member(format!("{user_id} already holds `{name}`")));
        }
        Ok(())
    }

    async fn revoke_permission(&self, name: &str, user_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let permission_id: String = permissions::table
            .filter(permissions::name.eq(name))
            .select(permissions::id)
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| Error::not_found(format!("permission `{name}` not found")))?;

        diesel::delete(
            permission_memberships::table
                .filter(permission_memberships::permission_id.eq(&permission_id))
                .filter(permission_memberships::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    async fn has_permission(&self, user_id: &str, name: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let count: i64 = permission_memberships::table
            .inner_join(permissions::table)
            .filter(permissions::name.eq(name))
            .filter(permission_memberships::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }
}
