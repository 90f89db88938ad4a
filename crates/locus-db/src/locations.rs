//! Location aggregate repository implementation.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;

use locus_core::{
    Address, AddressInput, Alias, ClientLink, ClientLinkInput, Error, Location, LocationFilters,
    LocationPage, LocationRepository, LocationType, Pagination, Result, UpdateLocationRequest,
    UpsertLocationRequest,
};

use crate::filter::{bind_params, LocationFilterQueryBuilder};

const LOCATION_COLUMNS: &str =
    "id, official_name, code, location_type, active, is_global, created_at, updated_at";

const ADDRESS_COLUMNS: &str = "location_id, street, neighborhood, city, state, postal_code, \
     latitude, longitude, reference, created_at, updated_at";

/// PostgreSQL implementation of LocationRepository.
pub struct PgLocationRepository {
    pool: Pool<Postgres>,
}

impl PgLocationRepository {
    /// Create a new PgLocationRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM locations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.is_some())
    }

    /// Create or fully overwrite the address row inside the caller's
    /// transaction. Every column is written; a `None` field clears the
    /// stored value.
    async fn apply_address_tx(
        tx: &mut Transaction<'_, Postgres>,
        location_id: i64,
        address: &AddressInput,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO addresses (location_id, street, neighborhood, city, state,
                                    postal_code, latitude, longitude, reference)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (location_id) DO UPDATE SET
                street = EXCLUDED.street,
                neighborhood = EXCLUDED.neighborhood,
                city = EXCLUDED.city,
                state = EXCLUDED.state,
                postal_code = EXCLUDED.postal_code,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                reference = EXCLUDED.reference,
                updated_at = now()",
        )
        .bind(location_id)
        .bind(&address.street)
        .bind(&address.neighborhood)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(address.latitude)
        .bind(address.longitude)
        .bind(&address.reference)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Reconcile persisted aliases against the target list: delete rows not
    /// in the target, insert missing ones, leave matches untouched so their
    /// id and created_at survive.
    async fn reconcile_aliases_tx(
        tx: &mut Transaction<'_, Postgres>,
        location_id: i64,
        aliases: &[String],
    ) -> Result<()> {
        let target: BTreeSet<String> = aliases
            .iter()
            .map(|alias| alias.trim().to_string())
            .filter(|alias| !alias.is_empty())
            .collect();

        let rows = sqlx::query("SELECT id, alias FROM aliases WHERE location_id = $1")
            .bind(location_id)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::Database)?;
        let existing: HashMap<String, i64> = rows
            .into_iter()
            .map(|row| (row.get("alias"), row.get("id")))
            .collect();

        for (alias, alias_id) in &existing {
            if !target.contains(alias) {
                sqlx::query("DELETE FROM aliases WHERE id = $1")
                    .bind(alias_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(Error::Database)?;
            }
        }

        for alias in &target {
            if !existing.contains_key(alias) {
                sqlx::query("INSERT INTO aliases (location_id, alias) VALUES ($1, $2)")
                    .bind(location_id)
                    .bind(alias)
                    .execute(&mut **tx)
                    .await
                    .map_err(Error::Database)?;
            }
        }
        Ok(())
    }

    /// Reconcile persisted client links against the target set, keyed on
    /// (source, external_id, role).
    async fn reconcile_clients_tx(
        tx: &mut Transaction<'_, Postgres>,
        location_id: i64,
        clients: &[ClientLinkInput],
    ) -> Result<()> {
        let target: HashSet<(String, String, String)> = clients
            .iter()
            .map(|c| (c.source.clone(), c.external_id.clone(), c.role.clone()))
            .collect();

        let rows = sqlx::query(
            "SELECT source, external_id, role FROM client_links WHERE location_id = $1",
        )
        .bind(location_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;
        let existing: HashSet<(String, String, String)> = rows
            .into_iter()
            .map(|row| {
                (
                    row.get("source"),
                    row.get("external_id"),
                    row.get("role"),
                )
            })
            .collect();

        for (source, external_id, role) in existing.difference(&target) {
            sqlx::query(
                "DELETE FROM client_links
                 WHERE location_id = $1 AND source = $2 AND external_id = $3 AND role = $4",
            )
            .bind(location_id)
            .bind(source)
            .bind(external_id)
            .bind(role)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }

        for (source, external_id, role) in target.difference(&existing) {
            sqlx::query(
                "INSERT INTO client_links (location_id, source, external_id, role)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(location_id)
            .bind(source)
            .bind(external_id)
            .bind(role)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Load children for a set of location rows in three batched queries.
    async fn attach_children(&self, mut bases: Vec<Location>) -> Result<Vec<Location>> {
        if bases.is_empty() {
            return Ok(bases);
        }
        let ids: Vec<i64> = bases.iter().map(|l| l.id).collect();

        let address_rows = sqlx::query(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE location_id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        let mut addresses: HashMap<i64, Address> = address_rows
            .iter()
            .map(|row| {
                let address = map_address_row(row);
                (address.location_id, address)
            })
            .collect();

        let alias_rows = sqlx::query(
            "SELECT id, location_id, alias, created_at FROM aliases
             WHERE location_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        let mut aliases: HashMap<i64, Vec<Alias>> = HashMap::new();
        for row in &alias_rows {
            let alias = map_alias_row(row);
            aliases.entry(alias.location_id).or_default().push(alias);
        }

        let client_rows = sqlx::query(
            "SELECT location_id, source, external_id, role, created_at FROM client_links
             WHERE location_id = ANY($1) ORDER BY source, external_id, role",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        let mut clients: HashMap<i64, Vec<ClientLink>> = HashMap::new();
        for row in &client_rows {
            let client = map_client_row(row);
            clients.entry(client.location_id).or_default().push(client);
        }

        for base in &mut bases {
            base.address = addresses.remove(&base.id);
            base.aliases = aliases.remove(&base.id).unwrap_or_default();
            base.clients = clients.remove(&base.id).unwrap_or_default();
        }
        Ok(bases)
    }
}

#[async_trait]
impl LocationRepository for PgLocationRepository {
    async fn upsert(&self, req: UpsertLocationRequest) -> Result<Location> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let existing = sqlx::query("SELECT id FROM locations WHERE code = $1")
            .bind(&req.code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let (id, created) = match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                // code is the lookup key and is never rewritten here
                sqlx::query(
                    "UPDATE locations
                     SET official_name = $1, location_type = $2, active = $3,
                         is_global = $4, updated_at = $5
                     WHERE id = $6",
                )
                .bind(&req.official_name)
                .bind(req.location_type.as_str())
                .bind(req.active)
                .bind(req.is_global)
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                (id, false)
            }
            None => {
                let row = sqlx::query(
                    "INSERT INTO locations (official_name, code, location_type, active, is_global)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING id",
                )
                .bind(&req.official_name)
                .bind(&req.code)
                .bind(req.location_type.as_str())
                .bind(req.active)
                .bind(req.is_global)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;
                (row.get("id"), true)
            }
        };

        if let Some(address) = &req.address {
            Self::apply_address_tx(&mut tx, id, address).await?;
        }
        Self::reconcile_aliases_tx(&mut tx, id, &req.aliases).await?;
        Self::reconcile_clients_tx(&mut tx, id, &req.clients).await?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "locations",
            op = "upsert",
            location_id = id,
            code = %req.code,
            created,
            "Location upserted"
        );

        // A concurrent delete between commit and this read is the only way
        // the aggregate can be missing now.
        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("location {} vanished after upsert", id)))
    }

    async fn get(&self, id: i64) -> Result<Option<Location>> {
        let row = sqlx::query(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let base = map_location_row(&row)?;
        let mut populated = self.attach_children(vec![base]).await?;
        Ok(populated.pop())
    }

    async fn list(
        &self,
        filters: LocationFilters,
        pagination: Pagination,
    ) -> Result<LocationPage> {
        let (clause, params) = LocationFilterQueryBuilder::new(filters, 0).build();

        let data_sql = format!(
            "SELECT {LOCATION_COLUMNS} FROM locations l WHERE {clause}
             ORDER BY l.official_name ASC LIMIT ${} OFFSET ${}",
            params.len() + 1,
            params.len() + 2
        );
        let rows = bind_params(sqlx::query(&data_sql), &params)
            .bind(pagination.limit)
            .bind(pagination.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let count_sql = format!("SELECT COUNT(*) AS total FROM locations l WHERE {clause}");
        let count_row = bind_params(sqlx::query(&count_sql), &params)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        let total: i64 = count_row.get("total");

        let bases = rows
            .iter()
            .map(map_location_row)
            .collect::<Result<Vec<_>>>()?;
        let items = self.attach_children(bases).await?;

        debug!(
            subsystem = "db",
            component = "locations",
            op = "list",
            result_count = items.len(),
            total,
            "Locations listed"
        );

        Ok(LocationPage { items, total })
    }

    async fn update(&self, id: i64, req: UpdateLocationRequest) -> Result<Option<Location>> {
        let mut updates: Vec<String> = vec!["updated_at = $1".to_string()];
        // $1 = now, $2 = id, dynamic params start at $3
        let mut param_idx = 3;

        if req.official_name.is_some() {
            updates.push(format!("official_name = ${}", param_idx));
            param_idx += 1;
        }
        if req.code.is_some() {
            updates.push(format!("code = ${}", param_idx));
            param_idx += 1;
        }
        if req.location_type.is_some() {
            updates.push(format!("location_type = ${}", param_idx));
            param_idx += 1;
        }
        if req.active.is_some() {
            updates.push(format!("active = ${}", param_idx));
            param_idx += 1;
        }
        if req.is_global.is_some() {
            updates.push(format!("is_global = ${}", param_idx));
        }

        let query = format!("UPDATE locations SET {} WHERE id = $2", updates.join(", "));

        let mut q = sqlx::query(&query).bind(Utc::now()).bind(id);
        if let Some(official_name) = &req.official_name {
            q = q.bind(official_name);
        }
        if let Some(code) = &req.code {
            q = q.bind(code);
        }
        if let Some(location_type) = req.location_type {
            q = q.bind(location_type.as_str());
        }
        if let Some(active) = req.active {
            q = q.bind(active);
        }
        if let Some(is_global) = req.is_global {
            q = q.bind(is_global);
        }

        let result = q.execute(&self.pool).await.map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn update_address(&self, id: i64, address: AddressInput) -> Result<Option<Location>> {
        if !self.exists(id).await? {
            return Ok(None);
        }
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::apply_address_tx(&mut tx, id, &address).await?;
        tx.commit().await.map_err(Error::Database)?;
        self.get(id).await
    }

    async fn add_alias(&self, location_id: i64, alias: &str) -> Result<Alias> {
        if !self.exists(location_id).await? {
            return Err(Error::LocationNotFound(location_id));
        }

        let existing = sqlx::query(
            "SELECT id, location_id, alias, created_at FROM aliases
             WHERE location_id = $1 AND alias = $2",
        )
        .bind(location_id)
        .bind(alias)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        if let Some(row) = existing {
            return Ok(map_alias_row(&row));
        }

        let row = sqlx::query(
            "INSERT INTO aliases (location_id, alias) VALUES ($1, $2)
             RETURNING id, location_id, alias, created_at",
        )
        .bind(location_id)
        .bind(alias)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(map_alias_row(&row))
    }

    async fn remove_alias(&self, location_id: i64, alias_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM aliases WHERE id = $1 AND location_id = $2")
            .bind(alias_id)
            .bind(location_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::AliasNotFound(alias_id));
        }
        Ok(())
    }

    async fn add_client(&self, location_id: i64, client: ClientLinkInput) -> Result<ClientLink> {
        if !self.exists(location_id).await? {
            return Err(Error::LocationNotFound(location_id));
        }

        let existing = sqlx::query(
            "SELECT location_id, source, external_id, role, created_at FROM client_links
             WHERE location_id = $1 AND source = $2 AND external_id = $3 AND role = $4",
        )
        .bind(location_id)
        .bind(&client.source)
        .bind(&client.external_id)
        .bind(&client.role)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        if let Some(row) = existing {
            return Ok(map_client_row(&row));
        }

        let row = sqlx::query(
            "INSERT INTO client_links (location_id, source, external_id, role)
             VALUES ($1, $2, $3, $4)
             RETURNING location_id, source, external_id, role, created_at",
        )
        .bind(location_id)
        .bind(&client.source)
        .bind(&client.external_id)
        .bind(&client.role)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(map_client_row(&row))
    }

    async fn remove_client(&self, location_id: i64, client: ClientLinkInput) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM client_links
             WHERE location_id = $1 AND source = $2 AND external_id = $3 AND role = $4",
        )
        .bind(location_id)
        .bind(&client.source)
        .bind(&client.external_id)
        .bind(&client.role)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::ClientLinkNotFound(format!(
                "{}/{}/{}",
                client.source, client.external_id, client.role
            )));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        // Children go with the parent via the ON DELETE CASCADE constraints.
        let result = sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            debug!(
                subsystem = "db",
                component = "locations",
                op = "delete",
                location_id = id,
                "Location deleted"
            );
        }
        Ok(deleted)
    }
}

fn map_location_row(row: &PgRow) -> Result<Location> {
    let raw_type: String = row.get("location_type");
    let location_type = LocationType::parse(&raw_type).ok_or_else(|| {
        Error::Internal(format!("unknown location_type '{}' in database", raw_type))
    })?;
    Ok(Location {
        id: row.get("id"),
        official_name: row.get("official_name"),
        code: row.get("code"),
        location_type,
        active: row.get("active"),
        is_global: row.get("is_global"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        address: None,
        aliases: Vec::new(),
        clients: Vec::new(),
    })
}

fn map_address_row(row: &PgRow) -> Address {
    Address {
        location_id: row.get("location_id"),
        street: row.get("street"),
        neighborhood: row.get("neighborhood"),
        city: row.get("city"),
        state: row.get("state"),
        postal_code: row.get("postal_code"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        reference: row.get("reference"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_alias_row(row: &PgRow) -> Alias {
    Alias {
        id: row.get("id"),
        location_id: row.get("location_id"),
        alias: row.get("alias"),
        created_at: row.get("created_at"),
    }
}

fn map_client_row(row: &PgRow) -> ClientLink {
    ClientLink {
        location_id: row.get("location_id"),
        source: row.get("source"),
        external_id: row.get("external_id"),
        role: row.get("role"),
        created_at: row.get("created_at"),
    }
}
