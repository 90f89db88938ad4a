//! Geocoding cache repository.
//!
//! Stores raw provider responses keyed by (location, provider, external_id).
//! The core location flows never read this table; it exists for the external
//! geocoding integration to avoid re-querying providers.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use locus_core::{Error, GeocodingCacheEntry, GeocodingCacheRepository, Result};

/// PostgreSQL implementation of GeocodingCacheRepository.
pub struct PgGeocodingCacheRepository {
    pool: Pool<Postgres>,
}

impl PgGeocodingCacheRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GeocodingCacheRepository for PgGeocodingCacheRepository {
    async fn store(
        &self,
        location_id: i64,
        provider: &str,
        external_id: &str,
        raw_response: serde_json::Value,
    ) -> Result<GeocodingCacheEntry> {
        let row = sqlx::query(
            "INSERT INTO geocoding_cache (location_id, provider, external_id, raw_response)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (location_id, provider, external_id)
                DO UPDATE SET raw_response = EXCLUDED.raw_response
             RETURNING id, location_id, provider, external_id, raw_response, created_at",
        )
        .bind(location_id)
        .bind(provider)
        .bind(external_id)
        .bind(&raw_response)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(map_cache_row(&row))
    }

    async fn find(
        &self,
        location_id: i64,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<GeocodingCacheEntry>> {
        let row = sqlx::query(
            "SELECT id, location_id, provider, external_id, raw_response, created_at
             FROM geocoding_cache
             WHERE location_id = $1 AND provider = $2 AND external_id = $3",
        )
        .bind(location_id)
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(map_cache_row))
    }

    async fn purge_location(&self, location_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM geocoding_cache WHERE location_id = $1")
            .bind(location_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

fn map_cache_row(row: &PgRow) -> GeocodingCacheEntry {
    GeocodingCacheEntry {
        id: row.get("id"),
        location_id: row.get("location_id"),
        provider: row.get("provider"),
        external_id: row.get("external_id"),
        raw_response: row.get("raw_response"),
        created_at: row.get("created_at"),
    }
}
