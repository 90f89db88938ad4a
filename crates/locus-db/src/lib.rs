//! # locus-db
//!
//! PostgreSQL database layer for the locus location catalog.
//!
//! This crate provides:
//! - Connection pool management
//! - The location aggregate repository (upsert, child reconciliation,
//!   filtered/paginated listing)
//! - The geocoding response cache repository
//!
//! ## Example
//!
//! ```rust,ignore
//! use locus_db::Database;
//! use locus_core::{LocationRepository, UpsertLocationRequest, LocationType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/locus").await?;
//!
//!     let location = db.locations.upsert(UpsertLocationRequest {
//!         official_name: "Central Norte".to_string(),
//!         code: "LOC-001".to_string(),
//!         location_type: LocationType::Origin,
//!         active: true,
//!         is_global: false,
//!         address: None,
//!         aliases: vec!["Terminal Centro".to_string()],
//!         clients: vec![],
//!     }).await?;
//!
//!     println!("Upserted location: {}", location.id);
//!     Ok(())
//! }
//! ```

pub mod filter;
pub mod geocoding;
pub mod locations;
pub mod pool;

// Test fixtures for integration tests
// Note: always compiled so integration tests (in tests/) can use
// DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use locus_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// Re-export repository implementations
pub use filter::{bind_params, LocationFilterQueryBuilder, QueryParam};
pub use geocoding::PgGeocodingCacheRepository;
pub use locations::PgLocationRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Location aggregate repository.
    pub locations: PgLocationRepository,
    /// Geocoding response cache repository.
    pub geocoding: PgGeocodingCacheRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            locations: PgLocationRepository::new(pool.clone()),
            geocoding: PgGeocodingCacheRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }
}
