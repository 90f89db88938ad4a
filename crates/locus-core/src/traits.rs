//! Core traits for the locus location catalog.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// LOCATION REPOSITORY
// =============================================================================

/// Address fields supplied to an upsert or address update. Every field
/// overwrites the stored column, including `None` values: a provided address
/// is a full replacement, not a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressInput {
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub reference: Option<String>,
}

/// Identity of a client link, minus the owning location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientLinkInput {
    pub source: String,
    pub external_id: String,
    pub role: String,
}

/// Request for the create-or-update operation keyed on `code`.
///
/// Aliases and clients are full target sets: entries missing from them are
/// removed from the aggregate. `address: None` means "leave the stored
/// address untouched" — an address with no fields set is an explicit clear.
#[derive(Debug, Clone)]
pub struct UpsertLocationRequest {
    pub official_name: String,
    pub code: String,
    pub location_type: LocationType,
    pub active: bool,
    pub is_global: bool,
    pub address: Option<AddressInput>,
    pub aliases: Vec<String>,
    pub clients: Vec<ClientLinkInput>,
}

/// Partial update of a location's base fields. Only `Some` fields are
/// applied; children are never touched by this request.
#[derive(Debug, Clone, Default)]
pub struct UpdateLocationRequest {
    pub official_name: Option<String>,
    pub code: Option<String>,
    pub location_type: Option<LocationType>,
    pub active: Option<bool>,
    pub is_global: Option<bool>,
}

impl UpdateLocationRequest {
    /// True when no field is set — callers reject such requests up front.
    pub fn is_empty(&self) -> bool {
        self.official_name.is_none()
            && self.code.is_none()
            && self.location_type.is_none()
            && self.active.is_none()
            && self.is_global.is_none()
    }
}

/// Filter predicates for listing locations. All present filters are ANDed;
/// the client filter additionally passes every `is_global` location.
#[derive(Debug, Clone, Default)]
pub struct LocationFilters {
    /// Case-insensitive substring match on official_name OR code.
    pub query: Option<String>,
    pub client_source: Option<String>,
    pub client_external_id: Option<String>,
    /// Case-insensitive substring match on the address state field.
    pub state: Option<String>,
    /// Case-insensitive substring match on the address city field.
    pub city: Option<String>,
    pub location_type: Option<LocationType>,
    pub active: Option<bool>,
}

/// Limit/offset pagination applied after ordering by official_name.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// One page of fully-populated aggregates plus the total match count
/// (independent of limit/offset).
#[derive(Debug, Clone)]
pub struct LocationPage {
    pub items: Vec<Location>,
    pub total: i64,
}

/// Repository for the location aggregate: persistence, child reconciliation,
/// and filtered listing.
#[async_trait]
pub trait LocationRepository: Send + Sync {
    /// Create a location, or overwrite the aggregate when `code` exists.
    async fn upsert(&self, req: UpsertLocationRequest) -> Result<Location>;

    /// Fetch the full aggregate by primary key.
    async fn get(&self, id: i64) -> Result<Option<Location>>;

    /// List aggregates matching the filters, ordered by official_name.
    async fn list(&self, filters: LocationFilters, pagination: Pagination)
        -> Result<LocationPage>;

    /// Apply the supplied base fields; children are untouched.
    /// Returns `None` if the location does not exist.
    async fn update(&self, id: i64, req: UpdateLocationRequest) -> Result<Option<Location>>;

    /// Create or fully overwrite the address row.
    /// Returns `None` if the location does not exist.
    async fn update_address(&self, id: i64, address: AddressInput) -> Result<Option<Location>>;

    /// Add an alias; returns the existing row when the (location, text) pair
    /// is already present.
    async fn add_alias(&self, location_id: i64, alias: &str) -> Result<Alias>;

    /// Remove an alias belonging to the location.
    async fn remove_alias(&self, location_id: i64, alias_id: i64) -> Result<()>;

    /// Attach a client link; returns the existing row when the 4-tuple is
    /// already present.
    async fn add_client(&self, location_id: i64, client: ClientLinkInput) -> Result<ClientLink>;

    /// Detach the exact client link tuple.
    async fn remove_client(&self, location_id: i64, client: ClientLinkInput) -> Result<()>;

    /// Delete the location and, by cascade, all of its children.
    /// Returns whether a row was actually removed.
    async fn delete(&self, id: i64) -> Result<bool>;
}

// =============================================================================
// GEOCODING CACHE REPOSITORY
// =============================================================================

/// Repository for cached raw geocoding responses.
#[async_trait]
pub trait GeocodingCacheRepository: Send + Sync {
    /// Insert or refresh the cached response for the unique triple.
    async fn store(
        &self,
        location_id: i64,
        provider: &str,
        external_id: &str,
        raw_response: serde_json::Value,
    ) -> Result<GeocodingCacheEntry>;

    /// Look up a cached response.
    async fn find(
        &self,
        location_id: i64,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<GeocodingCacheEntry>>;

    /// Drop every cached response for a location. Returns rows removed.
    async fn purge_location(&self, location_id: i64) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_is_empty() {
        assert!(UpdateLocationRequest::default().is_empty());

        let req = UpdateLocationRequest {
            active: Some(false),
            ..Default::default()
        };
        assert!(!req.is_empty());
    }

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::default();
        assert_eq!(p.limit, 50);
        assert_eq!(p.offset, 0);
    }
}
