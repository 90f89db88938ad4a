//! Core data models for the locus location catalog.
//!
//! These types are shared across all locus crates and represent the
//! persisted location aggregate: a location row together with its owned
//! address, aliases, and external client links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// LOCATION TYPES
// =============================================================================

/// Directional role of a location in a transport plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Origin,
    Destination,
    Both,
}

impl Default for LocationType {
    fn default() -> Self {
        LocationType::Both
    }
}

impl LocationType {
    /// Stable string form used for the TEXT column and query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Origin => "origin",
            LocationType::Destination => "destination",
            LocationType::Both => "both",
        }
    }

    /// Parse the stored string form. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "origin" => Some(LocationType::Origin),
            "destination" => Some(LocationType::Destination),
            "both" => Some(LocationType::Both),
            _ => None,
        }
    }
}

/// A location aggregate: the root row plus its owned children.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Location {
    pub id: i64,
    /// Globally unique display name.
    pub official_name: String,
    /// Globally unique business code, the natural upsert key.
    pub code: String,
    pub location_type: LocationType,
    pub active: bool,
    /// Globally visible locations bypass client-link visibility filters.
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub address: Option<Address>,
    pub aliases: Vec<Alias>,
    pub clients: Vec<ClientLink>,
}

/// Postal address owned 1:1 by a location. All fields optional; the row is
/// created lazily on the first address write.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Address {
    pub location_id: i64,
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Free-text note helping drivers find the entrance.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Alternative name for a location. (location_id, alias) is unique.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Alias {
    pub id: i64,
    pub location_id: i64,
    pub alias: String,
    pub created_at: DateTime<Utc>,
}

/// Association between a location and an external system's client entity,
/// under a named role. The 4-tuple is the identity; there is no surrogate id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ClientLink {
    pub location_id: i64,
    /// External system identifier, e.g. "erp".
    pub source: String,
    /// Client identity within that system.
    pub external_id: String,
    /// Role the client plays at this location, e.g. "Operator".
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Raw geocoding provider response cached per (location, provider,
/// external_id). Written by the (external) geocoding integration; the core
/// flows never read it.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeocodingCacheEntry {
    pub id: i64,
    pub location_id: i64,
    pub provider: String,
    pub external_id: String,
    pub raw_response: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_type_round_trip() {
        for lt in [
            LocationType::Origin,
            LocationType::Destination,
            LocationType::Both,
        ] {
            assert_eq!(LocationType::parse(lt.as_str()), Some(lt));
        }
    }

    #[test]
    fn test_location_type_parse_unknown() {
        assert_eq!(LocationType::parse("sideways"), None);
        assert_eq!(LocationType::parse(""), None);
    }

    #[test]
    fn test_location_type_default_is_both() {
        assert_eq!(LocationType::default(), LocationType::Both);
    }

    #[test]
    fn test_location_type_serde_lowercase() {
        let json = serde_json::to_string(&LocationType::Origin).unwrap();
        assert_eq!(json, "\"origin\"");
        let back: LocationType = serde_json::from_str("\"destination\"").unwrap();
        assert_eq!(back, LocationType::Destination);
    }
}
