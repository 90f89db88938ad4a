//! Outward-facing response shapes for the location API.
//!
//! Pure transformations from the persisted aggregate types in `locus-core`
//! to the JSON structures the API returns. No validation, no I/O.

use chrono::{DateTime, Utc};
use serde::Serialize;

use locus_core::{Address, Alias, ClientLink, Location, LocationPage, LocationType};

/// Full location aggregate as returned by the API.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LocationResponse {
    pub id: i64,
    pub official_name: String,
    pub code: String,
    pub location_type: LocationType,
    pub active: bool,
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub address: Option<AddressResponse>,
    pub aliases: Vec<AliasResponse>,
    pub clients: Vec<ClientLinkResponse>,
}

/// Address sub-object nested inside a location response.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AddressResponse {
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Alias entry nested inside a location response (and returned on add).
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AliasResponse {
    pub id: i64,
    pub alias: String,
    pub created_at: DateTime<Utc>,
}

/// Client link entry nested inside a location response (and returned on add).
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ClientLinkResponse {
    pub source: String,
    pub external_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// One page of locations plus the total match count.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LocationListResponse {
    pub items: Vec<LocationResponse>,
    pub total: i64,
}

impl From<Address> for AddressResponse {
    fn from(address: Address) -> Self {
        Self {
            street: address.street,
            neighborhood: address.neighborhood,
            city: address.city,
            state: address.state,
            postal_code: address.postal_code,
            latitude: address.latitude,
            longitude: address.longitude,
            reference: address.reference,
            created_at: address.created_at,
            updated_at: address.updated_at,
        }
    }
}

impl From<Alias> for AliasResponse {
    fn from(alias: Alias) -> Self {
        Self {
            id: alias.id,
            alias: alias.alias,
            created_at: alias.created_at,
        }
    }
}

impl From<ClientLink> for ClientLinkResponse {
    fn from(client: ClientLink) -> Self {
        Self {
            source: client.source,
            external_id: client.external_id,
            role: client.role,
            created_at: client.created_at,
        }
    }
}

impl From<Location> for LocationResponse {
    fn from(location: Location) -> Self {
        Self {
            id: location.id,
            official_name: location.official_name,
            code: location.code,
            location_type: location.location_type,
            active: location.active,
            is_global: location.is_global,
            created_at: location.created_at,
            updated_at: location.updated_at,
            address: location.address.map(AddressResponse::from),
            aliases: location.aliases.into_iter().map(AliasResponse::from).collect(),
            clients: location
                .clients
                .into_iter()
                .map(ClientLinkResponse::from)
                .collect(),
        }
    }
}

impl From<LocationPage> for LocationListResponse {
    fn from(page: LocationPage) -> Self {
        Self {
            items: page.items.into_iter().map(LocationResponse::from).collect(),
            total: page.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_location() -> Location {
        let now = Utc::now();
        Location {
            id: 7,
            official_name: "Central Norte".to_string(),
            code: "LOC-001".to_string(),
            location_type: LocationType::Origin,
            active: true,
            is_global: false,
            created_at: now,
            updated_at: now,
            address: Some(Address {
                location_id: 7,
                street: Some("Av Principal".to_string()),
                neighborhood: None,
                city: Some("CDMX".to_string()),
                state: None,
                postal_code: None,
                latitude: Some(19.4326),
                longitude: Some(-99.1332),
                reference: None,
                created_at: now,
                updated_at: now,
            }),
            aliases: vec![Alias {
                id: 1,
                location_id: 7,
                alias: "Terminal Centro".to_string(),
                created_at: now,
            }],
            clients: vec![ClientLink {
                location_id: 7,
                source: "erp".to_string(),
                external_id: "123".to_string(),
                role: "Operator".to_string(),
                created_at: now,
            }],
        }
    }

    #[test]
    fn test_location_response_flattens_aggregate() {
        let view = LocationResponse::from(sample_location());

        assert_eq!(view.id, 7);
        assert_eq!(view.code, "LOC-001");
        let address = view.address.expect("address mapped");
        assert_eq!(address.street.as_deref(), Some("Av Principal"));
        assert_eq!(address.latitude, Some(19.4326));
        assert_eq!(view.aliases.len(), 1);
        assert_eq!(view.aliases[0].alias, "Terminal Centro");
        assert_eq!(view.clients.len(), 1);
        assert_eq!(view.clients[0].role, "Operator");
    }

    #[test]
    fn test_location_response_without_address() {
        let mut location = sample_location();
        location.address = None;
        location.aliases.clear();
        location.clients.clear();

        let view = LocationResponse::from(location);
        assert!(view.address.is_none());
        assert!(view.aliases.is_empty());
        assert!(view.clients.is_empty());
    }

    #[test]
    fn test_list_response_carries_total() {
        let page = LocationPage {
            items: vec![sample_location()],
            total: 42,
        };
        let view = LocationListResponse::from(page);
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.total, 42);
    }

    #[test]
    fn test_serialized_shape() {
        let view = LocationResponse::from(sample_location());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["location_type"], "origin");
        assert_eq!(json["address"]["city"], "CDMX");
        assert_eq!(json["clients"][0]["external_id"], "123");
        // The owning id is not repeated inside child entries.
        assert!(json["aliases"][0].get("location_id").is_none());
    }
}
