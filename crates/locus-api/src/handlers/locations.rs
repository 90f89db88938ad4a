//! Location HTTP handlers.
//!
//! The boundary layer for the location aggregate: request DTOs, field
//! validation (trim, lengths, coordinate ranges), and the mapping of store
//! outcomes to HTTP results. Field constraints are enforced here so the
//! repository only ever sees validated input.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::views::{
    AliasResponse, ClientLinkResponse, LocationListResponse, LocationResponse,
};
use crate::{ApiError, AppState};
use locus_core::{
    AddressInput, ClientLinkInput, LocationFilters, LocationRepository, LocationType, Pagination,
    UpdateLocationRequest, UpsertLocationRequest,
};

const MAX_OFFICIAL_NAME: usize = 255;
const MAX_CODE: usize = 50;
const MAX_ALIAS: usize = 255;
const MAX_SOURCE: usize = 50;
const MAX_EXTERNAL_ID: usize = 100;
const MAX_ROLE: usize = 50;
const MAX_ADDRESS_FIELD: usize = 255;
const MAX_POSTAL_CODE: usize = 20;
const MAX_REFERENCE: usize = 500;

const MAX_PAGE_SIZE: i64 = 200;
const DEFAULT_PAGE_SIZE: i64 = 50;

// =============================================================================
// REQUEST DTOS
// =============================================================================

/// Address fields accepted on upsert and address update. A provided payload
/// replaces the stored address in full; absent fields clear their columns.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct AddressPayload {
    pub street: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub reference: Option<String>,
}

impl AddressPayload {
    fn into_input(self) -> Result<AddressInput, ApiError> {
        Ok(AddressInput {
            street: optional_trimmed(self.street, "street", MAX_ADDRESS_FIELD)?,
            neighborhood: optional_trimmed(self.neighborhood, "neighborhood", MAX_ADDRESS_FIELD)?,
            city: optional_trimmed(self.city, "city", MAX_ADDRESS_FIELD)?,
            state: optional_trimmed(self.state, "state", MAX_ADDRESS_FIELD)?,
            postal_code: optional_trimmed(self.postal_code, "postal_code", MAX_POSTAL_CODE)?,
            latitude: bounded(self.latitude, "latitude", -90.0, 90.0)?,
            longitude: bounded(self.longitude, "longitude", -180.0, 180.0)?,
            reference: optional_trimmed(self.reference, "reference", MAX_REFERENCE)?,
        })
    }
}

/// Alias text accepted on upsert and alias add.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AliasPayload {
    pub alias: String,
}

/// Client link tuple accepted on upsert, client add, and client delete.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ClientPayload {
    pub source: String,
    pub external_id: String,
    pub role: String,
}

impl ClientPayload {
    fn into_input(self) -> Result<ClientLinkInput, ApiError> {
        Ok(ClientLinkInput {
            source: required_trimmed(self.source, "source", MAX_SOURCE)?,
            external_id: required_trimmed(self.external_id, "external_id", MAX_EXTERNAL_ID)?,
            role: required_trimmed(self.role, "role", MAX_ROLE)?,
        })
    }
}

/// Body of `POST /locations`: the full target state of the aggregate.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateLocationPayload {
    pub official_name: String,
    pub code: String,
    #[serde(default)]
    pub location_type: LocationType,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub is_global: bool,
    pub address: Option<AddressPayload>,
    #[serde(default)]
    pub aliases: Vec<AliasPayload>,
    #[serde(default)]
    pub clients: Vec<ClientPayload>,
}

fn default_active() -> bool {
    true
}

impl CreateLocationPayload {
    fn into_request(self) -> Result<UpsertLocationRequest, ApiError> {
        // Globally visible locations carry no explicit client links; the
        // store is handed an empty target set so stale links are removed.
        let clients = if self.is_global {
            Vec::new()
        } else {
            self.clients
                .into_iter()
                .map(ClientPayload::into_input)
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(UpsertLocationRequest {
            official_name: required_trimmed(self.official_name, "official_name", MAX_OFFICIAL_NAME)?,
            code: required_trimmed(self.code, "code", MAX_CODE)?,
            location_type: self.location_type,
            active: self.active,
            is_global: self.is_global,
            address: self.address.map(AddressPayload::into_input).transpose()?,
            aliases: self
                .aliases
                .into_iter()
                .map(|a| required_trimmed(a.alias, "alias", MAX_ALIAS))
                .collect::<Result<Vec<_>, _>>()?,
            clients,
        })
    }
}

/// Body of `PUT /locations/{id}`: base fields only, all optional.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateLocationPayload {
    pub official_name: Option<String>,
    pub code: Option<String>,
    pub location_type: Option<LocationType>,
    pub active: Option<bool>,
    pub is_global: Option<bool>,
}

impl UpdateLocationPayload {
    fn into_request(self) -> Result<UpdateLocationRequest, ApiError> {
        Ok(UpdateLocationRequest {
            official_name: self
                .official_name
                .map(|v| required_trimmed(v, "official_name", MAX_OFFICIAL_NAME))
                .transpose()?,
            code: self
                .code
                .map(|v| required_trimmed(v, "code", MAX_CODE))
                .transpose()?,
            location_type: self.location_type,
            active: self.active,
            is_global: self.is_global,
        })
    }
}

/// Query parameters for `GET /locations`.
#[derive(Debug, Default, Deserialize)]
pub struct ListLocationsQuery {
    /// Case-insensitive substring match on official_name or code.
    pub q: Option<String>,
    pub client_source: Option<String>,
    pub client_external_id: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub location_type: Option<LocationType>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for the client-scoped listing (client identity comes
/// from the path).
#[derive(Debug, Default, Deserialize)]
pub struct ClientScopedListQuery {
    pub q: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub location_type: Option<LocationType>,
    pub active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// =============================================================================
// VALIDATION HELPERS
// =============================================================================

fn required_trimmed(value: String, field: &str, max: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

fn optional_trimmed(
    value: Option<String>,
    field: &str,
    max: usize,
) -> Result<Option<String>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(Some(trimmed.to_string()))
}

fn bounded(value: Option<f64>, field: &str, min: f64, max: f64) -> Result<Option<f64>, ApiError> {
    if let Some(v) = value {
        if !(min..=max).contains(&v) {
            return Err(ApiError::BadRequest(format!(
                "{} must be between {} and {}",
                field, min, max
            )));
        }
    }
    Ok(value)
}

fn build_pagination(limit: Option<i64>, offset: Option<i64>) -> Result<Pagination, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::BadRequest("offset must not be negative".to_string()));
    }
    Ok(Pagination { limit, offset })
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Create a location, or overwrite the aggregate when the code exists.
///
/// # Returns
/// - 201 Created with the full aggregate view
/// - 400 Bad Request on field validation failure
/// - 409 Conflict when official_name or code collides with another location
pub async fn upsert_location(
    State(state): State<AppState>,
    Json(payload): Json<CreateLocationPayload>,
) -> Result<(StatusCode, Json<LocationResponse>), ApiError> {
    let req = payload.into_request()?;
    let location = state.db.locations.upsert(req).await?;
    Ok((StatusCode::CREATED, Json(location.into())))
}

/// List locations with filters and pagination.
pub async fn list_locations(
    State(state): State<AppState>,
    Query(query): Query<ListLocationsQuery>,
) -> Result<Json<LocationListResponse>, ApiError> {
    let pagination = build_pagination(query.limit, query.offset)?;
    let filters = LocationFilters {
        query: query.q,
        client_source: query.client_source,
        client_external_id: query.client_external_id,
        state: query.state,
        city: query.city,
        location_type: query.location_type,
        active: query.active,
    };
    let page = state.db.locations.list(filters, pagination).await?;
    Ok(Json(page.into()))
}

/// List locations visible to one external client. Globally visible
/// locations always appear, linked ones must match both path segments.
pub async fn list_locations_by_client(
    State(state): State<AppState>,
    Path((source, external_id)): Path<(String, String)>,
    Query(query): Query<ClientScopedListQuery>,
) -> Result<Json<LocationListResponse>, ApiError> {
    let pagination = build_pagination(query.limit, query.offset)?;
    let filters = LocationFilters {
        query: query.q,
        client_source: Some(source),
        client_external_id: Some(external_id),
        state: query.state,
        city: query.city,
        location_type: query.location_type,
        active: query.active,
    };
    let page = state.db.locations.list(filters, pagination).await?;
    Ok(Json(page.into()))
}

/// Get a single location aggregate.
pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LocationResponse>, ApiError> {
    let location = state
        .db
        .locations
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Location {} not found", id)))?;
    Ok(Json(location.into()))
}

/// Update base fields of a location. Children are not touched.
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateLocationPayload>,
) -> Result<Json<LocationResponse>, ApiError> {
    let req = payload.into_request()?;
    if req.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }
    let location = state
        .db
        .locations
        .update(id, req)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Location {} not found", id)))?;
    Ok(Json(location.into()))
}

/// Create or fully overwrite the address of a location.
pub async fn update_location_address(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AddressPayload>,
) -> Result<Json<LocationResponse>, ApiError> {
    let address = payload.into_input()?;
    let location = state
        .db
        .locations
        .update_address(id, address)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Location {} not found", id)))?;
    Ok(Json(location.into()))
}

/// Add an alias to a location. Re-adding an existing alias returns the
/// stored row unchanged.
pub async fn add_alias(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AliasPayload>,
) -> Result<(StatusCode, Json<AliasResponse>), ApiError> {
    let alias = required_trimmed(payload.alias, "alias", MAX_ALIAS)?;
    let alias = state.db.locations.add_alias(id, &alias).await?;
    Ok((StatusCode::CREATED, Json(alias.into())))
}

/// Remove an alias belonging to a location.
pub async fn delete_alias(
    State(state): State<AppState>,
    Path((id, alias_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.db.locations.remove_alias(id, alias_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Attach a client link to a location. Re-adding an existing tuple returns
/// the stored row unchanged.
pub async fn add_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ClientPayload>,
) -> Result<(StatusCode, Json<ClientLinkResponse>), ApiError> {
    let client = payload.into_input()?;
    let client = state.db.locations.add_client(id, client).await?;
    Ok((StatusCode::CREATED, Json(client.into())))
}

/// Detach the exact client link tuple from a location.
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ClientPayload>,
) -> Result<StatusCode, ApiError> {
    let client = payload.into_input()?;
    state.db.locations.remove_client(id, client).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a location and all of its children.
pub async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.db.locations.delete(id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Location {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trimmed_rejects_blank() {
        let err = required_trimmed("   ".to_string(), "code", MAX_CODE).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_required_trimmed_trims_and_keeps() {
        let value = required_trimmed("  LOC-001  ".to_string(), "code", MAX_CODE).unwrap();
        assert_eq!(value, "LOC-001");
    }

    #[test]
    fn test_required_trimmed_enforces_length() {
        let long = "x".repeat(MAX_CODE + 1);
        let err = required_trimmed(long, "code", MAX_CODE).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_optional_trimmed_blank_becomes_none() {
        let value = optional_trimmed(Some("  ".to_string()), "city", 255).unwrap();
        assert!(value.is_none());
        let value = optional_trimmed(None, "city", 255).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_address_payload_validates_coordinates() {
        let payload = AddressPayload {
            latitude: Some(91.0),
            ..Default::default()
        };
        assert!(matches!(
            payload.into_input().unwrap_err(),
            ApiError::BadRequest(_)
        ));

        let payload = AddressPayload {
            longitude: Some(-181.0),
            ..Default::default()
        };
        assert!(matches!(
            payload.into_input().unwrap_err(),
            ApiError::BadRequest(_)
        ));

        let payload = AddressPayload {
            latitude: Some(19.4326),
            longitude: Some(-99.1332),
            ..Default::default()
        };
        let input = payload.into_input().unwrap();
        assert_eq!(input.latitude, Some(19.4326));
        assert_eq!(input.longitude, Some(-99.1332));
    }

    #[test]
    fn test_global_upsert_drops_client_links() {
        let payload = CreateLocationPayload {
            official_name: "Everywhere".to_string(),
            code: "GLB-1".to_string(),
            location_type: LocationType::Both,
            active: true,
            is_global: true,
            address: None,
            aliases: vec![],
            clients: vec![ClientPayload {
                source: "erp".to_string(),
                external_id: "1".to_string(),
                role: "Operator".to_string(),
            }],
        };
        let req = payload.into_request().unwrap();
        assert!(req.clients.is_empty());
    }

    #[test]
    fn test_update_payload_rejects_blank_name() {
        let payload = UpdateLocationPayload {
            official_name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            payload.into_request().unwrap_err(),
            ApiError::BadRequest(_)
        ));
    }

    #[test]
    fn test_empty_update_payload_builds_empty_request() {
        let req = UpdateLocationPayload::default().into_request().unwrap();
        assert!(req.is_empty());
    }

    #[test]
    fn test_build_pagination_bounds() {
        assert!(matches!(
            build_pagination(Some(0), None).unwrap_err(),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            build_pagination(Some(201), None).unwrap_err(),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            build_pagination(None, Some(-1)).unwrap_err(),
            ApiError::BadRequest(_)
        ));

        let pagination = build_pagination(None, None).unwrap();
        assert_eq!(pagination.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(pagination.offset, 0);
    }
}
