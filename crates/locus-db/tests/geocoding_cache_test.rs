//! Integration tests for the geocoding response cache.
//!
//! Requires a reachable test database; skips otherwise (see
//! `location_repository_test.rs` for the setup contract).

use locus_db::test_fixtures::TestDatabase;
use locus_db::{
    GeocodingCacheRepository, LocationRepository, LocationType, UpsertLocationRequest,
};
use serde_json::json;

async fn seed_location(test_db: &TestDatabase, name: &str, code: &str) -> i64 {
    test_db
        .db
        .locations
        .upsert(UpsertLocationRequest {
            official_name: name.to_string(),
            code: code.to_string(),
            location_type: LocationType::Both,
            active: true,
            is_global: false,
            address: None,
            aliases: vec![],
            clients: vec![],
        })
        .await
        .expect("seed location")
        .id
}

#[tokio::test]
async fn test_store_find_and_refresh() {
    let Some(test_db) = TestDatabase::connect().await else {
        eprintln!("test database unavailable, skipping");
        return;
    };
    test_db.purge_prefix("geo-").await;
    let location_id = seed_location(&test_db, "geo- Cachable", "geo-001").await;
    let cache = &test_db.db.geocoding;

    let stored = cache
        .store(location_id, "mapbox", "poi.123", json!({"lat": 19.4}))
        .await
        .expect("store");
    assert_eq!(stored.provider, "mapbox");

    let found = cache
        .find(location_id, "mapbox", "poi.123")
        .await
        .expect("find")
        .expect("present");
    assert_eq!(found.id, stored.id);
    assert_eq!(found.raw_response, json!({"lat": 19.4}));

    // Same triple refreshes the payload in place.
    let refreshed = cache
        .store(location_id, "mapbox", "poi.123", json!({"lat": 19.5}))
        .await
        .expect("refresh");
    assert_eq!(refreshed.id, stored.id);
    assert_eq!(refreshed.raw_response, json!({"lat": 19.5}));

    let absent = cache
        .find(location_id, "mapbox", "poi.999")
        .await
        .expect("find");
    assert!(absent.is_none());
}

#[tokio::test]
async fn test_purge_and_cascade() {
    let Some(test_db) = TestDatabase::connect().await else {
        eprintln!("test database unavailable, skipping");
        return;
    };
    test_db.purge_prefix("geoc-").await;
    let location_id = seed_location(&test_db, "geoc- Cacheada", "geoc-001").await;
    let cache = &test_db.db.geocoding;

    cache
        .store(location_id, "mapbox", "a", json!({}))
        .await
        .expect("store a");
    cache
        .store(location_id, "google", "b", json!({}))
        .await
        .expect("store b");

    assert_eq!(cache.purge_location(location_id).await.expect("purge"), 2);
    assert_eq!(cache.purge_location(location_id).await.expect("purge"), 0);

    // Cache rows ride the location cascade too.
    cache
        .store(location_id, "mapbox", "c", json!({}))
        .await
        .expect("store c");
    test_db
        .db
        .locations
        .delete(location_id)
        .await
        .expect("delete location");
    let leftover: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM geocoding_cache WHERE location_id = $1")
            .bind(location_id)
            .fetch_one(&test_db.db.pool)
            .await
            .expect("count");
    assert_eq!(leftover, 0);
}
