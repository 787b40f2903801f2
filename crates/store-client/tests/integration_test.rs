//! Integration tests for the store client
//!
//! These tests require a running key-value store API.
//! Set KVS_URL (and KVS_STORE_ID for key tests) to run.

use store_client::{CreateStoreRequest, HttpStoreClient, StoreClientTrait};

fn client() -> HttpStoreClient {
    let url = std::env::var("KVS_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    HttpStoreClient::new(url).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running key-value store API
async fn test_describe_returns_etag() {
    let store_id = std::env::var("KVS_STORE_ID").expect("KVS_STORE_ID environment variable must be set");

    let store = client()
        .describe_store(&store_id)
        .await
        .expect("Failed to describe store");

    assert_eq!(store.id, store_id);
    assert!(store.etag.is_some(), "describe must return an ETag header");
}

#[tokio::test]
#[ignore]
async fn test_stale_etag_is_rejected() {
    let store_id = std::env::var("KVS_STORE_ID").expect("KVS_STORE_ID environment variable must be set");
    let client = client();

    let etag = client
        .describe_store(&store_id)
        .await
        .expect("Failed to describe store")
        .etag
        .expect("missing ETag");

    client
        .put_key(&store_id, "integration-test", "one", &etag)
        .await
        .expect("first write with current ETag must succeed");

    let err = client
        .put_key(&store_id, "integration-test", "two", &etag)
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed(), "unexpected error: {}", err);
}

#[tokio::test]
#[ignore]
async fn test_missing_store_is_not_found() {
    let err = client()
        .describe_store("does-not-exist")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {}", err);
}

#[tokio::test]
#[ignore]
async fn test_create_store() {
    let store = client()
        .create_store(&CreateStoreRequest {
            name: format!("integration-{}", std::process::id()),
            comment: Some("created by integration test".to_string()),
        })
        .await
        .expect("Failed to create store");

    println!("Created store {} ({})", store.id, store.status);
}
