use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use launcher_common::constants::PIPELINE_CONTEXT_TYPE;
use launcher_common::types::Artifact;
use launcher_metadata::service::method;
use launcher_metadata::{
    HttpMetadataStore, InMemoryMetadataStore, MetadataClient, MetadataError,
};
use std::net::SocketAddr;

async fn handle(
    State(store): State<InMemoryMetadataStore>,
    Path(method): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    match store.dispatch(&method, body) {
        Ok(response) => Json(response).into_response(),
        Err(e) => (
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            e.to_string(),
        )
            .into_response(),
    }
}

async fn serve(store: InMemoryMetadataStore) -> SocketAddr {
    let app = Router::new()
        .route("/ml_metadata.MetadataStoreService/{method}", post(handle))
        .with_state(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    addr
}

fn http_store(addr: SocketAddr) -> HttpMetadataStore {
    HttpMetadataStore::new(&addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn records_artifacts_over_http() {
    let store = InMemoryMetadataStore::new();
    let addr = serve(store.clone()).await;
    let client = MetadataClient::new(http_store(addr), "p", "r");

    let context = client
        .ensure_context("p", PIPELINE_CONTEXT_TYPE)
        .await
        .unwrap();
    let again = client
        .ensure_context("p", PIPELINE_CONTEXT_TYPE)
        .await
        .unwrap();
    assert_eq!(context, again);
    assert_eq!(store.call_count(method::PUT_CONTEXTS), 1);

    let artifact = client
        .record_artifact(
            "title: kfp.Dataset",
            Artifact::with_uri("gs://bucket/prefix/p/r/t/data"),
        )
        .await
        .unwrap();
    assert_eq!(store.artifacts(), vec![artifact.clone()]);

    let fetched = client.get_artifacts(&[artifact.id.unwrap()]).await.unwrap();
    assert_eq!(fetched, vec![artifact]);
}

#[tokio::test]
async fn maps_gateway_errors() {
    let store = InMemoryMetadataStore::new();
    store.fail_method(method::PUT_ARTIFACT_TYPE, 503);
    let addr = serve(store.clone()).await;
    let client = MetadataClient::new(http_store(addr), "p", "r");

    let err = client
        .ensure_artifact_type("title: kfp.Model")
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::Status { status: 503, .. }));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = MetadataClient::new(http_store(addr), "p", "r");
    let err = client
        .ensure_context("p", PIPELINE_CONTEXT_TYPE)
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::Transport(_)));
}
