use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use launcher_metadata::InMemoryMetadataStore;
use std::net::SocketAddr;
use tokio::task::JoinHandle;

/// Metadata gateway backed by an in-memory store, listening on a random local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: InMemoryMetadataStore,
    handle: JoinHandle<()>,
}

async fn handle_call(
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

impl TestServer {
    pub async fn launch() -> Self {
        let store = InMemoryMetadataStore::new();
        let app = Router::new()
            .route("/ml_metadata.MetadataStoreService/{method}", post(handle_call))
            .with_state(store.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            store,
            handle,
        }
    }

    pub fn address(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> String {
        self.addr.port().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
