use crate::store::{RecordStore, StoredRecord};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub type SharedStore = Arc<RwLock<RecordStore>>;

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/api/readings", get(get_readings))
        .route("/api/readings/latest", get(get_latest))
        .with_state(store)
}

pub async fn serve(store: SharedStore, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("web server on http://{}", listener.local_addr()?);
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn get_readings(State(store): State<SharedStore>) -> Json<Vec<StoredRecord>> {
    Json(store.read().await.all())
}

async fn get_latest(
    State(store): State<SharedStore>,
) -> Result<Json<StoredRecord>, StatusCode> {
    store
        .read()
        .await
        .latest()
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
