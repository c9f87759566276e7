pub mod dashboard;
pub mod views;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::models::Config;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<Config>,
    pub(crate) snapshot: Option<Arc<PathBuf>>,
}

pub async fn serve(config: Config, snapshot: Option<PathBuf>, addr: &str) -> Result<()> {
    let state = AppState {
        config: Arc::new(config),
        snapshot: snapshot.map(Arc::new),
    };

    let app = Router::new()
        .route("/", get(dashboard::dashboard_handler))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Dashboard listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
