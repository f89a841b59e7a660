pub mod api;
pub mod appresult;
pub mod config;
pub mod directory;
pub mod events;
pub mod history;
pub mod hub;
pub mod registry;
pub mod signaling;
pub mod telemetry;

use std::sync::Arc;

use axum::extract::FromRef;

pub use appresult::{AppError, AppResult};
pub use config::HubConfig;
pub use hub::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            hub: Arc::new(Hub::new(config)),
        }
    }
}
