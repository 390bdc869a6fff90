pub mod api;
pub mod config;
pub mod last_good;
pub mod metrics_defs;
pub mod orchestrator;
pub mod selector;
pub mod types;
pub mod upstream;

use config::{Config, ValidationError};
use last_good::InMemoryLastGood;
use orchestrator::Picker;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(thiserror::Error, Debug)]
pub enum PickerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ValidationError),
}

/// Runs the contact endpoint and the admin listener until shutdown.
pub async fn run(config: Config) -> Result<(), PickerError> {
    config.validate()?;

    // Last-good numbers only live as long as this process.
    let store = Arc::new(InMemoryLastGood::new());
    let picker = Picker::new(&config, store)?;

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();
    let admin_service: AdminService<_, PickerError> =
        AdminService::new(move || ready_clone.load(Ordering::Relaxed));

    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );
    let api_task = api::serve(&config.listener, picker, config.default_agency, ready);

    tokio::select! {
        result = api_task => result,
        result = admin_task => result,
    }
}
