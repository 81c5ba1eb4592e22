pub mod auth;
pub mod comments;
pub mod config;
pub mod core;
pub mod follow;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod posts;
pub mod repository;
pub mod routes;
pub mod users;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

#[cfg(target_arch = "wasm32")]
use spin_sdk::http::{IntoResponse, Request};

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let settings = config::Settings::from_env();
    let store = core::store::SpinStore::open_default()?;
    if settings.seed_demo_data {
        core::db::init_test_data(&store)?;
    }

    Ok(handlers::handle_request(&store, &settings, &req))
}
