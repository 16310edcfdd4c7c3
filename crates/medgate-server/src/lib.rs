pub mod config;
pub mod observability;
pub mod routes;
pub mod server;

pub use config::AppConfig;
pub use server::{AppState, MedgateServer, Stores, build_app, build_router};
