pub mod app;
pub mod bundle;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
