pub mod api;
pub mod config;
pub mod profile;
pub mod scenarios;
pub mod search;
pub mod transport;
#[cfg(feature = "async-transport")]
pub mod transport_axum;
