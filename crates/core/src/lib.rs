//! Tessera Core — SP trust document, certificate handling, configuration and user lookup.

pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod notify;
pub mod passwords;
pub mod pem;
pub mod store;
