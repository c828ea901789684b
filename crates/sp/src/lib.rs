//! Tessera SP — SAML service provider: certificate issuance, strategy registry,
//! metadata and login sessions.

pub mod certs;
pub mod metadata;
pub mod registry;
pub mod saml;
pub mod session;
pub mod strategy;
