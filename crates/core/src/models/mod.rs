pub mod trust;
pub mod user;
