//! Domain models.
//!
//! These are internal domain models, distinct from the request/response DTOs
//! in `gatehouse_api::models`.

pub mod auth;
pub mod page;
pub mod role;
pub mod user;
