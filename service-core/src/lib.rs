//! service-core: shared infrastructure for the user-management services.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
