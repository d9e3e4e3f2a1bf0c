//! HTTP handlers for utility-service.

pub mod analytics;
pub mod bills;
pub mod health;
pub mod usage;
