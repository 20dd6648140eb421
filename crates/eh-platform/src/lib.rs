//! EventHub Platform
//!
//! Event registration and notification workflow:
//! - Domain entities (users, events, notifications, messages, reports)
//! - Repositories backed by MongoDB or in-memory maps
//! - Services for registration, notification dispatch, chat and moderation
//! - REST and WebSocket APIs

pub mod api;
pub mod domain;
pub mod error;
pub mod repository;
pub mod service;
pub mod tsid;

pub use domain::*;
pub use error::PlatformError;
pub use tsid::TsidGenerator;
