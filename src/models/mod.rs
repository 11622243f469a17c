//! Data models for the ingest server.
//!
//! This module contains the domain models and data transfer objects (DTOs)
//! used throughout the application.

mod upload_session;

pub use upload_session::*;
