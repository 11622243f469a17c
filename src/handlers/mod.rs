//! HTTP request handlers for the ingest server.
//!
//! This module contains all endpoint handlers organized by functionality:
//! - `upload`: The chunked-upload protocol
//! - `health`: Health check endpoint

pub mod health;
pub mod upload;

pub use health::health_routes;
pub use upload::upload_routes;
