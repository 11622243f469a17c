//! Service layer for the ingest server.
//!
//! This module contains the business-logic services:
//! - Session persistence and querying
//! - Chunk staging and reassembly
//! - Content and metadata validation
//! - Digest verification
//! - Deduplication
//! - Object storage and sweeping

pub mod dedup;
pub mod digest;
pub mod object_store;
pub mod session_db;
pub mod staging;
pub mod sweeper;
pub mod upload_manager;
pub mod validation;

pub use dedup::DedupIndex;
pub use object_store::{ObjectStore, StorageStats};
pub use session_db::SessionDb;
pub use staging::ChunkStaging;
pub use sweeper::SweepReport;
pub use upload_manager::{ChunkReceipt, InitiateOutcome, UploadManager};
