//! Database access for the ingestion and alerting pipeline.
//!
//! Each sub-module owns one domain area. Functions are generic over
//! `ConnectionTrait` where they can run inside a caller's transaction.

pub mod alert_service;
pub mod endpoint_service;
pub mod ingest_service;
pub mod settings_service;

pub use alert_service::*;
pub use endpoint_service::*;
pub use ingest_service::*;
pub use settings_service::*;
