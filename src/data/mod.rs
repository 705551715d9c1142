//! Data ingestion and storage
//!
//! Record sources, SQLite event storage and the column-tagged frame the
//! feature pipeline works on.

pub mod database;
pub mod dataset;
pub mod import;
pub mod source;
pub mod synthetic;

pub use database::Database;
pub use dataset::{Column, ColumnRole, FeatureGroup, Frame, RollingAgg, RollingSpec, RowMeta};
pub use source::{InMemorySource, RecordSource};
