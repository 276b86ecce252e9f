//! The staging-table upsert pipeline.
//!
//! - [`request`]: modes, null policies and per-call options
//! - [`staging`]: staging table naming
//! - [`introspect`]: target column discovery
//! - [`merge`]: merge statement inputs and storage options
//! - [`loader`]: adaptive chunked loading
//! - [`coordinator`]: one table end to end

pub mod coordinator;
pub mod introspect;
pub mod loader;
pub mod merge;
pub mod request;
pub mod staging;

pub use coordinator::{UpsertCoordinator, UpsertSummary};
pub use introspect::SchemaIntrospector;
pub use loader::ChunkedLoader;
pub use merge::{MergeSpec, MergeStatements};
pub use request::{NullPolicy, UpsertMode, UpsertOptions, UpsertRequest};
pub use staging::StagingNameAllocator;
