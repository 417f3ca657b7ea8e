//! Melisma Retrieval Server Library
//!
//! Content-based music retrieval: query-by-humming over pitch-sequence
//! histograms and query-by-image over PCA-projected cover vectors. This
//! library exposes the internal modules for testing and potential reuse.

pub mod catalog_store;
pub mod features;
pub mod qbh;
pub mod qbi;
pub mod retrieval;
pub mod server;
pub mod uploads;

// Re-export commonly used types for convenience
pub use catalog_store::SqliteCatalogStore;
pub use qbi::{QbiEngine, QbiScoringMode};
pub use retrieval::RetrievalOrchestrator;
pub use server::{run_server, RequestsLoggingLevel, ServerConfig};
pub use uploads::UploadStore;
