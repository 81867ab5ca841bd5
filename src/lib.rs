/*!
 * Volare - volume populator engine
 *
 * Given a declarative "sources" document and a mount path, concurrently
 * fetches content from heterogeneous remote origins and lays files onto the
 * local filesystem under deterministic paths:
 * - Pluggable source-type registry with a uniform discover + download contract
 * - Generic, cancellable, bounded-concurrency worker pool used at two
 *   nesting levels (per-source and per-object)
 * - Canonical mapping from remote keys to destination paths
 * - Credential and resource-file propagation from controller to worker
 */

pub mod cloner;
pub mod downloader;
pub mod env;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod paths;
pub mod pool;
pub mod populator;
pub mod resources;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{Result, VolareError};
pub use fetcher::{FetchPlan, Fetcher, Registry};
pub use pool::{run_pool, WorkerPool};
pub use populator::{parse_spec, populate, worker_args};
pub use types::{ObjectToDownload, PopulatorSpec, Source, SourceType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
