/*!
 * Fetcher contract and source-type registry
 *
 * Every origin type implements the same two-phase contract: `fetch`
 * performs discovery (which may hit the network and fail) and returns a
 * [`FetchPlan`] whose processor downloads one object; the orchestrator runs
 * the plan on a nested worker pool and invokes the plan's cleanup on every
 * exit path.
 */

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VolareError};
use crate::pool::JobFn;
use crate::types::{ObjectToDownload, Source, SourceType};

mod gcs;
mod git;
mod github;
mod gitlab;
mod http;
mod s3;

pub use gcs::GcsFetcher;
pub use git::GitFetcher;
pub use github::{GithubFetcher, DEFAULT_GITHUB_API_BASE};
pub use gitlab::GitlabFetcher;
pub use http::HttpFetcher;
pub use s3::S3Fetcher;

pub type CleanupFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Run unconditionally after a plan's execution, even on error; e.g. to
/// delete a git working tree.
pub type CleanupFn = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// Result of the discovery phase: the objects found, a processor to
/// download one of them, an optional pool-size hint, and an optional
/// cleanup.
///
/// A plan with no objects is a legal no-op. The processor is invoked at
/// most once per object, the cleanup exactly once in total.
pub struct FetchPlan {
    pub processor: JobFn<ObjectToDownload>,
    pub objects: Vec<ObjectToDownload>,
    pub workers: Option<usize>,
    pub cleanup: Option<CleanupFn>,
}

impl std::fmt::Debug for FetchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPlan")
            .field("objects", &self.objects)
            .field("workers", &self.workers)
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Per-origin adapter implementing discovery.
///
/// `mount_path` is the destination root for this source, target path
/// already applied. Returning `None` means there is nothing to do.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        mount_path: &Path,
        source: &Source,
    ) -> Result<Option<FetchPlan>>;
}

impl std::fmt::Debug for dyn Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn Fetcher>")
    }
}

/// Thread-safe map from source type to fetcher. Registration is serialized
/// and rejects duplicates; lookup may be concurrent.
pub struct Registry {
    fetchers: RwLock<HashMap<SourceType, Arc<dyn Fetcher>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            fetchers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fetcher for a source type; fails if one is already
    /// present, leaving the existing registration in place.
    pub fn register(&self, source_type: SourceType, fetcher: Arc<dyn Fetcher>) -> Result<()> {
        let mut fetchers = self.fetchers.write().unwrap();

        if fetchers.contains_key(&source_type) {
            return Err(VolareError::FetcherRegistered(source_type));
        }
        fetchers.insert(source_type, fetcher);
        Ok(())
    }

    /// Register a batch of fetchers, stopping at the first duplicate.
    pub fn register_all(
        &self,
        entries: Vec<(SourceType, Arc<dyn Fetcher>)>,
    ) -> Result<()> {
        for (source_type, fetcher) in entries {
            self.register(source_type, fetcher)?;
        }
        Ok(())
    }

    pub fn get(&self, source_type: SourceType) -> Result<Arc<dyn Fetcher>> {
        let fetchers = self.fetchers.read().unwrap();
        fetchers
            .get(&source_type)
            .cloned()
            .ok_or(VolareError::NoFetcherRegistered(source_type))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
