//! HTTP source: one URI, one file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::downloader::Downloader;
use crate::env::from_env;
use crate::error::{Result, VolareError};
use crate::fetcher::{FetchPlan, Fetcher};
use crate::pool::JobFn;
use crate::types::{ObjectToDownload, Source, SourceType};

pub struct HttpFetcher {
    downloader: Arc<dyn Downloader>,
}

impl HttpFetcher {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        mount_path: &Path,
        source: &Source,
    ) -> Result<Option<FetchPlan>> {
        let Some(opts) = source.http.as_ref() else {
            return Err(VolareError::InvalidSourceConfig {
                source_type: SourceType::Http,
            });
        };

        tracing::info!(url = %opts.uri, "downloading file from url");

        let destination = resolve_file_path(mount_path, &opts.uri);

        let resolved_headers: HashMap<String, String> = opts
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), from_env(value)))
            .collect();

        let downloader = self.downloader.clone();
        let processor: JobFn<ObjectToDownload> = Arc::new(move |_cancel, object| {
            let downloader = downloader.clone();
            let headers = resolved_headers.clone();
            Box::pin(async move {
                downloader
                    .download(&object.actual_path, &headers, Path::new(&object.path))
                    .await
            })
        });

        Ok(Some(FetchPlan {
            processor,
            objects: vec![ObjectToDownload {
                path: destination.to_string_lossy().into_owned(),
                actual_path: opts.uri.clone(),
            }],
            workers: Some(1),
            cleanup: None,
        }))
    }
}

/// If the mount path already looks like a file path (has an extension), use
/// it verbatim; otherwise append the URI's basename.
fn resolve_file_path(mount_path: &Path, uri: &str) -> PathBuf {
    if mount_path.extension().is_some() {
        mount_path.to_path_buf()
    } else {
        let filename = uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri);
        mount_path.join(filename)
    }
}
