//! GitHub source: tree listing through the REST API, blob downloads from
//! raw.githubusercontent.com. The API base URL is injectable for testing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::downloader::Downloader;
use crate::env::from_env;
use crate::error::{Result, VolareError};
use crate::fetcher::{FetchPlan, Fetcher};
use crate::paths::{is_file, resolve_target_path};
use crate::pool::JobFn;
use crate::types::{GithubOptions, ObjectToDownload, Source, SourceType};

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

const RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

pub struct GithubFetcher {
    client: reqwest::Client,
    downloader: Arc<dyn Downloader>,
    base_url: String,
}

impl GithubFetcher {
    pub fn new(client: reqwest::Client, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            client,
            downloader,
            base_url: DEFAULT_GITHUB_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn list_files(&self, opts: &GithubOptions, listed_path: &str) -> Result<Vec<TreeItem>> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| VolareError::Config(format!("invalid GitHub API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| VolareError::Config("GitHub API base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["repos", &opts.owner, &opts.repo, "git", "trees", &opts.reference]);
        url.query_pairs_mut().append_pair("recursive", "1");

        tracing::info!(url = %url, "listing files from github");

        let mut request = self.client.get(url.clone());
        if !opts.token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", from_env(&opts.token)));
        }

        let response = request.send().await.map_err(|source| VolareError::Request {
            url: url.to_string(),
            source,
        })?;

        if response.status() != StatusCode::OK {
            return Err(VolareError::GithubStatus(response.status().as_u16()));
        }

        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|e| VolareError::DecodeTree(e.to_string()))?;

        let trimmed_prefix = format!("{}/", listed_path.trim_matches('/'));
        let filtered = tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .filter(|item| {
                listed_path.is_empty()
                    || item.path.starts_with(&trimmed_prefix)
                    || item.path == listed_path
            })
            .collect();

        Ok(filtered)
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[async_trait]
impl Fetcher for GithubFetcher {
    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        mount_path: &Path,
        source: &Source,
    ) -> Result<Option<FetchPlan>> {
        let Some(opts) = source.github.as_ref() else {
            return Err(VolareError::InvalidSourceConfig {
                source_type: SourceType::Github,
            });
        };

        let mut objects = Vec::new();
        for listed_path in &opts.paths {
            if is_file(listed_path) {
                objects.push(ObjectToDownload {
                    path: listed_path.clone(),
                    actual_path: listed_path.trim_start_matches('/').to_string(),
                });
                continue;
            }

            for item in self.list_files(opts, listed_path).await? {
                objects.push(ObjectToDownload {
                    path: listed_path.clone(),
                    actual_path: item.path,
                });
            }
        }

        let downloader = self.downloader.clone();
        let opts = opts.clone();
        let workers = opts.workers;
        let mount = mount_path.to_path_buf();

        let processor: JobFn<ObjectToDownload> = Arc::new(move |_cancel, object| {
            let downloader = downloader.clone();
            let opts = opts.clone();
            let mount = mount.clone();
            Box::pin(async move { download_blob(downloader, &mount, &object, &opts).await })
        });

        Ok(Some(FetchPlan {
            processor,
            objects,
            workers,
            cleanup: None,
        }))
    }
}

async fn download_blob(
    downloader: Arc<dyn Downloader>,
    mount_path: &Path,
    file: &ObjectToDownload,
    opts: &GithubOptions,
) -> Result<()> {
    let mut url = Url::parse(RAW_CONTENT_BASE)
        .map_err(|e| VolareError::Config(format!("invalid raw content base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| VolareError::Config("raw content base URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend([opts.owner.as_str(), opts.repo.as_str(), opts.reference.as_str()])
        .extend(file.actual_path.split('/'));

    let mut headers = HashMap::new();
    if !opts.token.is_empty() {
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", from_env(&opts.token)),
        );
    }

    let destination = resolve_target_path(mount_path, file);
    downloader.download(url.as_str(), &headers, &destination).await
}
