//! GitLab source: repository tree listing and raw file downloads through
//! the v4 API. The instance host comes from the source options, so tests
//! point it at a local server.

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
use crate::paths::resolve_target_path;
use crate::pool::JobFn;
use crate::types::{GitlabOptions, ObjectToDownload, Source, SourceType};

const GITLAB_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

pub struct GitlabFetcher {
    client: reqwest::Client,
    downloader: Arc<dyn Downloader>,
}

impl GitlabFetcher {
    pub fn new(client: reqwest::Client, downloader: Arc<dyn Downloader>) -> Self {
        Self { client, downloader }
    }

    async fn list_files(&self, opts: &GitlabOptions, listed_path: &str) -> Result<Vec<TreeEntry>> {
        let mut url = Url::parse(&opts.host)
            .map_err(|e| VolareError::Config(format!("invalid GitLab host {:?}: {e}", opts.host)))?;
        url.path_segments_mut()
            .map_err(|_| VolareError::Config("GitLab host cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "v4", "projects", &opts.project, "repository", "tree"]);
        url.query_pairs_mut()
            .append_pair("path", listed_path)
            .append_pair("ref", &opts.reference)
            .append_pair("recursive", "true");

        tracing::info!(url = %url, "listing files from gitlab");

        let mut request = self.client.get(url.clone());
        if !opts.token.is_empty() {
            request = request.header(GITLAB_TOKEN_HEADER, from_env(&opts.token));
        }

        let response = request.send().await.map_err(|source| VolareError::Request {
            url: url.to_string(),
            source,
        })?;

        if response.status() != StatusCode::OK {
            return Err(VolareError::GitlabTreeStatus(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| VolareError::DecodeTree(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[async_trait]
impl Fetcher for GitlabFetcher {
    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        mount_path: &Path,
        source: &Source,
    ) -> Result<Option<FetchPlan>> {
        let Some(opts) = source.gitlab.as_ref() else {
            return Err(VolareError::InvalidSourceConfig {
                source_type: SourceType::Gitlab,
            });
        };

        let mut objects = Vec::new();
        for listed_path in &opts.paths {
            for entry in self.list_files(opts, listed_path).await? {
                if entry.kind != "blob" {
                    continue;
                }
                objects.push(ObjectToDownload {
                    path: listed_path.clone(),
                    actual_path: entry.path,
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
    opts: &GitlabOptions,
) -> Result<()> {
    let mut url = Url::parse(&opts.host)
        .map_err(|e| VolareError::Config(format!("invalid GitLab host {:?}: {e}", opts.host)))?;
    url.path_segments_mut()
        .map_err(|_| VolareError::Config("GitLab host cannot be a base".to_string()))?
        .pop_if_empty()
        .extend([
            "api",
            "v4",
            "projects",
            &opts.project,
            "repository",
            "files",
            &file.actual_path,
            "raw",
        ]);
    url.query_pairs_mut().append_pair("ref", &opts.reference);

    tracing::info!(url = %url, "downloading file from url");

    let mut headers = HashMap::new();
    if !opts.token.is_empty() {
        headers.insert(GITLAB_TOKEN_HEADER.to_string(), from_env(&opts.token));
    }

    let destination = resolve_target_path(mount_path, file);
    downloader.download(url.as_str(), &headers, &destination).await
}
