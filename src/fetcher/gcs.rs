//! Google Cloud Storage source. Same shape as the S3 fetcher; the client
//! factory reads a credentials file from the resource bundle or falls back
//! to unauthenticated access.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VolareError};
use crate::fetcher::{FetchPlan, Fetcher};
use crate::paths::resolve_target_path;
use crate::pool::JobFn;
use crate::store::{write_stream, ClientFactory, ObjectClient};
use crate::types::{GcsOptions, ObjectToDownload, Source, SourceType};

pub struct GcsFetcher {
    client_factory: ClientFactory<GcsOptions>,
}

impl GcsFetcher {
    pub fn new(client_factory: ClientFactory<GcsOptions>) -> Self {
        Self { client_factory }
    }
}

#[async_trait]
impl Fetcher for GcsFetcher {
    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        mount_path: &Path,
        source: &Source,
    ) -> Result<Option<FetchPlan>> {
        let Some(opts) = source.gcs.as_ref() else {
            return Err(VolareError::InvalidSourceConfig {
                source_type: SourceType::Gcs,
            });
        };

        let client = (self.client_factory)(opts)?;

        let mut objects = Vec::new();
        for listed_path in &opts.paths {
            let listed = client
                .list_objects(listed_path.trim_start_matches('/'))
                .await?;

            for object in listed {
                if object.key.ends_with('/') {
                    continue;
                }
                objects.push(ObjectToDownload {
                    path: listed_path.clone(),
                    actual_path: object.key,
                });
            }
        }

        if objects.is_empty() {
            tracing::info!(bucket = %opts.bucket, paths = ?opts.paths, "no objects found for download");
            return Ok(None);
        }

        let bucket = opts.bucket.clone();
        let workers = opts.workers;
        let mount = mount_path.to_path_buf();

        let processor: JobFn<ObjectToDownload> = Arc::new(move |_cancel, object| {
            let client = client.clone();
            let bucket = bucket.clone();
            let mount = mount.clone();
            Box::pin(async move { download_object(client, &mount, &bucket, object).await })
        });

        Ok(Some(FetchPlan {
            processor,
            objects,
            workers,
            cleanup: None,
        }))
    }
}

async fn download_object(
    client: Arc<dyn ObjectClient>,
    mount_path: &Path,
    bucket: &str,
    file: ObjectToDownload,
) -> Result<()> {
    tracing::info!(bucket, key = %file.actual_path, "downloading gcs object");

    let body = client.get_object(&file.actual_path).await?;
    let target_path = resolve_target_path(mount_path, &file);
    write_stream(body, &target_path).await
}
