//! S3 (MinIO-compatible) source: recursive prefix listing, streamed
//! downloads.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VolareError};
use crate::fetcher::{FetchPlan, Fetcher};
use crate::paths::resolve_target_path;
use crate::pool::JobFn;
use crate::store::{write_stream, ClientFactory, ObjectClient};
use crate::types::{ObjectToDownload, S3Options, Source, SourceType};

pub struct S3Fetcher {
    client_factory: ClientFactory<S3Options>,
}

impl S3Fetcher {
    pub fn new(client_factory: ClientFactory<S3Options>) -> Self {
        Self { client_factory }
    }
}

#[async_trait]
impl Fetcher for S3Fetcher {
    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        mount_path: &Path,
        source: &Source,
    ) -> Result<Option<FetchPlan>> {
        let Some(opts) = source.s3.as_ref() else {
            return Err(VolareError::InvalidSourceConfig {
                source_type: SourceType::S3,
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
    tracing::info!(bucket, key = %file.actual_path, "downloading s3 object");

    let body = client.get_object(&file.actual_path).await?;
    let target_path = resolve_target_path(mount_path, &file);
    write_stream(body, &target_path).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::run_pool;
    use crate::store::{ObjectInfo, ReadStream};
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// In-memory bucket used by the S3 and GCS fetcher tests.
    pub(crate) struct FakeBucket {
        pub objects: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ObjectClient for FakeBucket {
        async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
            let mut listed: Vec<ObjectInfo> = self
                .objects
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, content)| ObjectInfo {
                    key: key.clone(),
                    size: content.len() as u64,
                })
                .collect();
            listed.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(listed)
        }

        async fn get_object(&self, key: &str) -> Result<ReadStream> {
            let content = self
                .objects
                .get(key)
                .ok_or_else(|| VolareError::GetObject {
                    key: key.to_string(),
                    message: "not found".to_string(),
                })?
                .clone();
            Ok(stream::iter(vec![Ok(Bytes::from(content))]).boxed())
        }
    }

    pub(crate) fn fake_factory(
        objects: HashMap<String, Vec<u8>>,
    ) -> ClientFactory<S3Options> {
        let client: Arc<dyn ObjectClient> = Arc::new(FakeBucket { objects });
        Arc::new(move |_opts: &S3Options| Ok(client.clone()))
    }

    fn s3_source(paths: Vec<&str>) -> Source {
        Source {
            source_type: SourceType::S3,
            target_path: String::new(),
            http: None,
            s3: Some(S3Options {
                endpoint: "minio:9000".to_string(),
                bucket: "bucket".to_string(),
                paths: paths.into_iter().map(String::from).collect(),
                ..Default::default()
            }),
            gcs: None,
            git: None,
            github: None,
            gitlab: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_downloads_discovered_objects() {
        let mut objects = HashMap::new();
        objects.insert("data/a.txt".to_string(), b"alpha".to_vec());
        objects.insert("data/sub/b.txt".to_string(), b"beta".to_vec());
        objects.insert("other/c.txt".to_string(), b"gamma".to_vec());

        let mount = tempdir().unwrap();
        let fetcher = S3Fetcher::new(fake_factory(objects));
        let cancel = CancellationToken::new();

        let plan = fetcher
            .fetch(&cancel, mount.path(), &s3_source(vec!["data"]))
            .await
            .unwrap()
            .expect("plan");
        assert_eq!(plan.objects.len(), 2);

        run_pool(&cancel, plan.objects, plan.workers, plan.processor)
            .await
            .unwrap();

        assert_eq!(std::fs::read(mount.path().join("a.txt")).unwrap(), b"alpha");
        assert_eq!(
            std::fs::read(mount.path().join("sub/b.txt")).unwrap(),
            b"beta"
        );
        assert!(!mount.path().join("c.txt").exists());
    }

    #[tokio::test]
    async fn test_fetch_skips_directory_keys() {
        let mut objects = HashMap::new();
        objects.insert("data/".to_string(), Vec::new());
        objects.insert("data/a.txt".to_string(), b"alpha".to_vec());

        let fetcher = S3Fetcher::new(fake_factory(objects));
        let cancel = CancellationToken::new();
        let mount = tempdir().unwrap();

        let plan = fetcher
            .fetch(&cancel, mount.path(), &s3_source(vec!["data"]))
            .await
            .unwrap()
            .expect("plan");
        assert_eq!(plan.objects.len(), 1);
        assert_eq!(plan.objects[0].actual_path, "data/a.txt");
    }

    #[tokio::test]
    async fn test_fetch_empty_listing_is_noop() {
        let fetcher = S3Fetcher::new(fake_factory(HashMap::new()));
        let cancel = CancellationToken::new();
        let mount = tempdir().unwrap();

        let plan = fetcher
            .fetch(&cancel, mount.path(), &s3_source(vec!["data"]))
            .await
            .unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn test_leading_slash_trimmed_from_prefix() {
        let mut objects = HashMap::new();
        objects.insert("data/a.txt".to_string(), b"alpha".to_vec());

        let fetcher = S3Fetcher::new(fake_factory(objects));
        let cancel = CancellationToken::new();
        let mount = tempdir().unwrap();

        let plan = fetcher
            .fetch(&cancel, mount.path(), &s3_source(vec!["/data"]))
            .await
            .unwrap()
            .expect("plan");
        assert_eq!(plan.objects.len(), 1);
        // The original (slash-prefixed) path is kept for path resolution.
        assert_eq!(plan.objects[0].path, "/data");
    }
}
