/*!
 * Bucket clients for the S3 and GCS fetchers
 *
 * Thin adapters over `object_store`, kept behind the [`ObjectClient`] trait
 * so tests substitute in-memory fakes. A client is bound to one bucket at
 * construction; factories receive the source options with credential
 * references already resolvable through the environment bridge.
 */

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::ObjectStore;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

use crate::env::from_env;
use crate::error::{Result, VolareError};
use crate::types::{GcsOptions, S3Options};

pub type ReadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// Narrow interface over a single bucket: recursive prefix listing and
/// object retrieval.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    async fn get_object(&self, key: &str) -> Result<ReadStream>;
}

/// Factory injected into the S3 and GCS fetchers.
pub type ClientFactory<O> = Arc<dyn Fn(&O) -> Result<Arc<dyn ObjectClient>> + Send + Sync>;

struct BucketClient {
    store: Arc<dyn ObjectStore>,
}

#[async_trait]
impl ObjectClient for BucketClient {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let prefix_path = object_store::path::Path::from(prefix);
        let mut listing = self.store.list(Some(&prefix_path));

        let mut objects = Vec::new();
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|e| VolareError::ListObjects(e.to_string()))?;
            objects.push(ObjectInfo {
                key: meta.location.to_string(),
                size: meta.size as u64,
            });
        }

        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<ReadStream> {
        let object_path = object_store::path::Path::from(key);
        let result = self
            .store
            .get(&object_path)
            .await
            .map_err(|e| VolareError::GetObject {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(result
            .into_stream()
            .map_err(std::io::Error::other)
            .boxed())
    }
}

/// Build MinIO-compatible S3 clients from resolved source options.
///
/// Credential fields may be environment references; they are resolved here,
/// at client construction time.
pub fn s3_client_factory() -> ClientFactory<S3Options> {
    Arc::new(|opts: &S3Options| {
        let scheme = if opts.secure { "https" } else { "http" };
        let region = if opts.region.is_empty() {
            "us-east-1"
        } else {
            opts.region.as_str()
        };

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&opts.bucket)
            .with_endpoint(format!("{scheme}://{}", opts.endpoint))
            .with_allow_http(!opts.secure)
            .with_region(region)
            .with_access_key_id(from_env(&opts.access_key_id))
            .with_secret_access_key(from_env(&opts.secret_access_key))
            .with_virtual_hosted_style_request(false);

        if !opts.session_token.is_empty() {
            builder = builder.with_token(from_env(&opts.session_token));
        }

        let store = builder.build().map_err(|e| VolareError::Client {
            backend: "s3",
            message: e.to_string(),
        })?;

        Ok(Arc::new(BucketClient {
            store: Arc::new(store),
        }) as Arc<dyn ObjectClient>)
    })
}

/// Build GCS clients. The credentials file is looked up inside the resource
/// bundle directory; an empty file name means unauthenticated access.
pub fn gcs_client_factory(resources_dir: PathBuf) -> ClientFactory<GcsOptions> {
    Arc::new(move |opts: &GcsOptions| {
        let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&opts.bucket);

        if opts.credentials_file.is_empty() {
            builder = builder.with_skip_signature(true);
        } else {
            let credentials_path = resources_dir.join(&opts.credentials_file);
            builder = builder
                .with_service_account_path(credentials_path.to_string_lossy().into_owned());
        }

        let store = builder.build().map_err(|e| VolareError::Client {
            backend: "gcs",
            message: e.to_string(),
        })?;

        Ok(Arc::new(BucketClient {
            store: Arc::new(store),
        }) as Arc<dyn ObjectClient>)
    })
}

/// Stream an object body into `dest_path`, creating parent directories.
pub(crate) async fn write_stream(stream: ReadStream, dest_path: &std::path::Path) -> Result<()> {
    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| VolareError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let mut out_file =
        tokio::fs::File::create(dest_path)
            .await
            .map_err(|source| VolareError::CreateFile {
                path: dest_path.to_path_buf(),
                source,
            })?;

    let mut reader = StreamReader::new(stream);
    tokio::io::copy(&mut reader, &mut out_file)
        .await
        .map_err(|source| VolareError::WriteFile {
            path: dest_path.to_path_buf(),
            source,
        })?;

    out_file.flush().await.map_err(|source| VolareError::WriteFile {
        path: dest_path.to_path_buf(),
        source,
    })?;

    Ok(())
}
