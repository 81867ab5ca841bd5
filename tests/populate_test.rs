/*!
 * End-to-end populate scenarios over injected clients
 */

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use volare::cloner::{CloneOptions, Cloner, ClonerFactory};
use volare::downloader::HttpDownloader;
use volare::error::{Result, VolareError};
use volare::fetcher::{GitFetcher, HttpFetcher, Registry, S3Fetcher};
use volare::populate;
use volare::store::{ClientFactory, ObjectClient, ObjectInfo, ReadStream};
use volare::types::{S3Options, SourceType};

struct FakeBucket {
    objects: HashMap<String, Vec<u8>>,
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

fn fake_s3_factory(objects: HashMap<String, Vec<u8>>) -> ClientFactory<S3Options> {
    let client: Arc<dyn ObjectClient> = Arc::new(FakeBucket { objects });
    Arc::new(move |_opts: &S3Options| Ok(client.clone()))
}

/// Cloner that plants a working tree and records where it was asked to
/// clone.
struct FakeClonerFactory {
    files: HashMap<String, Vec<u8>>,
    clone_path: Arc<Mutex<Option<PathBuf>>>,
}

struct FakeCloner {
    path: PathBuf,
    files: HashMap<String, Vec<u8>>,
}

impl Cloner for FakeCloner {
    fn clone_repo(&self) -> Result<()> {
        for (rel_path, content) in &self.files {
            let full = self.path.join(rel_path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(())
    }
}

impl ClonerFactory for FakeClonerFactory {
    fn new_cloner(&self, options: CloneOptions) -> Box<dyn Cloner> {
        *self.clone_path.lock().unwrap() = Some(options.path.clone());
        Box::new(FakeCloner {
            path: options.path,
            files: self.files.clone(),
        })
    }
}

#[tokio::test]
async fn test_two_s3_sources_populate_two_files() {
    let mut objects = HashMap::new();
    objects.insert("file1.txt".to_string(), b"one".to_vec());
    objects.insert("file2.txt".to_string(), b"two".to_vec());

    let registry = Arc::new(Registry::new());
    registry
        .register(SourceType::S3, Arc::new(S3Fetcher::new(fake_s3_factory(objects))))
        .unwrap();

    let specs = r#"{
        "sources": [
            {"type":"s3","s3":{"endpoint":"minio:9000","bucket":"b","paths":["file1.txt"],"accessKeyId":"k","secretAccessKey":"s"}},
            {"type":"s3","s3":{"endpoint":"minio:9000","bucket":"b","paths":["file2.txt"],"accessKeyId":"k","secretAccessKey":"s"}}
        ]
    }"#;

    let mount = tempdir().unwrap();
    let cancel = CancellationToken::new();
    populate(&cancel, specs, mount.path(), &registry)
        .await
        .unwrap();

    assert_eq!(std::fs::read(mount.path().join("file1.txt")).unwrap(), b"one");
    assert_eq!(std::fs::read(mount.path().join("file2.txt")).unwrap(), b"two");
}

#[tokio::test]
async fn test_malformed_spec_leaves_no_side_effects() {
    let registry = Arc::new(Registry::new());

    let mount = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let err = populate(&cancel, r#"{"invalid":"#, mount.path(), &registry)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("failed to unmarshal specs JSON"));
    assert_eq!(std::fs::read_dir(mount.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_git_source_peels_listed_directory_and_cleans_up() {
    let mut files = HashMap::new();
    files.insert("subdir/file.txt".to_string(), b"from-git".to_vec());

    let clone_path = Arc::new(Mutex::new(None));
    let registry = Arc::new(Registry::new());
    registry
        .register(
            SourceType::Git,
            Arc::new(GitFetcher::new(Arc::new(FakeClonerFactory {
                files,
                clone_path: clone_path.clone(),
            }))),
        )
        .unwrap();

    let specs = r#"{
        "sources": [
            {"type":"git","git":{"url":"https://example.com/repo.git","paths":["subdir"]}}
        ]
    }"#;

    let mount = tempdir().unwrap();
    let cancel = CancellationToken::new();
    populate(&cancel, specs, mount.path(), &registry)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(mount.path().join("file.txt")).unwrap(),
        b"from-git"
    );

    let cloned_into = clone_path.lock().unwrap().clone().expect("clone recorded");
    assert!(!cloned_into.exists(), "working tree must be removed");
}

fn http_registry() -> Arc<Registry> {
    let downloader = Arc::new(HttpDownloader::new(reqwest::Client::new()));
    let registry = Arc::new(Registry::new());
    registry
        .register(SourceType::Http, Arc::new(HttpFetcher::new(downloader)))
        .unwrap();
    registry
}

#[tokio::test]
async fn test_http_source_appends_basename_without_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;

    let specs = format!(
        r#"{{"sources":[{{"type":"http","http":{{"uri":"{}/data/file.txt"}}}}]}}"#,
        server.uri()
    );

    let mount = tempdir().unwrap();
    let cancel = CancellationToken::new();
    populate(&cancel, &specs, mount.path(), &http_registry())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(mount.path().join("file.txt")).unwrap(),
        b"payload"
    );
}

#[tokio::test]
async fn test_http_source_with_file_target_is_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;

    // The target path names a file, so the destination is used verbatim.
    let specs = format!(
        r#"{{"sources":[{{"type":"http","targetPath":"custom.txt","http":{{"uri":"{}/data/file.txt"}}}}]}}"#,
        server.uri()
    );

    let mount = tempdir().unwrap();
    let cancel = CancellationToken::new();
    populate(&cancel, &specs, mount.path(), &http_registry())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(mount.path().join("custom.txt")).unwrap(),
        b"payload"
    );
}

#[tokio::test]
async fn test_target_path_prefixes_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;

    let specs = format!(
        r#"{{"sources":[{{"type":"http","targetPath":"nested/dir","http":{{"uri":"{}/data/file.txt"}}}}]}}"#,
        server.uri()
    );

    let mount = tempdir().unwrap();
    let cancel = CancellationToken::new();
    populate(&cancel, &specs, mount.path(), &http_registry())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(mount.path().join("nested/dir/file.txt")).unwrap(),
        b"payload"
    );
}

#[tokio::test]
async fn test_download_failure_fails_populate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let specs = format!(
        r#"{{"sources":[{{"type":"http","http":{{"uri":"{}/gone.txt"}}}}]}}"#,
        server.uri()
    );

    let mount = tempdir().unwrap();
    let cancel = CancellationToken::new();
    let err = populate(&cancel, &specs, mount.path(), &http_registry())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unexpected HTTP status 500"));
}

#[tokio::test]
async fn test_cancelled_scope_aborts_populate() {
    let registry = http_registry();
    let specs = r#"{"sources":[{"type":"http","http":{"uri":"https://example.invalid/file.txt"}}]}"#;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mount = tempdir().unwrap();
    let result = populate(&cancel, specs, mount.path(), &registry).await;

    // With a cancelled parent the run either fails or completes without
    // producing files; it must not hang.
    if let Err(err) = result {
        assert!(err.is_cancelled() || err.to_string().contains("failed to fetch"));
    }
}
