//! Generic git source: shallow-clone into a unique temporary directory,
//! walk the requested paths, copy files under the mount root. The plan's
//! cleanup removes the working tree and runs even when downloads fail.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::cloner::{CloneOptions, ClonerFactory};
use crate::error::{Result, VolareError};
use crate::fetcher::{CleanupFn, FetchPlan, Fetcher};
use crate::paths::resolve_target_path;
use crate::pool::JobFn;
use crate::types::{ObjectToDownload, Source, SourceType};

pub struct GitFetcher {
    cloner_factory: Arc<dyn ClonerFactory>,
}

impl GitFetcher {
    pub fn new(cloner_factory: Arc<dyn ClonerFactory>) -> Self {
        Self { cloner_factory }
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(
        &self,
        _cancel: &CancellationToken,
        mount_path: &Path,
        source: &Source,
    ) -> Result<Option<FetchPlan>> {
        let Some(opts) = source.git.as_ref() else {
            return Err(VolareError::InvalidSourceConfig {
                source_type: SourceType::Git,
            });
        };

        let temp_dir = tempfile::Builder::new()
            .prefix("gitclone-")
            .tempdir()
            .map_err(VolareError::Io)?
            .keep();

        let cloner = self.cloner_factory.new_cloner(CloneOptions {
            path: temp_dir.clone(),
            url: opts.url.clone(),
            username: opts.username.clone(),
            password: opts.password.clone(),
            reference: opts.reference.clone(),
            remote: opts.remote.clone(),
        });

        let clone_result = tokio::task::spawn_blocking(move || cloner.clone_repo())
            .await
            .map_err(|e| VolareError::Other(format!("clone task failed: {e}")));

        if let Err(err) = clone_result.and_then(|inner| inner) {
            remove_working_tree(&temp_dir).await;
            return Err(err);
        }

        let objects = match prepare_objects(&temp_dir, mount_path, &opts.paths) {
            Ok(objects) => objects,
            Err(err) => {
                remove_working_tree(&temp_dir).await;
                return Err(err);
            }
        };

        let processor: JobFn<ObjectToDownload> =
            Arc::new(|_cancel, object| Box::pin(copy_file(object)));

        let cleanup_path = temp_dir.clone();
        let cleanup: CleanupFn = Box::new(move || {
            Box::pin(async move {
                tokio::fs::remove_dir_all(&cleanup_path)
                    .await
                    .map_err(VolareError::Io)
            })
        });

        Ok(Some(FetchPlan {
            processor,
            objects,
            workers: opts.workers,
            cleanup: Some(cleanup),
        }))
    }
}

/// Walk each requested path in the working tree, pairing every file's
/// absolute location with its resolved destination under the mount root.
fn prepare_objects(
    working_tree: &Path,
    mount_path: &Path,
    paths: &[String],
) -> Result<Vec<ObjectToDownload>> {
    let mut objects = Vec::new();

    for listed_path in paths {
        let start = working_tree.join(listed_path.trim_start_matches('/'));

        for entry in WalkDir::new(&start) {
            let entry = entry.map_err(|e| VolareError::Io(io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel_path = entry
                .path()
                .strip_prefix(working_tree)
                .map_err(|e| VolareError::Io(io::Error::other(e)))?
                .to_string_lossy()
                .into_owned();

            let destination = resolve_target_path(
                mount_path,
                &ObjectToDownload {
                    path: listed_path.clone(),
                    actual_path: rel_path,
                },
            );

            objects.push(ObjectToDownload {
                path: entry.path().to_string_lossy().into_owned(),
                actual_path: destination.to_string_lossy().into_owned(),
            });
        }
    }

    Ok(objects)
}

async fn copy_file(object: ObjectToDownload) -> Result<()> {
    let destination = PathBuf::from(&object.actual_path);
    tracing::info!(dest = %destination.display(), "copying file from working tree");

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| VolareError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::copy(&object.path, &destination)
        .await
        .map_err(|source| VolareError::WriteFile {
            path: destination.clone(),
            source,
        })?;

    Ok(())
}

async fn remove_working_tree(path: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(path).await {
        tracing::error!(error = %err, path = %path.display(), "cleanup failed");
    }
}
