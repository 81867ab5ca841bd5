/*!
 * HTTP download of a single object to a destination file
 *
 * Shared by the HTTP, GitHub and GitLab fetchers. Behind a trait so tests
 * can record download requests without touching the network.
 */

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

use crate::error::{Result, VolareError};

#[async_trait]
pub trait Downloader: Send + Sync {
    /// GET `url` with the supplied headers and stream the body to
    /// `dest_path`, creating parent directories as needed. Any status other
    /// than 200 is a failure.
    async fn download(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        dest_path: &Path,
    ) -> Result<()>;
}

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        dest_path: &Path,
    ) -> Result<()> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|source| VolareError::Request {
            url: url.to_string(),
            source,
        })?;

        if response.status() != StatusCode::OK {
            return Err(VolareError::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

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

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(body);
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
}
