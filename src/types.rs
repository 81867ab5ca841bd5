/*!
 * Source specification types for the populator engine
 *
 * The spec document is the JSON payload carried from the custom resource to
 * the worker pod via `--spec`. Field names follow the CRD wire format
 * (camelCase).
 */

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolareError};

/// Pool size used when a spec or source does not request one.
pub const DEFAULT_WORKERS: usize = 2;

/// Well-known directory where the resource bundle (e.g. service-account
/// keys) is unpacked on the worker side. Removed on worker exit.
pub const RESOURCES_DIR: &str = "/tmp/volare-resources";

/// Origin type of a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Http,
    S3,
    Gcs,
    Git,
    Github,
    Gitlab,
}

impl SourceType {
    /// Lowercase label as it appears on the wire and in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::Http => "http",
            SourceType::S3 => "s3",
            SourceType::Gcs => "gcs",
            SourceType::Git => "git",
            SourceType::Github => "github",
            SourceType::Gitlab => "gitlab",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Root spec document: the ordered set of sources to materialize plus an
/// optional outer pool size.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatorSpec {
    #[serde(default)]
    pub sources: Vec<Source>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

/// One entry in the spec, bound to a specific origin type.
///
/// Exactly the options sub-record matching `source_type` must be present;
/// [`Source::validate`] enforces this before any fetcher runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// Relative path below the mount root under which this source's files
    /// are laid out.
    #[serde(default)]
    pub target_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Options>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab: Option<GitlabOptions>,
}

impl Source {
    /// Check that the options sub-record matching the source type is present.
    pub fn validate(&self) -> Result<()> {
        let present = match self.source_type {
            SourceType::Http => self.http.is_some(),
            SourceType::S3 => self.s3.is_some(),
            SourceType::Gcs => self.gcs.is_some(),
            SourceType::Git => self.git.is_some(),
            SourceType::Github => self.github.is_some(),
            SourceType::Gitlab => self.gitlab.is_some(),
        };

        if present {
            Ok(())
        } else {
            Err(VolareError::InvalidSourceConfig {
                source_type: self.source_type,
            })
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOptions {
    #[serde(default)]
    pub uri: String,

    /// Header values may name environment variables; they are resolved with
    /// [`crate::env::from_env`] at fetch time.
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub headers: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Options {
    pub endpoint: String,

    #[serde(default)]
    pub secure: bool,

    pub bucket: String,

    /// Object key prefixes to list recursively.
    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    #[serde(default)]
    pub session_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsOptions {
    pub bucket: String,

    #[serde(default)]
    pub paths: Vec<String>,

    /// File name inside the resource bundle; empty means unauthenticated
    /// access.
    #[serde(default)]
    pub credentials_file: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOptions {
    #[serde(default)]
    pub url: String,

    /// Paths inside the working tree to copy; empty string means the whole
    /// tree.
    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(rename = "ref", default)]
    pub reference: String,

    #[serde(default)]
    pub remote: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubOptions {
    pub owner: String,

    pub repo: String,

    #[serde(rename = "ref", default)]
    pub reference: String,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitlabOptions {
    /// Base URL of the GitLab instance, scheme included.
    pub host: String,

    /// Project path or numeric id, escaped as a single path segment in API
    /// URLs.
    pub project: String,

    #[serde(rename = "ref", default)]
    pub reference: String,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

/// One object discovered under a listed path.
///
/// `path` is the originally requested prefix or file and `actual_path` the
/// concrete key discovered under it; both are interpreted by
/// [`crate::paths::resolve_target_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectToDownload {
    pub path: String,
    pub actual_path: String,
}
