/*!
 * Git repository cloning
 *
 * Shallow single-branch clones (depth 1) via libgit2, behind a factory
 * trait so tests can plant a working tree without a remote.
 */

use std::path::PathBuf;

use crate::env::from_env;
use crate::error::{Result, VolareError};

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub path: PathBuf,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Branch name; empty clones the remote default branch.
    pub reference: String,
    /// Remote name; empty keeps the default `origin`.
    pub remote: String,
}

/// Cloning is blocking; callers run it on a blocking task.
pub trait Cloner: Send {
    fn clone_repo(&self) -> Result<()>;
}

pub trait ClonerFactory: Send + Sync {
    fn new_cloner(&self, options: CloneOptions) -> Box<dyn Cloner>;
}

pub struct GitClonerFactory;

impl ClonerFactory for GitClonerFactory {
    fn new_cloner(&self, options: CloneOptions) -> Box<dyn Cloner> {
        Box::new(GitCloner { options })
    }
}

struct GitCloner {
    options: CloneOptions,
}

impl Cloner for GitCloner {
    fn clone_repo(&self) -> Result<()> {
        let opts = &self.options;

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.depth(1);

        if !opts.password.is_empty() {
            let username = from_env(&opts.username);
            let password = from_env(&opts.password);
            let mut callbacks = git2::RemoteCallbacks::new();
            callbacks.credentials(move |_url, _username_from_url, _allowed| {
                git2::Cred::userpass_plaintext(&username, &password)
            });
            fetch_options.remote_callbacks(callbacks);
        }

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_options);

        if !opts.reference.is_empty() {
            builder.branch(&opts.reference);
        }

        if !opts.remote.is_empty() {
            let remote_name = opts.remote.clone();
            builder.remote_create(move |repo, _name, url| repo.remote(&remote_name, url));
        }

        tracing::info!(url = %opts.url, path = %opts.path.display(), "cloning git repository");

        builder
            .clone(&opts.url, &opts.path)
            .map_err(|source| VolareError::Clone {
                url: opts.url.clone(),
                source,
            })?;

        Ok(())
    }
}
