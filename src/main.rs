/*!
 * Volare CLI - dual-mode volume populator binary
 *
 * Controller mode is deployed alongside the external populator machinery,
 * which drives the reconcile loop and launches worker pods with the argv
 * produced by `worker_args`. Populator mode runs inside the worker pod and
 * materializes the spec onto the mounted volume.
 */

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use volare::cloner::GitClonerFactory;
use volare::downloader::{Downloader, HttpDownloader};
use volare::error::{Result, VolareError};
use volare::fetcher::{
    Fetcher, GcsFetcher, GitFetcher, GithubFetcher, GitlabFetcher, HttpFetcher, Registry, S3Fetcher,
};
use volare::store::{gcs_client_factory, s3_client_factory};
use volare::types::{SourceType, RESOURCES_DIR};
use volare::{env, logging, populate, resources};

const POPULATOR_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    Controller,
    Populator,
}

#[derive(Parser)]
#[command(name = "volare")]
#[command(version = volare::VERSION)]
#[command(about = "Kubernetes volume populator for HTTP, S3, GCS, Git, GitHub and GitLab sources", long_about = None)]
struct Cli {
    /// Mode to run: controller or populator (required)
    #[arg(long, value_enum)]
    mode: Mode,

    /// Kubernetes API server URL (optional, in-cluster if empty)
    #[arg(long, default_value = "")]
    masterurl: String,

    /// Path to kubeconfig file (optional, in-cluster if empty)
    #[arg(long, default_value = "")]
    kubeconfig: String,

    /// Image for populator component (required in controller mode)
    #[arg(long, default_value = "")]
    image: String,

    /// HTTP endpoint for populator metrics (optional)
    #[arg(long, default_value = "")]
    httpendpoint: String,

    /// Metrics endpoint path (optional)
    #[arg(long, default_value = "")]
    metricspath: String,

    /// Namespace for populator component (required in controller mode)
    #[arg(long, default_value = "")]
    namespace: String,

    /// Resource prefix
    #[arg(long, default_value = "k8s.volare.dev")]
    prefix: String,

    /// Mount path to PVC
    #[arg(long, default_value = "/mnt/vol")]
    mountpath: String,

    /// Device path (optional)
    #[arg(long, default_value = "")]
    devicepath: String,

    /// API group
    #[arg(long, default_value = "k8s.volare.dev")]
    group: String,

    /// Kind name
    #[arg(long, default_value = "VolarePopulator")]
    kind: String,

    /// API group version
    #[arg(long, default_value = "v1alpha1")]
    groupversion: String,

    /// Resource name
    #[arg(long, default_value = "volarepopulators")]
    resource: String,

    /// Host directory with credential files shipped to workers
    #[arg(long, default_value = "")]
    resources: String,

    /// JSON source spec passed to the populator
    #[arg(long, default_value = "")]
    spec: String,

    /// JSON env map passed to the populator
    #[arg(long, default_value = "")]
    envs: String,

    /// JSON map of resource files (relative path to base64 content)
    #[arg(long = "resourcesMap", default_value = "")]
    resources_map: String,
}

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "populator failed");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.mode {
        Mode::Controller => run_controller(cli),
        Mode::Populator => run_populator(cli).await,
    }
}

fn run_controller(cli: Cli) -> Result<()> {
    if cli.image.is_empty() {
        return Err(VolareError::Config(
            "image is required in controller mode".to_string(),
        ));
    }
    if cli.namespace.is_empty() {
        return Err(VolareError::Config(
            "namespace is required in controller mode".to_string(),
        ));
    }

    tracing::info!(
        masterurl = %cli.masterurl,
        kubeconfig = %cli.kubeconfig,
        image = %cli.image,
        httpendpoint = %cli.httpendpoint,
        metricspath = %cli.metricspath,
        namespace = %cli.namespace,
        prefix = %cli.prefix,
        mountpath = %cli.mountpath,
        devicepath = %cli.devicepath,
        gvr = %format!("{}/{}/{}", cli.group, cli.groupversion, cli.resource),
        kind = %cli.kind,
        resources = %cli.resources,
        "controller configuration parsed"
    );

    Err(VolareError::Config(
        "controller mode is driven by the external populator machinery deployment; \
         this build ships the worker side, run it with --mode populator"
            .to_string(),
    ))
}

async fn run_populator(cli: Cli) -> Result<()> {
    env::load_env_from_json(&cli.envs)?;

    let resources_unpacked = if cli.resources_map.is_empty() {
        false
    } else {
        resources::write_resources_dir(&cli.resources_map, Path::new(RESOURCES_DIR))?;
        true
    };

    let http_client = reqwest::Client::builder()
        .timeout(POPULATOR_TIMEOUT)
        .build()
        .map_err(|e| VolareError::Config(format!("failed to build HTTP client: {e}")))?;
    let downloader: Arc<dyn Downloader> = Arc::new(HttpDownloader::new(http_client.clone()));

    let registry = Arc::new(Registry::new());
    registry.register_all(vec![
        (
            SourceType::Http,
            Arc::new(HttpFetcher::new(downloader.clone())) as Arc<dyn Fetcher>,
        ),
        (
            SourceType::S3,
            Arc::new(S3Fetcher::new(s3_client_factory())) as Arc<dyn Fetcher>,
        ),
        (
            SourceType::Gcs,
            Arc::new(GcsFetcher::new(gcs_client_factory(PathBuf::from(
                RESOURCES_DIR,
            )))) as Arc<dyn Fetcher>,
        ),
        (
            SourceType::Git,
            Arc::new(GitFetcher::new(Arc::new(GitClonerFactory))) as Arc<dyn Fetcher>,
        ),
        (
            SourceType::Github,
            Arc::new(GithubFetcher::new(http_client.clone(), downloader.clone()))
                as Arc<dyn Fetcher>,
        ),
        (
            SourceType::Gitlab,
            Arc::new(GitlabFetcher::new(http_client, downloader)) as Arc<dyn Fetcher>,
        ),
    ])?;

    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(POPULATOR_TIMEOUT).await;
        deadline.cancel();
    });

    let result = populate(&cancel, &cli.spec, Path::new(&cli.mountpath), &registry).await;

    if resources_unpacked {
        if let Err(err) = std::fs::remove_dir_all(RESOURCES_DIR) {
            tracing::warn!(error = %err, "failed to remove resources directory");
        }
    }

    result
}
