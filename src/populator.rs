/*!
 * Engine orchestrator
 *
 * Decodes the spec, validates per-source configuration, and drives the
 * outer pool of sources; each outer job obtains a fetch plan and runs it on
 * a nested pool. Plan cleanup runs on every exit path, inner failure
 * included.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::env::env_json;
use crate::error::{Result, VolareError};
use crate::fetcher::Registry;
use crate::pool::{run_pool, JobFn};
use crate::resources::read_files_as_base64;
use crate::types::{PopulatorSpec, Source};

/// Decode the spec document, failing fast on empty or malformed input.
pub fn parse_spec(specs: &str) -> Result<PopulatorSpec> {
    if specs.is_empty() {
        return Err(VolareError::EmptySpec);
    }

    serde_json::from_str(specs).map_err(VolareError::SpecJson)
}

/// Materialize every source in `specs` below `mount_path`.
///
/// Sources run on an outer pool sized by the spec's `workers`; each source's
/// objects run on a nested pool sized by the plan's hint. The first failure
/// short-circuits the result.
pub async fn populate(
    cancel: &CancellationToken,
    specs: &str,
    mount_path: &Path,
    registry: &Arc<Registry>,
) -> Result<()> {
    let spec = parse_spec(specs)?;

    for source in &spec.sources {
        source.validate()?;
    }

    let registry = registry.clone();
    let mount = mount_path.to_path_buf();

    let processor: JobFn<Source> = Arc::new(move |cancel, source| {
        let registry = registry.clone();
        let mount = mount.clone();
        Box::pin(async move { run_source(cancel, registry, mount, source).await })
    });

    run_pool(cancel, spec.sources, spec.workers, processor).await
}

/// One outer job: discover, run the inner pool, then clean up.
async fn run_source(
    cancel: CancellationToken,
    registry: Arc<Registry>,
    mount_path: PathBuf,
    source: Source,
) -> Result<()> {
    let fetcher = registry.get(source.source_type)?;

    // The source's target path is prepended to the mount root; everything
    // the fetcher lays out stays below it.
    let target = mount_path.join(source.target_path.trim_start_matches('/'));

    let Some(plan) = fetcher.fetch(&cancel, &target, &source).await? else {
        return Ok(());
    };

    let result = run_pool(&cancel, plan.objects, plan.workers, plan.processor).await;

    if let Some(cleanup) = plan.cleanup {
        if let Err(err) = cleanup().await {
            tracing::warn!(error = %err, source_type = %source.source_type, "cleanup failed");
        }
    }

    result
}

/// Build the worker pod argv for a populator run: the controller→worker
/// boundary.
///
/// The resource directory, when configured, travels as a JSON map of
/// relative path to base64 content with dot-prefixed entries excluded.
pub fn worker_args(
    spec: &PopulatorSpec,
    mount_path: &Path,
    resources_dir: Option<&Path>,
) -> Result<Vec<String>> {
    let spec_json = serde_json::to_string(spec)
        .map_err(|e| VolareError::Other(format!("failed to marshal spec to JSON: {e}")))?;
    let envs = env_json()?;

    let mut args = vec![
        "--mode=populator".to_string(),
        format!("--spec={spec_json}"),
        format!("--envs={envs}"),
        format!("--mountpath={}", mount_path.display()),
    ];

    if let Some(dir) = resources_dir {
        let resource_map = read_files_as_base64(dir)?;
        let map_json = serde_json::to_string(&resource_map)
            .map_err(|e| VolareError::Other(format!("failed to marshal resources to JSON: {e}")))?;
        args.push(format!("--resourcesMap={map_json}"));
    }

    Ok(args)
}
