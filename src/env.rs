/*!
 * Environment bridge between controller and worker
 *
 * The controller snapshots its environment as JSON and passes it to the
 * worker pod via `--envs`; the worker rehydrates it once during bootstrap,
 * before any fetcher runs. Credential fields in source options may name
 * environment variables and are resolved with [`from_env`] at call time.
 */

use std::collections::{BTreeMap, HashMap};
use std::env;

use crate::error::{Result, VolareError};

/// Resolve an environment reference: if `value` names a set environment
/// variable, substitute its value; otherwise pass the literal through
/// unchanged. Empty input stays empty.
pub fn from_env(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    env::var(value).unwrap_or_else(|_| value.to_string())
}

/// Serialize the current process environment as a pretty-printed JSON map.
pub fn env_json() -> Result<String> {
    let env_map: BTreeMap<String, String> = env::vars().collect();
    serde_json::to_string_pretty(&env_map)
        .map_err(|e| VolareError::Other(format!("failed to marshal envs to JSON: {e}")))
}

/// Rehydrate the process environment from a JSON map produced by
/// [`env_json`]. Empty input is a no-op. Called once during populator
/// bootstrap; the environment is treated as immutable afterwards.
pub fn load_env_from_json(data: &str) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }

    let env_map: HashMap<String, String> =
        serde_json::from_str(data).map_err(VolareError::EnvJson)?;

    for (key, value) in env_map {
        env::set_var(key, value);
    }

    Ok(())
}
