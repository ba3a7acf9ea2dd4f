#![forbid(unsafe_code)]

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::thread;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};

use crate::error::{ExecError, Result};

/// Environment variable that forces profiling on when set.
pub const PROFILE_ENV: &str = "SOMBRA_EXEC_PROFILE";

/// Tunables for a [`Scheduler`](crate::scheduler::Scheduler).
///
/// Every field is optional in the TOML form:
///
/// ```toml
/// worker_threads = 4
/// enable_lifetime_optimize = true
/// max_loop_iterations = 10000
/// profile = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerOptions {
    /// Worker threads for the runtime built by [`SchedulerOptions::build_runtime`].
    pub worker_threads: usize,
    /// Delete intermediate variables once their last reader succeeded.
    pub enable_lifetime_optimize: bool,
    /// Upper bound on body executions per loop node; unbounded when `None`.
    pub max_loop_iterations: Option<u64>,
    /// Collect per-operator execution statistics.
    pub profile: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            worker_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            enable_lifetime_optimize: false,
            max_loop_iterations: None,
            profile: false,
        }
    }
}

impl SchedulerOptions {
    /// Parses options from TOML text. Environment overrides are not applied.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self =
            toml::from_str(text).map_err(|err| ExecError::Config(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a TOML file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| ExecError::Config(format!("{}: {err}", path.display())))?;
        Ok(Self::from_toml_str(&text)?.with_env_overrides())
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var_os(key))
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        if lookup(PROFILE_ENV).is_some() {
            self.profile = true;
        }
        self
    }

    /// Rejects inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(ExecError::Config("worker_threads must be at least 1".into()));
        }
        if self.max_loop_iterations == Some(0) {
            return Err(ExecError::Config(
                "max_loop_iterations must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// Builds a multi-threaded tokio runtime sized by `worker_threads`.
    pub fn build_runtime(&self) -> Result<Runtime> {
        self.validate()?;
        Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .thread_name("sombra-exec")
            .enable_time()
            .build()
            .map_err(|err| ExecError::Runner(err.to_string()))
    }
}
