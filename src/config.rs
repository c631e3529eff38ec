// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of convparity (tensor-graph conversion parity harness).

//! Harness configuration.
//!
//! Loaded from TOML, then overridden by `CONVPARITY_*` environment variables
//! and finally by command-line flags. A tool whose program is unset or
//! `loopback` runs in process.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::convert::{ArtifactNaming, Converter, LoopbackConverter, ProcessConverter, ToolCommand};
use crate::harness::Harness;
use crate::runtime::{ConvertedRuntime, InterpreterRuntime, ProcessRuntime};

pub const ENV_CONVERTER: &str = "CONVPARITY_CONVERTER";
pub const ENV_RUNTIME: &str = "CONVPARITY_RUNTIME";
pub const ENV_WORK_DIR: &str = "CONVPARITY_WORK_DIR";
pub const LOOPBACK: &str = "loopback";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot find `{program}` (set {env} or adjust PATH): {source}")]
    ToolNotFound {
        program: String,
        env: &'static str,
        #[source]
        source: which::Error,
    },
    #[error("`{key}` must be {expected}")]
    InvalidValue { key: &'static str, expected: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub program: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl ToolConfig {
    pub fn is_loopback(&self) -> bool {
        self.program.as_deref().map_or(true, |p| p == LOOPBACK)
    }

    fn command(&self, env: &'static str) -> Result<ToolCommand, ConfigError> {
        let program = self.program.as_deref().unwrap_or(LOOPBACK);
        let resolved = resolve_program(program, env)?;
        let mut command = ToolCommand::new(resolved).with_args(self.args.clone());
        if let Some(secs) = self.timeout_secs {
            command = command.with_timeout(Duration::from_secs(secs));
        }
        Ok(command)
    }
}

/// Explicit paths are used as given; bare names are looked up on `PATH`.
fn resolve_program(program: &str, env: &'static str) -> Result<PathBuf, ConfigError> {
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    which::which(program).map_err(|source| ConfigError::ToolNotFound {
        program: program.to_string(),
        env,
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub work_dir: PathBuf,
    pub keep_artifacts: bool,
    pub jobs: usize,
    pub squeeze_batch: bool,
    pub converter: ToolConfig,
    pub runtime: ToolConfig,
    pub naming: ArtifactNaming,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("target").join("convparity"),
            keep_artifacts: false,
            jobs: 1,
            squeeze_batch: false,
            converter: ToolConfig::default(),
            runtime: ToolConfig::default(),
            naming: ArtifactNaming::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `CONVPARITY_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(program) = set(ENV_CONVERTER) {
            self.converter.program = Some(program);
        }
        if let Some(program) = set(ENV_RUNTIME) {
            self.runtime.program = Some(program);
        }
        if let Some(dir) = set(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "jobs",
                expected: "at least 1",
            });
        }
        for (key, tool) in [("converter.timeout_secs", &self.converter), ("runtime.timeout_secs", &self.runtime)] {
            if tool.timeout_secs == Some(0) {
                return Err(ConfigError::InvalidValue {
                    key,
                    expected: "a positive number of seconds",
                });
            }
        }
        if self.naming.ir_suffix.is_empty()
            || self.naming.engine_suffix.is_empty()
            || self.naming.ir_suffix == self.naming.engine_suffix
        {
            return Err(ConfigError::InvalidValue {
                key: "naming",
                expected: "two distinct, non-empty suffixes",
            });
        }
        Ok(())
    }

    pub fn build_converter(&self) -> Result<Box<dyn Converter>, ConfigError> {
        if self.converter.is_loopback() {
            return Ok(Box::new(LoopbackConverter::with_naming(self.naming.clone())));
        }
        let command = self.converter.command(ENV_CONVERTER)?;
        Ok(Box::new(ProcessConverter::new(command).with_naming(self.naming.clone())))
    }

    pub fn build_runtime(&self) -> Result<Box<dyn ConvertedRuntime>, ConfigError> {
        if self.runtime.is_loopback() {
            return Ok(Box::new(InterpreterRuntime {
                squeeze_batch: self.squeeze_batch,
            }));
        }
        Ok(Box::new(ProcessRuntime::new(self.runtime.command(ENV_RUNTIME)?)))
    }

    pub fn build_harness(&self) -> Result<Harness, ConfigError> {
        self.validate()?;
        let harness = Harness::new(self.build_converter()?, self.build_runtime()?, self.work_dir.clone());
        Ok(harness.keep_artifacts(self.keep_artifacts))
    }
}
