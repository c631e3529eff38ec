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

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::convert::{remove_stale, ArtifactNaming, ConversionArtifact, ConversionError, Converter};
use crate::export::ExportedGraph;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure of an external tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs_f64())]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// An external program with fixed leading arguments and a wall-clock limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Run with `extra` appended to the fixed arguments. Succeeds only on a
    /// zero exit status within the timeout; returns captured stdout.
    pub fn run(&self, extra: &[OsString]) -> Result<String, ToolError> {
        self.run_with(None, extra)
    }

    /// Like [`ToolCommand::run`], with `dir` as the working directory.
    pub fn run_in(&self, dir: &Path, extra: &[OsString]) -> Result<String, ToolError> {
        self.run_with(Some(dir), extra)
    }

    fn run_with(&self, dir: Option<&Path>, extra: &[OsString]) -> Result<String, ToolError> {
        let program = self.display_name();
        let mut command = Command::new(&self.program);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        let mut child = command
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = wait_with_timeout(&mut child, self.timeout, &program)?;
        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        if !stderr.trim().is_empty() {
            tracing::debug!(tool = %program, stderr = %stderr.trim(), "tool stderr");
        }

        if !status.success() {
            return Err(ToolError::Exit {
                program,
                status: status.to_string(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn wait_with_timeout(child: &mut Child, limit: Duration, program: &str) -> Result<ExitStatus, ToolError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::TimedOut {
                        program: program.to_string(),
                        timeout: limit,
                    });
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(source) => {
                return Err(ToolError::Wait {
                    program: program.to_string(),
                    source,
                })
            }
        }
    }
}

/// Runs an external converter as
/// `<program> [args..] <trace file> inputshape=<manifest>`.
#[derive(Debug, Clone)]
pub struct ProcessConverter {
    pub tool: ToolCommand,
    pub naming: ArtifactNaming,
}

impl ProcessConverter {
    pub fn new(tool: ToolCommand) -> Self {
        Self {
            tool,
            naming: ArtifactNaming::default(),
        }
    }

    pub fn with_naming(mut self, naming: ArtifactNaming) -> Self {
        self.naming = naming;
        self
    }
}

impl Converter for ProcessConverter {
    fn name(&self) -> &str {
        self.tool.program.to_str().unwrap_or("converter")
    }

    fn convert(&self, graph: &ExportedGraph) -> Result<ConversionArtifact, ConversionError> {
        let ir_path = self.naming.ir_path(graph);
        let engine_path = self.naming.engine_path(graph);
        remove_stale(&[&ir_path, &engine_path])?;

        let trace = fs::canonicalize(&graph.trace_path).map_err(|source| ConversionError::Io {
            path: graph.trace_path.clone(),
            source,
        })?;
        let extra = [trace.into_os_string(), OsString::from(graph.manifest.to_cli_arg())];
        // a non-zero exit fails the conversion even if artifacts were written
        self.tool.run_in(graph.artifact_dir(), &extra)?;

        ConversionArtifact::collect(&graph.case, ir_path, engine_path)
    }
}
