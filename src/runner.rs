use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8PathBuf;
use tracing::info;

use crate::error::DiffExprError;

pub const PROGRESS_MARKER: &str = "> Processing Locus";
const STDERR_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<Utf8PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait ToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, DiffExprError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, DiffExprError> {
        let command_line = invocation.command_line();
        info!(command = %command_line, "running tool");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir.as_std_path());
        }
        let output = cmd.output().map_err(|err| DiffExprError::ToolExecution {
            command: command_line.clone(),
            cause: err.to_string(),
        })?;

        let result = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            let tail = stderr_tail(&result.stderr);
            let cause = if tail.is_empty() {
                status
            } else {
                format!("{status}: {tail}")
            };
            return Err(DiffExprError::ToolExecution {
                command: command_line,
                cause,
            });
        }

        log_tool_output(&invocation.program, &result);
        Ok(result)
    }
}

#[derive(Debug, Default)]
pub struct ProgressFilter {
    last_locus: Option<String>,
}

impl ProgressFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, line: &str) -> bool {
        if !line.starts_with(PROGRESS_MARKER) {
            return true;
        }
        let locus = line.split_whitespace().last().unwrap_or_default();
        if self.last_locus.as_deref() == Some(locus) {
            return false;
        }
        self.last_locus = Some(locus.to_string());
        true
    }
}

pub fn log_tool_output(tool: &str, output: &ToolOutput) {
    for line in output.stdout.lines() {
        info!(tool, "{line}");
    }
    let mut filter = ProgressFilter::new();
    for line in output.stderr.lines() {
        if filter.admit(line) {
            info!(tool, "{line}");
        }
    }
}

pub fn resolve_program(name: &str) -> Result<String, DiffExprError> {
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        if Path::new(name).is_file() {
            return Ok(name.to_string());
        }
        return Err(DiffExprError::MissingTool(name.to_string()));
    }
    find_in_path(name)
        .map(|path| path.to_string_lossy().into_owned())
        .ok_or_else(|| DiffExprError::MissingTool(name.to_string()))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
