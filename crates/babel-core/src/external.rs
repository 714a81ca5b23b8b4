//! One-shot evaluation in a fresh interpreter process
//!
//! The program goes to the interpreter's stdin. In `value` mode the body is
//! first wrapped in the configured template, which writes the serialized
//! result to a temporary file that is read back and removed.

use std::process::Stdio;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::config::{ExternalConfig, InterpreterConfig, BODY_PLACEHOLDER, OUT_FILE_PLACEHOLDER};
use crate::driver::ResultMode;
use crate::error::{BabelError, Result};

/// Fill `template` with the body and a path quoted for a single-quoted
/// string literal.
pub fn fill_template(template: &str, body: &str, out_file: &str) -> String {
    let quoted_path = out_file.replace('\\', "\\\\").replace('\'', "\\'");
    // The path goes in first so a body that mentions the placeholder stays intact.
    template
        .replace(OUT_FILE_PLACEHOLDER, &quoted_path)
        .replace(BODY_PLACEHOLDER, body)
}

pub struct ExternalEvaluator {
    command: String,
    args: Vec<String>,
    wrapper_template: String,
    max_runtime: Duration,
}

impl ExternalEvaluator {
    pub fn new(interpreter: &InterpreterConfig, external: &ExternalConfig) -> Self {
        Self {
            command: interpreter.command.clone(),
            args: interpreter.args.clone(),
            wrapper_template: interpreter.wrapper_template.clone(),
            max_runtime: external.max_runtime,
        }
    }

    pub fn with_max_runtime(mut self, max_runtime: Duration) -> Self {
        self.max_runtime = max_runtime;
        self
    }

    pub fn max_runtime(&self) -> Duration {
        self.max_runtime
    }

    /// Evaluate `body` once and return the raw result text for `mode`.
    pub async fn evaluate(&self, body: &str, mode: ResultMode) -> Result<String> {
        self.evaluate_within(body, mode, self.max_runtime).await
    }

    /// Like [`evaluate`](Self::evaluate) with an explicit wall-clock bound.
    pub async fn evaluate_within(
        &self,
        body: &str,
        mode: ResultMode,
        max_runtime: Duration,
    ) -> Result<String> {
        match mode {
            ResultMode::Output => self.run(body, max_runtime).await,
            ResultMode::Value => {
                let out_file = NamedTempFile::new()?;
                let path = out_file.path().to_string_lossy().into_owned();
                let program = fill_template(&self.wrapper_template, body, &path);
                self.run(&program, max_runtime).await?;
                let raw = tokio::fs::read_to_string(out_file.path()).await?;
                tracing::debug!("One-shot result: {} bytes from {}", raw.len(), path);
                Ok(raw)
            }
        }
    }

    /// Run `program` through the interpreter and return its stdout.
    pub async fn run(&self, program: &str, max_runtime: Duration) -> Result<String> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .env("TERM", "dumb")
            .env("NO_COLOR", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| BabelError::Spawn {
            command: self.command.clone(),
            message: e.to_string(),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let program = program.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(program.as_bytes()).await {
                    tracing::debug!("Interpreter stopped reading its program: {}", e);
                }
                drop(stdin);
            });
        }

        let mut child_stdout = child.stdout.take();
        let mut child_stderr = child.stderr.take();

        let outcome = tokio::time::timeout(max_runtime, async {
            let (stdout, stderr) = tokio::join!(
                read_all(child_stdout.as_mut()),
                read_all(child_stderr.as_mut())
            );
            let status = child.wait().await;
            (stdout, stderr, status)
        })
        .await;

        match outcome {
            Ok((stdout, stderr, status)) => {
                let status = status?;
                if status.success() {
                    Ok(stdout)
                } else {
                    tracing::debug!("'{}' exited with {:?}", self.command, status.code());
                    Err(BabelError::Process {
                        command: self.command.clone(),
                        code: status.code(),
                        stderr,
                    })
                }
            }
            Err(_) => {
                tracing::warn!(
                    "Wall-clock timeout ({:?}) for '{}'",
                    max_runtime,
                    self.command
                );
                if let Err(e) = child.kill().await {
                    tracing::debug!("Kill of '{}' failed: {}", self.command, e);
                }
                Err(BabelError::Timeout {
                    command: self.command.clone(),
                    after: max_runtime,
                })
            }
        }
    }
}

async fn read_all<R: tokio::io::AsyncRead + Unpin>(reader: Option<&mut R>) -> String {
    let mut bytes = Vec::new();
    if let Some(reader) = reader {
        if let Err(e) = reader.read_to_end(&mut bytes).await {
            tracing::debug!("Read from interpreter failed: {}", e);
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
