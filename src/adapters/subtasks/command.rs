//! External-process sub-task adapter.
//!
//! The configured program receives one JSON request on stdin:
//!
//! ```json
//! {"step": "research", "document": {...}, "ambiguities": [...], "findings": [...]}
//! ```
//!
//! and answers with `SubtaskResult` JSON on stdout. Analyze and integrate
//! print a single result. Research may print one result per line; each line
//! is delivered to the orchestrator as soon as it is read, so findings
//! survive a later timeout.

use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AmbiguityItem, CommandConfig, FindingItem, SpecDocument, SubtaskResult, SubtaskStep};
use crate::domain::ports::{Analyzer, FindingSink, Integrator, Researcher};

/// Bytes of stderr kept in error messages.
const STDERR_TAIL: usize = 2048;

#[derive(Debug, Clone)]
pub struct CommandSubtask {
    name: String,
    config: CommandConfig,
}

impl CommandSubtask {
    pub fn new(config: CommandConfig) -> Self {
        let name = std::path::Path::new(&config.program)
            .file_name()
            .map_or_else(|| config.program.clone(), |n| n.to_string_lossy().into_owned());
        Self { name, config }
    }

    fn spawn(&self, step: SubtaskStep, document_id: &str) -> DomainResult<Child> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        cmd.env("SPEC_REFINE_STEP", step.as_str());
        cmd.env("SPEC_REFINE_DOCUMENT", document_id);

        cmd.spawn()
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to spawn {}: {e}", self.config.program)))
    }

    /// Write the request and close stdin without blocking on the child.
    fn send_request(child: &mut Child, request: serde_json::Value) -> DomainResult<()> {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DomainError::ValidationFailed("Failed to capture stdin".to_string()))?;
        let payload = serde_json::to_vec(&request)?;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "sub-task closed stdin early");
            }
        });
        Ok(())
    }

    /// Run the program and parse its single result.
    async fn run_once(&self, step: SubtaskStep, document_id: &str, request: serde_json::Value) -> DomainResult<SubtaskResult> {
        let mut child = self.spawn(step, document_id)?;
        Self::send_request(&mut child, request)?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to wait for {}: {e}", self.name)))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(self.exit_error(output.status, &stderr));
        }
        if !stderr.trim().is_empty() {
            debug!(subtask = %self.name, step = %step, stderr = %tail(&stderr), "sub-task stderr");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).map_err(|e| {
            DomainError::SerializationError(format!("{} returned an invalid {step} result: {e}", self.name))
        })
    }

    fn exit_error(&self, status: std::process::ExitStatus, stderr: &str) -> DomainError {
        let detail = tail(stderr);
        if detail.is_empty() {
            DomainError::ValidationFailed(format!("{} exited with {status}", self.name))
        } else {
            DomainError::ValidationFailed(format!("{} exited with {status}: {detail}", self.name))
        }
    }
}

fn tail(text: &str) -> &str {
    let text = text.trim();
    let mut start = text.len().saturating_sub(STDERR_TAIL);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[async_trait]
impl Analyzer for CommandSubtask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, snapshot: Arc<SpecDocument>) -> DomainResult<Vec<AmbiguityItem>> {
        let request = json!({ "step": SubtaskStep::Analyze, "document": &*snapshot });
        self.run_once(SubtaskStep::Analyze, &snapshot.id, request)
            .await?
            .into_ambiguities()
    }
}

#[async_trait]
impl Integrator for CommandSubtask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn integrate(&self, findings: Vec<FindingItem>, snapshot: Arc<SpecDocument>) -> DomainResult<SpecDocument> {
        let request = json!({ "step": SubtaskStep::Integrate, "document": &*snapshot, "findings": findings });
        self.run_once(SubtaskStep::Integrate, &snapshot.id, request)
            .await?
            .into_document()
    }
}

#[async_trait]
impl Researcher for CommandSubtask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn research(
        &self,
        ambiguities: Vec<AmbiguityItem>,
        snapshot: Arc<SpecDocument>,
        sink: FindingSink,
        cancel: CancellationToken,
    ) -> DomainResult<()> {
        let step = SubtaskStep::Research;
        let mut child = self.spawn(step, &snapshot.id)?;
        let request = json!({ "step": step, "document": &*snapshot, "ambiguities": ambiguities });
        Self::send_request(&mut child, request)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomainError::ValidationFailed("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DomainError::ValidationFailed("Failed to capture stderr".to_string()))?;
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut delivered = 0_usize;
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!(subtask = %self.name, error = %e, "failed to kill research process");
                    }
                    return Err(DomainError::Cancelled(step));
                }
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => return Err(DomainError::ValidationFailed(format!("Failed to read {} output: {e}", self.name))),
            };
            if line.trim().is_empty() {
                continue;
            }

            let result: SubtaskResult = serde_json::from_str(&line).map_err(|e| {
                DomainError::SerializationError(format!("{} returned an invalid research line: {e}", self.name))
            })?;
            for finding in result.into_findings()? {
                sink.deliver(finding)?;
                delivered += 1;
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to wait for {}: {e}", self.name)))?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(self.exit_error(status, &stderr));
        }
        debug!(subtask = %self.name, delivered, "research process finished");
        Ok(())
    }
}
