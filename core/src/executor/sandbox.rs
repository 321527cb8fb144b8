//! Runs an assembled script in an isolated subprocess with a wall-clock
//! deadline, parses its sentinel-prefixed stdout, and persists every
//! script that gets executed for later inspection or `load_previous`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{EngineError, EngineResult};
use crate::executor::script_builder::check_forbidden_selectors;
use crate::types::{BoundingBox, ExecutionResult, ExecutionStatus, Mesh};

const SUCCESS_SENTINEL: &str = "EXECUTION_SUCCESS";
const ERROR_SENTINEL_PREFIX: &str = "EXECUTION_ERROR:";

#[derive(Debug, Deserialize)]
struct SentinelPayload {
    bbox: BboxPayload,
    volume: f64,
    center_of_mass: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct BboxPayload {
    min: [f64; 3],
    max: [f64; 3],
}

pub struct Sandbox {
    pub interpreter: PathBuf,
    pub max_execution_time: Duration,
}

impl Sandbox {
    pub fn new(interpreter: impl Into<PathBuf>, max_execution_time: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            max_execution_time,
        }
    }

    /// Run `script` in a fresh subprocess, enforcing the configured
    /// wall-clock deadline with a SIGKILL on expiry.
    pub async fn run(&self, script: &str) -> EngineResult<ExecutionResult> {
        if let Err(err) = check_forbidden_selectors(script) {
            return Ok(execution_error_result(script, err, Duration::ZERO));
        }

        let script_file = tempfile::NamedTempFile::new().map_err(EngineError::Io)?;
        tokio::fs::write(script_file.path(), script)
            .await
            .map_err(EngineError::Io)?;

        let mut child = Command::new(&self.interpreter)
            .arg(script_file.path())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Io)?;

        let start = std::time::Instant::now();
        let mut stdout = child.stdout.take().ok_or(EngineError::ExecMissingResult)?;
        let mut stderr = child.stderr.take().ok_or(EngineError::ExecMissingResult)?;

        let wait = async {
            let mut out = String::new();
            let mut err = String::new();
            let _ = stdout.read_to_string(&mut out).await;
            let _ = stderr.read_to_string(&mut err).await;
            let status = child.wait().await;
            (out, err, status)
        };

        match timeout(self.max_execution_time, wait).await {
            Ok((stdout, stderr, status)) => {
                let elapsed = start.elapsed();
                if status.is_err() {
                    return Ok(execution_error_result(
                        script,
                        EngineError::ExecFailure {
                            msg: "subprocess could not be awaited".into(),
                            traceback: stderr,
                        },
                        elapsed,
                    ));
                }
                Ok(parse_sentinel_output(script, &stdout, &stderr, elapsed))
            }
            Err(_) => {
                // child is killed on drop via `kill_on_drop`.
                Ok(ExecutionResult {
                    status: ExecutionStatus::Timeout,
                    elapsed: self.max_execution_time,
                    script: script.to_string(),
                    mesh: None,
                    bbox: None,
                    volume: None,
                    center_of_mass: None,
                    error: Some(format!(
                        "execution exceeded {:?}",
                        self.max_execution_time
                    )),
                    traceback: None,
                })
            }
        }
    }
}

fn parse_sentinel_output(
    script: &str,
    stdout: &str,
    stderr: &str,
    elapsed: Duration,
) -> ExecutionResult {
    if let Some(idx) = stdout.find(SUCCESS_SENTINEL) {
        let after = &stdout[idx + SUCCESS_SENTINEL.len()..];
        let payload_text = after.trim_start();
        match serde_json::from_str::<SentinelPayload>(payload_text) {
            Ok(payload) => {
                return ExecutionResult {
                    status: ExecutionStatus::Success,
                    elapsed,
                    script: script.to_string(),
                    mesh: Some(Mesh::default()),
                    bbox: Some(BoundingBox {
                        min: payload.bbox.min,
                        max: payload.bbox.max,
                    }),
                    volume: Some(payload.volume),
                    center_of_mass: Some(payload.center_of_mass),
                    error: None,
                    traceback: None,
                };
            }
            Err(err) => {
                return execution_error_result(
                    script,
                    EngineError::ExecFailure {
                        msg: format!("malformed success payload: {err}"),
                        traceback: stderr.to_string(),
                    },
                    elapsed,
                );
            }
        }
    }

    if let Some(idx) = stdout.find(ERROR_SENTINEL_PREFIX) {
        let msg = stdout[idx + ERROR_SENTINEL_PREFIX.len()..]
            .lines()
            .next()
            .unwrap_or("unknown error")
            .to_string();
        return execution_error_result(
            script,
            EngineError::ExecFailure {
                msg,
                traceback: stderr.to_string(),
            },
            elapsed,
        );
    }

    execution_error_result(script, EngineError::ExecMissingResult, elapsed)
}

fn execution_error_result(script: &str, err: EngineError, elapsed: Duration) -> ExecutionResult {
    let (msg, traceback) = match err {
        EngineError::ExecFailure { msg, traceback } => (msg, traceback),
        other => (other.to_string(), String::new()),
    };
    ExecutionResult {
        status: ExecutionStatus::Error,
        elapsed,
        script: script.to_string(),
        mesh: None,
        bbox: None,
        volume: None,
        center_of_mass: None,
        error: Some(msg),
        traceback: Some(traceback),
    }
}

/// Persist a generated script to `<dir>/<ts>_<context>_<session8>_<plan8>.py`
/// with a metadata header, returning the path written.
pub async fn persist_script(
    dir: &Path,
    context: &str,
    session_id: &str,
    plan_id: &str,
    script: &str,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> EngineResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await.map_err(EngineError::Io)?;

    let ts = timestamp.format("%Y%m%d_%H%M%S_%3f");
    let session8 = short_id(session_id);
    let plan8 = short_id(plan_id);
    let filename = format!("{ts}_{context}_{session8}_{plan8}.py");
    let path = dir.join(filename);

    let header = format!(
        "# Timestamp: {}\n# Session ID: {session_id}\n# Plan ID: {plan_id}\n# Context: {context}\n\n",
        timestamp.to_rfc3339()
    );
    tokio::fs::write(&path, format!("{header}{script}"))
        .await
        .map_err(EngineError::Io)?;
    Ok(path)
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_sentinel() {
        let stdout = "EXECUTION_SUCCESS\n{\"bbox\":{\"min\":[0,0,0],\"max\":[1,1,1]},\"volume\":1.0,\"center_of_mass\":[0.5,0.5,0.5]}\n";
        let result = parse_sentinel_output("result = 1", stdout, "", Duration::from_millis(5));
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.volume, Some(1.0));
    }

    #[test]
    fn parses_error_sentinel() {
        let stdout = "EXECUTION_ERROR:boom\n";
        let result = parse_sentinel_output("result = 1", stdout, "traceback here", Duration::from_millis(5));
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn missing_sentinel_is_an_error() {
        let result = parse_sentinel_output("result = 1", "nothing useful", "", Duration::from_millis(5));
        assert_eq!(result.status, ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn persist_script_writes_header_and_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ts = chrono::Utc::now();
        let path = persist_script(
            dir.path(),
            "creation",
            "session1234",
            "plan5678",
            "result = 1",
            ts,
        )
        .await
        .expect("persists");
        let contents = tokio::fs::read_to_string(&path).await.expect("read back");
        assert!(contents.contains("# Session ID: session1234"));
        assert!(contents.contains("result = 1"));
    }
}
