//! Persists every prompt/response pair for offline analysis, independent
//! of whether the response ultimately validated.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{EngineError, EngineResult};

#[derive(Serialize)]
struct LoggedResponse<'a> {
    timestamp: String,
    context: &'a str,
    provider: &'a str,
    model: &'a str,
    prompt: &'a str,
    response: &'a str,
    prompt_length: usize,
    response_length: usize,
}

pub async fn persist_response(
    dir: &Path,
    context: &str,
    provider: &str,
    model: &str,
    prompt: &str,
    response: &str,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> EngineResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await.map_err(EngineError::Io)?;

    let ts = timestamp.format("%Y%m%d_%H%M%S_%3f");
    let filename = format!("{ts}_{context}_{provider}.json");
    let path = dir.join(filename);

    let record = LoggedResponse {
        timestamp: timestamp.to_rfc3339(),
        context,
        provider,
        model,
        prompt,
        response,
        prompt_length: prompt.len(),
        response_length: response.len(),
    };
    let json = serde_json::to_string_pretty(&record)
        .map_err(|err| EngineError::Config(format!("failed to serialize log record: {err}")))?;
    tokio::fs::write(&path, json).await.map_err(EngineError::Io)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_a_record_with_expected_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = persist_response(
            dir.path(),
            "creation",
            "cloud",
            "gpt",
            "prompt text",
            "response text",
            chrono::Utc::now(),
        )
        .await
        .expect("persists");
        let contents = tokio::fs::read_to_string(&path).await.expect("read back");
        assert!(contents.contains("\"provider\": \"cloud\""));
        assert!(contents.contains("\"prompt_length\""));
    }
}
