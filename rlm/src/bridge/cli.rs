//! Delegate bridge backed by a spawned CLI process

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{SubcallBridge, SubcallConfig, SubcallRequest, TIMEOUT_ERROR, WaveResult, parse_delegate_output};

/// Runs `<cli_path> <args...>` once per sub-call
pub struct CliBridge {
    cli_path: String,
    agent: String,
    args: Vec<String>,
}

impl CliBridge {
    pub fn from_config(config: &SubcallConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            agent: config.agent.clone(),
            args: config.args.clone(),
        }
    }

    fn build_args(&self, request: &SubcallRequest) -> Vec<String> {
        let description = format!("RLM chunk {} analysis", request.chunk_id);
        let prompt = build_prompt(&request.query, &request.content);
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{agent}", &self.agent)
                    .replace("{description}", &description)
                    .replace("{prompt}", &prompt)
            })
            .collect()
    }
}

fn build_prompt(query: &str, content: &str) -> String {
    if content.is_empty() {
        query.to_string()
    } else {
        format!("{}\n\n--- chunk ---\n{}", query, content)
    }
}

#[async_trait]
impl SubcallBridge for CliBridge {
    async fn call(&self, request: SubcallRequest) -> WaveResult {
        let chunk_id = request.chunk_id;
        debug!(chunk_id, cli_path = %self.cli_path, timeout = ?request.timeout, "CliBridge::call: called");

        let output = match tokio::time::timeout(
            request.timeout,
            tokio::process::Command::new(&self.cli_path)
                .args(self.build_args(&request))
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => {
                debug!(chunk_id, status = ?output.status, "CliBridge::call: delegate completed");
                output
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(chunk_id, cli_path = %self.cli_path, "Delegate executable not found");
                return WaveResult::not_dispatched(chunk_id, format!("delegate not found at: {}", self.cli_path));
            }
            Ok(Err(e)) => {
                warn!(chunk_id, error = %e, "Failed to spawn delegate");
                return WaveResult::not_dispatched(chunk_id, format!("failed to run delegate: {}", e));
            }
            Err(_) => {
                warn!(chunk_id, timeout = ?request.timeout, "Sub-call timed out");
                return WaveResult::failure(chunk_id, TIMEOUT_ERROR);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(chunk_id, exit_code = ?output.status.code(), "CliBridge::call: delegate failed");
            return WaveResult::failure(
                chunk_id,
                format!(
                    "delegate exited with status {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (payload, confidence) = parse_delegate_output(&stdout);
        WaveResult::success(chunk_id, payload, confidence)
    }
}
