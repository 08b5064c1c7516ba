//! Sub-call bridge
//!
//! Delivers one chunk + query pair to an external delegate and normalises
//! whatever comes back into a [`WaveResult`]. Every failure is soft: a
//! timeout, a disabled bridge, or a crashed delegate all come back as
//! `success = false` results rather than errors. Results that never reached
//! the delegate are marked undispatched so their timing is not fed back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

mod cli;

pub use cli::CliBridge;

/// Error text for a sub-call that exceeded its timeout
pub const TIMEOUT_ERROR: &str = "timeout";

/// Error text returned while sub-calls are disabled
pub const DISABLED_ERROR: &str = "disabled";

/// Keys a delegate may use to report how sure it is
const CONFIDENCE_KEYS: [&str; 4] = ["confidence", "certainty", "score", "probability"];

/// Keys a delegate may use for its answer
const PAYLOAD_KEYS: [&str; 3] = ["answer", "result", "text"];

/// Normalised outcome of one sub-call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveResult {
    pub chunk_id: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Opaque delegate-supplied score in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
    /// False when the delegate never ran, so `elapsed_ms` measures nothing
    #[serde(default = "default_dispatched")]
    pub dispatched: bool,
}

fn default_dispatched() -> bool {
    true
}

impl WaveResult {
    pub fn success(chunk_id: usize, payload: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            chunk_id,
            success: true,
            payload: Some(payload.into()),
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
            error: None,
            elapsed_ms: 0,
            dispatched: true,
        }
    }

    pub fn failure(chunk_id: usize, error: impl Into<String>) -> Self {
        Self {
            chunk_id,
            success: false,
            payload: None,
            confidence: None,
            error: Some(error.into()),
            elapsed_ms: 0,
            dispatched: true,
        }
    }

    /// Failure before the delegate started: disabled, missing, or unspawnable
    pub fn not_dispatched(chunk_id: usize, error: impl Into<String>) -> Self {
        Self {
            dispatched: false,
            ..Self::failure(chunk_id, error)
        }
    }

    /// Successful with confidence strictly above `threshold`
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.success && self.confidence.is_some_and(|c| c > threshold)
    }
}

/// One unit of delegated work
#[derive(Debug, Clone)]
pub struct SubcallRequest {
    pub chunk_id: usize,
    pub query: String,
    pub content: String,
    pub timeout: Duration,
}

/// Boundary between the engine and whatever answers sub-calls
#[async_trait]
pub trait SubcallBridge: Send + Sync {
    /// Run one sub-call. Never fails; problems become failed results.
    async fn call(&self, request: SubcallRequest) -> WaveResult;
}

/// Bridge used while sub-calls are switched off
pub struct DisabledBridge;

#[async_trait]
impl SubcallBridge for DisabledBridge {
    async fn call(&self, request: SubcallRequest) -> WaveResult {
        debug!(chunk_id = request.chunk_id, "DisabledBridge::call: sub-calls disabled");
        WaveResult::not_dispatched(request.chunk_id, DISABLED_ERROR)
    }
}

/// Delegate invocation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubcallConfig {
    /// Skip the delegate entirely and fail every sub-call
    pub disabled: bool,

    /// Executable that answers sub-calls
    #[serde(rename = "cli-path")]
    pub cli_path: String,

    /// Delegate identity passed as `{agent}`
    pub agent: String,

    /// Per sub-call timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Argument template; `{agent}`, `{description}` and `{prompt}` are substituted
    pub args: Vec<String>,
}

impl Default for SubcallConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            cli_path: "opencode".to_string(),
            agent: "rlm-subcall".to_string(),
            timeout_secs: 120,
            args: ["task", "--agent", "{agent}", "--description", "{description}", "--prompt", "{prompt}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SubcallConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Pick the bridge the config asks for
pub fn bridge_from_config(config: &SubcallConfig) -> Arc<dyn SubcallBridge> {
    debug!(disabled = config.disabled, cli_path = %config.cli_path, "bridge_from_config: called");
    if config.disabled {
        Arc::new(DisabledBridge)
    } else {
        Arc::new(CliBridge::from_config(config))
    }
}

/// Run a sub-call and stamp its wall-clock duration on the result
pub async fn call_timed(bridge: &dyn SubcallBridge, request: SubcallRequest) -> WaveResult {
    let started = Instant::now();
    let mut result = bridge.call(request).await;
    result.elapsed_ms = started.elapsed().as_millis() as u64;
    result
}

/// Extract payload and confidence from raw delegate output.
///
/// The first `{...}` span is parsed as JSON when possible; otherwise the
/// trimmed output is the payload and there is no confidence.
pub fn parse_delegate_output(output: &str) -> (String, Option<f64>) {
    let trimmed = output.trim();

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
        && let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
    {
        let confidence = CONFIDENCE_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_f64()))
            .map(|c| c.clamp(0.0, 1.0));

        let payload = PAYLOAD_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| serde_json::Value::Object(map.clone()).to_string());

        debug!(?confidence, "parse_delegate_output: parsed json");
        return (payload, confidence);
    }

    debug!("parse_delegate_output: no json object, using raw output");
    (trimmed.to_string(), None)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn request(chunk_id: usize) -> SubcallRequest {
        SubcallRequest {
            chunk_id,
            query: "find errors".to_string(),
            content: "chunk body".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_parse_json_output() {
        let (payload, confidence) =
            parse_delegate_output("Thinking...\n{\"answer\": \"three errors\", \"confidence\": 0.92}\ndone");
        assert_eq!(payload, "three errors");
        assert_eq!(confidence, Some(0.92));
    }

    #[test]
    fn test_parse_alternate_confidence_key() {
        let (_, confidence) = parse_delegate_output("{\"text\": \"x\", \"certainty\": 1.7}");
        assert_eq!(confidence, Some(1.0));
    }

    #[test]
    fn test_parse_json_without_known_payload_key() {
        let (payload, confidence) = parse_delegate_output("{\"findings\": [1, 2]}");
        assert!(payload.contains("findings"));
        assert_eq!(confidence, None);
    }

    #[test]
    fn test_parse_plain_text_output() {
        let (payload, confidence) = parse_delegate_output("  nothing relevant here \n");
        assert_eq!(payload, "nothing relevant here");
        assert_eq!(confidence, None);
    }

    #[test]
    fn test_parse_broken_json_falls_back() {
        let (payload, confidence) = parse_delegate_output("{not json}");
        assert_eq!(payload, "{not json}");
        assert_eq!(confidence, None);
    }

    #[test]
    fn test_is_confident_is_strict() {
        assert!(WaveResult::success(0, "a", Some(0.85)).is_confident(0.8));
        assert!(!WaveResult::success(0, "a", Some(0.8)).is_confident(0.8));
        assert!(!WaveResult::success(0, "a", None).is_confident(0.8));
        assert!(!WaveResult::failure(0, "x").is_confident(0.8));
    }

    #[tokio::test]
    async fn test_disabled_bridge() {
        let result = DisabledBridge.call(request(4)).await;
        assert!(!result.success);
        assert_eq!(result.chunk_id, 4);
        assert_eq!(result.error.as_deref(), Some(DISABLED_ERROR));
        assert!(!result.dispatched);
    }

    #[test]
    fn test_failures_after_dispatch_are_measured() {
        assert!(WaveResult::failure(1, TIMEOUT_ERROR).dispatched);
        assert!(WaveResult::success(1, "a", None).dispatched);
        assert!(!WaveResult::not_dispatched(1, "delegate not found at: x").dispatched);
    }

    #[tokio::test]
    async fn test_bridge_from_config_disabled() {
        let config = SubcallConfig {
            disabled: true,
            ..Default::default()
        };
        let bridge = bridge_from_config(&config);
        let result = call_timed(bridge.as_ref(), request(1)).await;
        assert_eq!(result.error.as_deref(), Some(DISABLED_ERROR));
    }

    #[test]
    fn test_wave_result_serde_skips_empty_fields() {
        let json = serde_json::to_string(&WaveResult::failure(2, "timeout")).unwrap();
        assert!(!json.contains("payload"));
        assert!(json.contains("\"error\":\"timeout\""));

        let back: WaveResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chunk_id, 2);

        let older: WaveResult = serde_json::from_str(r#"{"chunk_id":3,"success":false,"error":"timeout"}"#).unwrap();
        assert!(older.dispatched);
    }
}
