//! Flow backend types and API clients.
//!
//! A *flow* is a named, parameterized job with a declared input schema. Each
//! invocation is an *execution* (the executions API) or a *run* (the run
//! history API); both carry a status, an opaque result payload and timing.
//!
//! # Outcome rule
//!
//! The backend reports success twice: once as a transport-level flag or
//! status, and optionally again as a `status` field inside the result
//! payload. [`Outcome::evaluate`] combines them: an outer failure always
//! wins, and an inner `status` other than `"success"` turns an outer success
//! into a failure.

mod api;

pub use api::{ExecutionsApi, FlowsApi};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::stream::ProgressStatus;

/// Logical result of a finished execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl Outcome {
    pub fn evaluate(transport_success: bool, payload: Option<&Value>) -> Self {
        if !transport_success {
            return Self::Failed;
        }
        match payload.and_then(|p| p.get("status")).and_then(Value::as_str) {
            Some(inner) if inner != "success" => Self::Failed,
            _ => Self::Succeeded,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

// =============================================================================
// Flows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedFlows {
    pub flows: Vec<FlowInfo>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Declared type of a flow parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ParameterSpec {
    /// Coerce a raw command-line value to this parameter's JSON type.
    pub fn coerce(&self, name: &str, raw: &str) -> Result<Value> {
        let invalid = |reason: String| Error::InvalidParameter {
            name: name.to_string(),
            reason,
        };
        match self.kind {
            ParameterType::String => Ok(Value::String(raw.to_string())),
            ParameterType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| invalid(e.to_string())),
            ParameterType::Number => raw
                .trim()
                .parse::<f64>()
                .map_err(|e| invalid(e.to_string()))
                .and_then(|n| {
                    serde_json::Number::from_f64(n)
                        .map(Value::Number)
                        .ok_or_else(|| invalid("not a finite number".to_string()))
                }),
            ParameterType::Boolean => raw
                .trim()
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|e| invalid(e.to_string())),
            ParameterType::Array | ParameterType::Object => {
                let value: Value =
                    serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
                let matches = match self.kind {
                    ParameterType::Array => value.is_array(),
                    _ => value.is_object(),
                };
                if matches {
                    Ok(value)
                } else {
                    Err(invalid(format!("expected {}", self.kind)))
                }
            }
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSchema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl FlowSchema {
    /// Build execution parameters from `name=value` pairs.
    ///
    /// Values are coerced to their declared types, declared defaults fill
    /// omitted parameters, and missing required parameters are rejected.
    pub fn parameters_from_pairs<'a, I>(&self, pairs: I) -> Result<Map<String, Value>>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = Map::new();
        for (name, raw) in pairs {
            let param = self.parameters.get(name).ok_or_else(|| Error::InvalidParameter {
                name: name.to_string(),
                reason: format!("flow `{}` declares no such parameter", self.name),
            })?;
            out.insert(name.to_string(), param.coerce(name, raw)?);
        }
        for (name, param) in &self.parameters {
            if out.contains_key(name) {
                continue;
            }
            if let Some(default) = &param.default {
                out.insert(name.clone(), default.clone());
            } else if param.required {
                return Err(Error::InvalidParameter {
                    name: name.clone(),
                    reason: "required parameter is missing".to_string(),
                });
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExecuteRequest<'a> {
    pub parameters: &'a Map<String, Value>,
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CompileRequest<'a> {
    pub code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_name: Option<&'a str>,
}

/// Result of a synchronous `execute` call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ExecutionResponse {
    pub fn outcome(&self) -> Outcome {
        Outcome::evaluate(self.success, self.data.as_ref())
    }

    /// Error text to display for a failed outcome.
    pub fn failure_message(&self) -> Option<String> {
        if self.outcome().is_success() {
            return None;
        }
        Some(self.error.clone().unwrap_or_else(|| "Unknown error".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationResponse {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub sanitized_parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompilationResponse {
    pub success: bool,
    #[serde(default)]
    pub flows: Vec<FlowInfo>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub compiled_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowCode {
    pub flow_name: String,
    pub source_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowExplanation {
    pub flow_name: String,
    pub explanation: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Runs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Display state of a run after applying the outcome rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunEventPayload {
    pub status: ProgressStatus,
    pub message: String,
}

/// A persisted progress event of a run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunEventRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: String,
    pub payload: RunEventPayload,
    #[serde(default)]
    pub sequence_order: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowRun {
    pub id: String,
    pub flow_id: String,
    pub status: RunStatus,
    pub created_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<f64>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub stream_events: Option<Vec<RunEventRecord>>,
}

impl FlowRun {
    pub fn outcome(&self) -> RunOutcome {
        match self.status {
            RunStatus::Running => RunOutcome::Running,
            RunStatus::Failed => RunOutcome::Failed,
            RunStatus::Completed => match Outcome::evaluate(true, self.result.as_ref()) {
                Outcome::Succeeded => RunOutcome::Succeeded,
                Outcome::Failed => RunOutcome::Failed,
            },
        }
    }

    /// The `summary` string of the result payload, when present.
    pub fn summary(&self) -> Option<&str> {
        self.result.as_ref()?.get("summary")?.as_str()
    }

    /// Stream events in sequence order.
    pub fn ordered_events(&self) -> Vec<&RunEventRecord> {
        let mut events: Vec<&RunEventRecord> =
            self.stream_events.iter().flatten().collect();
        events.sort_by_key(|e| e.sequence_order.unwrap_or(i64::MAX));
        events
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedFlowRuns {
    pub runs: Vec<FlowRun>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

// =============================================================================
// Executions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Status line shown while tracking an execution.
    pub fn message(self) -> &'static str {
        match self {
            Self::Pending => "Queuing execution...",
            Self::Running => "Executing flow...",
            Self::Completed => "Execution completed successfully!",
            Self::Failed => "Execution failed",
            Self::Cancelled => "Execution was cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One item processed by an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamItem {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub timestamp: String,
}

/// Server snapshot of one execution. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub flow_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<f64>,
    #[serde(default)]
    pub stream_items: Vec<StreamItem>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl Execution {
    /// Outcome of a terminal execution; `None` while it is still in flight.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.status {
            ExecutionStatus::Pending | ExecutionStatus::Running => None,
            ExecutionStatus::Completed => Some(Outcome::evaluate(true, self.result.as_ref())),
            ExecutionStatus::Failed | ExecutionStatus::Cancelled => Some(Outcome::Failed),
        }
    }
}

/// Lightweight status probe.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStatusResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedExecutions {
    pub executions: Vec<Execution>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outer_failure_always_wins() {
        assert_eq!(Outcome::evaluate(false, Some(&json!({"status": "success"}))), Outcome::Failed);
        assert_eq!(Outcome::evaluate(false, None), Outcome::Failed);
    }

    #[test]
    fn inner_status_overrides_outer_success() {
        assert_eq!(Outcome::evaluate(true, Some(&json!({"status": "partial"}))), Outcome::Failed);
        assert_eq!(Outcome::evaluate(true, Some(&json!({"status": "success"}))), Outcome::Succeeded);
        assert_eq!(Outcome::evaluate(true, Some(&json!({"rows": 2}))), Outcome::Succeeded);
        assert_eq!(Outcome::evaluate(true, Some(&json!("plain text"))), Outcome::Succeeded);
    }

    #[test]
    fn run_outcome_follows_status_then_payload() {
        let run: FlowRun = serde_json::from_value(json!({
            "id": "r1",
            "flow_id": "f1",
            "status": "COMPLETED",
            "created_at": "2025-01-01T00:00:00",
            "result": {"status": "failed", "summary": "2 of 3 sent"}
        }))
        .unwrap();
        assert_eq!(run.outcome(), RunOutcome::Failed);
        assert_eq!(run.summary(), Some("2 of 3 sent"));

        let running: FlowRun = serde_json::from_value(json!({
            "id": "r2", "flow_id": "f1", "status": "RUNNING", "created_at": "x"
        }))
        .unwrap();
        assert_eq!(running.outcome(), RunOutcome::Running);
    }

    #[test]
    fn run_events_sort_by_sequence() {
        let run: FlowRun = serde_json::from_value(json!({
            "id": "r1", "flow_id": "f1", "status": "RUNNING", "created_at": "x",
            "stream_events": [
                {"event_type": "stream", "payload": {"status": "success", "message": "b"}, "sequence_order": 2, "created_at": "x"},
                {"event_type": "stream", "payload": {"status": "failed", "message": "a"}, "sequence_order": 1, "created_at": "x"}
            ]
        }))
        .unwrap();
        let messages: Vec<_> = run.ordered_events().iter().map(|e| e.payload.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn cancelled_execution_is_a_failure() {
        let execution: Execution = serde_json::from_value(json!({
            "id": "e1", "flow_id": "f1", "status": "cancelled"
        }))
        .unwrap();
        assert_eq!(execution.outcome(), Some(Outcome::Failed));
    }

    fn schema() -> FlowSchema {
        serde_json::from_value(json!({
            "id": "f1",
            "name": "send_report",
            "description": "",
            "return_type": "dict",
            "parameters": {
                "recipient": {"type": "string", "required": true},
                "count": {"type": "integer", "default": 5},
                "dry_run": {"type": "boolean"},
                "tags": {"type": "array"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn builds_typed_parameters_with_defaults() {
        let params = schema()
            .parameters_from_pairs([("recipient", "ops"), ("dry_run", "true"), ("tags", "[\"a\"]")])
            .unwrap();
        assert_eq!(params["recipient"], json!("ops"));
        assert_eq!(params["count"], json!(5));
        assert_eq!(params["dry_run"], json!(true));
        assert_eq!(params["tags"], json!(["a"]));
    }

    #[test]
    fn rejects_missing_unknown_and_mistyped_parameters() {
        let schema = schema();
        assert!(matches!(
            schema.parameters_from_pairs([("count", "1")]),
            Err(Error::InvalidParameter { name, .. }) if name == "recipient"
        ));
        assert!(schema.parameters_from_pairs([("recipient", "a"), ("nope", "1")]).is_err());
        assert!(schema.parameters_from_pairs([("recipient", "a"), ("count", "1.5")]).is_err());
        assert!(schema.parameters_from_pairs([("recipient", "a"), ("tags", "{}")]).is_err());
    }
}
