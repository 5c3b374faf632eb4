use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{
    CompilationResponse, CompileRequest, DeleteResponse, Execution, ExecuteRequest,
    ExecutionResponse, ExecutionStatus, ExecutionStatusResponse, FlowCode, FlowExplanation,
    FlowRun, FlowSchema, PaginatedExecutions, PaginatedFlowRuns, PaginatedFlows,
    ValidationResponse,
};
use crate::client::Client;
use crate::error::Result;
use crate::stream::{FlowEventStream, FlowExecutionArtifact, failed_flow_stream, open_flow_stream};

// =============================================================================
// Flows API
// =============================================================================

/// Flows API client.
#[derive(Debug)]
pub struct FlowsApi<'a> {
    client: &'a Client,
}

impl<'a> FlowsApi<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Compile flow source code on the backend.
    pub async fn compile(&self, code: &str, flow_name: Option<&str>) -> Result<CompilationResponse> {
        self.client
            .post("/flows/compile", &CompileRequest { code, flow_name })
            .await
    }

    /// List flows, one page at a time.
    pub async fn list(&self, offset: u64, limit: u64) -> Result<PaginatedFlows> {
        self.client
            .get(&format!("/flows/?offset={offset}&limit={limit}"))
            .await
    }

    /// Get the parameter schema of a flow.
    pub async fn schema(&self, flow_id: &str) -> Result<FlowSchema> {
        self.client.get(&format!("/flows/{flow_id}/schema")).await
    }

    /// Validate parameters without executing.
    pub async fn validate(
        &self,
        flow_id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<ValidationResponse> {
        self.client
            .post(&format!("/flows/{flow_id}/validate"), parameters)
            .await
    }

    /// Execute a flow and wait for its result.
    #[instrument(skip(self, parameters))]
    pub async fn execute(
        &self,
        flow_id: &str,
        parameters: &Map<String, Value>,
        timeout_secs: u64,
    ) -> Result<ExecutionResponse> {
        let body = ExecuteRequest {
            parameters,
            timeout: timeout_secs,
            run_id: None,
        };
        let response: ExecutionResponse = self
            .client
            .post(&format!("/flows/{flow_id}/execute"), &body)
            .await?;
        debug!(success = response.success, "Flow executed");
        Ok(response)
    }

    /// Execute a flow and stream its progress events.
    ///
    /// Never fails: transport problems arrive as a final failed event pair.
    pub fn execute_stream(
        &self,
        flow_id: &str,
        parameters: &Map<String, Value>,
        timeout_secs: u64,
        run_id: Option<&str>,
    ) -> FlowEventStream {
        let url = match self.client.url(&format!("/flows/{flow_id}/execute-stream")) {
            Ok(url) => url,
            Err(err) => return failed_flow_stream(err.to_string()),
        };
        let body = ExecuteRequest {
            parameters,
            timeout: timeout_secs,
            run_id,
        };
        open_flow_stream(self.client.http().post(url).json(&body))
    }

    /// Run the flow an agent asked for, reusing the agent's `run_id`.
    pub fn execute_artifact(
        &self,
        artifact: &FlowExecutionArtifact,
        timeout_secs: u64,
    ) -> FlowEventStream {
        self.execute_stream(
            &artifact.flow_id,
            &artifact.parameters,
            timeout_secs,
            Some(&artifact.run_id),
        )
    }

    /// Run history of a flow.
    pub async fn runs(&self, flow_id: &str, page: u32, limit: u32) -> Result<PaginatedFlowRuns> {
        self.client
            .get(&format!("/flows/{flow_id}/runs?page={page}&limit={limit}"))
            .await
    }

    /// Details of one run, including its stored stream events.
    pub async fn run(&self, run_id: &str) -> Result<FlowRun> {
        self.client.get(&format!("/flows/runs/{run_id}")).await
    }

    /// Execution history of a flow.
    pub async fn executions(
        &self,
        flow_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<PaginatedExecutions> {
        self.client
            .get(&format!("/flows/{flow_id}/executions?page={page}&limit={limit}"))
            .await
    }

    /// Delete one flow.
    pub async fn delete(&self, flow_id: &str) -> Result<DeleteResponse> {
        self.client.delete(&format!("/flows/{flow_id}")).await
    }

    /// Delete every flow.
    pub async fn clear(&self) -> Result<DeleteResponse> {
        self.client.delete("/flows/").await
    }

    /// Source code of a flow.
    pub async fn code(&self, flow_id: &str) -> Result<FlowCode> {
        self.client.get(&format!("/flows/{flow_id}/code")).await
    }

    /// Generated explanation of a flow.
    pub async fn explanation(&self, flow_id: &str) -> Result<FlowExplanation> {
        self.client.get(&format!("/flows/{flow_id}/explanation")).await
    }

    /// Ask the backend to regenerate a flow's explanation.
    pub async fn regenerate_explanation(&self, flow_id: &str) -> Result<FlowExplanation> {
        self.client
            .post_empty(&format!("/flows/{flow_id}/regenerate-explanation"))
            .await
    }
}

// =============================================================================
// Executions API
// =============================================================================

/// Executions API client.
#[derive(Debug)]
pub struct ExecutionsApi<'a> {
    client: &'a Client,
}

impl<'a> ExecutionsApi<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// List executions across all flows, optionally filtered by status.
    pub async fn list(
        &self,
        page: u32,
        limit: u32,
        status: Option<ExecutionStatus>,
    ) -> Result<PaginatedExecutions> {
        let mut path = format!("/executions?page={page}&limit={limit}");
        if let Some(status) = status {
            path.push_str("&status=");
            path.push_str(status.as_str());
        }
        self.client.get(&path).await
    }

    /// Full execution record.
    pub async fn get(&self, execution_id: &str) -> Result<Execution> {
        self.client.get(&format!("/executions/{execution_id}")).await
    }

    /// Lightweight status probe.
    pub async fn status(&self, execution_id: &str) -> Result<ExecutionStatusResponse> {
        self.client
            .get(&format!("/executions/{execution_id}/status"))
            .await
    }

    /// Ask the backend to cancel a running execution.
    pub async fn cancel(&self, execution_id: &str) -> Result<()> {
        self.client
            .post_unit(&format!("/executions/{execution_id}/cancel"))
            .await
    }

    /// Delete an execution record.
    pub async fn delete(&self, execution_id: &str) -> Result<()> {
        self.client
            .delete_unit(&format!("/executions/{execution_id}"))
            .await
    }
}
