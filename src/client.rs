//! HTTP client shared by every backend API.
//!
//! One [`Client`] talks to both the flow backend and the LangGraph-compatible
//! agent backend, which are served from the same base URL.

use std::time::Duration;

use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::agents::AssistantsApi;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::flows::{ExecutionsApi, FlowsApi};
use crate::threads::ThreadsApi;

/// Graph that custom agents are registered under.
pub const DEFAULT_GRAPH_ID: &str = "custom_agent";

/// Page size used when searching threads and assistants.
pub const DEFAULT_SEARCH_LIMIT: usize = 100;

/// HTTP client for the backend APIs.
///
/// # Example
///
/// ```rust,no_run
/// use agentflow::Client;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new("http://localhost:2024")?;
///
/// let page = client.flows().list(0, 12).await?;
/// for flow in page.flows {
///     println!("{} ({})", flow.name, flow.id);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
    graph_id: String,
    search_limit: usize,
    request_timeout: Option<Duration>,
}

impl Client {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The backend base URL (e.g., "http://localhost:2024")
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a new client with a custom reqwest client.
    pub fn with_client(base_url: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base(base_url.as_ref())?,
            http,
            graph_id: DEFAULT_GRAPH_ID.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            request_timeout: None,
        })
    }

    /// Build a client from loaded application configuration.
    ///
    /// The request timeout applies to JSON calls only; event streams stay
    /// open as long as the server keeps them open.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.api.request_timeout_secs);
        let http = reqwest::Client::builder().connect_timeout(timeout).build()?;
        let mut client = Self::with_client(&config.api.base_url, http)?;
        client.graph_id.clone_from(&config.assistants.graph_id);
        client.search_limit = config.threads.search_limit;
        client.request_timeout = Some(timeout);
        Ok(client)
    }

    /// Bound every non-streaming request by `timeout`.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Override the graph that assistants are searched and created under.
    #[must_use]
    pub fn with_graph_id(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = graph_id.into();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub(crate) fn search_limit(&self) -> usize {
        self.search_limit
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the Flows API.
    pub fn flows(&self) -> FlowsApi<'_> {
        FlowsApi::new(self)
    }

    /// Access the Executions API.
    pub fn executions(&self) -> ExecutionsApi<'_> {
        ExecutionsApi::new(self)
    }

    /// Access the Threads API.
    pub fn threads(&self) -> ThreadsApi<'_> {
        ThreadsApi::new(self)
    }

    /// Access the Assistants API.
    pub fn assistants(&self) -> AssistantsApi<'_> {
        AssistantsApi::new(self)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// A JSON request with the configured timeout applied.
    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let builder = self.http.request(method, self.url(path)?);
        Ok(match self.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        })
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path)?.send().await?;
        Self::handle_response(response).await
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, path)?.json(body).send().await?;
        Self::handle_response(response).await
    }

    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::POST, path)?.send().await?;
        Self::handle_response(response).await
    }

    pub(crate) async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::PATCH, path)?.json(body).send().await?;
        Self::handle_response(response).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::DELETE, path)?.send().await?;
        Self::handle_response(response).await
    }

    /// POST without a body, ignoring whatever the response carries.
    pub(crate) async fn post_unit(&self, path: &str) -> Result<()> {
        let response = self.request(Method::POST, path)?.send().await?;
        Self::check_status(response).await.map(drop)
    }

    /// Delete a resource whose response body carries nothing of interest.
    pub(crate) async fn delete_unit(&self, path: &str) -> Result<()> {
        let response = self.request(Method::DELETE, path)?.send().await?;
        Self::check_status(response).await.map(drop)
    }

    pub(crate) async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Turn a non-success status into [`Error::Api`] carrying the body text.
    pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Parse a base URL so that relative joins keep any path prefix.
fn normalize_base(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}
