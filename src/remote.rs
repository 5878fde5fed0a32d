//! HTTP binding of [`PromptBackend`].
//!
//! Requests are built as [`http::Request`]s and handed to a caller-supplied
//! [`Transport`]; the crate itself never opens a connection. Every request
//! carries `Authorization: Bearer <token>` when the [`TokenSource`] has one.

use crate::backend::{
    CreatedPrompt, ExecuteResponse, NewVersionBody, PromptBackend, VersionPatchBody,
};
use crate::error::{PromptError, Result};
use crate::execution::ExecutionRequest;
use crate::provider::Provider;
use crate::version::{PromptId, PromptMeta, PromptRecord, VersionId};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Environment variable read by [`EnvToken`]
pub const TOKEN_ENV: &str = "PROMPTVAULT_TOKEN";

/// Sends one request and returns the response
pub trait Transport: Send + Sync {
    fn send(&self, request: Request<Vec<u8>>) -> anyhow::Result<Response<Vec<u8>>>;
}

impl<F> Transport for F
where
    F: Fn(Request<Vec<u8>>) -> anyhow::Result<Response<Vec<u8>>> + Send + Sync,
{
    fn send(&self, request: Request<Vec<u8>>) -> anyhow::Result<Response<Vec<u8>>> {
        self(request)
    }
}

/// Supplies the bearer token issued by the identity provider
pub trait TokenSource: Send + Sync {
    fn token(&self) -> anyhow::Result<Option<String>>;
}

/// A fixed token, or none
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenSource for StaticToken {
    fn token(&self) -> anyhow::Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every request
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(TOKEN_ENV)
    }
}

impl TokenSource for EnvToken {
    fn token(&self) -> anyhow::Result<Option<String>> {
        Ok(std::env::var(&self.var).ok().filter(|t| !t.is_empty()))
    }
}

/// The service's REST endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Prompts,
    Prompt(PromptId),
    Versions(PromptId),
    Version(PromptId, VersionId),
    SetActive(PromptId, VersionId),
    Providers,
    Execute,
}

impl Endpoint {
    pub fn path(&self) -> String {
        match self {
            Endpoint::Prompts => "/prompts/".to_string(),
            Endpoint::Prompt(id) => format!("/prompts/{id}"),
            Endpoint::Versions(id) => format!("/prompts/{id}/versions"),
            Endpoint::Version(id, version) => format!("/prompts/{id}/versions/{version}"),
            Endpoint::SetActive(id, version) => {
                format!("/prompts/{id}/versions/{version}/set-active")
            }
            Endpoint::Providers => "/providers/".to_string(),
            Endpoint::Execute => "/execute/".to_string(),
        }
    }
}

/// [`PromptBackend`] over HTTP
pub struct HttpBackend<T: Transport> {
    base_url: String,
    transport: T,
    tokens: Box<dyn TokenSource>,
}

impl<T: Transport> HttpBackend<T> {
    pub fn new(base_url: impl Into<String>, transport: T) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            tokens: Box::new(EnvToken::default()),
        }
    }

    pub fn with_tokens(mut self, tokens: impl TokenSource + 'static) -> Self {
        self.tokens = Box::new(tokens);
        self
    }

    /// Build the request for an endpoint, attaching auth and JSON headers
    pub fn request(
        &self,
        method: Method,
        endpoint: Endpoint,
        body: Option<Vec<u8>>,
    ) -> Result<Request<Vec<u8>>> {
        let uri = format!("{}{}", self.base_url, endpoint.path());
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACCEPT, "application/json");

        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(token) = self.tokens.token()? {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        Ok(builder.body(body.unwrap_or_default())?)
    }

    fn call(&self, method: Method, endpoint: Endpoint, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let request = self.request(method, endpoint, body)?;
        debug!("{} {}", request.method(), request.uri());

        let response = self.transport.send(request)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.into_body());
        }

        let message = error_message(response.body())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        warn!("{} failed with {}: {}", endpoint.path(), status, message);
        Err(PromptError::Remote {
            status: Some(status.as_u16()),
            message,
        })
    }

    fn call_json<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: Endpoint,
        body: Option<&B>,
    ) -> Result<R> {
        let body = body.map(serde_json::to_vec).transpose()?;
        let bytes = self.call(method, endpoint, body)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn call_empty<B: Serialize>(
        &self,
        method: Method,
        endpoint: Endpoint,
        body: Option<&B>,
    ) -> Result<()> {
        let body = body.map(serde_json::to_vec).transpose()?;
        self.call(method, endpoint, body).map(|_| ())
    }
}

/// Pull a readable message out of an error body: `detail` field, then raw text
fn error_message(body: &[u8]) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(detail) = value.get("detail") {
            return Some(match detail {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            });
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    (!text.is_empty()).then_some(text)
}

impl<T: Transport> PromptBackend for HttpBackend<T> {
    fn fetch_prompt(&self, prompt_id: PromptId) -> Result<PromptRecord> {
        self.call_json::<(), _>(Method::GET, Endpoint::Prompt(prompt_id), None)
    }

    fn create_prompt(&self, meta: &PromptMeta) -> Result<PromptId> {
        let created: CreatedPrompt = self.call_json(Method::POST, Endpoint::Prompts, Some(meta))?;
        Ok(created.id)
    }

    fn update_prompt(&self, prompt_id: PromptId, meta: &PromptMeta) -> Result<()> {
        self.call_empty(Method::PATCH, Endpoint::Prompt(prompt_id), Some(meta))
    }

    fn create_version(&self, prompt_id: PromptId, body: &NewVersionBody) -> Result<()> {
        self.call_empty(Method::POST, Endpoint::Versions(prompt_id), Some(body))
    }

    fn update_version(
        &self,
        prompt_id: PromptId,
        version_id: VersionId,
        body: &VersionPatchBody,
    ) -> Result<()> {
        self.call_empty(
            Method::PATCH,
            Endpoint::Version(prompt_id, version_id),
            Some(body),
        )
    }

    fn set_active_version(&self, prompt_id: PromptId, version_id: VersionId) -> Result<()> {
        self.call_empty::<()>(
            Method::POST,
            Endpoint::SetActive(prompt_id, version_id),
            None,
        )
    }

    fn delete_version(&self, prompt_id: PromptId, version_id: VersionId) -> Result<()> {
        self.call_empty::<()>(
            Method::DELETE,
            Endpoint::Version(prompt_id, version_id),
            None,
        )
    }

    fn list_providers(&self) -> Result<Vec<Provider>> {
        self.call_json::<(), _>(Method::GET, Endpoint::Providers, None)
    }

    fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        let response: ExecuteResponse =
            self.call_json(Method::POST, Endpoint::Execute, Some(request))?;
        Ok(response.response)
    }
}
