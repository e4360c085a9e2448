//! HTTP client for the Cloud Code Assist `v1internal` API.

use assistgate_auth::CredentialManager;
use assistgate_config::UpstreamConfig;
use assistgate_types::{ByteStream, GatewayError, error::Result};
use bytes::Bytes;
use futures_util::StreamExt as _;
use serde_json::Value;
use std::{fmt, str::FromStr, sync::Arc};

/// Upstream RPCs under `/v1internal:{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GenerateContent,
    StreamGenerateContent,
    CountTokens,
    LoadCodeAssist,
    OnboardUser,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GenerateContent => "generateContent",
            Self::StreamGenerateContent => "streamGenerateContent",
            Self::CountTokens => "countTokens",
            Self::LoadCodeAssist => "loadCodeAssist",
            Self::OnboardUser => "onboardUser",
        }
    }

    #[must_use]
    pub fn is_streaming(self) -> bool {
        self == Self::StreamGenerateContent
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the client-facing actions of `/v1beta/models/{model}:{action}`.
impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generateContent" => Ok(Self::GenerateContent),
            "streamGenerateContent" => Ok(Self::StreamGenerateContent),
            "countTokens" => Ok(Self::CountTokens),
            other => Err(GatewayError::Translation(format!("unsupported action '{other}'"))),
        }
    }
}

/// Sends enveloped requests upstream with managed credentials.
///
/// A 401 earns exactly one refresh-and-resend, unless the caller supplied
/// its own authorization.
pub struct CodeAssistClient {
    http: rquest::Client,
    base_url: String,
    user_agent: String,
    manager: Arc<CredentialManager>,
}

impl CodeAssistClient {
    pub fn new(http: rquest::Client, upstream: &UpstreamConfig, manager: Arc<CredentialManager>) -> Self {
        Self {
            http,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            user_agent: upstream.user_agent.clone(),
            manager,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<CredentialManager> {
        &self.manager
    }

    /// `{base}/v1internal:{action}`, with `alt=sse` for streaming and any
    /// extra client query appended.
    #[must_use]
    pub fn url(&self, action: Action, query: Option<&str>) -> String {
        let mut params: Vec<&str> = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter(|p| !p.is_empty() && !p.starts_with("key="))
            .collect();
        if action.is_streaming() && !params.iter().any(|p| p.starts_with("alt=")) {
            params.insert(0, "alt=sse");
        }
        let mut url = format!("{}/v1internal:{action}", self.base_url);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    fn build(&self, url: &str, body: Bytes, stream: bool) -> rquest::RequestBuilder {
        self.http
            .post(url)
            .header("content-type", "application/json")
            .header("user-agent", &self.user_agent)
            .header("accept", if stream { "text/event-stream" } else { "application/json" })
            .body(body)
    }

    /// Send `body` to `action` and return the successful response.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Upstream`] carries any non-2xx status and body
    /// verbatim (including a 401 whose refresh failed);
    /// [`GatewayError::Http`] reports transport failures.
    pub async fn send(
        &self,
        action: Action,
        query: Option<&str>,
        body: Bytes,
        caller_auth: Option<&str>,
    ) -> Result<rquest::Response> {
        let url = self.url(action, query);
        let stream = action.is_streaming();
        let request = self
            .manager
            .with_auth(self.build(&url, body.clone(), stream), caller_auth)?;
        tracing::debug!(%url, "upstream request");
        let resp = request.send().await?;

        let resp = if resp.status() == rquest::StatusCode::UNAUTHORIZED && caller_auth.is_none() {
            let original = upstream_error(resp).await;
            match self.manager.handle_unauthorized(body).await {
                Ok(retry) => {
                    self.build(&url, retry.body, stream)
                        .header("authorization", retry.credential.authorization())
                        .send()
                        .await?
                }
                Err(_) => return Err(original),
            }
        } else {
            resp
        };

        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(upstream_error(resp).await)
        }
    }

    /// Send a JSON body and parse a JSON reply.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]; an unparseable reply is [`GatewayError::Http`].
    pub async fn send_json(
        &self,
        action: Action,
        body: &Value,
        caller_auth: Option<&str>,
    ) -> Result<Value> {
        let bytes = Bytes::from(serde_json::to_vec(body)?);
        let resp = self.send(action, None, bytes, caller_auth).await?;
        resp.json()
            .await
            .map_err(|e| GatewayError::Http(format!("invalid upstream reply: {e}")))
    }

    /// Open a streaming call and return its raw byte stream.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn open_stream(
        &self,
        query: Option<&str>,
        body: &Value,
        caller_auth: Option<&str>,
    ) -> Result<ByteStream> {
        let bytes = Bytes::from(serde_json::to_vec(body)?);
        let resp = self
            .send(Action::StreamGenerateContent, query, bytes, caller_auth)
            .await?;
        Ok(byte_stream(resp))
    }
}

async fn upstream_error(resp: rquest::Response) -> GatewayError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!(status, "upstream error reply");
    GatewayError::Upstream { status, body }
}

/// Converts an `rquest::Response` into a `ByteStream`.
#[must_use]
pub fn byte_stream(resp: rquest::Response) -> ByteStream {
    Box::pin(resp.bytes_stream().map(|r| r.map_err(GatewayError::from)))
}
