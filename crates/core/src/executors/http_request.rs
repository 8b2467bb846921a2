use super::{ExecutionContext, Executor};
use crate::types::{ExecutionResult, NodeType, OutputData};
use anyhow::{Context, Result};
use reqwest::{Method, Url};
use serde::Deserialize;
use std::time::Duration;

/// Client settings for outbound node requests
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("nodeflow/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Node configuration stored in `Node::data`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequestConfig {
    endpoint: Option<String>,
    method: Option<String>,
    body: Option<serde_json::Value>,
    variable_name: Option<String>,
}

const DEFAULT_VARIABLE: &str = "httpResponse";

/// Performs one outbound HTTP call per invocation
pub struct HttpRequestExecutor {
    client: reqwest::Client,
}

impl HttpRequestExecutor {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent)
            .timeout(settings.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Use a preconfigured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn parse_method(raw: Option<&str>) -> Option<Method> {
        match raw.map(|m| m.to_ascii_uppercase()).as_deref() {
            None | Some("GET") => Some(Method::GET),
            Some("POST") => Some(Method::POST),
            Some("PUT") => Some(Method::PUT),
            Some("PATCH") => Some(Method::PATCH),
            Some("DELETE") => Some(Method::DELETE),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl Executor for HttpRequestExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::HttpRequest
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionResult> {
        let config: HttpRequestConfig =
            match serde_json::from_value(serde_json::Value::Object(context.node_data.clone())) {
                Ok(config) => config,
                Err(e) => {
                    return Ok(ExecutionResult::failure(format!(
                        "Invalid HTTP request configuration: {}",
                        e
                    )))
                }
            };

        let Some(endpoint) = config.endpoint.filter(|e| !e.trim().is_empty()) else {
            return Ok(ExecutionResult::failure("HTTP request endpoint is not configured"));
        };

        let url = match Url::parse(&endpoint) {
            Ok(url) => url,
            Err(e) => return Ok(ExecutionResult::failure(format!("Invalid URL: {}", e))),
        };

        // Only allow HTTP/HTTPS
        if url.scheme() != "http" && url.scheme() != "https" {
            return Ok(ExecutionResult::failure(format!(
                "Only HTTP/HTTPS URLs are supported, got: {}",
                url.scheme()
            )));
        }

        let Some(method) = Self::parse_method(config.method.as_deref()) else {
            return Ok(ExecutionResult::failure(format!(
                "Unsupported HTTP method: {}",
                config.method.unwrap_or_default()
            )));
        };

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = config.body {
            if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
                request = request.json(&body);
            }
        }

        tracing::info!("Node {} sending {} {}", context.node_id, method, url);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(ExecutionResult::failure(format!("HTTP request failed: {}", e)));
            }
        };

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Ok(ExecutionResult::failure(format!(
                    "Failed to read response body: {}",
                    e
                )))
            }
        };

        if !status.is_success() {
            return Ok(ExecutionResult::failure(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        let data = if is_json {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        } else {
            serde_json::Value::String(text)
        };

        let mut output: OutputData = context.previous_data.clone();
        output.insert(
            config
                .variable_name
                .unwrap_or_else(|| DEFAULT_VARIABLE.to_string()),
            serde_json::json!({
                "status": status.as_u16(),
                "statusText": status.canonical_reason().unwrap_or_default(),
                "data": data,
            }),
        );

        Ok(ExecutionResult::success(output))
    }
}
