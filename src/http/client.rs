use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, redirect};
use serde_json::Value;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::template;

use super::method::HttpMethod;
use super::request::PreparedRequest;
use super::response::HttpResponse;

/// Optional parts of a templated request.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub path_params: BTreeMap<String, String>,
}

/// Issues requests against one target service.
///
/// Cloning is cheap; the underlying connection pool is shared. No request is
/// ever retried: a network error or timeout is returned to the caller as
/// [`HarnessError::Transport`] straight away.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpExecutor {
    pub fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        let timeout = config.timeout();
        let client = Client::builder()
            .redirect(redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .map_err(|err| HarnessError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `path` onto the base URL. Absolute URLs pass through untouched.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Resolves `{{name}}` placeholders in `path_template` from
    /// `parts.path_params` and sends the request.
    ///
    /// A placeholder with no matching parameter is a definition error and no
    /// request is made.
    pub async fn execute(
        &self,
        method: HttpMethod,
        path_template: &str,
        parts: RequestParts,
    ) -> Result<HttpResponse, HarnessError> {
        let path = template::render_str(path_template, &parts.path_params)?;
        let request = PreparedRequest {
            method,
            path,
            headers: parts.headers,
            body: parts.body,
        };
        self.send(&request).await
    }

    pub async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, HarnessError> {
        let url = self.url_for(&request.path);
        let headers = build_headers(&request.headers)?;

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .headers(headers);

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        debug!(method = %request.method, url = %url, "sending request");

        let transport_error = |message: String| HarnessError::Transport {
            method: request.method.to_string(),
            url: url.clone(),
            message,
        };

        let started = Instant::now();
        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                transport_error(format!("timed out after {}s", self.timeout.as_secs_f64()))
            } else {
                transport_error(format!("Request failed: {err}"))
            }
        })?;

        let status = response.status().as_u16();
        let response_headers = collect_headers(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|err| transport_error(format!("Failed to read response: {err}")))?;
        let elapsed = started.elapsed().as_millis() as u64;
        let raw_body = String::from_utf8_lossy(&bytes).into_owned();

        debug!(
            status,
            duration_ms = elapsed,
            size_bytes = bytes.len(),
            "received response"
        );

        Ok(HttpResponse::new(status, response_headers, raw_body, elapsed))
    }
}

/// Invalid header names or values are authoring mistakes, so they surface as
/// definition errors rather than transport failures.
fn build_headers(input: &[(String, String)]) -> Result<HeaderMap, HarnessError> {
    let mut headers = HeaderMap::new();

    for (key, value) in input {
        let key = key.trim();
        if key.is_empty() {
            return Err(HarnessError::Definition(format!(
                "Header key is empty (value `{value}`)"
            )));
        }

        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| HarnessError::Definition(format!("Invalid header key `{key}`: {e}")))?;
        let header_value = HeaderValue::from_str(value.trim()).map_err(|e| {
            HarnessError::Definition(format!("Invalid header value for `{key}`: {e}"))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}
