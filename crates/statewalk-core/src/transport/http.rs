// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blocking HTTP transport backed by ureq.
//!
//! Requests run on tokio's blocking pool so workers never block the runtime.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use statewalk_dsl::coercion::to_parameter_string;
use statewalk_dsl::paths::is_json_media_type;
use tracing::trace;

use super::traits::*;

/// HTTP transport sending requests to a fixed base URL.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("base URL `{}`: {}", base_url, e)))?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn transport_type(&self) -> &'static str {
        "http"
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }

    async fn send(&self, request: &Request) -> Result<Response> {
        let agent = self.agent.clone();
        let url = request.url(&self.base_url);
        let request = request.clone();
        let timeout_ms = self.timeout.as_millis() as u64;

        tokio::task::spawn_blocking(move || execute(&agent, &url, &request, timeout_ms))
            .await
            .map_err(|e| TransportError::Connection(format!("request task failed: {}", e)))?
    }
}

fn execute(agent: &ureq::Agent, url: &str, request: &Request, timeout_ms: u64) -> Result<Response> {
    let start = Instant::now();
    let mut call = agent.request(&request.method.to_string(), url);
    for (name, value) in &request.headers {
        call = call.set(name, &to_parameter_string(value));
    }
    if let Some(cookies) = request.cookie_header() {
        call = call.set("Cookie", &cookies);
    }

    trace!(method = %request.method, url = %url, "Sending request");

    let result = match (&request.body, request.media_type.as_deref()) {
        (None, _) => call.call(),
        (Some(body), media_type) if media_type.is_none_or(is_json_media_type) => {
            call.send_json(body.clone())
        }
        (Some(body), Some(media_type)) => call
            .set("Content-Type", media_type)
            .send_string(&to_parameter_string(body)),
        (Some(body), None) => call.send_json(body.clone()),
    };

    let response = match result {
        Ok(response) | Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(error)) => {
            let message = error.to_string();
            return Err(if message.contains("timed out") {
                TransportError::Timeout(timeout_ms)
            } else {
                TransportError::Connection(message)
            });
        }
    };

    let status = response.status();
    let headers: Vec<(String, String)> = response
        .headers_names()
        .into_iter()
        .flat_map(|name| {
            response
                .all(&name)
                .into_iter()
                .map(|value| (name.clone(), value.to_string()))
                .collect::<Vec<_>>()
        })
        .collect();
    let json = is_json_media_type(response.content_type());
    let text = response
        .into_string()
        .map_err(|e| TransportError::Connection(format!("reading body: {}", e)))?;
    let body = if json && !text.is_empty() {
        serde_json::from_str(&text).ok()
    } else {
        None
    };

    Ok(Response {
        status,
        headers,
        body,
        text,
        url: url.to_string(),
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statewalk_dsl::{HttpMethod, ParameterLocation};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_post_json_and_read_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(body_json(json!({"name": "alice"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", "/users/7")
                    .set_body_json(json!({"id": 7})),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), Duration::from_secs(5)).unwrap();
        let mut request = Request::new("createUser".into(), HttpMethod::Post, "/users");
        request.body = Some(json!({"name": "alice"}));
        request.media_type = Some("application/json".into());

        let response = transport.send(&request).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.header("location"), Some("/users/7"));
        assert_eq!(response.body, Some(json!({"id": 7})));
        assert_eq!(response.url, format!("{}/users", server.uri()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/1"))
            .and(query_param("verbose", "true"))
            .and(header("X-Trace", "abc"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), Duration::from_secs(5)).unwrap();
        let mut request = Request::new("getUser".into(), HttpMethod::Get, "/users/{id}");
        request.set_parameter(ParameterLocation::Path, "id", json!(1));
        request.set_parameter(ParameterLocation::Query, "verbose", json!(true));
        request.set_parameter(ParameterLocation::Header, "X-Trace", json!("abc"));

        let response = transport.send(&request).await.unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.text, "missing");
        assert_eq!(response.body, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connection_failure() {
        // Port 9 (discard) is not expected to accept HTTP connections
        let transport =
            HttpTransport::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let request = Request::new("ping".into(), HttpMethod::Get, "/");
        assert!(transport.send(&request).await.is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpTransport::new("not a url", Duration::from_secs(1)),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
