// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock transport for testing.
//!
//! Answers requests through a handler closure instead of the network and
//! keeps every request it received.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::*;

type Handler = dyn Fn(&Request) -> Result<Response> + Send + Sync;

/// Mock transport for testing.
pub struct MockTransport {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<Request>>>,
    /// Optional delay to simulate network latency
    pub latency: Duration,
}

impl MockTransport {
    /// Create a mock transport answering through `handler`.
    pub fn new(handler: impl Fn(&Request) -> Result<Response> + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
        }
    }

    /// Create a mock transport answering every request with `status` and no body.
    pub fn with_status(status: u16) -> Self {
        Self::new(move |_| Ok(Response::new(status)))
    }

    /// Create a mock transport where every request fails at the connection level.
    pub fn failing() -> Self {
        Self::new(|_| Err(TransportError::Connection("mock failure".to_string())))
    }

    /// Create a mock transport whose requests never complete within a test.
    pub fn never_completing() -> Self {
        let mut transport = Self::with_status(200);
        transport.latency = Duration::from_secs(3_600);
        transport
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Requests received so far, in order.
    pub async fn requests(&self) -> Vec<Request> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_type(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, request: &Request) -> Result<Response> {
        let start = std::time::Instant::now();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.requests.lock().await.push(request.clone());

        let mut response = (self.handler)(request)?;
        if response.url.is_empty() {
            response.url = request.url("http://mock");
        }
        response.elapsed = start.elapsed();
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statewalk_dsl::HttpMethod;

    #[tokio::test]
    async fn test_mock_records_requests() {
        let transport = MockTransport::new(|request| {
            Ok(Response::new(200).with_json(json!({"path": request.render_path()})))
        });
        let request = Request::new("listUsers".into(), HttpMethod::Get, "/users");

        let response = transport.send(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, Some(json!({"path": "/users"})));
        assert_eq!(response.url, "http://mock/users");
        assert_eq!(transport.request_count().await, 1);
        assert_eq!(transport.transport_type(), "mock");
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let transport = MockTransport::failing();
        let request = Request::new("listUsers".into(), HttpMethod::Get, "/users");
        assert!(matches!(
            transport.send(&request).await,
            Err(TransportError::Connection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let transport = MockTransport::with_status(204).with_latency(Duration::from_millis(50));
        let request = Request::new("ping".into(), HttpMethod::Head, "/ping");
        let start = tokio::time::Instant::now();
        transport.send(&request).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
