// In-process test client

use keel_core::{Error, HttpMethod, HttpRequest, HttpResponse, Server};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Test client that sends requests straight into a server's root dispatch
#[derive(Clone)]
pub struct TestClient {
    server: Arc<Server>,
}

impl TestClient {
    pub fn new(server: impl Into<Arc<Server>>) -> Self {
        Self {
            server: server.into(),
        }
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.request(HttpMethod::POST, path, Some(body.into())).await
    }

    pub async fn put(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.request(HttpMethod::PUT, path, Some(body.into())).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(HttpMethod::DELETE, path, None).await
    }

    pub async fn patch(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.request(HttpMethod::PATCH, path, Some(body.into())).await
    }

    /// Make a request with custom method
    pub async fn request(&self, method: HttpMethod, path: &str, body: Option<Vec<u8>>) -> TestResponse {
        let mut builder = TestRequestBuilder::new(method, path);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.send(builder).await
    }

    /// Send a request assembled with [`TestRequestBuilder`]
    pub async fn send(&self, builder: TestRequestBuilder) -> TestResponse {
        TestResponse(self.server.handle(builder.build()).await)
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    query_params: BTreeMap<String, String>,
}

impl TestRequestBuilder {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            query_params: BTreeMap::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body and content type
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> HttpRequest {
        let target = if self.query_params.is_empty() {
            self.path
        } else {
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{}?{}", self.path, params.join("&"))
        };

        self.headers.into_iter().fold(
            HttpRequest::new(self.method.as_str(), target).with_body(self.body),
            |req, (key, value)| req.with_header(key, value),
        )
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse(pub HttpResponse);

impl TestResponse {
    pub fn status(&self) -> u16 {
        self.0.status
    }

    pub fn body_string(&self) -> String {
        self.0.body_text()
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.0.body).map_err(|e| Error::Deserialization(e.to_string()))
    }

    pub fn header(&self, key: &str) -> Option<&String> {
        self.0.header(key)
    }

    pub fn into_inner(self) -> HttpResponse {
        self.0
    }

    pub fn assert_status(&self, expected: u16) -> &Self {
        assert_eq!(
            self.status(),
            expected,
            "Expected status {}, got {} (body: {})",
            expected,
            self.status(),
            self.body_string()
        );
        self
    }

    pub fn assert_body(&self, expected: &str) -> &Self {
        assert_eq!(self.body_string(), expected, "Response body mismatch");
        self
    }

    pub fn assert_body_contains(&self, expected: &str) -> &Self {
        let body = self.body_string();
        assert!(
            body.contains(expected),
            "Expected body to contain '{}', but it didn't. Body: {}",
            expected,
            body
        );
        self
    }

    pub fn assert_header(&self, key: &str, expected: &str) -> &Self {
        let actual = self.header(key).map(|s| s.as_str());
        assert_eq!(
            actual,
            Some(expected),
            "Expected header '{}' to be '{}', got {:?}",
            key,
            expected,
            actual
        );
        self
    }

    pub fn assert_json<T>(&self, expected: &T) -> &Self
    where
        T: DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        match self.body_json::<T>() {
            Ok(actual) => assert_eq!(actual, *expected, "JSON bodies do not match"),
            Err(err) => panic!("Failed to deserialize response body: {}", err),
        }
        self
    }

    /// Assert a 500 whose body is the generic failure message
    pub fn assert_contained_failure(&self) -> &Self {
        self.assert_status(500)
            .assert_body(keel_core::GENERIC_FAILURE_BODY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assembles_request() {
        let req = TestRequestBuilder::new(HttpMethod::POST, "/items")
            .header("X-Trace", "abc")
            .query("page", "2")
            .query("limit", "10")
            .json(&serde_json::json!({"name": "widget"}))
            .unwrap()
            .build();

        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/items");
        assert_eq!(req.query("page").map(String::as_str), Some("2"));
        assert_eq!(req.query("limit").map(String::as_str), Some("10"));
        assert_eq!(req.header("x-trace").map(String::as_str), Some("abc"));
        assert_eq!(
            req.header("content-type").map(String::as_str),
            Some("application/json")
        );
        assert!(!req.body.is_empty());
    }

    #[test]
    fn test_response_accessors() {
        let mut inner = HttpResponse::ok();
        inner.set_header("X-Id", "7");
        inner.json(&serde_json::json!({"ok": true})).unwrap();
        let response = TestResponse(inner);

        response
            .assert_status(200)
            .assert_header("x-id", "7")
            .assert_json(&serde_json::json!({"ok": true}));
        assert!(response.body_json::<Vec<u8>>().is_err());
    }
}
