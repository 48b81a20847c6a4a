// HTTP request and response types

use crate::logging::warn;
use crate::{Container, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP request as seen by handlers.
///
/// `path` is relative to the mount point currently handling the request;
/// `original_path` is what the client asked for. Header names are stored
/// lowercase.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub original_path: String,
    /// One value per header name. The transport joins repeated headers
    /// with `", "`, which loses the split for headers such as `Cookie`.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    scope: Container,
}

impl HttpRequest {
    /// Create a request; a query string in `target` is split off and parsed
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query_params) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query_string(query)),
            None => (target, HashMap::new()),
        };

        Self {
            method: method.into().to_uppercase(),
            original_path: path.clone(),
            path,
            headers: HashMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
            query_params,
            scope: Container::new(),
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// The injection scope active for this request
    pub fn scope(&self) -> &Container {
        &self.scope
    }

    pub fn set_scope(&mut self, scope: Container) {
        self.scope = scope;
    }
}

/// HTTP response under construction.
///
/// Writers mirror the usual `status(..).send(..)` style. Once `send`,
/// `text`, `json` or `end` has run the response is finalized and later
/// writes are dropped with a warning.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    finalized: bool,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            finalized: false,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Whether the body has been sent
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn status(&mut self, status: u16) -> &mut Self {
        if self.reject_write("status") {
            return self;
        }
        self.status = status;
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        if self.reject_write("header") {
            return self;
        }
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Send a raw body and finalize
    pub fn send(&mut self, body: impl Into<Vec<u8>>) {
        if self.reject_write("body") {
            return;
        }
        self.body = body.into();
        self.finalized = true;
    }

    /// Send a plain-text body and finalize
    pub fn text(&mut self, body: impl Into<String>) {
        if self.reject_write("body") {
            return;
        }
        self.headers.insert(
            "Content-Type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        );
        self.send(body.into());
    }

    /// Serialize `value` as the JSON body and finalize
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<(), Error> {
        if self.reject_write("body") {
            return Ok(());
        }
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self.send(body);
        Ok(())
    }

    /// Finalize without a body
    pub fn end(&mut self) {
        if self.reject_write("end") {
            return;
        }
        self.finalized = true;
    }

    /// Body as UTF-8, lossy
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn reject_write(&self, what: &str) -> bool {
        if self.finalized {
            warn!(write = what, status = self.status, "Write after response was finalized ignored");
        }
        self.finalized
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}

/// Parse a query string into a map of parameters
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_splits_query() {
        let req = HttpRequest::new("get", "/users?name=john&age=30");
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/users");
        assert_eq!(req.original_path, "/users");
        assert_eq!(req.query("name"), Some(&"john".to_string()));
        assert_eq!(req.query("age"), Some(&"30".to_string()));
    }

    #[test]
    fn test_parse_query_string_no_value() {
        let params = parse_query_string("flag&debug=true");
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.get("debug"), Some(&"true".to_string()));
        assert!(parse_query_string("").is_empty());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = HttpRequest::new("GET", "/").with_header("X-Api-Key", "secret");
        assert_eq!(req.header("x-api-key"), Some(&"secret".to_string()));
        assert_eq!(req.header("X-API-KEY"), Some(&"secret".to_string()));
    }

    #[test]
    fn test_request_json_body() {
        #[derive(Deserialize)]
        struct Payload {
            name: String,
        }

        let req = HttpRequest::new("POST", "/").with_body(r#"{"name":"keel"}"#);
        let payload: Payload = req.json().unwrap();
        assert_eq!(payload.name, "keel");

        let bad = HttpRequest::new("POST", "/").with_body("nope");
        assert!(matches!(bad.json::<Payload>(), Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_send_finalizes() {
        let mut res = HttpResponse::ok();
        assert!(!res.is_finalized());
        res.status(201).send("created");
        assert!(res.is_finalized());
        assert_eq!(res.status, 201);
        assert_eq!(res.body_text(), "created");
    }

    #[test]
    fn test_writes_after_finalize_are_ignored() {
        let mut res = HttpResponse::ok();
        res.text("first");
        res.status(500).send("second");
        res.set_header("X-Late", "1");

        assert_eq!(res.status, 200);
        assert_eq!(res.body_text(), "first");
        assert!(res.header("x-late").is_none());
    }

    #[test]
    fn test_json_response() {
        let mut res = HttpResponse::ok();
        res.json(&serde_json::json!({"message": "hello"})).unwrap();
        assert!(res.is_finalized());
        assert_eq!(res.header("content-type"), Some(&"application/json".to_string()));
    }

    #[test]
    fn test_end_without_body() {
        let mut res = HttpResponse::ok();
        res.status(204).end();
        assert!(res.is_finalized());
        assert!(res.body.is_empty());
    }
}
