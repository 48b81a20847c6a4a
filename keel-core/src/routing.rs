// Route table: ordered registrations of dispatch wrappers

use crate::dispatch::DispatchWrapper;
use crate::logging::{debug, trace};
use crate::{HttpMethod, HttpRequest, HttpResponse, Outcome};
use std::collections::HashMap;

/// Path pattern for a registration, optionally resolved eagerly.
///
/// Plain strings convert into lazy configurations:
///
/// ```
/// use keel_core::PathConfig;
///
/// let lazy: PathConfig = "/users/:id".into();
/// let eager = PathConfig::eager("/health");
/// assert!(!lazy.eager && eager.eager);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    pub path: String,
    pub eager: bool,
}

impl PathConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            eager: false,
        }
    }

    /// Resolve every handler reference at bind time
    pub fn eager(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            eager: true,
        }
    }
}

impl From<&str> for PathConfig {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for PathConfig {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// How a registration's pattern is compared with the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Whole path must match
    Exact,
    /// Leading segments must match; the rest is handed to the callbacks
    Prefix,
}

/// One bound (method, path) → callbacks entry
#[derive(Debug)]
pub struct Registration {
    method: Option<HttpMethod>,
    pattern: String,
    mode: MatchMode,
    callbacks: Vec<DispatchWrapper>,
}

impl Registration {
    /// `method` of `None` accepts any method
    pub fn new(
        method: Option<HttpMethod>,
        pattern: impl Into<String>,
        mode: MatchMode,
        callbacks: Vec<DispatchWrapper>,
    ) -> Self {
        Self {
            method,
            pattern: normalize(&pattern.into()),
            mode,
            callbacks,
        }
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn callbacks(&self) -> &[DispatchWrapper] {
        &self.callbacks
    }

    fn accepts(&self, method: &str) -> bool {
        self.method.is_none_or(|m| m.matches(method))
    }

    fn match_request(&self, path: &str) -> Option<PathMatch> {
        match self.mode {
            MatchMode::Exact => match_path(&self.pattern, path).map(|params| PathMatch {
                params,
                remainder: None,
            }),
            MatchMode::Prefix => match_prefix(&self.pattern, path).map(|(params, rest)| PathMatch {
                params,
                remainder: Some(rest),
            }),
        }
    }
}

struct PathMatch {
    params: HashMap<String, String>,
    remainder: Option<String>,
}

/// Ordered list of registrations.
///
/// Every registration that matches a request runs in registration order;
/// within one registration the callbacks run in order. The first callback
/// that settles on [`Outcome::Stop`] ends the traversal.
#[derive(Debug, Default)]
pub struct RouteTable {
    registrations: Vec<Registration>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, registration: Registration) {
        debug!(
            method = registration.method.map_or("*", |m| m.as_str()),
            pattern = %registration.pattern,
            callbacks = registration.callbacks.len(),
            "Route registered"
        );
        self.registrations.push(registration);
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run every matching callback until one stops the chain
    pub async fn handle(&self, req: &mut HttpRequest, res: &mut HttpResponse) -> Outcome {
        for registration in &self.registrations {
            if !registration.accepts(&req.method) {
                continue;
            }
            let Some(matched) = registration.match_request(&req.path) else {
                continue;
            };
            trace!(pattern = %registration.pattern, path = %req.path, "Route matched");

            let saved_params = req.path_params.clone();
            let saved_path = matched
                .remainder
                .map(|rest| std::mem::replace(&mut req.path, rest));
            req.path_params.extend(matched.params);

            let mut outcome = Outcome::Continue;
            for callback in &registration.callbacks {
                outcome = callback.call(req, res).await;
                if outcome == Outcome::Stop {
                    break;
                }
            }

            if let Some(path) = saved_path {
                req.path = path;
            }
            req.path_params = saved_params;

            if outcome == Outcome::Stop {
                return Outcome::Stop;
            }
        }
        Outcome::Continue
    }
}

/// Strip a trailing slash and make sure the pattern is rooted
fn normalize(pattern: &str) -> String {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_segments<'a>(
    pattern_parts: &[&str],
    path_parts: &[&'a str],
) -> Option<HashMap<String, String>> {
    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            params.insert(param_name.to_string(), path_part.to_string());
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

/// Match a route path pattern against a whole request path
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts = segments(pattern);
    let path_parts = segments(path);

    if pattern_parts.len() != path_parts.len() {
        return None;
    }
    match_segments(&pattern_parts, &path_parts)
}

/// Match a pattern against the leading segments of a path, returning the
/// unmatched remainder as a rooted path
fn match_prefix(pattern: &str, path: &str) -> Option<(HashMap<String, String>, String)> {
    let pattern_parts = segments(pattern);
    let path_parts = segments(path);

    if pattern_parts.len() > path_parts.len() {
        return None;
    }
    let params = match_segments(&pattern_parts, &path_parts[..pattern_parts.len()])?;
    let rest = path_parts[pattern_parts.len()..].join("/");
    Some((params, format!("/{}", rest)))
}
