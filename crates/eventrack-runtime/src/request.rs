//! Request-scoped tracking helpers for web servers.
//!
//! [`RequestContext`] carries the values a server knows about the request
//! being handled. Entering it on a tracker makes every event emitted while the
//! request is handled carry those values; the returned guard removes them
//! again when the handler returns, even on early return or panic.
//!
//! [`RequestTracking`] emits one `http.request` event per handled request,
//! skipping paths that match configured patterns.

use eventrack_core::{ContextGuard, TrackingError, TrackingResult, Tracker};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Context name used for request values.
pub const CONTEXT_NAME: &str = "request.context";

/// Default name of the per-request event.
pub const HTTP_REQUEST_EVENT: &str = "http.request";

/// Key fragment whose values are blanked by [`scrub_sensitive`].
const SENSITIVE_KEY: &str = "password";

/// Values describing the request being handled.
///
/// Missing values are recorded as empty strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub session: String,
    pub user_primary_key: Value,
    pub username: String,
    pub ip: String,
    pub host: String,
    pub agent: String,
    pub path: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn with_user(mut self, primary_key: impl Into<Value>, username: impl Into<String>) -> Self {
        self.user_primary_key = primary_key.into();
        self.username = username.into();
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Returns the values entered into the tracker context.
    pub fn to_values(&self) -> Map<String, Value> {
        let user_primary_key = match &self.user_primary_key {
            Value::Null => Value::String(String::new()),
            other => other.clone(),
        };

        let mut values = Map::new();
        values.insert("session".into(), self.session.clone().into());
        values.insert("user_primary_key".into(), user_primary_key);
        values.insert("username".into(), self.username.clone().into());
        values.insert("ip".into(), self.ip.clone().into());
        values.insert("host".into(), self.host.clone().into());
        values.insert("agent".into(), self.agent.clone().into());
        values.insert("path".into(), self.path.clone().into());
        values
    }

    /// Enters the request values on `tracker` until the guard is dropped.
    #[must_use = "the request context is exited when the guard is dropped"]
    pub fn enter(&self, tracker: &Tracker) -> ContextGuard {
        tracker.context(CONTEXT_NAME, self.to_values())
    }
}

/// Returns a copy of `values` with every value whose key contains
/// `password` replaced by an empty string.
pub fn scrub_sensitive(values: &Map<String, Value>) -> Map<String, Value> {
    values
        .iter()
        .map(|(key, value)| {
            let value = if key.contains(SENSITIVE_KEY) {
                Value::String(String::new())
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

// =============================================================================
// Request Events
// =============================================================================

/// Emits one event per handled request.
#[derive(Debug, Clone)]
pub struct RequestTracking {
    event_name: String,
    ignored: Vec<Regex>,
}

impl Default for RequestTracking {
    fn default() -> Self {
        Self {
            event_name: HTTP_REQUEST_EVENT.to_string(),
            ignored: Vec::new(),
        }
    }
}

impl RequestTracking {
    /// Creates a tracker for requests whose path matches none of
    /// `ignore_patterns`. Patterns match at the start of the path.
    pub fn new<I, S>(ignore_patterns: I) -> TrackingResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ignored = ignore_patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(&format!("^(?:{pattern})")).map_err(|err| {
                    TrackingError::improperly_configured(format!(
                        "invalid ignore pattern '{pattern}': {err}"
                    ))
                })
            })
            .collect::<TrackingResult<Vec<_>>>()?;

        Ok(Self {
            ignored,
            ..Self::default()
        })
    }

    /// Sets the name of the emitted event.
    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = name.into();
        self
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Returns `false` if `path` matches an ignore pattern.
    pub fn should_track(&self, path: &str) -> bool {
        !self.ignored.iter().any(|pattern| pattern.is_match(path))
    }

    /// Emits the request event unless the path is ignored.
    ///
    /// `query` and `body` are scrubbed with [`scrub_sensitive`]. Returns
    /// `true` if an event was emitted.
    pub fn track(
        &self,
        tracker: &Tracker,
        method: &str,
        path: &str,
        query: &Map<String, Value>,
        body: &Map<String, Value>,
    ) -> bool {
        if !self.should_track(path) {
            debug!(path, "Request path ignored");
            return false;
        }

        let mut data = Map::new();
        data.insert("method".into(), method.into());
        data.insert("query".into(), Value::Object(scrub_sensitive(query)));
        data.insert("body".into(), Value::Object(scrub_sensitive(body)));
        tracker.emit(&self.event_name, data);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventrack_core::{MemorySink, RoutingNode};
    use serde_json::json;
    use std::sync::Arc;

    fn recording_tracker() -> (Tracker, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let tracker = Tracker::new(RoutingNode::new().with_backend("memory", sink.clone()));
        (tracker, sink)
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_request_context_values() {
        let (tracker, sink) = recording_tracker();
        let request = RequestContext::new()
            .with_session("abc")
            .with_user(10, "alice")
            .with_ip("127.0.0.1")
            .with_path("/courses");

        {
            let _guard = request.enter(&tracker);
            tracker.emit_name("page.view");
        }
        tracker.emit_name("after");

        let events = sink.events();
        let context = events[0].context().unwrap();
        assert_eq!(context.get("session"), Some(&json!("abc")));
        assert_eq!(context.get("user_primary_key"), Some(&json!(10)));
        assert_eq!(context.get("username"), Some(&json!("alice")));
        assert_eq!(context.get("host"), Some(&json!("")));
        assert_eq!(context.get("path"), Some(&json!("/courses")));
        assert!(events[1].context().unwrap().is_empty());
    }

    #[test]
    fn test_anonymous_request() {
        let values = RequestContext::new().to_values();
        assert_eq!(values["user_primary_key"], json!(""));
        assert_eq!(values["username"], json!(""));
        assert_eq!(values.len(), 7);
    }

    #[test]
    fn test_scrub_sensitive() {
        let values = object(json!({"username": "bob", "password": "x", "new_password2": "y"}));
        let scrubbed = scrub_sensitive(&values);
        assert_eq!(
            Value::Object(scrubbed),
            json!({"username": "bob", "password": "", "new_password2": ""})
        );
    }

    #[test]
    fn test_track_request() {
        let (tracker, sink) = recording_tracker();
        let tracking = RequestTracking::new(["/static/", "/health$"]).unwrap();

        let query = object(json!({"page": "2"}));
        let body = object(json!({"password": "secret"}));
        assert!(tracking.track(&tracker, "POST", "/login", &query, &body));
        assert!(!tracking.track(&tracker, "GET", "/static/app.js", &query, &Map::new()));
        assert!(!tracking.track(&tracker, "GET", "/health", &query, &Map::new()));
        assert!(tracking.track(&tracker, "GET", "/api/static/", &query, &Map::new()));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), HTTP_REQUEST_EVENT);
        assert_eq!(
            events[0].data().cloned().map(Value::Object),
            Some(json!({"method": "POST", "query": {"page": "2"}, "body": {"password": ""}}))
        );
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let err = RequestTracking::new(["("]).unwrap_err();
        assert!(matches!(err, TrackingError::ImproperlyConfigured(_)));
    }
}
