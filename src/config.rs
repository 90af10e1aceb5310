//! Configuration for the mock server.
//!
//! Defines route descriptors, global settings, and loading from JSON or YAML.

use axum::http::{HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Port used when neither the CLI nor the config names one.
pub const DEFAULT_PORT: u16 = 3000;

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ShamConfig {
    /// Port to listen on unless overridden on the command line
    #[serde(default)]
    pub port: Option<u16>,

    /// Route descriptors, in declaration order
    #[serde(default)]
    pub routes: Vec<RouteDescriptor>,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

impl ShamConfig {
    /// Load configuration from a file.
    ///
    /// `.yaml` and `.yml` files are parsed as YAML, everything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// Parse configuration from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the port to bind: CLI flag, then config, then [`DEFAULT_PORT`].
    pub fn effective_port(&self, cli_port: Option<u16>) -> u16 {
        cli_port.or(self.port).unwrap_or(DEFAULT_PORT)
    }

    /// Validate the configuration.
    ///
    /// Stops at the first invalid descriptor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.simulate_error_param.trim().is_empty() {
            return Err(ConfigError::InvalidSettings(
                "simulateErrorParam cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, route) in self.routes.iter().enumerate() {
            route.validate().map_err(|reason| ConfigError::InvalidRoute {
                index,
                method: route.method,
                path: route.path.clone(),
                reason,
            })?;

            if !seen.insert((route.method, route.route_pattern())) {
                return Err(ConfigError::DuplicateRoute {
                    index,
                    method: route.method,
                    path: route.path.clone(),
                });
            }
        }
        Ok(())
    }
}

/// HTTP methods a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Canonical uppercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Whether requests with this method are expected to carry a body.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(format!("unsupported HTTP method: {}", s)),
        }
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single mock route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RouteDescriptor {
    /// HTTP method, case-insensitive in the file
    pub method: HttpMethod,

    /// Path pattern, e.g. `/users/:id` or `/users/{id}`
    pub path: String,

    /// Status returned on success
    #[serde(default = "default_status")]
    pub status: u16,

    /// Artificial latency before the success response
    #[serde(default)]
    pub delay: Delay,

    /// Success body
    #[serde(default)]
    pub response: serde_json::Value,

    /// Required request body shape
    #[serde(default, rename = "match")]
    pub match_rule: Option<MatchRule>,

    /// Alternate response activated by the trigger query parameter
    #[serde(default)]
    pub simulate_error: Option<SimulatedError>,

    /// Extra headers on the success response
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_status() -> u16 {
    200
}

fn is_valid_status(status: u16) -> bool {
    (100..=599).contains(&status)
}

impl RouteDescriptor {
    /// Create a descriptor with defaults for everything but method and path.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            status: default_status(),
            delay: Delay::default(),
            response: serde_json::Value::Null,
            match_rule: None,
            simulate_error: None,
            headers: BTreeMap::new(),
        }
    }

    /// Keys required in the request body, if the route declares any.
    pub fn required_body(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.match_rule.as_ref().and_then(|m| m.body.as_ref())
    }

    /// The path in the router's `{param}` syntax.
    pub fn route_pattern(&self) -> String {
        to_route_pattern(&self.path)
    }

    /// Validate the descriptor.
    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err(format!("path must start with '/': {:?}", self.path));
        }
        if !is_valid_status(self.status) {
            return Err(format!("invalid status code: {}", self.status));
        }
        if let Some(simulated) = &self.simulate_error {
            if !is_valid_status(simulated.status) {
                return Err(format!(
                    "invalid simulateError status code: {}",
                    simulated.status
                ));
            }
        }
        self.delay.validate()?;
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name: {:?}", name))?;
            HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header {}", name))?;
        }
        Ok(())
    }
}

/// Translate express-style `:param` and `*rest` segments to `{param}` / `{*rest}`.
pub fn to_route_pattern(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*') {
                let name = if name.is_empty() { "rest" } else { name };
                format!("{{*{}}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Request body requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchRule {
    /// Required top-level keys; values only describe the expected content
    #[serde(default)]
    pub body: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Simulated failure returned instead of the success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatedError {
    pub status: u16,
    #[serde(default)]
    pub response: serde_json::Value,
}

/// Latency before a success response.
///
/// Written either as plain milliseconds or as `{ "min": a, "max": b }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    Fixed(u64),
    Range { min: u64, max: u64 },
}

impl Default for Delay {
    fn default() -> Self {
        Delay::Fixed(0)
    }
}

impl Delay {
    /// Calculate the delay to apply to one request.
    pub fn calculate(&self) -> Duration {
        let ms = match *self {
            Delay::Fixed(ms) => ms,
            Delay::Range { min, max } if max > min => {
                use rand::Rng;
                rand::thread_rng().gen_range(min..=max)
            }
            Delay::Range { min, .. } => min,
        };
        Duration::from_millis(ms)
    }

    /// Upper bound of the delay in milliseconds.
    pub fn max_ms(&self) -> u64 {
        match *self {
            Delay::Fixed(ms) => ms,
            Delay::Range { min, max } => min.max(max),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Delay::Range { min, max } if min > max => {
                Err(format!("delay range min {} exceeds max {}", min, max))
            }
            _ => Ok(()),
        }
    }
}

/// How request bodies are compared against `match.body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Every expected key must be present; extra keys are fine
    #[default]
    Subset,
    /// Key sets must be identical
    Exact,
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Settings {
    /// Body validation policy
    #[serde(default)]
    pub validation: ValidationPolicy,

    /// Query parameter that activates `simulateError`
    #[serde(default = "default_simulate_error_param")]
    pub simulate_error_param: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validation: ValidationPolicy::default(),
            simulate_error_param: default_simulate_error_param(),
        }
    }
}

fn default_simulate_error_param() -> String {
    "simulateError".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_json_config() {
        let json = r#"{
            "port": 4000,
            "routes": [
                {
                    "method": "post",
                    "path": "/users",
                    "status": 201,
                    "delay": 250,
                    "response": {"id": 1},
                    "match": {"body": {"name": "string", "email": "string"}},
                    "simulateError": {"status": 503, "response": {"down": true}}
                }
            ]
        }"#;
        let config = ShamConfig::from_json_str(json).unwrap();
        assert_eq!(config.port, Some(4000));
        assert_eq!(config.routes.len(), 1);

        let route = &config.routes[0];
        assert_eq!(route.method, HttpMethod::Post);
        assert_eq!(route.status, 201);
        assert_eq!(route.delay, Delay::Fixed(250));
        assert_eq!(route.required_body().unwrap().len(), 2);
        assert_eq!(route.simulate_error.as_ref().unwrap().status, 503);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
routes:
  - method: GET
    path: /health
    response:
      ok: true
  - method: patch
    path: /users/:id
    delay:
      min: 10
      max: 20
settings:
  validation: exact
  simulateErrorParam: fail
"#;
        let config = ShamConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.port, None);
        assert_eq!(config.routes[0].status, 200);
        assert_eq!(config.routes[0].delay, Delay::Fixed(0));
        assert_eq!(config.routes[1].method, HttpMethod::Patch);
        assert_eq!(config.routes[1].delay, Delay::Range { min: 10, max: 20 });
        assert_eq!(config.settings.validation, ValidationPolicy::Exact);
        assert_eq!(config.settings.simulate_error_param, "fail");
    }

    #[test]
    fn test_unknown_method_rejected() {
        let json = r#"{"routes": [{"method": "FETCH", "path": "/x"}]}"#;
        let err = ShamConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("unsupported HTTP method"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{"routes": [{"method": "GET", "path": "/x", "stauts": 200}]}"#;
        assert!(ShamConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_negative_delay_rejected() {
        let json = r#"{"routes": [{"method": "GET", "path": "/x", "delay": -5}]}"#;
        assert!(ShamConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_validate_status_range() {
        let mut route = RouteDescriptor::new(HttpMethod::Get, "/x");
        route.status = 700;
        let config = ShamConfig {
            routes: vec![route],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("invalid status code: 700"));
    }

    #[test]
    fn test_validate_simulated_status_range() {
        let mut route = RouteDescriptor::new(HttpMethod::Get, "/x");
        route.simulate_error = Some(SimulatedError {
            status: 42,
            response: serde_json::Value::Null,
        });
        let config = ShamConfig {
            routes: vec![route],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_routes() {
        let config = ShamConfig {
            routes: vec![
                RouteDescriptor::new(HttpMethod::Get, "/users/:id"),
                RouteDescriptor::new(HttpMethod::Post, "/users/:id"),
                RouteDescriptor::new(HttpMethod::Get, "/users/{id}"),
            ],
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::DuplicateRoute { index, method, .. }) => {
                assert_eq!(index, 2);
                assert_eq!(method, HttpMethod::Get);
            }
            other => panic!("Expected DuplicateRoute, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_path_and_headers() {
        let config = ShamConfig {
            routes: vec![RouteDescriptor::new(HttpMethod::Get, "users")],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut route = RouteDescriptor::new(HttpMethod::Get, "/users");
        route
            .headers
            .insert("bad header".to_string(), "v".to_string());
        let config = ShamConfig {
            routes: vec![route],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_delay_range() {
        let mut route = RouteDescriptor::new(HttpMethod::Get, "/x");
        route.delay = Delay::Range { min: 50, max: 10 };
        let config = ShamConfig {
            routes: vec![route],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delay_calculation() {
        assert_eq!(Delay::Fixed(100).calculate(), Duration::from_millis(100));

        let range = Delay::Range { min: 50, max: 150 };
        let delay = range.calculate().as_millis() as u64;
        assert!((50..=150).contains(&delay));
        assert_eq!(range.max_ms(), 150);

        let collapsed = Delay::Range { min: 30, max: 30 };
        assert_eq!(collapsed.calculate(), Duration::from_millis(30));
    }

    #[test]
    fn test_route_pattern_translation() {
        assert_eq!(to_route_pattern("/users/:id"), "/users/{id}");
        assert_eq!(
            to_route_pattern("/users/:id/posts/:post"),
            "/users/{id}/posts/{post}"
        );
        assert_eq!(to_route_pattern("/files/*path"), "/files/{*path}");
        assert_eq!(to_route_pattern("/static/*"), "/static/{*rest}");
        assert_eq!(to_route_pattern("/users/{id}"), "/users/{id}");
        assert_eq!(to_route_pattern("/"), "/");
    }

    #[test]
    fn test_effective_port() {
        let mut config = ShamConfig::default();
        assert_eq!(config.effective_port(None), DEFAULT_PORT);

        config.port = Some(8080);
        assert_eq!(config.effective_port(None), 8080);
        assert_eq!(config.effective_port(Some(9090)), 9090);
    }

    #[test]
    fn test_empty_simulate_error_param_rejected() {
        let mut config = ShamConfig::default();
        config.settings.simulate_error_param = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let mut yaml = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(yaml, "port: 5000\nroutes: []").unwrap();
        let config = ShamConfig::from_file(yaml.path()).unwrap();
        assert_eq!(config.port, Some(5000));

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(json, r#"{{"port": 5001}}"#).unwrap();
        let config = ShamConfig::from_file(json.path()).unwrap();
        assert_eq!(config.port, Some(5001));
    }

    #[test]
    fn test_from_file_missing() {
        let err = ShamConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
