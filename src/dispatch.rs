//! Per-route request dispatch.
//!
//! Each compiled route owns a [`Dispatcher`]. For every request it runs, in
//! order: the simulated-error check, the body validation gate, and the
//! delayed success response. Failures that escape those steps become a
//! generic 500.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::config::{RouteDescriptor, Settings, ValidationPolicy};
use crate::error::{ConfigError, DispatchError};
use crate::matcher::{is_error_triggered, validate_body};
use crate::scheduler::ResponseScheduler;

/// Body returned for internal failures. Never includes error details.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal mock server error";

/// Body returned when a validated route receives a body that is not JSON.
pub const MALFORMED_BODY_MESSAGE: &str = "Malformed request body";

/// One inbound request, as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse the body as a JSON object.
    ///
    /// An empty body or a JSON value that is not an object yields `None`.
    fn json_object(&self) -> Result<Option<Map<String, Value>>, serde_json::Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        match serde_json::from_slice(&self.body)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Ok(None),
        }
    }
}

/// Decision logic for a single compiled route.
#[derive(Debug)]
pub struct Dispatcher {
    route: RouteDescriptor,
    headers: Vec<(HeaderName, HeaderValue)>,
    policy: ValidationPolicy,
    trigger_param: String,
    scheduler: ResponseScheduler,
}

impl Dispatcher {
    /// Create a dispatcher for the route at `index` in the configuration.
    pub fn new(
        index: usize,
        route: RouteDescriptor,
        settings: &Settings,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidRoute {
            index,
            method: route.method,
            path: route.path.clone(),
            reason,
        };

        let mut headers = Vec::with_capacity(route.headers.len());
        for (name, value) in &route.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("invalid header name {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("invalid value for header {}: {}", name, e)))?;
            headers.push((name, value));
        }

        Ok(Self {
            route,
            headers,
            policy: settings.validation,
            trigger_param: settings.simulate_error_param.clone(),
            scheduler: ResponseScheduler::new(),
        })
    }

    pub fn route(&self) -> &RouteDescriptor {
        &self.route
    }

    /// Produce the response for one request.
    pub async fn dispatch(&self, ctx: RequestContext) -> Response {
        let method = ctx.method.clone();
        let path = ctx.path.clone();

        match self.try_dispatch(ctx).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    method = %method,
                    path = %path,
                    error = %e,
                    "Failed to build mock response"
                );
                internal_error_response()
            }
        }
    }

    async fn try_dispatch(&self, ctx: RequestContext) -> Result<Response, DispatchError> {
        let route = &self.route;

        if let Some(simulated) = &route.simulate_error {
            if is_error_triggered(&ctx.query, &self.trigger_param) {
                info!(
                    method = %ctx.method,
                    path = %ctx.path,
                    status = simulated.status,
                    "Returning simulated error"
                );
                return json_response(simulated.status, &[], &simulated.response);
            }
        }

        if route.method.carries_body() {
            if let Some(expected) = route.required_body() {
                let body = match ctx.json_object() {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(
                            method = %ctx.method,
                            path = %ctx.path,
                            error = %e,
                            "Rejecting malformed request body"
                        );
                        return json_response(
                            StatusCode::BAD_REQUEST.as_u16(),
                            &[],
                            &json!({ "message": MALFORMED_BODY_MESSAGE }),
                        );
                    }
                };

                if let Err(failure) = validate_body(self.policy, expected, body.as_ref()) {
                    warn!(
                        method = %ctx.method,
                        path = %ctx.path,
                        missing = ?failure.missing,
                        unexpected = ?failure.unexpected,
                        "Request body failed validation"
                    );
                    let body = serde_json::to_value(&failure)?;
                    return json_response(StatusCode::UNPROCESSABLE_ENTITY.as_u16(), &[], &body);
                }
            }
        }

        let delay = route.delay.calculate();
        debug!(
            method = %ctx.method,
            path = %ctx.path,
            status = route.status,
            delay_ms = delay.as_millis() as u64,
            "Scheduling mock response"
        );

        self.scheduler
            .schedule(delay, || {
                json_response(route.status, &self.headers, &route.response)
            })
            .await
    }
}

/// Build a JSON response with the given status and extra headers.
fn json_response(
    status: u16,
    headers: &[(HeaderName, HeaderValue)],
    body: &Value,
) -> Result<Response, DispatchError> {
    let bytes = serde_json::to_vec(body)?;

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        if name != header::CONTENT_TYPE {
            builder = builder.header(name, value);
        }
    }

    Ok(builder.body(Body::from(bytes))?)
}

/// Generic 500 used for every unclassified failure.
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": INTERNAL_ERROR_MESSAGE })),
    )
        .into_response()
}

/// Convert a handler panic into the generic 500, logging the payload.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "Handler panicked");
    internal_error_response()
}
