//! Route compilation and server assembly.
//!
//! [`compile`] turns a [`ShamConfig`] into a [`MockServer`]: one axum handler
//! per (method, path), all sharing read-only dispatchers.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query},
    http::{Method, Uri},
    routing::{MethodFilter, MethodRouter},
    Router,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::{HttpMethod, ShamConfig};
use crate::dispatch::{panic_response, Dispatcher, RequestContext};
use crate::error::ConfigError;

/// Delays above this are accepted but logged as suspicious.
const SUSPICIOUS_DELAY_MS: u64 = 5 * 60 * 1000;

impl HttpMethod {
    fn filter(&self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
            HttpMethod::Head => MethodFilter::HEAD,
            HttpMethod::Options => MethodFilter::OPTIONS,
        }
    }
}

/// A compiled (method, path) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub method: HttpMethod,
    pub path: String,
}

/// A compiled mock server, ready to listen.
pub struct MockServer {
    router: Router,
    routes: Vec<RouteKey>,
}

/// Compile a configuration into a server.
///
/// Fails without side effects if any descriptor is invalid.
pub fn compile(config: ShamConfig) -> Result<MockServer, ConfigError> {
    config.validate()?;

    let settings = config.settings;
    let mut by_path: BTreeMap<String, Vec<Arc<Dispatcher>>> = BTreeMap::new();
    let mut routes = Vec::with_capacity(config.routes.len());

    for (index, route) in config.routes.into_iter().enumerate() {
        if route.delay.max_ms() > SUSPICIOUS_DELAY_MS {
            warn!(
                method = %route.method,
                path = %route.path,
                delay_ms = route.delay.max_ms(),
                "Route delay exceeds five minutes"
            );
        }

        let pattern = route.route_pattern();
        routes.push(RouteKey {
            method: route.method,
            path: route.path.clone(),
        });
        by_path
            .entry(pattern)
            .or_default()
            .push(Arc::new(Dispatcher::new(index, route, &settings)?));
    }

    let mut router = Router::new();
    for (pattern, dispatchers) in by_path {
        let method_router = dispatchers
            .into_iter()
            .fold(MethodRouter::new(), |acc, dispatcher| {
                let filter = dispatcher.route().method.filter();
                acc.on(
                    filter,
                    move |method: Method,
                          uri: Uri,
                          query: Result<Query<HashMap<String, String>>, QueryRejection>,
                          body: Bytes| async move {
                        let ctx = RequestContext {
                            method,
                            path: uri.path().to_string(),
                            query: query.map(|Query(q)| q).unwrap_or_default(),
                            body,
                        };
                        dispatcher.dispatch(ctx).await
                    },
                )
            });

        // axum panics on patterns it cannot register.
        router = panic::catch_unwind(AssertUnwindSafe(|| router.route(&pattern, method_router)))
            .map_err(|payload| ConfigError::RouterConflict {
                path: pattern.clone(),
                reason: panic_message(payload.as_ref()),
            })?;
    }

    let router = router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http());

    info!(routes = routes.len(), "Mock routes compiled");
    for key in &routes {
        info!(method = %key.method, path = %key.path, "Registered route");
    }

    Ok(MockServer { router, routes })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown router error".to_string()
    }
}

impl MockServer {
    /// The compiled (method, path) pairs, in declaration order.
    pub fn routes(&self) -> &[RouteKey] {
        &self.routes
    }

    /// The axum router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind `0.0.0.0:port` and serve until Ctrl-C.
    pub async fn listen(self, port: u16) -> std::io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;
        info!(address = %addr, "Server is running at http://localhost:{}", port);
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(address = %addr, routes = self.routes.len(), "Mock server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Mock server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
