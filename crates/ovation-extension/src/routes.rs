//! Extension route table.
//!
//! Routes registered by extensions live in a keyed map of
//! `(method, path) → handler`, attributed to the owning extension id, so
//! unload can truly revoke them instead of leaking registrations across
//! reload cycles. The HTTP layer dispatches into this table and converts a
//! handler failure into a structured error response; handler errors never
//! propagate to the host.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use ovation_core::BoxError;

/// Request data handed to an extension route handler.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Parsed JSON body; `Null` when the request had none.
    pub body: Value,
}

/// An extension-provided HTTP handler.
///
/// The returned value becomes the JSON response body; an `Err` is caught at
/// the boundary and converted into a structured error response.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, request: RouteRequest) -> Result<Value, BoxError>;
}

/// Dispatch errors surfaced to the HTTP layer.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no route for {method} {path}")]
    NotFound { method: String, path: String },

    #[error("route handler failed: {message}")]
    Handler { extension: String, message: String },
}

#[derive(Clone)]
struct RouteEntry {
    extension: String,
    handler: Arc<dyn RouteHandler>,
}

/// Summary of one registered route, for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub extension: String,
}

/// Removable, extension-attributed route map.
#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<(String, String), RouteEntry>>,
}

fn normalize(method: &str, path: &str) -> (String, String) {
    let method = method.to_uppercase();
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    (method, path)
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route owned by `extension`. Re-registering the same
    /// method and path replaces the previous handler with a logged notice.
    pub fn register(
        &self,
        extension: &str,
        method: &str,
        path: &str,
        handler: Arc<dyn RouteHandler>,
    ) {
        let key = normalize(method, path);
        let mut routes = self.routes.write();
        if let Some(previous) = routes.get(&key) {
            warn!(
                method = %key.0,
                path = %key.1,
                previous = %previous.extension,
                new = %extension,
                "Route re-registered, previous handler replaced"
            );
        }
        debug!(extension, method = %key.0, path = %key.1, "Route registered");
        routes.insert(
            key,
            RouteEntry {
                extension: extension.to_string(),
                handler,
            },
        );
    }

    /// Removes every route owned by `extension`; returns how many.
    pub fn remove_extension(&self, extension: &str) -> usize {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|_, entry| entry.extension != extension);
        let removed = before - routes.len();
        if removed > 0 {
            debug!(extension, removed, "Routes revoked");
        }
        removed
    }

    /// Dispatches a request to the matching handler.
    pub async fn dispatch(&self, request: RouteRequest) -> Result<Value, RouteError> {
        let key = normalize(&request.method, &request.path);
        let entry = {
            let routes = self.routes.read();
            routes.get(&key).cloned()
        };
        let Some(entry) = entry else {
            return Err(RouteError::NotFound {
                method: key.0,
                path: key.1,
            });
        };
        entry
            .handler
            .handle(request)
            .await
            .map_err(|e| RouteError::Handler {
                extension: entry.extension.clone(),
                message: e.to_string(),
            })
    }

    /// Lists registered routes.
    pub fn list(&self) -> Vec<RouteInfo> {
        self.routes
            .read()
            .iter()
            .map(|((method, path), entry)| RouteInfo {
                method: method.clone(),
                path: path.clone(),
                extension: entry.extension.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl RouteHandler for Echo {
        async fn handle(&self, request: RouteRequest) -> Result<Value, BoxError> {
            Ok(json!({"echo": request.body}))
        }
    }

    struct Boom;

    #[async_trait]
    impl RouteHandler for Boom {
        async fn handle(&self, _request: RouteRequest) -> Result<Value, BoxError> {
            Err("handler exploded".into())
        }
    }

    fn request(method: &str, path: &str) -> RouteRequest {
        RouteRequest {
            method: method.into(),
            path: path.into(),
            query: HashMap::new(),
            body: json!({"x": 1}),
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let table = RouteTable::new();
        table.register("ext", "get", "status", Arc::new(Echo));

        // Method case and leading slash are normalized.
        let out = table.dispatch(request("GET", "/status")).await.unwrap();
        assert_eq!(out["echo"]["x"], 1);
    }

    #[tokio::test]
    async fn handler_error_is_contained() {
        let table = RouteTable::new();
        table.register("bad", "POST", "/boom", Arc::new(Boom));
        table.register("good", "GET", "/ok", Arc::new(Echo));

        let err = table.dispatch(request("POST", "/boom")).await.unwrap_err();
        assert!(matches!(err, RouteError::Handler { .. }));

        // Other routes keep serving.
        assert!(table.dispatch(request("GET", "/ok")).await.is_ok());
    }

    #[tokio::test]
    async fn remove_extension_revokes_routes() {
        let table = RouteTable::new();
        table.register("ext", "GET", "/a", Arc::new(Echo));
        table.register("ext", "GET", "/b", Arc::new(Echo));
        table.register("other", "GET", "/c", Arc::new(Echo));

        assert_eq!(table.remove_extension("ext"), 2);
        assert_eq!(table.len(), 1);
        assert!(matches!(
            table.dispatch(request("GET", "/a")).await,
            Err(RouteError::NotFound { .. })
        ));
    }
}
