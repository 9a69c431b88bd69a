//! Router assembly and server lifecycle.

use axum::Router;
use axum::routing::{any, delete, get, post, put};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{automation, extensions, flows};
use crate::state::AppState;
use crate::{ext_routes, ws};

/// Builds the full management router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Extension management
        .route(
            "/api/extensions",
            get(extensions::list).post(extensions::upload),
        )
        .route("/api/extensions/reload", post(extensions::reload_all))
        .route(
            "/api/extensions/{id}",
            get(extensions::get).delete(extensions::delete),
        )
        .route("/api/extensions/{id}/enable", post(extensions::enable))
        .route("/api/extensions/{id}/disable", post(extensions::disable))
        .route("/api/extensions/{id}/reload", post(extensions::reload))
        .route("/api/extensions/{id}/logs", get(extensions::logs))
        // Flows
        .route("/api/flows", get(flows::list).post(flows::create))
        .route(
            "/api/flows/{id}",
            get(flows::get).put(flows::update).delete(flows::delete),
        )
        .route("/api/flows/{id}/toggle", post(flows::toggle))
        .route("/api/flows/{id}/test", post(flows::test))
        // Automation introspection
        .route("/api/automation/definitions", get(automation::definitions))
        .route("/api/automation/history", get(automation::history))
        .route("/api/automation/variables", get(automation::variables))
        .route(
            "/api/automation/variables/{name}",
            put(automation::set_variable).delete(automation::delete_variable),
        )
        .route(
            "/api/automation/flows/{id}/trigger",
            post(automation::trigger_flow),
        )
        .route("/api/automation/events", post(automation::inject_event))
        // Extension-registered routes
        .route("/ext/{id}/{*rest}", any(ext_routes::dispatch))
        // Channel hub
        .route("/ws", get(ws::upgrade))
        .with_state(state)
}

/// Binds `addr` and serves until the token is cancelled.
pub async fn serve(
    addr: &str,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Management server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    use ovation_core::{EventBus, EventSink, SettingsStore};
    use ovation_extension::{
        ChannelHub, ExtensionHost, HostConfig, HostServices, RouteTable,
    };
    use ovation_flow::{FlowEngine, Registries, TimerService, VariableStore, builtin};

    fn state(dir: &std::path::Path) -> AppState {
        let registries = Arc::new(Registries::new());
        builtin::install(&registries);

        let routes = Arc::new(RouteTable::new());
        let hub = Arc::new(ChannelHub::new());
        let services = HostServices {
            bus: Arc::new(EventBus::new()),
            routes: Arc::clone(&routes),
            channels: Arc::clone(&hub),
            settings: Arc::new(SettingsStore::in_memory()),
            registries: Arc::clone(&registries),
        };
        let host = Arc::new(
            ExtensionHost::new(
                HostConfig {
                    extensions_dir: dir.join("extensions"),
                    data_dir: dir.join("data"),
                    base_url: "http://127.0.0.1:0".into(),
                    max_reloads: 5,
                    log_capacity: 64,
                },
                services,
            )
            .unwrap(),
        );
        let engine = Arc::new(FlowEngine::new(
            registries,
            Arc::new(VariableStore::new()),
            32,
        ));
        let timers = Arc::new(TimerService::new(Arc::clone(&engine)));
        let (sink, _rx) = EventSink::channel(8);

        AppState {
            host,
            engine,
            timers,
            hub,
            routes,
            sink,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn flow_crud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()));

        let draft = json!({
            "name": "thanks",
            "trigger": "gift",
            "actions": [{"type": "log", "params": {"message": "Thanks {username}!"}}],
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/flows")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(draft.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let flow = body_json(response).await;
        let id = flow["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(Request::get("/api/flows").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let list = body_json(response).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/api/flows/{id}/toggle"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let toggled = body_json(response).await;
        assert_eq!(toggled["enabled"], false);

        let response = app
            .oneshot(
                Request::delete(format!("/api/flows/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_flow_with_unknown_trigger_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()));

        let draft = json!({"name": "bad", "trigger": "nope", "actions": []});
        let response = app
            .oneshot(
                Request::post("/api/flows")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(draft.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "bad_request");
    }

    #[tokio::test]
    async fn definitions_include_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()));

        let response = app
            .oneshot(
                Request::get("/api/automation/definitions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let catalog = body_json(response).await;
        let triggers: Vec<&str> = catalog["triggers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["tag"].as_str().unwrap())
            .collect();
        assert!(triggers.contains(&"gift"));
        assert!(triggers.contains(&"timer"));
        assert!(!catalog["operators"].as_array().unwrap().is_empty());
        assert!(!catalog["actions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn variables_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()));

        let response = app
            .clone()
            .oneshot(
                Request::put("/api/automation/variables/goal")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"value": 1000}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/automation/variables")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let vars = body_json(response).await;
        assert_eq!(vars["goal"]["value"], 1000);

        let response = app
            .oneshot(
                Request::delete("/api/automation/variables/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_without_manifest_is_rejected_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()));

        let package = ovation_extension::installer::build_package(&[("README.md", "nope")]);
        let boundary = "X-OVATION-BOUNDARY";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"package\"; filename=\"ext.tar.gz\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: application/gzip\r\n\r\n");
        body.extend_from_slice(&package);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let response = app
            .oneshot(
                Request::post("/api/extensions")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // No extension directory was created.
        let extensions_dir = dir.path().join("extensions");
        let children: Vec<_> = std::fs::read_dir(&extensions_dir)
            .map(|entries| entries.filter_map(Result::ok).collect())
            .unwrap_or_default();
        assert!(children.is_empty());
    }

    #[tokio::test]
    async fn extension_route_errors_are_structured() {
        use async_trait::async_trait;
        use ovation_core::BoxError;
        use ovation_extension::{RouteHandler, RouteRequest};

        struct Boom;
        #[async_trait]
        impl RouteHandler for Boom {
            async fn handle(&self, _request: RouteRequest) -> Result<Value, BoxError> {
                Err("handler exploded".into())
            }
        }
        struct Fine;
        #[async_trait]
        impl RouteHandler for Fine {
            async fn handle(&self, _request: RouteRequest) -> Result<Value, BoxError> {
                Ok(json!("ok"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        state
            .routes
            .register("bad", "GET", "/bad/boom", Arc::new(Boom));
        state
            .routes
            .register("good", "GET", "/good/ping", Arc::new(Fine));
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/ext/bad/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "extension_error");

        // The process keeps serving other routes.
        let response = app
            .oneshot(Request::get("/ext/good/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"], "ok");
    }
}
