//! Origin fixtures modelled on a small data-grid web app.

use serde_json::json;
use stash_cache::InterceptorConfig;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const INDEX_HTML: &str = "<!doctype html><title>Grid</title><div id=root></div>";
pub const MAIN_CSS: &str = "body { margin: 0 }";
pub const MAIN_JS: &str = "console.log('grid')";
pub const PLOTLY_JS: &str = "window.Plotly = {}";

/// A wiremock origin serving the app shell, a vendor script and a JSON API.
pub struct GridApp {
    pub server: MockServer,
}

impl GridApp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        mount_shell(&server).await;
        mount_api(&server).await;
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Interceptor configuration whose manifests match the mounted routes.
    pub fn config() -> InterceptorConfig {
        InterceptorConfig {
            static_manifest: vec![
                "/".to_string(),
                "/static/css/main.css".to_string(),
                "/static/js/main.js".to_string(),
                "/manifest.json".to_string(),
            ],
            dynamic_manifest: vec!["/vendor/plotly.min.js".to_string()],
            ..Default::default()
        }
    }

    /// Count of requests the origin received for `p`.
    pub async fn hits(&self, p: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == p)
            .count()
    }
}

async fn mount_get(server: &MockServer, p: &str, content_type: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", content_type)
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn mount_shell(server: &MockServer) {
    mount_get(server, "/", "text/html", INDEX_HTML).await;
    mount_get(server, "/static/css/main.css", "text/css", MAIN_CSS).await;
    mount_get(server, "/static/js/main.js", "application/javascript", MAIN_JS).await;
    mount_get(
        server,
        "/manifest.json",
        "application/json",
        r#"{"name":"Grid"}"#,
    )
    .await;
    mount_get(
        server,
        "/vendor/plotly.min.js",
        "application/javascript",
        PLOTLY_JS,
    )
    .await;
    mount_get(server, "/about", "text/html", "<p>about</p>").await;
}

async fn mount_api(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/grid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": ["id", "name"],
            "rows": 2
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/table/data"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 1,
            "rows": [[1, "a"], [2, "b"]]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/grid/rows"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 3 })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(server)
        .await;
}
