//! `ReqwestFetcher` against a wiremock origin.

use pretty_assertions::assert_eq;
use stash_cache::ReqwestFetcher;
use stash_core::{FetchRequest, Fetcher, Method};
use tokio_test::assert_ok;
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_forwards_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/grid/rows/3"))
        .and(header("x-grid-token", "abc"))
        .and(body_string(r#"{"name":"c"}"#))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let request = FetchRequest::new(Method::Put, url(&server, "/api/v1/grid/rows/3"))
        .with_header("x-grid-token", "abc")
        .with_header("Connection", "keep-alive")
        .with_body(br#"{"name":"c"}"#.to_vec());

    let response = assert_ok!(ReqwestFetcher::new().unwrap().fetch(&request).await);
    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn test_keeps_response_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/static/js/main.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/javascript")
                .insert_header("etag", "\"abc\"")
                .set_body_string("console.log(1)"),
        )
        .mount(&server)
        .await;

    let request = FetchRequest::get(url(&server, "/static/js/main.js"));
    let response = assert_ok!(ReqwestFetcher::new().unwrap().fetch(&request).await);

    assert_eq!(response.header("Content-Type"), Some("application/javascript"));
    assert_eq!(response.header("etag"), Some("\"abc\""));
    assert!(response.header("content-length").is_none());
    assert_eq!(response.body_text(), "console.log(1)");
}

#[tokio::test]
async fn test_error_status_is_a_completed_fetch() {
    let server = MockServer::start().await;

    let request = FetchRequest::get(url(&server, "/missing"));
    let response = assert_ok!(ReqwestFetcher::new().unwrap().fetch(&request).await);
    assert_eq!(response.status, 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_redirects_are_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&server)
        .await;

    let request = FetchRequest::get(url(&server, "/old"));
    let response = assert_ok!(ReqwestFetcher::new().unwrap().fetch(&request).await);
    assert_eq!(response.status, 302);
    assert_eq!(response.header("location"), Some("/new"));
}
