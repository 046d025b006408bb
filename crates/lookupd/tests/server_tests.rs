//! Router behavior with fake upstreams.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use lookupd::config::compile_pattern;
use lookupd::{
    AppState, Config, GoogleplayHandler, IpinfoHandler, Quiesce, ServerHandle, router,
};
use lookupd_net::{Dialer, DialerConfig, Resolver, ResolverConfig, Transport, TransportConfig};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_REGEX: &str = r#"id=([\w.]+)" title="([^"]+)""#;
const IPINFO_REGEX: &str = r"loc=\[([^\]]+)\] isp=\[([^\]]+)\]";
const SEARCH_PAGE: &str = r#"<a href="/store/apps/details?id=com.whatsapp" title="WhatsApp Messenger">"#;

fn transport() -> Transport {
    let resolver = Arc::new(Resolver::new(ResolverConfig::default()));
    let dialer = Arc::new(Dialer::new(resolver, DialerConfig::default()).unwrap());
    Transport::new(dialer, TransportConfig::default())
}

fn state(server: &MockServer) -> AppState {
    let transport = transport();
    let ipinfo = IpinfoHandler::new(
        transport.clone(),
        format!("{}/ip/%s", server.uri()),
        compile_pattern("regex", IPINFO_REGEX).unwrap(),
        Duration::from_secs(60),
        100,
    );
    let googleplay = GoogleplayHandler::new(
        transport,
        format!("{}/store/search?q=%s&c=apps", server.uri()),
        compile_pattern("search_regex", SEARCH_REGEX).unwrap(),
        Duration::from_secs(60),
        100,
    );
    AppState::new(ipinfo, googleplay)
}

fn app(state: AppState) -> Router {
    router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn post_json(app: Router, uri: &str, body: &str) -> Value {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

async fn get_json(app: Router, uri: &str) -> Value {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

async fn mount_search(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/store/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SEARCH_PAGE))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_index_usage() {
    let server = MockServer::start().await;
    let (status, body) = send(
        app(state(&server)),
        Request::get("/").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("Usage:"));
    assert!(text.contains("/lookup-title"));
}

#[tokio::test]
async fn test_lookup_title_route() {
    let server = MockServer::start().await;
    mount_search(&server).await;
    let app = app(state(&server));

    let body = r#"{"title":"WhatsApp Messenger","geo":"IN"}"#;
    let first = post_json(app.clone(), "/lookup-title", body).await;
    assert_eq!(first, json!({"status": 200, "pkg_name": "com.whatsapp"}));

    let second = post_json(app, "/lookup-title", body).await;
    assert_eq!(second, first);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_lookup_pkgname_route_not_found() {
    let server = MockServer::start().await;
    mount_search(&server).await;

    let response = post_json(
        app(state(&server)),
        "/lookup-pkgname",
        r#"{"pkg_name":"com.nonexistent","geo":"US"}"#,
    )
    .await;
    assert_eq!(response, json!({"status": 204}));
}

#[tokio::test]
async fn test_bad_request_body() {
    let server = MockServer::start().await;

    let response = post_json(app(state(&server)), "/lookup-title", "{not json").await;
    assert_eq!(response["status"], 204);
    assert!(response["error"].as_str().unwrap().starts_with("bad request"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upstream_failure_reported_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = post_json(
        app(state(&server)),
        "/lookup-title",
        r#"{"title":"Telegram","geo":"IN"}"#,
    )
    .await;
    assert_eq!(
        response,
        json!({"status": 204, "error": "upstream returned HTTP 500"})
    );
}

#[tokio::test]
async fn test_ipinfo_route() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip/127.0.0.1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("loc=[Mountain View] isp=[Example Networks]"),
        )
        .mount(&server)
        .await;

    let response = get_json(app(state(&server)), "/ipinfo/127.0.0.1").await;
    assert_eq!(
        response,
        json!({"location": "Mountain View", "isp": "Example Networks"})
    );
}

#[tokio::test]
async fn test_ipinfo_defaults_to_remote_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip/127.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("loc=[Here] isp=[Loopback]"))
        .expect(1)
        .mount(&server)
        .await;

    let response = get_json(app(state(&server)), "/ipinfo/").await;
    assert_eq!(response, json!({"location": "Here", "isp": "Loopback"}));
}

#[tokio::test]
async fn test_ipinfo_no_match_reports_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("nothing here"))
        .mount(&server)
        .await;

    let response = get_json(app(state(&server)), "/ipinfo/9.9.9.9").await;
    assert_eq!(response, json!({"error": "empty"}));
}

#[tokio::test]
async fn test_ipinfo_rejects_non_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("loc=[X] isp=[Y]"))
        .mount(&server)
        .await;
    let app = app(state(&server));

    for uri in ["/ipinfo/not-an-ip", "/ipinfo/..%2F..%2Fadmin", "/ipinfo/1.2.3.4%3Fq=x"] {
        let response = get_json(app.clone(), uri).await;
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("bad request"), "{uri}: {error}");
        assert!(response.get("location").is_none());
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ipinfo_ipv6_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip/2001:db8::1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("loc=[Lab] isp=[Docs]"))
        .expect(1)
        .mount(&server)
        .await;

    let response = get_json(app(state(&server)), "/ipinfo/2001:db8:0::1").await;
    assert_eq!(response, json!({"location": "Lab", "isp": "Docs"}));
}

#[tokio::test]
async fn test_served_over_tuned_listener() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip/127.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("loc=[Socket] isp=[Loopback]"))
        .expect(1)
        .mount(&server)
        .await;

    let listener = lookupd_net::listener::bind("127.0.0.1:0").await.unwrap();
    let mut handle = ServerHandle::spawn(listener, router(state(&server))).unwrap();
    let url = format!("http://{}/ipinfo/", handle.local_addr());

    let response = transport().get(&url, &[]).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({"location": "Socket", "isp": "Loopback"}));

    handle.begin_quiesce();
    assert!(handle.await_drain(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("loc=[Late] isp=[Late]")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let state = state(&server).request_timeout(Some(Duration::from_millis(100)));
    let response = get_json(app(state), "/ipinfo/1.1.1.1").await;
    assert_eq!(response, json!({"error": "deadline exceeded"}));
}

#[tokio::test]
async fn test_state_from_config_with_hosts_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/store/search"))
        .and(query_param("q", "WhatsApp Messenger"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SEARCH_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    let port = server.address().port();

    let mut hosts = tempfile::NamedTempFile::new().unwrap();
    writeln!(hosts, "# fixtures").unwrap();
    writeln!(hosts, "127.0.0.1 play.test").unwrap();

    let text = format!(
        r#"
        [default]
        listen_addr = "127.0.0.1:0"
        request_timeout = 5

        [ipinfo]
        url = "http://ip.test:{port}/ip/%s"
        regex = 'loc=\[([^\]]+)\] isp=\[([^\]]+)\]'
        cache_ttl = 60

        [googleplay]
        search_url = "http://play.test:{port}/store/search?q=%s&c=apps"
        search_regex = '{SEARCH_REGEX}'
        search_ttl = 60

        [resolver]
        hosts_file = "{}"
        "#,
        hosts.path().display()
    );
    let config = Config::from_toml_str(&text).unwrap();
    let state = AppState::from_config(&config).unwrap();
    assert_eq!(state.request_timeout, Some(Duration::from_secs(5)));

    let response = post_json(
        app(state),
        "/lookup-title",
        r#"{"title":"WhatsApp Messenger","geo":"IN"}"#,
    )
    .await;
    assert_eq!(response, json!({"status": 200, "pkg_name": "com.whatsapp"}));
}

#[tokio::test]
async fn test_state_from_config_missing_hosts_file() {
    let text = r#"
        [ipinfo]
        url = "http://ip.test/ip/%s"
        regex = '(a)(b)'
        cache_ttl = 60

        [googleplay]
        search_url = "http://play.test/search?q=%s"
        search_regex = '(a)(b)'
        search_ttl = 60

        [resolver]
        hosts_file = "/nonexistent/hosts"
    "#;
    let config = Config::from_toml_str(text).unwrap();
    let err = AppState::from_config(&config).unwrap_err();
    assert!(matches!(err, lookupd::Error::ConfigInvalid(_)));
}
