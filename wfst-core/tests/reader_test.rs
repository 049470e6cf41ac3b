use std::time::Duration;

use serde_json::{json, Value};
use wfst::{CancelToken, ClientConfig, Geometry, ReadParams, WfsClient, WfsError, FID_PROPERTY};
use wfst_test_utils::{load_fixture_text, MockResponse, MockServer};

const PROXY_PATH: &str = "/api/ogc/wfst/proxy/roads";

fn client_for(server: &MockServer) -> WfsClient {
    WfsClient::new(ClientConfig::new(server.api_base(), server.origin())).unwrap()
}

fn roads_layer(url: &str) -> Value {
    json!({
        "id": "roads",
        "caption": "Roads",
        "projection": "EPSG:3006",
        "layers": ["ws:roads"],
        "geometryField": "geom",
        "uri": "http://example.org/ws",
        "url": url
    })
}

async fn server_with_body(response: MockResponse) -> MockServer {
    let server = MockServer::start().await.unwrap();
    server.mock_layer("roads", &roads_layer(PROXY_PATH));
    server.mock("GET", PROXY_PATH, response);
    server
}

#[tokio::test]
async fn reads_gml3_through_the_proxy() {
    let body = load_fixture_text("getfeature/roads_gml3.xml").unwrap();
    let server = server_with_body(MockResponse::xml(body)).await;

    let collection = client_for(&server)
        .read_features("roads", &ReadParams::default(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(collection.len(), 2);
    assert_eq!(collection.crs_name, "EPSG:3006");
    assert_eq!(collection.layer_projection, "EPSG:3006");
    assert_eq!(collection.crs_urn.as_deref(), Some("urn:ogc:def:crs:EPSG::3006"));
    assert_eq!(collection.geometry_name.as_deref(), Some("geom"));
    assert_eq!(collection.features[0].id.as_deref(), Some("roads.1"));
    assert_eq!(collection.features[1].properties["name"], json!("Lillgatan"));

    let request = &server.requests_to(PROXY_PATH)[0];
    assert_eq!(request.query_param("SERVICE").as_deref(), Some("WFS"));
    assert_eq!(request.query_param("REQUEST").as_deref(), Some("GetFeature"));
    assert_eq!(request.query_param("VERSION").as_deref(), Some("1.1.0"));
    assert_eq!(request.query_param("TYPENAME").as_deref(), Some("ws:roads"));
    assert_eq!(request.query_param("SRSNAME").as_deref(), Some("EPSG:3006"));
}

#[tokio::test]
async fn wfs_members_fall_back_to_gml2() {
    let body = load_fixture_text("getfeature/roads_wfs_member.xml").unwrap();
    let server = server_with_body(MockResponse::xml(body)).await;

    let collection = client_for(&server)
        .read_features("roads", &ReadParams::default(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(collection.len(), 1);
    let feature = &collection.features[0];
    assert_eq!(feature.id.as_deref(), Some("roads.7"));
    assert_eq!(
        feature.geometry,
        Some(Geometry::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![10.0, 0.0],
            vec![10.0, 10.0],
            vec![0.0, 0.0],
        ]]))
    );
}

#[tokio::test]
async fn geojson_features_get_fid_and_plain_keys() {
    let body = load_fixture_text("getfeature/roads.geojson").unwrap();
    let server = server_with_body(MockResponse::text(200, "application/json", body)).await;

    let params = ReadParams {
        srs_name: Some("EPSG:4326".to_string()),
        max_features: Some(50),
        cql_filter: Some("lanes > 1".to_string()),
        output_format: Some("application/json".to_string()),
        ..ReadParams::default()
    };
    let collection = client_for(&server)
        .read_features("roads", &params, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(collection.crs_name, "EPSG:4326");
    assert_eq!(collection.layer_projection, "EPSG:3006");
    assert_eq!(collection.geometry_name.as_deref(), Some("geom"));
    let first = &collection.features[0];
    assert_eq!(first.properties[FID_PROPERTY], json!("roads.1"));
    assert_eq!(first.properties["name"], json!("Storgatan"));
    assert!(collection.features[1].geometry.is_none());

    let request = &server.requests_to(PROXY_PATH)[0];
    assert_eq!(request.query_param("MAXFEATURES").as_deref(), Some("50"));
    assert_eq!(request.query_param("CQL_FILTER").as_deref(), Some("lanes > 1"));
    assert_eq!(request.query_param("OUTPUTFORMAT").as_deref(), Some("application/json"));
    assert_eq!(request.query_param("BBOX"), None);
}

#[tokio::test]
async fn absolute_layer_urls_are_used_directly() {
    let server = MockServer::start().await.unwrap();
    server.mock_layer("roads", &roads_layer(&server.url("/geoserver/wfs")));
    server.mock(
        "GET",
        "/geoserver/wfs",
        MockResponse::xml(load_fixture_text("getfeature/roads_gml3.xml").unwrap()),
    );

    let collection = client_for(&server)
        .read_features("roads", &ReadParams::default(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(collection.len(), 2);
    assert_eq!(server.requests_to("/geoserver/wfs").len(), 1);
}

#[tokio::test]
async fn exception_report_is_protocol_error() {
    let body = load_fixture_text("getfeature/exception_report.xml").unwrap();
    let server = server_with_body(MockResponse::xml(body)).await;

    let err = client_for(&server)
        .read_features("roads", &ReadParams::default(), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WfsError::Protocol(message) if message.contains("ws:roads unknown")));
}

#[tokio::test]
async fn non_xml_body_is_format_error() {
    let server =
        server_with_body(MockResponse::text(200, "text/html", "<html><body>Bad gateway")).await;

    let err = client_for(&server)
        .read_features("roads", &ReadParams::default(), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WfsError::Format(_)));
}

#[tokio::test]
async fn server_error_is_retryable_upstream_error() {
    let server = server_with_body(MockResponse::status(503, "maintenance")).await;

    let err = client_for(&server)
        .read_features("roads", &ReadParams::default(), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.is_retryable_read());
}

#[tokio::test]
async fn layer_without_type_name_fails_before_getfeature() {
    let server = MockServer::start().await.unwrap();
    server.mock_layer("roads", &json!({"id": "roads", "layers": [], "url": PROXY_PATH}));

    let err = client_for(&server)
        .read_features("roads", &ReadParams::default(), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WfsError::Configuration(_)));
    assert!(server.requests_to(PROXY_PATH).is_empty());
}

#[tokio::test]
async fn cancelling_aborts_the_read() {
    let body = load_fixture_text("getfeature/roads_gml3.xml").unwrap();
    let server =
        server_with_body(MockResponse::xml(body).delayed(Duration::from_secs(10))).await;
    let client = client_for(&server);
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .read_features("roads", &ReadParams::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, WfsError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancelled_token_sends_nothing() {
    let server = MockServer::start().await.unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = client_for(&server)
        .read_features("roads", &ReadParams::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, WfsError::Cancelled));
    assert!(server.requests().is_empty());
}
