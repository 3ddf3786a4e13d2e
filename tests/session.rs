//! `Session` against a mock Earth Engine REST endpoint.

use std::collections::BTreeMap;

use gee_export::{
    AuthSource, DownloadRequest, EarthEngine, ExportConfig, ExportError, ExportRequest,
    Expression, Session, TaskState, ValueNode,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

fn config(server: &ServerGuard) -> ExportConfig {
    ExportConfig {
        api_url: server.url(),
        project: "demo".into(),
        bucket: "exports".into(),
        auth: AuthSource::AccessToken("ya29.test".into()),
        verify: true,
    }
}

fn connected(server: &mut ServerGuard) -> (Session, Mock) {
    let probe = server
        .mock("GET", "/v1/projects/demo/config")
        .match_header("authorization", "Bearer ya29.test")
        .with_status(200)
        .with_body(r#"{"name":"projects/demo/config"}"#)
        .create();
    (Session::connect(&config(server)).unwrap(), probe)
}

fn expression() -> Expression {
    Expression {
        result: "0".into(),
        values: BTreeMap::from([(
            "0".to_string(),
            ValueNode::invoke(
                "Image.load",
                [("id", ValueNode::constant("USGS/SRTMGL1_003"))],
            ),
        )]),
    }
}

#[test]
fn connect_probes_project_with_bearer_token() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    assert_eq!(session.project(), "demo");
}

#[test]
fn unregistered_project_fails_initialization() {
    let mut server = Server::new();
    let _m = server
        .mock("GET", "/v1/projects/demo/config")
        .with_status(403)
        .with_body(
            r#"{"error":{"code":403,"message":"Project demo is not registered to use Earth Engine.","status":"PERMISSION_DENIED"}}"#,
        )
        .create();
    let err = Session::connect(&config(&server)).unwrap_err();
    assert!(matches!(err, ExportError::Initialization(_)));
    let text = err.to_string();
    assert!(text.contains("project demo is not usable"), "{text}");
    assert!(text.contains("not registered"), "{text}");
}

#[test]
fn compute_value_returns_result_field() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    let m = server
        .mock("POST", "/v1/projects/demo/value:compute")
        .match_body(Matcher::PartialJson(json!({ "expression": { "result": "0" } })))
        .with_status(200)
        .with_body(r#"{"result":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}"#)
        .create();

    let value = session.compute_value(&expression()).unwrap();
    assert_eq!(value["type"], "Polygon");
    m.assert();
}

#[test]
fn download_url_points_at_get_pixels() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    let _m = server
        .mock("POST", Matcher::Regex("^/v1/projects/demo/thumbnails".into()))
        .match_body(Matcher::PartialJson(json!({ "fileFormat": "GEO_TIFF" })))
        .with_status(200)
        .with_body(r#"{"name":"projects/demo/thumbnails/abc123"}"#)
        .create();

    let url = session
        .download_url(&DownloadRequest::geotiff(expression()))
        .unwrap();
    assert_eq!(
        url,
        format!("{}/v1/projects/demo/thumbnails/abc123:getPixels", server.url())
    );
}

#[test]
fn size_limit_message_survives_error_formatting() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    let _m = server
        .mock("POST", Matcher::Regex("^/v1/projects/demo/thumbnails".into()))
        .with_status(400)
        .with_body(
            r#"{"error":{"code":400,"message":"Total request size (56623104 bytes) must be less than or equal to 50331648 bytes.","status":"INVALID_ARGUMENT"}}"#,
        )
        .create();

    let err = session
        .download_url(&DownloadRequest::geotiff(expression()))
        .unwrap_err();
    assert!(format!("{err:#}").contains("Total request size"));
}

#[test]
fn start_export_returns_operation_name() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    let _m = server
        .mock("POST", "/v1/projects/demo/image:export")
        .match_body(Matcher::PartialJson(json!({
            "maxPixels": "10000000000000",
            "fileExportOptions": {
                "fileFormat": "GEO_TIFF",
                "cloudStorageDestination": { "bucket": "exports", "filenamePrefix": "export_1_abcdef01" }
            }
        })))
        .with_status(200)
        .with_body(
            r#"{"name":"projects/demo/operations/OP1","metadata":{"state":"PENDING"},"done":false}"#,
        )
        .create();

    let request = ExportRequest::geotiff_to_bucket(
        expression(),
        "gee_export",
        "exports",
        "export_1_abcdef01",
        10_000_000_000_000,
    );
    assert_eq!(
        session.start_export(&request).unwrap(),
        "projects/demo/operations/OP1"
    );
}

#[test]
fn operation_status_parses_destination_uris() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    let _m = server
        .mock("GET", "/v1/projects/demo/operations/OP1")
        .with_status(200)
        .with_body(
            r#"{"name":"projects/demo/operations/OP1","done":true,
                "metadata":{"state":"SUCCEEDED","destinationUris":["gs://exports/export_1_abcdef01.tif"]}}"#,
        )
        .create();

    let status = session
        .operation_status("projects/demo/operations/OP1")
        .unwrap();
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.destination_uris, vec!["gs://exports/export_1_abcdef01.tif"]);
    assert_eq!(status.raw["done"], true);
}

#[test]
fn cancel_posts_to_operation() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    let m = server
        .mock("POST", "/v1/projects/demo/operations/OP1:cancel")
        .with_status(200)
        .with_body("{}")
        .create();

    session
        .cancel_operation("projects/demo/operations/OP1")
        .unwrap();
    m.assert();
}

#[test]
fn non_json_error_bodies_are_reported() {
    let mut server = Server::new();
    let (session, _probe) = connected(&mut server);
    let _m = server
        .mock("GET", "/v1/projects/demo/operations/OP1")
        .with_status(502)
        .with_body("Bad Gateway")
        .create();

    let err = session
        .operation_status("projects/demo/operations/OP1")
        .unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("502"), "{text}");
    assert!(text.contains("Bad Gateway"), "{text}");
}
