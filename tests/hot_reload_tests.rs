use http::{Method, StatusCode};
use oasgate::dispatcher::HandlerRegistry;
use oasgate::hot_reload::{watch_spec, watch_spec_with};
use oasgate::{ApiRequest, ApiResponse, OpenApiValidator, ValidatorOptions};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::temp_files::create_temp_yaml;

const SPEC_V1: &str = r#"openapi: 3.1.0
info:
  title: Reload Test
  version: '1.0'
paths:
  /foo:
    get:
      operationId: foo_one
      responses:
        '200': { description: OK }
"#;

const SPEC_V2: &str = r#"openapi: 3.1.0
info:
  title: Reload Test
  version: '1.0'
paths:
  /bar:
    get:
      operationId: bar_two
      responses:
        '200': { description: OK }
"#;

fn ok() -> impl FnOnce(oasgate::HandlerRequest) -> std::future::Ready<anyhow::Result<ApiResponse>> {
    |_| std::future::ready(Ok(ApiResponse::empty(200)))
}

#[tokio::test]
async fn test_watch_spec_reload() {
    let file = create_temp_yaml(SPEC_V1);
    let validator = Arc::new(
        OpenApiValidator::from_path(file.path(), ValidatorOptions::default(), HandlerRegistry::new()).unwrap(),
    );

    let (tx, rx) = mpsc::channel();
    let _watcher = watch_spec_with(file.path(), Arc::clone(&validator), move |version| {
        let _ = tx.send(version.clone());
    })
    .unwrap();

    std::fs::write(file.path(), SPEC_V2).unwrap();
    let version = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(version.version >= 2);
    // Editors and `fs::write` can emit several events; wait for the final content.
    for _ in 0..50 {
        if validator.snapshot().table.operations().any(|op| &*op.path_template == "/bar") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let resp = validator
        .handle(ApiRequest::new(Method::GET, "/bar"), ok())
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    let err = validator
        .handle(ApiRequest::new(Method::GET, "/foo"), ok())
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_broken_document_keeps_previous_snapshot() {
    let file = create_temp_yaml(SPEC_V1);
    let validator = Arc::new(
        OpenApiValidator::from_path(file.path(), ValidatorOptions::default(), HandlerRegistry::new()).unwrap(),
    );
    let _watcher = watch_spec(file.path(), Arc::clone(&validator)).unwrap();

    std::fs::write(file.path(), "openapi: [not, a, document").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(validator.snapshot().version.version, 1);
    let resp = validator
        .handle(ApiRequest::new(Method::GET, "/foo"), ok())
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[test]
fn test_reload_from_path_reports_errors() {
    let file = create_temp_yaml(SPEC_V1);
    let validator =
        OpenApiValidator::from_path(file.path(), ValidatorOptions::default(), HandlerRegistry::new()).unwrap();
    std::fs::write(file.path(), "paths: 12").unwrap();
    assert!(validator.reload_from_path(file.path()).is_err());

    std::fs::write(file.path(), SPEC_V2).unwrap();
    let version = validator.reload_from_path(file.path()).unwrap();
    assert_eq!(version.version, 2);
    assert_eq!(validator.snapshot().table.len(), 1);
}
