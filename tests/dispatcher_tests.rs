use http::{Method, StatusCode};
use oasgate::dispatcher::{handler, HandlerModule, HandlerRegistry};
use oasgate::{load_spec_from_str, ApiRequest, ApiResponse, ConfigError, DocumentFormat, OpenApiValidator, ValidatorOptions};
use serde_json::json;

const SPEC: &str = r#"
openapi: 3.1.0
info:
  title: Handlers
  version: "1.0"
servers:
  - url: /v2
paths:
  /products:
    get:
      operationId: list
      x-eov-operation-handler: products
      responses:
        "200": { description: ok }
  /products/{id}:
    get:
      operationId: getProduct
      x-eov-operation-id: show
      x-eov-operation-handler: products
      parameters:
        - name: id
          in: path
          required: true
          schema: { type: integer }
      responses:
        "200": { description: ok }
  /health:
    get:
      responses:
        "200": { description: ok }
"#;

fn products_module() -> HandlerModule {
    HandlerModule::new()
        .export(
            "list",
            handler(|_| async { Ok(ApiResponse::json(200, json!(["a", "b"]))) }),
        )
        .default_export(
            "show",
            handler(|req| async move {
                let id = req.context.and_then(|c| c.path_param("id"));
                Ok(ApiResponse::json(200, json!({ "id": id })))
            }),
        )
}

fn options(base: &str) -> ValidatorOptions {
    ValidatorOptions::builder().operation_handlers(base).build().unwrap()
}

fn validator(spec: &str, registry: HandlerRegistry) -> Result<OpenApiValidator, ConfigError> {
    let spec = load_spec_from_str(spec, DocumentFormat::Yaml).unwrap();
    OpenApiValidator::with_handlers(&spec, options("handlers"), registry)
}

#[tokio::test]
async fn test_bound_handler_replaces_next() {
    let registry = HandlerRegistry::new().with_module("handlers/products", products_module());
    let v = validator(SPEC, registry).unwrap();
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/v2/products"), |_| async {
            Ok(ApiResponse::empty(599))
        })
        .await
        .unwrap();
    assert_eq!(resp.body, Some(json!(["a", "b"])));
}

#[tokio::test]
async fn test_extension_id_wins_and_default_export_resolves() {
    let registry = HandlerRegistry::new().with_module("handlers/products", products_module());
    let v = validator(SPEC, registry).unwrap();
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/v2/products/7"), |_| async {
            Ok(ApiResponse::empty(599))
        })
        .await
        .unwrap();
    assert_eq!(resp.body, Some(json!({"id": 7})));
}

#[tokio::test]
async fn test_unbound_operation_falls_back_to_next() {
    let registry = HandlerRegistry::new().with_module("handlers/products", products_module());
    let v = validator(SPEC, registry).unwrap();
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/v2/health"), |_| async {
            Ok(ApiResponse::empty(204))
        })
        .await
        .unwrap();
    assert_eq!(resp.status, 204);
}

#[tokio::test]
async fn test_validation_runs_before_bound_handler() {
    let registry = HandlerRegistry::new().with_module("handlers/products", products_module());
    let v = validator(SPEC, registry).unwrap();
    let err = v
        .handle(ApiRequest::new(Method::GET, "/v2/products/seven"), |_| async {
            Ok(ApiResponse::empty(599))
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_unregistered_module_is_config_error() {
    let err = validator(SPEC, HandlerRegistry::new()).unwrap_err();
    match err {
        ConfigError::UnknownHandlerModule { module } => assert_eq!(module, "handlers/products"),
        other => panic!("expected UnknownHandlerModule, got {other}"),
    }
}

#[test]
fn test_missing_export_is_config_error() {
    let module = HandlerModule::new().export(
        "list",
        handler(|_| async { Ok(ApiResponse::empty(200)) }),
    );
    let registry = HandlerRegistry::new().with_module("handlers/products", module);
    let err = validator(SPEC, registry).unwrap_err();
    match err {
        ConfigError::UnresolvedHandler { operation_id, .. } => assert_eq!(operation_id, "show"),
        other => panic!("expected UnresolvedHandler, got {other}"),
    }
}

#[test]
fn test_operation_id_without_handler_module_is_config_error() {
    let spec = SPEC.replace("      x-eov-operation-handler: products\n      responses", "      responses");
    let registry = HandlerRegistry::new().with_module("handlers/products", products_module());
    let err = validator(&spec, registry).unwrap_err();
    assert!(matches!(err, ConfigError::MissingOperationHandler { .. }), "{err}");
    assert!(err.to_string().contains("x-eov-operation-handler required"));
}

#[test]
fn test_handler_module_without_id_is_config_error() {
    let spec = SPEC.replace("  /health:\n    get:\n", "  /health:\n    get:\n      x-eov-operation-handler: health\n");
    let registry = HandlerRegistry::new().with_module("handlers/products", products_module());
    let err = validator(&spec, registry).unwrap_err();
    assert!(matches!(err, ConfigError::MissingOperationId { .. }), "{err}");
}

#[test]
fn test_handlers_off_ignores_extensions() {
    let spec = load_spec_from_str(SPEC, DocumentFormat::Yaml).unwrap();
    let v = OpenApiValidator::new(&spec, ValidatorOptions::default()).unwrap();
    assert!(v.snapshot().dispatcher.is_empty());
}
