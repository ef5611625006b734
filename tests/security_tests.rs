use http::{Method, StatusCode};
use async_trait::async_trait;
use oasgate::security::{handler_fn, SecurityDecision, SecurityHandler, SecurityRequest};
use oasgate::{
    load_spec_from_str, ApiRequest, ApiResponse, ConfigError, DocumentFormat, OpenApiValidator,
    ValidatorOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;
use common::{echo, products_spec, products_validator, respond};

fn header_key(header: &'static str, expected: &'static str) -> Arc<dyn SecurityHandler> {
    handler_fn(move |req: &SecurityRequest<'_>, _scopes: &[String]| match req.get_header(header) {
        Some(v) if v == expected => SecurityDecision::Granted,
        Some(_) => SecurityDecision::Unauthenticated("invalid key".into()),
        None => SecurityDecision::Unauthenticated(format!("missing {header}")),
    })
}

fn bearer(expected: &'static str) -> Arc<dyn SecurityHandler> {
    handler_fn(move |req: &SecurityRequest<'_>, _scopes: &[String]| match req.bearer_token() {
        Some(t) if t == expected => SecurityDecision::Granted,
        _ => SecurityDecision::Unauthenticated("bad bearer token".into()),
    })
}

/// Grants when `x-scopes` lists every required scope.
fn scoped() -> Arc<dyn SecurityHandler> {
    handler_fn(|req: &SecurityRequest<'_>, scopes: &[String]| {
        let Some(granted) = req.get_header("x-scopes") else {
            return SecurityDecision::Unauthenticated("no token".into());
        };
        let granted: Vec<&str> = granted.split(' ').collect();
        if scopes.iter().all(|s| granted.contains(&s.as_str())) {
            SecurityDecision::Granted
        } else {
            SecurityDecision::InsufficientScope(format!("requires {scopes:?}"))
        }
    })
}

fn secured_options() -> ValidatorOptions {
    ValidatorOptions::builder()
        .security_handler("ApiKey", header_key("x-api-key", "test123"))
        .security_handler("schemeA", header_key("x-key-a", "a"))
        .security_handler("schemeB", bearer("b"))
        .security_handler("schemeC", scoped())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_api_key_required() {
    let v = products_validator(secured_options());
    let req = ApiRequest::new(Method::POST, "/api/v1/products")
        .json(serde_json::json!({"name": "Lamp", "price": 10}));
    let err = v.handle(req, echo).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_granted_reaches_handler() {
    let v = products_validator(secured_options());
    let req = ApiRequest::new(Method::POST, "/api/v1/products")
        .header("X-API-Key", "test123")
        .json(serde_json::json!({"name": "Lamp", "price": 10}));
    let resp = v.handle(req, echo).await.unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_and_requirement_needs_both_schemes() {
    let v = products_validator(secured_options());
    let only_a = ApiRequest::new(Method::DELETE, "/api/v1/products/3").header("X-Key-A", "a");
    let err = v.handle(only_a, respond(ApiResponse::empty(204))).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

    let both = ApiRequest::new(Method::DELETE, "/api/v1/products/3")
        .header("X-Key-A", "a")
        .header("Authorization", "Bearer b");
    let resp = v.handle(both, respond(ApiResponse::empty(204))).await.unwrap();
    assert_eq!(resp.status, 204);
}

#[tokio::test]
async fn test_second_alternative_can_authorize() {
    let v = products_validator(secured_options());
    let req = ApiRequest::new(Method::DELETE, "/api/v1/products/3").header("X-Scopes", "read admin");
    let resp = v.handle(req, respond(ApiResponse::empty(204))).await.unwrap();
    assert_eq!(resp.status, 204);
}

#[tokio::test]
async fn test_insufficient_scope_is_forbidden() {
    let v = products_validator(secured_options());
    let req = ApiRequest::new(Method::DELETE, "/api/v1/products/3").header("X-Scopes", "read");
    let err = v.handle(req, respond(ApiResponse::empty(204))).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_security_runs_before_validation() {
    let v = products_validator(secured_options());
    // Invalid body and no credentials: the credential failure wins.
    let req = ApiRequest::new(Method::POST, "/api/v1/products").json(serde_json::json!({"price": -1}));
    let err = v.handle(req, echo).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unsecured_operation_skips_handlers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let counting = handler_fn(move |_: &SecurityRequest<'_>, _: &[String]| {
        counted.fetch_add(1, Ordering::SeqCst);
        SecurityDecision::Granted
    });
    let options = ValidatorOptions::builder()
        .security_handler("ApiKey", Arc::clone(&counting))
        .security_handler("schemeA", Arc::clone(&counting))
        .security_handler("schemeB", Arc::clone(&counting))
        .security_handler("schemeC", counting)
        .build()
        .unwrap();
    let v = products_validator(options);
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/ping"), echo)
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_security_disabled_lets_everything_through() {
    let options = ValidatorOptions::builder().validate_security(false).build().unwrap();
    let v = products_validator(options);
    let req = ApiRequest::new(Method::DELETE, "/api/v1/products/3");
    let resp = v.handle(req, respond(ApiResponse::empty(204))).await.unwrap();
    assert_eq!(resp.status, 204);
}

#[test]
fn test_partial_handler_coverage_is_config_error() {
    let options = ValidatorOptions::builder()
        .security_handler("ApiKey", header_key("x-api-key", "k"))
        .build()
        .unwrap();
    let err = OpenApiValidator::new(&products_spec(), options).unwrap_err();
    assert!(matches!(err, ConfigError::MissingSecurityHandler { .. }), "{err}");
}

#[test]
fn test_declared_schemes_need_handlers_at_install() {
    let err = OpenApiValidator::new(&products_spec(), ValidatorOptions::default()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingSecurityHandler { .. }), "{err}");
}

struct Unreachable;

#[async_trait]
impl SecurityHandler for Unreachable {
    async fn authorize(&self, _req: &SecurityRequest<'_>, _scopes: &[String]) -> anyhow::Result<SecurityDecision> {
        Err(anyhow::anyhow!("key store unavailable"))
    }
}

#[tokio::test]
async fn test_handler_error_is_server_error() {
    let options = ValidatorOptions::builder()
        .security_handler("ApiKey", Arc::new(Unreachable))
        .security_handler("schemeA", header_key("x-key-a", "a"))
        .security_handler("schemeB", bearer("b"))
        .security_handler("schemeC", scoped())
        .build()
        .unwrap();
    let v = products_validator(options);
    let req = ApiRequest::new(Method::POST, "/api/v1/products")
        .header("X-API-Key", "test123")
        .json(serde_json::json!({"name": "Lamp", "price": 10}));
    let err = v.handle(req, echo).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(err.to_string().contains("key store unavailable"), "{err}");
}

const GLOBAL_AUTH_SPEC: &str = r#"
openapi: 3.1.0
info:
  title: accounts
  version: "1"
security:
  - ApiKey: []
paths:
  /orders:
    get:
      responses:
        "200":
          description: ok
  /login:
    post:
      security: []
      responses:
        "200":
          description: ok
components:
  securitySchemes:
    ApiKey:
      type: apiKey
      in: header
      name: X-API-Key
"#;

#[tokio::test]
async fn test_empty_operation_security_overrides_document() {
    let spec = load_spec_from_str(GLOBAL_AUTH_SPEC, DocumentFormat::Yaml).unwrap();
    let options = ValidatorOptions::builder()
        .security_handler("ApiKey", header_key("x-api-key", "k"))
        .build()
        .unwrap();
    let v = OpenApiValidator::new(&spec, options).unwrap();

    let resp = v
        .handle(ApiRequest::new(Method::POST, "/login"), respond(ApiResponse::empty(200)))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);

    let err = v
        .handle(ApiRequest::new(Method::GET, "/orders"), respond(ApiResponse::empty(200)))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}
