use http::{Method, StatusCode};
use oasgate::config::RemoveAdditional;
use oasgate::{ApiRequest, ApiResponse, HandlerRequest, ValidatorOptions};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod common;
use common::{echo, fixture_options, products_spec, products_validator, respond};

fn with_responses() -> ValidatorOptions {
    fixture_options().validate_responses(true).build().unwrap()
}

#[tokio::test]
async fn test_unknown_route_is_404_and_handler_not_called() {
    let v = products_validator(fixture_options().build().unwrap());
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let err = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/orders"), move |req| {
            flag.store(true, Ordering::SeqCst);
            echo(req)
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_wrong_method_is_405_with_allowed_list() {
    let v = products_validator(fixture_options().build().unwrap());
    let err = v
        .handle(ApiRequest::new(Method::PATCH, "/api/v1/ping"), echo)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(err.to_body()["allowed"], json!(["GET"]));
}

#[tokio::test]
async fn test_outside_base_path_passes_through() {
    let v = products_validator(fixture_options().build().unwrap());
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/health?deep=1"), |req: HandlerRequest| async move {
            assert!(req.context.is_none());
            Ok(ApiResponse::empty(200))
        })
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_ignored_paths_bypass_validation() {
    let options = fixture_options().ignore_paths("^/api/v1/products/").build().unwrap();
    let v = products_validator(options);
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/products/not-a-number"), echo)
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_ignore_predicate() {
    let options = fixture_options()
        .ignore_paths_fn(|path| path.ends_with("/inlined"))
        .build()
        .unwrap();
    let v = products_validator(options);
    let resp = v
        .handle(ApiRequest::new(Method::POST, "/api/v1/products/inlined"), echo)
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_context_carries_request_id_and_operation() {
    let v = products_validator(fixture_options().build().unwrap());
    let upstream = oasgate::RequestId::new();
    let resp = v
        .handle(
            ApiRequest::new(Method::GET, "/api/v1/products/5").header("x-request-id", upstream.to_string()),
            move |req: HandlerRequest| async move {
                let ctx = req.context.unwrap();
                assert_eq!(ctx.request_id, upstream);
                assert_eq!(ctx.operation_id(), Some("getProduct"));
                assert_eq!(ctx.path_template(), "/products/{id}");
                assert_eq!(ctx.path_param("id"), Some(json!(5)));
                Ok(ApiResponse::empty(404))
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.status, 404);
}

#[tokio::test]
async fn test_handler_error_becomes_500() {
    let v = products_validator(fixture_options().build().unwrap());
    let err = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/ping"), |_| async {
            Err::<ApiResponse, _>(anyhow::anyhow!("database unavailable"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(err.to_string().contains("database unavailable"));
}

#[tokio::test]
async fn test_response_validation_off_by_default() {
    let v = products_validator(fixture_options().build().unwrap());
    let resp = v
        .handle(
            ApiRequest::new(Method::GET, "/api/v1/ping"),
            respond(ApiResponse::json(200, json!({"pong": "yes"}))),
        )
        .await
        .unwrap();
    assert_eq!(resp.body, Some(json!({"pong": "yes"})));
}

#[tokio::test]
async fn test_response_body_violation_is_500() {
    let v = products_validator(with_responses());
    let err = v
        .handle(
            ApiRequest::new(Method::GET, "/api/v1/ping"),
            respond(ApiResponse::json(200, json!({"pong": "yes"}))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let e = &err.errors()[0];
    assert_eq!(e.location, oasgate::ErrorLocation::ResponseBody);
    assert_eq!(e.path, ".pong");
    assert!(err.to_string().starts_with("internal server error: .response"));
}

#[tokio::test]
async fn test_undeclared_status_is_500() {
    let v = products_validator(with_responses());
    let err = v
        .handle(
            ApiRequest::new(Method::GET, "/api/v1/ping"),
            respond(ApiResponse::json(418, json!({"pong": true}))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.errors()[0].keyword, "status");
}

#[tokio::test]
async fn test_range_and_default_responses() {
    let v = products_validator(with_responses());

    // 404 is declared without content.
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/products/1"), respond(ApiResponse::empty(404)))
        .await
        .unwrap();
    assert_eq!(resp.status, 404);

    // 503 falls through to `default`, which requires code and message.
    let err = v
        .handle(
            ApiRequest::new(Method::GET, "/api/v1/products/1"),
            respond(ApiResponse::json(503, json!({"code": 503}))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.errors()[0].path, ".message");
    assert_eq!(err.errors()[0].keyword, "required");
}

#[tokio::test]
async fn test_write_only_stripped_from_response() {
    let v = products_validator(with_responses());
    let resp = v
        .handle(
            ApiRequest::new(Method::POST, "/api/v1/products/inlined").json(json!({"name": "Lamp", "price": 2})),
            |req: HandlerRequest| async move {
                let mut stored = req.request.body.unwrap();
                stored["id"] = json!("p-9");
                Ok(ApiResponse::json(200, stored))
            },
        )
        .await
        .unwrap();
    let body = resp.body.unwrap();
    assert_eq!(body["id"], json!("p-9"));
    assert!(body.get("role").is_none());
    assert_eq!(body["in_stock"], json!(true));
}

#[tokio::test]
async fn test_response_missing_read_only_property_fails() {
    let v = products_validator(with_responses());
    let err = v
        .handle(
            ApiRequest::new(Method::POST, "/api/v1/products/inlined").json(json!({"name": "Lamp", "price": 2})),
            |req: HandlerRequest| async move { Ok(ApiResponse::json(200, req.request.body.unwrap())) },
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.errors()[0].path, ".id");
    assert_eq!(err.errors()[0].keyword, "required");
}

#[tokio::test]
async fn test_response_additional_properties_removed() {
    let options = fixture_options()
        .validate_responses(true)
        .response_remove_additional(RemoveAdditional::All)
        .build()
        .unwrap();
    let v = products_validator(options);
    let resp = v
        .handle(
            ApiRequest::new(Method::GET, "/api/v1/ping"),
            respond(ApiResponse::json(200, json!({"pong": true, "debug": "x"}))),
        )
        .await
        .unwrap();
    assert_eq!(resp.body, Some(json!({"pong": true})));
}

#[tokio::test]
async fn test_request_validation_disabled() {
    let options = fixture_options().validate_requests(false).build().unwrap();
    let v = products_validator(options);
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/products/abc?junk=1"), echo)
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
}

#[tokio::test]
async fn test_reload_swaps_snapshot() {
    let v = products_validator(fixture_options().build().unwrap());
    let before = v.snapshot().version.clone();

    let mut spec = products_spec();
    spec.paths.as_mut().unwrap().remove("/ping");
    let after = v.reload(&spec).unwrap();
    assert_eq!(after.version, before.version + 1);
    assert_ne!(after.hash, before.hash);

    let err = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/ping"), echo)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_in_flight_request_keeps_its_snapshot() {
    let v = Arc::new(products_validator(fixture_options().build().unwrap()));
    let reloader = Arc::clone(&v);
    let resp = v
        .handle(ApiRequest::new(Method::GET, "/api/v1/ping"), move |req: HandlerRequest| async move {
            let mut spec = products_spec();
            spec.paths.as_mut().unwrap().remove("/ping");
            reloader.reload(&spec).unwrap();
            echo(req).await
        })
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(v.snapshot().version.version, 2);
}
