#![allow(dead_code)]

use oasgate::{load_spec, ApiResponse, HandlerRequest, OpenApiValidator, OptionsBuilder, ValidatorOptions};
use oas3::OpenApiV3Spec;
use serde_json::{json, Value};
use std::path::PathBuf;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn products_spec() -> OpenApiV3Spec {
    load_spec(fixture_path("products.yaml")).unwrap()
}

/// Options for fixture tests that are not about security. The fixture declares
/// security schemes, so with no handlers installed security has to be off.
pub fn fixture_options() -> OptionsBuilder {
    ValidatorOptions::builder().validate_security(false)
}

pub fn products_validator(options: ValidatorOptions) -> OpenApiValidator {
    OpenApiValidator::new(&products_spec(), options).unwrap()
}

/// Host handler that echoes what the pipeline handed over: the processed body
/// and the coerced parameters.
pub async fn echo(req: HandlerRequest) -> anyhow::Result<ApiResponse> {
    let (path, query, headers, cookies) = match &req.context {
        Some(ctx) => (
            Value::Object(ctx.path_params.clone()),
            Value::Object(ctx.query.clone()),
            Value::Object(ctx.headers.clone()),
            Value::Object(ctx.cookies.clone()),
        ),
        None => (Value::Null, Value::Null, Value::Null, Value::Null),
    };
    Ok(ApiResponse::json(
        200,
        json!({
            "path": path,
            "query": query,
            "headers": headers,
            "cookies": cookies,
            "body": req.request.body.unwrap_or(Value::Null),
        }),
    ))
}

/// Host handler that returns a fixed response.
pub fn respond(response: ApiResponse) -> impl FnOnce(HandlerRequest) -> std::future::Ready<anyhow::Result<ApiResponse>> {
    move |_| std::future::ready(Ok(response))
}

pub mod temp_files {
    use std::io::Write;

    /// Write `content` to a fresh temporary file with the given suffix.
    pub fn create_temp_spec(content: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("oasgate_test_")
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    pub fn create_temp_yaml(content: &str) -> tempfile::NamedTempFile {
        create_temp_spec(content, ".yaml")
    }
}
