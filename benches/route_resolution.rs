use criterion::{black_box, criterion_group, criterion_main, Criterion};
use http::Method;
use oasgate::router::RouteTable;
use oasgate::{load_spec, ApiRequest, ApiResponse, OpenApiValidator, ValidatorOptions};
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/products.yaml")
}

/// A wide table: the fixture plus generated literal and templated routes.
fn wide_table() -> RouteTable {
    let mut yaml = String::from("openapi: 3.1.0\ninfo:\n  title: wide\n  version: \"1\"\nservers:\n  - url: /api\npaths:\n");
    for i in 0..200 {
        yaml.push_str(&format!(
            "  /resource{i}:\n    get:\n      responses:\n        \"200\": {{ description: OK }}\n"
        ));
        yaml.push_str(&format!(
            "  /resource{i}/{{id}}/items/{{item_id}}:\n    get:\n      parameters:\n        - {{ name: id, in: path, required: true, schema: {{ type: integer }} }}\n        - {{ name: item_id, in: path, required: true, schema: {{ type: string }} }}\n      responses:\n        \"200\": {{ description: OK }}\n"
        ));
    }
    let spec = oasgate::load_spec_from_str(&yaml, oasgate::DocumentFormat::Yaml).unwrap();
    RouteTable::build(&spec).unwrap()
}

fn bench_resolve(c: &mut Criterion) {
    let spec = load_spec(fixture()).unwrap();
    let table = RouteTable::build(&spec).unwrap();
    c.bench_function("resolve_literal", |b| {
        b.iter(|| table.resolve(black_box(&Method::POST), black_box("/api/v1/products/inlined")))
    });
    c.bench_function("resolve_templated", |b| {
        b.iter(|| table.resolve(black_box(&Method::GET), black_box("/api/v1/products/42")))
    });

    let wide = wide_table();
    c.bench_function("resolve_wide_table_last_route", |b| {
        b.iter(|| wide.resolve(black_box(&Method::GET), black_box("/api/resource199/7/items/abc")))
    });
    c.bench_function("resolve_wide_table_miss", |b| {
        b.iter(|| wide.resolve(black_box(&Method::GET), black_box("/api/nothing/here")))
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let spec = load_spec(fixture()).unwrap();
    let validator = OpenApiValidator::new(&spec, ValidatorOptions::builder().validate_security(false).build().unwrap()).unwrap();
    c.bench_function("pipeline_query_and_path", |b| {
        b.iter(|| {
            let req = ApiRequest::new(Method::GET, "/api/v1/products?limit=10&tags=a&tags=b");
            futures::executor::block_on(validator.handle(black_box(req), |_| async {
                Ok(ApiResponse::empty(200))
            }))
        })
    });
    c.bench_function("pipeline_json_body", |b| {
        b.iter(|| {
            let req = ApiRequest::new(Method::POST, "/api/v1/products/inlined")
                .json(serde_json::json!({"name": "Lamp", "price": "19.99"}));
            futures::executor::block_on(validator.handle(black_box(req), |_| async {
                Ok(ApiResponse::empty(200))
            }))
        })
    });
}

criterion_group!(benches, bench_resolve, bench_pipeline);
criterion_main!(benches);
