//! Request-pipeline tests that run without a database
//!
//! The pool connects lazily, so every path that fails before statement
//! execution (routing, authentication, validation, catalog lookups) is
//! exercised end to end through the actix service.

use std::collections::{BTreeMap, HashMap};

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};

use mygate_api::server::api_scope;
use mygate_api::{AppState, Executor};
use mygate_auth::JwtVerifier;
use mygate_catalog::{Catalog, CatalogCache, Column, ColumnKey, ForeignKey, Table};
use mygate_common::config::DatabaseConfig;
use mygate_rls::{PolicyCache, POLICY_TABLE};

const SECRET: &str = "api-test-secret";

fn column(name: &str, data_type: &str, key: ColumnKey) -> Column {
    Column {
        name: name.to_string(),
        ordinal: 0,
        data_type: data_type.to_string(),
        key,
        nullable: true,
        default: None,
        column_type: data_type.to_string(),
        auto_increment: false,
    }
}

fn fixture_catalog() -> Catalog {
    let mut tables = BTreeMap::new();

    tables.insert(
        "payments".to_string(),
        Table {
            name: "payments".into(),
            columns: vec![
                column("customerNumber", "int", ColumnKey::Primary),
                column("checkNumber", "varchar", ColumnKey::Primary),
                column("amount", "decimal", ColumnKey::None),
            ],
            primary_key: vec!["customerNumber".into(), "checkNumber".into()],
            foreign_keys: vec![],
        },
    );

    tables.insert(
        "orders".to_string(),
        Table {
            name: "orders".into(),
            columns: vec![
                column("orderNumber", "int", ColumnKey::Primary),
                column("status", "varchar", ColumnKey::None),
                column("customerNumber", "int", ColumnKey::None),
            ],
            primary_key: vec!["orderNumber".into()],
            foreign_keys: vec![ForeignKey {
                table: "orders".into(),
                column: "customerNumber".into(),
                referenced_table: "customers".into(),
                referenced_column: "customerNumber".into(),
                data_type: "int".into(),
            }],
        },
    );

    tables.insert(
        "customers".to_string(),
        Table {
            name: "customers".into(),
            columns: vec![
                column("customerNumber", "int", ColumnKey::Primary),
                column("customerName", "varchar", ColumnKey::None),
            ],
            primary_key: vec!["customerNumber".into()],
            foreign_keys: vec![],
        },
    );

    tables.insert(
        POLICY_TABLE.to_string(),
        Table {
            name: POLICY_TABLE.into(),
            columns: vec![column("id", "bigint", ColumnKey::Primary)],
            primary_key: vec!["id".into()],
            foreign_keys: vec![],
        },
    );

    Catalog::new("classicmodels".into(), tables, HashMap::new())
}

fn state(jwt_required: bool) -> web::Data<AppState> {
    web::Data::new(AppState {
        catalog: CatalogCache::new(fixture_catalog()),
        policies: PolicyCache::empty(),
        executor: Executor::connect(&DatabaseConfig::default()),
        verifier: JwtVerifier::new(Some(SECRET), jwt_required),
        database: "classicmodels".into(),
    })
}

fn bearer(payload: JsonValue) -> (&'static str, String) {
    let token = encode(
        &Header::new(Algorithm::HS256),
        payload.as_object().unwrap(),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    ("Authorization", format!("Bearer {token}"))
}

macro_rules! service {
    ($state:expr) => {
        test::init_service(App::new().app_data($state).service(api_scope())).await
    };
}

#[actix_web::test]
async fn test_health() {
    let app = service!(state(false));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["service"], "mygate");
    assert_eq!(body["tables"], 4);
}

#[actix_web::test]
async fn test_tables_excludes_policy_store() {
    let app = service!(state(false));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/tables").to_request())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: JsonValue = test::read_body_json(resp).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(names, ["customers", "orders", "payments"]);
}

#[actix_web::test]
async fn test_describe() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/orders/describe").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["name"], "orders");
    assert_eq!(body["primary_key"], json!(["orderNumber"]));
    assert_eq!(body["columns"].as_array().unwrap().len(), 3);
}

#[actix_web::test]
async fn test_unknown_table_is_404() {
    let app = service!(state(false));
    for uri in ["/api/nope", "/api/nope/describe", "/api/nope/count"] {
        let resp =
            test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[actix_web::test]
async fn test_composite_key_arity_is_400() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/payments/103").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["code"], "composite_key_mismatch");
}

#[actix_web::test]
async fn test_jwt_required_rejects_anonymous() {
    let app = service!(state(true));
    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/api/orders").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["code"], "auth_missing");
}

#[actix_web::test]
async fn test_invalid_bearer_rejected() {
    let app = service!(state(true));
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/orders")
            .insert_header(("Authorization", "Bearer not.a.token"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["code"], "auth_invalid");
}

#[actix_web::test]
async fn test_valid_bearer_passes_auth_gate() {
    let app = service!(state(true));
    // The composite-key check fires after authentication, so a 400 here
    // proves the token was accepted
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/payments/103")
            .insert_header(bearer(json!({"role": "WRITE_TABLE"})))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_groupby_requires_fields() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/orders/groupby").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_groupby_unknown_field_is_400() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/orders/groupby?_fields=bogus")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_aggregate_requires_fields() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/payments/aggregate").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_unbalanced_select_is_400() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/customers?select=orders(orderNumber")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_legacy_where_or_is_400() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/orders?_where=(a,eq,1)~or(b,eq,2)")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_bad_limit_is_400() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/orders?limit=lots").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_rpc_unknown_routine_is_404() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/rpc/no_such_routine")
            .set_json(json!({}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["code"], "routine_not_found");
}

#[actix_web::test]
async fn test_create_rejects_unknown_columns_only() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/orders")
            .set_json(json!({"bogus": 1}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_patch_with_nothing_to_change_is_204() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::patch()
            .uri("/api/orders")
            .set_json(json!({}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn test_relational_without_fk_is_400() {
    let app = service!(state(false));
    // payments does not reference customers in the fixture
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/customers/103/payments")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_openapi_document() {
    let app = service!(state(false));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/openapi.json").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["openapi"], "3.0.3");
    assert!(body["paths"].get("/api/orders").is_some());
    assert!(body["paths"].get(&format!("/api/{POLICY_TABLE}")).is_none());
}
