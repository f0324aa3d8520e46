//! End-to-end tests for the resource API, run against the in-memory
//! store and cache.

use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use mercato::application::{
    CachePolicy, DocumentStore, PageLimits, ResourceRegistry, ResourceService,
};
use mercato::cache::{CacheStore, MemoryCache};
use mercato::infra::db::MemoryDocumentStore;
use mercato::infra::http::{self, AppState};

fn marketplace_router() -> Router {
    let registry = Arc::new(ResourceRegistry::marketplace());
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new(registry.schemas()));
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new(
        NonZeroUsize::new(1024).expect("capacity"),
    ));
    let resources = Arc::new(ResourceService::new(
        Arc::clone(&store),
        cache,
        CachePolicy::default(),
        PageLimits::default(),
    ));
    http::build_router(AppState {
        resources,
        registry,
        store,
    })
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should collect");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    json_request(Method::POST, uri, body)
}

fn patch(uri: &str, body: &Value) -> Request<Body> {
    json_request(Method::PATCH, uri, body)
}

/// Create a document and return its envelope `doc`.
async fn create_doc(router: &Router, uri: &str, body: &Value) -> Value {
    let (status, envelope) = send(router, post(uri, body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {envelope}");
    envelope["doc"].clone()
}

fn doc_id(doc: &Value) -> String {
    doc["id"].as_str().expect("document id").to_string()
}

fn product_payload(name: &str, price: f64) -> Value {
    json!({
        "name": name,
        "description": "a test product",
        "product_type": "physical",
        "sku": name,
        "unit": "pc",
        "price": price,
        "tax_included": false,
        "minimum_order_qty": 1,
        "stock": 25,
    })
}

#[tokio::test]
async fn health_reports_no_content() {
    let router = marketplace_router();
    let (status, body) = send(&router, get("/healthz")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn create_returns_created_envelope() {
    let router = marketplace_router();
    let (status, envelope) = send(
        &router,
        post(
            "/api/v1/categories",
            &json!({"name": "Electronics", "logo": "electronics.png"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(envelope["status"], "success");
    assert!(envelope.get("cached").is_none());
    assert!(envelope.get("results").is_none());

    let doc = &envelope["doc"];
    assert_eq!(doc["name"], "Electronics");
    assert!(doc["id"].is_string());
    assert!(doc["created_at"].is_string());
    assert!(doc["updated_at"].is_string());
}

#[tokio::test]
async fn create_applies_schema_defaults() {
    let router = marketplace_router();
    let doc = create_doc(
        &router,
        "/api/v1/brands",
        &json!({"name": "Apex", "image_alt_text": "Apex logo"}),
    )
    .await;
    assert_eq!(doc["status"], "inactive");
}

#[tokio::test]
async fn create_drops_unknown_fields() {
    let router = marketplace_router();
    let doc = create_doc(
        &router,
        "/api/v1/brands",
        &json!({"name": "Apex", "image_alt_text": "Apex logo", "role": "admin"}),
    )
    .await;
    assert!(doc.get("role").is_none());
}

#[tokio::test]
async fn create_rejects_invalid_payload_listing_every_problem() {
    let router = marketplace_router();
    let (status, envelope) = send(&router, post("/api/v1/categories", &json!({"logo": 7}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope["status"], "fail");
    let message = envelope["message"].as_str().expect("message");
    assert!(
        message.contains("missing required field `name`"),
        "missing name problem absent: {message}"
    );
    assert!(
        message.contains("`logo`"),
        "logo type problem absent: {message}"
    );
}

#[tokio::test]
async fn create_rejects_values_outside_allowed_set() {
    let router = marketplace_router();
    let (status, envelope) = send(
        &router,
        post(
            "/api/v1/brands",
            &json!({"name": "Apex", "image_alt_text": "Apex logo", "status": "bogus"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope["status"], "fail");
    let message = envelope["message"].as_str().expect("message");
    assert!(message.contains("one of"), "enum problem absent: {message}");
}

#[tokio::test]
async fn create_rejects_duplicate_unique_value() {
    let router = marketplace_router();
    let payload = json!({"name": "Apex", "image_alt_text": "Apex logo"});
    create_doc(&router, "/api/v1/brands", &payload).await;

    let (status, envelope) = send(&router, post("/api/v1/brands", &payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope["status"], "fail");
    let message = envelope["message"].as_str().expect("message");
    assert!(message.contains("`name`"), "unique problem absent: {message}");
}

#[tokio::test]
async fn malformed_json_body_is_rejected() {
    let router = marketplace_router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/brands")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request should build");

    let (status, envelope) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope["status"], "fail");
}

#[tokio::test]
async fn non_object_body_is_rejected() {
    let router = marketplace_router();
    let (status, envelope) = send(&router, post("/api/v1/brands", &json!([1, 2, 3]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope["message"], "request body must be a JSON object");
}

#[tokio::test]
async fn reads_report_which_tier_served_them() {
    let router = marketplace_router();
    let doc = create_doc(
        &router,
        "/api/v1/categories",
        &json!({"name": "Books", "logo": "books.png"}),
    )
    .await;
    let uri = format!("/api/v1/categories/{}", doc_id(&doc));

    let (status, first) = send(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "success");
    assert_eq!(first["cached"], false);
    assert_eq!(first["doc"]["name"], "Books");

    let (status, second) = send(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(second["doc"], first["doc"]);
}

#[tokio::test]
async fn missing_document_is_a_fail_envelope() {
    let router = marketplace_router();
    let (status, envelope) = send(
        &router,
        get("/api/v1/brands/00000000-0000-0000-0000-000000000000"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(envelope["status"], "fail");
    assert_eq!(envelope["message"], "No document found with that ID");
}

#[tokio::test]
async fn unknown_resource_is_a_fail_envelope() {
    let router = marketplace_router();
    let (status, envelope) = send(&router, get("/api/v1/gadgets")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(envelope["status"], "fail");
    assert_eq!(envelope["message"], "Unknown resource `gadgets`");
}

#[tokio::test]
async fn unrouted_paths_get_the_catch_all_envelope() {
    let router = marketplace_router();
    let (status, envelope) = send(&router, get("/definitely/not/here")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(envelope["status"], "fail");
    assert_eq!(
        envelope["message"],
        "Cannot find /definitely/not/here on this server"
    );
}

#[tokio::test]
async fn unsupported_methods_get_the_catch_all_envelope() {
    let router = marketplace_router();
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/v1/brands")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .expect("request should build");

    let (status, envelope) = send(&router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(envelope["status"], "fail");
    assert_eq!(envelope["message"], "Cannot find /api/v1/brands on this server");
}

#[tokio::test]
async fn list_counts_results_and_reports_cache_tier() {
    let router = marketplace_router();
    for name in ["One", "Two", "Three"] {
        create_doc(
            &router,
            "/api/v1/categories",
            &json!({"name": name, "logo": format!("{name}.png")}),
        )
        .await;
    }

    let (status, first) = send(&router, get("/api/v1/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "success");
    assert_eq!(first["results"], 3);
    assert_eq!(first["cached"], false);
    assert_eq!(first["doc"].as_array().map(Vec::len), Some(3));

    let (_, second) = send(&router, get("/api/v1/categories")).await;
    assert_eq!(second["cached"], true);
    assert_eq!(second["doc"], first["doc"]);
}

#[tokio::test]
async fn list_filters_with_range_operators() {
    let router = marketplace_router();
    for (name, price) in [("cheap", 10.0), ("mid", 20.0), ("dear", 30.0)] {
        create_doc(&router, "/api/v1/products", &product_payload(name, price)).await;
    }

    let (status, envelope) = send(&router, get("/api/v1/products?price%5Bgte%5D=15")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(envelope["results"], 2);

    let (_, envelope) = send(&router, get("/api/v1/products?price%5Blt%5D=15")).await;
    assert_eq!(envelope["results"], 1);
    assert_eq!(envelope["doc"][0]["name"], "cheap");

    let (_, envelope) = send(
        &router,
        get("/api/v1/products?price%5Bgt%5D=10&price%5Blte%5D=20"),
    )
    .await;
    assert_eq!(envelope["results"], 1);
    assert_eq!(envelope["doc"][0]["name"], "mid");
}

#[tokio::test]
async fn list_filters_on_equality() {
    let router = marketplace_router();
    create_doc(
        &router,
        "/api/v1/brands",
        &json!({"name": "Apex", "image_alt_text": "Apex logo", "status": "active"}),
    )
    .await;
    create_doc(
        &router,
        "/api/v1/brands",
        &json!({"name": "Borealis", "image_alt_text": "Borealis logo"}),
    )
    .await;

    let (_, envelope) = send(&router, get("/api/v1/brands?status=active")).await;
    assert_eq!(envelope["results"], 1);
    assert_eq!(envelope["doc"][0]["name"], "Apex");
}

#[tokio::test]
async fn list_sorts_descending_with_minus_prefix() {
    let router = marketplace_router();
    for (name, price) in [("low", 5.0), ("high", 50.0), ("mid", 25.0)] {
        create_doc(&router, "/api/v1/products", &product_payload(name, price)).await;
    }

    let (_, envelope) = send(&router, get("/api/v1/products?sort=-price")).await;
    let docs = envelope["doc"].as_array().expect("doc array");
    let names: Vec<_> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn list_limits_fields_to_the_requested_set() {
    let router = marketplace_router();
    create_doc(&router, "/api/v1/products", &product_payload("widget", 9.5)).await;

    let (_, envelope) = send(&router, get("/api/v1/products?fields=name,price")).await;
    let doc = &envelope["doc"][0];
    assert_eq!(doc["name"], "widget");
    assert_eq!(doc["price"], 9.5);
    assert!(doc.get("description").is_none());
    assert!(doc.get("sku").is_none());
    // Identity and bookkeeping fields always survive projection.
    assert!(doc["id"].is_string());
    assert!(doc["created_at"].is_string());
}

#[tokio::test]
async fn list_paginates_with_page_and_limit() {
    let router = marketplace_router();
    for (name, priority) in [("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)] {
        create_doc(
            &router,
            "/api/v1/categories",
            &json!({"name": name, "logo": "x.png", "priority": priority}),
        )
        .await;
    }

    let (_, envelope) = send(
        &router,
        get("/api/v1/categories?sort=priority&page=2&limit=2"),
    )
    .await;
    assert_eq!(envelope["results"], 2);
    let docs = envelope["doc"].as_array().expect("doc array");
    let names: Vec<_> = docs.iter().map(|d| d["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["c", "d"]);

    let (_, beyond) = send(
        &router,
        get("/api/v1/categories?sort=priority&page=9&limit=2"),
    )
    .await;
    assert_eq!(beyond["results"], 0);
    assert_eq!(beyond["doc"], json!([]));
}

#[tokio::test]
async fn update_refreshes_the_document_and_later_reads() {
    let router = marketplace_router();
    let doc = create_doc(
        &router,
        "/api/v1/categories",
        &json!({"name": "Garden", "logo": "garden.png"}),
    )
    .await;
    let uri = format!("/api/v1/categories/{}", doc_id(&doc));

    // Prime the cache so the update has something to invalidate.
    let (_, primed) = send(&router, get(&uri)).await;
    assert_eq!(primed["cached"], false);
    let (_, primed) = send(&router, get(&uri)).await;
    assert_eq!(primed["cached"], true);

    let (status, envelope) = send(&router, patch(&uri, &json!({"name": "Outdoors"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(envelope["status"], "success");
    assert_eq!(envelope["doc"]["name"], "Outdoors");

    let (_, fresh) = send(&router, get(&uri)).await;
    assert_eq!(fresh["cached"], false);
    assert_eq!(fresh["doc"]["name"], "Outdoors");
}

#[tokio::test]
async fn update_of_missing_document_is_not_found() {
    let router = marketplace_router();
    let (status, envelope) = send(
        &router,
        patch(
            "/api/v1/categories/00000000-0000-0000-0000-000000000000",
            &json!({"name": "Ghost"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(envelope["message"], "No document found with that ID");
}

#[tokio::test]
async fn update_with_null_unsets_a_field() {
    let router = marketplace_router();
    let mut payload = product_payload("gizmo", 12.0);
    payload["thumbnail"] = json!("gizmo.png");
    let doc = create_doc(&router, "/api/v1/products", &payload).await;
    assert_eq!(doc["thumbnail"], "gizmo.png");

    let uri = format!("/api/v1/products/{}", doc_id(&doc));
    let (status, envelope) = send(&router, patch(&uri, &json!({"thumbnail": null}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(envelope["doc"].get("thumbnail").is_none());
}

#[tokio::test]
async fn delete_returns_no_content_then_reads_miss() {
    let router = marketplace_router();
    let doc = create_doc(
        &router,
        "/api/v1/brands",
        &json!({"name": "Fleeting", "image_alt_text": "gone soon"}),
    )
    .await;
    let uri = format!("/api/v1/brands/{}", doc_id(&doc));

    let (status, body) = send(&router, delete(&uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, envelope) = send(&router, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(envelope["message"], "No document found with that ID");

    let (status, _) = send(&router, delete(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn references_expand_to_embedded_documents() {
    let router = marketplace_router();
    let category = create_doc(
        &router,
        "/api/v1/categories",
        &json!({"name": "Electronics", "logo": "electronics.png"}),
    )
    .await;
    let category_id = doc_id(&category);

    let sub = create_doc(
        &router,
        "/api/v1/sub-categories",
        &json!({"name": "Phones", "main_category": category_id}),
    )
    .await;

    let uri = format!("/api/v1/sub-categories/{}", doc_id(&sub));
    let (_, envelope) = send(&router, get(&uri)).await;
    let embedded = &envelope["doc"]["main_category"];
    assert_eq!(embedded["id"], category_id.as_str());
    assert_eq!(embedded["name"], "Electronics");
    // Only the selected fields ride along.
    assert!(embedded.get("logo").is_none());

    let (_, listed) = send(&router, get("/api/v1/sub-categories")).await;
    assert_eq!(listed["doc"][0]["main_category"]["name"], "Electronics");
}

#[tokio::test]
async fn dangling_references_embed_as_null() {
    let router = marketplace_router();
    let category = create_doc(
        &router,
        "/api/v1/categories",
        &json!({"name": "Ephemeral", "logo": "x.png"}),
    )
    .await;
    let category_id = doc_id(&category);

    let sub = create_doc(
        &router,
        "/api/v1/sub-categories",
        &json!({"name": "Orphans", "main_category": category_id}),
    )
    .await;

    let (status, _) = send(
        &router,
        delete(&format!("/api/v1/categories/{category_id}")),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let uri = format!("/api/v1/sub-categories/{}", doc_id(&sub));
    let (_, envelope) = send(&router, get(&uri)).await;
    assert_eq!(envelope["doc"]["main_category"], Value::Null);
}

#[tokio::test]
async fn list_expands_reference_lists_with_selected_fields() {
    let router = marketplace_router();
    let first = create_doc(&router, "/api/v1/products", &product_payload("first", 10.0)).await;
    let second = create_doc(&router, "/api/v1/products", &product_payload("second", 20.0)).await;

    create_doc(
        &router,
        "/api/v1/flash-deals",
        &json!({
            "title": "Summer Sale",
            "products": [doc_id(&first), doc_id(&second)],
        }),
    )
    .await;

    let (_, envelope) = send(&router, get("/api/v1/flash-deals")).await;
    assert_eq!(envelope["results"], 1);
    let products = envelope["doc"][0]["products"].as_array().expect("products");
    assert_eq!(products.len(), 2);
    let names: Vec<_> = products
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"first"));
    assert!(names.contains(&"second"));
    assert!(products[0].get("description").is_none());
}
