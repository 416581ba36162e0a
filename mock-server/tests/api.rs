use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

// --- list ---

#[tokio::test]
async fn list_unknown_collection_is_empty() {
    let resp = app().oneshot(empty_request("GET", "/projects")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let records: Vec<Value> = body_json(resp).await;
    assert!(records.is_empty());
}

// --- create ---

#[tokio::test]
async fn create_assigns_an_id() {
    let resp = app()
        .oneshot(json_request("POST", "/customers", r#"{"name":"Acme"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let record: Value = body_json(resp).await;
    assert_eq!(record["name"], "Acme");
    assert!(record["id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn create_keeps_a_given_id() {
    let resp = app()
        .oneshot(json_request("POST", "/customers", r#"{"id":"c-1","name":"Acme"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let record: Value = body_json(resp).await;
    assert_eq!(record["id"], "c-1");
}

#[tokio::test]
async fn create_non_object_returns_422() {
    let resp = app()
        .oneshot(json_request("POST", "/customers", "[1,2]"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- get / update / delete on missing records ---

#[tokio::test]
async fn get_missing_returns_404_with_message() {
    let resp = app().oneshot(empty_request("GET", "/events/nope")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = body_json(resp).await;
    assert_eq!(body["message"], "events/nope not found");
}

#[tokio::test]
async fn update_missing_returns_404() {
    let resp = app()
        .oneshot(json_request("PUT", "/events/nope", r#"{"title":"x"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_missing_returns_404() {
    let resp = app()
        .oneshot(empty_request("DELETE", "/events/nope"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- diagnostics ---

#[tokio::test]
async fn echo_reports_query_headers_and_body() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo?a=1&b=x%20y")
                .header("X-Trace", "abc")
                .body("payload".to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.query.as_deref(), Some("a=1&b=x%20y"));
    assert_eq!(echo.headers.get("x-trace").map(String::as_str), Some("abc"));
    assert_eq!(echo.body, "payload");
}

#[tokio::test]
async fn status_route_answers_with_requested_code() {
    let resp = app().oneshot(empty_request("GET", "/status/418")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    let body: Value = body_json(resp).await;
    assert_eq!(body["code"], 418);
}

#[tokio::test]
async fn redirect_route_points_at_target() {
    let resp = app()
        .oneshot(empty_request("GET", "/redirect?to=/echo"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        resp.headers().get(http::header::LOCATION).unwrap(),
        "/echo"
    );
}

#[tokio::test]
async fn slow_route_reports_delay() {
    let resp = app().oneshot(empty_request("GET", "/slow?ms=5")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert_eq!(body, json!({"slept": 5}));
}

// --- full CRUD lifecycle ---

#[tokio::test]
async fn crud_lifecycle() {
    use tower::Service;

    let mut app = app().into_service();

    // create
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "POST",
            "/projects",
            r#"{"name":"Atlas","status":"open"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();

    // a second record that the filter should exclude
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "POST",
            "/projects",
            r#"{"name":"Borealis","status":"closed"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // list with a field filter
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", "/projects?status=open"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let records: Vec<Value> = body_json(resp).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], id.as_str());

    // update merges fields, id is fixed
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "PUT",
            &format!("/projects/{id}"),
            r#"{"status":"closed","id":"other"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Value = body_json(resp).await;
    assert_eq!(updated["name"], "Atlas"); // unchanged
    assert_eq!(updated["status"], "closed");
    assert_eq!(updated["id"], id.as_str());

    // delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("DELETE", &format!("/projects/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let body = body_bytes(resp).await;
    assert!(body.is_empty());

    // get after delete — 404
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(empty_request("GET", &format!("/projects/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
