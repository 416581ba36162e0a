use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Records of one collection, keyed by id.
pub type Records = BTreeMap<String, Map<String, Value>>;

pub type Db = Arc<RwLock<HashMap<String, Records>>>;

/// What `/echo` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct Target {
    pub to: String,
}

#[derive(Deserialize)]
pub struct Delay {
    #[serde(default)]
    pub ms: u64,
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/slow", get(slow))
        .route("/redirect", any(redirect))
        .route("/{collection}", get(list_records).post(create_record))
        .route(
            "/{collection}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn not_found(collection: &str, id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": format!("{collection}/{id} not found"), "code": 404})),
    )
        .into_response()
}

async fn echo(method: Method, RawQuery(query): RawQuery, headers: HeaderMap, body: String) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Echo {
        method: method.as_str().to_string(),
        query,
        headers,
        body,
    })
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (
        status,
        Json(json!({"message": status.canonical_reason().unwrap_or("unknown"), "code": status.as_u16()})),
    )
        .into_response()
}

async fn redirect(Query(target): Query<Target>) -> Redirect {
    Redirect::temporary(&target.to)
}

async fn slow(Query(delay): Query<Delay>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(delay.ms)).await;
    Json(json!({"slept": delay.ms}))
}

async fn list_records(
    State(db): State<Db>,
    Path(collection): Path<String>,
    Query(filter): Query<HashMap<String, String>>,
) -> Json<Vec<Map<String, Value>>> {
    let db = db.read().await;
    let records = db
        .get(&collection)
        .map(|records| {
            records
                .values()
                .filter(|record| {
                    filter
                        .iter()
                        .all(|(field, wanted)| matches_field(record.get(field), wanted))
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Json(records)
}

fn matches_field(value: Option<&Value>, wanted: &str) -> bool {
    match value {
        Some(Value::String(text)) => text == wanted,
        Some(other) => other.to_string() == wanted,
        None => false,
    }
}

async fn create_record(
    State(db): State<Db>,
    Path(collection): Path<String>,
    Json(mut input): Json<Map<String, Value>>,
) -> (StatusCode, Json<Map<String, Value>>) {
    let id = match input.get("id") {
        Some(Value::String(id)) => id.clone(),
        _ => Uuid::new_v4().to_string(),
    };
    input.insert("id".to_string(), Value::String(id.clone()));
    debug!(%collection, %id, "record created");
    db.write()
        .await
        .entry(collection)
        .or_default()
        .insert(id, input.clone());
    (StatusCode::CREATED, Json(input))
}

async fn get_record(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    let db = db.read().await;
    match db.get(&collection).and_then(|records| records.get(&id)) {
        Some(record) => Json(record.clone()).into_response(),
        None => not_found(&collection, &id),
    }
}

async fn update_record(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
    Json(input): Json<Map<String, Value>>,
) -> Response {
    let mut db = db.write().await;
    let Some(record) = db.get_mut(&collection).and_then(|records| records.get_mut(&id)) else {
        return not_found(&collection, &id);
    };
    for (field, value) in input {
        if field != "id" {
            record.insert(field, value);
        }
    }
    Json(record.clone()).into_response()
}

async fn delete_record(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
) -> Response {
    let mut db = db.write().await;
    match db.get_mut(&collection).and_then(|records| records.remove(&id)) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(&collection, &id),
    }
}
