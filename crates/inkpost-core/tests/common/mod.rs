//! In-process stand-in for an inkpost server.
//!
//! Serves the `/api/v1` routes on an ephemeral port and records every
//! request's method, path and `Authorization` header so tests can check
//! what the client actually sent.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const USERNAME: &str = "mei";
pub const PASSWORD: &str = "hunter22";
pub const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOjcsInVzbiI6Im1laSJ9.c2ln";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Recorded {
        self.requests().last().cloned().expect("no request recorded")
    }
}

pub struct MockServer {
    pub base_url: String,
    pub recorder: Recorder,
}

/// Start the mock server on a random port.
pub async fn spawn() -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorder = Recorder::default();
    let app = app(recorder.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockServer {
        base_url: format!("http://{addr}/api/v1"),
        recorder,
    }
}

/// A base URL nothing is listening on.
pub fn unreachable_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api/v1")
}

pub fn sample_post(id: u64) -> Value {
    json!({
        "id": id,
        "title": "Hello, inkpost",
        "content": "First paragraph.\nSecond paragraph.",
        "cover_image_url": "",
        "author_id": 7,
        "author": {"id": 7, "username": USERNAME, "bio": "", "avatar_url": "", "created_at": "2024-03-01T08:00:00+08:00"},
        "created_at": "2024-03-02T09:30:00+08:00",
        "updated_at": "2024-03-02T09:30:00+08:00"
    })
}

fn app(recorder: Recorder) -> Router {
    let api = Router::new()
        .route("/posts/", get(list_posts))
        .route("/posts", post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/author/{id}", get(get_author))
        .route("/upload/", post(upload));

    Router::new()
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(recorder.clone(), record))
        .with_state(recorder)
}

async fn record(State(recorder): State<Recorder>, request: Request, next: Next) -> Response {
    // Scoped so the borrow of the request ends before it is moved on
    let recorded = {
        let header_str = |name: header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Recorded {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            authorization: header_str(header::AUTHORIZATION),
            content_type: header_str(header::CONTENT_TYPE),
        }
    };
    recorder.requests.lock().unwrap().push(recorded);
    next.run(request).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {TOKEN}").as_str())
}

#[derive(Deserialize)]
struct Pagination {
    page: Option<i64>,
    limit: Option<i64>,
}

async fn list_posts(Query(p): Query<Pagination>) -> Json<Value> {
    let page = p.page.unwrap_or(1).max(1);
    let limit = p.limit.unwrap_or(10);
    let posts: Vec<Value> = (1..=limit.clamp(0, 3) as u64)
        .map(|i| sample_post((page as u64 - 1) * 100 + i))
        .collect();
    Json(Value::Array(posts))
}

async fn get_post(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "1" => Json(sample_post(1)).into_response(),
        "boom" => error(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable"),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(sample_post(1)).into_response()
        }
        "plain" => (StatusCode::OK, "just text").into_response(),
        _ => error(StatusCode::NOT_FOUND, "post not found"),
    }
}

async fn create_post(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid token");
    }
    let mut post = sample_post(42);
    post["title"] = body["title"].clone();
    post["content"] = body["content"].clone();
    (StatusCode::CREATED, Json(post)).into_response()
}

async fn update_post(headers: HeaderMap, Path(id): Path<u64>, Json(body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid token");
    }
    if id != 1 {
        return error(StatusCode::NOT_FOUND, "post not found");
    }
    let mut post = sample_post(id);
    post["title"] = body["title"].clone();
    Json(post).into_response()
}

async fn delete_post(headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid token");
    }
    if id != 1 {
        return error(StatusCode::NOT_FOUND, "post not found");
    }
    Json(json!({"message": "deleted"})).into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["username"] == USERNAME && body["password"] == PASSWORD {
        Json(json!({ "token": TOKEN })).into_response()
    } else {
        error(StatusCode::UNAUTHORIZED, "invalid username or password")
    }
}

async fn signup(Json(body): Json<Value>) -> Response {
    if body["username"] == USERNAME {
        return error(StatusCode::CONFLICT, "username or email already exists");
    }
    (StatusCode::CREATED, Json(json!({"message": "created"}))).into_response()
}

async fn get_author(Path(id): Path<u64>) -> Response {
    if id == 7 {
        Json(sample_post(1)["author"].clone()).into_response()
    } else {
        error(StatusCode::NOT_FOUND, "author not found")
    }
}

async fn upload(headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid token");
    }
    let multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&body);
    if !multipart || !body.contains("name=\"file\"") {
        return error(StatusCode::BAD_REQUEST, "no file field");
    }
    Json(json!({"message": "uploaded", "url": "/uploads/1_ab.png", "filename": "1_ab.png"}))
        .into_response()
}
