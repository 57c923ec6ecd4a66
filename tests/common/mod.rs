//! In-process stub of a CRUD bookstore API.
//!
//! Mirrors the behaviour the harness is built for: `_id` identifiers,
//! `createdAt`/`updatedAt` timestamps, bearer-token auth on writes, `null`
//! (or an empty body, for blogs) after deletion and a 500 with a message for
//! malformed ids.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crudcheck::auth::Credential;
use crudcheck::config::HarnessConfig;

pub const USER_EMAIL: &str = "john.doe@example.com";
pub const USER_PASSWORD: &str = "password123";
pub const ADMIN_EMAIL: &str = "admin@gmail.com";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const INVALID_ID_MESSAGE: &str = "This id is not valid or not Found";
const EXPIRED_TOKEN_MESSAGE: &str = "Not Authorized token expired, Please Login again";

const EPOCH: i64 = 1_704_067_200;

pub fn user() -> Credential {
    Credential::user(USER_EMAIL, USER_PASSWORD)
}

pub fn admin() -> Credential {
    Credential::admin(ADMIN_EMAIL, ADMIN_PASSWORD)
}

#[derive(Default)]
struct Store {
    resources: BTreeMap<String, Vec<Value>>,
    /// token -> is admin
    tokens: BTreeMap<String, bool>,
    logins: BTreeMap<String, usize>,
    next_id: u64,
    clock: i64,
}

impl Store {
    fn tick(&mut self) -> String {
        self.clock += 1;
        DateTime::from_timestamp(EPOCH + self.clock, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn find(&self, resource: &str, id: &str) -> Option<&Value> {
        self.resources
            .get(resource)?
            .iter()
            .find(|r| r["_id"] == id)
    }

    fn caller(&self, headers: &HeaderMap) -> Option<bool> {
        let token = headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.tokens.get(token).copied()
    }

    /// Embeds the referenced category into a book.
    fn expand(&self, resource: &str, record: &Value) -> Value {
        let mut record = record.clone();
        if resource == "book"
            && let Some(id) = record.get("category").and_then(Value::as_str).map(str::to_string)
        {
            record["category"] = self
                .find("category", &id)
                .map(|c| json!({"_id": c["_id"], "title": c["title"]}))
                .unwrap_or(Value::Null);
        }
        record
    }
}

type Shared = Arc<Mutex<Store>>;

pub struct StubApi {
    pub base_url: String,
    store: Shared,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubApi {
    pub async fn spawn() -> Self {
        let store = Shared::default();
        let app = router(store.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub address");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });

        Self {
            base_url: format!("http://{addr}/api"),
            store,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn config(&self) -> HarnessConfig {
        HarnessConfig::for_testing(self.base_url.clone())
    }

    pub fn logins(&self, email: &str) -> usize {
        let store = self.store.lock().expect("stub store");
        store.logins.get(email).copied().unwrap_or(0)
    }

    pub fn count(&self, resource: &str) -> usize {
        let store = self.store.lock().expect("stub store");
        store.resources.get(resource).map_or(0, Vec::len)
    }
}

impl Drop for StubApi {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn router(store: Shared) -> Router {
    Router::new()
        .route("/api/user/login", post(login))
        .route("/api/user/admin-login", post(admin_login))
        .route("/api/slow", get(slow))
        .route("/api/{resource}", get(list).post(create))
        .route(
            "/api/{resource}/{id}",
            get(fetch).put(update).delete(remove),
        )
        .with_state(store)
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({"message": text}))).into_response()
}

fn null() -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "application/json")], "null").into_response()
}

/// Blogs answer with an empty body where other resources answer `null`.
fn absent(resource: &str) -> Response {
    if resource == "blog" {
        StatusCode::OK.into_response()
    } else {
        null()
    }
}

fn valid_id(id: &str) -> bool {
    id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit())
}

fn authenticate(store: &Shared, body: &Value, admin_only: bool) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    let mut store = store.lock().expect("stub store");
    *store.logins.entry(email.to_string()).or_default() += 1;

    let is_admin = match (email, password) {
        (USER_EMAIL, USER_PASSWORD) => false,
        (ADMIN_EMAIL, ADMIN_PASSWORD) => true,
        _ => return message(StatusCode::UNAUTHORIZED, "Invalid Credentials"),
    };
    if admin_only && !is_admin {
        return message(StatusCode::UNAUTHORIZED, "Not Authorised");
    }

    let issued = store.logins.values().sum::<usize>();
    let token = format!("{}-token-{issued}", if is_admin { "admin" } else { "user" });
    store.tokens.insert(token.clone(), is_admin);
    Json(json!({"_id": format!("{issued:024x}"), "email": email, "token": token})).into_response()
}

async fn login(State(store): State<Shared>, Json(body): Json<Value>) -> Response {
    authenticate(&store, &body, false)
}

async fn admin_login(State(store): State<Shared>, Json(body): Json<Value>) -> Response {
    authenticate(&store, &body, true)
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({"ok": true})).into_response()
}

async fn list(State(store): State<Shared>, Path(resource): Path<String>) -> Response {
    let store = store.lock().expect("stub store");
    let records: Vec<Value> = store
        .resources
        .get(&resource)
        .map(|records| records.iter().map(|r| store.expand(&resource, r)).collect())
        .unwrap_or_default();
    Json(Value::Array(records)).into_response()
}

async fn create(
    State(store): State<Shared>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut store = store.lock().expect("stub store");
    let Some(is_admin) = store.caller(&headers) else {
        return message(StatusCode::UNAUTHORIZED, EXPIRED_TOKEN_MESSAGE);
    };
    if resource == "coupon" && !is_admin {
        return message(StatusCode::FORBIDDEN, "You are not an admin");
    }
    let Value::Object(mut record) = body else {
        return message(StatusCode::BAD_REQUEST, "body must be an object");
    };
    if record.get("title").is_some_and(|t| t.as_str().is_some_and(str::is_empty)) {
        return message(StatusCode::BAD_REQUEST, "title is required");
    }

    store.next_id += 1;
    let now = store.tick();
    record.insert("_id".into(), json!(format!("{:024x}", store.next_id)));
    record.insert("createdAt".into(), json!(now));
    record.insert("updatedAt".into(), json!(now));
    let record = Value::Object(record);

    store
        .resources
        .entry(resource.clone())
        .or_default()
        .push(record.clone());
    Json(store.expand(&resource, &record)).into_response()
}

async fn fetch(
    State(store): State<Shared>,
    Path((resource, id)): Path<(String, String)>,
) -> Response {
    if !valid_id(&id) {
        return message(StatusCode::INTERNAL_SERVER_ERROR, INVALID_ID_MESSAGE);
    }
    let store = store.lock().expect("stub store");
    match store.find(&resource, &id) {
        Some(record) => Json(store.expand(&resource, record)).into_response(),
        None => absent(&resource),
    }
}

async fn update(
    State(store): State<Shared>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut store = store.lock().expect("stub store");
    if store.caller(&headers).is_none() {
        return message(StatusCode::UNAUTHORIZED, EXPIRED_TOKEN_MESSAGE);
    }
    if !valid_id(&id) {
        return message(StatusCode::INTERNAL_SERVER_ERROR, INVALID_ID_MESSAGE);
    }
    let now = store.tick();
    let Some(record) = store
        .resources
        .get_mut(&resource)
        .and_then(|records| records.iter_mut().find(|r| r["_id"] == id.as_str()))
    else {
        return absent(&resource);
    };
    if let (Value::Object(target), Value::Object(changes)) = (&mut *record, body) {
        for (key, value) in changes {
            if key != "_id" && key != "createdAt" {
                target.insert(key, value);
            }
        }
        target.insert("updatedAt".into(), json!(now));
    }
    let record = record.clone();
    Json(store.expand(&resource, &record)).into_response()
}

async fn remove(
    State(store): State<Shared>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut store = store.lock().expect("stub store");
    if store.caller(&headers).is_none() {
        return message(StatusCode::UNAUTHORIZED, EXPIRED_TOKEN_MESSAGE);
    }
    if !valid_id(&id) {
        return message(StatusCode::INTERNAL_SERVER_ERROR, INVALID_ID_MESSAGE);
    }
    let Some(records) = store.resources.get_mut(&resource) else {
        return absent(&resource);
    };
    match records.iter().position(|r| r["_id"] == id.as_str()) {
        Some(index) => Json(records.remove(index)).into_response(),
        None => absent(&resource),
    }
}
