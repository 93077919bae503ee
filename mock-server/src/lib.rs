use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::info;

pub const DEFAULT_TOKEN: &str = "test-token";
pub const DEFAULT_USERS: [&str; 2] = ["alice", "bob"];
pub const RIGHTS: [&str; 3] = ["read", "write", "manage-collaborators"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub username: String,
    pub rights: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub rights: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub euis: Vec<String>,
    pub collaborators: Vec<Collaborator>,
    pub access_keys: Vec<AccessKey>,
}

#[derive(Deserialize)]
pub struct CreateApplication {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub euis: Vec<String>,
}

#[derive(Deserialize)]
pub struct ChangeName {
    pub name: String,
}

#[derive(Deserialize)]
pub struct RightsBody {
    pub rights: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Default)]
struct Record {
    name: String,
    euis: BTreeSet<String>,
    collaborators: BTreeMap<String, BTreeSet<String>>,
    access_keys: Vec<AccessKey>,
}

impl Record {
    fn to_application(&self, id: &str) -> Application {
        Application {
            id: id.to_string(),
            name: self.name.clone(),
            euis: self.euis.iter().cloned().collect(),
            collaborators: self
                .collaborators
                .iter()
                .map(|(username, rights)| Collaborator {
                    username: username.clone(),
                    rights: rights.iter().cloned().collect(),
                })
                .collect(),
            access_keys: self.access_keys.clone(),
        }
    }
}

#[derive(Default)]
struct Store {
    apps: BTreeMap<String, Record>,
    users: HashSet<String>,
}

impl Store {
    fn record_mut(&mut self, id: &str) -> Result<&mut Record, Rejection> {
        self.apps
            .get_mut(id)
            .ok_or_else(|| Rejection::not_found(format!("application '{id}' does not exist")))
    }

    fn collaborator_target(&mut self, id: &str, username: &str) -> Result<&mut Record, Rejection> {
        if !self.users.contains(username) {
            return Err(Rejection::not_found(format!("user '{username}' does not exist")));
        }
        self.record_mut(id)
    }
}

#[derive(Clone)]
pub struct AppState {
    token: Arc<str>,
    store: Arc<RwLock<Store>>,
}

/// Error response with a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct Rejection {
    status: StatusCode,
    message: String,
}

impl Rejection {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

pub fn app() -> Router {
    app_with(DEFAULT_TOKEN, DEFAULT_USERS)
}

/// Router accepting only `token`, with `users` as the known collaborators.
pub fn app_with<I, S>(token: &str, users: I) -> Router
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let store = Store {
        apps: BTreeMap::new(),
        users: users.into_iter().map(Into::into).collect(),
    };
    let state = AppState {
        token: Arc::from(token),
        store: Arc::new(RwLock::new(store)),
    };
    Router::new()
        .route("/applications", get(list_applications).post(create_application))
        .route(
            "/applications/{id}",
            get(get_application).put(change_name).delete(delete_application),
        )
        .route("/applications/{id}/collaborators/{username}/grant", post(grant))
        .route("/applications/{id}/collaborators/{username}/retract", post(retract))
        .route("/applications/{id}/access-keys", post(add_access_key))
        .route("/applications/{id}/access-keys/{key}", delete(remove_access_key))
        .route("/applications/{id}/euis/{eui}", put(add_eui).delete(remove_eui))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, app()).await
}

pub async fn run_with(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock account server listening");
    }
    axum::serve(listener, router).await
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.token);
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return Rejection::new(StatusCode::UNAUTHORIZED, "missing or invalid access token").into_response();
    }
    next.run(request).await
}

fn normalize_eui(eui: &str) -> Result<String, Rejection> {
    if eui.len() == 16 && eui.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(eui.to_ascii_uppercase())
    } else {
        Err(Rejection::bad_request(format!("'{eui}' is not a valid AppEUI")))
    }
}

fn check_rights(rights: &[String]) -> Result<(), Rejection> {
    if rights.is_empty() {
        return Err(Rejection::bad_request("rights must not be empty"));
    }
    match rights.iter().find(|r| !RIGHTS.contains(&r.as_str())) {
        Some(unknown) => Err(Rejection::bad_request(format!("unknown right '{unknown}'"))),
        None => Ok(()),
    }
}

async fn list_applications(State(state): State<AppState>) -> Json<Vec<Application>> {
    let store = state.store.read().await;
    Json(
        store
            .apps
            .iter()
            .map(|(id, record)| record.to_application(id))
            .collect(),
    )
}

async fn create_application(
    State(state): State<AppState>,
    Json(input): Json<CreateApplication>,
) -> Result<(StatusCode, Json<Application>), Rejection> {
    if input.id.is_empty() || input.name.is_empty() {
        return Err(Rejection::bad_request("id and name are required"));
    }
    let euis = input
        .euis
        .iter()
        .map(|e| normalize_eui(e))
        .collect::<Result<BTreeSet<_>, _>>()?;

    let mut store = state.store.write().await;
    if store.apps.contains_key(&input.id) {
        return Err(Rejection::new(
            StatusCode::CONFLICT,
            format!("application '{}' already exists", input.id),
        ));
    }
    let record = Record {
        name: input.name,
        euis,
        ..Record::default()
    };
    let app = record.to_application(&input.id);
    store.apps.insert(input.id, record);
    Ok((StatusCode::CREATED, Json(app)))
}

async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Application>, Rejection> {
    let store = state.store.read().await;
    store
        .apps
        .get(&id)
        .map(|record| Json(record.to_application(&id)))
        .ok_or_else(|| Rejection::not_found(format!("application '{id}' does not exist")))
}

async fn change_name(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ChangeName>,
) -> Result<Json<Application>, Rejection> {
    if input.name.is_empty() {
        return Err(Rejection::bad_request("name must not be empty"));
    }
    let mut store = state.store.write().await;
    let record = store.record_mut(&id)?;
    record.name = input.name;
    Ok(Json(record.to_application(&id)))
}

async fn delete_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Rejection> {
    let mut store = state.store.write().await;
    store
        .apps
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| Rejection::not_found(format!("application '{id}' does not exist")))
}

async fn grant(
    State(state): State<AppState>,
    Path((id, username)): Path<(String, String)>,
    Json(input): Json<RightsBody>,
) -> Result<StatusCode, Rejection> {
    check_rights(&input.rights)?;
    let mut store = state.store.write().await;
    let record = store.collaborator_target(&id, &username)?;
    record
        .collaborators
        .entry(username)
        .or_default()
        .extend(input.rights);
    Ok(StatusCode::NO_CONTENT)
}

async fn retract(
    State(state): State<AppState>,
    Path((id, username)): Path<(String, String)>,
    Json(input): Json<RightsBody>,
) -> Result<StatusCode, Rejection> {
    check_rights(&input.rights)?;
    let mut store = state.store.write().await;
    let record = store.collaborator_target(&id, &username)?;
    if let Some(held) = record.collaborators.get_mut(&username) {
        for right in &input.rights {
            held.remove(right);
        }
        if held.is_empty() {
            record.collaborators.remove(&username);
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn add_access_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(key): Json<AccessKey>,
) -> Result<(StatusCode, Json<AccessKey>), Rejection> {
    if key.key.is_empty() {
        return Err(Rejection::bad_request("key must not be empty"));
    }
    check_rights_if_any(&key.rights)?;
    let mut store = state.store.write().await;
    let record = store.record_mut(&id)?;
    if record.access_keys.iter().any(|k| k.key == key.key) {
        return Err(Rejection::new(StatusCode::CONFLICT, "access key already exists"));
    }
    record.access_keys.push(key.clone());
    Ok((StatusCode::CREATED, Json(key)))
}

fn check_rights_if_any(rights: &[String]) -> Result<(), Rejection> {
    if rights.is_empty() {
        Ok(())
    } else {
        check_rights(rights)
    }
}

async fn remove_access_key(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<StatusCode, Rejection> {
    let mut store = state.store.write().await;
    let record = store.record_mut(&id)?;
    record.access_keys.retain(|k| k.key != key);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_eui(
    State(state): State<AppState>,
    Path((id, eui)): Path<(String, String)>,
) -> Result<StatusCode, Rejection> {
    let eui = normalize_eui(&eui)?;
    let mut store = state.store.write().await;
    store.record_mut(&id)?.euis.insert(eui);
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_eui(
    State(state): State<AppState>,
    Path((id, eui)): Path<(String, String)>,
) -> Result<StatusCode, Rejection> {
    let eui = normalize_eui(&eui)?;
    let mut store = state.store.write().await;
    store.record_mut(&id)?.euis.remove(&eui);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_serializes_to_json() {
        let record = Record {
            name: "Test".to_string(),
            ..Record::default()
        };
        let json = serde_json::to_value(record.to_application("test-app")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "test-app",
                "name": "Test",
                "euis": [],
                "collaborators": [],
                "access_keys": []
            })
        );
    }

    #[test]
    fn create_application_defaults_euis() {
        let input: CreateApplication = serde_json::from_str(r#"{"name":"A","id":"a"}"#).unwrap();
        assert!(input.euis.is_empty());
    }

    #[test]
    fn create_application_rejects_missing_id() {
        let result: Result<CreateApplication, _> = serde_json::from_str(r#"{"name":"A"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn normalize_eui_uppercases() {
        assert_eq!(normalize_eui("70b3d57ed0000abc").unwrap(), "70B3D57ED0000ABC");
    }

    #[test]
    fn normalize_eui_rejects_bad_width() {
        assert!(normalize_eui("70b3").is_err());
        assert!(normalize_eui("70b3d57ed0000abZ").is_err());
    }

    #[test]
    fn check_rights_rejects_unknown_and_empty() {
        assert!(check_rights(&[]).is_err());
        assert!(check_rights(&["admin".to_string()]).is_err());
        assert!(check_rights(&["read".to_string(), "write".to_string()]).is_ok());
    }

    #[test]
    fn collaborators_are_listed_with_sorted_rights() {
        let mut record = Record::default();
        record
            .collaborators
            .entry("alice".to_string())
            .or_default()
            .extend(["write".to_string(), "read".to_string()]);
        let app = record.to_application("a");
        assert_eq!(
            app.collaborators,
            vec![Collaborator {
                username: "alice".to_string(),
                rights: vec!["read".to_string(), "write".to_string()],
            }]
        );
    }
}
