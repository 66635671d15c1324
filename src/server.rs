//!
//! medilink HTTP server
//! --------------------
//! Axum front for the portal. Each browser client is identified by an
//! HttpOnly cookie and owns one `SessionStore`; the identity directory and
//! profile table are shared by all clients.
//!
//! Responsibilities:
//! - Client registry keyed by cookie, with an idle sweeper that disposes stores.
//! - Auth actions (sign-in, sign-up, sign-out, demo) returning state and effects.
//! - Route guard evaluation for page navigations (`/nav`).
//! - Guarded portal data endpoints under `/api`, including prescription writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router};
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PortalConfig;
use crate::error::{AppError, SessionError};
use crate::guard::{GuardDecision, RouteRequirement};
use crate::identity::{
    AuthSnapshot, IdentityDirectory, LocalIdentityProvider, MemoryProfileStore, Outcome, PatientQuery, Profile,
    ProfilePatch, ProfileStore, Role, SessionStore, SignUpMetadata, StoreConfig, TracingSink,
};
use crate::portal::models::RecordCategory;
use crate::portal::{queries, PortalData, PrescriptionBook, PrescriptionDraft, Submit, Viewer};
use crate::routes;

const CLIENT_COOKIE: &str = "medilink_client";

/// One browser client: its session store and when it was last seen.
pub struct Client {
    pub id: String,
    pub store: Arc<SessionStore>,
    last_seen: Mutex<Instant>,
}

impl Client {
    fn touch(&self) { *self.last_seen.lock() = Instant::now(); }

    fn idle_for(&self) -> Duration { self.last_seen.lock().elapsed() }
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
    pub fn get(&self, id: &str) -> Option<Arc<Client>> { self.clients.read().get(id).cloned() }

    pub fn len(&self) -> usize { self.clients.read().len() }

    pub fn is_empty(&self) -> bool { self.clients.read().is_empty() }

    fn insert(&self, client: Arc<Client>) -> Arc<Client> {
        let mut map = self.clients.write();
        map.entry(client.id.clone()).or_insert(client).clone()
    }

    /// Dispose and drop clients idle longer than `max_idle`. Returns how many were removed.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let stale: Vec<Arc<Client>> = {
            let mut map = self.clients.write();
            let ids: Vec<String> = map.iter().filter(|(_, c)| c.idle_for() >= max_idle).map(|(k, _)| k.clone()).collect();
            ids.iter().filter_map(|k| map.remove(k)).collect()
        };
        for c in stale.iter() {
            c.store.dispose();
        }
        stale.len()
    }
}

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<IdentityDirectory>,
    pub profiles: Arc<MemoryProfileStore>,
    pub data: Arc<PortalData>,
    pub prescriptions: Arc<PrescriptionBook>,
    pub clients: Arc<ClientRegistry>,
    pub store_config: StoreConfig,
}

impl AppState {
    /// Build the shared state, seeding demo accounts when configured.
    pub fn build(config: &PortalConfig) -> anyhow::Result<Self> {
        let directory = Arc::new(IdentityDirectory::new(config.directory()));
        let profiles = Arc::new(MemoryProfileStore::new());
        let data = Arc::new(PortalData::demo());
        if config.seed_demo_accounts {
            crate::seed::seed_demo(&directory, &profiles, &data).context("while seeding demo accounts")?;
        }
        Ok(Self {
            directory,
            profiles,
            data,
            prescriptions: Arc::new(PrescriptionBook::new()),
            clients: Arc::new(ClientRegistry::default()),
            store_config: config.store(),
        })
    }

    fn new_client(&self, id: String) -> Arc<Client> {
        let identity = Arc::new(LocalIdentityProvider::new(self.directory.clone()));
        let store = SessionStore::create(identity, self.profiles.clone(), Arc::new(TracingSink), self.store_config.clone());
        Arc::new(Client { id, store, last_seen: Mutex::new(Instant::now()) })
    }
}

// ---------- errors ----------

/// Handler failure: a domain error, or a guard decision that is not `Allow`.
#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    Guard(GuardDecision),
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self { ApiError::App(e) }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self { ApiError::App(e.into()) }
}

/// Location for a redirect, with the origin carried as `?from=`.
fn redirect_location(path: &str, from: Option<&str>) -> String {
    match from {
        Some(f) => format!("{}?from={}", path, urlencoding::encode(f)),
        None => path.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::App(e) => {
                let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(json!({"status":"error","code": e.code_str(),"error": e.message()}))).into_response()
            }
            ApiError::Guard(decision) => match &decision {
                GuardDecision::RedirectTo(r) => {
                    let status = if r.path == routes::LOGIN { StatusCode::UNAUTHORIZED } else { StatusCode::FORBIDDEN };
                    let location = redirect_location(&r.path, r.from.as_deref());
                    (status, Json(json!({"status":"redirect","location": location,"guard": decision}))).into_response()
                }
                GuardDecision::ShowLoading => {
                    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status":"loading","guard": decision}))).into_response()
                }
                GuardDecision::Allow => StatusCode::OK.into_response(),
            },
        }
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

// ---------- client cookie ----------

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get(header::COOKIE)?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some((k, v)) = p.split_once('=') {
            if k == name {
                return Some(v.to_string());
            }
        }
    }
    None
}

fn client_cookie(id: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Strict; Path=/", CLIENT_COOKIE, id)).ok()
}

/// Resolve (or mint) the caller's client and make sure its store has finished
/// the initial session check.
async fn attach_client(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let known = parse_cookie(req.headers(), CLIENT_COOKIE).and_then(|id| state.clients.get(&id));
    let (client, minted) = match known {
        Some(c) => (c, false),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            debug!(target: "server", client = %id, "new client");
            (state.clients.insert(state.new_client(id)), true)
        }
    };
    client.touch();
    client.store.initialize().await;
    req.extensions_mut().insert(client.clone());
    let mut res = next.run(req).await;
    if minted {
        if let Some(v) = client_cookie(&client.id) {
            res.headers_mut().append(header::SET_COOKIE, v);
        }
    }
    res
}

// ---------- payloads ----------

#[derive(Debug, Deserialize)]
struct SignInPayload {
    email: String,
    password: String,
    #[serde(default)]
    return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignUpPayload {
    email: String,
    password: String,
    full_name: String,
    user_type: Role,
}

#[derive(Debug, Deserialize)]
struct DemoPayload { role: Role }

#[derive(Debug, Deserialize)]
struct NavParams { path: String }

#[derive(Debug, Deserialize, Default)]
struct DateParams { date: Option<NaiveDate> }

#[derive(Debug, Deserialize, Default)]
struct MessageParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    unread: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RecordParams {
    #[serde(default)]
    q: String,
    category: Option<RecordCategory>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize, Default)]
struct PrescriptionParams {
    patient: Option<String>,
}

fn outcome_body(outcome: &Outcome, snapshot: &AuthSnapshot) -> serde_json::Value {
    json!({"status":"ok","state": snapshot,"effects": outcome.effects})
}

fn today(requested: Option<NaiveDate>) -> NaiveDate {
    requested.unwrap_or_else(|| chrono::Local::now().date_naive())
}

// ---------- auth handlers ----------

async fn auth_state(Extension(client): Extension<Arc<Client>>) -> Json<AuthSnapshot> {
    Json(client.store.snapshot())
}

async fn sign_in(Extension(client): Extension<Arc<Client>>, Json(payload): Json<SignInPayload>) -> ApiResult {
    let outcome = client.store.sign_in_returning(&payload.email, &payload.password, payload.return_to).await?;
    Ok(Json(outcome_body(&outcome, &client.store.snapshot())))
}

async fn sign_up(Extension(client): Extension<Arc<Client>>, Json(payload): Json<SignUpPayload>) -> ApiResult {
    let meta = SignUpMetadata { full_name: payload.full_name, user_type: payload.user_type };
    let receipt = client.store.sign_up(&payload.email, &payload.password, meta).await?;
    Ok(Json(json!({
        "status":"ok",
        "identity_id": receipt.identity_id,
        "email": receipt.email,
        "requires_verification": receipt.requires_verification,
    })))
}

async fn sign_out(Extension(client): Extension<Arc<Client>>) -> Json<serde_json::Value> {
    let outcome = client.store.sign_out().await;
    Json(outcome_body(&outcome, &client.store.snapshot()))
}

async fn demo(Extension(client): Extension<Arc<Client>>, Json(payload): Json<DemoPayload>) -> Json<serde_json::Value> {
    let outcome = client.store.set_demo_mode(payload.role).await;
    Json(outcome_body(&outcome, &client.store.snapshot()))
}

async fn update_profile(Extension(client): Extension<Arc<Client>>, Json(patch): Json<ProfilePatch>) -> ApiResult {
    let outcome = client.store.update_profile(patch).await?;
    Ok(Json(outcome_body(&outcome, &client.store.snapshot())))
}

async fn nav(Extension(client): Extension<Arc<Client>>, Query(params): Query<NavParams>) -> ApiResult {
    let Some(route) = routes::lookup(&params.path) else {
        return Err(AppError::not_found("unknown_route".to_string(), format!("no route for {}", params.path)).into());
    };
    let decision = client.store.guard(&params.path, &route.requirement);
    let snapshot = client.store.snapshot();
    let items = snapshot.role().map(|r| routes::nav_items(r, &params.path)).unwrap_or_default();
    let location = match &decision {
        GuardDecision::RedirectTo(r) => Some(redirect_location(&r.path, r.from.as_deref())),
        _ => None,
    };
    Ok(Json(json!({
        "status":"ok",
        "route": route,
        "guard": decision,
        "location": location,
        "nav": items,
        "state": snapshot,
    })))
}

// ---------- portal data ----------

/// Guard the page that owns a data endpoint and return the viewer's profile.
fn require(client: &Client, page: &str) -> Result<Profile, ApiError> {
    let requirement = routes::lookup(page).map(|r| r.requirement).unwrap_or(RouteRequirement::SIGNED_IN);
    require_with(client, page, &requirement)
}

fn require_with(client: &Client, page: &str, requirement: &RouteRequirement) -> Result<Profile, ApiError> {
    match client.store.guard(page, requirement) {
        GuardDecision::Allow => client
            .store
            .snapshot()
            .profile
            .ok_or_else(|| ApiError::App(AppError::auth("not_authenticated", "sign in required"))),
        other => {
            debug!(target: "guard", page = %page, decision = ?other, "data request refused");
            Err(ApiError::Guard(other))
        }
    }
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Query(params): Query<DateParams>,
) -> ApiResult {
    // Either role's dashboard: only sign-in is required here.
    let profile = require_with(&client, routes::PATIENT_HOME, &RouteRequirement::SIGNED_IN)?;
    let viewer = Viewer::for_profile(&profile);
    let view = queries::dashboard(&state.data, &viewer, today(params.date));
    Ok(Json(json!({"status":"ok","viewer": viewer,"dashboard": view})))
}

async fn appointments(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Query(params): Query<DateParams>,
) -> ApiResult {
    let profile = require(&client, "/appointments")?;
    let viewer = Viewer::for_profile(&profile);
    let by_date = queries::appointments_by_date(&state.data, &viewer);
    let marked: Vec<NaiveDate> = by_date.keys().copied().collect();
    let selected = today(params.date);
    let on_day = queries::appointments_on(&state.data, &viewer, selected);
    Ok(Json(json!({
        "status":"ok",
        "date": selected,
        "appointments": on_day,
        "upcoming": queries::upcoming_appointments(&state.data, &viewer, None),
        "marked_dates": marked,
    })))
}

async fn messages(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Query(params): Query<MessageParams>,
) -> ApiResult {
    let profile = require(&client, "/messages")?;
    let viewer = Viewer::for_profile(&profile);
    let found = queries::search_messages(&state.data, &viewer, &params.q, params.unread);
    Ok(Json(json!({
        "status":"ok",
        "messages": found,
        "unread": queries::unread_count(&state.data, &viewer),
    })))
}

async fn records(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Query(params): Query<RecordParams>,
) -> ApiResult {
    let profile = require(&client, "/records")?;
    let viewer = Viewer::for_profile(&profile);
    let found = queries::search_records(&state.data, &viewer, &params.q, params.category);
    Ok(Json(json!({"status":"ok","records": found})))
}

async fn tasks(State(state): State<AppState>, Extension(client): Extension<Arc<Client>>) -> ApiResult {
    let profile = require(&client, routes::PROVIDER_HOME)?;
    let viewer = Viewer::for_profile(&profile);
    Ok(Json(json!({"status":"ok","tasks": queries::open_tasks(&state.data, &viewer.subject_id)})))
}

async fn patients(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Query(params): Query<SearchParams>,
) -> ApiResult {
    require(&client, "/patients")?;
    let term = params.q.trim();
    let by_id = state.profiles.search_patients(&PatientQuery::Id(term.to_string())).await.map_err(AppError::from)?;
    let profiles = if by_id.is_empty() {
        state.profiles.search_patients(&PatientQuery::Name(term.to_string())).await.map_err(AppError::from)?
    } else {
        by_id
    };
    let records = queries::search_patient_records(&state.data, term);
    Ok(Json(json!({"status":"ok","profiles": profiles,"records": records})))
}

async fn list_prescriptions(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Query(params): Query<PrescriptionParams>,
) -> ApiResult {
    let profile = require(&client, "/records")?;
    let viewer = Viewer::for_profile(&profile);
    let found = state.prescriptions.visible_to(&viewer, params.patient.as_deref());
    Ok(Json(json!({"status":"ok","prescriptions": found})))
}

/// Whether `id` names a patient, in the fixture list or the profile table.
async fn patient_exists(state: &AppState, id: Option<&str>) -> Result<bool, ApiError> {
    let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) else { return Ok(false) };
    if state.data.patient(id).is_some() {
        return Ok(true);
    }
    let rows = state.profiles.search_patients(&PatientQuery::Id(id.to_string())).await.map_err(AppError::from)?;
    Ok(!rows.is_empty())
}

async fn write_prescription(state: &AppState, client: &Client, target: Submit, draft: PrescriptionDraft) -> ApiResult {
    let profile = require(client, routes::PROVIDER_HOME)?;
    let viewer = Viewer::for_profile(&profile);
    let known = patient_exists(state, draft.patient_id.as_deref()).await?;
    let saved = state
        .prescriptions
        .submit(Some(&viewer), target, &draft, &|_: &str| known, &TracingSink)
        .map_err(AppError::from)?;
    Ok(Json(json!({"status":"ok","prescription": saved.prescription,"effects": saved.effects})))
}

async fn create_prescription(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Json(draft): Json<PrescriptionDraft>,
) -> ApiResult {
    write_prescription(&state, &client, Submit::Create, draft).await
}

async fn update_prescription(
    State(state): State<AppState>,
    Extension(client): Extension<Arc<Client>>,
    Path(id): Path<String>,
    Json(draft): Json<PrescriptionDraft>,
) -> ApiResult {
    write_prescription(&state, &client, Submit::Update(id), draft).await
}

// ---------- wiring ----------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/state", get(auth_state))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/demo", post(demo))
        .route("/profile", patch(update_profile))
        .route("/nav", get(nav))
        .route("/api/dashboard", get(dashboard))
        .route("/api/appointments", get(appointments))
        .route("/api/messages", get(messages))
        .route("/api/records", get(records))
        .route("/api/tasks", get(tasks))
        .route("/api/patients", get(patients))
        .route("/api/prescriptions", get(list_prescriptions).post(create_prescription))
        .route("/api/prescriptions/{id}", patch(update_prescription))
        .route_layer(middleware::from_fn_with_state(state.clone(), attach_client))
        .route("/", get(|| async { "medilink ok" }))
        .with_state(state)
}

/// Background ticker disposing clients that stopped making requests.
pub fn spawn_client_sweeper(clients: &Arc<ClientRegistry>, every: Duration, max_idle: Duration) -> JoinHandle<()> {
    let clients = Arc::downgrade(clients);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let Some(clients) = clients.upgrade() else { break };
            let removed = clients.sweep_idle(max_idle);
            if removed > 0 {
                debug!(target: "server", removed = removed, "idle clients disposed");
            }
        }
    })
}

/// Serve on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}

pub async fn run(config: PortalConfig) -> anyhow::Result<()> {
    let state = AppState::build(&config)?;
    let _expiry = state.directory.spawn_expiry_sweeper(config.sweep_interval);
    let _idle = spawn_client_sweeper(&state.clients, config.sweep_interval, config.client_idle_timeout);

    let addr = config.addr();
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    info!(target: "server", "medilink listening on {}", addr);
    if !config.seed_demo_accounts {
        warn!(target: "server", "demo accounts not seeded; only sign-up and demo mode are available");
    }
    serve(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_parsing_finds_named_value() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("a=1; medilink_client=abc-123; b=2"));
        assert_eq!(parse_cookie(&h, CLIENT_COOKIE).as_deref(), Some("abc-123"));
        assert_eq!(parse_cookie(&h, "missing"), None);
    }

    #[test]
    fn redirect_location_encodes_origin() {
        assert_eq!(redirect_location("/login", Some("/provider/patient/p1")), "/login?from=%2Fprovider%2Fpatient%2Fp1");
        assert_eq!(redirect_location("/dashboard", None), "/dashboard");
    }

    #[tokio::test]
    async fn idle_clients_are_swept_and_disposed() {
        let config = PortalConfig { seed_demo_accounts: false, ..PortalConfig::default() };
        let state = AppState::build(&config).unwrap();
        let client = state.clients.insert(state.new_client("c1".into()));
        assert_eq!(state.clients.len(), 1);
        assert_eq!(state.clients.sweep_idle(Duration::from_secs(3600)), 0);
        assert_eq!(state.clients.sweep_idle(Duration::ZERO), 1);
        assert!(state.clients.is_empty());
        assert!(!client.store.is_subscribed());
    }
}
