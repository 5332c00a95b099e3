//! Axum web server for the report wizard.
//!
//! Every wizard step has its own endpoint. Handlers parse the request into
//! the step's input, run the step against the shared store and translate
//! the [`StepOutcome`] into a response: redirects become `303 See Other`,
//! pages are returned as JSON.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::columns::DISPLAY_FIELDS;
use crate::filter::RawQuery;
use crate::site::SiteRegistry;
use crate::store::Store;
use crate::wizard::{
    AdminForm, DetailsForm, Notice, ResultsParams, SaveOptions, StepOutcome, Wizard, WizardError,
    WizardResult,
};

/// Cookie carrying the wizard session id.
pub const SESSION_COOKIE: &str = "reportkit_session";

/// Header naming the authenticated requester.
pub const USER_HEADER: &str = "x-report-user";

/// Application state shared across handlers
pub struct AppState {
    pub registry: SiteRegistry,
    /// The store is a single SQLite connection; requests take turns.
    pub store: Mutex<Store>,
}

impl AppState {
    pub fn new(registry: SiteRegistry, store: Store) -> Self {
        Self {
            registry,
            store: Mutex::new(store),
        }
    }
}

/// Build the axum router with all routes
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/{site}", get(index))
        .route("/{site}/fields", get(fields))
        .route("/{site}/columns", get(columns))
        .route("/{site}/results", get(results))
        .route("/{site}/save", post(save))
        .route("/{site}/reset", get(reset))
        .route("/{site}/admin", get(admin).post(admin_submit))
        .route("/{site}/column/remove/{relation}", post(remove_column))
        // Report-scoped routes
        .route("/{site}/{report_id}/recall", get(recall))
        .route("/{site}/{report_id}/details", get(details).post(details_submit))
        .route("/{site}/{report_id}/delete", post(delete_report))
        .route("/{site}/{report_id}/fields", get(report_fields))
        .route("/{site}/{report_id}/columns", get(report_columns))
        .route("/{site}/{report_id}/results", get(report_results))
        .route("/{site}/{report_id}/save", post(report_save))
        .layer(cors)
        .with_state(state)
}

/// Start the web server
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "reportkit listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures that end a request without a wizard outcome.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Site '{0}' not found")]
    SiteNotFound(String),

    #[error(transparent)]
    Wizard(#[from] WizardError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SiteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Wizard(err) if err.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Wizard(WizardError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            ApiError::Wizard(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Request context
// ============================================================================

struct SessionCookie {
    id: String,
    fresh: bool,
}

fn session_cookie(headers: &HeaderMap) -> SessionCookie {
    let existing = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| {
            !value.is_empty()
                && value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    match existing {
        Some(id) => SessionCookie {
            id: id.to_string(),
            fresh: false,
        },
        None => SessionCookie {
            id: uuid::Uuid::new_v4().to_string(),
            fresh: true,
        },
    }
}

fn requester(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
}

/// Run one wizard step for the site named in the path.
async fn run_step<F>(state: &AppState, site: &str, headers: &HeaderMap, step: F) -> Response
where
    F: FnOnce(&Wizard<'_>) -> WizardResult<StepOutcome>,
{
    let Some(site) = state.registry.get(site) else {
        return ApiError::SiteNotFound(site.to_string()).into_response();
    };
    let session = session_cookie(headers);
    let user = requester(headers);

    let result = {
        let store = state.store.lock().await;
        let wizard = Wizard::new(&site, &store, &session.id, user.as_deref());
        step(&wizard)
    };

    let mut response = match result {
        Ok(outcome) => outcome_response(outcome),
        Err(err) => ApiError::from(err).into_response(),
    };

    if session.fresh {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, session.id
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

#[derive(Serialize)]
struct RedirectBody {
    redirect: String,
    notices: Vec<Notice>,
}

fn outcome_response(outcome: StepOutcome) -> Response {
    match outcome {
        StepOutcome::Redirect { to, notices } => {
            let url = to.url();
            (
                StatusCode::SEE_OTHER,
                [(header::LOCATION, url.clone())],
                Json(RedirectBody {
                    redirect: url,
                    notices,
                }),
            )
                .into_response()
        }
        page => (StatusCode::OK, Json(page)).into_response(),
    }
}

// ============================================================================
// Query parsing
// ============================================================================

type Pairs = Vec<(String, String)>;

fn column_selection(pairs: &Pairs) -> Option<Vec<String>> {
    let selected: Vec<String> = pairs
        .iter()
        .filter(|(key, _)| key == DISPLAY_FIELDS)
        .map(|(_, value)| value.clone())
        .collect();
    if pairs.iter().any(|(key, _)| key == DISPLAY_FIELDS) {
        Some(selected)
    } else {
        None
    }
}

fn last_value<'a>(pairs: &'a Pairs, key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn results_params(pairs: &Pairs) -> ResultsParams {
    ResultsParams {
        page: last_value(pairs, "page").and_then(|p| p.parse().ok()),
        ordering: last_value(pairs, "o")
            .filter(|o| !o.is_empty())
            .map(str::to_string),
    }
}

fn save_options(pairs: &Pairs) -> SaveOptions {
    SaveOptions {
        as_new: last_value(pairs, "as_new")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false),
        return_url: last_value(pairs, "return_url")
            .filter(|url| !url.is_empty())
            .map(str::to_string),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /{site} - Saved reports of the requester
async fn index(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    headers: HeaderMap,
) -> Response {
    run_step(&state, &site, &headers, |w| w.index()).await
}

/// GET /{site}/fields - Filter form; a non-empty query is a submission
async fn fields(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let raw: RawQuery = pairs.into_iter().collect();
    run_step(&state, &site, &headers, |w| w.fields(None, Some(&raw))).await
}

/// GET /{site}/{report_id}/fields
async fn report_fields(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let raw: RawQuery = pairs.into_iter().collect();
    run_step(&state, &site, &headers, |w| {
        w.fields(Some(&report_id), Some(&raw))
    })
    .await
}

/// GET /{site}/columns - Column form; `display_fields` values are a submission
async fn columns(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let selection = column_selection(&pairs);
    run_step(&state, &site, &headers, |w| {
        w.columns(None, selection.as_deref())
    })
    .await
}

/// GET /{site}/{report_id}/columns
async fn report_columns(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let selection = column_selection(&pairs);
    run_step(&state, &site, &headers, |w| {
        w.columns(Some(&report_id), selection.as_deref())
    })
    .await
}

/// GET /{site}/results - One page of results (`page`, `o`)
async fn results(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let params = results_params(&pairs);
    run_step(&state, &site, &headers, |w| w.results(None, &params)).await
}

/// GET /{site}/{report_id}/results
async fn report_results(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let params = results_params(&pairs);
    run_step(&state, &site, &headers, |w| {
        w.results(Some(&report_id), &params)
    })
    .await
}

/// POST /{site}/save - Save the session as a new report
async fn save(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let options = save_options(&pairs);
    run_step(&state, &site, &headers, |w| w.save(None, &options)).await
}

/// POST /{site}/{report_id}/save - Update a report, or copy it with `as_new`
async fn report_save(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    Query(pairs): Query<Pairs>,
    headers: HeaderMap,
) -> Response {
    let options = save_options(&pairs);
    run_step(&state, &site, &headers, |w| {
        w.save(Some(&report_id), &options)
    })
    .await
}

/// GET /{site}/reset - Clear the in-progress report
async fn reset(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    headers: HeaderMap,
) -> Response {
    run_step(&state, &site, &headers, |w| w.reset()).await
}

/// GET /{site}/{report_id}/recall - Load a saved report into the session
async fn recall(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    run_step(&state, &site, &headers, |w| w.recall(&report_id)).await
}

/// GET /{site}/{report_id}/details - Show a saved report
async fn details(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    run_step(&state, &site, &headers, |w| w.details(&report_id, None)).await
}

#[derive(Deserialize)]
struct DetailsRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
}

/// POST /{site}/{report_id}/details - Update name and description
async fn details_submit(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<DetailsRequest>,
) -> Response {
    let form = DetailsForm {
        name: req.name,
        description: req.description,
    };
    run_step(&state, &site, &headers, |w| {
        w.details(&report_id, Some(&form))
    })
    .await
}

/// POST /{site}/{report_id}/delete - Delete a report owned by the requester
async fn delete_report(
    State(state): State<Arc<AppState>>,
    Path((site, report_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    run_step(&state, &site, &headers, |w| w.delete(&report_id)).await
}

/// GET /{site}/admin - Column registrations
async fn admin(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    headers: HeaderMap,
) -> Response {
    run_step(&state, &site, &headers, |w| w.admin(None)).await
}

#[derive(Deserialize)]
struct RenameRequest {
    relation: String,
    human_name: String,
}

#[derive(Deserialize)]
struct AdminRequest {
    #[serde(default)]
    register: Vec<String>,
    #[serde(default)]
    rename: Vec<RenameRequest>,
}

/// POST /{site}/admin - Register and rename columns
async fn admin_submit(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AdminRequest>,
) -> Response {
    let form = AdminForm {
        register: req.register,
        rename: req
            .rename
            .into_iter()
            .map(|r| (r.relation, r.human_name))
            .collect(),
    };
    run_step(&state, &site, &headers, |w| w.admin(Some(&form))).await
}

/// POST /{site}/column/remove/{relation} - Unregister a column
async fn remove_column(
    State(state): State<Arc<AppState>>,
    Path((site, relation)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    run_step(&state, &site, &headers, |w| w.remove_column(&relation)).await
}
