//! HTTP API for a single learner session.
//!
//! # Endpoints
//!
//! - `GET /api/sets` - Catalog sets with completion aggregates
//! - `POST /api/sets/:name/open` - Replace the session with another set
//! - `GET /api/session` - Session snapshot
//! - `GET /api/exercises` - Filtered exercise list
//! - `POST /api/filter` - Change the level filter
//! - `POST /api/select` - Open an exercise
//! - `POST /api/next`, `/api/prev`, `/api/back` - Navigate
//! - `PUT /api/source` - Replace the editor source, returns the preview
//! - `GET /api/preview` - Current preview as HTML
//! - `POST /api/submit` - Check the current source
//! - `POST /api/hint`, `/api/reveal`, `/api/reset-editor` - Editor actions
//! - `POST /api/reset-progress` - Clear completion (needs confirmation)
//! - `GET /ws` - Live preview socket, see [`crate::websocket`]
//!
//! Transitions that do not apply in the current state answer `200` with
//! `changed: false`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kata_engine::{create_router, AppState, Catalog, Config, MemoryProgressStore};
//!
//! # async fn example() -> kata_engine::Result<()> {
//! let config = Config::default();
//! let catalog = Catalog::load(std::path::Path::new(&config.catalog))?;
//! let state = AppState::new(config, catalog, Arc::new(MemoryProgressStore::new()), None)?;
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use kata_sandbox::Preview;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogSet, LevelFilter};
use crate::config::Config;
use crate::error::{KataError, Result};
use crate::progress::{load_completed, ProgressStore};
use crate::session::{ProgressSummary, Session, SessionSnapshot, VisibleExercise};
use crate::verify::Outcome;
use crate::websocket::{ws_handler, EventBroadcaster, SessionEvent};

// ============================================================================
// Request/Response Types
// ============================================================================

/// One catalog set in the `GET /api/sets` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSummary {
    /// Set name.
    pub name: String,
    /// Progress store key.
    pub key: String,
    /// Whether this set is the open session.
    pub active: bool,
    /// Completion aggregates.
    pub progress: ProgressSummary,
}

/// Request body for `POST /api/filter`.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterRequest {
    /// `"all"` or a level from 1 to 6.
    pub level: LevelFilter,
}

/// Request body for `POST /api/select`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectRequest {
    /// Index of the exercise within the set.
    pub index: usize,
}

/// Request body for `PUT /api/source`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRequest {
    /// The new editor source.
    pub source: String,
}

/// Request body for `POST /api/reset-progress`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetProgressRequest {
    /// Must be `true` for the reset to happen.
    #[serde(default)]
    pub confirm: bool,
}

/// Response body for session transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    /// Whether the transition applied.
    pub changed: bool,
    /// The session after the request.
    pub snapshot: SessionSnapshot,
}

/// Response body for `POST /api/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// The verification outcome.
    pub outcome: Outcome,
    /// Completion aggregates after the submission.
    pub progress: ProgressSummary,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared state for the HTTP and WebSocket handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration the server was started with.
    pub config: Config,
    /// The loaded catalog.
    pub catalog: Arc<Catalog>,
    /// Progress storage shared by every session.
    pub store: Arc<dyn ProgressStore>,
    /// The open session.
    pub session: Arc<Mutex<Session>>,
    /// Event fan-out to WebSocket clients.
    pub broadcaster: EventBroadcaster,
}

impl AppState {
    /// Opens a session on `set_name`, the configured default set, or the
    /// first set in the catalog, in that order.
    ///
    /// # Errors
    ///
    /// Returns `KataError::SetNotFound` if a named set does not exist,
    /// `KataError::CatalogValidationError` if the catalog is empty, and
    /// a sandbox error if the configured limits are invalid.
    pub fn new(
        config: Config,
        catalog: Catalog,
        store: Arc<dyn ProgressStore>,
        set_name: Option<&str>,
    ) -> Result<Self> {
        let name = set_name.or(config.default_set.as_deref());
        let set = match name {
            Some(name) => catalog.set(name)?,
            None => catalog.first().ok_or_else(|| {
                KataError::catalog_validation(
                    "catalog has no exercise sets",
                    "Add at least one set to the catalog",
                )
            })?,
        };
        let session = open_session(&config, set.clone(), Arc::clone(&store))?;
        Ok(Self {
            config,
            catalog: Arc::new(catalog),
            store,
            session: Arc::new(Mutex::new(session)),
            broadcaster: EventBroadcaster::default(),
        })
    }

    /// Runs `work` against the session on the blocking pool.
    ///
    /// Previews and submissions execute learner scripts, so they never run
    /// on an async worker. The session stays locked until `work` returns.
    ///
    /// # Errors
    ///
    /// Returns `KataError::Io` if the blocking task panicked or was
    /// cancelled.
    pub async fn with_session<R, F>(&self, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Session) -> R + Send + 'static,
    {
        let mut session = Arc::clone(&self.session).lock_owned().await;
        tokio::task::spawn_blocking(move || work(&mut session))
            .await
            .map_err(|e| KataError::Io(std::io::Error::other(e)))
    }
}

fn open_session(
    config: &Config,
    set: CatalogSet,
    store: Arc<dyn ProgressStore>,
) -> Result<Session> {
    let mut session = Session::new(set, store, config.sandbox)?;
    session.set_filter(config.default_filter);
    Ok(session)
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The requested set does not exist.
    NotFound(String),
    /// The request needs an open exercise.
    NoActiveExercise,
    /// The engine failed.
    Internal(String),
}

impl From<KataError> for ApiError {
    fn from(err: KataError) -> Self {
        match err {
            KataError::SetNotFound { .. } => Self::NotFound(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::NoActiveExercise => (StatusCode::CONFLICT, "No exercise is open".to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the `/ws` socket.
///
/// CORS allows any origin and every request is traced.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sets", get(handle_sets))
        .route("/sets/:name/open", post(handle_open_set))
        .route("/session", get(handle_session))
        .route("/exercises", get(handle_exercises))
        .route("/filter", post(handle_filter))
        .route("/select", post(handle_select))
        .route("/next", post(handle_next))
        .route("/prev", post(handle_prev))
        .route("/back", post(handle_back))
        .route("/source", put(handle_source))
        .route("/preview", get(handle_preview))
        .route("/submit", post(handle_submit))
        .route("/hint", post(handle_hint))
        .route("/reveal", post(handle_reveal))
        .route("/reset-editor", post(handle_reset_editor))
        .route("/reset-progress", post(handle_reset_progress));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Runs a transition and broadcasts `navigated` when it applied.
async fn transition<F>(state: &AppState, apply: F) -> std::result::Result<Json<TransitionResponse>, ApiError>
where
    F: FnOnce(&mut Session) -> bool + Send + 'static,
{
    let (changed, snapshot) = state
        .with_session(|session| {
            let changed = apply(session);
            (changed, session.snapshot())
        })
        .await?;

    if changed {
        state
            .broadcaster
            .send(SessionEvent::navigated(snapshot.clone()));
    }
    Ok(Json(TransitionResponse { changed, snapshot }))
}

/// Handler for `GET /api/sets`.
async fn handle_sets(State(state): State<Arc<AppState>>) -> Json<Vec<SetSummary>> {
    let session = state.session.lock().await;
    let active_key = session.set().key.clone();
    let active_progress = session.progress();
    drop(session);

    let sets = state
        .catalog
        .sets
        .iter()
        .map(|set| {
            let active = set.key == active_key;
            let progress = if active {
                active_progress.clone()
            } else {
                ProgressSummary::compute(set, &load_completed(state.store.as_ref(), &set.key))
            };
            SetSummary {
                name: set.name.clone(),
                key: set.key.clone(),
                active,
                progress,
            }
        })
        .collect();
    Json(sets)
}

/// Handler for `POST /api/sets/:name/open`.
async fn handle_open_set(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> std::result::Result<Json<SessionSnapshot>, ApiError> {
    let set = state.catalog.set(&name)?.clone();
    let config = state.config.clone();
    let store = Arc::clone(&state.store);
    let snapshot = state
        .with_session(move |session| {
            *session = open_session(&config, set, store)?;
            Ok::<_, KataError>(session.snapshot())
        })
        .await??;

    info!(set = %snapshot.set, "Switched exercise set");
    state
        .broadcaster
        .send(SessionEvent::navigated(snapshot.clone()));
    Ok(Json(snapshot))
}

/// Handler for `GET /api/session`.
async fn handle_session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.lock().await.snapshot())
}

/// Handler for `GET /api/exercises`.
async fn handle_exercises(State(state): State<Arc<AppState>>) -> Json<Vec<VisibleExercise>> {
    Json(state.session.lock().await.visible_exercises())
}

/// Handler for `POST /api/filter`.
async fn handle_filter(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FilterRequest>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, move |session| session.set_filter(request.level)).await
}

/// Handler for `POST /api/select`.
async fn handle_select(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectRequest>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, move |session| session.select(request.index)).await
}

/// Handler for `POST /api/next`.
async fn handle_next(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, Session::next).await
}

/// Handler for `POST /api/prev`.
async fn handle_prev(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, Session::prev).await
}

/// Handler for `POST /api/back`.
async fn handle_back(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, Session::back).await
}

/// Handler for `PUT /api/source`.
async fn handle_source(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SourceRequest>,
) -> std::result::Result<Json<Preview>, ApiError> {
    let (index, preview) = state
        .with_session(move |session| {
            let index = session.active_index()?;
            let preview = session.edit(request.source)?.clone();
            Some((index, preview))
        })
        .await?
        .ok_or(ApiError::NoActiveExercise)?;

    state
        .broadcaster
        .send(SessionEvent::preview(index, preview.clone()));
    Ok(Json(preview))
}

/// Handler for `GET /api/preview`.
async fn handle_preview(State(state): State<Arc<AppState>>) -> std::result::Result<Response, ApiError> {
    let session = state.session.lock().await;
    let editor = session.editor().ok_or(ApiError::NoActiveExercise)?;
    Ok((
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        editor.preview.html.clone(),
    )
        .into_response())
}

/// Handler for `POST /api/submit`.
async fn handle_submit(State(state): State<Arc<AppState>>) -> std::result::Result<Json<SubmitResponse>, ApiError> {
    let (index, outcome, progress) = state
        .with_session(|session| {
            let index = session.active_index()?;
            let outcome = session.submit()?;
            Some((index, outcome, session.progress()))
        })
        .await?
        .ok_or(ApiError::NoActiveExercise)?;

    state.broadcaster.send(SessionEvent::feedback(
        index,
        outcome.clone(),
        progress.clone(),
    ));
    Ok(Json(SubmitResponse { outcome, progress }))
}

/// Handler for `POST /api/hint`.
async fn handle_hint(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, |session| session.toggle_hint().is_some()).await
}

/// Handler for `POST /api/reveal`.
async fn handle_reveal(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, |session| session.reveal().is_some()).await
}

/// Handler for `POST /api/reset-editor`.
async fn handle_reset_editor(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    transition(&state, Session::reset_editor).await
}

/// Handler for `POST /api/reset-progress`.
async fn handle_reset_progress(
    State(state): State<Arc<AppState>>,
    request: Option<Json<ResetProgressRequest>>,
) -> std::result::Result<Json<TransitionResponse>, ApiError> {
    let confirm = request.is_some_and(|Json(request)| request.confirm);
    let (changed, snapshot) = state
        .with_session(move |session| {
            let changed = session.reset_progress(|| confirm);
            (changed, session.snapshot())
        })
        .await?;

    if changed {
        state
            .broadcaster
            .send(SessionEvent::progress_reset(snapshot.set.clone()));
    } else {
        warn!("Progress reset requested without confirmation or outside the listing");
    }
    Ok(Json(TransitionResponse { changed, snapshot }))
}

// ============================================================================
// Tests
// ============================================================================
