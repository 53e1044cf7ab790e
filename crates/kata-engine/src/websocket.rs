//! WebSocket live preview.
//!
//! Clients connected to `/ws` receive a `connected` event with the session
//! snapshot, then every event the session produces, whichever client (or
//! HTTP request) caused it. Clients drive the editor by sending:
//!
//! - `{"type": "source", "source": "..."}` on every keystroke
//! - `{"type": "submit"}` to check the current source
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the snapshot
//! - `preview` - The preview was re-rendered
//! - `feedback` - A submission was checked
//! - `navigated` - The view, filter or open set changed
//! - `progress_reset` - Completion was cleared
//! - `error` - A client message could not be handled
//!
//! # Example
//!
//! ```no_run
//! use kata_engine::websocket::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::error("something went wrong"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use kata_sandbox::Preview;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::session::{ProgressSummary, SessionSnapshot};
use crate::verify::Outcome;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as it is now.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `preview` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewPayload {
    /// Index of the exercise the preview belongs to.
    pub index: usize,
    /// The rendered preview.
    pub preview: Preview,
}

/// Payload for the `feedback` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    /// Index of the exercise that was submitted.
    pub index: usize,
    /// The verification outcome.
    pub outcome: Outcome,
    /// Completion aggregates after the submission.
    pub progress: ProgressSummary,
    /// When the submission was checked.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `navigated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigatedPayload {
    /// The session after the change.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `progress_reset` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResetPayload {
    /// Name of the set whose progress was cleared.
    pub set: String,
    /// When progress was cleared.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events pushed to WebSocket clients.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when the preview changes.
    Preview(PreviewPayload),
    /// Sent when a submission is checked.
    Feedback(FeedbackPayload),
    /// Sent when the view changes.
    Navigated(NavigatedPayload),
    /// Sent when progress is cleared.
    ProgressReset(ProgressResetPayload),
    /// Sent when a client message fails.
    Error(ErrorPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(snapshot: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { snapshot })
    }

    /// Creates a `Preview` event.
    #[must_use]
    pub const fn preview(index: usize, preview: Preview) -> Self {
        Self::Preview(PreviewPayload { index, preview })
    }

    /// Creates a `Feedback` event.
    #[must_use]
    pub fn feedback(index: usize, outcome: Outcome, progress: ProgressSummary) -> Self {
        Self::Feedback(FeedbackPayload {
            index,
            outcome,
            progress,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `Navigated` event.
    #[must_use]
    pub const fn navigated(snapshot: SessionSnapshot) -> Self {
        Self::Navigated(NavigatedPayload { snapshot })
    }

    /// Creates a `ProgressReset` event.
    #[must_use]
    pub fn progress_reset(set: impl Into<String>) -> Self {
        Self::ProgressReset(ProgressResetPayload {
            set: set.into(),
            timestamp: Utc::now(),
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Preview(_) => "preview",
            Self::Feedback(_) => "feedback",
            Self::Navigated(_) => "navigated",
            Self::ProgressReset(_) => "progress_reset",
            Self::Error(_) => "error",
        }
    }
}

/// Messages clients send over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the editor source and re-render.
    Source {
        /// The new source.
        source: String,
    },
    /// Check the current source.
    Submit,
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all connected WebSocket clients.
///
/// Events are not kept for clients that connect later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event and returns the number of receivers.
    pub fn send(&self, event: SessionEvent) -> usize {
        // send() only fails when nobody is subscribed
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Applies a client message to the session and returns the event to
/// broadcast.
///
/// The work runs on the blocking pool through [`AppState::with_session`].
pub async fn apply_client_message(state: &AppState, message: ClientMessage) -> SessionEvent {
    let applied = state
        .with_session(move |session| {
            let index = session.active_index()?;
            match message {
                ClientMessage::Source { source } => session
                    .edit(source)
                    .map(|preview| SessionEvent::preview(index, preview.clone())),
                ClientMessage::Submit => {
                    let outcome = session.submit()?;
                    Some(SessionEvent::feedback(index, outcome, session.progress()))
                }
            }
        })
        .await;
    match applied {
        Ok(Some(event)) => event,
        Ok(None) => SessionEvent::error("no exercise is open"),
        Err(e) => {
            warn!("Client message failed: {}", e);
            SessionEvent::error(e.to_string())
        }
    }
}

fn to_json(event: &SessionEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(event = event.event_name(), "Failed to serialize event: {}", e);
            None
        }
    }
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the snapshot immediately
/// - Applies `source` and `submit` messages to the session
/// - Forwards all broadcast events to the client
/// - Sends heartbeat pings every 30 seconds
/// - Closes the connection after 3 missed pongs
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe first so nothing produced after the snapshot is missed
    let mut event_receiver = state.broadcaster.subscribe();

    let snapshot = state.session.lock().await.snapshot();
    let Some(connected_json) = to_json(&SessionEvent::connected(snapshot)) else {
        return;
    };
    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent snapshot");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => {
                                let event = apply_client_message(&state, message).await;
                                if matches!(event, SessionEvent::Error(_)) {
                                    let Some(json) = to_json(&event) else { continue };
                                    if sender.send(Message::Text(json)).await.is_err() {
                                        break;
                                    }
                                } else {
                                    state.broadcaster.send(event);
                                }
                            }
                            Err(e) => {
                                debug!("Invalid client message: {}", e);
                                let event = SessionEvent::error(format!("invalid message: {e}"));
                                let Some(json) = to_json(&event) else { continue };
                                if sender.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary message from client");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(session_event) => {
                        let Some(json) = to_json(&session_event) else { continue };
                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs > MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
