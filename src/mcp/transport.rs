//! Streamable HTTP transport.
//!
//! Binds HTTP exchanges to sessions:
//!
//! - `POST` carries one JSON-RPC envelope. The reply is a JSON body, or an
//!   SSE stream when the client only accepts `text/event-stream`.
//! - `GET` opens the standalone server-to-client SSE stream for a session.
//! - `DELETE` tears a session down.
//!
//! The session id travels in the `Mcp-Session-Id` header.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::mcp::error::McpError;
use crate::mcp::protocol::{parse_body, ErrorCode, JsonRpcError, JsonRpcErrorData};
use crate::mcp::session::{Session, SessionManager, StreamGuard};

/// Session id header (lower-case as `http` stores it).
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Interval between keep-alive comments on SSE streams.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Failures answered at the transport level, before a server sees a message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The body is not a well-formed envelope.
    #[error("{}", .0.error.message)]
    Envelope(JsonRpcError),

    /// `GET` or `DELETE` without a session id, or a `POST` without one that
    /// does not initialise.
    #[error("Bad Request: Mcp-Session-Id header is required")]
    MissingSessionId,

    /// The session id header is empty or not visible ASCII.
    #[error("Bad Request: invalid Mcp-Session-Id header")]
    InvalidSessionId,

    /// The session id is unknown or was evicted.
    #[error(transparent)]
    UnknownSession(McpError),

    /// The request body is not JSON.
    #[error("Unsupported Media Type: Content-Type must be application/json")]
    UnsupportedMediaType,

    /// The client accepts neither JSON nor SSE.
    #[error("Not Acceptable: client must accept {0}")]
    NotAcceptable(&'static str),

    /// A standalone stream is already open for the session.
    #[error("Conflict: only one SSE stream is allowed per session")]
    StreamConflict,

    /// The task running the exchange failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// HTTP status for this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Envelope(_) | Self::MissingSessionId | Self::InvalidSessionId => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownSession(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::StreamConflict => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_rpc_error(self) -> JsonRpcError {
        match self {
            Self::Envelope(err) => err,
            Self::UnknownSession(err) => err.into_rpc_error(None),
            Self::Internal(_) => JsonRpcError::new(
                None,
                JsonRpcErrorData::with_message(ErrorCode::InternalError, self.to_string()),
            ),
            other => JsonRpcError::new(
                None,
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, other.to_string()),
            ),
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(%status, error = %self, "Rejected MCP request");
        (status, Json(self.into_rpc_error())).into_response()
    }
}

/// How a `POST` reply is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One `application/json` body.
    Json,
    /// A `text/event-stream` of notifications then the reply.
    Sse,
}

impl ResponseMode {
    /// Picks the mode from the `Accept` header.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotAcceptable`] if neither JSON nor SSE is
    /// accepted.
    pub fn negotiate(headers: &HeaderMap) -> Result<Self, TransportError> {
        let Some(accept) = header_str(headers, &header::ACCEPT) else {
            return Ok(Self::Json);
        };

        let types: Vec<String> = accept
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|media| media.trim().to_ascii_lowercase())
            .filter(|media| !media.is_empty())
            .collect();

        if types.is_empty() {
            return Ok(Self::Json);
        }

        let lists = |media: &str| types.iter().any(|t| t == media);
        let json = lists("application/json");
        let sse = lists("text/event-stream");
        let wildcard = lists("*/*") || lists("application/*");

        if sse && !json {
            Ok(Self::Sse)
        } else if json || wildcard {
            Ok(Self::Json)
        } else {
            Err(TransportError::NotAcceptable(
                "application/json or text/event-stream",
            ))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Reads the session id header.
///
/// # Errors
///
/// Returns [`TransportError::InvalidSessionId`] if the header is present but
/// empty or not visible ASCII.
pub fn session_id(headers: &HeaderMap) -> Result<Option<String>, TransportError> {
    let Some(value) = headers.get(SESSION_ID_HEADER) else {
        return Ok(None);
    };
    let bytes = value.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_graphic) {
        return Err(TransportError::InvalidSessionId);
    }
    // Visible ASCII is valid UTF-8
    Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
}

fn require_json_body(headers: &HeaderMap) -> Result<(), TransportError> {
    let is_json = header_str(headers, &header::CONTENT_TYPE)
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"));
    if is_json {
        Ok(())
    } else {
        Err(TransportError::UnsupportedMediaType)
    }
}

fn require_event_stream(headers: &HeaderMap) -> Result<(), TransportError> {
    let accepted = header_str(headers, &header::ACCEPT).map_or(true, |accept| {
        accept
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(str::trim)
            .any(|media| {
                media.eq_ignore_ascii_case("text/event-stream") || media == "*/*" || media == "text/*"
            })
    });
    if accepted {
        Ok(())
    } else {
        Err(TransportError::NotAcceptable("text/event-stream"))
    }
}

fn sse_event(value: &impl serde::Serialize) -> Result<Event, axum::Error> {
    Event::default().event("message").json_data(value)
}

/// The Streamable HTTP transport shared by every gateway request.
#[derive(Debug, Clone)]
pub struct StreamableHttpTransport {
    sessions: Arc<SessionManager>,
}

impl StreamableHttpTransport {
    /// Creates a transport over a session table.
    #[must_use]
    pub const fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// The session table.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    async fn existing_session(&self, headers: &HeaderMap) -> Result<Arc<Session>, TransportError> {
        let id = session_id(headers)?.ok_or(TransportError::MissingSessionId)?;
        self.sessions
            .get(&id)
            .await
            .map_err(TransportError::UnknownSession)
    }

    /// Handles a `POST` carrying one envelope.
    ///
    /// Without a session id, a session is opened only for an envelope that
    /// contains an `initialize` request.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for framing, header, or session failures.
    /// Protocol-level failures are answered inside a successful response.
    pub async fn handle_post(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, TransportError> {
        let mode = ResponseMode::negotiate(headers)?;
        require_json_body(headers)?;

        let session = match session_id(headers)? {
            Some(id) => Some(
                self.sessions
                    .get(&id)
                    .await
                    .map_err(TransportError::UnknownSession)?,
            ),
            None => None,
        };

        let envelope = parse_body(&body).map_err(TransportError::Envelope)?;

        let session = match session {
            Some(session) => session,
            None if envelope.has_initialize() => self.sessions.create().await,
            None => return Err(TransportError::MissingSessionId),
        };
        let session_header = [(SESSION_ID_HEADER, session.id().to_string())];
        let streaming = mode == ResponseMode::Sse && envelope.has_requests();

        // Queue on the session in arrival order before handing off
        let mut server = Arc::clone(session.server()).lock_owned().await;

        if streaming {
            let (tx, rx) = mpsc::unbounded_channel();
            let exchange = Arc::clone(&session);
            let task = tokio::spawn(async move {
                let reply = server.handle_envelope(envelope, Some(&tx)).await;
                exchange.touch();
                reply
            });

            let notifications = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|n| (sse_event(&n), rx))
            });
            let terminal = stream::once(task).flat_map(|outcome| {
                let events: Vec<Result<Event, axum::Error>> = match outcome {
                    Ok(Some(reply)) => reply.messages().map(sse_event).collect(),
                    Ok(None) => Vec::new(),
                    Err(err) => {
                        tracing::error!(error = %err, "MCP exchange task failed");
                        Vec::new()
                    }
                };
                stream::iter(events)
            });

            let sse = Sse::new(notifications.chain(terminal))
                .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL));
            return Ok((session_header, sse).into_response());
        }

        let exchange = Arc::clone(&session);
        let reply = tokio::spawn(async move {
            let reply = server.handle_envelope(envelope, None).await;
            exchange.touch();
            reply
        })
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "MCP exchange task failed");
            TransportError::Internal("request processing failed".to_string())
        })?;

        Ok(match reply {
            Some(reply) => (session_header, Json(reply)).into_response(),
            None => (StatusCode::ACCEPTED, session_header).into_response(),
        })
    }

    /// Handles a `GET` opening the standalone SSE stream.
    ///
    /// The stream carries keep-alive comments only and ends when the session
    /// is torn down. If the client drops it first, the session is torn down.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for header or session failures, or if a
    /// stream is already open for the session.
    pub async fn handle_get(&self, headers: &HeaderMap) -> Result<Response, TransportError> {
        require_event_stream(headers)?;
        let session = self.existing_session(headers).await?;
        let guard = session
            .try_open_stream()
            .ok_or(TransportError::StreamConflict)?;
        let mut closed = session.subscribe_closed();
        let session_header = [(SESSION_ID_HEADER, session.id().to_string())];
        let teardown = DisconnectTeardown {
            sessions: Arc::clone(&self.sessions),
            session,
            _guard: guard,
        };

        tracing::debug!(session_id = %teardown.session.id(), "Standalone stream opened");

        let until_closed = stream::once(async move {
            let _teardown = teardown;
            let _ = closed.wait_for(|closed| *closed).await;
        })
        .filter_map(|()| async { None::<Result<Event, Infallible>> });

        let sse = Sse::new(until_closed).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL));
        Ok((session_header, sse).into_response())
    }

    /// Handles a `DELETE` tearing the session down.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] for header or session failures.
    pub async fn handle_delete(&self, headers: &HeaderMap) -> Result<Response, TransportError> {
        let id = session_id(headers)?.ok_or(TransportError::MissingSessionId)?;
        self.sessions
            .remove(&id)
            .await
            .map_err(TransportError::UnknownSession)?;
        Ok(StatusCode::OK.into_response())
    }
}

/// Owned by a standalone stream; tears the session down if the stream is
/// dropped while the session is still open.
struct DisconnectTeardown {
    sessions: Arc<SessionManager>,
    session: Arc<Session>,
    _guard: StreamGuard,
}

impl Drop for DisconnectTeardown {
    fn drop(&mut self) {
        if self.session.is_closed() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let sessions = Arc::clone(&self.sessions);
        let id = self.session.id().to_string();
        tracing::info!(session_id = %id, "Client dropped standalone stream");
        runtime.spawn(async move {
            // Already gone if a DELETE or eviction won the race
            let _ = sessions.remove(&id).await;
        });
    }
}
