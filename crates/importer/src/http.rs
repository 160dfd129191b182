use crate::hint::AddressingHint;
use crate::notifier::{BroadcastNotifier, ConfigUpdate, NotifyError};
use crate::outcome::{ImportOutcome, ImportOutcomeKind};
use crate::store::StoreError;
use crate::workflow::{ImportWorkflow, RenotifyError};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt as _};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use unrelated_openapi_tools::McpServerConfig;

pub const FILE_FIELD: &str = "file";
pub const TENANT_FIELD: &str = "tenantId";
pub const PREFIX_FIELD: &str = "prefix";

#[derive(Clone)]
pub struct AppState {
    pub workflow: ImportWorkflow,
    /// Local fan-out that `/api/updates` subscribers listen on.
    pub updates: BroadcastNotifier,
    /// Ends open `/api/updates` streams so graceful shutdown can complete.
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/openapi/import", post(import_openapi))
        .route("/api/configs", get(list_configs))
        .route("/api/configs/{name}", get(get_config))
        .route("/api/configs/{name}/notify", post(renotify_config))
        .route("/api/updates", get(stream_updates))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(Extension(state))
}

#[derive(Debug, Serialize)]
struct SuccessBody<'a> {
    status: &'static str,
    config: &'a McpServerConfig,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ImportOutcomeKind>,
    reason: &'a str,
    /// Present when the configuration was persisted even though the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a McpServerConfig>,
}

fn success(status: StatusCode, config: &McpServerConfig) -> Response {
    (
        status,
        Json(SuccessBody {
            status: "success",
            config,
        }),
    )
        .into_response()
}

fn error(
    status: StatusCode,
    kind: Option<ImportOutcomeKind>,
    reason: &str,
    config: Option<&McpServerConfig>,
) -> Response {
    (
        status,
        Json(ErrorBody {
            status: "error",
            kind,
            reason,
            config,
        }),
    )
        .into_response()
}

fn outcome_response(outcome: &ImportOutcome) -> Response {
    let kind = Some(outcome.kind());
    match outcome {
        ImportOutcome::Imported(cfg) => success(StatusCode::CREATED, cfg),
        ImportOutcome::Rejected { reason } => error(StatusCode::BAD_REQUEST, kind, reason, None),
        ImportOutcome::PersistenceFailed { reason, conflict } => {
            let status = if *conflict {
                StatusCode::CONFLICT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error(status, kind, reason, None)
        }
        ImportOutcome::NotificationFailed { reason, config } => {
            error(StatusCode::INTERNAL_SERVER_ERROR, kind, reason, Some(config))
        }
    }
}

fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        StoreError::Unavailable(_) | StoreError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn health() -> &'static str {
    "ok"
}

struct ImportForm {
    file: Option<Bytes>,
    tenant: Option<String>,
    prefix: Option<String>,
}

async fn read_import_form(multipart: &mut Multipart) -> Result<ImportForm, Response> {
    let mut form = ImportForm {
        file: None,
        tenant: None,
        prefix: None,
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read multipart body");
                return Err(error(
                    e.status(),
                    None,
                    &format!("Failed to read form: {}", e.body_text()),
                    None,
                ));
            }
        };

        let name = field.name().map(str::to_string);
        let res = match name.as_deref() {
            Some(FILE_FIELD) => {
                tracing::debug!(filename = ?field.file_name(), "reading uploaded OpenAPI file");
                field.bytes().await.map(|b| form.file = Some(b))
            }
            Some(TENANT_FIELD) => field.text().await.map(|t| form.tenant = Some(t)),
            Some(PREFIX_FIELD) => field.text().await.map(|p| form.prefix = Some(p)),
            _ => continue,
        };
        if let Err(e) = res {
            tracing::error!(error = %e, field = ?name, "failed to read form field");
            return Err(error(
                e.status(),
                None,
                &format!("Failed to read field: {}", e.body_text()),
                None,
            ));
        }
    }

    Ok(form)
}

async fn import_openapi(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let form = match read_import_form(&mut multipart).await {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let Some(file) = form.file else {
        return error(
            StatusCode::BAD_REQUEST,
            None,
            "Failed to get file: missing multipart field 'file'",
            None,
        );
    };

    let hint = AddressingHint::from_parts(form.tenant, form.prefix);

    // Cancelled if the client goes away and the handler future is dropped.
    let ctx = CancellationToken::new();
    let _cancel_on_drop = ctx.clone().drop_guard();

    let outcome = state.workflow.execute(&ctx, &file, &hint).await;
    outcome_response(&outcome)
}

async fn list_configs(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.workflow.store().list().await {
        Ok(configs) => Json(configs).into_response(),
        Err(e) => error(store_error_status(&e), None, &e.to_string(), None),
    }
}

async fn get_config(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.workflow.store().get(&name).await {
        Ok(Some(cfg)) => Json(cfg).into_response(),
        Ok(None) => error(
            StatusCode::NOT_FOUND,
            None,
            &format!("MCP server '{name}' not found"),
            None,
        ),
        Err(e) => error(store_error_status(&e), None, &e.to_string(), None),
    }
}

async fn renotify_config(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let ctx = CancellationToken::new();
    let _cancel_on_drop = ctx.clone().drop_guard();

    match state.workflow.renotify(&ctx, &name).await {
        Ok(cfg) => success(StatusCode::OK, &cfg),
        Err(RenotifyError::NotFound(_)) => error(
            StatusCode::NOT_FOUND,
            None,
            &format!("MCP server '{name}' not found"),
            None,
        ),
        Err(RenotifyError::Store(e)) => error(store_error_status(&e), None, &e.to_string(), None),
        Err(RenotifyError::Notify(e @ (NotifyError::Unavailable(_) | NotifyError::Cancelled))) => {
            error(StatusCode::SERVICE_UNAVAILABLE, None, &e.to_string(), None)
        }
        Err(RenotifyError::Notify(e @ NotifyError::Encode(_))) => {
            error(StatusCode::INTERNAL_SERVER_ERROR, None, &e.to_string(), None)
        }
    }
}

/// What a `/api/updates` subscriber is told next.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UpdateFrame {
    Updated(ConfigUpdate),
    /// The subscriber fell behind and missed this many events; it should reload everything.
    Lagged(u64),
}

impl UpdateFrame {
    fn into_event(self) -> Option<Event> {
        match self {
            UpdateFrame::Updated(update) => match Event::default()
                .event("config_updated")
                .id(update.event_id.to_string())
                .json_data(&update)
            {
                Ok(ev) => Some(ev),
                Err(e) => {
                    tracing::warn!(error = %e, server_name = %update.name, "failed to encode update event");
                    None
                }
            },
            UpdateFrame::Lagged(missed) => {
                Some(Event::default().event("lagged").data(missed.to_string()))
            }
        }
    }
}

fn update_frames(rx: broadcast::Receiver<ConfigUpdate>) -> impl Stream<Item = UpdateFrame> {
    futures::stream::unfold(rx, |mut rx| async move {
        let frame = match rx.recv().await {
            Ok(update) => UpdateFrame::Updated(update),
            Err(RecvError::Lagged(missed)) => UpdateFrame::Lagged(missed),
            Err(RecvError::Closed) => return None,
        };
        Some((frame, rx))
    })
}

/// Server-sent events: one `config_updated` event per [`ConfigUpdate`].
///
/// A `lagged` event (data = number of missed events) tells the subscriber to reload everything.
async fn stream_updates(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = update_frames(state.updates.subscribe())
        .filter_map(|frame| std::future::ready(frame.into_event().map(Ok::<_, Infallible>)))
        .take_until(state.shutdown.clone().cancelled_owned());
    Sse::new(stream).keep_alive(KeepAlive::default())
}
