//! The control API: create a batch, pause/resume it, inspect its progress.
//! Grounded on `autopilot::infra::api::serve` — one axum `Router` built
//! from a `State`, a trace-id middleware, `TraceLayer`, and graceful
//! shutdown driven by a oneshot receiver.

use {
    crate::services::Services,
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    },
    database::{batches, recipients},
    model::{
        batch::{Batch, BatchId, BatchStatus},
        error::DispatchError,
        recipient::Recipient,
        send_config::ModuleKind,
        TenantId,
    },
    queue_client::{subject, Broker, Publisher},
    std::{net::SocketAddr, sync::Arc},
    tower_http::trace::TraceLayer,
};

#[derive(Clone)]
struct ApiState<B: Broker + 'static> {
    services: Arc<Services<B>>,
}

pub async fn serve<B: Broker + 'static>(
    services: Arc<Services<B>>,
    address: SocketAddr,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> std::io::Result<()> {
    let state = ApiState { services };
    let app = Router::new()
        .route("/batches", post(create_batch::<B>))
        .route("/batches/{id}", get(get_batch::<B>))
        .route("/batches/{id}/pause", post(pause_batch::<B>))
        .route("/batches/{id}/resume", post(resume_batch::<B>))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
        })
        .await
}

#[derive(serde::Deserialize)]
struct CreateBatchRequest {
    tenant_id: String,
    module: ModuleKind,
    send_config_id: Option<uuid::Uuid>,
    #[serde(default)]
    payload_defaults: serde_json::Value,
    recipients: Vec<CreateBatchRecipient>,
    #[serde(default)]
    dry_run: bool,
    scheduled_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(serde::Deserialize)]
struct CreateBatchRecipient {
    address: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    variables: std::collections::HashMap<String, String>,
}

#[derive(serde::Serialize)]
struct CreateBatchResponse {
    id: uuid::Uuid,
    status: BatchStatus,
    total_recipients: u64,
}

async fn create_batch<B: Broker + 'static>(
    State(state): State<ApiState<B>>,
    Json(request): Json<CreateBatchRequest>,
) -> Result<Json<CreateBatchResponse>, ApiError> {
    if request.recipients.is_empty() {
        return Err(ApiError(DispatchError::Validation("recipients must not be empty".to_string())));
    }
    let max = state.services.config.dispatcher.max_batch_size;
    if request.recipients.len() > max {
        return Err(ApiError(DispatchError::Validation(format!(
            "batch has {} recipients, exceeding the {max} limit",
            request.recipients.len()
        ))));
    }

    let batch_id = BatchId(uuid::Uuid::new_v4());
    let now = chrono::Utc::now();
    let status = if request.scheduled_at.is_some() { BatchStatus::Scheduled } else { BatchStatus::Queued };
    let batch = Batch {
        id: batch_id,
        tenant_id: TenantId(request.tenant_id),
        send_config_id: request.send_config_id.map(model::send_config::SendConfigId),
        module: request.module,
        payload_defaults: request.payload_defaults,
        total_recipients: request.recipients.len() as u64,
        sent_count: 0,
        failed_count: 0,
        status,
        dry_run: request.dry_run,
        created_at: now,
        scheduled_at: request.scheduled_at,
        started_at: None,
        completed_at: None,
    };

    let recipients: Vec<Recipient> = request
        .recipients
        .into_iter()
        .map(|r| Recipient {
            id: model::recipient::RecipientId(uuid::Uuid::new_v4()),
            batch_id,
            address: r.address,
            name: r.name,
            variables: r.variables,
            status: model::recipient::RecipientStatus::Pending,
            provider_message_id: None,
            error_message: None,
            sent_at: None,
        })
        .collect();

    batches::insert(&state.services.db, &batch).await.map_err(internal)?;
    recipients::insert_batch(&state.services.db, &recipients).await.map_err(internal)?;

    if status == BatchStatus::Queued {
        let payload = serde_json::to_vec(&batch_id).map_err(internal)?;
        state
            .services
            .broker
            .publish(subject::BATCHES_SUBJECT, payload.into(), Some(&format!("batch-{batch_id}")))
            .await
            .map_err(|err| ApiError(DispatchError::QueueUnavailable(err.to_string())))?;
    }

    Ok(Json(CreateBatchResponse {
        id: batch_id.0,
        status: batch.status,
        total_recipients: batch.total_recipients,
    }))
}

#[derive(serde::Serialize)]
struct BatchResponse {
    id: uuid::Uuid,
    tenant_id: String,
    status: BatchStatus,
    total_recipients: u64,
    sent_count: u64,
    failed_count: u64,
}

impl From<Batch> for BatchResponse {
    fn from(batch: Batch) -> Self {
        Self {
            id: batch.id.0,
            tenant_id: batch.tenant_id.0,
            status: batch.status,
            total_recipients: batch.total_recipients,
            sent_count: batch.sent_count,
            failed_count: batch.failed_count,
        }
    }
}

async fn get_batch<B: Broker + 'static>(
    State(state): State<ApiState<B>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = batches::get(&state.services.db, BatchId(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError(DispatchError::NotFound(id.to_string())))?;
    Ok(Json(batch.into()))
}

async fn pause_batch<B: Broker + 'static>(
    State(state): State<ApiState<B>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<StatusCode, ApiError> {
    set_status_if_active(&state, BatchId(id), BatchStatus::Paused).await
}

async fn resume_batch<B: Broker + 'static>(
    State(state): State<ApiState<B>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<StatusCode, ApiError> {
    let batch_id = BatchId(id);
    let batch = batches::get(&state.services.db, batch_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError(DispatchError::NotFound(id.to_string())))?;
    if batch.status != BatchStatus::Paused {
        return Err(ApiError(DispatchError::Validation("batch is not paused".to_string())));
    }
    batches::set_status(&state.services.db, batch_id, BatchStatus::Queued).await.map_err(internal)?;
    let payload = serde_json::to_vec(&batch_id).map_err(internal)?;
    state
        .services
        .broker
        .publish(subject::BATCHES_SUBJECT, payload.into(), Some(&format!("batch-{batch_id}-resume")))
        .await
        .map_err(|err| ApiError(DispatchError::QueueUnavailable(err.to_string())))?;
    Ok(StatusCode::ACCEPTED)
}

async fn set_status_if_active<B: Broker + 'static>(
    state: &ApiState<B>,
    batch_id: BatchId,
    status: BatchStatus,
) -> Result<StatusCode, ApiError> {
    let batch = batches::get(&state.services.db, batch_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError(DispatchError::NotFound(batch_id.to_string())))?;
    if batch.status.is_terminal() {
        return Err(ApiError(DispatchError::Validation("batch already reached a terminal status".to_string())));
    }
    batches::set_status(&state.services.db, batch_id, status).await.map_err(internal)?;
    Ok(StatusCode::ACCEPTED)
}

struct ApiError(DispatchError);

fn internal<E: std::fmt::Display>(err: E) -> ApiError {
    ApiError(DispatchError::Fatal(err.to_string()))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_to_response(self.0)
    }
}

fn error_to_response(err: DispatchError) -> Response {
    let status = match &err {
        DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::Auth => StatusCode::UNAUTHORIZED,
        DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        DispatchError::ProviderTransient(_) | DispatchError::HotStateUnavailable | DispatchError::QueueUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        DispatchError::ProviderPermanent(_) | DispatchError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: DispatchError) -> StatusCode {
        error_to_response(err).status()
    }

    #[test]
    fn every_dispatch_error_variant_maps_to_its_documented_status() {
        assert_eq!(status_of(DispatchError::Validation("bad input".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(DispatchError::Auth), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(DispatchError::NotFound("batch-1".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(DispatchError::RateLimited { retry_after_ms: 1000 }), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_of(DispatchError::ProviderTransient("timeout".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(DispatchError::HotStateUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(DispatchError::QueueUnavailable("nats down".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(DispatchError::ProviderPermanent("rejected".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(DispatchError::Fatal("panic".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
