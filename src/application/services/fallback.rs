use serde_json::Value;
use std::future::Future;

use crate::application::services::context::SyncContext;
use crate::domain::value_objects::{DocumentId, OperationKind};
use crate::infrastructure::queue::PendingQueue;
use crate::shared::error::{AppError, Result};

/// Remote-first write envelope shared by every service: run the remote
/// attempt under the configured write timeout; on a connectivity or
/// permission failure enqueue the operation and hand back a temporary local
/// id so the caller can proceed optimistically. Business-rule failures
/// propagate untouched and never reach the queue.
pub(crate) async fn write_with_fallback<Fut>(
    ctx: &SyncContext,
    queue: &PendingQueue,
    operation: OperationKind,
    payload: Value,
    attempt: Fut,
) -> Result<String>
where
    Fut: Future<Output = Result<String>>,
{
    match tokio::time::timeout(ctx.config().write_timeout(), attempt).await {
        Ok(Ok(id)) => Ok(id),
        Ok(Err(err)) if err.fallback_eligible() => {
            degrade_to_queue(queue, operation, payload, &err).await
        }
        Ok(Err(err)) => Err(err),
        Err(_) => {
            let err = AppError::Timeout("remote write timed out".to_string());
            degrade_to_queue(queue, operation, payload, &err).await
        }
    }
}

/// Appends the operation to its durable slot and synthesizes the temporary
/// id returned to the caller. The id is stamped into the queued payload so a
/// successful replay can be reconciled against it.
pub(crate) async fn degrade_to_queue(
    queue: &PendingQueue,
    operation: OperationKind,
    mut payload: Value,
    cause: &AppError,
) -> Result<String> {
    let local_id = DocumentId::generate_local();

    match payload.as_object_mut() {
        Some(map) => {
            map.insert(
                "localId".to_string(),
                Value::String(local_id.as_str().to_string()),
            );
        }
        None => {
            return Err(AppError::ValidationError(
                "queued payload must be a JSON object".to_string(),
            ));
        }
    }

    queue.enqueue(operation.as_str(), &payload).await?;

    match cause {
        AppError::PermissionDenied(msg) => {
            // Not retriable with unchanged credentials, but queued anyway:
            // permissions may change before the next drain.
            tracing::warn!(
                slot = queue.slot(),
                operation = operation.as_str(),
                local_id = local_id.as_str(),
                "write denied, queued for replay: {}",
                msg
            );
        }
        other => {
            tracing::info!(
                slot = queue.slot(),
                operation = operation.as_str(),
                local_id = local_id.as_str(),
                "remote unreachable, queued for replay: {}",
                other
            );
        }
    }

    Ok(local_id.into())
}
