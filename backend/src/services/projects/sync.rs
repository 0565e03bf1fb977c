//! # Bulk Sync Start and Status Service
//!
//! `POST /api/projects/sync` and `GET /api/projects/sync/status`.
//!
//! ## Workflow:
//!
//! 1.  **HTTP Request**: `start` receives a `SynchronizeRequest` and the caller's account id.
//!
//! 2.  **Duplicate guard**: the uniqueness check runs before anything is scheduled, so a
//!     duplicate answers `409 Conflict` and no task is ever created.
//!
//! 3.  **Job Scheduling**: a fresh correlation id is returned immediately while the
//!     orchestrator runs on a spawned Tokio task.
//!
//! 4.  **Polling**: `status` reads the persisted phase for that id. A task is only visible
//!     to the account that started it.

use crate::error::SyncError;
use crate::pipeline::orchestrator::Orchestrator;
use crate::services::account_id;
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::{StatusQuery, SyncStartedResponse, SyncStatusResponse, SynchronizeRequest};
use log::{info, warn};
use uuid::Uuid;

/// The Actix web handler for `POST /api/projects/sync`.
///
/// Rejects a duplicate binding up front, then spawns the orchestrator and immediately
/// returns a `task_id` the client polls through `GET /api/projects/sync/status`.
///
/// # Arguments
/// * `req` - The request; its `x-account-id` header names the calling account.
/// * `orchestrator` - The shared `Orchestrator`, cloned into the background task.
/// * `payload` - Source credentials, database name and destination sheet URL.
///
/// # Returns
/// An `HttpResponse` with the `task_id`, or `409 Conflict` when the database is already bound.
pub(crate) async fn start(
    req: HttpRequest,
    orchestrator: web::Data<Orchestrator>,
    payload: web::Json<SynchronizeRequest>,
) -> Result<HttpResponse, SyncError> {
    let account = account_id(&req)?;
    let request = payload.into_inner();
    orchestrator.ensure_unique(&account, &request)?;

    let task_id = Uuid::new_v4().to_string();
    let worker = orchestrator.get_ref().clone();
    let correlation_id = task_id.clone();
    tokio::spawn(async move {
        match worker
            .synchronize(&correlation_id, &account, &request)
            .await
        {
            Ok(binding_id) => info!("sync {correlation_id} produced binding {binding_id}"),
            Err(err) => warn!("sync {correlation_id} ended with error: {err}"),
        }
    });

    Ok(HttpResponse::Ok().json(SyncStartedResponse {
        success: true,
        task_id,
    }))
}

/// The Actix web handler for `GET /api/projects/sync/status?id=`.
///
/// # Arguments
/// * `req` - The request; only tasks of its account are visible.
/// * `orchestrator` - The shared `Orchestrator`, whose tracker holds the phases.
/// * `query` - The correlation id returned by `start`.
///
/// # Returns
/// The current `SyncPhase`, or `null` for unknown ids and tasks of other accounts.
pub(crate) async fn status(
    req: HttpRequest,
    orchestrator: web::Data<Orchestrator>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, SyncError> {
    let account = account_id(&req)?;
    let status = orchestrator.tracker().query(&query.id, &account)?;
    Ok(HttpResponse::Ok().json(SyncStatusResponse {
        success: true,
        status,
    }))
}
