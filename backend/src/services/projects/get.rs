//! # Project Detail Service
//!
//! `GET /api/projects/{id}` returns the stored summary of a binding, the state of its
//! watcher and a live overview of the source database: the field types of every
//! collection and the first rows each tab receives.
//!
//! The overview is read with the binding's own credentials. When the source cannot be
//! reached the summary is still returned, with empty overview lists and the reason in
//! `source_error`.

use super::owned_binding;
use crate::error::SyncError;
use crate::pipeline::orchestrator::Orchestrator;
use crate::services::account_id;
use crate::store::Store;
use crate::watcher::WatcherRegistry;
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::ProjectResponse;
use log::warn;

/// The Actix web handler for `GET /api/projects/{id}`.
///
/// # Arguments
/// * `req` - The request; only the owning account sees the binding.
/// * `store` - The shared `Store`.
/// * `registry` - The `WatcherRegistry`, asked for the binding's watch status.
/// * `orchestrator` - The shared `Orchestrator`, which reads the source overview.
/// * `id` - The binding id from the path.
///
/// # Returns
/// A `ProjectResponse`, or `404 Not Found` when the caller owns no such binding.
pub(crate) async fn process(
    req: HttpRequest,
    store: web::Data<Store>,
    registry: web::Data<WatcherRegistry>,
    orchestrator: web::Data<Orchestrator>,
    id: web::Path<String>,
) -> Result<HttpResponse, SyncError> {
    let binding = owned_binding(&store, &account_id(&req)?, &id)?;
    let watch_status = registry.status(&binding.id).await;
    let (schema, data_preview, source_error) = match orchestrator.inspect(&binding).await {
        Ok((schema, preview)) => (schema, preview, None),
        Err(err) => {
            warn!("project {}: source overview unavailable: {err}", binding.id);
            (Vec::new(), Vec::new(), Some(err.to_string()))
        }
    };
    Ok(HttpResponse::Ok().json(ProjectResponse {
        success: true,
        project: binding.summary(),
        watch_status,
        schema,
        data_preview,
        source_error,
    }))
}
