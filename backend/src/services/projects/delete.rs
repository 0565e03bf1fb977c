//! # Project Deletion Service
//!
//! `DELETE /api/projects/{id}` stops the binding's watcher before deleting the record, so
//! no event is logged against a binding that is gone. Sync tasks and change-log entries
//! are removed by the cascade.

use super::owned_binding;
use crate::error::SyncError;
use crate::services::account_id;
use crate::store::Store;
use crate::watcher::WatcherRegistry;
use actix_web::{web, HttpRequest, HttpResponse};
use log::info;

/// The Actix web handler for `DELETE /api/projects/{id}`.
///
/// # Arguments
/// * `req` - The request; only the owning account may delete.
/// * `store` - The shared `Store`.
/// * `registry` - The `WatcherRegistry` whose loop for the binding is stopped first.
/// * `id` - The binding id from the path.
///
/// # Returns
/// `{ "success": true }`, or `404 Not Found` when the caller owns no such binding.
pub(crate) async fn process(
    req: HttpRequest,
    store: web::Data<Store>,
    registry: web::Data<WatcherRegistry>,
    id: web::Path<String>,
) -> Result<HttpResponse, SyncError> {
    let binding = owned_binding(&store, &account_id(&req)?, &id)?;
    registry.unregister(&binding.id).await;
    if !store.delete_binding(&binding.id)? {
        return Err(SyncError::NotFound(format!("project {}", binding.id)));
    }
    info!("project {} deleted", binding.id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
