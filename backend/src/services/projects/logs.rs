//! # Project Log Service
//!
//! `GET /api/projects/{id}/logs` returns the change log of one binding, newest first.
//! The `CREATE` entry of the bulk sync comes last.

use super::owned_binding;
use crate::error::SyncError;
use crate::services::account_id;
use crate::store::Store;
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::LogsResponse;

/// Entries of one of the caller's bindings; another account's binding is `404`.
pub(crate) async fn process(
    req: HttpRequest,
    store: web::Data<Store>,
    id: web::Path<String>,
) -> Result<HttpResponse, SyncError> {
    let binding = owned_binding(&store, &account_id(&req)?, &id)?;
    let logs = store.logs_for_binding(&binding.id)?;
    Ok(HttpResponse::Ok().json(LogsResponse {
        success: true,
        logs,
    }))
}
