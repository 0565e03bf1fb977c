//! # Account Log Service
//!
//! `GET /api/users/logs` merges the change logs of every binding the caller owns.

use crate::error::SyncError;
use crate::services::account_id;
use crate::store::Store;
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::LogsResponse;

/// Entries of all of the caller's bindings, newest first.
pub(crate) async fn process(
    req: HttpRequest,
    store: web::Data<Store>,
) -> Result<HttpResponse, SyncError> {
    let logs = store.logs_for_account(&account_id(&req)?)?;
    Ok(HttpResponse::Ok().json(LogsResponse {
        success: true,
        logs,
    }))
}
