//! # Account Registration Service
//!
//! `PUT /api/users/account` stores the OAuth token pair the auth layer obtained for the
//! caller. Bulk syncs and watchers read the pair from here; calling it again replaces the
//! tokens.

use crate::error::SyncError;
use crate::services::account_id;
use crate::store::{Account, Store};
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::AccountRequest;
use log::info;

/// Upserts the caller's account; both tokens must be non-empty.
pub(crate) async fn process(
    req: HttpRequest,
    store: web::Data<Store>,
    payload: web::Json<AccountRequest>,
) -> Result<HttpResponse, SyncError> {
    let id = account_id(&req)?;
    let payload = payload.into_inner();
    if payload.access_token.is_empty() || payload.refresh_token.is_empty() {
        return Err(SyncError::InvalidRequest("both OAuth tokens are required".to_string()));
    }
    store.upsert_account(&Account {
        id: id.clone(),
        email: payload.email,
        access_token: payload.access_token,
        refresh_token: payload.refresh_token,
        sandbox: payload.sandbox,
    })?;
    info!("account {id} registered");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
