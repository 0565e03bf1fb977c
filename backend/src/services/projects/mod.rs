//! # Project Service Module
//!
//! Routes under `/api/projects`. A project is one binding of a source database to a
//! spreadsheet.

mod delete;
mod get;
mod logs;
mod sync;
mod validate;

use crate::error::SyncError;
use crate::store::{SourceBinding, Store};
use actix_web::web::{delete, get, post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/projects";

/// Configures and returns the Actix `Scope` for all project routes.
///
/// # Registered Routes:
///
/// *   **`POST /sync`**: starts a bulk sync in the background and returns its task id.
/// *   **`GET /sync/status?id=`**: current phase of a sync task, `null` when unknown.
/// *   **`POST /validation/db`**: lists the databases reachable with the given credentials.
/// *   **`POST /validation/sheet`**: lists the tabs of a spreadsheet.
/// *   **`GET /{id}`**: summary of one binding.
/// *   **`GET /{id}/logs`**: change log of one binding, newest first.
/// *   **`DELETE /{id}`**: stops the watcher and deletes the binding with its tasks and logs.
///
/// The fixed `/sync/status` path is registered before `/{id}/logs` so it is not captured.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/sync", post().to(sync::start))
        .route("/sync/status", get().to(sync::status))
        .route("/validation/db", post().to(validate::database))
        .route("/validation/sheet", post().to(validate::sheet))
        .route("/{id}", get().to(get::process))
        .route("/{id}/logs", get().to(logs::process))
        .route("/{id}", delete().to(delete::process))
}

/// Loads binding `id` if it belongs to `account_id`; other accounts see `NotFound`.
fn owned_binding(store: &Store, account_id: &str, id: &str) -> Result<SourceBinding, SyncError> {
    store
        .binding(id)?
        .filter(|binding| binding.account_id == account_id)
        .ok_or_else(|| SyncError::NotFound(format!("project {id}")))
}
