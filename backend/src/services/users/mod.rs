//! # User Service Module
//!
//! Account-wide listings under `/api/users`.

mod account;
mod logs;
mod projects;

use actix_web::web::{get, put, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/users";

/// # Registered Routes:
///
/// *   **`PUT /account`**: creates or refreshes the caller's account and OAuth token pair.
/// *   **`GET /projects`**: bindings of the caller, newest first.
/// *   **`GET /logs`**: change-log entries of every binding of the caller, newest first.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/account", put().to(account::process))
        .route("/projects", get().to(projects::process))
        .route("/logs", get().to(logs::process))
}
