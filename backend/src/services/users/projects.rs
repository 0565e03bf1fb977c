//! # Project Listing Service
//!
//! `GET /api/users/projects` lists the caller's bindings, newest first, as summaries.
//! Credentials are never part of a summary.

use crate::error::SyncError;
use crate::services::account_id;
use crate::store::Store;
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::ProjectsResponse;

/// The Actix web handler for `GET /api/users/projects`.
///
/// # Arguments
/// * `req` - The request; its `x-account-id` header selects the bindings.
/// * `store` - The shared `Store`.
///
/// # Returns
/// A `ProjectsResponse` with the summaries and their count.
pub(crate) async fn process(
    req: HttpRequest,
    store: web::Data<Store>,
) -> Result<HttpResponse, SyncError> {
    let projects: Vec<_> = store
        .bindings_for_account(&account_id(&req)?)?
        .iter()
        .map(|binding| binding.summary())
        .collect();
    Ok(HttpResponse::Ok().json(ProjectsResponse {
        success: true,
        projects_length: projects.len(),
        projects,
    }))
}
