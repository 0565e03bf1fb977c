//! # Connection Checks
//!
//! `POST /api/projects/validation/db` lists the databases reachable with a set of source
//! credentials. `POST /api/projects/validation/sheet` lists the tabs of a spreadsheet with
//! the caller's OAuth tokens. Neither stores anything.

use crate::error::SyncError;
use crate::pipeline::orchestrator::Orchestrator;
use crate::services::account_id;
use actix_web::{web, HttpRequest, HttpResponse};
use common::requests::{
    ValidateDbRequest, ValidateDbResponse, ValidateSheetRequest, ValidateSheetResponse,
};

/// Connects with the posted credentials and lists the databases they can see.
pub(crate) async fn database(
    orchestrator: web::Data<Orchestrator>,
    payload: web::Json<ValidateDbRequest>,
) -> Result<HttpResponse, SyncError> {
    let database_list = orchestrator.validate_source(&payload).await?;
    Ok(HttpResponse::Ok().json(ValidateDbResponse {
        success: true,
        message: "Connected to database successfully".to_string(),
        database_list,
    }))
}

/// Lists the tabs of the posted spreadsheet; a URL that names no spreadsheet is `400`.
pub(crate) async fn sheet(
    req: HttpRequest,
    orchestrator: web::Data<Orchestrator>,
    payload: web::Json<ValidateSheetRequest>,
) -> Result<HttpResponse, SyncError> {
    let tabs = orchestrator
        .validate_destination(&account_id(&req)?, &payload.sheet_url)
        .await?;
    Ok(HttpResponse::Ok().json(ValidateSheetResponse {
        success: true,
        message: "Valid Google Spreadsheet URL".to_string(),
        sheet_titles: tabs.into_iter().map(|tab| tab.title).collect(),
    }))
}
