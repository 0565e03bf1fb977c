//! # HTTP Services
//!
//! Thin actix-web handlers over the orchestrator, the store and the watcher registry.
//! Authentication happens upstream; the authenticated account arrives in the
//! `x-account-id` header.
//!
//! ## Sub-modules:
//! - `projects`: starting and polling bulk syncs, connection checks, per-binding logs and deletion.
//! - `users`: account-wide binding and log listings.

pub mod projects;
pub mod users;

use crate::error::SyncError;
use actix_web::HttpRequest;

pub const ACCOUNT_HEADER: &str = "x-account-id";

/// Account id set by the auth layer; a missing or blank header is `InvalidRequest`.
pub(crate) fn account_id(req: &HttpRequest) -> Result<String, SyncError> {
    req.headers()
        .get(ACCOUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SyncError::InvalidRequest(format!("missing {ACCOUNT_HEADER} header")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn account_header_is_required() {
        let req = TestRequest::default()
            .insert_header((ACCOUNT_HEADER, " acc-1 "))
            .to_http_request();
        assert_eq!(account_id(&req).unwrap(), "acc-1");

        let req = TestRequest::default().to_http_request();
        assert!(matches!(account_id(&req), Err(SyncError::InvalidRequest(_))));
    }
}
