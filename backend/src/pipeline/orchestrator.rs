//! # Bulk Sync Orchestrator
//!
//! Runs one source-database-to-spreadsheet transfer and hands the resulting binding to the
//! watcher registry.
//!
//! ## Workflow:
//!
//! 1.  **Uniqueness**: `ensure_unique` rejects a request whose database is already bound
//!     for the account, from the same host or into the same spreadsheet. No task exists yet.
//!
//! 2.  **Connect**: the source session is opened; only then is the `SyncTask` created at
//!     `CONNECTED`.
//!
//! 3.  **Fetch**: every collection is read concurrently (`try_join_all`), then `FETCHED`.
//!
//! 4.  **Format**: the snapshots are normalized in parallel on the rayon pool, then
//!     `FORMATTED`.
//!
//! 5.  **Write**: the destination is resolved (a new spreadsheet for the auto-generate
//!     sentinel) and the `SheetWriter` provisions and fills one tab per collection.
//!
//! 6.  **Persist**: the binding is stored with its password encrypted, the task advances to
//!     `TRANSFERRED` with the binding id, the watcher registry starts mirroring it and a
//!     `CREATE` entry is logged.
//!
//! Any failure marks the task `FAILED`. The source session is closed on every path, and a
//! binding is registered with the watcher only after `TRANSFERRED` is stored.

use super::inspect::overview;
use super::normalize::{normalize_collections, CollectionSnapshot};
use super::writer::SheetWriter;
use crate::error::SyncError;
use crate::job_controller::state::TaskTracker;
use crate::secret::SecretCodec;
use crate::sheets::{spreadsheet_id, SheetService, SheetTab};
use crate::source::{DocumentSource, SourceCredentials, SourceSession};
use crate::store::logs::NewLogEntry;
use crate::store::{Account, SourceBinding, Store};
use crate::watcher::WatcherRegistry;
use chrono::Utc;
use common::jobs::SyncPhase;
use common::model::change_log::{ChangeKind, ALL_COLLECTIONS};
use common::model::overview::{CollectionPreview, CollectionSchema};
use common::requests::{SynchronizeRequest, ValidateDbRequest, AUTO_GENERATE_SHEET_URL};
use futures_util::future::try_join_all;
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

/// Switches read from the service configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub protect_tabs: bool,
    pub strict_shapes: bool,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Store,
    tracker: TaskTracker,
    source: Arc<dyn DocumentSource>,
    sheets: Arc<dyn SheetService>,
    codec: SecretCodec,
    registry: WatcherRegistry,
    options: SyncOptions,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        source: Arc<dyn DocumentSource>,
        sheets: Arc<dyn SheetService>,
        codec: SecretCodec,
        registry: WatcherRegistry,
        options: SyncOptions,
    ) -> Self {
        Self {
            tracker: TaskTracker::new(store.clone()),
            store,
            source,
            sheets,
            codec,
            registry,
            options,
        }
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn ensure_unique(
        &self,
        account_id: &str,
        request: &SynchronizeRequest,
    ) -> Result<(), SyncError> {
        match self.store.find_duplicate_binding(
            account_id,
            &request.db_url,
            &request.db_table_name,
            &request.sheet_url,
        )? {
            Some(existing) => {
                info!(
                    "account {account_id}: database '{}' already bound by {existing}",
                    request.db_table_name
                );
                Err(SyncError::DuplicateBinding {
                    database: request.db_table_name.clone(),
                })
            }
            None => Ok(()),
        }
    }

    /// Lists the databases visible to the given credentials.
    pub async fn validate_source(
        &self,
        request: &ValidateDbRequest,
    ) -> Result<Vec<String>, SyncError> {
        let credentials = SourceCredentials {
            host: request.db_url.clone(),
            principal: request.db_id.clone(),
            secret: request.db_password.clone(),
        };
        self.source.list_databases(&credentials).await
    }

    /// Lists the tabs of `sheet_url` as seen by the account's tokens.
    pub async fn validate_destination(
        &self,
        account_id: &str,
        sheet_url: &str,
    ) -> Result<Vec<SheetTab>, SyncError> {
        let target = spreadsheet_id(sheet_url)?;
        let account = self
            .store
            .account(account_id)?
            .ok_or_else(|| SyncError::NotFound(format!("account {account_id}")))?;
        self.sheets.list_tabs(&account.tokens(), &target).await
    }

    /// Runs a full transfer for `account_id` and returns the new binding id.
    pub async fn synchronize(
        &self,
        correlation_id: &str,
        account_id: &str,
        request: &SynchronizeRequest,
    ) -> Result<String, SyncError> {
        self.ensure_unique(account_id, request)?;
        let Some(account) = self.store.account(account_id)? else {
            let err = SyncError::NotFound(format!("account {account_id}"));
            return Err(self.fail(correlation_id, account_id, err));
        };

        let credentials = SourceCredentials {
            host: request.db_url.clone(),
            principal: request.db_id.clone(),
            secret: request.db_password.clone(),
        };
        let session = match self
            .source
            .connect(&credentials, &request.db_table_name)
            .await
        {
            Ok(session) => session,
            Err(err) => return Err(self.fail(correlation_id, account_id, err)),
        };

        let transferred = self
            .transfer(correlation_id, &account, request, session.as_ref())
            .await;
        session.close().await;
        let binding = match transferred {
            Ok(binding) => binding,
            Err(err) => return Err(self.fail(correlation_id, account_id, err)),
        };

        self.registry.register(binding.clone()).await;
        // The run already succeeded; a missing audit entry must not turn it into an error.
        if let Err(err) = self.store.append_log(&NewLogEntry {
            kind: ChangeKind::Create,
            message: format!(
                "CREATE {} WHERE: {}",
                binding.database_name, ALL_COLLECTIONS
            ),
            collection_name: ALL_COLLECTIONS.to_string(),
            document_id: None,
            event_token: None,
            binding_id: binding.id.clone(),
        }) {
            warn!("sync {correlation_id}: CREATE entry not logged: {err}");
        }
        info!(
            "sync {correlation_id}: database '{}' mirrored into {}",
            binding.database_name, binding.sheet_url
        );
        Ok(binding.id)
    }

    async fn transfer(
        &self,
        correlation_id: &str,
        account: &Account,
        request: &SynchronizeRequest,
        session: &dyn SourceSession,
    ) -> Result<SourceBinding, SyncError> {
        let mut task = self.tracker.create(correlation_id, &account.id)?;

        let snapshots = fetch_snapshots(session).await?;
        let names: Vec<String> = snapshots.iter().map(|snapshot| snapshot.name.clone()).collect();
        self.tracker.advance(&mut task, SyncPhase::Fetched, None)?;

        let tables = normalize_collections(&snapshots, self.options.strict_shapes)?;
        drop(snapshots);
        self.tracker.advance(&mut task, SyncPhase::Formatted, None)?;

        let auth = account.tokens();
        let (sheet_url, target) = if request.sheet_url == AUTO_GENERATE_SHEET_URL {
            let created = self
                .sheets
                .create_spreadsheet(&auth, &request.db_table_name)
                .await?;
            info!("sync {correlation_id}: created spreadsheet {}", created.url);
            (created.url, created.spreadsheet_id)
        } else {
            let target = spreadsheet_id(&request.sheet_url)?;
            (request.sheet_url.clone(), target)
        };
        SheetWriter::new(self.sheets.as_ref(), &auth, self.options.protect_tabs)
            .provision_and_write(&target, &names, &tables)
            .await?;

        let binding = SourceBinding {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            host: request.db_url.clone(),
            principal: request.db_id.clone(),
            secret: self.codec.encrypt(&request.db_password)?,
            database_name: request.db_table_name.clone(),
            sheet_url,
            collection_names: names,
            created_at: Utc::now(),
        };
        self.store.insert_binding(&binding)?;
        if let Err(err) = self
            .tracker
            .advance(&mut task, SyncPhase::Transferred, Some(&binding.id))
        {
            if let Err(cleanup) = self.store.delete_binding(&binding.id) {
                warn!("sync {correlation_id}: binding {} left behind: {cleanup}", binding.id);
            }
            return Err(err);
        }
        Ok(binding)
    }

    /// Field types and first rows of every collection behind `binding`, read with the
    /// binding's own credentials.
    pub async fn inspect(
        &self,
        binding: &SourceBinding,
    ) -> Result<(Vec<CollectionSchema>, Vec<CollectionPreview>), SyncError> {
        let credentials = binding.credentials(&self.codec)?;
        let session = self
            .source
            .connect(&credentials, &binding.database_name)
            .await?;
        let fetched = fetch_snapshots(session.as_ref()).await;
        session.close().await;
        Ok(overview(&fetched?))
    }

    fn fail(&self, correlation_id: &str, account_id: &str, err: SyncError) -> SyncError {
        error!("sync {correlation_id} failed: {err}");
        if let Err(mark) = self.tracker.mark_failed(correlation_id, account_id) {
            error!("sync {correlation_id}: could not record failure: {mark}");
        }
        err
    }
}

/// Reads every collection of the session concurrently, in listing order.
async fn fetch_snapshots(session: &dyn SourceSession) -> Result<Vec<CollectionSnapshot>, SyncError> {
    let names = session.list_collections().await?;
    try_join_all(names.into_iter().map(|name| async move {
        let documents = session.find_all(&name).await?;
        Ok::<_, SyncError>(CollectionSnapshot { name, documents })
    }))
    .await
}
