//! The build pipeline controller.
//!
//! One controller owns all pipeline state. Stage bodies run on the
//! [`WorkerPool`]; their results come back as [`StageEvent`]s on a single
//! channel and drive the state machine:
//!
//! ```text
//! Idle → CheckingCache ─┬─────────────────────────────→ Unpacking* ─→ Sealing ─┐
//!                       └→ Downloading → VerifyingDownload ─↗     ↖────────────┤
//!                                                                       Drained ┘
//! ```
//!
//! Any failure moves the controller to `Failed`, which is terminal.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

use super::layout::Layout;
use super::queue::{PendingQueue, UnpackJob};
use super::stages::{self, CacheOutcome};
use super::state::PipelineState;
use super::status::StatusReporter;
use super::worker::WorkerPool;
use crate::credentials::{backup_key_url, parse_backup_key, CredentialStore};
use crate::manager::{
    ArchiveExtractor, BundleCatalog, BundleId, CommandDecryptor, CommandSealer, ContainerSealer,
    DownloadTarget, Fetcher, HttpDownloader, ManagerError, ManagerResult, PackageDecryptor,
    PipelineConfig, ZipExtractor,
};

/// Shown once every bundle has been sealed.
pub const READY_MESSAGE: &str = "Everything is ready, now follow below steps on your PS Vita:\n\
1. Launch Content Manager and connect to your computer.\n\
2. Select \"PC -> PS Vita System\" -> \"Applications\" -> \"PS Vita\".\n\
3. Transfer \"h-encore\" to your PS Vita.\n\
4. Run \"h-encore\" and... Yay, that's it!";

/// Completion of one unit of work.
#[derive(Debug)]
pub enum StageEvent {
    CacheChecked(ManagerResult<CacheOutcome>),
    Downloaded(ManagerResult<PathBuf>),
    DownloadVerified(ManagerResult<PathBuf>),
    PrimaryDecrypted(ManagerResult<()>),
    BundleExtracted(ManagerResult<BundleId>),
    BundleSealed(ManagerResult<BundleId>),
    CredentialFetched(ManagerResult<String>),
    /// The unit panicked before reporting.
    WorkerLost(String),
}

impl StageEvent {
    /// Short name used in transition errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CacheChecked(_) => "cache check result",
            Self::Downloaded(_) => "download result",
            Self::DownloadVerified(_) => "download verification",
            Self::PrimaryDecrypted(_) => "demo package unpack",
            Self::BundleExtracted(_) => "bundle extraction",
            Self::BundleSealed(_) => "bundle sealing",
            Self::CredentialFetched(_) => "backup key response",
            Self::WorkerLost(_) => "lost worker",
        }
    }
}

/// The blocking collaborators a controller drives.
pub struct Collaborators<F, X, D, S> {
    pub fetcher: F,
    pub extractor: X,
    pub decryptor: D,
    pub sealer: S,
}

impl Collaborators<HttpDownloader, ZipExtractor, CommandDecryptor, CommandSealer> {
    /// The real implementations, configured from `config`.
    pub fn system(config: &PipelineConfig) -> ManagerResult<Self> {
        Ok(Self {
            fetcher: HttpDownloader::with_timeout(config.timeout)?,
            extractor: ZipExtractor::new(),
            decryptor: CommandDecryptor::new(config.pkg2zip.clone()),
            sealer: CommandSealer::new(config.psvimg_create.clone()),
        })
    }
}

/// Controller wired to the real collaborators.
pub type SystemController =
    PipelineController<HttpDownloader, ZipExtractor, CommandDecryptor, CommandSealer>;

/// Sequences the build stages.
pub struct PipelineController<F, X, D, S> {
    config: PipelineConfig,
    layout: Layout,
    fetcher: Arc<F>,
    extractor: Arc<X>,
    decryptor: Arc<D>,
    sealer: Arc<S>,
    catalog: BundleCatalog,
    selection: Vec<BundleId>,
    credentials: CredentialStore,
    backup_key: Option<String>,
    state: PipelineState,
    history: Vec<PipelineState>,
    queue: PendingQueue,
    download_target: Option<DownloadTarget>,
    status: StatusReporter,
    worker: WorkerPool<StageEvent>,
    events: UnboundedReceiver<StageEvent>,
}

impl<F, X, D, S> PipelineController<F, X, D, S>
where
    F: Fetcher,
    X: ArchiveExtractor,
    D: PackageDecryptor,
    S: ContainerSealer,
{
    /// Create a controller and scan the bundle catalog.
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators<F, X, D, S>,
        credentials: CredentialStore,
        status: StatusReporter,
    ) -> Self {
        let layout = Layout::new(&config);
        let catalog =
            BundleCatalog::scan(&collaborators.extractor, &config.app_dir, layout.extra_dir());
        let (tx, events) = mpsc::unbounded_channel();

        Self {
            config,
            layout,
            fetcher: Arc::new(collaborators.fetcher),
            extractor: Arc::new(collaborators.extractor),
            decryptor: Arc::new(collaborators.decryptor),
            sealer: Arc::new(collaborators.sealer),
            catalog,
            selection: Vec::new(),
            credentials,
            backup_key: None,
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
            queue: PendingQueue::new(),
            download_target: None,
            status,
            worker: WorkerPool::new(tx, StageEvent::WorkerLost),
            events,
        }
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Bundles available for selection.
    pub fn catalog(&self) -> &BundleCatalog {
        &self.catalog
    }

    /// Selected bundle identifiers, in selection order.
    pub fn selection(&self) -> &[BundleId] {
        &self.selection
    }

    /// Jobs still waiting to run.
    pub fn pending(&self) -> &PendingQueue {
        &self.queue
    }

    /// The resolved backup key.
    pub fn backup_key(&self) -> Option<&str> {
        self.backup_key.as_deref()
    }

    /// Pipeline settings.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Select or deselect a catalog bundle.
    ///
    /// Returns `false` for identifiers not in the catalog, which are ignored.
    pub fn select_bundle(&mut self, id: &BundleId, selected: bool) -> bool {
        if !self.catalog.contains(id) {
            debug!(bundle_id = %id, "Ignoring unknown bundle");
            return false;
        }
        if selected {
            if !self.selection.contains(id) {
                self.selection.push(id.clone());
            }
        } else {
            self.selection.retain(|s| s != id);
        }
        true
    }

    /// Use `key` without looking it up.
    pub fn set_backup_key(&mut self, key: impl Into<String>) {
        self.backup_key = Some(key.into());
    }

    /// Get the backup key for `account_id`, from the store or remotely.
    ///
    /// A fetched key is written back to the store.
    ///
    /// # Errors
    ///
    /// `ManagerError::DownloadFailed` when the lookup cannot be made and
    /// `ManagerError::CredentialFetchFailed` when the response has no key.
    pub async fn resolve_backup_key(&mut self, account_id: &str) -> ManagerResult<String> {
        if self.state != PipelineState::Idle {
            return Err(ManagerError::IllegalTransition {
                state: self.state,
                event: "backup key request",
            });
        }

        if let Some(key) = self.credentials.get(account_id) {
            debug!(account_id, "Backup key from store");
            self.status.text("Fetched backup key.");
            self.backup_key = Some(key.clone());
            return Ok(key);
        }

        info!(account_id, "Fetching backup key from cma.henkaku.xyz");
        self.status.text("Fetching backup key from cma.henkaku.xyz");
        let fetcher = Arc::clone(&self.fetcher);
        let url = backup_key_url(account_id);
        self.worker
            .run(move || fetcher.fetch_text(&url), StageEvent::CredentialFetched)?;

        let body = match self.next_event().await? {
            StageEvent::CredentialFetched(body) => body,
            StageEvent::WorkerLost(reason) => return Err(ManagerError::WorkerLost(reason)),
            other => {
                return Err(ManagerError::IllegalTransition {
                    state: self.state,
                    event: other.name(),
                })
            }
        };

        let key = match body.and_then(|body| parse_backup_key(account_id, &body)) {
            Ok(key) => key,
            Err(e) => {
                warn!(account_id, error = %e, "Cannot get backup key");
                self.status
                    .text("Cannot get backup key from your AID.\nPlease check your network connection!");
                return Err(e);
            }
        };

        self.credentials.set(account_id, &key);
        if let Err(e) = self.credentials.save() {
            warn!(error = %e, "Cannot save backup key");
        }
        self.status.text("Fetched backup key.");
        self.backup_key = Some(key.clone());
        Ok(key)
    }

    /// Run the whole build until every bundle is sealed.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; the controller is then `Failed`.
    pub async fn run(&mut self) -> ManagerResult<()> {
        if self.state != PipelineState::Idle {
            return Err(ManagerError::IllegalTransition {
                state: self.state,
                event: "start",
            });
        }
        if self.backup_key.is_none() {
            return Err(ManagerError::MissingBackupKey);
        }

        if let Err(e) = self.request_cached_or_download() {
            return Err(self.fail(e));
        }

        while self.state != PipelineState::Drained {
            let step = match self.next_event().await {
                Ok(event) => self.handle(event),
                Err(e) => Err(e),
            };
            if let Err(e) = step {
                return Err(self.fail(e));
            }
        }
        Ok(())
    }

    async fn next_event(&mut self) -> ManagerResult<StageEvent> {
        self.events
            .recv()
            .await
            .ok_or_else(|| ManagerError::WorkerLost("event channel closed".to_string()))
    }

    fn handle(&mut self, event: StageEvent) -> ManagerResult<()> {
        use PipelineState::*;

        let name = event.name();
        match (self.state, event) {
            (CheckingCache, StageEvent::CacheChecked(result)) => match result? {
                CacheOutcome::FullArchive(path) => {
                    self.enqueue_selections(path);
                    self.drain_next(name)
                }
                CacheOutcome::DemoPackage(path) => self.unpack_primary(path, name),
                CacheOutcome::Download(target) => self.download_and_verify(target),
            },
            (Downloading, StageEvent::Downloaded(result)) => {
                let path = result?;
                self.start_verification(path)
            }
            (VerifyingDownload, StageEvent::DownloadVerified(result)) => {
                let path = result?;
                self.unpack_primary(path, name)
            }
            (UnpackingPrimary, StageEvent::PrimaryDecrypted(result)) => {
                result?;
                let primary = self.config.primary_bundle.clone();
                self.enqueue_selections(primary);
                self.drain_next(name)
            }
            (UnpackingPrimary | UnpackingQueued, StageEvent::BundleExtracted(result)) => {
                match result {
                    Ok(id) => self.seal_bundle(id),
                    Err(e) => {
                        warn!(dropped = self.queue.len(), "Extraction failed, clearing queue");
                        self.queue.clear();
                        Err(e)
                    }
                }
            }
            (Sealing, StageEvent::BundleSealed(result)) => {
                let id = result?;
                info!(bundle_id = %id, "Bundle sealed");
                self.drain_next(name)
            }
            (_, StageEvent::WorkerLost(reason)) => Err(ManagerError::WorkerLost(reason)),
            (state, _) => Err(ManagerError::IllegalTransition { state, event: name }),
        }
    }

    fn transition(&mut self, next: PipelineState, event: &'static str) -> ManagerResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ManagerError::IllegalTransition {
                state: self.state,
                event,
            });
        }
        debug!(from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self, e: ManagerError) -> ManagerError {
        error!(error = %e, state = %self.state, "Pipeline failed");
        self.queue.clear();
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed;
            self.history.push(PipelineState::Failed);
        }
        self.status.text(e.to_string());
        e
    }

    /// Check the cached artifacts on the worker.
    fn request_cached_or_download(&mut self) -> ManagerResult<()> {
        self.transition(PipelineState::CheckingCache, "start")?;

        let full = self.config.full_archive.clone();
        let demo = self.config.demo_package.clone();
        let layout = self.layout.clone();
        let attempts = self.config.removal_attempts;
        let backoff = self.config.removal_backoff;
        let status = self.status.clone();
        self.worker.run(
            move || stages::check_cache(&full, &demo, &layout, attempts, backoff, &status),
            StageEvent::CacheChecked,
        )
    }

    /// Download `target`; verification follows once the bytes are on disk.
    fn download_and_verify(&mut self, target: DownloadTarget) -> ManagerResult<()> {
        self.transition(PipelineState::Downloading, "cache check result")?;
        self.download_target = Some(target.clone());

        let fetcher = Arc::clone(&self.fetcher);
        let layout = self.layout.clone();
        let status = self.status.clone();
        self.worker.run(
            move || stages::download(&*fetcher, &target, &layout, &status),
            StageEvent::Downloaded,
        )
    }

    fn start_verification(&mut self, path: PathBuf) -> ManagerResult<()> {
        let target = self
            .download_target
            .take()
            .ok_or(ManagerError::IllegalTransition {
                state: self.state,
                event: "download result",
            })?;
        self.transition(PipelineState::VerifyingDownload, "download result")?;

        let status = self.status.clone();
        self.worker.run(
            move || stages::verify_download(&path, &target, &status),
            StageEvent::DownloadVerified,
        )
    }

    /// Decrypt the demo package into the primary tree.
    fn unpack_primary(&mut self, package: PathBuf, event: &'static str) -> ManagerResult<()> {
        self.transition(PipelineState::UnpackingPrimary, event)?;

        let decryptor = Arc::clone(&self.decryptor);
        let layout = self.layout.clone();
        let status = self.status.clone();
        self.worker.run(
            move || stages::decrypt_primary(&*decryptor, &package, &layout, &status),
            StageEvent::PrimaryDecrypted,
        )
    }

    /// Queue the selected bundles, then `primary_archive` last.
    fn enqueue_selections(&mut self, primary_archive: PathBuf) {
        let selected = self
            .selection
            .iter()
            .filter_map(|id| self.catalog.get(id));
        let primary = UnpackJob::new(primary_archive, self.config.primary_id.clone());
        self.queue = PendingQueue::with_primary_last(selected, primary);
        info!(jobs = self.queue.len(), "Queued bundles");
    }

    /// Extract the next queued job, or finish when the queue is empty.
    fn drain_next(&mut self, event: &'static str) -> ManagerResult<()> {
        let Some(job) = self.queue.pop() else {
            self.transition(PipelineState::Drained, event)?;
            self.finish();
            return Ok(());
        };

        let next = if self.layout.is_primary(&job.bundle_id) {
            PipelineState::UnpackingPrimary
        } else {
            PipelineState::UnpackingQueued
        };
        self.transition(next, event)?;

        let extractor = Arc::clone(&self.extractor);
        let layout = self.layout.clone();
        let status = self.status.clone();
        self.worker.run(
            move || stages::extract_job(&*extractor, &job, &layout, &status),
            StageEvent::BundleExtracted,
        )
    }

    /// Prune (primary only) and seal an extracted bundle.
    fn seal_bundle(&mut self, bundle_id: BundleId) -> ManagerResult<()> {
        let key = self
            .backup_key
            .clone()
            .ok_or(ManagerError::MissingBackupKey)?;
        self.transition(PipelineState::Sealing, "bundle extraction")?;

        let sealer = Arc::clone(&self.sealer);
        let layout = self.layout.clone();
        let status = self.status.clone();
        let trim_app = self.config.trim_app;
        self.worker.run(
            move || {
                stages::seal_bundle(&*sealer, &bundle_id, &key, trim_app, &layout, &status)
                    .map(|_| bundle_id)
            },
            StageEvent::BundleSealed,
        )
    }

    fn finish(&self) {
        info!("Build finished");
        self.status.percent(100);
        self.status.text(READY_MESSAGE);
    }
}
