//! Decides which document a session is editing and mints its id exactly once.

use crate::models::Diagram;
use crate::storage::local_cache::{Draft, LocalCache};
use crate::storage::{Capability, CommitReceipt, DocumentStore, StorageError};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where the loaded diagram came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Fetched from the document store
    Remote,
    /// Recovered from the local draft slot
    Draft,
    /// Nothing to load
    Blank,
    /// The requested id was dead; local slots were cleared
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub diagram: Diagram,
    pub canonical_id: Option<Uuid>,
    pub source: ResolutionSource,
    /// Token tying later commits to this load.
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub receipt: CommitReceipt,
    /// True for the single commit that minted the canonical id.
    pub promoted: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    #[error(transparent)]
    Store(#[from] StorageError),
    /// The session moved to another diagram while the commit was in flight.
    #[error("Commit superseded by navigation")]
    Superseded,
}

/// Notified whenever the canonical id changes (load, promotion, reset).
pub trait IdentityListener: Send + Sync {
    fn on_identity(&self, canonical_id: Option<Uuid>);
}

struct Identity {
    epoch: u64,
    canonical: Option<Uuid>,
    /// Create key of the first save for this epoch, until it is confirmed.
    pending_create: Option<Uuid>,
}

enum CommitTarget {
    Update(Uuid),
    Create { key: Uuid, minted: bool },
}

pub struct IdentityResolver {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn LocalCache>,
    identity: Mutex<Identity>,
    /// Serialises "read canonical id, create or update, record result".
    flight: tokio::sync::Mutex<()>,
    listeners: RwLock<Vec<Weak<dyn IdentityListener>>>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<dyn LocalCache>) -> Self {
        Self {
            store,
            cache,
            identity: Mutex::new(Identity {
                epoch: 0,
                canonical: None,
                pending_create: None,
            }),
            flight: tokio::sync::Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<L: IdentityListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn IdentityListener> = Arc::downgrade(listener) as Weak<dyn IdentityListener>;
        self.listeners.write().push(weak);
    }

    pub fn canonical_id(&self) -> Option<Uuid> {
        self.identity.lock().canonical
    }

    pub fn epoch(&self) -> u64 {
        self.identity.lock().epoch
    }

    /// Create key a retried first save must reuse, if one is outstanding.
    pub fn pending_create_key(&self) -> Option<Uuid> {
        self.identity.lock().pending_create
    }

    /// Draft payload for `diagram`, carrying any outstanding create key.
    pub fn local_draft(&self, diagram: &Diagram) -> Draft {
        Draft::from_diagram(diagram).with_create_key(self.pending_create_key())
    }

    pub fn cache(&self) -> &Arc<dyn LocalCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Starts a new epoch. In-flight commits from older epochs are ignored.
    fn begin(&self, canonical: Option<Uuid>) -> u64 {
        let mut identity = self.identity.lock();
        identity.epoch += 1;
        identity.canonical = canonical;
        identity.pending_create = None;
        identity.epoch
    }

    /// Loads the diagram a session should open.
    pub async fn resolve(&self, requested: Option<Uuid>, caller: &Capability) -> Resolution {
        let epoch = self.begin(None);

        let resolution = match requested {
            Some(id) => self.resolve_requested(id, caller, epoch).await,
            None => self.resolve_root(epoch),
        };

        // A later resolve wins; report what this one found but do not publish it.
        if self.epoch() == resolution.epoch {
            self.notify(resolution.canonical_id);
        }
        resolution
    }

    async fn resolve_requested(&self, id: Uuid, caller: &Capability, epoch: u64) -> Resolution {
        match self.store.fetch(id, caller).await {
            Ok(mut diagram) => {
                diagram.id = Some(id);
                {
                    let mut identity = self.identity.lock();
                    if identity.epoch == epoch {
                        identity.canonical = Some(id);
                    }
                }
                if let Err(e) = self.cache.store_pointer(id) {
                    warn!("[Identity] Failed to mirror pointer for {}: {}", id, e);
                }
                if let Err(e) = self.cache.store_draft(&Draft::from_diagram(&diagram)) {
                    warn!("[Identity] Failed to mirror draft for {}: {}", id, e);
                }
                info!("[Identity] Opened document {}", id);
                Resolution {
                    diagram,
                    canonical_id: Some(id),
                    source: ResolutionSource::Remote,
                    epoch,
                }
            }
            Err(e) => {
                if e.is_not_found() {
                    info!("[Identity] Document {} not found, starting blank", id);
                } else {
                    warn!("[Identity] Failed to load {}: {}, starting blank", id, e);
                }
                self.clear_local();
                Resolution {
                    diagram: Diagram::blank(),
                    canonical_id: None,
                    source: ResolutionSource::Reset,
                    epoch,
                }
            }
        }
    }

    fn resolve_root(&self, epoch: u64) -> Resolution {
        let blank = |source| Resolution {
            diagram: Diagram::blank(),
            canonical_id: None,
            source,
            epoch,
        };

        match self.cache.load_pointer() {
            Ok(Some(pointer)) => {
                debug!("[Identity] Ignoring stale pointer {} at root", pointer);
                return blank(ResolutionSource::Blank);
            }
            Ok(None) => {}
            Err(e) => warn!("[Identity] Failed to read pointer slot: {}", e),
        }

        match self.cache.load_draft() {
            Ok(Some(draft)) => {
                info!(
                    "[Identity] Recovered local draft with {} nodes",
                    draft.nodes.len()
                );
                if let Some(key) = draft.create_key {
                    let mut identity = self.identity.lock();
                    if identity.epoch == epoch {
                        debug!("[Identity] Resuming unconfirmed first save {}", key);
                        identity.pending_create = Some(key);
                    }
                }
                Resolution {
                    diagram: draft.into_diagram(),
                    canonical_id: None,
                    source: ResolutionSource::Draft,
                    epoch,
                }
            }
            Ok(None) => blank(ResolutionSource::Blank),
            Err(e) => {
                warn!("[Identity] Unreadable local draft: {}", e);
                blank(ResolutionSource::Blank)
            }
        }
    }

    /// Explicit "new diagram": both local slots cleared, no canonical id.
    pub fn reset(&self) -> u64 {
        let epoch = self.begin(None);
        self.clear_local();
        self.notify(None);
        epoch
    }

    fn clear_local(&self) {
        if let Err(e) = self.cache.clear() {
            warn!("[Identity] Failed to clear local cache: {}", e);
        }
    }

    /// Commits `diagram` for the load identified by `epoch`.
    ///
    /// Creates when no canonical id exists yet, updates otherwise. At most one
    /// commit runs at a time, so two overlapping calls around the first save
    /// produce one create followed by one update. Every create attempt for
    /// the same epoch carries the same create key, so a retry after a lost
    /// response cannot produce a second record.
    pub async fn commit(
        &self,
        diagram: &Diagram,
        caller: &Capability,
        epoch: u64,
    ) -> Result<CommitOutcome, CommitError> {
        let _flight = self.flight.lock().await;

        let target = {
            let mut identity = self.identity.lock();
            if identity.epoch != epoch {
                return Err(CommitError::Superseded);
            }
            match (identity.canonical, identity.pending_create) {
                (Some(id), _) => CommitTarget::Update(id),
                (None, Some(key)) => CommitTarget::Create { key, minted: false },
                (None, None) => {
                    let key = Uuid::new_v4();
                    identity.pending_create = Some(key);
                    CommitTarget::Create { key, minted: true }
                }
            }
        };

        let receipt = match target {
            CommitTarget::Update(id) => self.store.commit(Some(id), diagram, caller).await?,
            CommitTarget::Create { key, minted } => {
                if minted {
                    self.remember_create_key(key, diagram);
                }
                self.store.create_once(key, diagram, caller).await?
            }
        };

        let promoted = {
            let mut identity = self.identity.lock();
            if identity.epoch != epoch {
                warn!(
                    "[Identity] Commit for {} resolved after navigation, not adopting",
                    receipt.id
                );
                return Err(CommitError::Superseded);
            }
            if identity.canonical.is_none() {
                identity.canonical = Some(receipt.id);
                identity.pending_create = None;
                true
            } else {
                false
            }
        };

        if promoted {
            info!("[Identity] Promoted local diagram to {}", receipt.id);
            if let Err(e) = self.cache.store_pointer(receipt.id) {
                warn!("[Identity] Failed to store pointer {}: {}", receipt.id, e);
            }
            self.forget_create_key();
            self.notify(Some(receipt.id));
        }

        Ok(CommitOutcome { receipt, promoted })
    }

    /// Records the create key in the draft slot so a restart retries with it.
    fn remember_create_key(&self, key: Uuid, diagram: &Diagram) {
        let draft = match self.cache.load_draft() {
            Ok(Some(draft)) => draft,
            _ => Draft::from_diagram(diagram),
        };
        if let Err(e) = self.cache.store_draft(&draft.with_create_key(Some(key))) {
            warn!("[Identity] Failed to record create key {}: {}", key, e);
        }
    }

    fn forget_create_key(&self) {
        if let Ok(Some(draft)) = self.cache.load_draft() {
            if draft.create_key.is_some() {
                if let Err(e) = self.cache.store_draft(&draft.with_create_key(None)) {
                    warn!("[Identity] Failed to clear create key: {}", e);
                }
            }
        }
    }

    fn notify(&self, canonical_id: Option<Uuid>) {
        let listeners: Vec<Arc<dyn IdentityListener>> = {
            let mut guard = self.listeners.write();
            guard.retain(|w| w.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_identity(canonical_id);
        }
    }
}
