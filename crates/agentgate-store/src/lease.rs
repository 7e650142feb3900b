//! Workspace lease manager: a workspace has at most one active
//! lease at a time. Acquisition is atomic create-or-fail against an
//! in-memory registry backed by the persisted lease file, so a restart
//! rebuilds leases from disk rather than losing them.

use crate::artifact_store::ArtifactStore;
use agentgate_core::{Error, Id, Lease, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, PartialEq, Eq)]
pub enum AcquireError {
    /// The workspace already has a live (non-expired) lease.
    Busy,
}

/// Tracks which workspace holds which lease, in memory, mirrored to disk via
/// `ArtifactStore` so a process restart can rebuild state.
pub struct LeaseManager {
    store: ArtifactStore,
    by_workspace: DashMap<String, Lease>,
}

impl LeaseManager {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            by_workspace: DashMap::new(),
        }
    }

    /// Rebuild the in-memory index from persisted lease files (called once
    /// at startup).
    pub async fn rehydrate(&self) -> Result<()> {
        for id in self.store.list_lease_ids().await? {
            if let Some(lease) = self.store.try_read_lease(&id).await? {
                self.by_workspace.insert(lease.workspace_id.0.clone(), lease);
            }
        }
        Ok(())
    }

    /// Acquire a lease on `workspace_id` for `owner_run_id`, valid for `ttl`.
    /// Fails with `Busy` if a non-expired lease already exists for this
    /// workspace, unless it is owned by the same run (in which case it is
    /// refreshed).
    pub async fn acquire(
        &self,
        workspace_id: &Id,
        owner_run_id: &Id,
        ttl: Duration,
    ) -> Result<std::result::Result<Lease, AcquireError>> {
        let now = chrono::Utc::now();
        if let Some(existing) = self.by_workspace.get(workspace_id.as_ref()) {
            if !existing.is_expired(now) {
                if existing.owner_run_id == *owner_run_id {
                    let lease = existing.value().clone();
                    drop(existing);
                    return Ok(Ok(self.refresh_inner(lease, ttl).await?));
                }
                return Ok(Err(AcquireError::Busy));
            }
        }

        let lease = Lease {
            id: Id::new(),
            workspace_id: workspace_id.clone(),
            owner_run_id: owner_run_id.clone(),
            acquired_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60)),
        };
        self.store.write_lease(&lease).await?;
        self.by_workspace
            .insert(workspace_id.as_ref().to_string(), lease.clone());
        debug!(workspace_id = %workspace_id, lease_id = %lease.id, "lease acquired");
        Ok(Ok(lease))
    }

    /// Extend an existing lease's expiry. Returns `Error::NotFound` if the
    /// lease is gone (e.g. reaped already).
    pub async fn refresh(&self, lease_id: &Id, ttl: Duration) -> Result<Lease> {
        let lease = self
            .by_workspace
            .iter()
            .find(|entry| entry.value().id == *lease_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(format!("lease {lease_id}")))?;
        self.refresh_inner(lease, ttl).await
    }

    async fn refresh_inner(&self, mut lease: Lease, ttl: Duration) -> Result<Lease> {
        lease.expires_at = chrono::Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60));
        self.store.write_lease(&lease).await?;
        self.by_workspace
            .insert(lease.workspace_id.as_ref().to_string(), lease.clone());
        Ok(lease)
    }

    /// Release a lease. Idempotent — releasing an already-released or
    /// unknown lease is not an error.
    pub async fn release(&self, lease_id: &Id) -> Result<()> {
        let workspace_id = self
            .by_workspace
            .iter()
            .find(|entry| entry.value().id == *lease_id)
            .map(|entry| entry.key().clone());
        if let Some(workspace_id) = workspace_id {
            self.by_workspace.remove(&workspace_id);
        }
        self.store.remove_lease(lease_id.as_ref()).await?;
        Ok(())
    }

    pub fn active_lease(&self, workspace_id: &Id) -> Option<Lease> {
        self.by_workspace
            .get(workspace_id.as_ref())
            .filter(|l| !l.is_expired(chrono::Utc::now()))
            .map(|l| l.clone())
    }

    /// Sweep expired leases once, releasing them. Returns the count reaped.
    pub async fn reap_expired(&self) -> Result<usize> {
        let now = chrono::Utc::now();
        let expired: Vec<Lease> = self
            .by_workspace
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.value().clone())
            .collect();
        for lease in &expired {
            self.by_workspace.remove(lease.workspace_id.as_ref());
            self.store.remove_lease(lease.id.as_ref()).await?;
            warn!(lease_id = %lease.id, workspace_id = %lease.workspace_id, "reaped expired lease");
        }
        Ok(expired.len())
    }

    /// Run the reaper loop until `cancel` fires, sweeping every `interval`.
    pub async fn run_reaper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("lease reaper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_expired().await {
                        warn!(error = %e, "lease reaper sweep failed");
                    }
                }
            }
        }
    }
}
