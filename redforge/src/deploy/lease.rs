//! Per-deployment exclusive lease with cancellation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::ForgeError;

#[derive(Default)]
struct Lease {
    lock: Arc<tokio::sync::Mutex<()>>,
    cancel: Mutex<CancellationToken>,
}

/// Held for the whole run of a pipeline
pub struct LeaseGuard {
    _guard: OwnedMutexGuard<()>,
    cancel: CancellationToken,
}

impl LeaseGuard {
    /// Token cancelled when the pipeline is preempted
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Leases keyed by deployment id
#[derive(Default)]
pub struct LeaseRegistry {
    leases: Mutex<HashMap<String, Arc<Lease>>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lease(&self, deployment_id: &str) -> Arc<Lease> {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases
            .entry(deployment_id.to_string())
            .or_default()
            .clone()
    }

    fn install_token(lease: &Lease) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = lease.cancel.lock().unwrap_or_else(|e| e.into_inner());
        *current = token.clone();
        token
    }

    /// Take the lease, failing with `Conflict` while another pipeline holds it
    pub fn try_acquire(&self, deployment_id: &str) -> Result<LeaseGuard, ForgeError> {
        let lease = self.lease(deployment_id);
        let guard = lease.lock.clone().try_lock_owned().map_err(|_| {
            ForgeError::Conflict(format!(
                "A pipeline is already running for deployment {}",
                deployment_id
            ))
        })?;
        Ok(LeaseGuard {
            _guard: guard,
            cancel: Self::install_token(&lease),
        })
    }

    /// Cancel whatever holds the lease and wait for it to be released
    pub async fn preempt(&self, deployment_id: &str) -> LeaseGuard {
        let lease = self.lease(deployment_id);
        {
            let current = lease.cancel.lock().unwrap_or_else(|e| e.into_inner());
            current.cancel();
        }
        debug!("Waiting for the lease of deployment {}", deployment_id);
        let guard = lease.lock.clone().lock_owned().await;
        LeaseGuard {
            _guard: guard,
            cancel: Self::install_token(&lease),
        }
    }

    pub fn is_held(&self, deployment_id: &str) -> bool {
        self.lease(deployment_id).lock.try_lock().is_err()
    }

    /// Drop the lease of a deleted deployment
    pub fn forget(&self, deployment_id: &str) {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases.remove(deployment_id);
    }
}
