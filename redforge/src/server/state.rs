//! Server state

use std::sync::Arc;

use secrecy::SecretString;

use crate::deploy::orchestrator::Orchestrator;
use crate::store::Store;

/// Server state shared across handlers
pub struct ServerState {
    pub store: Arc<Store>,
    pub orchestrator: Arc<Orchestrator>,
    /// HS256 secret for bearer tokens
    pub auth_secret: SecretString,
}

impl ServerState {
    pub fn new(store: Arc<Store>, orchestrator: Arc<Orchestrator>, auth_secret: SecretString) -> Self {
        Self {
            store,
            orchestrator,
            auth_secret,
        }
    }
}
