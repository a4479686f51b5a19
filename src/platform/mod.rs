//! Collaborators the client talks to. Every service receives an explicit
//! [`Platform`] handle instead of reaching for process-wide state.

pub mod auth;
pub mod clock;
pub mod document;
pub mod document_memory;
pub mod messaging;
pub mod storage;

use std::sync::Arc;

use crate::constants::Env;

pub use auth::{AuthProvider, AuthUser};
pub use clock::Clock;
pub use document::{DocumentStore, Subscription};
pub use messaging::PushMessaging;
pub use storage::BlobStore;

#[derive(Clone)]
pub struct Platform {
    pub auth: Arc<dyn AuthProvider>,
    pub db: Arc<dyn DocumentStore>,
    pub storage: Arc<dyn BlobStore>,
    pub messaging: Arc<dyn PushMessaging>,
    pub clock: Arc<dyn Clock>,
    pub env: Arc<Env>,
}

impl Platform {
    /// Uid of the signed-in user, if any.
    pub fn current_uid(&self) -> Option<String> {
        self.auth.current_user().map(|user| user.uid)
    }
}
