//! Shared state for the gateway endpoints

use std::sync::Arc;

use crate::api::auth::{Authenticator, JwtAuthenticator};
use crate::api::broadcaster::EventBroadcaster;
use crate::config::SessionConfig;
use crate::hub::{AllowAll, Hub, RoomPolicy};

/// Everything a websocket session needs, shared by all connections
pub struct AppState {
    pub hub: Hub,
    pub broadcaster: EventBroadcaster,
    pub authenticator: Arc<dyn Authenticator>,
    pub policy: Arc<dyn RoomPolicy>,
    pub session: SessionConfig,
}

impl AppState {
    /// Local-only state with JWT admission, open subscriptions and default limits
    pub fn new(hub: Hub, jwt_secret: &str) -> Self {
        Self {
            broadcaster: EventBroadcaster::local(hub.clone()),
            hub,
            authenticator: Arc::new(JwtAuthenticator::new(jwt_secret)),
            policy: Arc::new(AllowAll),
            session: SessionConfig::default(),
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: EventBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn RoomPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}
