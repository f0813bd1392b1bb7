//! HTTP surface of the gateway: admission, the websocket endpoint and the
//! producer-facing broadcaster.

pub mod auth;
pub mod broadcaster;
pub mod http;
pub mod websocket;

pub use auth::{AuthError, Authenticator, JwtAuthenticator};
pub use broadcaster::EventBroadcaster;
pub use http::create_router;
pub use websocket::AppState;
