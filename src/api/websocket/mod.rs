//! WebSocket endpoint
//!
//! `GET /ws` admits a bearer token, upgrades, and hands the socket to a
//! session that pumps frames between the client and the hub.

pub mod handler;
pub mod session;
pub mod state;

pub use handler::ws_handler;
pub use session::{run_session, serve_socket};
pub use state::AppState;
