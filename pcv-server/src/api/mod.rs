//! HTTP API handlers for pcv-server

pub mod health;
pub mod identity;
pub mod scores;
pub mod serve;
pub mod sse;
pub mod ui;
pub mod upload;

pub use health::health_routes;
pub use identity::{AuthenticatedUser, LoginRedirect};
pub use scores::score_routes;
pub use serve::content_routes;
pub use sse::session_events;
pub use ui::ui_routes;
pub use upload::upload_routes;
