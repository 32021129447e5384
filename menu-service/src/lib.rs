pub mod api_error;
pub mod app;
pub mod app_state;
pub mod config;
pub mod drink_handlers;
pub mod drinks;
pub mod permissions;
pub mod store;

pub use api_error::{ApiError, ApiResult};
pub use app::build_router;
pub use app_state::AppState;
