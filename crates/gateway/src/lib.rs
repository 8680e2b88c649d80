pub mod annotate;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use routes::{router, run_server};
pub use state::AppState;
