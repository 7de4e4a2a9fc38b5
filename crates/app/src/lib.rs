pub mod app;
pub mod config;
pub mod error;
pub mod resources;
pub mod services;
pub mod util;

pub use app::{AppState, setup_db};
pub use config::WarehouseConfig;
pub use error::{AppError, Result};
pub use resources::{load_resources, parse_resources};
pub use services::{AppServices, ShredInput, ShredRequest, ShredSummary};
pub use util::time::{parse_date, resolve_dates, resolve_window};
