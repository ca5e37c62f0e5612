pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod settings;

pub use error::ScheduleError;
pub use models::*;
pub use router::scheduling_routes;
pub use services::*;
pub use settings::{ScheduleSettings, ServiceWindow};
