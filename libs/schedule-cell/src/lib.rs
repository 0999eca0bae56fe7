pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use services::assigner::ScheduleAssignerService;
pub use services::catalog::ShiftCatalogService;
pub use services::conflict::{ranges_overlap, ConflictCheckerService};
