pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Doctor, DoctorError};
pub use router::{doctor_cron_routes, DoctorState};
pub use services::DoctorService;
