pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{PatientSession, SessionError};
pub use router::{session_routes, SessionState};
pub use services::SessionService;
