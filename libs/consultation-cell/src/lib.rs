// =====================================================================================
// CONSULTATION CELL - REQUEST, CLAIM AND LIFECYCLE OF A CONSULTATION
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Consultation, ConsultationError, ConsultationStatus, ConsultationType};
pub use router::{consultation_routes, ConsultationState};
pub use services::ConsultationService;
