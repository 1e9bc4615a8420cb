pub mod conflict;
pub mod lifecycle;
pub mod scheduler;
pub mod sweeps;

pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
pub use scheduler::AppointmentService;
pub use sweeps::AppointmentSweeper;
