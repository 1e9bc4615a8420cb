pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use router::{auth_routes, AuthState};
pub use services::DeviceBindingService;
