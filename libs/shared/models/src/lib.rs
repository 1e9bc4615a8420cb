pub mod auth;
pub mod error;
pub mod response;
pub mod service;

pub use auth::{Identity, Role};
pub use error::{AppError, ErrorRecord};
pub use service::ServiceType;
