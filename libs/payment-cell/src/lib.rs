// =====================================================================================
// PAYMENT CELL - M-PESA CHECKOUT, WEBHOOK RECONCILIATION AND ENTITLEMENT GRANTS
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Payment, PaymentError, PaymentStatus, PaymentType};
pub use router::{payment_cron_routes, payment_routes, PaymentCronState, PaymentState};
pub use services::{MpesaClient, PaymentGateway, PaymentService, PricingService, UnconfiguredGateway};
