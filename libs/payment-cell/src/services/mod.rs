pub mod mpesa;
pub mod payment;
pub mod pricing;

pub use mpesa::{MpesaClient, PaymentGateway, UnconfiguredGateway};
pub use payment::PaymentService;
pub use pricing::{PricingService, RechargePackage, RECHARGE_PACKAGES};
