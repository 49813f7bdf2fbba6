//! Outbound clients for the third-party services the API fronts.

pub mod heygen;
pub mod storage;
pub mod stripe;

pub use heygen::HeyGenClient;
pub use storage::StorageClient;
pub use stripe::StripeClient;
