pub mod errors;
pub mod exporter;
pub mod pricing;
pub mod webhook;

pub use errors::BillingError;
pub use exporter::{spawn_billing_exporter, BillingSink};
pub use pricing::compute_cost;
pub use webhook::{HmacSha256Verifier, SignatureVerifier, WebhookIngestor};
