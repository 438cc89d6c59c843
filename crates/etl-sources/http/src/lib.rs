mod api_source;
mod factory;
mod payload;

pub use api_source::{ApiConfig, ApiSource};
pub use factory::ApiSourceFactory;
pub use payload::{normalize_payload, ENVELOPE_KEYS};
