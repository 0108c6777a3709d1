// Mappers - upstream response translation

pub mod envelope;

pub use envelope::{into_client_response, ProxyResponseEnvelope};
