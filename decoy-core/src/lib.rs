//! Content responder for a decoy HTTP endpoint.
//!
//! Impersonates an ordinary production web server: serves a pre-staged
//! content tree, spoofs the `Server` banner and records every request as a
//! structured observation before answering it.

pub mod config;
pub mod identity;
pub mod index;
pub mod observation;
pub mod request;
pub mod resolver;
pub mod response;

pub use identity::ServerIdentity;
pub use index::ContentIndex;
pub use observation::{ObservationRecord, ObservationSink};
pub use request::InboundRequest;
pub use resolver::Responder;
pub use response::Response;
