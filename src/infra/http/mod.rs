//! HTTP surface: routing, response negotiation and body compression.

pub mod compression;
mod middleware;
pub mod negotiate;
mod public;

pub use compression::{BodyEncoder, BrotliEncoder, Compressor, Encoded, GzipEncoder};
pub use middleware::RequestContext;
pub use negotiate::Encoding;
pub use public::{HttpState, build_router};
