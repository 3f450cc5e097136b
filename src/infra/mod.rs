pub mod error;
pub mod http;
pub mod rss;
pub mod telemetry;
pub mod upstream;
