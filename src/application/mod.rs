pub mod content;
pub mod error;
pub mod feed;
pub mod rewrite;
pub mod upstream;
