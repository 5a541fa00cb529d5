//! HTTP protocol layer module
//!
//! Header block parsing, byte ranges, freshness and `Vary` handling for a
//! caching client. Nothing here performs I/O.

pub mod cache;
pub mod date;
pub mod error;
pub mod headers;
pub mod range;
pub mod util;
pub mod vary;
pub mod version;

// Re-export commonly used types
pub use cache::{FreshnessLifetimes, FreshnessPolicy, ValidationType};
pub use error::ParseError;
pub use headers::{PersistOptions, ResponseHeaders};
pub use range::HttpByteRange;
pub use util::parse_range_header;
pub use vary::VaryData;
pub use version::HttpVersion;
