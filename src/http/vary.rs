//! Vary fingerprint
//!
//! Digest of the request header values a response varies on, stored next
//! to the cache entry and recomputed for each new request.

use hyper::HeaderMap;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use super::headers::ResponseHeaders;

/// Stored discriminator for a cached response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaryData {
    /// MD5 over `value + "\n"` for every header named by `Vary`, in order
    Digest([u8; 16]),
    /// `Vary: *`, which matches no request
    Wildcard,
}

impl VaryData {
    /// Fingerprint `request` against the `Vary` list of `response`.
    ///
    /// Returns `None` when the response has no `Vary` header.
    pub fn compute(request: &HeaderMap, response: &ResponseHeaders) -> Option<Self> {
        let mut hasher = Md5::new();
        let mut processed = false;
        for name in response.values("vary") {
            if name == "*" {
                return Some(Self::Wildcard);
            }
            hasher.update(request_header_value(request, name));
            hasher.update(b"\n");
            processed = true;
        }
        processed.then(|| Self::Digest(hasher.finalize().into()))
    }

    /// Whether a cached response stored with this fingerprint can serve
    /// `request`.
    pub fn matches_request(&self, request: &HeaderMap, cached_response: &ResponseHeaders) -> bool {
        if cached_response.has_header_value("vary", "*") {
            return false;
        }
        Self::compute(request, cached_response).is_some_and(|fresh| fresh == *self)
    }

    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

/// Raw bytes of every line of `name`, joined with `, `; empty when absent.
fn request_header_value(request: &HeaderMap, name: &str) -> Vec<u8> {
    let mut joined = Vec::new();
    for (i, value) in request.get_all(name).iter().enumerate() {
        if i > 0 {
            joined.extend_from_slice(b", ");
        }
        joined.extend_from_slice(value.as_bytes());
    }
    joined
}
