//! HTTP byte range module
//!
//! Byte ranges as carried by `Range` request headers (RFC 7233), with bound
//! resolution against a known resource size.

use std::fmt;

/// One byte range from a `Range` request header
///
/// The three forms are `first-last`, `first-` and `-suffix`. An empty range
/// (nothing set) stands for the whole resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpByteRange {
    /// First byte position, None when unspecified
    first_byte_position: Option<i64>,
    /// Last byte position (inclusive), None when unspecified
    last_byte_position: Option<i64>,
    /// Suffix length for `-N` ranges
    suffix_length: Option<i64>,
    has_computed_bounds: bool,
}

impl HttpByteRange {
    /// `first-last`; a negative `last` leaves the range open-ended.
    pub const fn bounded(first: i64, last: i64) -> Self {
        Self {
            first_byte_position: Some(first),
            last_byte_position: if last < 0 { None } else { Some(last) },
            suffix_length: None,
            has_computed_bounds: false,
        }
    }

    /// `first-`
    pub const fn right_unbounded(first: i64) -> Self {
        Self {
            first_byte_position: Some(first),
            last_byte_position: None,
            suffix_length: None,
            has_computed_bounds: false,
        }
    }

    /// `-length`
    pub const fn suffix(length: i64) -> Self {
        Self {
            first_byte_position: None,
            last_byte_position: None,
            suffix_length: Some(length),
            has_computed_bounds: false,
        }
    }

    #[inline]
    pub const fn first_byte_position(&self) -> Option<i64> {
        self.first_byte_position
    }

    #[inline]
    pub const fn last_byte_position(&self) -> Option<i64> {
        self.last_byte_position
    }

    #[inline]
    pub const fn suffix_length(&self) -> Option<i64> {
        self.suffix_length
    }

    pub const fn has_first_byte_position(&self) -> bool {
        self.first_byte_position.is_some()
    }

    pub const fn has_last_byte_position(&self) -> bool {
        self.last_byte_position.is_some()
    }

    pub const fn is_suffix_byte_range(&self) -> bool {
        self.suffix_length.is_some()
    }

    pub fn set_first_byte_position(&mut self, value: i64) {
        self.first_byte_position = Some(value);
    }

    /// Negative values clear the position.
    pub fn set_last_byte_position(&mut self, value: i64) {
        self.last_byte_position = (value >= 0).then_some(value);
    }

    pub fn set_suffix_length(&mut self, value: i64) {
        self.suffix_length = Some(value);
    }

    /// Nothing specified: the whole resource.
    pub const fn is_empty(&self) -> bool {
        self.first_byte_position.is_none()
            && self.last_byte_position.is_none()
            && self.suffix_length.is_none()
    }

    /// A suffix of positive length, or a non-negative start not past the end
    pub fn is_valid(&self) -> bool {
        if let Some(suffix) = self.suffix_length {
            return suffix > 0;
        }
        match (self.first_byte_position, self.last_byte_position) {
            (Some(first), Some(last)) => first >= 0 && last >= first,
            (Some(first), None) => first >= 0,
            _ => false,
        }
    }

    /// Resolve the range against a resource of `size` bytes.
    ///
    /// Bounds are computed at most once; later calls return `false`. On
    /// success both positions are set and clamped to the resource.
    pub fn compute_bounds(&mut self, size: i64) -> bool {
        if size < 0 || self.has_computed_bounds {
            return false;
        }
        self.has_computed_bounds = true;

        if self.is_empty() {
            self.first_byte_position = Some(0);
            self.last_byte_position = Some(size - 1);
            return true;
        }
        if !self.is_valid() {
            return false;
        }

        if let Some(suffix) = self.suffix_length.take() {
            self.first_byte_position = Some(size - size.min(suffix));
            self.last_byte_position = Some(size - 1);
            return true;
        }

        match self.first_byte_position {
            Some(first) if first < size => {
                let last = self.last_byte_position.map_or(size - 1, |l| l.min(size - 1));
                self.last_byte_position = Some(last);
                true
            }
            _ => false,
        }
    }

    /// Value for a `Range` request header, e.g. `bytes=0-499`
    pub fn header_value(&self) -> String {
        format!("bytes={self}")
    }
}

impl fmt::Display for HttpByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(suffix) = self.suffix_length {
            return write!(f, "-{suffix}");
        }
        let first = self.first_byte_position.unwrap_or(0);
        match self.last_byte_position {
            Some(last) => write!(f, "{first}-{last}"),
            None => write!(f, "{first}-"),
        }
    }
}
