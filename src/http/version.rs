//! HTTP protocol version

use std::fmt;

/// `(major, minor)` pair, ordered lexicographically.
///
/// The default value `0.0` marks a status line whose version could not be
/// parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpVersion {
    major: u16,
    minor: u16,
}

impl HttpVersion {
    pub const HTTP_0_9: Self = Self::new(0, 9);
    pub const HTTP_1_0: Self = Self::new(1, 0);
    pub const HTTP_1_1: Self = Self::new(1, 1);
    pub const HTTP_2_0: Self = Self::new(2, 0);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub const fn major(self) -> u16 {
        self.major
    }

    pub const fn minor(self) -> u16 {
        self.minor
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}
