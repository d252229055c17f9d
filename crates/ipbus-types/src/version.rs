//! Client protocol version and the compatibility rule engines apply on join.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// `major.minor.patch` version exchanged during the join handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version of this crate, parsed once from `CARGO_PKG_VERSION`.
    pub fn current() -> Self {
        static CURRENT: OnceLock<Version> = OnceLock::new();
        *CURRENT.get_or_init(|| {
            semver::Version::parse(env!("CARGO_PKG_VERSION"))
                .map(|v| Self::new(v.major, v.minor, v.patch))
                .unwrap_or(Self::new(0, 0, 0))
        })
    }

    /// Two versions interoperate when their majors match, or for `0.x`
    /// releases, when their minors match.
    pub fn compatible(&self, other: Self) -> bool {
        if self.major == 0 && other.major == 0 {
            self.minor == other.minor
        } else {
            self.major == other.major
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
