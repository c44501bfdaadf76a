//! Runtime capability queries.
//!
//! Optional backends are selected with cargo features. Callers that exercise
//! an optional backend should check [`has_capability`] first and skip the
//! configuration when it is absent, rather than treating the
//! [`BackendUnavailable`](crate::BinaryIndexError::BackendUnavailable) error
//! as a failure.
//!
//! ```
//! use manifoldb_binary::capability::{has_capability, Capability};
//!
//! if !has_capability(Capability::Cagra) {
//!     return;
//! }
//! ```

use serde::{Deserialize, Serialize};

/// An optional feature that may or may not be compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// 64-bit popcount lanes for Hamming distance. Always present.
    Simd,
    /// The device-resident graph index backend (`cagra` feature).
    Cagra,
}

impl Capability {
    /// All known capabilities.
    pub const ALL: [Self; 2] = [Self::Simd, Self::Cagra];

    /// The upper-case name used in [`compile_options`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Simd => "SIMD",
            Self::Cagra => "CAGRA",
        }
    }
}

/// Check whether a capability was compiled into this build.
#[must_use]
pub const fn has_capability(capability: Capability) -> bool {
    match capability {
        Capability::Simd => true,
        Capability::Cagra => cfg!(feature = "cagra"),
    }
}

/// Space-separated names of the capabilities compiled in, e.g. `"SIMD CAGRA "`.
#[must_use]
pub fn compile_options() -> String {
    Capability::ALL
        .iter()
        .filter(|c| has_capability(**c))
        .map(|c| format!("{} ", c.name()))
        .collect()
}

/// Fail with [`BackendUnavailable`](crate::BinaryIndexError::BackendUnavailable)
/// if the capability is missing.
pub(crate) fn require(capability: Capability) -> crate::Result<()> {
    if has_capability(capability) {
        Ok(())
    } else {
        Err(crate::BinaryIndexError::BackendUnavailable(capability))
    }
}
