//! Backend capability tiers
//!
//! Backends differ in what a plan may ask of them. Some accept explicit downcasts
//! and need lists guarded against null; others are statically typed and null-safe
//! on their own. The compiler reads a [`Capabilities`] value from the backend
//! adapter and picks the matching [`CompilationTier`].

/// Capability flags reported by a backend adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Plans may contain `Cast` nodes
    pub supports_cast: bool,

    /// The backend faults on null sequences unless the plan guards them
    pub supports_null_guard: bool,
}

impl Capabilities {
    pub const DEFAULT: Capabilities = Capabilities {
        supports_cast: true,
        supports_null_guard: false,
    };

    pub const ENUMERABLE: Capabilities = Capabilities {
        supports_cast: true,
        supports_null_guard: true,
    };

    pub const STRICT_TYPED: Capabilities = Capabilities {
        supports_cast: false,
        supports_null_guard: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::DEFAULT
    }
}

/// How the projection compiler shapes plans for a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationTier {
    /// Cast values, skip null-guarding lists
    Default,

    /// In-memory evaluation: cast values and null-guard lists
    Enumerable,

    /// Statically typed, null-safe backend: no casting, no guards
    StrictTyped,
}

impl CompilationTier {
    pub fn casts(self) -> bool {
        !matches!(self, CompilationTier::StrictTyped)
    }

    pub fn guards_nulls(self) -> bool {
        matches!(self, CompilationTier::Enumerable)
    }
}

impl From<Capabilities> for CompilationTier {
    fn from(caps: Capabilities) -> Self {
        // Most specific first
        if !caps.supports_cast {
            CompilationTier::StrictTyped
        } else if caps.supports_null_guard {
            CompilationTier::Enumerable
        } else {
            CompilationTier::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_selection() {
        assert_eq!(
            CompilationTier::from(Capabilities::DEFAULT),
            CompilationTier::Default
        );
        assert_eq!(
            CompilationTier::from(Capabilities::ENUMERABLE),
            CompilationTier::Enumerable
        );
        assert_eq!(
            CompilationTier::from(Capabilities::STRICT_TYPED),
            CompilationTier::StrictTyped
        );
    }

    #[test]
    fn test_strict_wins_over_null_guard() {
        let caps = Capabilities {
            supports_cast: false,
            supports_null_guard: true,
        };
        assert_eq!(CompilationTier::from(caps), CompilationTier::StrictTyped);
    }

    #[test]
    fn test_tier_flags() {
        assert!(CompilationTier::Default.casts());
        assert!(!CompilationTier::Default.guards_nulls());
        assert!(CompilationTier::Enumerable.casts());
        assert!(CompilationTier::Enumerable.guards_nulls());
        assert!(!CompilationTier::StrictTyped.casts());
        assert!(!CompilationTier::StrictTyped.guards_nulls());
    }
}
