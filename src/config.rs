//! Introspection configuration
//!
//! The walkers are driven entirely by metadata found in the image, which may be truncated,
//! stale or crafted. The only knob that matters for termination is how deep recursive
//! walks (superclass chains, nested aggregates during equality) may go before they are
//! reported as unknown.

/// Limits applied by an [`crate::Introspector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrospectorConfig {
    /// Maximum recursion depth for superclass chains and nested value walks (default: 64)
    pub max_depth: usize,
}

impl Default for IntrospectorConfig {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

impl IntrospectorConfig {
    /// Tight limits for untrusted input such as fuzzing corpora
    #[must_use]
    pub fn minimal() -> Self {
        Self { max_depth: 8 }
    }

    /// Overrides the recursion limit
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert_eq!(IntrospectorConfig::default().max_depth, 64);
        assert_eq!(IntrospectorConfig::minimal().max_depth, 8);
        assert_eq!(
            IntrospectorConfig::default().with_max_depth(3).max_depth,
            3
        );
    }
}
