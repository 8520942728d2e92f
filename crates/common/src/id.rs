//! ID generation utilities.

use uuid::Uuid;

/// ID generator for polls.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new poll ID.
    ///
    /// A random UUID v4: 122 random bits from the OS CSPRNG, hyphenated.
    /// There is no time component, so ids reveal nothing about creation order.
    #[must_use]
    pub fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_poll_id() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 36); // UUID with hyphens
        assert_ne!(id1, id2);
        assert_eq!(id1.chars().nth(14), Some('4')); // version nibble
    }
}
