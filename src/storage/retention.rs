use crate::error::ConfigError;

/// Keep the `keep` most recent artifacts of a population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    keep: usize,
}

impl RetentionPolicy {
    pub fn new(keep: usize) -> Self {
        Self { keep }
    }

    /// Parses a raw retention count; `name` is the setting it came from.
    pub fn parse(name: &'static str, raw: &str) -> Result<Self, ConfigError> {
        raw.trim()
            .parse::<usize>()
            .map(Self::new)
            .map_err(|_| ConfigError::InvalidRetention {
                name,
                value: raw.to_string(),
            })
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    /// The artifacts to evict from an ascending (oldest first) population.
    pub fn evictions<'a, T>(&self, sorted: &'a [T]) -> &'a [T] {
        &sorted[..sorted.len().saturating_sub(self.keep)]
    }
}
