use std::time::Duration;

/// Fixed hop lengths for parking payloads on the broker.
///
/// Each tier has its own queue with one queue-level TTL, so messages in a
/// tier expire in the order they were parked. Always holds at least one
/// tier, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayTiers(Vec<Duration>);

impl DelayTiers {
    /// `None` when no non-zero tier is given.
    pub fn from_millis(values: &[u64]) -> Option<Self> {
        let mut tiers: Vec<Duration> = values
            .iter()
            .filter(|ms| **ms > 0)
            .map(|ms| Duration::from_millis(*ms))
            .collect();

        tiers.sort();
        tiers.dedup();

        (!tiers.is_empty()).then_some(Self(tiers))
    }

    /// Largest tier that does not overshoot `remaining`. Falls back to the
    /// shortest tier when even that one is longer.
    pub fn hop_for(&self, remaining: Duration) -> Duration {
        self.0
            .iter()
            .rev()
            .find(|tier| **tier <= remaining)
            .copied()
            .unwrap_or(self.0[0])
    }

    pub fn iter(&self) -> impl Iterator<Item = Duration> + '_ {
        self.0.iter().copied()
    }
}

impl Default for DelayTiers {
    fn default() -> Self {
        Self(
            [100, 1_000, 10_000, 60_000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        )
    }
}
