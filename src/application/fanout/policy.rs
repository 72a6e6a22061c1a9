//! Pluggable fan-out policies: which recipients are selected and how
//! urgently each task should be served.
//!
//! Random policies take an optional seed so runs can be reproduced.

use std::sync::{Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::feed::Priority;
use crate::domain::foundation::UserId;

/// Chooses at most `cap` recipients out of an eligible audience.
pub trait AudienceSampler: Send + Sync {
    /// Returns `audience` unchanged when it fits, otherwise exactly `cap`
    /// distinct members.
    fn sample(&self, audience: Vec<UserId>, cap: usize) -> Vec<UserId>;
}

/// Assigns a broker priority to one (author, recipient) task.
pub trait PriorityClassifier: Send + Sync {
    fn classify(&self, author: &UserId, recipient: &UserId) -> Priority;
}

fn seeded(seed: Option<u64>) -> Mutex<StdRng> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Mutex::new(rng)
}

fn lock(rng: &Mutex<StdRng>) -> MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Uniform sampling without replacement.
pub struct RandomSampler {
    rng: Mutex<StdRng>,
}

impl RandomSampler {
    pub fn new() -> Self {
        Self { rng: seeded(None) }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: seeded(Some(seed)),
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        Self { rng: seeded(seed) }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl AudienceSampler for RandomSampler {
    fn sample(&self, audience: Vec<UserId>, cap: usize) -> Vec<UserId> {
        if audience.len() <= cap {
            return audience;
        }
        let picked = rand::seq::index::sample(&mut *lock(&self.rng), audience.len(), cap);
        let mut slots: Vec<Option<UserId>> = audience.into_iter().map(Some).collect();
        picked
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect()
    }
}

/// Keeps the first `cap` members in resolver order.
#[derive(Debug, Default, Clone, Copy)]
pub struct TruncatingSampler;

impl AudienceSampler for TruncatingSampler {
    fn sample(&self, mut audience: Vec<UserId>, cap: usize) -> Vec<UserId> {
        audience.truncate(cap);
        audience
    }
}

/// Percentage split of tasks across the three priority buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityWeights {
    pub high: u8,
    pub medium: u8,
    pub low: u8,
}

impl PriorityWeights {
    /// 20% high, 60% medium, 20% low.
    pub const DEFAULT: PriorityWeights = PriorityWeights {
        high: 20,
        medium: 60,
        low: 20,
    };

    fn bucket(&self, roll: u32) -> Priority {
        let high = u32::from(self.high);
        let medium = high + u32::from(self.medium);
        if roll < high {
            Priority::HIGH
        } else if roll < medium {
            Priority::MEDIUM
        } else {
            Priority::LOW
        }
    }

    fn total(&self) -> u32 {
        u32::from(self.high) + u32::from(self.medium) + u32::from(self.low)
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Draws each task's priority independently from [`PriorityWeights`].
pub struct RandomPriorityClassifier {
    weights: PriorityWeights,
    rng: Mutex<StdRng>,
}

impl RandomPriorityClassifier {
    pub fn new() -> Self {
        Self::from_seed(None)
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_seed(Some(seed))
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        Self {
            weights: PriorityWeights::DEFAULT,
            rng: seeded(seed),
        }
    }

    pub fn with_weights(mut self, weights: PriorityWeights) -> Self {
        self.weights = weights;
        self
    }
}

impl Default for RandomPriorityClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityClassifier for RandomPriorityClassifier {
    fn classify(&self, _author: &UserId, _recipient: &UserId) -> Priority {
        let total = self.weights.total();
        if total == 0 {
            return Priority::MEDIUM;
        }
        let roll = lock(&self.rng).gen_range(0..total);
        self.weights.bucket(roll)
    }
}

/// Same priority for every task.
#[derive(Debug, Clone, Copy)]
pub struct FixedPriorityClassifier(pub Priority);

impl Default for FixedPriorityClassifier {
    fn default() -> Self {
        Self(Priority::MEDIUM)
    }
}

impl PriorityClassifier for FixedPriorityClassifier {
    fn classify(&self, _author: &UserId, _recipient: &UserId) -> Priority {
        self.0
    }
}
