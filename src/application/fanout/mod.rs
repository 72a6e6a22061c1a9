//! Fan-out on write: audience selection and task generation.

mod handler;
mod policy;
mod scheduler;

pub use handler::PostCreatedHandler;
pub use policy::{
    AudienceSampler, FixedPriorityClassifier, PriorityClassifier, PriorityWeights,
    RandomPriorityClassifier, RandomSampler, TruncatingSampler,
};
pub use scheduler::{FanoutPlan, FanoutReport, FanoutScheduler, DEFAULT_MAX_AUDIENCE_PER_POST};
