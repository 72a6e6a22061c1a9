//! Fan-out policy configuration

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityPolicy {
    /// Weighted random buckets
    #[default]
    Random,
    /// `fixed_priority` for every task
    Fixed,
}

/// Fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Audience cap per post; larger audiences are randomly sampled
    #[serde(default = "default_max_audience_per_post")]
    pub max_audience_per_post: usize,

    /// Seed for sampling and priority draws; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub priority_policy: PriorityPolicy,

    /// Used by the `fixed` policy
    #[serde(default = "default_fixed_priority")]
    pub fixed_priority: u8,

    /// Percent of tasks at priority 1, 3 and 5 under the `random` policy
    #[serde(default = "default_high_weight")]
    pub high_weight: u8,
    #[serde(default = "default_medium_weight")]
    pub medium_weight: u8,
    #[serde(default = "default_low_weight")]
    pub low_weight: u8,
}

impl FanoutConfig {
    /// Validate fan-out configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_audience_per_post == 0 {
            return Err(ValidationError::MustBePositive("fanout.max_audience_per_post"));
        }
        if !(1..=5).contains(&self.fixed_priority) {
            return Err(ValidationError::InvalidPriority(self.fixed_priority));
        }
        let total =
            u32::from(self.high_weight) + u32::from(self.medium_weight) + u32::from(self.low_weight);
        if total != 100 {
            return Err(ValidationError::InvalidPriorityWeights(total));
        }
        Ok(())
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_audience_per_post: default_max_audience_per_post(),
            seed: None,
            priority_policy: PriorityPolicy::default(),
            fixed_priority: default_fixed_priority(),
            high_weight: default_high_weight(),
            medium_weight: default_medium_weight(),
            low_weight: default_low_weight(),
        }
    }
}

fn default_max_audience_per_post() -> usize {
    100
}

fn default_fixed_priority() -> u8 {
    3
}

fn default_high_weight() -> u8 {
    20
}

fn default_medium_weight() -> u8 {
    60
}

fn default_low_weight() -> u8 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_defaults() {
        let config = FanoutConfig::default();
        assert_eq!(config.max_audience_per_post, 100);
        assert_eq!(config.priority_policy, PriorityPolicy::Random);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_cap_is_rejected() {
        let config = FanoutConfig {
            max_audience_per_post: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fixed_priority_bounds() {
        let config = FanoutConfig {
            fixed_priority: 6,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPriority(6)));
    }

    #[test]
    fn test_weights_must_sum_to_hundred() {
        let config = FanoutConfig {
            high_weight: 50,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidPriorityWeights(130))
        );
    }
}
