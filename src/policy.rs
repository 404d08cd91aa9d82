use crate::error::PolicyError;
use crate::rules::Action;
use crate::units::normalize;
use std::collections::HashMap;

/// Acceptable range for one sensor category. At least one bound is present.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPolicy {
    sensor_category: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl ThresholdPolicy {
    /// Bounds are taken as written, in the unit the normalized reading will
    /// carry.
    pub fn new(sensor_category: &str, min: Option<f64>, max: Option<f64>) -> Result<Self, PolicyError> {
        if sensor_category.is_empty() {
            return Err(PolicyError::EmptyCategory);
        }
        if min.is_none() && max.is_none() {
            return Err(PolicyError::NoBounds(sensor_category.to_string()));
        }
        for bound in [min, max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(PolicyError::NonFiniteBound {
                    category: sensor_category.to_string(),
                    bound,
                });
            }
        }
        Ok(Self {
            sensor_category: sensor_category.to_string(),
            min,
            max,
        })
    }

    /// Bounds written in `unit` are converted the same way readings are, so
    /// a policy authored in °F compares correctly against Celsius readings.
    pub fn with_unit(
        sensor_category: &str,
        min: Option<f64>,
        max: Option<f64>,
        unit: &str,
    ) -> Result<Self, PolicyError> {
        let convert = |bound: f64| normalize(bound, unit).0;
        Self::new(sensor_category, min.map(convert), max.map(convert))
    }

    pub fn at_most(sensor_category: &str, max: f64) -> Result<Self, PolicyError> {
        Self::new(sensor_category, None, Some(max))
    }

    pub fn at_least(sensor_category: &str, min: f64) -> Result<Self, PolicyError> {
        Self::new(sensor_category, Some(min), None)
    }

    pub fn sensor_category(&self) -> &str {
        &self.sensor_category
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }

    /// `max` is checked before `min`, so an inverted policy violated on both
    /// sides yields `Decrease`.
    pub fn check(&self, value: f64) -> Option<Action> {
        if let Some(max) = self.max {
            if value > max {
                return Some(Action::Decrease);
            }
        }
        if let Some(min) = self.min {
            if value < min {
                return Some(Action::Increase);
            }
        }
        None
    }
}

/// Read-only mapping from sensor category to its threshold policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, ThresholdPolicy>,
}

impl PolicyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_policies<I>(policies: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = ThresholdPolicy>,
    {
        let mut table = HashMap::new();
        for policy in policies {
            let category = policy.sensor_category.clone();
            if table.insert(category.clone(), policy).is_some() {
                return Err(PolicyError::Duplicate(category));
            }
        }
        Ok(Self { policies: table })
    }

    pub fn policy_for(&self, sensor_category: &str) -> Option<&ThresholdPolicy> {
        self.policies.get(sensor_category)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThresholdPolicy> {
        self.policies.values()
    }
}
