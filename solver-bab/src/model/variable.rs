//! Optimization variable metadata.

use serde::{Deserialize, Serialize};

use crate::error::{BabError, BabResult};

/// Domain type of an optimization variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VariableType {
    /// Continuous variable
    #[default]
    Continuous,
    /// Binary variable (0 or 1)
    Binary,
    /// Integer variable
    Integer,
}

impl VariableType {
    /// Whether the variable only takes integral values.
    pub fn is_discrete(self) -> bool {
        matches!(self, VariableType::Binary | VariableType::Integer)
    }
}

/// A problem variable with its global box and branching weight.
///
/// Variables never change during the search; nodes only carry their own
/// copies of the current bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationVariable {
    lower_bound: f64,
    upper_bound: f64,
    variable_type: VariableType,
    branching_priority: f64,
    name: String,
}

impl OptimizationVariable {
    /// Create a variable with default priority 1.
    pub fn new(
        lower_bound: f64,
        upper_bound: f64,
        variable_type: VariableType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            lower_bound,
            upper_bound,
            variable_type,
            branching_priority: 1.0,
            name: name.into(),
        }
    }

    /// Continuous variable on `[lb, ub]`.
    pub fn continuous(lower_bound: f64, upper_bound: f64, name: impl Into<String>) -> Self {
        Self::new(lower_bound, upper_bound, VariableType::Continuous, name)
    }

    /// Integer variable on `[lb, ub]`.
    pub fn integer(lower_bound: f64, upper_bound: f64, name: impl Into<String>) -> Self {
        Self::new(lower_bound, upper_bound, VariableType::Integer, name)
    }

    /// Binary variable on `[0, 1]`.
    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(0.0, 1.0, VariableType::Binary, name)
    }

    /// Set the branching priority (weight >= 0).
    pub fn with_branching_priority(mut self, priority: f64) -> Self {
        self.branching_priority = priority;
        self
    }

    /// Lower bound of the global box.
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// Upper bound of the global box.
    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// Width of the global box.
    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    /// Variable domain type.
    pub fn variable_type(&self) -> VariableType {
        self.variable_type
    }

    /// Branching priority.
    pub fn branching_priority(&self) -> f64 {
        self.branching_priority
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate the variable and normalize discrete bounds.
    ///
    /// Binary bounds are intersected with `[0, 1]`; integer bounds are
    /// rounded inward. An empty discrete domain is an invalid variable type.
    pub fn validated(mut self) -> BabResult<Self> {
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(BabError::InvalidProblem(format!(
                "variable '{}' has unbounded domain [{}, {}]",
                self.name, self.lower_bound, self.upper_bound
            )));
        }
        if self.lower_bound > self.upper_bound {
            return Err(BabError::InvalidProblem(format!(
                "variable '{}' has lower bound {} above upper bound {}",
                self.name, self.lower_bound, self.upper_bound
            )));
        }
        if !self.branching_priority.is_finite() || self.branching_priority < 0.0 {
            return Err(BabError::InvalidProblem(format!(
                "variable '{}' has invalid branching priority {}",
                self.name, self.branching_priority
            )));
        }

        match self.variable_type {
            VariableType::Continuous => {}
            VariableType::Binary => {
                self.lower_bound = self.lower_bound.max(0.0).ceil();
                self.upper_bound = self.upper_bound.min(1.0).floor();
            }
            VariableType::Integer => {
                self.lower_bound = self.lower_bound.ceil();
                self.upper_bound = self.upper_bound.floor();
            }
        }

        if self.lower_bound > self.upper_bound {
            return Err(BabError::InvalidVariableType {
                name: self.name,
                reason: format!("{:?} domain contains no integral value", self.variable_type),
            });
        }

        Ok(self)
    }
}
