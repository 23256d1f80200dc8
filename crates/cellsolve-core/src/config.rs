use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown property: {0}")]
    UnknownProperty(String),
}

/// The configurable solver properties
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    NonNegative,
    Integer,
    Timeout,
    RelativeGap,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Long,
    Double,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Long(i64),
    Double(f64),
}

impl Property {
    pub const ALL: [Property; 4] = [
        Property::NonNegative,
        Property::Integer,
        Property::Timeout,
        Property::RelativeGap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Property::NonNegative => "NonNegative",
            Property::Integer => "Integer",
            Property::Timeout => "Timeout",
            Property::RelativeGap => "RelativeGap",
        }
    }

    pub fn value_type(self) -> ValueType {
        match self {
            Property::NonNegative | Property::Integer => ValueType::Bool,
            Property::Timeout => ValueType::Long,
            Property::RelativeGap => ValueType::Double,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Property::NonNegative => "Assume variables as non-negative",
            Property::Integer => "Assume variables as integer",
            Property::Timeout => "Solving time limit (seconds)",
            Property::RelativeGap => "Relative gap for optimality",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Property {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Property::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownProperty(s.to_string()))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "boolean"),
            ValueType::Long => write!(f, "long"),
            ValueType::Double => write!(f, "double"),
        }
    }
}

impl PropertyValue {
    pub fn value_type(self) -> ValueType {
        match self {
            PropertyValue::Bool(_) => ValueType::Bool,
            PropertyValue::Long(_) => ValueType::Long,
            PropertyValue::Double(_) => ValueType::Double,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Solver options. Assignments with a wrong type or out-of-range value are
/// ignored and leave the previous value in place.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    non_negative: bool,
    integer: bool,
    timeout_secs: u64,
    relative_gap: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            non_negative: true,
            integer: false,
            timeout_secs: 100,
            relative_gap: 0.01,
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower bound of continuous and integer variables is 0 instead of -inf
    pub fn non_negative(&self) -> bool {
        self.non_negative
    }

    /// Variables default to integer instead of continuous
    pub fn integer(&self) -> bool {
        self.integer
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn relative_gap(&self) -> f64 {
        self.relative_gap
    }

    pub fn get(&self, property: Property) -> PropertyValue {
        match property {
            Property::NonNegative => PropertyValue::Bool(self.non_negative),
            Property::Integer => PropertyValue::Bool(self.integer),
            Property::Timeout => PropertyValue::Long(self.timeout_secs as i64),
            Property::RelativeGap => PropertyValue::Double(self.relative_gap),
        }
    }

    pub fn set(&mut self, property: Property, value: PropertyValue) {
        let applied = match (property, value) {
            (Property::NonNegative, PropertyValue::Bool(v)) => {
                self.non_negative = v;
                true
            }
            (Property::Integer, PropertyValue::Bool(v)) => {
                self.integer = v;
                true
            }
            (Property::Timeout, PropertyValue::Long(v)) if v > 0 => {
                self.timeout_secs = v as u64;
                true
            }
            (Property::RelativeGap, PropertyValue::Double(v)) if v > 0.0 && v < 1.0 => {
                self.relative_gap = v;
                true
            }
            _ => false,
        };
        if !applied {
            debug!(event = "property_rejected", property = %property, value = %value);
        }
    }

    pub fn get_by_name(&self, name: &str) -> Result<PropertyValue, ConfigError> {
        Ok(self.get(name.parse()?))
    }

    pub fn set_by_name(&mut self, name: &str, value: PropertyValue) -> Result<(), ConfigError> {
        self.set(name.parse()?, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SolverConfig::default();
        assert!(config.non_negative());
        assert!(!config.integer());
        assert_eq!(config.timeout(), Duration::from_secs(100));
        assert_eq!(config.relative_gap(), 0.01);
    }

    #[test]
    fn test_valid_assignments() {
        let mut config = SolverConfig::default();
        config.set(Property::NonNegative, PropertyValue::Bool(false));
        config.set(Property::Integer, PropertyValue::Bool(true));
        config.set(Property::Timeout, PropertyValue::Long(5));
        config.set(Property::RelativeGap, PropertyValue::Double(0.25));

        assert_eq!(config.get(Property::NonNegative), PropertyValue::Bool(false));
        assert_eq!(config.get(Property::Integer), PropertyValue::Bool(true));
        assert_eq!(config.get(Property::Timeout), PropertyValue::Long(5));
        assert_eq!(config.get(Property::RelativeGap), PropertyValue::Double(0.25));
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let mut config = SolverConfig::default();
        config.set(Property::NonNegative, PropertyValue::Long(0));
        config.set(Property::Timeout, PropertyValue::Double(5.0));
        config.set(Property::Timeout, PropertyValue::Long(0));
        config.set(Property::Timeout, PropertyValue::Long(-3));
        config.set(Property::RelativeGap, PropertyValue::Double(0.0));
        config.set(Property::RelativeGap, PropertyValue::Double(1.0));
        config.set(Property::RelativeGap, PropertyValue::Double(f64::NAN));
        config.set(Property::RelativeGap, PropertyValue::Long(0));

        assert_eq!(config, SolverConfig::default());
    }

    #[test]
    fn test_unknown_property_is_an_error() {
        let mut config = SolverConfig::default();
        assert_eq!(
            config.set_by_name("Verbose", PropertyValue::Bool(true)),
            Err(ConfigError::UnknownProperty("Verbose".to_string()))
        );
        assert_eq!(
            config.get_by_name("nonnegative"),
            Err(ConfigError::UnknownProperty("nonnegative".to_string()))
        );
        assert_eq!(config, SolverConfig::default());
    }

    #[test]
    fn test_set_by_name_with_bad_value_is_silent() {
        let mut config = SolverConfig::default();
        assert_eq!(config.set_by_name("Timeout", PropertyValue::Bool(true)), Ok(()));
        assert_eq!(config.get_by_name("Timeout"), Ok(PropertyValue::Long(100)));
    }

    #[test]
    fn test_metadata() {
        let names: Vec<_> = Property::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["NonNegative", "Integer", "Timeout", "RelativeGap"]);
        assert_eq!(Property::Timeout.value_type(), ValueType::Long);
        assert_eq!(Property::RelativeGap.description(), "Relative gap for optimality");
    }
}
