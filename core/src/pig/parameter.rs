//! Parameter nodes: named, typed, optionally bounded values.

use serde::{Deserialize, Serialize};

/// A single scalar/vector value a parameter can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Numeric(f64),
    Boolean(bool),
    Text(String),
    Vector(Vec<f64>),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Numeric(_) => "numeric",
            ParamValue::Boolean(_) => "boolean",
            ParamValue::Text(_) => "string",
            ParamValue::Vector(_) => "vector",
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            ParamValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Numeric(v) => write!(f, "{v}"),
            ParamValue::Boolean(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v:?}"),
            ParamValue::Vector(v) => {
                write!(f, "(")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterNode {
    pub name: String,
    pub value: ParamValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub units: Option<String>,
    pub description: Option<String>,
    /// Indices of operation nodes that directly depend on this parameter.
    pub dependents: std::collections::BTreeSet<usize>,
}

impl ParameterNode {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
            min: None,
            max: None,
            units: None,
            description: None,
            dependents: std::collections::BTreeSet::new(),
        }
    }

    pub fn in_bounds(&self, value: f64) -> bool {
        let above_min = self.min.is_none_or(|min| value >= min);
        let below_max = self.max.is_none_or(|max| value <= max);
        above_min && below_max
    }
}
