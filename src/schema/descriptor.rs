//! Declarative field descriptors.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s. Each spec carries a
//! tagged [`FieldKind`] with the checks for that kind, so one generic algorithm
//! can validate and recover every persisted entity.

use regex::Regex;
use serde_json::Value;

/// Type and type-specific checks of one field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Length bounds count characters, inclusive.
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
        pattern: Option<Regex>,
    },
    /// Bounds are inclusive.
    Number {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    Boolean,
    Array,
    Object,
    /// String restricted to a fixed set of values.
    Enum(Vec<&'static str>),
}

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String { .. } | FieldKind::Enum(_) => "string",
            FieldKind::Number { integer: true, .. } => "integer",
            FieldKind::Number { .. } => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Substituted for a missing or failing value when recovering.
    pub default: Option<Value>,
}

impl FieldSpec {
    fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(
            name,
            FieldKind::String {
                min_len: None,
                max_len: None,
                pattern: None,
            },
        )
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(
            name,
            FieldKind::Number {
                min: None,
                max: None,
                integer: false,
            },
        )
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(
            name,
            FieldKind::Number {
                min: None,
                max: None,
                integer: true,
            },
        )
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn array(name: &'static str) -> Self {
        Self::new(name, FieldKind::Array)
    }

    pub fn object(name: &'static str) -> Self {
        Self::new(name, FieldKind::Object)
    }

    pub fn one_of(name: &'static str, values: &[&'static str]) -> Self {
        Self::new(name, FieldKind::Enum(values.to_vec()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Lower bound: numeric value for numbers, character count for strings.
    pub fn min(mut self, bound: f64) -> Self {
        match &mut self.kind {
            FieldKind::Number { min, .. } => *min = Some(bound),
            FieldKind::String { min_len, .. } => *min_len = Some(bound.max(0.0) as usize),
            _ => {}
        }
        self
    }

    /// Upper bound: numeric value for numbers, character count for strings.
    pub fn max(mut self, bound: f64) -> Self {
        match &mut self.kind {
            FieldKind::Number { max, .. } => *max = Some(bound),
            FieldKind::String { max_len, .. } => *max_len = Some(bound.max(0.0) as usize),
            _ => {}
        }
        self
    }

    pub fn pattern(mut self, re: &Regex) -> Self {
        if let FieldKind::String { pattern, .. } = &mut self.kind {
            *pattern = Some(re.clone());
        }
        self
    }
}

/// Field rules for one persisted entity kind.
///
/// Undeclared fields are allowed and passed through untouched.
#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}
