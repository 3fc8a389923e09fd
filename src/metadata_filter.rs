use crate::errors::{CyborgError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// Metadata filter expression sent along with a query.
///
/// Filters are never evaluated client-side. The tree is validated
/// structurally and encoded in the service's `$`-operator JSON form; child
/// order of `$and`/`$or` is preserved through encode and decode.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Leaf { field: String, predicate: Predicate },
    Composite {
        operator: BooleanOperator,
        children: Vec<MetadataFilter>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    And,
    Or,
}

impl BooleanOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOperator::And => "$and",
            BooleanOperator::Or => "$or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals(Value),
    GreaterThan(Number),
    GreaterThanOrEqual(Number),
    LessThan(Number),
    LessThanOrEqual(Number),
    In(Vec<Value>),
}

impl Predicate {
    fn operator(&self) -> &'static str {
        match self {
            Predicate::Equals(_) => "$eq",
            Predicate::GreaterThan(_) => "$gt",
            Predicate::GreaterThanOrEqual(_) => "$gte",
            Predicate::LessThan(_) => "$lt",
            Predicate::LessThanOrEqual(_) => "$lte",
            Predicate::In(_) => "$in",
        }
    }
}

impl MetadataFilter {
    pub fn and(children: Vec<MetadataFilter>) -> Self {
        MetadataFilter::Composite {
            operator: BooleanOperator::And,
            children,
        }
    }

    pub fn or(children: Vec<MetadataFilter>) -> Self {
        MetadataFilter::Composite {
            operator: BooleanOperator::Or,
            children,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::leaf(field, Predicate::Equals(value.into()))
    }

    pub fn greater_than(field: impl Into<String>, value: impl Into<Number>) -> Self {
        Self::leaf(field, Predicate::GreaterThan(value.into()))
    }

    pub fn greater_than_or_equal(field: impl Into<String>, value: impl Into<Number>) -> Self {
        Self::leaf(field, Predicate::GreaterThanOrEqual(value.into()))
    }

    pub fn less_than(field: impl Into<String>, value: impl Into<Number>) -> Self {
        Self::leaf(field, Predicate::LessThan(value.into()))
    }

    pub fn less_than_or_equal(field: impl Into<String>, value: impl Into<Number>) -> Self {
        Self::leaf(field, Predicate::LessThanOrEqual(value.into()))
    }

    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::leaf(field, Predicate::In(values))
    }

    fn leaf(field: impl Into<String>, predicate: Predicate) -> Self {
        MetadataFilter::Leaf {
            field: field.into(),
            predicate,
        }
    }

    /// Structural check: composites need at least one child and field paths
    /// need non-empty dot-separated segments without a leading `$`. `$in`
    /// takes scalars only.
    pub fn validate(&self) -> Result<()> {
        match self {
            MetadataFilter::Composite { children, .. } => {
                if children.is_empty() {
                    return Err(CyborgError::EmptyComposite);
                }
                children.iter().try_for_each(MetadataFilter::validate)
            }
            MetadataFilter::Leaf { field, predicate } => {
                if field.is_empty() || field.starts_with('$') || field.split('.').any(str::is_empty) {
                    return Err(CyborgError::InvalidFilter(format!(
                        "invalid field path: {:?}",
                        field
                    )));
                }
                if let Predicate::In(values) = predicate {
                    if let Some(bad) = values.iter().find(|v| !is_scalar(v)) {
                        return Err(CyborgError::InvalidFilter(format!(
                            "$in on {} requires scalar values, got {}",
                            field, bad
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Encode to the wire JSON form.
    pub fn to_wire(&self) -> Value {
        match self {
            MetadataFilter::Composite { operator, children } => {
                let mut map = Map::new();
                map.insert(
                    operator.as_str().into(),
                    Value::Array(children.iter().map(MetadataFilter::to_wire).collect()),
                );
                Value::Object(map)
            }
            MetadataFilter::Leaf { field, predicate } => {
                let condition = match predicate {
                    // Objects and null always go through $eq; bare they would
                    // read back as an operator map or an empty condition.
                    Predicate::Equals(value) if !value.is_object() && !value.is_null() => {
                        value.clone()
                    }
                    Predicate::Equals(value) => operator_map(predicate.operator(), value.clone()),
                    Predicate::GreaterThan(n)
                    | Predicate::GreaterThanOrEqual(n)
                    | Predicate::LessThan(n)
                    | Predicate::LessThanOrEqual(n) => {
                        operator_map(predicate.operator(), Value::Number(n.clone()))
                    }
                    Predicate::In(values) => {
                        operator_map(predicate.operator(), Value::Array(values.clone()))
                    }
                };
                let mut map = Map::new();
                map.insert(field.clone(), condition);
                Value::Object(map)
            }
        }
    }

    fn from_condition(field: &str, condition: &Value) -> Result<Self> {
        let ops = match condition {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops,
            Value::Null => {
                return Err(CyborgError::InvalidFilter(format!(
                    "null condition for field: {}",
                    field
                )))
            }
            other => return Ok(Self::equals(field, other.clone())),
        };

        let mut leaves = Vec::with_capacity(ops.len());
        for (op, val) in ops {
            let predicate = match op.as_str() {
                "$eq" => Predicate::Equals(val.clone()),
                "$gt" => Predicate::GreaterThan(numeric(op, val)?),
                "$gte" => Predicate::GreaterThanOrEqual(numeric(op, val)?),
                "$lt" => Predicate::LessThan(numeric(op, val)?),
                "$lte" => Predicate::LessThanOrEqual(numeric(op, val)?),
                "$in" => match val {
                    Value::Array(arr) => Predicate::In(arr.clone()),
                    _ => return Err(CyborgError::InvalidFilter("$in requires array value".into())),
                },
                _ => return Err(CyborgError::UnknownOperator(op.clone())),
            };
            leaves.push(Self::leaf(field, predicate));
        }

        // Several operators on one field mean all of them must hold.
        if leaves.len() == 1 {
            Ok(leaves.remove(0))
        } else {
            Ok(Self::and(leaves))
        }
    }
}

fn operator_map(op: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(op.into(), value);
    Value::Object(map)
}

fn numeric(op: &str, value: &Value) -> Result<Number> {
    match value {
        Value::Number(n) => Ok(n.clone()),
        _ => Err(CyborgError::InvalidFilter(format!(
            "{} requires numeric value",
            op
        ))),
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Parse filter from the wire JSON form
impl TryFrom<Value> for MetadataFilter {
    type Error = CyborgError;

    fn try_from(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(CyborgError::InvalidFilter(format!(
                    "filter must be an object, got {}",
                    other
                )))
            }
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (key, condition) in map {
            if key.starts_with('$') {
                let operator = match key.as_str() {
                    "$and" => BooleanOperator::And,
                    "$or" => BooleanOperator::Or,
                    _ => return Err(CyborgError::UnknownOperator(key)),
                };
                let children = match condition {
                    Value::Array(items) => items
                        .into_iter()
                        .map(MetadataFilter::try_from)
                        .collect::<Result<Vec<_>>>()?,
                    _ => {
                        return Err(CyborgError::InvalidFilter(format!(
                            "{} requires array value",
                            key
                        )))
                    }
                };
                clauses.push(MetadataFilter::Composite { operator, children });
            } else {
                clauses.push(MetadataFilter::from_condition(&key, &condition)?);
            }
        }

        let filter = match clauses.len() {
            0 => return Err(CyborgError::EmptyComposite),
            1 => clauses.remove(0),
            // Sibling keys in one object are an implicit $and.
            _ => MetadataFilter::and(clauses),
        };
        filter.validate()?;
        Ok(filter)
    }
}

impl Serialize for MetadataFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MetadataFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MetadataFilter::try_from(value).map_err(serde::de::Error::custom)
    }
}
