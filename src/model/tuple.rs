//! Records flowing through the worker.
//!
//! A [`Tuple`] is an ordered mapping from field name to [`Value`]. It
//! optionally carries the [`Schema`] of the port it arrived on or is
//! leaving through. Batches cross channels as column-major
//! [`DataFrame`]s and tuples are built from them row by row.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::Serialize;

use crate::errors::{WorkerError, WorkerResult};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Timestamp,
    Binary,
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    /// Opaque bytes. Never interpreted by the worker.
    Binary(Vec<u8>),
}

impl Value {
    /// The attribute type this value naturally has. `Null` fits any
    /// type so it has none.
    pub fn attribute_type(&self) -> Option<AttributeType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(AttributeType::String),
            Value::Integer(_) => Some(AttributeType::Integer),
            Value::Long(_) => Some(AttributeType::Long),
            Value::Double(_) => Some(AttributeType::Double),
            Value::Boolean(_) => Some(AttributeType::Boolean),
            Value::Timestamp(_) => Some(AttributeType::Timestamp),
            Value::Binary(_) => Some(AttributeType::Binary),
        }
    }

    /// Try to convert this value to the given type.
    ///
    /// Only lossless widenings are performed, plus narrowing a long
    /// into an integer when it fits and wrapping strings as bytes.
    pub fn cast_to(&self, target: AttributeType) -> Option<Value> {
        match (self, target) {
            (Value::Null, _) => Some(Value::Null),
            (value, target) if value.attribute_type() == Some(target) => Some(value.clone()),
            (Value::Integer(v), AttributeType::Long) => Some(Value::Long(i64::from(*v))),
            (Value::Integer(v), AttributeType::Double) => Some(Value::Double(f64::from(*v))),
            (Value::Long(v), AttributeType::Double) => Some(Value::Double(*v as f64)),
            (Value::Long(v), AttributeType::Integer) => i32::try_from(*v).ok().map(Value::Integer),
            (Value::String(v), AttributeType::Binary) => Some(Value::Binary(v.as_bytes().to_vec())),
            _ => None,
        }
    }

    /// Numeric view used by range partitioning.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Timestamp(v) => Some(v.timestamp_millis() as f64),
            _ => None,
        }
    }

    /// Feed a stable representation of this value into a hasher.
    ///
    /// Doubles hash by bit pattern so equal tuples always hash alike.
    pub fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::String(v) => v.hash(state),
            Value::Integer(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Boolean(v) => v.hash(state),
            Value::Timestamp(v) => v.timestamp_nanos_opt().hash(state),
            Value::Binary(v) => v.hash(state),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(v) => serde_json::Value::from(v.clone()),
            Value::Integer(v) => serde_json::Value::from(*v),
            Value::Long(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Value::from(*v),
            Value::Boolean(v) => serde_json::Value::from(*v),
            Value::Timestamp(v) => serde_json::Value::from(v.to_rfc3339()),
            Value::Binary(v) => serde_json::Value::from(v.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => fmt.write_str("null"),
            Value::String(v) => fmt.write_str(v),
            Value::Integer(v) => write!(fmt, "{v}"),
            Value::Long(v) => write!(fmt, "{v}"),
            Value::Double(v) => write!(fmt, "{v}"),
            Value::Boolean(v) => write!(fmt, "{v}"),
            Value::Timestamp(v) => write!(fmt, "{}", v.to_rfc3339()),
            Value::Binary(v) => write!(fmt, "<{} bytes>", v.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttributeType,
}

/// Ordered list of named, typed attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new<S: Into<String>>(attributes: impl IntoIterator<Item = (S, AttributeType)>) -> Self {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(name, attr_type)| Attribute {
                    name: name.into(),
                    attr_type,
                })
                .collect(),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|attr| attr.name.as_str())
    }

    pub fn get_attr_type(&self, name: &str) -> Option<AttributeType> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.attr_type)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A single record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tuple {
    fields: Vec<(String, Value)>,
    #[serde(skip)]
    schema: Option<Arc<Schema>>,
}

/// Tuples compare by their fields only.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Tuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<S: Into<String>>(fields: impl IntoIterator<Item = (S, Value)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
            schema: None,
        }
    }

    /// Builder style [`Tuple::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Set a field, replacing any previous value with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Cast every field to the schema's type, order the fields like
    /// the schema and validate that nothing is missing or extra.
    pub fn finalize(&mut self, schema: &Arc<Schema>) -> WorkerResult<()> {
        if self.fields.len() != schema.len() {
            return Err(WorkerError::SchemaMismatch(format!(
                "tuple has fields {:?} but schema expects {:?}",
                self.field_names().collect::<Vec<_>>(),
                schema.names().collect::<Vec<_>>()
            )));
        }
        let mut finalized = Vec::with_capacity(schema.len());
        for attr in schema.attributes() {
            let value = self.get(&attr.name).ok_or_else(|| {
                WorkerError::SchemaMismatch(format!("missing field {}", attr.name))
            })?;
            let value = value.cast_to(attr.attr_type).ok_or_else(|| {
                WorkerError::SchemaMismatch(format!(
                    "field {} value {value} is not a {:?}",
                    attr.name, attr.attr_type
                ))
            })?;
            finalized.push((attr.name.clone(), value));
        }
        self.fields = finalized;
        self.schema = Some(schema.clone());
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str("Tuple[")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                fmt.write_str(", ")?;
            }
            write!(fmt, "{name}={value}")?;
        }
        fmt.write_str("]")
    }
}

/// A column-major batch of records, the unit of data transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub schema: Schema,
    pub columns: Vec<Vec<Value>>,
}

impl DataFrame {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    /// Build the tuple at a row from the column accessors.
    pub fn row(&self, index: usize) -> Tuple {
        Tuple::from_fields(
            self.schema
                .names()
                .zip(self.columns.iter())
                .map(|(name, column)| {
                    let value = column.get(index).cloned().unwrap_or(Value::Null);
                    (name.to_owned(), value)
                }),
        )
    }

    /// Lazily iterate the rows.
    pub fn rows(&self) -> impl Iterator<Item = Tuple> + '_ {
        (0..self.num_rows()).map(|index| self.row(index))
    }

    /// Pack tuples into a frame.
    ///
    /// The schema is taken from the first tuple; tuples without one
    /// infer it from their values.
    pub fn from_tuples(tuples: Vec<Tuple>) -> Self {
        let schema = match tuples.first() {
            None => return Self::default(),
            Some(first) => match first.schema() {
                Some(schema) => schema.as_ref().clone(),
                None => Schema::new(first.fields().iter().map(|(name, value)| {
                    (
                        name.clone(),
                        value.attribute_type().unwrap_or(AttributeType::String),
                    )
                })),
            },
        };
        let mut columns: Vec<Vec<Value>> = schema
            .attributes()
            .iter()
            .map(|_| Vec::with_capacity(tuples.len()))
            .collect();
        for tuple in tuples {
            for (attr, column) in schema.attributes().iter().zip(columns.iter_mut()) {
                column.push(tuple.get(&attr.name).cloned().unwrap_or(Value::Null));
            }
        }
        Self { schema, columns }
    }
}

#[test]
fn finalize_casts_and_orders_fields() {
    let schema = Arc::new(Schema::new([
        ("id", AttributeType::Long),
        ("name", AttributeType::String),
        ("score", AttributeType::Double),
    ]));
    let mut tuple = Tuple::new()
        .with("name", "ada")
        .with("score", 3)
        .with("id", 7);

    tuple.finalize(&schema).unwrap();

    let expected = Tuple::new()
        .with("id", Value::Long(7))
        .with("name", "ada")
        .with("score", Value::Double(3.0));
    assert_eq!(tuple, expected);
    assert_eq!(tuple.field_names().collect::<Vec<_>>(), ["id", "name", "score"]);
    assert_eq!(tuple.schema(), Some(&schema));
}

#[test]
fn finalize_rejects_wrong_types() {
    let schema = Arc::new(Schema::new([("id", AttributeType::Integer)]));
    let mut tuple = Tuple::new().with("id", "not a number");
    assert!(matches!(
        tuple.finalize(&schema),
        Err(WorkerError::SchemaMismatch(_))
    ));
}

#[test]
fn finalize_rejects_missing_fields() {
    let schema = Arc::new(Schema::new([
        ("a", AttributeType::Integer),
        ("b", AttributeType::Integer),
    ]));
    let mut tuple = Tuple::new().with("a", 1).with("c", 2);
    assert!(matches!(
        tuple.finalize(&schema),
        Err(WorkerError::SchemaMismatch(_))
    ));
}

#[test]
fn null_fits_any_type() {
    assert_eq!(Value::Null.cast_to(AttributeType::Timestamp), Some(Value::Null));
}

#[test]
fn frame_rows_follow_schema() {
    let tuples = vec![
        Tuple::new().with("k", 1).with("v", "x"),
        Tuple::new().with("k", 2).with("v", "y"),
    ];
    let frame = DataFrame::from_tuples(tuples.clone());
    assert_eq!(frame.num_rows(), 2);
    assert_eq!(
        frame.schema,
        Schema::new([("k", AttributeType::Integer), ("v", AttributeType::String)])
    );
    assert_eq!(frame.rows().collect::<Vec<_>>(), tuples);
}
