//! PostgreSQL type identifiers and the dynamic value model.
//!
//! Reference: https://www.postgresql.org/docs/current/protocol-overview.html#PROTOCOL-FORMAT-CODES

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use super::error::{PgError, PgResult};

// ============================================================================
// Format codes
// ============================================================================

/// Wire format of a parameter or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i16)]
pub enum Format {
    #[default]
    Text = 0,
    Binary = 1,
}

impl Format {
    /// Format code as sent on the wire.
    #[inline]
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Interpret a wire format code; anything but 1 is text.
    #[inline]
    pub fn from_code(code: i16) -> Self {
        if code == 1 {
            Format::Binary
        } else {
            Format::Text
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Text => f.write_str("text"),
            Format::Binary => f.write_str("binary"),
        }
    }
}

// ============================================================================
// Type OIDs
// ============================================================================

/// PostgreSQL type object identifier, numbered as in `pg_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(pub u32);

impl Oid {
    pub const BOOL: Oid = Oid(16);
    pub const BYTEA: Oid = Oid(17);
    /// Single-byte internal `"char"`.
    pub const CHAR: Oid = Oid(18);
    pub const NAME: Oid = Oid(19);
    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);
    pub const TEXT: Oid = Oid(25);
    pub const OID: Oid = Oid(26);
    pub const JSON: Oid = Oid(114);
    pub const XML: Oid = Oid(142);
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);
    pub const UNKNOWN: Oid = Oid(705);
    pub const BPCHAR: Oid = Oid(1042);
    pub const VARCHAR: Oid = Oid(1043);
    pub const DATE: Oid = Oid(1082);
    pub const TIME: Oid = Oid(1083);
    pub const TIMESTAMP: Oid = Oid(1114);
    pub const TIMESTAMPTZ: Oid = Oid(1184);
    pub const INTERVAL: Oid = Oid(1186);
    pub const NUMERIC: Oid = Oid(1700);
    pub const VOID: Oid = Oid(2278);
    pub const UUID: Oid = Oid(2950);
    pub const JSONB: Oid = Oid(3802);

    pub const BOOL_ARRAY: Oid = Oid(1000);
    pub const BYTEA_ARRAY: Oid = Oid(1001);
    pub const CHAR_ARRAY: Oid = Oid(1002);
    pub const NAME_ARRAY: Oid = Oid(1003);
    pub const INT2_ARRAY: Oid = Oid(1005);
    pub const INT4_ARRAY: Oid = Oid(1007);
    pub const TEXT_ARRAY: Oid = Oid(1009);
    pub const BPCHAR_ARRAY: Oid = Oid(1014);
    pub const VARCHAR_ARRAY: Oid = Oid(1015);
    pub const INT8_ARRAY: Oid = Oid(1016);
    pub const FLOAT4_ARRAY: Oid = Oid(1021);
    pub const FLOAT8_ARRAY: Oid = Oid(1022);
    pub const OID_ARRAY: Oid = Oid(1028);
    pub const TIMESTAMP_ARRAY: Oid = Oid(1115);
    pub const DATE_ARRAY: Oid = Oid(1182);
    pub const TIME_ARRAY: Oid = Oid(1183);
    pub const TIMESTAMPTZ_ARRAY: Oid = Oid(1185);
    pub const INTERVAL_ARRAY: Oid = Oid(1187);
    pub const NUMERIC_ARRAY: Oid = Oid(1231);
    pub const JSON_ARRAY: Oid = Oid(199);
    pub const XML_ARRAY: Oid = Oid(143);
    pub const UUID_ARRAY: Oid = Oid(2951);
    pub const JSONB_ARRAY: Oid = Oid(3807);

    /// Built-in `(array type, element type)` pairs from the server catalog.
    pub const BUILTIN_ARRAYS: &'static [(Oid, Oid)] = &[
        (Oid::BOOL_ARRAY, Oid::BOOL),
        (Oid::BYTEA_ARRAY, Oid::BYTEA),
        (Oid::CHAR_ARRAY, Oid::CHAR),
        (Oid::NAME_ARRAY, Oid::NAME),
        (Oid::INT2_ARRAY, Oid::INT2),
        (Oid::INT4_ARRAY, Oid::INT4),
        (Oid::TEXT_ARRAY, Oid::TEXT),
        (Oid::BPCHAR_ARRAY, Oid::BPCHAR),
        (Oid::VARCHAR_ARRAY, Oid::VARCHAR),
        (Oid::INT8_ARRAY, Oid::INT8),
        (Oid::FLOAT4_ARRAY, Oid::FLOAT4),
        (Oid::FLOAT8_ARRAY, Oid::FLOAT8),
        (Oid::OID_ARRAY, Oid::OID),
        (Oid::TIMESTAMP_ARRAY, Oid::TIMESTAMP),
        (Oid::DATE_ARRAY, Oid::DATE),
        (Oid::TIME_ARRAY, Oid::TIME),
        (Oid::TIMESTAMPTZ_ARRAY, Oid::TIMESTAMPTZ),
        (Oid::INTERVAL_ARRAY, Oid::INTERVAL),
        (Oid::NUMERIC_ARRAY, Oid::NUMERIC),
        (Oid::JSON_ARRAY, Oid::JSON),
        (Oid::XML_ARRAY, Oid::XML),
        (Oid::UUID_ARRAY, Oid::UUID),
        (Oid::JSONB_ARRAY, Oid::JSONB),
    ];

    /// Get the raw value
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Built-in array type whose elements are `self`.
    pub fn array_of(self) -> Option<Oid> {
        Self::BUILTIN_ARRAYS
            .iter()
            .find(|(_, elem)| *elem == self)
            .map(|(array, _)| *array)
    }

    /// Element type if `self` is a built-in array type.
    pub fn element_of(self) -> Option<Oid> {
        Self::BUILTIN_ARRAYS
            .iter()
            .find(|(array, _)| *array == self)
            .map(|(_, elem)| *elem)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Composite value pieces
// ============================================================================

/// A PostgreSQL `interval`, kept in the server's three-field form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    pub fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }
}

/// One array dimension: element count and lower bound (1 by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDimension {
    pub len: i32,
    pub lower_bound: i32,
}

impl ArrayDimension {
    /// Last index of the dimension, `None` when it does not fit in an `i32`.
    pub fn upper_bound(&self) -> Option<i32> {
        i32::try_from(i64::from(self.lower_bound) + i64::from(self.len) - 1).ok()
    }
}

/// A possibly multi-dimensional array, elements stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct PgArray {
    array_type: Oid,
    element_type: Oid,
    dimensions: Vec<ArrayDimension>,
    elements: Vec<PgValue>,
}

impl PgArray {
    /// Build an array, checking that the dimensions cover the elements.
    pub fn new(
        array_type: Oid,
        element_type: Oid,
        dimensions: Vec<ArrayDimension>,
        elements: Vec<PgValue>,
    ) -> PgResult<Self> {
        let expected = if dimensions.is_empty() {
            0
        } else {
            dimensions.iter().try_fold(1usize, |acc, d| {
                usize::try_from(d.len)
                    .ok()
                    .and_then(|len| acc.checked_mul(len))
            })
            .ok_or_else(|| PgError::InvalidArgument("invalid array dimensions".to_string()))?
        };
        if let Some(d) = dimensions.iter().find(|d| d.upper_bound().is_none()) {
            return Err(PgError::InvalidArgument(format!(
                "array dimension {:?} overflows its upper bound",
                d
            )));
        }
        if expected != elements.len() {
            return Err(PgError::InvalidArgument(format!(
                "array dimensions describe {} elements, got {}",
                expected,
                elements.len()
            )));
        }
        Ok(Self {
            array_type,
            element_type,
            dimensions,
            elements,
        })
    }

    /// One-dimensional array of a built-in element type.
    pub fn from_elements(element_type: Oid, elements: Vec<PgValue>) -> PgResult<Self> {
        let array_type = element_type.array_of().ok_or_else(|| {
            PgError::InvalidArgument(format!("no built-in array type for element {}", element_type))
        })?;
        Self::with_array_type(array_type, element_type, elements)
    }

    /// One-dimensional array with an explicit (possibly custom) array type.
    pub fn with_array_type(
        array_type: Oid,
        element_type: Oid,
        elements: Vec<PgValue>,
    ) -> PgResult<Self> {
        let dimensions = if elements.is_empty() {
            Vec::new()
        } else {
            let len = i32::try_from(elements.len())
                .map_err(|_| PgError::InvalidArgument("array too large".to_string()))?;
            vec![ArrayDimension {
                len,
                lower_bound: 1,
            }]
        };
        Self::new(array_type, element_type, dimensions, elements)
    }

    pub fn array_type(&self) -> Oid {
        self.array_type
    }

    pub fn element_type(&self) -> Oid {
        self.element_type
    }

    pub fn dimensions(&self) -> &[ArrayDimension] {
        &self.dimensions
    }

    pub fn elements(&self) -> &[PgValue] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<PgValue> {
        self.elements
    }
}

// ============================================================================
// PostgreSQL Values
// ============================================================================

/// A decoded PostgreSQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    /// The single-byte `"char"` type.
    Char(i8),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    /// The `oid` type.
    ObjectId(u32),
    Float4(f32),
    Float8(f64),
    /// Canonical decimal text (`NaN` and `±Infinity` included).
    Numeric(String),
    Text(String),
    Bytea(Vec<u8>),
    Json(serde_json::Value),
    Jsonb(serde_json::Value),
    Xml(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(Interval),
    Uuid(Uuid),
    Array(PgArray),
    /// Opaque payload of a type only a custom codec understands.
    Raw { oid: Oid, data: Vec<u8> },
}

impl PgValue {
    /// Check if this value is NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    /// Type OID used to pick an encoder for this value.
    pub fn type_oid(&self) -> Oid {
        match self {
            PgValue::Null => Oid::UNKNOWN,
            PgValue::Bool(_) => Oid::BOOL,
            PgValue::Char(_) => Oid::CHAR,
            PgValue::Int2(_) => Oid::INT2,
            PgValue::Int4(_) => Oid::INT4,
            PgValue::Int8(_) => Oid::INT8,
            PgValue::ObjectId(_) => Oid::OID,
            PgValue::Float4(_) => Oid::FLOAT4,
            PgValue::Float8(_) => Oid::FLOAT8,
            PgValue::Numeric(_) => Oid::NUMERIC,
            PgValue::Text(_) => Oid::TEXT,
            PgValue::Bytea(_) => Oid::BYTEA,
            PgValue::Json(_) => Oid::JSON,
            PgValue::Jsonb(_) => Oid::JSONB,
            PgValue::Xml(_) => Oid::XML,
            PgValue::Date(_) => Oid::DATE,
            PgValue::Time(_) => Oid::TIME,
            PgValue::Timestamp(_) => Oid::TIMESTAMP,
            PgValue::TimestampTz(_) => Oid::TIMESTAMPTZ,
            PgValue::Interval(_) => Oid::INTERVAL,
            PgValue::Uuid(_) => Oid::UUID,
            PgValue::Array(a) => a.array_type(),
            PgValue::Raw { oid, .. } => *oid,
        }
    }

    /// Short variant name, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            PgValue::Null => "null",
            PgValue::Bool(_) => "bool",
            PgValue::Char(_) => "char",
            PgValue::Int2(_) => "int2",
            PgValue::Int4(_) => "int4",
            PgValue::Int8(_) => "int8",
            PgValue::ObjectId(_) => "oid",
            PgValue::Float4(_) => "float4",
            PgValue::Float8(_) => "float8",
            PgValue::Numeric(_) => "numeric",
            PgValue::Text(_) => "text",
            PgValue::Bytea(_) => "bytea",
            PgValue::Json(_) => "json",
            PgValue::Jsonb(_) => "jsonb",
            PgValue::Xml(_) => "xml",
            PgValue::Date(_) => "date",
            PgValue::Time(_) => "time",
            PgValue::Timestamp(_) => "timestamp",
            PgValue::TimestampTz(_) => "timestamptz",
            PgValue::Interval(_) => "interval",
            PgValue::Uuid(_) => "uuid",
            PgValue::Array(_) => "array",
            PgValue::Raw { .. } => "raw",
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PgValue {
                fn from(v: $ty) -> Self {
                    PgValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i16 => Int2,
    i32 => Int4,
    i64 => Int8,
    f32 => Float4,
    f64 => Float8,
    String => Text,
    Vec<u8> => Bytea,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Interval => Interval,
    serde_json::Value => Jsonb,
    PgArray => Array,
}

impl From<&str> for PgValue {
    fn from(v: &str) -> Self {
        PgValue::Text(v.to_string())
    }
}

impl From<&[u8]> for PgValue {
    fn from(v: &[u8]) -> Self {
        PgValue::Bytea(v.to_vec())
    }
}

impl<T: Into<PgValue>> From<Option<T>> for PgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(PgValue::Null, Into::into)
    }
}

// ============================================================================
// Conversion out of PgValue
// ============================================================================

/// Conversion from a decoded value into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &PgValue) -> PgResult<Self>;
}

fn mismatch<T>(value: &PgValue, target: &'static str) -> PgResult<T> {
    Err(PgError::Conversion {
        actual: value.kind(),
        target,
    })
}

impl FromValue for PgValue {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Bool(v) => Ok(*v),
            other => mismatch(other, "bool"),
        }
    }
}

impl FromValue for i16 {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Int2(v) => Ok(*v),
            other => mismatch(other, "i16"),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Int2(v) => Ok(i32::from(*v)),
            PgValue::Int4(v) => Ok(*v),
            other => mismatch(other, "i32"),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Int2(v) => Ok(i64::from(*v)),
            PgValue::Int4(v) => Ok(i64::from(*v)),
            PgValue::Int8(v) => Ok(*v),
            PgValue::ObjectId(v) => Ok(i64::from(*v)),
            other => mismatch(other, "i64"),
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::ObjectId(v) => Ok(*v),
            other => mismatch(other, "u32"),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Float4(v) => Ok(*v),
            other => mismatch(other, "f32"),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Float4(v) => Ok(f64::from(*v)),
            PgValue::Float8(v) => Ok(*v),
            other => mismatch(other, "f64"),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Text(v) | PgValue::Xml(v) | PgValue::Numeric(v) => Ok(v.clone()),
            other => mismatch(other, "String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Bytea(v) => Ok(v.clone()),
            PgValue::Raw { data, .. } => Ok(data.clone()),
            other => mismatch(other, "Vec<u8>"),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Uuid(v) => Ok(*v),
            other => mismatch(other, "Uuid"),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Date(v) => Ok(*v),
            other => mismatch(other, "NaiveDate"),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Time(v) => Ok(*v),
            other => mismatch(other, "NaiveTime"),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Timestamp(v) => Ok(*v),
            other => mismatch(other, "NaiveDateTime"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::TimestampTz(v) => Ok(*v),
            other => mismatch(other, "DateTime<Utc>"),
        }
    }
}

impl FromValue for Interval {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Interval(v) => Ok(*v),
            other => mismatch(other, "Interval"),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Json(v) | PgValue::Jsonb(v) => Ok(v.clone()),
            other => mismatch(other, "serde_json::Value"),
        }
    }
}

impl FromValue for PgArray {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Array(v) => Ok(v.clone()),
            other => mismatch(other, "PgArray"),
        }
    }
}

/// Flattens an array of any dimensionality in row-major order.
impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &PgValue) -> PgResult<Self> {
        match value {
            PgValue::Array(array) => array.elements().iter().map(T::from_value).collect(),
            other => mismatch(other, "Vec<T>"),
        }
    }
}
