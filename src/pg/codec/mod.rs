//! Type codec registry.
//!
//! Maps `(type oid, wire format)` to a decode/encode pair. A registry starts
//! with the built-in table (every built-in type in both formats, plus the
//! server's array types) and callers may add codecs for extension types on
//! top. Connections hold an `Arc<CodecRegistry>`; nothing here is global.
//!
//! - `text`: the server's canonical text output (DateStyle ISO)
//! - `binary`: network byte order send/recv formats
//! - `array`: array framing for both formats, elements via the registry

mod array;
mod binary;
mod text;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::error::{PgError, PgResult};
use super::types::{Format, Oid, PgValue};

/// Decoder: `(declared oid, payload) -> value`. Never sees NULL.
pub type DecodeFn = dyn Fn(Oid, &[u8]) -> PgResult<PgValue> + Send + Sync;

/// Encoder: `value -> payload`. Never sees NULL.
pub type EncodeFn = dyn Fn(&PgValue) -> PgResult<Vec<u8>> + Send + Sync;

/// The encode/decode pair for one type in one format.
#[derive(Clone)]
pub struct Codec {
    decode: Arc<DecodeFn>,
    encode: Arc<EncodeFn>,
}

impl Codec {
    pub fn new<D, E>(decode: D, encode: E) -> Self
    where
        D: Fn(Oid, &[u8]) -> PgResult<PgValue> + Send + Sync + 'static,
        E: Fn(&PgValue) -> PgResult<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            decode: Arc::new(decode),
            encode: Arc::new(encode),
        }
    }

    /// Codec that keeps payloads as `PgValue::Raw` and writes them back verbatim.
    pub fn opaque() -> Self {
        Self::new(
            |oid, data| {
                Ok(PgValue::Raw {
                    oid,
                    data: data.to_vec(),
                })
            },
            |value| match value {
                PgValue::Raw { data, .. } => Ok(data.clone()),
                other => Err(wrong_variant(other.type_oid(), other)),
            },
        )
    }

    #[inline]
    pub fn decode(&self, oid: Oid, data: &[u8]) -> PgResult<PgValue> {
        (self.decode)(oid, data)
    }

    #[inline]
    pub fn encode(&self, value: &PgValue) -> PgResult<Vec<u8>> {
        (self.encode)(value)
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

static BUILTIN_CODECS: Lazy<HashMap<(Oid, Format), Codec>> = Lazy::new(|| {
    let mut table = HashMap::new();
    text::register_builtins(&mut table);
    binary::register_builtins(&mut table);
    table
});

// ============================================================================
// Registry
// ============================================================================

/// Codec lookup keyed by `(Oid, Format)`.
pub struct CodecRegistry {
    codecs: RwLock<HashMap<(Oid, Format), Codec>>,
    /// array oid -> element oid
    arrays: RwLock<HashMap<Oid, Oid>>,
}

impl CodecRegistry {
    /// Registry holding every built-in codec and array type.
    pub fn new() -> Self {
        Self {
            codecs: RwLock::new(BUILTIN_CODECS.clone()),
            arrays: RwLock::new(Oid::BUILTIN_ARRAYS.iter().copied().collect()),
        }
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
            arrays: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) the codec for one type and format.
    pub fn register(&self, oid: Oid, format: Format, codec: Codec) -> Option<Codec> {
        self.codecs.write().insert((oid, format), codec)
    }

    /// Register both formats of a type at once.
    pub fn register_pair(&self, oid: Oid, text: Codec, binary: Codec) {
        let mut codecs = self.codecs.write();
        codecs.insert((oid, Format::Text), text);
        codecs.insert((oid, Format::Binary), binary);
    }

    /// Declare `array_oid` as an array of `element_oid`.
    pub fn register_array(&self, array_oid: Oid, element_oid: Oid) {
        self.arrays.write().insert(array_oid, element_oid);
    }

    /// Whether values of `oid` can be decoded in `format`.
    pub fn supports(&self, oid: Oid, format: Format) -> bool {
        if self.codecs.read().contains_key(&(oid, format)) {
            return true;
        }
        match self.array_element(oid) {
            Some(elem) => self.supports(elem, format),
            None => false,
        }
    }

    /// Decode one column value. `None` is SQL NULL.
    pub fn decode(&self, oid: Oid, format: Format, data: Option<&[u8]>) -> PgResult<PgValue> {
        let Some(data) = data else {
            return Ok(PgValue::Null);
        };

        if let Some(codec) = self.lookup(oid, format) {
            return codec.decode(oid, data);
        }
        if let Some(elem) = self.array_element(oid) {
            return match format {
                Format::Text => array::decode_text(self, oid, elem, data),
                Format::Binary => array::decode_binary(self, oid, elem, data),
            };
        }
        Err(PgError::UnknownType {
            oid,
            format,
            column: None,
        })
    }

    /// Encode a value with the codec of its own type. `None` is SQL NULL.
    pub fn encode(&self, value: &PgValue, format: Format) -> PgResult<Option<Vec<u8>>> {
        self.encode_as(value.type_oid(), value, format)
    }

    /// Text representation used for outbound parameters.
    pub fn encode_text(&self, value: &PgValue) -> PgResult<Option<String>> {
        match self.encode(value, Format::Text)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| PgError::malformed(value.type_oid(), "text encoding is not UTF-8")),
            None => Ok(None),
        }
    }

    /// Encode `value` with the codec registered for `oid`.
    pub(crate) fn encode_as(
        &self,
        oid: Oid,
        value: &PgValue,
        format: Format,
    ) -> PgResult<Option<Vec<u8>>> {
        if value.is_null() {
            return Ok(None);
        }
        if let Some(codec) = self.lookup(oid, format) {
            return codec.encode(value).map(Some);
        }
        if let PgValue::Array(array) = value {
            let bytes = match format {
                Format::Text => array::encode_text(self, array)?,
                Format::Binary => array::encode_binary(self, array)?,
            };
            return Ok(Some(bytes));
        }
        Err(PgError::UnknownType {
            oid,
            format,
            column: None,
        })
    }

    fn lookup(&self, oid: Oid, format: Format) -> Option<Codec> {
        self.codecs.read().get(&(oid, format)).cloned()
    }

    fn array_element(&self, oid: Oid) -> Option<Oid> {
        self.arrays.read().get(&oid).copied()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.read().len())
            .field("arrays", &self.arrays.read().len())
            .finish()
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// PostgreSQL date/time epoch, 2000-01-01 00:00:00.
pub(crate) fn pg_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// `time '24:00:00'`. chrono tops out at 23:59:59.999999, so the value is
/// carried as the leap-second form `23:59:60`.
pub(crate) fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 1_000_000).unwrap_or_default()
}

pub(crate) fn wrong_variant(oid: Oid, value: &PgValue) -> PgError {
    PgError::InvalidArgument(format!(
        "codec for type {} cannot encode a {} value",
        oid,
        value.kind()
    ))
}

pub(crate) fn utf8(oid: Oid, data: &[u8]) -> PgResult<&str> {
    std::str::from_utf8(data).map_err(|e| PgError::malformed(oid, format!("invalid UTF-8: {}", e)))
}

/// Bounds-checked big-endian reader over a binary payload.
pub(crate) struct WireReader<'a> {
    oid: Oid,
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(oid: Oid, data: &'a [u8]) -> Self {
        Self { oid, data, pos: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> PgResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                PgError::malformed(
                    self.oid,
                    format!(
                        "needed {} bytes at offset {}, payload is {} bytes",
                        n,
                        self.pos,
                        self.data.len()
                    ),
                )
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> PgResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn i16(&mut self) -> PgResult<i16> {
        self.array().map(i16::from_be_bytes)
    }

    pub(crate) fn u16(&mut self) -> PgResult<u16> {
        self.array().map(u16::from_be_bytes)
    }

    pub(crate) fn i32(&mut self) -> PgResult<i32> {
        self.array().map(i32::from_be_bytes)
    }

    pub(crate) fn u32(&mut self) -> PgResult<u32> {
        self.array().map(u32::from_be_bytes)
    }

    pub(crate) fn i64(&mut self) -> PgResult<i64> {
        self.array().map(i64::from_be_bytes)
    }

    /// Fail if any bytes are left over.
    pub(crate) fn finish(self) -> PgResult<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(PgError::malformed(
                self.oid,
                format!("{} trailing bytes", self.data.len() - self.pos),
            ))
        }
    }
}

/// Exact-width payload for fixed-size binary types.
pub(crate) fn fixed<const N: usize>(oid: Oid, data: &[u8]) -> PgResult<[u8; N]> {
    if data.len() != N {
        return Err(PgError::malformed(
            oid,
            format!("expected {} bytes, got {}", N, data.len()),
        ));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(data);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::types::PgArray;

    #[test]
    fn null_short_circuits_for_any_type() {
        let registry = CodecRegistry::empty();
        assert_eq!(
            registry.decode(Oid(424242), Format::Binary, None).unwrap(),
            PgValue::Null
        );
        assert_eq!(registry.encode(&PgValue::Null, Format::Text).unwrap(), None);
    }

    #[test]
    fn unknown_type_is_an_error_not_a_guess() {
        let registry = CodecRegistry::new();
        let err = registry
            .decode(Oid(424242), Format::Text, Some(b"42"))
            .unwrap_err();
        assert!(matches!(
            err,
            PgError::UnknownType {
                oid: Oid(424242),
                format: Format::Text,
                column: None
            }
        ));
    }

    #[test]
    fn builtins_cover_both_formats() {
        let registry = CodecRegistry::new();
        for oid in [
            Oid::BOOL,
            Oid::BYTEA,
            Oid::CHAR,
            Oid::NAME,
            Oid::INT2,
            Oid::INT4,
            Oid::INT8,
            Oid::OID,
            Oid::TEXT,
            Oid::VARCHAR,
            Oid::BPCHAR,
            Oid::JSON,
            Oid::JSONB,
            Oid::XML,
            Oid::FLOAT4,
            Oid::FLOAT8,
            Oid::NUMERIC,
            Oid::DATE,
            Oid::TIME,
            Oid::TIMESTAMP,
            Oid::TIMESTAMPTZ,
            Oid::INTERVAL,
            Oid::UUID,
            Oid::VOID,
            Oid::INT4_ARRAY,
            Oid::JSONB_ARRAY,
        ] {
            assert!(registry.supports(oid, Format::Text), "text {}", oid);
            assert!(registry.supports(oid, Format::Binary), "binary {}", oid);
        }
    }

    fn builtin_samples() -> Vec<(Oid, PgValue)> {
        use crate::pg::types::{ArrayDimension, Interval};
        use chrono::{TimeZone, Utc};
        use uuid::Uuid;

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let bc = NaiveDate::from_ymd_opt(-4, 2, 29).unwrap();
        let time = NaiveTime::from_hms_micro_opt(13, 45, 7, 123_456).unwrap();
        let ts = date.and_time(time);
        let json = serde_json::json!({"a": [1, null, "x"], "b": {"c": true}});
        let shifted = PgArray::new(
            Oid::DATE_ARRAY,
            Oid::DATE,
            vec![
                ArrayDimension { len: 1, lower_bound: 0 },
                ArrayDimension { len: 2, lower_bound: 1 },
            ],
            vec![PgValue::Date(date), PgValue::Null],
        )
        .unwrap();

        vec![
            (Oid::BOOL, PgValue::Bool(true)),
            (Oid::BOOL, PgValue::Bool(false)),
            (Oid::CHAR, PgValue::Char(b'x' as i8)),
            (Oid::CHAR, PgValue::Char(i8::MIN)),
            (Oid::INT2, PgValue::Int2(i16::MIN)),
            (Oid::INT4, PgValue::Int4(-41)),
            (Oid::INT8, PgValue::Int8(i64::MAX)),
            (Oid::OID, PgValue::ObjectId(u32::MAX)),
            (Oid::FLOAT4, PgValue::Float4(1.5)),
            (Oid::FLOAT8, PgValue::Float8(f64::NEG_INFINITY)),
            (Oid::NUMERIC, PgValue::Numeric("-12345.6780".into())),
            (Oid::NUMERIC, PgValue::Numeric("NaN".into())),
            (Oid::TEXT, PgValue::Text("héllo, \"world\"".into())),
            (Oid::VARCHAR, PgValue::Text("varchar".into())),
            (Oid::BPCHAR, PgValue::Text("ab  ".into())),
            (Oid::NAME, PgValue::Text("pg_class".into())),
            (Oid::UNKNOWN, PgValue::Text("".into())),
            (Oid::XML, PgValue::Xml("<a href=\"x\">b</a>".into())),
            (Oid::BYTEA, PgValue::Bytea(vec![0, 255, b'\\', b'"'])),
            (Oid::JSON, PgValue::Json(json.clone())),
            (Oid::JSONB, PgValue::Jsonb(json)),
            (Oid::DATE, PgValue::Date(date)),
            (Oid::DATE, PgValue::Date(bc)),
            (Oid::TIME, PgValue::Time(time)),
            (Oid::TIME, PgValue::Time(NaiveTime::from_hms_opt(0, 0, 0).unwrap())),
            (Oid::TIME, PgValue::Time(end_of_day())),
            (Oid::TIMESTAMP, PgValue::Timestamp(ts)),
            (Oid::TIMESTAMP, PgValue::Timestamp(bc.and_time(time))),
            (Oid::TIMESTAMPTZ, PgValue::TimestampTz(Utc.from_utc_datetime(&ts))),
            (Oid::INTERVAL, PgValue::Interval(Interval::new(-13, 1, -1_500_000))),
            (Oid::INTERVAL, PgValue::Interval(Interval::new(0, 0, i64::MIN))),
            (
                Oid::UUID,
                PgValue::Uuid(Uuid::parse_str("55069c47-868b-4a08-a47f-3653262bce35").unwrap()),
            ),
            (
                Oid::INT4_ARRAY,
                PgValue::Array(PgArray::from_elements(Oid::INT4, vec![1.into(), PgValue::Null]).unwrap()),
            ),
            (
                Oid::TEXT_ARRAY,
                PgValue::Array(
                    PgArray::from_elements(Oid::TEXT, vec!["a b".into(), "NULL".into(), "{}".into()])
                        .unwrap(),
                ),
            ),
            (Oid::DATE_ARRAY, PgValue::Array(shifted)),
        ]
    }

    #[test]
    fn builtin_values_roundtrip_in_both_formats() {
        let registry = CodecRegistry::new();
        for format in [Format::Text, Format::Binary] {
            for (oid, value) in builtin_samples() {
                let bytes = registry
                    .encode_as(oid, &value, format)
                    .unwrap_or_else(|e| panic!("encode {} {:?}: {}", oid, format, e));
                let back = registry
                    .decode(oid, format, bytes.as_deref())
                    .unwrap_or_else(|e| panic!("decode {} {:?}: {}", oid, format, e));
                assert_eq!(back, value, "{} in {:?}", oid, format);
            }
        }
    }

    #[test]
    fn custom_codecs_override_and_extend() {
        let registry = CodecRegistry::new();
        let citext = Oid(90001);
        registry.register_pair(citext, Codec::opaque(), Codec::opaque());
        assert_eq!(
            registry.decode(citext, Format::Text, Some(b"Hello")).unwrap(),
            PgValue::Raw {
                oid: citext,
                data: b"Hello".to_vec()
            }
        );

        // arrays of the extension type once declared
        let citext_array = Oid(90002);
        assert!(!registry.supports(citext_array, Format::Text));
        registry.register_array(citext_array, citext);
        let decoded = registry
            .decode(citext_array, Format::Text, Some(b"{a,NULL}"))
            .unwrap();
        let PgValue::Array(array) = decoded else {
            panic!("expected array");
        };
        assert_eq!(array.element_type(), citext);
        assert_eq!(array.elements()[1], PgValue::Null);

        let replaced = registry.register(
            Oid::INT4,
            Format::Text,
            Codec::new(|_, _| Ok(PgValue::Int4(-1)), |_| Ok(b"-1".to_vec())),
        );
        assert!(replaced.is_some());
        assert_eq!(
            registry.decode(Oid::INT4, Format::Text, Some(b"5")).unwrap(),
            PgValue::Int4(-1)
        );
    }

    #[test]
    fn encode_text_for_parameters() {
        let registry = CodecRegistry::new();
        assert_eq!(
            registry.encode_text(&PgValue::Int4(41)).unwrap(),
            Some("41".to_string())
        );
        assert_eq!(
            registry.encode_text(&PgValue::Bool(true)).unwrap(),
            Some("t".to_string())
        );
        let array = PgArray::from_elements(Oid::TEXT, vec!["a b".into(), PgValue::Null]).unwrap();
        assert_eq!(
            registry.encode_text(&PgValue::Array(array)).unwrap(),
            Some("{\"a b\",NULL}".to_string())
        );
    }

    #[test]
    fn wire_reader_bounds() {
        let mut r = WireReader::new(Oid::INTERVAL, &[0, 0, 0, 1, 0xff]);
        assert_eq!(r.i32().unwrap(), 1);
        assert!(r.i32().is_err());
        let r = WireReader::new(Oid::INT4, &[0, 1]);
        assert!(r.finish().is_err());
        assert!(fixed::<4>(Oid::INT4, &[0, 0, 1]).is_err());
    }
}
