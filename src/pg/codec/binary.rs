//! Binary-format codecs (the server's send/recv functions).
//!
//! All integers are big-endian. Date and time values count from the
//! 2000-01-01 epoch: days for `date`, microseconds for everything else.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use uuid::Uuid;

use super::text::is_numeric_literal;
use super::{end_of_day, fixed, pg_epoch, utf8, wrong_variant, Codec, WireReader};
use crate::pg::error::{PgError, PgResult};
use crate::pg::types::{Format, Interval, Oid, PgValue};

const JSONB_VERSION: u8 = 1;
const MICROS_PER_DAY: i64 = 86_400_000_000;

pub(super) fn register_builtins(table: &mut HashMap<(Oid, Format), Codec>) {
    let mut add = |oid: Oid, codec: Codec| {
        table.insert((oid, Format::Binary), codec);
    };

    add(Oid::BOOL, Codec::new(decode_bool, encode_bool));
    add(Oid::CHAR, Codec::new(decode_char, encode_char));
    add(Oid::INT2, Codec::new(decode_int2, encode_int));
    add(Oid::INT4, Codec::new(decode_int4, encode_int));
    add(Oid::INT8, Codec::new(decode_int8, encode_int));
    add(Oid::OID, Codec::new(decode_oid, encode_int));
    add(Oid::FLOAT4, Codec::new(decode_float4, encode_float));
    add(Oid::FLOAT8, Codec::new(decode_float8, encode_float));
    add(Oid::NUMERIC, Codec::new(decode_numeric, encode_numeric));
    for oid in [Oid::TEXT, Oid::VARCHAR, Oid::BPCHAR, Oid::NAME, Oid::UNKNOWN] {
        add(oid, Codec::new(decode_string, encode_string));
    }
    add(Oid::XML, Codec::new(decode_xml, encode_string));
    add(Oid::BYTEA, Codec::new(decode_bytea, encode_bytea));
    add(Oid::JSON, Codec::new(decode_json, encode_json));
    add(Oid::JSONB, Codec::new(decode_jsonb, encode_jsonb));
    add(Oid::DATE, Codec::new(decode_date, encode_date));
    add(Oid::TIME, Codec::new(decode_time, encode_time));
    add(Oid::TIMESTAMP, Codec::new(decode_timestamp, encode_timestamp));
    add(Oid::TIMESTAMPTZ, Codec::new(decode_timestamptz, encode_timestamptz));
    add(Oid::INTERVAL, Codec::new(decode_interval, encode_interval));
    add(Oid::UUID, Codec::new(decode_uuid, encode_uuid));
    add(Oid::VOID, Codec::new(decode_void, |v| Err(wrong_variant(Oid::VOID, v))));
}

fn out_of_range(what: &str) -> PgError {
    PgError::InvalidArgument(format!("{} is out of range for the wire format", what))
}

// ==================== Scalars ====================

fn decode_bool(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let [b] = fixed::<1>(oid, data)?;
    Ok(PgValue::Bool(b != 0))
}

fn encode_bool(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Bool(b) => Ok(vec![u8::from(*b)]),
        other => Err(wrong_variant(Oid::BOOL, other)),
    }
}

fn decode_char(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed::<1>(oid, data).map(|b| PgValue::Char(i8::from_be_bytes(b)))
}

fn encode_char(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Char(c) => Ok(c.to_be_bytes().to_vec()),
        other => Err(wrong_variant(Oid::CHAR, other)),
    }
}

fn decode_int2(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed(oid, data).map(|b| PgValue::Int2(i16::from_be_bytes(b)))
}

fn decode_int4(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed(oid, data).map(|b| PgValue::Int4(i32::from_be_bytes(b)))
}

fn decode_int8(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed(oid, data).map(|b| PgValue::Int8(i64::from_be_bytes(b)))
}

fn decode_oid(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed(oid, data).map(|b| PgValue::ObjectId(u32::from_be_bytes(b)))
}

fn encode_int(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Int2(v) => Ok(v.to_be_bytes().to_vec()),
        PgValue::Int4(v) => Ok(v.to_be_bytes().to_vec()),
        PgValue::Int8(v) => Ok(v.to_be_bytes().to_vec()),
        PgValue::ObjectId(v) => Ok(v.to_be_bytes().to_vec()),
        other => Err(wrong_variant(other.type_oid(), other)),
    }
}

fn decode_float4(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed(oid, data).map(|b| PgValue::Float4(f32::from_be_bytes(b)))
}

fn decode_float8(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed(oid, data).map(|b| PgValue::Float8(f64::from_be_bytes(b)))
}

fn encode_float(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Float4(v) => Ok(v.to_be_bytes().to_vec()),
        PgValue::Float8(v) => Ok(v.to_be_bytes().to_vec()),
        other => Err(wrong_variant(other.type_oid(), other)),
    }
}

fn decode_string(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    utf8(oid, data).map(|s| PgValue::Text(s.to_string()))
}

fn decode_xml(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    utf8(oid, data).map(|s| PgValue::Xml(s.to_string()))
}

fn encode_string(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Text(s) | PgValue::Xml(s) => Ok(s.clone().into_bytes()),
        other => Err(wrong_variant(other.type_oid(), other)),
    }
}

fn decode_bytea(_oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    Ok(PgValue::Bytea(data.to_vec()))
}

fn encode_bytea(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Bytea(b) => Ok(b.clone()),
        other => Err(wrong_variant(Oid::BYTEA, other)),
    }
}

fn parse_json(oid: Oid, data: &[u8]) -> PgResult<serde_json::Value> {
    serde_json::from_slice(data).map_err(|e| PgError::malformed(oid, format!("invalid JSON: {}", e)))
}

fn decode_json(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    parse_json(oid, data).map(PgValue::Json)
}

fn decode_jsonb(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    match data.split_first() {
        Some((&JSONB_VERSION, body)) => parse_json(oid, body).map(PgValue::Jsonb),
        Some((version, _)) => Err(PgError::malformed(
            oid,
            format!("unsupported jsonb version {}", version),
        )),
        None => Err(PgError::malformed(oid, "empty jsonb payload")),
    }
}

fn json_bytes(value: &serde_json::Value) -> PgResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| PgError::InvalidArgument(format!("unserializable JSON: {}", e)))
}

fn encode_json(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Json(v) | PgValue::Jsonb(v) => json_bytes(v),
        other => Err(wrong_variant(Oid::JSON, other)),
    }
}

fn encode_jsonb(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Json(v) | PgValue::Jsonb(v) => {
            let mut out = vec![JSONB_VERSION];
            out.extend(json_bytes(v)?);
            Ok(out)
        }
        other => Err(wrong_variant(Oid::JSONB, other)),
    }
}

fn decode_uuid(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    fixed::<16>(oid, data).map(|b| PgValue::Uuid(Uuid::from_bytes(b)))
}

fn encode_uuid(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Uuid(u) => Ok(u.as_bytes().to_vec()),
        other => Err(wrong_variant(Oid::UUID, other)),
    }
}

fn decode_void(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    if data.is_empty() {
        Ok(PgValue::Null)
    } else {
        Err(PgError::malformed(oid, "void payload must be empty"))
    }
}

// ==================== numeric ====================

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;
const NUMERIC_DSCALE_MAX: u16 = 0x3FFF;

/// Base-10000 digits: `ndigits`, `weight`, `sign`, `dscale`, then digits.
fn decode_numeric(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let mut r = WireReader::new(oid, data);
    let ndigits = r.i16()?;
    let weight = r.i16()?;
    let sign = r.u16()?;
    let dscale = r.u16()?;
    if ndigits < 0 {
        return Err(PgError::malformed(oid, "negative numeric digit count"));
    }
    let mut digits = Vec::with_capacity(ndigits as usize);
    for _ in 0..ndigits {
        let d = r.i16()?;
        if !(0..10_000).contains(&d) {
            return Err(PgError::malformed(oid, format!("numeric digit {} out of range", d)));
        }
        digits.push(d);
    }
    r.finish()?;

    let negative = match sign {
        NUMERIC_POS => false,
        NUMERIC_NEG => true,
        NUMERIC_NAN => return Ok(PgValue::Numeric("NaN".to_string())),
        NUMERIC_PINF => return Ok(PgValue::Numeric("Infinity".to_string())),
        NUMERIC_NINF => return Ok(PgValue::Numeric("-Infinity".to_string())),
        other => {
            return Err(PgError::malformed(oid, format!("invalid numeric sign 0x{:04x}", other)))
        }
    };
    if dscale > NUMERIC_DSCALE_MAX {
        return Err(PgError::malformed(oid, format!("invalid numeric scale {}", dscale)));
    }

    let digit = |i: i32| -> i16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut s = String::new();
    if negative {
        s.push('-');
    }
    if weight < 0 {
        s.push('0');
    } else {
        for i in 0..=i32::from(weight) {
            if i == 0 {
                let _ = write!(s, "{}", digit(i));
            } else {
                let _ = write!(s, "{:04}", digit(i));
            }
        }
    }
    if dscale > 0 {
        let scale = usize::from(dscale);
        let mut frac = String::with_capacity(scale + 4);
        let mut i = i32::from(weight) + 1;
        while frac.len() < scale {
            let _ = write!(frac, "{:04}", digit(i));
            i += 1;
        }
        frac.truncate(scale);
        s.push('.');
        s.push_str(&frac);
    }
    Ok(PgValue::Numeric(s))
}

fn encode_numeric(value: &PgValue) -> PgResult<Vec<u8>> {
    let s = match value {
        PgValue::Numeric(s) => s.as_str(),
        other => return Err(wrong_variant(Oid::NUMERIC, other)),
    };
    let special = match s {
        "NaN" => Some(NUMERIC_NAN),
        "Infinity" => Some(NUMERIC_PINF),
        "-Infinity" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        return Ok(numeric_bytes(0, sign, 0, &[]));
    }
    if !is_numeric_literal(s) {
        return Err(PgError::InvalidArgument(format!("{:?} is not a numeric literal", s)));
    }

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    let int = int.trim_start_matches('0');
    let dscale = u16::try_from(frac.len())
        .ok()
        .filter(|d| *d <= NUMERIC_DSCALE_MAX)
        .ok_or_else(|| out_of_range("numeric scale"))?;

    let int_pad = (4 - int.len() % 4) % 4;
    let frac_pad = (4 - frac.len() % 4) % 4;
    let padded: Vec<u8> = std::iter::repeat(b'0')
        .take(int_pad)
        .chain(int.bytes())
        .chain(frac.bytes())
        .chain(std::iter::repeat(b'0').take(frac_pad))
        .collect();
    let mut groups: Vec<i16> = padded
        .chunks(4)
        .map(|c| c.iter().fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0')))
        .collect();

    let int_groups = (int.len() + int_pad) / 4;
    let mut weight = i64::try_from(int_groups).map_err(|_| out_of_range("numeric"))? - 1;
    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= leading as i64;
    while groups.last() == Some(&0) {
        groups.pop();
    }

    if groups.is_empty() {
        return Ok(numeric_bytes(0, NUMERIC_POS, dscale, &[]));
    }
    let weight = i16::try_from(weight).map_err(|_| out_of_range("numeric weight"))?;
    if i16::try_from(groups.len()).is_err() {
        return Err(out_of_range("numeric precision"));
    }
    let sign = if negative { NUMERIC_NEG } else { NUMERIC_POS };
    Ok(numeric_bytes(weight, sign, dscale, &groups))
}

fn numeric_bytes(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + digits.len() * 2);
    out.extend((digits.len() as i16).to_be_bytes());
    out.extend(weight.to_be_bytes());
    out.extend(sign.to_be_bytes());
    out.extend(dscale.to_be_bytes());
    for d in digits {
        out.extend(d.to_be_bytes());
    }
    out
}

// ==================== date / time ====================

fn epoch_date() -> NaiveDate {
    pg_epoch().date()
}

fn decode_date(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let days = i32::from_be_bytes(fixed(oid, data)?);
    if days == i32::MAX || days == i32::MIN {
        return Err(PgError::malformed(oid, "infinite date cannot be represented"));
    }
    epoch_date()
        .checked_add_signed(Duration::days(i64::from(days)))
        .map(PgValue::Date)
        .ok_or_else(|| PgError::malformed(oid, format!("date {} days from epoch is out of range", days)))
}

fn encode_date(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Date(d) => {
            let days = i32::try_from(d.signed_duration_since(epoch_date()).num_days())
                .map_err(|_| out_of_range("date"))?;
            Ok(days.to_be_bytes().to_vec())
        }
        other => Err(wrong_variant(Oid::DATE, other)),
    }
}

fn decode_time(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let micros = i64::from_be_bytes(fixed(oid, data)?);
    if !(0..=MICROS_PER_DAY).contains(&micros) {
        return Err(PgError::malformed(oid, format!("time {} us is out of range", micros)));
    }
    if micros == MICROS_PER_DAY {
        return Ok(PgValue::Time(end_of_day()));
    }
    let secs = (micros / 1_000_000) as u32;
    let nanos = (micros % 1_000_000) as u32 * 1000;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .map(PgValue::Time)
        .ok_or_else(|| PgError::malformed(oid, "invalid time"))
}

fn encode_time(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Time(t) => {
            let micros = i64::from(t.num_seconds_from_midnight()) * 1_000_000
                + i64::from(t.nanosecond() / 1000);
            if micros > MICROS_PER_DAY {
                return Err(out_of_range("time"));
            }
            Ok(micros.to_be_bytes().to_vec())
        }
        other => Err(wrong_variant(Oid::TIME, other)),
    }
}

fn micros_to_naive(oid: Oid, data: &[u8]) -> PgResult<NaiveDateTime> {
    let micros = i64::from_be_bytes(fixed(oid, data)?);
    if micros == i64::MAX || micros == i64::MIN {
        return Err(PgError::malformed(oid, "infinite timestamp cannot be represented"));
    }
    pg_epoch()
        .checked_add_signed(Duration::microseconds(micros))
        .ok_or_else(|| PgError::malformed(oid, "timestamp out of range"))
}

fn naive_to_micros(ts: NaiveDateTime) -> PgResult<Vec<u8>> {
    let micros = ts
        .signed_duration_since(pg_epoch())
        .num_microseconds()
        .ok_or_else(|| out_of_range("timestamp"))?;
    Ok(micros.to_be_bytes().to_vec())
}

fn decode_timestamp(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    micros_to_naive(oid, data).map(PgValue::Timestamp)
}

fn encode_timestamp(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Timestamp(ts) => naive_to_micros(*ts),
        other => Err(wrong_variant(Oid::TIMESTAMP, other)),
    }
}

fn decode_timestamptz(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    micros_to_naive(oid, data).map(|ts| PgValue::TimestampTz(Utc.from_utc_datetime(&ts)))
}

fn encode_timestamptz(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::TimestampTz(ts) => naive_to_micros(ts.naive_utc()),
        other => Err(wrong_variant(Oid::TIMESTAMPTZ, other)),
    }
}

fn decode_interval(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let mut r = WireReader::new(oid, data);
    let microseconds = r.i64()?;
    let days = r.i32()?;
    let months = r.i32()?;
    r.finish()?;
    Ok(PgValue::Interval(Interval::new(months, days, microseconds)))
}

fn encode_interval(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Interval(i) => {
            let mut out = Vec::with_capacity(16);
            out.extend(i.microseconds.to_be_bytes());
            out.extend(i.days.to_be_bytes());
            out.extend(i.months.to_be_bytes());
            Ok(out)
        }
        other => Err(wrong_variant(Oid::INTERVAL, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::codec::CodecRegistry;
    use proptest::prelude::*;

    fn decode(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
        CodecRegistry::new().decode(oid, Format::Binary, Some(data))
    }

    fn encode(value: &PgValue) -> Vec<u8> {
        CodecRegistry::new()
            .encode(value, Format::Binary)
            .unwrap()
            .unwrap()
    }

    fn numeric(s: &str) -> String {
        let bytes = encode(&PgValue::Numeric(s.to_string()));
        match decode(Oid::NUMERIC, &bytes).unwrap() {
            PgValue::Numeric(n) => n,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fixed_width_scalars() {
        assert_eq!(decode(Oid::INT4, &[0, 0, 0, 42]).unwrap(), PgValue::Int4(42));
        assert_eq!(decode(Oid::INT2, &[0xff, 0xfe]).unwrap(), PgValue::Int2(-2));
        assert_eq!(decode(Oid::BOOL, &[1]).unwrap(), PgValue::Bool(true));
        assert_eq!(
            decode(Oid::FLOAT8, &1.5f64.to_be_bytes()).unwrap(),
            PgValue::Float8(1.5)
        );
        assert_eq!(encode(&PgValue::Int8(-1)), vec![0xff; 8]);
    }

    #[test]
    fn test_wrong_width_is_malformed() {
        let err = decode(Oid::INT4, &[0, 0, 42]).unwrap_err();
        assert!(matches!(err, PgError::MalformedPayload { oid: Oid::INT4, .. }));
        assert!(decode(Oid::INT8, &[0; 4]).is_err());
        assert!(decode(Oid::UUID, &[0; 15]).is_err());
        assert!(decode(Oid::INTERVAL, &[0; 17]).is_err());
    }

    #[test]
    fn test_numeric_wire_layout() {
        // 1234.5 = [1234, 5000], weight 0, dscale 1
        let bytes = encode(&PgValue::Numeric("1234.5".into()));
        assert_eq!(
            bytes,
            vec![0, 2, 0, 0, 0, 0, 0, 1, 0x04, 0xd2, 0x13, 0x88]
        );
        assert_eq!(
            decode(Oid::NUMERIC, &bytes).unwrap(),
            PgValue::Numeric("1234.5".into())
        );
    }

    #[test]
    fn test_numeric_canonical_forms() {
        assert_eq!(numeric("0"), "0");
        assert_eq!(numeric("0.00"), "0.00");
        assert_eq!(numeric("-0.0001"), "-0.0001");
        assert_eq!(numeric("100000000"), "100000000");
        assert_eq!(numeric("007.50"), "7.50");
        assert_eq!(numeric(".5"), "0.5");
        assert_eq!(numeric("NaN"), "NaN");
        assert_eq!(numeric("-Infinity"), "-Infinity");
    }

    #[test]
    fn test_numeric_rejects_bad_sign() {
        let bytes = [0, 0, 0, 0, 0x12, 0x34, 0, 0];
        assert!(decode(Oid::NUMERIC, &bytes).is_err());
        let digit_too_big = [0, 1, 0, 0, 0, 0, 0, 0, 0x27, 0x10];
        assert!(decode(Oid::NUMERIC, &digit_too_big).is_err());
    }

    #[test]
    fn test_dates_count_from_2000() {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(decode(Oid::DATE, &[0, 0, 0, 0]).unwrap(), PgValue::Date(epoch));
        let before = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(encode(&PgValue::Date(before)), (-1i32).to_be_bytes().to_vec());
        assert!(decode(Oid::DATE, &i32::MAX.to_be_bytes()).is_err());
        assert!(decode(Oid::TIMESTAMP, &i64::MIN.to_be_bytes()).is_err());
    }

    #[test]
    fn test_time_allows_end_of_day() {
        let midnight = decode(Oid::TIME, &MICROS_PER_DAY.to_be_bytes()).unwrap();
        assert_eq!(midnight, PgValue::Time(end_of_day()));
        assert_eq!(encode(&midnight), MICROS_PER_DAY.to_be_bytes().to_vec());
        assert!(decode(Oid::TIME, &(MICROS_PER_DAY + 1).to_be_bytes()).is_err());
        assert!(decode(Oid::TIME, &(-1i64).to_be_bytes()).is_err());

        // a leap second anywhere but the end of the day runs past it
        let late = NaiveTime::from_hms_micro_opt(23, 59, 59, 1_500_000).unwrap();
        assert!(CodecRegistry::new()
            .encode(&PgValue::Time(late), Format::Binary)
            .is_err());
    }

    #[test]
    fn test_jsonb_version_byte() {
        let value = PgValue::Jsonb(serde_json::json!({"k": true}));
        let bytes = encode(&value);
        assert_eq!(bytes[0], JSONB_VERSION);
        assert_eq!(decode(Oid::JSONB, &bytes).unwrap(), value);
        assert!(decode(Oid::JSONB, b"\x02{}").is_err());
        assert!(decode(Oid::JSONB, b"").is_err());
    }

    #[test]
    fn test_void_is_null() {
        assert_eq!(decode(Oid::VOID, &[]).unwrap(), PgValue::Null);
        assert!(decode(Oid::VOID, &[0]).is_err());
    }

    fn numeric_literal() -> impl Strategy<Value = String> {
        (
            any::<bool>(),
            "0|[1-9][0-9]{0,30}",
            proptest::option::of("[0-9]{1,20}"),
        )
            .prop_map(|(negative, int, frac)| {
                let mut s = int;
                if let Some(f) = frac {
                    s.push('.');
                    s.push_str(&f);
                }
                let zero = s.bytes().all(|b| b == b'0' || b == b'.');
                if negative && !zero {
                    s.insert(0, '-');
                }
                s
            })
    }

    proptest! {
        #[test]
        fn prop_numeric_binary_roundtrip(s in numeric_literal()) {
            prop_assert_eq!(numeric(&s), s);
        }

        #[test]
        fn prop_interval_binary_roundtrip(months in any::<i32>(), days in any::<i32>(), micros in any::<i64>()) {
            let v = PgValue::Interval(Interval::new(months, days, micros));
            prop_assert_eq!(decode(Oid::INTERVAL, &encode(&v)).unwrap(), v);
        }

        #[test]
        fn prop_time_binary_roundtrip(micros in 0..MICROS_PER_DAY) {
            let bytes = micros.to_be_bytes();
            let decoded = decode(Oid::TIME, &bytes).unwrap();
            prop_assert_eq!(encode(&decoded), bytes.to_vec());
        }

        #[test]
        fn prop_timestamp_binary_roundtrip(micros in -7_000_000_000_000_000i64..7_000_000_000_000_000) {
            let bytes = micros.to_be_bytes();
            let decoded = decode(Oid::TIMESTAMPTZ, &bytes).unwrap();
            prop_assert_eq!(encode(&decoded), bytes.to_vec());
        }
    }
}
