//! Text-format codecs.
//!
//! Parses the server's canonical output (DateStyle ISO, IntervalStyle
//! postgres, bytea_output hex) and renders values in a form the server's
//! input functions accept. Never depends on the host locale.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use super::{end_of_day, utf8, wrong_variant, Codec};
use crate::pg::error::{PgError, PgResult};
use crate::pg::types::{Format, Interval, Oid, PgValue};

pub(super) fn register_builtins(table: &mut HashMap<(Oid, Format), Codec>) {
    let mut add = |oid: Oid, codec: Codec| {
        table.insert((oid, Format::Text), codec);
    };

    add(Oid::BOOL, Codec::new(decode_bool, encode_bool));
    add(Oid::CHAR, Codec::new(decode_char, encode_char));
    add(Oid::INT2, Codec::new(decode_int2, encode_display));
    add(Oid::INT4, Codec::new(decode_int4, encode_display));
    add(Oid::INT8, Codec::new(decode_int8, encode_display));
    add(Oid::OID, Codec::new(decode_oid, encode_display));
    add(Oid::FLOAT4, Codec::new(decode_float4, encode_float));
    add(Oid::FLOAT8, Codec::new(decode_float8, encode_float));
    add(Oid::NUMERIC, Codec::new(decode_numeric, encode_numeric));
    for oid in [Oid::TEXT, Oid::VARCHAR, Oid::BPCHAR, Oid::NAME, Oid::UNKNOWN] {
        add(oid, Codec::new(decode_string, encode_string));
    }
    add(Oid::XML, Codec::new(decode_xml, encode_string));
    add(Oid::BYTEA, Codec::new(decode_bytea, encode_bytea));
    add(Oid::JSON, Codec::new(decode_json, encode_json));
    add(Oid::JSONB, Codec::new(decode_json, encode_json));
    add(Oid::DATE, Codec::new(decode_date, encode_date));
    add(Oid::TIME, Codec::new(decode_time, encode_time));
    add(Oid::TIMESTAMP, Codec::new(decode_timestamp, encode_timestamp));
    add(Oid::TIMESTAMPTZ, Codec::new(decode_timestamptz, encode_timestamptz));
    add(Oid::INTERVAL, Codec::new(decode_interval, encode_interval));
    add(Oid::UUID, Codec::new(decode_uuid, encode_uuid));
    add(Oid::VOID, Codec::new(|_, _| Ok(PgValue::Null), reject_void));
}

fn invalid(oid: Oid, s: &str) -> PgError {
    PgError::malformed(oid, format!("invalid text value {:?}", s))
}

fn parse<T: std::str::FromStr>(oid: Oid, data: &[u8]) -> PgResult<T> {
    let s = utf8(oid, data)?;
    s.parse().map_err(|_| invalid(oid, s))
}

// ==================== Scalars ====================

fn decode_bool(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(PgValue::Bool(true)),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(PgValue::Bool(false)),
        _ => Err(invalid(oid, s)),
    }
}

fn encode_bool(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Bool(true) => Ok(b"t".to_vec()),
        PgValue::Bool(false) => Ok(b"f".to_vec()),
        other => Err(wrong_variant(Oid::BOOL, other)),
    }
}

/// `"char"` prints bytes >= 0x80 (and backslash) as `\ooo`.
fn decode_char(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    match data {
        [] => Ok(PgValue::Char(0)),
        [b] => Ok(PgValue::Char(*b as i8)),
        [b'\\', d @ ..] if d.len() == 3 && d.iter().all(|c| (b'0'..=b'7').contains(c)) => {
            let byte = d.iter().fold(0u16, |acc, c| acc * 8 + u16::from(c - b'0'));
            u8::try_from(byte)
                .map(|b| PgValue::Char(b as i8))
                .map_err(|_| invalid(oid, &String::from_utf8_lossy(data)))
        }
        _ => Err(PgError::malformed(
            oid,
            format!("\"char\" value is {} bytes", data.len()),
        )),
    }
}

fn encode_char(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Char(0) => Ok(Vec::new()),
        PgValue::Char(c) => {
            let byte = *c as u8;
            if byte >= 0x80 || byte == b'\\' {
                Ok(format!("\\{:03o}", byte).into_bytes())
            } else {
                Ok(vec![byte])
            }
        }
        other => Err(wrong_variant(Oid::CHAR, other)),
    }
}

fn decode_int2(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    parse(oid, data).map(PgValue::Int2)
}

fn decode_int4(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    parse(oid, data).map(PgValue::Int4)
}

fn decode_int8(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    parse(oid, data).map(PgValue::Int8)
}

fn decode_oid(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    parse(oid, data).map(PgValue::ObjectId)
}

fn encode_display(value: &PgValue) -> PgResult<Vec<u8>> {
    let s = match value {
        PgValue::Int2(v) => v.to_string(),
        PgValue::Int4(v) => v.to_string(),
        PgValue::Int8(v) => v.to_string(),
        PgValue::ObjectId(v) => v.to_string(),
        other => return Err(wrong_variant(other.type_oid(), other)),
    };
    Ok(s.into_bytes())
}

fn parse_float(oid: Oid, data: &[u8]) -> PgResult<f64> {
    let s = utf8(oid, data)?;
    match s {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        _ => s.parse().map_err(|_| invalid(oid, s)),
    }
}

fn decode_float4(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    match s {
        "NaN" => Ok(PgValue::Float4(f32::NAN)),
        "Infinity" => Ok(PgValue::Float4(f32::INFINITY)),
        "-Infinity" => Ok(PgValue::Float4(f32::NEG_INFINITY)),
        _ => s.parse().map(PgValue::Float4).map_err(|_| invalid(oid, s)),
    }
}

fn decode_float8(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    parse_float(oid, data).map(PgValue::Float8)
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "Infinity".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        v.to_string()
    }
}

fn encode_float(value: &PgValue) -> PgResult<Vec<u8>> {
    let s = match value {
        // f32 Display is already the shortest round-tripping form
        PgValue::Float4(v) if v.is_finite() => v.to_string(),
        PgValue::Float4(v) => float_text(f64::from(*v)),
        PgValue::Float8(v) => float_text(*v),
        other => return Err(wrong_variant(other.type_oid(), other)),
    };
    Ok(s.into_bytes())
}

/// Accepts `[-]digits[.digits]`, `NaN`, `Infinity`, `-Infinity`.
pub(super) fn is_numeric_literal(s: &str) -> bool {
    if matches!(s, "NaN" | "Infinity" | "-Infinity") {
        return true;
    }
    let body = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    let digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    let has_digits = !int.is_empty() || frac.is_some_and(|f| !f.is_empty());
    has_digits && digits(int) && frac.map_or(true, digits)
}

fn decode_numeric(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    if !is_numeric_literal(s) {
        return Err(invalid(oid, s));
    }
    Ok(PgValue::Numeric(s.to_string()))
}

fn encode_numeric(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Numeric(s) if is_numeric_literal(s) => Ok(s.clone().into_bytes()),
        PgValue::Numeric(s) => Err(PgError::InvalidArgument(format!(
            "{:?} is not a numeric literal",
            s
        ))),
        other => Err(wrong_variant(Oid::NUMERIC, other)),
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

// ==================== bytea ====================

fn decode_bytea(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    match data.strip_prefix(b"\\x") {
        Some(hex) => decode_hex(oid, hex).map(PgValue::Bytea),
        None => decode_bytea_escape(oid, data).map(PgValue::Bytea),
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn decode_hex(oid: Oid, hex: &[u8]) -> PgResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(PgError::malformed(oid, "odd number of hex digits"));
    }
    hex.chunks_exact(2)
        .map(|pair| match (hex_nibble(pair[0]), hex_nibble(pair[1])) {
            (Some(hi), Some(lo)) => Ok(hi << 4 | lo),
            _ => Err(PgError::malformed(oid, "invalid hex digit")),
        })
        .collect()
}

/// Legacy escape format: `\\` for backslash, `\ooo` for other bytes.
fn decode_bytea_escape(oid: Oid, data: &[u8]) -> PgResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] != b'\\' {
            out.push(data[i]);
            i += 1;
            continue;
        }
        match &data[i + 1..] {
            [b'\\', ..] => {
                out.push(b'\\');
                i += 2;
            }
            [a @ b'0'..=b'3', b @ b'0'..=b'7', c @ b'0'..=b'7', ..] => {
                out.push((a - b'0') * 64 + (b - b'0') * 8 + (c - b'0'));
                i += 4;
            }
            _ => return Err(PgError::malformed(oid, "invalid bytea escape sequence")),
        }
    }
    Ok(out)
}

fn encode_bytea(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Bytea(bytes) => {
            let mut s = String::with_capacity(2 + bytes.len() * 2);
            s.push_str("\\x");
            for b in bytes {
                let _ = write!(s, "{:02x}", b);
            }
            Ok(s.into_bytes())
        }
        other => Err(wrong_variant(Oid::BYTEA, other)),
    }
}

// ==================== json / uuid ====================

fn decode_json(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let json: serde_json::Value = serde_json::from_slice(data)
        .map_err(|e| PgError::malformed(oid, format!("invalid JSON: {}", e)))?;
    Ok(if oid == Oid::JSONB {
        PgValue::Jsonb(json)
    } else {
        PgValue::Json(json)
    })
}

fn encode_json(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Json(v) | PgValue::Jsonb(v) => serde_json::to_vec(v)
            .map_err(|e| PgError::InvalidArgument(format!("unserializable JSON: {}", e))),
        other => Err(wrong_variant(other.type_oid(), other)),
    }
}

fn decode_uuid(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    Uuid::parse_str(s)
        .map(PgValue::Uuid)
        .map_err(|_| invalid(oid, s))
}

fn encode_uuid(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Uuid(u) => Ok(u.hyphenated().to_string().into_bytes()),
        other => Err(wrong_variant(Oid::UUID, other)),
    }
}

fn reject_void(value: &PgValue) -> PgResult<Vec<u8>> {
    Err(wrong_variant(Oid::VOID, value))
}

// ==================== date / time ====================

/// Strip the ` BC` era suffix the server appends to dates before year 1.
fn split_era(s: &str) -> (&str, bool) {
    match s.strip_suffix(" BC") {
        Some(rest) => (rest, true),
        None => (s, false),
    }
}

/// `YYYY-MM-DD`; the year may be wider than four digits.
fn parse_ymd(s: &str, bc: bool) -> Option<NaiveDate> {
    let mut parts = s.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year = if bc { 1 - year } else { year };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Date part plus whether an era suffix is needed.
fn format_ymd(date: NaiveDate) -> (String, bool) {
    let year = date.year();
    let (shown, bc) = if year <= 0 { (1 - year, true) } else { (year, false) };
    (
        format!("{:04}-{:02}-{:02}", shown, date.month(), date.day()),
        bc,
    )
}

fn with_era(mut s: String, bc: bool) -> Vec<u8> {
    if bc {
        s.push_str(" BC");
    }
    s.into_bytes()
}

fn reject_infinity(oid: Oid, s: &str) -> PgResult<()> {
    if matches!(s, "infinity" | "-infinity") {
        return Err(PgError::malformed(
            oid,
            format!("{} cannot be represented", s),
        ));
    }
    Ok(())
}

fn decode_date(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    reject_infinity(oid, s)?;
    let (body, bc) = split_era(s);
    parse_ymd(body, bc)
        .map(PgValue::Date)
        .ok_or_else(|| invalid(oid, s))
}

fn encode_date(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Date(d) => {
            let (s, bc) = format_ymd(*d);
            Ok(with_era(s, bc))
        }
        other => Err(wrong_variant(Oid::DATE, other)),
    }
}

fn parse_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok()
}

/// `24:00:00[.000]`, accepted by the server for `time` only.
fn is_end_of_day(s: &str) -> bool {
    s.strip_prefix("24:00:00").is_some_and(|rest| {
        rest.is_empty() || (rest.starts_with('.') && rest[1..].bytes().all(|b| b == b'0'))
    })
}

fn decode_time(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    if is_end_of_day(s) {
        return Ok(PgValue::Time(end_of_day()));
    }
    parse_clock(s)
        .map(PgValue::Time)
        .ok_or_else(|| invalid(oid, s))
}

fn encode_time(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Time(t) if *t == end_of_day() => Ok(b"24:00:00".to_vec()),
        PgValue::Time(t) => Ok(t.format("%H:%M:%S%.f").to_string().into_bytes()),
        other => Err(wrong_variant(Oid::TIME, other)),
    }
}

fn parse_naive_timestamp(s: &str, bc: bool) -> Option<NaiveDateTime> {
    let (date, time) = s.split_once(' ')?;
    Some(parse_ymd(date, bc)?.and_time(parse_clock(time)?))
}

fn format_naive_timestamp(ts: NaiveDateTime) -> (String, bool) {
    let (date, bc) = format_ymd(ts.date());
    (format!("{} {}", date, ts.time().format("%H:%M:%S%.f")), bc)
}

fn decode_timestamp(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    reject_infinity(oid, s)?;
    let (body, bc) = split_era(s);
    parse_naive_timestamp(body, bc)
        .map(PgValue::Timestamp)
        .ok_or_else(|| invalid(oid, s))
}

fn encode_timestamp(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Timestamp(ts) => {
            let (s, bc) = format_naive_timestamp(*ts);
            Ok(with_era(s, bc))
        }
        other => Err(wrong_variant(Oid::TIMESTAMP, other)),
    }
}

/// Offset suffix as printed by the server: `+HH`, `+HH:MM` or `+HH:MM:SS`.
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let mut seconds = 0i32;
    for (part, scale) in rest.split(':').zip([3600, 60, 1]) {
        if part.len() != 2 {
            return None;
        }
        seconds += part.parse::<i32>().ok()? * scale;
    }
    FixedOffset::east_opt(sign * seconds)
}

fn decode_timestamptz(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    reject_infinity(oid, s)?;
    let (body, bc) = split_era(s);
    let parsed = body.split_once(' ').and_then(|(date, rest)| {
        // the offset starts at the last sign after the clock
        let split = rest.rfind(['+', '-'])?;
        let (clock, offset) = rest.split_at(split);
        let naive = parse_ymd(date, bc)?.and_time(parse_clock(clock)?);
        let offset = parse_offset(offset)?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    });
    parsed
        .map(PgValue::TimestampTz)
        .ok_or_else(|| invalid(oid, s))
}

fn encode_timestamptz(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::TimestampTz(ts) => {
            let (s, bc) = format_naive_timestamp(ts.naive_utc());
            Ok(with_era(format!("{}+00", s), bc))
        }
        other => Err(wrong_variant(Oid::TIMESTAMPTZ, other)),
    }
}

// ==================== interval ====================

const MICROS_PER_SECOND: i128 = 1_000_000;

/// `[-]H:MM:SS[.ffffff]` with an unbounded hour field.
///
/// The magnitude is summed in `i128` so that `-2562047788:00:54.775808`
/// (`i64::MIN` microseconds) parses; anything outside `i64` is rejected.
fn parse_interval_clock(s: &str) -> Option<i64> {
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let mut parts = body.splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds = parts.next().unwrap_or("0");
    let (whole, frac) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: u64 = whole.parse().ok()?;
    if frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frac_micros = if frac.is_empty() {
        0
    } else {
        frac.parse::<i128>().ok()? * 10i128.pow(6 - frac.len() as u32)
    };
    let total = (i128::from(hours) * 60 + i128::from(minutes))
        .checked_mul(60)?
        .checked_add(i128::from(whole))?
        .checked_mul(MICROS_PER_SECOND)?
        .checked_add(frac_micros)?;
    i64::try_from(if negative { -total } else { total }).ok()
}

fn parse_interval(s: &str) -> Option<Interval> {
    let mut interval = Interval::default();
    let mut tokens = s.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.contains(':') {
            interval.microseconds = interval
                .microseconds
                .checked_add(parse_interval_clock(token)?)?;
            continue;
        }
        let amount: i32 = token.parse().ok()?;
        match tokens.next()? {
            "year" | "years" => {
                interval.months = interval.months.checked_add(amount.checked_mul(12)?)?
            }
            "mon" | "mons" => interval.months = interval.months.checked_add(amount)?,
            "day" | "days" => interval.days = interval.days.checked_add(amount)?,
            _ => return None,
        }
    }
    Some(interval)
}

fn decode_interval(oid: Oid, data: &[u8]) -> PgResult<PgValue> {
    let s = utf8(oid, data)?;
    parse_interval(s)
        .map(PgValue::Interval)
        .ok_or_else(|| invalid(oid, s))
}

fn plural(n: i32, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

fn format_interval(interval: &Interval) -> String {
    let mut parts = Vec::new();
    let years = interval.months / 12;
    let months = interval.months % 12;
    if years != 0 {
        parts.push(plural(years, "year"));
    }
    if months != 0 {
        parts.push(plural(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(plural(interval.days, "day"));
    }
    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let secs = abs / 1_000_000;
        let frac = abs % 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{:06}", frac);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

fn encode_interval(value: &PgValue) -> PgResult<Vec<u8>> {
    match value {
        PgValue::Interval(i) => Ok(format_interval(i).into_bytes()),
        other => Err(wrong_variant(Oid::INTERVAL, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::codec::CodecRegistry;
    use chrono::DateTime;
    use proptest::prelude::*;

    fn decode(oid: Oid, s: &str) -> PgResult<PgValue> {
        CodecRegistry::new().decode(oid, Format::Text, Some(s.as_bytes()))
    }

    fn encode(value: &PgValue) -> String {
        CodecRegistry::new().encode_text(value).unwrap().unwrap()
    }

    #[test]
    fn test_scalar_text_decoding() {
        assert_eq!(decode(Oid::BOOL, "t").unwrap(), PgValue::Bool(true));
        assert_eq!(decode(Oid::BOOL, "f").unwrap(), PgValue::Bool(false));
        assert_eq!(decode(Oid::INT2, "-7").unwrap(), PgValue::Int2(-7));
        assert_eq!(decode(Oid::INT8, "9000000000").unwrap(), PgValue::Int8(9_000_000_000));
        assert_eq!(decode(Oid::OID, "4294967295").unwrap(), PgValue::ObjectId(u32::MAX));
        assert_eq!(decode(Oid::VARCHAR, "hé").unwrap(), PgValue::Text("hé".into()));
        assert_eq!(decode(Oid::VOID, "").unwrap(), PgValue::Null);
        assert!(matches!(decode(Oid::FLOAT8, "NaN").unwrap(), PgValue::Float8(v) if v.is_nan()));
        assert_eq!(
            decode(Oid::FLOAT4, "-Infinity").unwrap(),
            PgValue::Float4(f32::NEG_INFINITY)
        );
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        assert!(matches!(
            decode(Oid::INT4, "12x"),
            Err(PgError::MalformedPayload { oid: Oid::INT4, .. })
        ));
        assert!(decode(Oid::INT2, "70000").is_err());
        assert!(decode(Oid::BOOL, "maybe").is_err());
        assert!(decode(Oid::NUMERIC, "1.2.3").is_err());
        assert!(decode(Oid::TEXT, "\u{0}").is_ok());
        assert!(CodecRegistry::new()
            .decode(Oid::TEXT, Format::Text, Some(&[0xff, 0xfe]))
            .is_err());
    }

    #[test]
    fn test_char_text() {
        assert_eq!(decode(Oid::CHAR, "a").unwrap(), PgValue::Char(b'a' as i8));
        assert_eq!(decode(Oid::CHAR, "\\377").unwrap(), PgValue::Char(-1));
        assert_eq!(encode(&PgValue::Char(-1)), "\\377");
        assert_eq!(encode(&PgValue::Char(b'r' as i8)), "r");
        assert!(decode(Oid::CHAR, "\\777").is_err());
    }

    #[test]
    fn test_bytea_text() {
        assert_eq!(
            decode(Oid::BYTEA, "\\xdeadbeef").unwrap(),
            PgValue::Bytea(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(
            decode(Oid::BYTEA, "a\\\\b\\001").unwrap(),
            PgValue::Bytea(vec![b'a', b'\\', b'b', 1])
        );
        assert!(decode(Oid::BYTEA, "\\xabc").is_err());
        assert_eq!(encode(&PgValue::Bytea(vec![0, 255])), "\\x00ff");
    }

    #[test]
    fn test_numeric_literals() {
        for ok in ["0", "-1.50", "123456789012345678901234567890.000001", ".5", "NaN"] {
            assert!(is_numeric_literal(ok), "{}", ok);
        }
        for bad in ["", "-", ".", "1e5", "1,5", "+-1"] {
            assert!(!is_numeric_literal(bad), "{}", bad);
        }
    }

    #[test]
    fn test_dates_and_eras() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(decode(Oid::DATE, "2024-02-29").unwrap(), PgValue::Date(d));

        // 5 BC is astronomical year -4, a leap year
        let bc = NaiveDate::from_ymd_opt(-4, 2, 29).unwrap();
        assert_eq!(decode(Oid::DATE, "0005-02-29 BC").unwrap(), PgValue::Date(bc));
        assert_eq!(encode(&PgValue::Date(bc)), "0005-02-29 BC");

        assert!(decode(Oid::DATE, "infinity").is_err());
    }

    #[test]
    fn test_time_end_of_day() {
        let noon = NaiveTime::from_hms_micro_opt(12, 0, 0, 5).unwrap();
        assert_eq!(decode(Oid::TIME, "12:00:00.000005").unwrap(), PgValue::Time(noon));
        assert_eq!(decode(Oid::TIME, "24:00:00").unwrap(), PgValue::Time(end_of_day()));
        assert_eq!(decode(Oid::TIME, "24:00:00.000").unwrap(), PgValue::Time(end_of_day()));
        assert_eq!(encode(&PgValue::Time(end_of_day())), "24:00:00");
        assert!(decode(Oid::TIME, "24:00:01").is_err());
        assert!(decode(Oid::TIME, "24:00:00.5").is_err());
    }

    #[test]
    fn test_timestamps() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 120_000)
            .unwrap();
        assert_eq!(
            decode(Oid::TIMESTAMP, "2024-01-02 03:04:05.12").unwrap(),
            PgValue::Timestamp(ts)
        );
        assert_eq!(encode(&PgValue::Timestamp(ts)), "2024-01-02 03:04:05.120");

        let utc = Utc.from_utc_datetime(&(ts - chrono::Duration::minutes(330)));
        assert_eq!(
            decode(Oid::TIMESTAMPTZ, "2024-01-02 03:04:05.12+05:30").unwrap(),
            PgValue::TimestampTz(utc)
        );
        let minus = Utc.from_utc_datetime(&(ts + chrono::Duration::hours(8)));
        assert_eq!(
            decode(Oid::TIMESTAMPTZ, "2024-01-02 03:04:05.12-08").unwrap(),
            PgValue::TimestampTz(minus)
        );
        assert!(decode(Oid::TIMESTAMPTZ, "2024-01-02 03:04:05").is_err());
    }

    #[test]
    fn test_intervals() {
        assert_eq!(
            decode(Oid::INTERVAL, "1 year 2 mons 3 days 04:05:06.5").unwrap(),
            PgValue::Interval(Interval::new(14, 3, 14_706_500_000))
        );
        assert_eq!(
            decode(Oid::INTERVAL, "-1 days +02:00:00").unwrap(),
            PgValue::Interval(Interval::new(0, -1, 7_200_000_000))
        );
        assert_eq!(
            decode(Oid::INTERVAL, "00:00:00").unwrap(),
            PgValue::Interval(Interval::default())
        );
        assert_eq!(
            encode(&PgValue::Interval(Interval::new(-13, 1, -1_500_000))),
            "-1 years -1 mons 1 day -00:00:01.5"
        );
        assert!(decode(Oid::INTERVAL, "3 fortnights").is_err());
    }

    #[test]
    fn test_interval_clock_extremes() {
        assert_eq!(
            decode(Oid::INTERVAL, "-2562047788:00:54.775808").unwrap(),
            PgValue::Interval(Interval::new(0, 0, i64::MIN))
        );
        assert_eq!(
            decode(Oid::INTERVAL, "2562047788:00:54.775807").unwrap(),
            PgValue::Interval(Interval::new(0, 0, i64::MAX))
        );
        assert_eq!(
            encode(&PgValue::Interval(Interval::new(0, 0, i64::MIN))),
            "-2562047788:00:54.775808"
        );
        assert!(matches!(
            decode(Oid::INTERVAL, "2562047788:00:54.775808"),
            Err(PgError::MalformedPayload { oid: Oid::INTERVAL, .. })
        ));
        assert!(matches!(
            decode(Oid::INTERVAL, "99999999999999999999:00:00"),
            Err(PgError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_json_and_uuid() {
        assert_eq!(
            decode(Oid::JSONB, r#"{"a": [1, 2]}"#).unwrap(),
            PgValue::Jsonb(serde_json::json!({"a": [1, 2]}))
        );
        assert!(decode(Oid::JSON, "{nope").is_err());
        let u = Uuid::parse_str("55069c47-868b-4a08-a47f-3653262bce35").unwrap();
        assert_eq!(
            decode(Oid::UUID, "55069c47-868b-4a08-a47f-3653262bce35").unwrap(),
            PgValue::Uuid(u)
        );
        assert_eq!(encode(&PgValue::Uuid(u)), "55069c47-868b-4a08-a47f-3653262bce35");
    }

    fn roundtrip(value: PgValue) -> PgValue {
        let registry = CodecRegistry::new();
        let oid = value.type_oid();
        let bytes = registry.encode(&value, Format::Text).unwrap();
        registry.decode(oid, Format::Text, bytes.as_deref()).unwrap()
    }

    proptest! {
        #[test]
        fn prop_int8_text_roundtrip(v in any::<i64>()) {
            prop_assert_eq!(roundtrip(PgValue::Int8(v)), PgValue::Int8(v));
        }

        #[test]
        fn prop_float8_text_roundtrip(v in any::<f64>().prop_filter("NaN is not equal to itself", |v| !v.is_nan())) {
            prop_assert_eq!(roundtrip(PgValue::Float8(v)), PgValue::Float8(v));
        }

        #[test]
        fn prop_float4_text_roundtrip(v in any::<f32>().prop_filter("NaN is not equal to itself", |v| !v.is_nan())) {
            prop_assert_eq!(roundtrip(PgValue::Float4(v)), PgValue::Float4(v));
        }

        #[test]
        fn prop_text_roundtrip(s in "\\PC*") {
            prop_assert_eq!(roundtrip(PgValue::Text(s.clone())), PgValue::Text(s));
        }

        #[test]
        fn prop_bytea_text_roundtrip(b in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(roundtrip(PgValue::Bytea(b.clone())), PgValue::Bytea(b));
        }

        #[test]
        fn prop_interval_text_roundtrip(
            months in -100_000i32..100_000,
            days in -100_000i32..100_000,
            micros in -1_000_000_000_000i64..1_000_000_000_000,
        ) {
            let v = PgValue::Interval(Interval::new(months, days, micros));
            prop_assert_eq!(roundtrip(v.clone()), v);
        }

        #[test]
        fn prop_timestamp_text_roundtrip(secs in -200_000_000_000i64..200_000_000_000, micros in 0u32..1_000_000) {
            let ts = DateTime::from_timestamp(secs, micros * 1000).unwrap().naive_utc();
            prop_assert_eq!(roundtrip(PgValue::Timestamp(ts)), PgValue::Timestamp(ts));
            let tz = Utc.from_utc_datetime(&ts);
            prop_assert_eq!(roundtrip(PgValue::TimestampTz(tz)), PgValue::TimestampTz(tz));
        }
    }
}
