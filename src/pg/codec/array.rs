//! Array framing for both wire formats.
//!
//! Elements are encoded and decoded through the registry with the element
//! type's codec, so arrays of extension types work once both the element
//! codec and the array type are registered.
//!
//! Text form: `{1,2,NULL}`, `{{"a b","c"},{d,e}}`, `[0:1]={x,y}`.
//! Binary form: ndim, has-null flag, element oid, `(len, lower bound)` per
//! dimension, then length-prefixed elements with -1 for NULL.

use bytes::BufMut;

use super::{utf8, CodecRegistry, WireReader};
use crate::pg::error::{PgError, PgResult};
use crate::pg::types::{ArrayDimension, Format, Oid, PgArray, PgValue};

/// Server limit on array dimensions.
const MAX_DIMS: usize = 6;

// ============================================================================
// Text format
// ============================================================================

pub(super) fn decode_text(
    registry: &CodecRegistry,
    array_oid: Oid,
    element_oid: Oid,
    data: &[u8],
) -> PgResult<PgValue> {
    let s = utf8(array_oid, data)?;
    let (bounds, body) = split_decoration(array_oid, s)?;

    let mut parser = TextArrayParser::new(array_oid, body.as_bytes());
    parser.parse()?;

    let lengths = parser.lengths();
    let dimensions = match bounds {
        Some(bounds) => {
            let declared = bounds
                .iter()
                .map(|(lb, ub)| ub.checked_sub(*lb).and_then(|d| d.checked_add(1)))
                .collect::<Option<Vec<i32>>>()
                .ok_or_else(|| PgError::malformed(array_oid, "array bounds out of range"))?;
            if declared != lengths {
                return Err(PgError::malformed(
                    array_oid,
                    "array bounds do not match the array contents",
                ));
            }
            bounds
                .iter()
                .zip(&lengths)
                .map(|((lb, _), len)| ArrayDimension {
                    len: *len,
                    lower_bound: *lb,
                })
                .collect()
        }
        None => lengths
            .iter()
            .map(|len| ArrayDimension {
                len: *len,
                lower_bound: 1,
            })
            .collect(),
    };

    let elements = parser
        .elements
        .iter()
        .map(|e| registry.decode(element_oid, Format::Text, e.as_deref().map(str::as_bytes)))
        .collect::<PgResult<Vec<_>>>()?;

    PgArray::new(array_oid, element_oid, dimensions, elements)
        .map(PgValue::Array)
        .map_err(|e| PgError::malformed(array_oid, e.to_string()))
}

/// Bounds: `[lb:ub][lb:ub]=` prefix, printed when a lower bound is not 1.
type Bounds = Vec<(i32, i32)>;

fn split_decoration(oid: Oid, s: &str) -> PgResult<(Option<Bounds>, &str)> {
    let s = s.trim_start();
    if !s.starts_with('[') {
        return Ok((None, s));
    }
    let bad = || PgError::malformed(oid, "invalid array dimension decoration");
    let (decoration, body) = s.split_once('=').ok_or_else(bad)?;
    let mut bounds = Vec::new();
    let mut rest = decoration.trim_end();
    while let Some(after) = rest.strip_prefix('[') {
        let (range, tail) = after.split_once(']').ok_or_else(bad)?;
        let (lb, ub) = range.split_once(':').ok_or_else(bad)?;
        let lb: i32 = lb.trim().parse().map_err(|_| bad())?;
        let ub: i32 = ub.trim().parse().map_err(|_| bad())?;
        if ub < lb {
            return Err(bad());
        }
        bounds.push((lb, ub));
        rest = tail;
    }
    if !rest.is_empty() || bounds.len() > MAX_DIMS {
        return Err(bad());
    }
    Ok((Some(bounds), body))
}

struct TextArrayParser<'a> {
    oid: Oid,
    input: &'a [u8],
    pos: usize,
    /// Element count per depth, fixed by the first sub-array seen.
    dims: Vec<Option<i32>>,
    /// Depth at which scalar elements live.
    leaf_depth: Option<usize>,
    elements: Vec<Option<String>>,
}

impl<'a> TextArrayParser<'a> {
    fn new(oid: Oid, input: &'a [u8]) -> Self {
        Self {
            oid,
            input,
            pos: 0,
            dims: Vec::new(),
            leaf_depth: None,
            elements: Vec::new(),
        }
    }

    fn error(&self, what: &str) -> PgError {
        PgError::malformed(self.oid, format!("{} at offset {} of array literal", what, self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse(&mut self) -> PgResult<()> {
        self.skip_ws();
        if self.peek() != Some(b'{') {
            return Err(self.error("expected '{'"));
        }
        // `{}` is the empty array, which has no dimensions at all
        let mut probe = self.pos + 1;
        while self.input.get(probe).is_some_and(|b| b.is_ascii_whitespace()) {
            probe += 1;
        }
        if self.input.get(probe) == Some(&b'}') {
            self.pos = probe + 1;
        } else {
            self.parse_level(0)?;
        }
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(self.error("junk after closing brace"));
        }
        Ok(())
    }

    fn parse_level(&mut self, depth: usize) -> PgResult<()> {
        if depth >= MAX_DIMS {
            return Err(self.error("too many array dimensions"));
        }
        // consume '{'
        self.pos += 1;
        let mut count: i32 = 0;
        loop {
            self.skip_ws();
            if self.peek() == Some(b'{') {
                if self.leaf_depth.is_some_and(|leaf| depth >= leaf) {
                    return Err(self.error("unexpected sub-array"));
                }
                self.parse_level(depth + 1)?;
            } else {
                if self.leaf_depth.is_some_and(|leaf| leaf != depth) {
                    return Err(self.error("elements at mixed depths"));
                }
                self.leaf_depth = Some(depth);
                let element = self.parse_element()?;
                self.elements.push(element);
            }
            count += 1;
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }

        // inner levels close first, so slots fill deepest-first
        if self.dims.len() <= depth {
            self.dims.resize(depth + 1, None);
        }
        let slot = self.dims[depth];
        match slot {
            Some(expected) if expected != count => {
                Err(self.error("sub-arrays have different lengths"))
            }
            Some(_) => Ok(()),
            None => {
                self.dims[depth] = Some(count);
                Ok(())
            }
        }
    }

    /// Length of each dimension, outermost first.
    fn lengths(&self) -> Vec<i32> {
        self.dims.iter().flatten().copied().collect()
    }

    fn parse_element(&mut self) -> PgResult<Option<String>> {
        let mut out = Vec::new();
        if self.peek() == Some(b'"') {
            self.pos += 1;
            loop {
                match self.peek() {
                    None => return Err(self.error("unterminated quoted element")),
                    Some(b'"') => {
                        self.pos += 1;
                        break;
                    }
                    Some(b'\\') => {
                        let escaped = self
                            .input
                            .get(self.pos + 1)
                            .copied()
                            .ok_or_else(|| self.error("dangling backslash"))?;
                        out.push(escaped);
                        self.pos += 2;
                    }
                    Some(b) => {
                        out.push(b);
                        self.pos += 1;
                    }
                }
            }
            return self.finish_element(out).map(Some);
        }

        let mut escaped_any = false;
        // trailing whitespace is dropped unless escaped
        let mut keep = 0;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated array")),
                Some(b',') | Some(b'}') => break,
                Some(b'{') | Some(b'"') => return Err(self.error("unexpected character")),
                Some(b'\\') => {
                    let escaped = self
                        .input
                        .get(self.pos + 1)
                        .copied()
                        .ok_or_else(|| self.error("dangling backslash"))?;
                    out.push(escaped);
                    keep = out.len();
                    escaped_any = true;
                    self.pos += 2;
                }
                Some(b) => {
                    out.push(b);
                    if !b.is_ascii_whitespace() {
                        keep = out.len();
                    }
                    self.pos += 1;
                }
            }
        }
        out.truncate(keep);
        if out.is_empty() {
            return Err(self.error("empty unquoted element"));
        }
        if !escaped_any && out.eq_ignore_ascii_case(b"null") {
            return Ok(None);
        }
        self.finish_element(out).map(Some)
    }

    fn finish_element(&self, bytes: Vec<u8>) -> PgResult<String> {
        String::from_utf8(bytes).map_err(|_| self.error("element is not valid UTF-8"))
    }
}

pub(super) fn encode_text(registry: &CodecRegistry, array: &PgArray) -> PgResult<Vec<u8>> {
    if array.elements().is_empty() {
        return Ok(b"{}".to_vec());
    }

    let mut items = Vec::with_capacity(array.elements().len());
    for element in array.elements() {
        let item = match registry.encode_as(array.element_type(), element, Format::Text)? {
            None => "NULL".to_string(),
            Some(bytes) => {
                let s = String::from_utf8(bytes).map_err(|_| {
                    PgError::malformed(array.element_type(), "text encoding is not UTF-8")
                })?;
                quote_element(&s)
            }
        };
        items.push(item);
    }

    let mut out = String::new();
    if array.dimensions().iter().any(|d| d.lower_bound != 1) {
        for d in array.dimensions() {
            let upper = d.upper_bound().ok_or_else(|| {
                PgError::InvalidArgument(format!(
                    "array dimension {:?} overflows its upper bound",
                    d
                ))
            })?;
            out.push_str(&format!("[{}:{}]", d.lower_bound, upper));
        }
        out.push('=');
    }
    let lengths: Vec<usize> = array
        .dimensions()
        .iter()
        .map(|d| d.len.max(0) as usize)
        .collect();
    write_level(&mut out, &lengths, &items);
    Ok(out.into_bytes())
}

fn write_level(out: &mut String, lengths: &[usize], items: &[String]) {
    out.push('{');
    match lengths {
        [] | [_] => out.push_str(&items.join(",")),
        [_, inner @ ..] => {
            let stride = inner.iter().product::<usize>().max(1);
            for (i, chunk) in items.chunks(stride).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_level(out, inner, chunk);
            }
        }
    }
    out.push('}');
}

fn quote_element(s: &str) -> String {
    let needs_quotes = s.is_empty()
        || s.eq_ignore_ascii_case("null")
        || s
            .bytes()
            .any(|b| matches!(b, b'{' | b'}' | b',' | b'"' | b'\\') || b.is_ascii_whitespace());
    if !needs_quotes {
        return s.to_string();
    }
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

// ============================================================================
// Binary format
// ============================================================================

pub(super) fn decode_binary(
    registry: &CodecRegistry,
    array_oid: Oid,
    element_oid: Oid,
    data: &[u8],
) -> PgResult<PgValue> {
    let mut r = WireReader::new(array_oid, data);
    let ndim = r.i32()?;
    let flags = r.i32()?;
    let wire_element = Oid(r.u32()?);

    if !(0..=MAX_DIMS as i32).contains(&ndim) {
        return Err(PgError::malformed(array_oid, format!("invalid dimension count {}", ndim)));
    }
    if flags & !1 != 0 {
        return Err(PgError::malformed(array_oid, format!("invalid array flags {}", flags)));
    }
    if wire_element != element_oid {
        return Err(PgError::malformed(
            array_oid,
            format!("element type {} does not match {}", wire_element, element_oid),
        ));
    }

    let mut dimensions = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = r.i32()?;
        let lower_bound = r.i32()?;
        if len < 0 {
            return Err(PgError::malformed(array_oid, "negative dimension length"));
        }
        dimensions.push(ArrayDimension { len, lower_bound });
    }

    let total = if dimensions.is_empty() {
        0
    } else {
        dimensions
            .iter()
            .try_fold(1usize, |acc, d| acc.checked_mul(d.len as usize))
            .ok_or_else(|| PgError::malformed(array_oid, "array too large"))?
    };
    // every element costs at least its 4-byte length word
    if total > data.len() / 4 {
        return Err(PgError::malformed(
            array_oid,
            format!("{} elements cannot fit in {} bytes", total, data.len()),
        ));
    }

    let mut elements = Vec::with_capacity(total);
    for _ in 0..total {
        let len = r.i32()?;
        let payload = match len {
            -1 => None,
            n if n < 0 => {
                return Err(PgError::malformed(array_oid, format!("invalid element length {}", n)))
            }
            n => Some(r.take(n as usize)?),
        };
        elements.push(registry.decode(element_oid, Format::Binary, payload)?);
    }
    r.finish()?;

    PgArray::new(array_oid, element_oid, dimensions, elements)
        .map(PgValue::Array)
        .map_err(|e| PgError::malformed(array_oid, e.to_string()))
}

pub(super) fn encode_binary(registry: &CodecRegistry, array: &PgArray) -> PgResult<Vec<u8>> {
    let mut encoded = Vec::with_capacity(array.elements().len());
    for element in array.elements() {
        encoded.push(registry.encode_as(array.element_type(), element, Format::Binary)?);
    }
    let has_null = encoded.iter().any(Option::is_none);

    let mut out = Vec::new();
    out.put_i32(array.dimensions().len() as i32);
    out.put_i32(i32::from(has_null));
    out.put_u32(array.element_type().as_u32());
    for d in array.dimensions() {
        out.put_i32(d.len);
        out.put_i32(d.lower_bound);
    }
    for item in &encoded {
        match item {
            None => out.put_i32(-1),
            Some(bytes) => {
                let len = i32::try_from(bytes.len()).map_err(|_| {
                    PgError::InvalidArgument("array element too large".to_string())
                })?;
                out.put_i32(len);
                out.put_slice(bytes);
            }
        }
    }
    Ok(out)
}
