//! The generic ITF value: a tagged union over the wire type domain.

/// A materialized ITF value.
///
/// Structs preserve the writer's insertion order but compare as unordered
/// maps: two structs are equal when they hold the same `(symbol, value)`
/// entries regardless of field order.
#[derive(Debug, Clone)]
pub enum ItfValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision decimal, kept as its wire bytes
    /// (VarInt exponent followed by a signed big-endian coefficient).
    Decimal(Vec<u8>),
    String(String),
    /// Symbol by ID (shared catalog or document-local).
    Symbol(u64),
    Blob(Vec<u8>),
    List(Vec<ItfValue>),
    /// Ordered `symbol -> value` mapping; order is not significant for
    /// equality.
    Struct(Vec<(u64, ItfValue)>),
    /// Annotated value: (annotation symbol IDs, inner value).
    Annotated(Vec<u64>, Box<ItfValue>),
}

impl ItfValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ItfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ItfValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ItfValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ItfValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<u64> {
        match self {
            ItfValue::Symbol(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            ItfValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ItfValue]> {
        match self {
            ItfValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(u64, ItfValue)]> {
        match self {
            ItfValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Get a struct field by symbol ID (first match wins).
    pub fn get(&self, symbol_id: u64) -> Option<&ItfValue> {
        self.as_struct()?
            .iter()
            .find(|(k, _)| *k == symbol_id)
            .map(|(_, v)| v)
    }

    /// Strip any annotation wrappers and return the inner value.
    pub fn unwrap_annotated(&self) -> &ItfValue {
        match self {
            ItfValue::Annotated(_, inner) => inner.unwrap_annotated(),
            other => other,
        }
    }

    /// The decimal this value holds, as a float. Accepts Int and Float too
    /// since writers may narrow.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            ItfValue::Int(n) => Some(*n as f64),
            ItfValue::Float(f) => Some(*f),
            ItfValue::Decimal(bytes) => decode_decimal(bytes),
            _ => None,
        }
    }
}

impl PartialEq for ItfValue {
    fn eq(&self, other: &Self) -> bool {
        use ItfValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Decimal(a), Decimal(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (Blob(a), Blob(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Struct(a), Struct(b)) => struct_eq(a, b),
            (Annotated(aa, av), Annotated(ba, bv)) => aa == ba && av == bv,
            _ => false,
        }
    }
}

/// Unordered struct comparison, robust to repeated keys: each entry on one
/// side must consume a distinct equal entry on the other.
fn struct_eq(a: &[(u64, ItfValue)], b: &[(u64, ItfValue)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for (ka, va) in a {
        for (i, (kb, vb)) in b.iter().enumerate() {
            if !used[i] && ka == kb && va == vb {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// Encode a float as an ITF decimal (exponent + coefficient), normalized to
/// drop trailing zeros. Precision is two decimal places.
pub fn encode_decimal(val: f64) -> Vec<u8> {
    if val == 0.0 {
        return vec![0x80]; // exponent 0, coefficient 0
    }

    let mut coef = (val * 100.0).round() as i64;
    let mut exp: i32 = -2;

    while coef != 0 && coef % 10 == 0 {
        coef /= 10;
        exp += 1;
    }

    let mut bytes = Vec::new();

    // Exponent: VarInt with sign bit 0x40 and stop bit 0x80; fits in 6 bits
    // for every value this crate produces.
    let exp_sign = if exp < 0 { 0x40 } else { 0x00 };
    bytes.push(0x80 | exp_sign | (exp.unsigned_abs() as u8 & 0x3f));

    if coef != 0 {
        let is_neg = coef < 0;
        let mut mag_bytes = Vec::new();
        let mut temp = coef.unsigned_abs();
        while temp > 0 {
            mag_bytes.push((temp & 0xff) as u8);
            temp >>= 8;
        }
        mag_bytes.reverse();

        // Sign lives in the MSB of the first coefficient byte; pad when the
        // magnitude already occupies it.
        if (mag_bytes[0] & 0x80) != 0 {
            bytes.push(if is_neg { 0x80 } else { 0x00 });
            bytes.extend(mag_bytes);
        } else {
            if is_neg {
                mag_bytes[0] |= 0x80;
            }
            bytes.extend(mag_bytes);
        }
    }

    bytes
}

/// Decode ITF decimal bytes produced by [`encode_decimal`].
pub fn decode_decimal(bytes: &[u8]) -> Option<f64> {
    if bytes.is_empty() {
        return Some(0.0);
    }

    // Single-byte VarInt exponent
    let exp_byte = bytes[0];
    if exp_byte & 0x80 == 0 {
        return None; // multi-byte exponents are never emitted
    }
    let mut exp = (exp_byte & 0x3f) as i32;
    if exp_byte & 0x40 != 0 {
        exp = -exp;
    }

    let coef_bytes = &bytes[1..];
    if coef_bytes.is_empty() {
        return Some(0.0);
    }

    let negative = coef_bytes[0] & 0x80 != 0;
    let mut coef: i64 = (coef_bytes[0] & 0x7f) as i64;
    for &b in &coef_bytes[1..] {
        coef = (coef << 8) | b as i64;
    }
    if negative {
        coef = -coef;
    }

    Some(coef as f64 * 10f64.powi(exp))
}
