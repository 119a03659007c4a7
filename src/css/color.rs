//! Color parsing.
//!
//! Colors materialize into a packed ARGB int: `0xFF000000 | r<<16 | g<<8 | b`.
//! Alpha from `rgba()` is ignored.

/// Parse a CSS color into a packed ARGB int64.
pub fn parse_color(raw: &str) -> Option<i64> {
    let text = raw.trim();

    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }

    let lower = text.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
    {
        return parse_rgb_args(args.strip_suffix(')')?);
    }

    keyword_color(&lower)
}

fn parse_hex(hex: &str) -> Option<i64> {
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1], 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2], 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3], 16).ok()?;
            Some(pack(r * 17, g * 17, b * 17))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(pack(r, g, b))
        }
        _ => None,
    }
}

fn parse_rgb_args(args: &str) -> Option<i64> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return None;
    }
    let channel = |text: &str| -> Option<u8> {
        if let Some(pct) = text.strip_suffix('%') {
            let v: f32 = pct.trim().parse().ok()?;
            Some((v.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u8)
        } else {
            let v: f32 = text.parse().ok()?;
            Some(v.clamp(0.0, 255.0).round() as u8)
        }
    };
    Some(pack(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?))
}

fn keyword_color(name: &str) -> Option<i64> {
    let (r, g, b) = match name {
        "black" => (0x00, 0x00, 0x00),
        "silver" => (0xc0, 0xc0, 0xc0),
        "gray" | "grey" => (0x80, 0x80, 0x80),
        "white" => (0xff, 0xff, 0xff),
        "maroon" => (0x80, 0x00, 0x00),
        "red" => (0xff, 0x00, 0x00),
        "purple" => (0x80, 0x00, 0x80),
        "fuchsia" => (0xff, 0x00, 0xff),
        "green" => (0x00, 0x80, 0x00),
        "lime" => (0x00, 0xff, 0x00),
        "olive" => (0x80, 0x80, 0x00),
        "yellow" => (0xff, 0xff, 0x00),
        "navy" => (0x00, 0x00, 0x80),
        "blue" => (0x00, 0x00, 0xff),
        "teal" => (0x00, 0x80, 0x80),
        "aqua" => (0x00, 0xff, 0xff),
        "orange" => (0xff, 0xa5, 0x00),
        "brown" => (0xa5, 0x2a, 0x2a),
        _ => return None,
    };
    Some(pack(r, g, b))
}

#[inline]
fn pack(r: u8, g: u8, b: u8) -> i64 {
    0xff000000u32 as i64 | ((r as i64) << 16) | ((g as i64) << 8) | b as i64
}
