//! The pseudo-JSON metadata tail.
//!
//! The generator info blob at the end of the container header window is a
//! JSON list of `{key: ..., value: ...}` objects whose field names and
//! values are barewords. On emit the JSON is post-processed to drop the
//! quotes; on parse, stray `0x1B` bytes are removed and barewords re-quoted
//! before a standard JSON parse. Parse failures are ignored.

use serde_json::{Value, json};

/// Generator metadata recovered from (or destined for) the tail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorInfo {
    pub application_version: Option<String>,
    pub package_version: Option<String>,
    pub payload_sha1: Option<String>,
    /// Fallback container id.
    pub acr: Option<String>,
}

/// Emit the tail. Entry order: package version, application version,
/// payload SHA-1, acr.
pub fn emit(package_version: &str, application_version: &str, payload_sha1: &str, acr: &str) -> String {
    let entries = json!([
        {"key": "kfxgen_package_version", "value": package_version},
        {"key": "kfxgen_application_version", "value": application_version},
        {"key": "kfxgen_payload_sha1", "value": payload_sha1},
        {"key": "kfxgen_acr", "value": acr},
    ]);
    // Drop the quotes around every bareword-safe identifier and value.
    let rendered = entries.to_string();
    strip_quotes(&rendered)
}

/// Remove quotes around strings that survive as barewords.
fn strip_quotes(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '"' {
            out.push(c);
            continue;
        }
        // Find the closing quote (emitted values never contain escapes).
        let mut end = None;
        for (i, c2) in chars.by_ref() {
            if c2 == '"' {
                end = Some(i);
                break;
            }
        }
        match end {
            Some(end) => out.push_str(&json[start + 1..end]),
            None => out.push('"'),
        }
    }
    out
}

/// Parse a metadata tail. `0x1B` bytes are stripped first; a blob that
/// still fails to parse yields an empty [`GeneratorInfo`].
pub fn parse(bytes: &[u8]) -> GeneratorInfo {
    let cleaned: Vec<u8> = bytes.iter().copied().filter(|&b| b != 0x1b).collect();
    let Ok(text) = std::str::from_utf8(&cleaned) else {
        return GeneratorInfo::default();
    };
    let requoted = requote_barewords(text);

    let mut info = GeneratorInfo::default();
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(&requoted) else {
        return info;
    };

    for entry in &entries {
        let (Some(key), Some(value)) = (
            entry.get("key").and_then(Value::as_str),
            entry.get("value").and_then(Value::as_str),
        ) else {
            continue;
        };
        match key {
            "appVersion" | "kfxgen_application_version" => {
                info.application_version = Some(value.to_string());
            }
            "buildVersion" | "kfxgen_package_version" => {
                info.package_version = Some(value.to_string());
            }
            "kfxgen_payload_sha1" => info.payload_sha1 = Some(value.to_string()),
            "kfxgen_acr" => info.acr = Some(value.to_string()),
            _ => {}
        }
    }
    info
}

/// Quote every bareword so the blob becomes standard JSON. Content inside
/// existing quotes is preserved.
fn requote_barewords(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '"' => {
                // Copy the quoted run verbatim.
                out.push(chars.next().unwrap());
                for c2 in chars.by_ref() {
                    out.push(c2);
                    if c2 == '"' {
                        break;
                    }
                }
            }
            '{' | '}' | '[' | ']' | ':' | ',' => {
                out.push(chars.next().unwrap());
            }
            c if c.is_whitespace() => {
                out.push(chars.next().unwrap());
            }
            _ => {
                let mut word = String::new();
                while let Some(&c2) = chars.peek() {
                    if matches!(c2, '{' | '}' | '[' | ']' | ':' | ',' | '"') || c2.is_whitespace() {
                        break;
                    }
                    word.push(chars.next().unwrap());
                }
                out.push('"');
                out.push_str(&word.replace('\\', "\\\\"));
                out.push('"');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_drops_quotes() {
        let tail = emit("kindling-0.1.0", "kindling", "deadbeef", "CR!ABC");
        assert!(tail.contains("{key:kfxgen_package_version,value:kindling-0.1.0}"));
        assert!(!tail.contains('"'));
        assert!(tail.starts_with('['));
        assert!(tail.ends_with(']'));
    }

    #[test]
    fn test_emit_order() {
        let tail = emit("p", "a", "s", "c");
        let pkg = tail.find("kfxgen_package_version").unwrap();
        let app = tail.find("kfxgen_application_version").unwrap();
        let sha = tail.find("kfxgen_payload_sha1").unwrap();
        let acr = tail.find("kfxgen_acr").unwrap();
        assert!(pkg < app && app < sha && sha < acr);
    }

    #[test]
    fn test_parse_round_trip() {
        let tail = emit("kindling-0.1.0", "kindling", "deadbeef", "CR!ABC");
        let info = parse(tail.as_bytes());
        assert_eq!(info.package_version.as_deref(), Some("kindling-0.1.0"));
        assert_eq!(info.application_version.as_deref(), Some("kindling"));
        assert_eq!(info.payload_sha1.as_deref(), Some("deadbeef"));
        assert_eq!(info.acr.as_deref(), Some("CR!ABC"));
    }

    #[test]
    fn test_parse_strips_escape_bytes() {
        let mut bytes = emit("p", "a", "s", "c").into_bytes();
        bytes.insert(0, 0x1b);
        bytes.insert(5, 0x1b);
        let info = parse(&bytes);
        assert_eq!(info.package_version.as_deref(), Some("p"));
    }

    #[test]
    fn test_parse_accepts_legacy_keys() {
        let tail = "[{key:appVersion,value:gen-1.0},{key:buildVersion,value:pkg-2.0}]";
        let info = parse(tail.as_bytes());
        assert_eq!(info.application_version.as_deref(), Some("gen-1.0"));
        assert_eq!(info.package_version.as_deref(), Some("pkg-2.0"));
    }

    #[test]
    fn test_parse_garbage_is_ignored() {
        assert_eq!(parse(b"not json at all{{{"), GeneratorInfo::default());
        assert_eq!(parse(&[0xff, 0xfe]), GeneratorInfo::default());
    }
}
