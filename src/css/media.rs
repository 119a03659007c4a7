//! `@media` query evaluation.
//!
//! Queries are evaluated once at parse time against the capability flags;
//! non-matching blocks are discarded. The supported grammar is
//! `not? <type> (and not? <feature>)*` with comma-separated alternatives.
//! Unknown identifiers evaluate to false.

/// Capability flags of the target reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub kf8: bool,
    pub et: bool,
}

impl Capabilities {
    fn flag(&self, ident: &str) -> bool {
        match ident {
            "amzn-kf8" | "kf8" => self.kf8,
            "amzn-et" | "et" => self.et,
            _ => false,
        }
    }
}

/// Evaluate a lexed media query prelude. `words` holds lowercased
/// identifiers with `","` marking alternative boundaries.
pub fn evaluate(words: &[String], caps: Capabilities) -> bool {
    words
        .split(|w| w == ",")
        .any(|group| evaluate_group(group, caps))
}

fn evaluate_group(words: &[String], caps: Capabilities) -> bool {
    let mut iter = words.iter().peekable();

    let mut negate = false;
    if iter.peek().map(|s| s.as_str()) == Some("not") {
        negate = true;
        iter.next();
    }
    let Some(media_type) = iter.next() else {
        return false;
    };
    let mut value = caps.flag(media_type) != negate;

    while let Some(word) = iter.next() {
        if word != "and" {
            return false; // malformed query
        }
        let mut negate = false;
        if iter.peek().map(|s| s.as_str()) == Some("not") {
            negate = true;
            iter.next();
        }
        let Some(feature) = iter.next() else {
            return false;
        };
        value = value && (caps.flag(feature) != negate);
    }

    value
}
