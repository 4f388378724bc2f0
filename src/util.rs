use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

pub(crate) type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
pub(crate) type HashMap<K, V> = hashbrown::HashMap<K, V, BuildHasher>;
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasher>;

/// Prefix of the synthesized names under which inlined function instances are
/// stored, e.g. `rankingExpression(f@0123456789abcdef)`.
pub const FUNCTION_WRAPPER: &str = "rankingExpression";

/// Displays a slice with the given separator between elements.
pub struct ListDisplay<'a, T>(pub &'a [T], pub &'a str);

impl<T: Display> Display for ListDisplay<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(self.1)?;
            }
            Display::fmt(item, f)?;
        }
        Ok(())
    }
}

/// A stable (per build) 64 bit fingerprint of a sequence of strings.
/// Used to give inlined function instances names that only depend on
/// their argument bindings.
pub(crate) fn fingerprint<S: AsRef<str>>(parts: &[S]) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    for part in parts {
        part.as_ref().hash(&mut hasher);
    }
    hasher.finish()
}

/// Quotes a string literal the way the expression syntax expects it.
pub(crate) fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Formats a double so that it always carries a decimal point or exponent,
/// which keeps constants distinguishable from integers in canonical text.
pub(crate) fn format_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_owned()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_owned()
    } else {
        format!("{value:?}")
    }
}
