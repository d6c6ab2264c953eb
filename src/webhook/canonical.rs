//! Canonical JSON text that webhook signatures are computed over.
//!
//! The signer serializes the payload with compact separators, keeps object
//! keys in the order they were received, and escapes DEL and every non-ASCII
//! character as a lower-case `\uXXXX` UTF-16 unit. Key order survives parsing
//! because `serde_json` is built with `preserve_order`.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::error::Result;

/// Compact formatter that escapes DEL and non-ASCII characters.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (ix, ch) in fragment.char_indices() {
            if ch.is_ascii() && ch != '\u{7f}' {
                continue;
            }
            writer.write_all(fragment[start..ix].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = ix + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Serialize `value` into its canonical signed form.
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut ser)?;
    // Every byte written is ASCII.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(text: &str) -> String {
        canonical_json(&serde_json::from_str(text).unwrap()).unwrap()
    }

    #[test]
    fn whitespace_removed() {
        assert_eq!(
            canon(r#"{ "uploadID" : "abc", "findingsPresent" : true }"#),
            r#"{"uploadID":"abc","findingsPresent":true}"#
        );
    }

    #[test]
    fn key_order_preserved() {
        assert_eq!(canon(r#"{"z":1,"a":2,"m":{"y":1,"b":2}}"#), r#"{"z":1,"a":2,"m":{"y":1,"b":2}}"#);
    }

    #[test]
    fn non_ascii_escaped_lower_case() {
        assert_eq!(canon("{\"name\":\"caf\u{e9}\"}"), r#"{"name":"caf\u00e9"}"#);
    }

    #[test]
    fn astral_characters_become_surrogate_pairs() {
        assert_eq!(canon("{\"e\":\"\u{1F600}\"}"), r#"{"e":"\ud83d\ude00"}"#);
    }

    #[test]
    fn delete_character_escaped() {
        assert_eq!(
            canon("{\"uploadID\":\"a\u{7f}b\",\"findingsPresent\":true}"),
            r#"{"uploadID":"a\u007fb","findingsPresent":true}"#
        );
    }

    #[test]
    fn control_characters_escaped_lower_case() {
        assert_eq!(canon(r#"{"s":"a\u001Fb\tc"}"#), r#"{"s":"a\u001fb\tc"}"#);
    }

    #[test]
    fn standard_escapes_kept() {
        assert_eq!(canon(r#"{"s":"a\"b\\c\nd"}"#), r#"{"s":"a\"b\\c\nd"}"#);
    }

    #[test]
    fn numbers_and_arrays_compact() {
        assert_eq!(canon(r#"{"n": [1, 2.5, null, false]}"#), r#"{"n":[1,2.5,null,false]}"#);
    }
}
