//! Wire codec (spec component A).
//!
//! Messages are newline-terminated, tab-separated field lists. The first
//! field is a numeric command code, the second a decimal message id; the
//! rest are verb-specific. A lone trailing empty field is appended whenever
//! the payload would otherwise be empty so the separator count never varies.
//!
//! Structured payload fields carry percent-encoded, HTML-entity-encoded XML
//! documents — sometimes double-encoded by the peer. [`unquote_twice`]
//! exists for exactly those fields; plain fields only need [`unquote_once`].

use crate::error::Error;
use crate::protocol::Cmd;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// A decoded frame: command code, message id, and remaining fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: Cmd,
    pub id: u64,
    pub args: Vec<String>,
}

/// Encode a message for the wire: `cmd<TAB>id<TAB>field...<TAB><LF>`.
///
/// When `args` is empty a single empty field is appended, matching the
/// peer's expectation of a stable separator count even for payload-less
/// commands.
pub fn encode(cmd: Cmd, id: u64, args: &[String]) -> String {
    let mut fields = Vec::with_capacity(args.len() + 3);
    fields.push(cmd.to_string());
    fields.push(id.to_string());
    if args.is_empty() {
        fields.push(String::new());
    } else {
        fields.extend(args.iter().cloned());
    }
    let mut line = fields.join("\t");
    line.push('\n');
    line
}

/// Decode one newline-stripped line into a [`Frame`].
pub fn decode(line: &str) -> Result<Frame, Error> {
    let mut fields = line.split('\t');
    let cmd = fields
        .next()
        .ok_or_else(|| Error::Protocol("missing command field".into()))?
        .parse::<Cmd>()
        .map_err(|_| Error::Protocol("non-integer command code".into()))?;
    let id = fields
        .next()
        .ok_or_else(|| Error::Protocol("missing message id".into()))?
        .parse::<u64>()
        .map_err(|_| Error::Protocol("non-integer message id".into()))?;
    let args = fields.map(str::to_owned).collect();
    Ok(Frame { cmd, id, args })
}

/// Characters this codec percent-encodes in [`quote_once`]. Tab and newline
/// are the frame delimiters and must never appear unescaped in a field;
/// everything else non-alphanumeric is encoded too, matching the peer's
/// conservative quoting.
const QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC;

/// XML-entity-escape, then percent-encode `s`. Inverse of [`unquote_once`].
pub fn quote_once(s: &str) -> String {
    let escaped = quick_xml::escape::escape(s);
    utf8_percent_encode(&escaped, QUOTE_SET).to_string()
}

/// Percent-decode, then XML-entity-unescape `s`. This is the order the peer
/// daemon uses (spec §4.A: "percent-decoding followed by HTML-entity
/// decoding"); reversing it does not round-trip.
pub fn unquote_once(s: &str) -> String {
    let percent_decoded = percent_decode_str(s).decode_utf8_lossy().into_owned();
    quick_xml::escape::unescape(&percent_decoded)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or(percent_decoded)
}

/// Apply [`unquote_once`] twice. The peer double-encodes some text fields
/// (suspend-frame filenames, evaluate results); this undoes that.
pub fn unquote_twice(s: &str) -> String {
    unquote_once(&unquote_once(s))
}

/// Apply [`quote_once`] twice. Inverse of [`unquote_twice`].
pub fn quote_twice(s: &str) -> String {
    quote_once(&quote_once(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_with_empty_payload() {
        let line = encode(501, 1, &[]);
        assert_eq!(line, "501\t1\t\n");
        let frame = decode(line.trim_end_matches('\n')).unwrap();
        assert_eq!(frame.cmd, 501);
        assert_eq!(frame.id, 1);
        assert_eq!(frame.args, vec![String::new()]);
    }

    #[test]
    fn frame_round_trips_with_arbitrary_tab_free_fields() {
        let fields = vec![
            "main.py".to_string(),
            "42".to_string(),
            "n > 0".to_string(),
        ];
        let line = encode(111, 7, &fields);
        let frame = decode(line.trim_end_matches('\n')).unwrap();
        assert_eq!(frame.cmd, 111);
        assert_eq!(frame.id, 7);
        assert_eq!(frame.args, fields);
    }

    #[test]
    fn decode_rejects_non_integer_id() {
        let err = decode("111\tabc\tfoo").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn unquote_twice_inverts_quote_twice() {
        for s in [
            "plain text",
            "/a/b/c.py",
            "x < y & y > z",
            "quote \" and apostrophe '",
            "percent % sign",
        ] {
            assert_eq!(unquote_twice(&quote_twice(s)), s);
        }
    }

    #[test]
    fn unquote_once_decodes_percent_then_entities() {
        // As the peer actually encodes: HTML-escape "&" to "&amp;", then
        // percent-encode the result, producing the literal wire text
        // "%26amp%3B". Decoding must undo percent-encoding first (yielding
        // "&amp;") and only then the HTML entity (yielding "&"); doing it in
        // the other order would see no entity in the still-percent-encoded
        // string and leave "&amp;" unresolved.
        assert_eq!(unquote_once("%26amp%3B"), "&");
    }
}
