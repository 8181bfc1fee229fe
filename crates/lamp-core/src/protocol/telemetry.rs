//! Inbound temperature tag scanner.
//!
//! The firmware prints readings such as `TEMP:23.5` into its serial output,
//! interleaved with whatever else it logs.  The host reads the port in
//! arbitrary chunks, so a reading can arrive in one piece or be cut anywhere:
//!
//! ```text
//! chunk 1: "boot ok\r\nTE"
//! chunk 2: "MP:2"
//! chunk 3: "3.5\r\n"
//! ```
//!
//! # Scanning rules
//!
//! - The tag is the fixed ASCII prefix [`TEMPERATURE_TAG`].  Whitespace after
//!   the tag is skipped.
//! - The value is an optional sign, digits, and at most one decimal point.  It
//!   ends at the first other character or at the end of the chunk.
//! - A tag followed by something that is not a number is [`ScanOutcome::Malformed`];
//!   the caller keeps its previous reading.
//! - **First match wins**: only the first tag of a chunk is considered.
//!
//! # Carry-over between chunks
//!
//! The scanner keeps a small carry buffer so that cut readings still decode:
//!
//! - A chunk ending in a proper prefix of the tag (`"TE"`), or in the tag with
//!   no value yet (`"TEMP:"`, `"TEMP: -"`), is prepended to the next chunk.
//! - The same holds after the chunk's first match: a later tag whose value
//!   runs to the end of the chunk (`"TEMP:22\nTEMP:3"`) is not reported for
//!   this chunk but is carried, so the next chunk completes it.
//! - A value that runs to the end of a chunk is reported immediately.  If the
//!   next chunk starts by continuing its digits, the extended value is
//!   reported again (`"2"`, then `"23.5"`).  The extension counts as that
//!   chunk's first match.

use std::borrow::Cow;

use tracing::trace;

/// Prefix marking a temperature value in the inbound stream.
pub const TEMPERATURE_TAG: &str = "TEMP:";

/// Upper bound on a carried partial tag; longer runs of whitespace after a tag
/// are dropped instead of buffered.
const MAX_CARRY_LEN: usize = 32;

/// Characters of a malformed payload kept for diagnostics.
const MALFORMED_SNIPPET_LEN: usize = 16;

/// Result of scanning one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No complete tag in this chunk.
    NoTag,
    /// A well-formed reading; the text of the number exactly as received,
    /// minus a dangling decimal point.
    Reading(String),
    /// A tag followed by a non-numeric payload (the first few characters of
    /// which are included).
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Carry {
    #[default]
    Empty,
    /// Text that may become a tag once the next chunk is appended.
    Tag(String),
    /// A reading already reported that ran to the end of its chunk.
    Value(String),
}

/// Incremental scanner for the `TEMP:` tag.
///
/// # Examples
///
/// ```rust
/// use lamp_core::{ScanOutcome, TagScanner};
///
/// let mut scanner = TagScanner::new();
/// assert_eq!(scanner.push(b"noise TE"), ScanOutcome::NoTag);
/// assert_eq!(scanner.push(b"MP:23.5 extra"), ScanOutcome::Reading("23.5".into()));
/// ```
#[derive(Debug, Default)]
pub struct TagScanner {
    carry: Carry,
}

impl TagScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans one chunk of raw bytes.  Invalid UTF-8 is replaced, not rejected.
    pub fn push(&mut self, chunk: &[u8]) -> ScanOutcome {
        let text: Cow<'_, str> = String::from_utf8_lossy(chunk);

        match std::mem::take(&mut self.carry) {
            Carry::Empty => self.scan(&text),
            Carry::Tag(mut pending) => {
                pending.push_str(&text);
                self.scan(&pending)
            }
            Carry::Value(mut value) => {
                let n = continuation_len(&value, &text);
                if n == 0 {
                    return self.scan(&text);
                }
                value.push_str(&text[..n]);
                self.finish_value(value, &text[n..])
            }
        }
    }

    fn scan(&mut self, text: &str) -> ScanOutcome {
        let Some(pos) = text.find(TEMPERATURE_TAG) else {
            self.carry = partial_tag_suffix(text);
            return ScanOutcome::NoTag;
        };

        let tail = &text[pos..];
        let payload = tail[TEMPERATURE_TAG.len()..].trim_start();
        let len = numeric_prefix_len(payload);

        if len == 0 {
            if is_number_start(payload) {
                self.carry = if tail.len() <= MAX_CARRY_LEN {
                    Carry::Tag(tail.to_string())
                } else {
                    trace!(len = tail.len(), "dropping oversized partial tag");
                    Carry::Empty
                };
                return ScanOutcome::NoTag;
            }
            self.carry = trailing_carry(payload);
            return ScanOutcome::Malformed(payload.chars().take(MALFORMED_SNIPPET_LEN).collect());
        }

        self.finish_value(payload[..len].to_string(), &payload[len..])
    }

    /// Reports `value`; carries it if nothing follows it in the chunk.
    fn finish_value(&mut self, value: String, rest: &str) -> ScanOutcome {
        let reported = value.strip_suffix('.').unwrap_or(&value).to_string();
        self.carry = if rest.is_empty() {
            Carry::Value(value)
        } else {
            trailing_carry(rest)
        };
        ScanOutcome::Reading(reported)
    }
}

/// Length of the longest numeric prefix of `s`, or 0 if it contains no digit.
fn numeric_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let mut digits = 0;
    let mut seen_dot = false;

    while let Some(&b) = bytes.get(i) {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        i += 1;
    }

    if digits == 0 {
        0
    } else {
        i
    }
}

/// Number of leading bytes of `text` that continue the number `value`.
fn continuation_len(value: &str, text: &str) -> usize {
    let mut seen_dot = value.contains('.');
    let mut n = 0;
    for b in text.bytes() {
        match b {
            b'0'..=b'9' => {}
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        n += 1;
    }
    n
}

/// Whether `s` could still grow into a number (empty, or only a sign / point).
fn is_number_start(s: &str) -> bool {
    matches!(s, "" | "+" | "-" | "." | "+." | "-.")
}

/// Carry for the text after a chunk's first match.
///
/// A later tag whose value is still open at the end of `rest` is carried
/// whole; otherwise only a trailing partial tag is.
fn trailing_carry(rest: &str) -> Carry {
    let Some(pos) = rest.rfind(TEMPERATURE_TAG) else {
        return partial_tag_suffix(rest);
    };
    let tail = &rest[pos..];
    let payload = tail[TEMPERATURE_TAG.len()..].trim_start();
    let open = is_number_start(payload) || numeric_prefix_len(payload) == payload.len();
    if !open {
        return partial_tag_suffix(rest);
    }
    if tail.len() > MAX_CARRY_LEN {
        trace!(len = tail.len(), "dropping oversized partial tag");
        return Carry::Empty;
    }
    Carry::Tag(tail.to_string())
}

/// Carries the longest proper prefix of the tag that `text` ends with.
fn partial_tag_suffix(text: &str) -> Carry {
    (1..TEMPERATURE_TAG.len())
        .rev()
        .map(|k| &TEMPERATURE_TAG[..k])
        .find(|prefix| text.ends_with(prefix))
        .map_or(Carry::Empty, |prefix| Carry::Tag(prefix.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
