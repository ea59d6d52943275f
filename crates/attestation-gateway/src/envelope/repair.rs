// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Matter Labs

//! Quoting of bare object keys in submitted evidence.
//!
//! Some attestation agents emit `attestation:{...}` instead of
//! `"attestation":{...}`. Only a bare identifier in key position (directly
//! after `{` or `,`) whose value is an object gets quoted. Everything inside
//! string literals is copied verbatim, so a report value containing
//! `foo:{` is never rewritten.

/// Quote every bare identifier that is used as a key for an object value.
///
/// Text without such keys is returned unchanged.
pub fn quote_bare_object_keys(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 16);
    // last non-whitespace byte seen outside a string literal
    let mut last_significant: Option<u8> = None;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'"' {
            i = skip_string(bytes, i);
            last_significant = Some(b'"');
            continue;
        }

        if is_ident_start(b) && matches!(last_significant, Some(b'{') | Some(b',')) {
            let start = i;
            let mut end = i + 1;
            while end < bytes.len() && is_ident_continue(bytes[end]) {
                end += 1;
            }
            if is_followed_by_object(bytes, end) {
                out.push_str(&text[copied..start]);
                out.push('"');
                out.push_str(&text[start..end]);
                out.push('"');
                copied = end;
            }
            last_significant = Some(bytes[end - 1]);
            i = end;
            continue;
        }

        if !b.is_ascii_whitespace() {
            last_significant = Some(b);
        }
        i += 1;
    }

    out.push_str(&text[copied..]);
    out
}

/// Returns the index just past the string literal starting at `start`.
/// An unterminated literal runs to the end of the input.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// `<ws>* ':' <ws>* '{'`
fn is_followed_by_object(bytes: &[u8], mut i: usize) -> bool {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if bytes.get(i) != Some(&b':') {
        return false;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    bytes.get(i) == Some(&b'{')
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'-'
}
