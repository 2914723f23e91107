//! The page key codec.
//!
//! Page keys are the public form of database row ids: base-52 strings over
//! `a-zA-Z`, shortest-first (`a` is 0, `Z` is 51, `ba` is 52). Keys appear
//! in print as the left marker's payload, so shorter is better.

use crate::error::{ServerError, ServerResult};

const PAGE_KEY_CHARS: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const BASE: i64 = 52;

/// Encode a row id as a page key.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn encode_page_key(id: i64) -> String {
    debug_assert!(id >= 0);
    let mut id = id.max(0);
    let mut out = Vec::new();
    while id >= BASE {
        out.push(PAGE_KEY_CHARS[(id % BASE) as usize]);
        id /= BASE;
    }
    out.push(PAGE_KEY_CHARS[id as usize]);
    out.reverse();
    // Safety of from_utf8: the alphabet is ASCII.
    String::from_utf8(out).unwrap_or_default()
}

/// Decode a page key back to its row id.
///
/// # Errors
///
/// Returns [`ServerError::InvalidPageKey`] for empty keys, characters
/// outside the alphabet, or values that overflow an `i64`.
pub fn decode_page_key(key: &str) -> ServerResult<i64> {
    if key.is_empty() {
        return Err(ServerError::InvalidPageKey);
    }
    let mut id: i64 = 0;
    for byte in key.bytes() {
        let digit = PAGE_KEY_CHARS
            .iter()
            .position(|c| *c == byte)
            .ok_or(ServerError::InvalidPageKey)?;
        id = id
            .checked_mul(BASE)
            .and_then(|v| v.checked_add(digit_to_i64(digit)))
            .ok_or(ServerError::InvalidPageKey)?;
    }
    Ok(id)
}

#[allow(clippy::cast_possible_wrap)]
fn digit_to_i64(digit: usize) -> i64 {
    digit as i64
}
