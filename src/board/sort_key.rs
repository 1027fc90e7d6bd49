//! Fractional sort keys
//!
//! Cards are ordered by string keys over a base-62 alphabet whose ASCII order
//! matches digit order. A key never ends in the zero digit, which guarantees a
//! key strictly between any two distinct keys, so inserting a card never
//! renumbers its siblings.

use crate::error::BoardError;

const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = 62;

fn digit_value(c: u8) -> Option<usize> {
    DIGITS.iter().position(|d| *d == c)
}

/// Whether `key` is a well-formed sort key.
pub fn is_valid(key: &str) -> bool {
    !key.is_empty()
        && !key.ends_with('0')
        && key.bytes().all(|b| digit_value(b).is_some())
}

/// Returns a key strictly between `lower` and `upper`.
///
/// `None` stands for the open end of the range, so `key_between(None, None)`
/// yields the first key of an empty column and `key_between(Some(last), None)`
/// appends after the last card.
pub fn key_between(lower: Option<&str>, upper: Option<&str>) -> Result<String, BoardError> {
    let invalid = || BoardError::InvalidSortKey {
        lower: lower.unwrap_or_default().to_string(),
        upper: upper.unwrap_or_default().to_string(),
    };

    if lower.is_some_and(|k| !is_valid(k)) || upper.is_some_and(|k| !is_valid(k)) {
        return Err(invalid());
    }
    if let (Some(a), Some(b)) = (lower, upper) {
        if a >= b {
            return Err(invalid());
        }
    }

    Ok(midpoint(lower.unwrap_or("").as_bytes(), upper.map(str::as_bytes)))
}

/// Midpoint of two digit strings, `a < b`, with `b == None` meaning 1.0.
fn midpoint(a: &[u8], b: Option<&[u8]>) -> String {
    if let Some(b) = b {
        // Shared prefix, padding `a` with zero digits
        let mut n = 0;
        while n < b.len() && a.get(n).copied().unwrap_or(DIGITS[0]) == b[n] {
            n += 1;
        }
        if n > 0 {
            let prefix = String::from_utf8_lossy(&b[..n]).into_owned();
            let rest_a = if n < a.len() { &a[n..] } else { &[][..] };
            return prefix + &midpoint(rest_a, Some(&b[n..]));
        }
    }

    let digit_a = a.first().and_then(|c| digit_value(*c)).unwrap_or(0);
    let digit_b = b
        .and_then(|b| b.first())
        .and_then(|c| digit_value(*c))
        .unwrap_or(BASE);

    if digit_b - digit_a > 1 {
        let mid = (digit_a + digit_b).div_ceil(2);
        return (DIGITS[mid] as char).to_string();
    }

    match b {
        Some(b) if b.len() > 1 => String::from_utf8_lossy(&b[..1]).into_owned(),
        _ => {
            let rest_a = if a.len() > 1 { &a[1..] } else { &[][..] };
            let mut key = (DIGITS[digit_a] as char).to_string();
            key.push_str(&midpoint(rest_a, None));
            key
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_key() {
        let key = key_between(None, None).unwrap();
        assert!(is_valid(&key));
    }

    #[test]
    fn test_append_is_increasing() {
        let mut last = key_between(None, None).unwrap();
        for _ in 0..200 {
            let next = key_between(Some(&last), None).unwrap();
            assert!(next > last, "{next} should sort after {last}");
            assert!(is_valid(&next));
            last = next;
        }
    }

    #[test]
    fn test_prepend_is_decreasing() {
        let mut first = key_between(None, None).unwrap();
        for _ in 0..50 {
            let prev = key_between(None, Some(&first)).unwrap();
            assert!(prev < first, "{prev} should sort before {first}");
            assert!(is_valid(&prev));
            first = prev;
        }
    }

    #[test]
    fn test_repeated_bisection_always_finds_midpoint() {
        let lower = key_between(None, None).unwrap();
        let mut upper = key_between(Some(&lower), None).unwrap();
        for _ in 0..100 {
            let mid = key_between(Some(&lower), Some(&upper)).unwrap();
            assert!(lower < mid && mid < upper, "{lower} < {mid} < {upper}");
            upper = mid;
        }
    }

    #[test]
    fn test_adjacent_digits() {
        let mid = key_between(Some("a"), Some("b")).unwrap();
        assert!("a" < mid.as_str() && mid.as_str() < "b");
        let mid = key_between(Some("a"), Some("a1")).unwrap();
        assert!("a" < mid.as_str() && mid.as_str() < "a1");
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(key_between(Some("b"), Some("a")).is_err());
        assert!(key_between(Some("a"), Some("a")).is_err());
        assert!(key_between(Some("a0"), None).is_err());
        assert!(key_between(Some("a-"), None).is_err());
    }
}
