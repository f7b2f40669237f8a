//! Gift-card codes and receipt tokens.
//!
//! Codes look like `GC-7KQ2-M9XD-4HTP-WZ3N`: a fixed prefix and four groups of
//! four symbols drawn from an alphabet without look-alike characters
//! (no `0/O`, `1/I/L`), roughly 79 bits from the thread-local CSPRNG.
//! Receipt tokens use a different prefix so neither can be mistaken for the other.

use rand::{distributions::Alphanumeric, Rng};

pub const CARD_CODE_PREFIX: &str = "GC-";
pub const RECEIPT_TOKEN_PREFIX: &str = "RCPT-";

const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const CODE_GROUPS: usize = 4;
const CODE_GROUP_LEN: usize = 4;
const RECEIPT_TOKEN_LEN: usize = 32;

/// Length of a well-formed card code, separators included.
pub const CARD_CODE_LEN: usize =
    CARD_CODE_PREFIX.len() + CODE_GROUPS * CODE_GROUP_LEN + (CODE_GROUPS - 1);

pub fn new_card_code() -> String {
    let mut rng = rand::thread_rng();
    let groups: Vec<String> = (0..CODE_GROUPS)
        .map(|_| {
            (0..CODE_GROUP_LEN)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect()
        })
        .collect();
    format!("{CARD_CODE_PREFIX}{}", groups.join("-"))
}

pub fn new_receipt_token() -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RECEIPT_TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("{RECEIPT_TOKEN_PREFIX}{body}")
}

/// Canonical form of user-typed input: trimmed and upper-cased.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Structural check run before any lookup. Expects normalized input.
pub fn is_well_formed_code(code: &str) -> bool {
    let Some(body) = code.strip_prefix(CARD_CODE_PREFIX) else {
        return false;
    };
    if code.len() != CARD_CODE_LEN {
        return false;
    }
    let groups: Vec<&str> = body.split('-').collect();
    groups.len() == CODE_GROUPS
        && groups.iter().all(|group| {
            group.len() == CODE_GROUP_LEN && group.bytes().all(|b| CODE_ALPHABET.contains(&b))
        })
}

pub fn is_well_formed_receipt_token(token: &str) -> bool {
    token
        .strip_prefix(RECEIPT_TOKEN_PREFIX)
        .is_some_and(|body| body.len() == RECEIPT_TOKEN_LEN && body.bytes().all(|b| b.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..100 {
            let code = new_card_code();
            assert_eq!(code.len(), CARD_CODE_LEN);
            assert!(is_well_formed_code(&code), "{code}");
        }
    }

    #[test]
    fn ten_thousand_codes_are_unique() {
        let codes: HashSet<String> = (0..10_000).map(|_| new_card_code()).collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn receipt_tokens_never_pass_as_codes() {
        let token = new_receipt_token();
        assert!(is_well_formed_receipt_token(&token));
        assert!(!is_well_formed_code(&normalize_code(&token)));
    }

    #[test]
    fn malformed_input_is_rejected() {
        for input in [
            "",
            "GC-",
            "GC-ABCD-EFGH-JKMN",
            "XX-ABCD-EFGH-JKMN-PQRS",
            "GC-ABCD-EFGH-JKMN-PQR0",
            "GC-ABCDEFGH-JKMN-PQRST",
        ] {
            assert!(!is_well_formed_code(input), "{input}");
        }
        assert!(is_well_formed_code(&normalize_code("  gc-abcd-efgh-jkmn-pqrs ")));
    }
}
