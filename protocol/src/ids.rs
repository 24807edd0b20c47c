//! Identifier generation.
//!
//! Internal identifiers are UUID v4 strings. The public codes users type or
//! read to each other (vault ids for accounts, VTIDs for transactions) are
//! short random strings over [`CODE_ALPHABET`]; callers pass an `exists`
//! probe so a collision is retried instead of silently reused.

use rand::Rng;
use uuid::Uuid;

use crate::config::{
    CODE_ALPHABET, MAX_CODE_ATTEMPTS, VAULT_ID_LENGTH, VAULT_ID_PREFIX, VTID_LENGTH, VTID_PREFIX,
};

/// Fresh internal id for an account or transaction.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A random code: `prefix` followed by `len` alphabet characters.
pub fn random_code(prefix: &str, len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(prefix.len() + len);
    code.push_str(prefix);
    for _ in 0..len {
        let idx = rng.gen_range(0..CODE_ALPHABET.len());
        code.push(CODE_ALPHABET[idx] as char);
    }
    code
}

/// Generates a vault id not rejected by `exists`.
///
/// Returns `Ok(None)` when every attempt collided.
pub fn generate_vault_id<E>(
    exists: impl FnMut(&str) -> Result<bool, E>,
) -> Result<Option<String>, E> {
    generate_unique(VAULT_ID_PREFIX, VAULT_ID_LENGTH, exists)
}

/// Generates a transaction reference code (VTID) not rejected by `exists`.
pub fn generate_vtid<E>(exists: impl FnMut(&str) -> Result<bool, E>) -> Result<Option<String>, E> {
    generate_unique(VTID_PREFIX, VTID_LENGTH, exists)
}

fn generate_unique<E>(
    prefix: &str,
    len: usize,
    mut exists: impl FnMut(&str) -> Result<bool, E>,
) -> Result<Option<String>, E> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = random_code(prefix, len);
        if !exists(&code)? {
            return Ok(Some(code));
        }
    }
    Ok(None)
}

/// Normalizes a user-typed public code: trims and upper-cases.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}
