//! Single-use backup code generation and verification.
//!
//! Codes avoid visually ambiguous characters (0/O, 1/I/L) and are stored as
//! Argon2id PHC strings with a per-code salt.

use argon2::{
    password_hash::{
        rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use rand::{rngs::OsRng, Rng};

const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Normalize user input: drop spaces and dashes, uppercase the rest.
pub fn normalize_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Generate `count` plaintext codes of `length` characters.
pub fn generate_codes(count: usize, length: usize) -> Vec<String> {
    let mut rng = OsRng;
    (0..count)
        .map(|_| {
            (0..length)
                .map(|_| {
                    let idx = rng.gen_range(0..BACKUP_CODE_ALPHABET.len());
                    char::from(BACKUP_CODE_ALPHABET[idx])
                })
                .collect()
        })
        .collect()
}

/// Hash a code with Argon2id and a fresh salt.
pub fn hash_code(code: &str) -> Result<String, anyhow::Error> {
    let salt = SaltString::generate(&mut SaltRng);
    let hash = Argon2::default()
        .hash_password(normalize_code(code).as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash backup code: {}", e))?
        .to_string();
    Ok(hash)
}

/// Hash a batch of plaintext codes.
pub fn hash_codes(codes: &[String]) -> Result<Vec<String>, anyhow::Error> {
    codes.iter().map(|code| hash_code(code)).collect()
}

/// Find the stored hash matching `code`, if any.
///
/// All hashes are checked even after a match so the running time does not
/// depend on the position of the matching code.
pub fn find_matching_code(code: &str, stored_hashes: &[String]) -> Option<usize> {
    let normalized = normalize_code(code);
    if normalized.is_empty() {
        return None;
    }

    let argon2 = Argon2::default();
    let mut found = None;
    for (index, stored) in stored_hashes.iter().enumerate() {
        if verify_code(&argon2, &normalized, stored) && found.is_none() {
            found = Some(index);
        }
    }
    found
}

fn verify_code(argon2: &Argon2<'_>, normalized: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    argon2
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok()
}
