//! HOTP/TOTP (RFC 4226 / RFC 6238) and the Base32 encoding used for secrets.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;
use totp_rs::Secret;

type HmacSha1 = Hmac<Sha1>;

/// Length of generated secrets in bytes (160 bits, the RFC 4226 recommendation).
pub const SECRET_LENGTH: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Base32Error {
    #[error("invalid base32 secret")]
    Invalid,
}

/// Encode bytes as unpadded RFC 4648 Base32.
pub fn base32_encode(data: &[u8]) -> String {
    Secret::Raw(data.to_vec()).to_encoded().to_string()
}

/// Decode Base32. Case-insensitive; padding, spaces and dashes are ignored.
pub fn base32_decode(input: &str) -> Result<Vec<u8>, Base32Error> {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, '=' | ' ' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    Secret::Encoded(cleaned)
        .to_bytes()
        .map_err(|_| Base32Error::Invalid)
}

/// Generate a fresh random secret.
pub fn generate_secret() -> Vec<u8> {
    use rand::RngCore;

    let mut secret = vec![0u8; SECRET_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    secret
}

/// Split a Base32 secret into space-separated groups of four for manual entry.
pub fn format_secret_for_display(secret: &str) -> String {
    secret
        .as_bytes()
        .chunks(4)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute an HOTP value using HMAC-SHA1 and dynamic truncation.
pub fn hotp(secret: &[u8], counter: u64, digits: u32) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[19] & 0x0f);
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    let modulus = 10u32.pow(digits);
    Ok(format!(
        "{:0width$}",
        binary % modulus,
        width = digits as usize
    ))
}

/// Time step counter for a Unix timestamp.
pub fn time_step(unix_seconds: u64, step_seconds: u64) -> u64 {
    unix_seconds / step_seconds
}

/// Compute the TOTP value for a Unix timestamp.
pub fn totp(
    secret: &[u8],
    unix_seconds: u64,
    step_seconds: u64,
    digits: u32,
) -> Result<String, anyhow::Error> {
    hotp(secret, time_step(unix_seconds, step_seconds), digits)
}

/// Verify `code` against the current step and `window` steps either side.
///
/// Every candidate is compared in constant time and the loop does not exit
/// early, so timing does not reveal which step matched.
pub fn verify_totp(
    secret: &[u8],
    code: &str,
    unix_seconds: u64,
    step_seconds: u64,
    digits: u32,
    window: u64,
) -> Result<bool, anyhow::Error> {
    if code.len() != digits as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }

    let current = time_step(unix_seconds, step_seconds);
    let first = current.saturating_sub(window);
    let last = current.saturating_add(window);

    let mut matched = subtle::Choice::from(0u8);
    for counter in first..=last {
        let candidate = hotp(secret, counter, digits)?;
        matched |= candidate.as_bytes().ct_eq(code.as_bytes());
    }
    Ok(matched.into())
}

/// Build an `otpauth://` URI understood by standard authenticator apps.
pub fn provisioning_uri(
    issuer: &str,
    account: &str,
    secret_base32: &str,
    digits: u32,
    period: u64,
) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={digits}&period={period}",
        issuer = urlencoding::encode(issuer),
        account = urlencoding::encode(account),
        secret = secret_base32,
        digits = digits,
        period = period,
    )
}
