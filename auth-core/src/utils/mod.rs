pub mod backup_codes;
pub mod pattern;
pub mod totp;
