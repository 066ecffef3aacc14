mod common;

use auth_core::models::{AuditEventType, AuditOutcome, MfaMethod};
use auth_core::services::AuthError;
use auth_core::utils::totp;
use common::{current_totp, test_config, wrong_totp, TestCore};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn enrolled(t: &TestCore, user_id: &str) -> auth_core::models::EnrollmentSecrets {
    let secrets = assert_ok!(t.core.mfa.enroll_user(user_id, None));
    let code = current_totp(&secrets.secret);
    assert!(assert_ok!(t.core.mfa.confirm_enrollment(user_id, &code)));
    secrets
}

#[test]
fn test_enroll_then_confirm_scenario() {
    let t = TestCore::new(test_config());
    let mfa = &t.core.mfa;

    let secrets = assert_ok!(mfa.enroll_user("u1", None));
    assert_eq!(secrets.backup_codes.len(), 10);
    assert!(secrets.backup_codes.iter().all(|c| c.len() == 8));
    assert_eq!(assert_ok!(totp::base32_decode(&secrets.secret)).len(), 20);
    assert!(secrets
        .provisioning_uri
        .starts_with("otpauth://totp/AuthCore:u1?secret="));
    assert_eq!(secrets.manual_entry_key.replace(' ', ""), secrets.secret);

    assert!(!assert_ok!(mfa.confirm_enrollment("u1", &wrong_totp(&secrets.secret))));
    assert!(!mfa.is_enrolled("u1"));
    assert!(mfa.status("u1").enrolled);
    assert!(!mfa.status("u1").confirmed);

    assert!(assert_ok!(mfa.confirm_enrollment("u1", &current_totp(&secrets.secret))));
    assert!(mfa.is_enrolled("u1"));

    let err = assert_err!(mfa.confirm_enrollment("u1", &current_totp(&secrets.secret)));
    assert!(matches!(err, AuthError::MfaAlreadyEnrolled));
    let err = assert_err!(mfa.confirm_enrollment("nobody", "123456"));
    assert!(matches!(err, AuthError::MfaNotEnrolled));
}

#[test]
fn test_verify_totp_and_adjacent_steps() {
    let t = TestCore::new(test_config());
    let secrets = enrolled(&t, "u1");
    let key = assert_ok!(totp::base32_decode(&secrets.secret));
    let now = chrono::Utc::now().timestamp() as u64;

    let previous = assert_ok!(totp::totp(&key, now - 30, 30, 6));
    let result = assert_ok!(t.core.mfa.verify("u1", &previous));
    assert!(result.valid);
    assert_eq!(result.method, Some(MfaMethod::Totp));
    assert_eq!(result.backup_codes_remaining, None);

    // Formatting is forgiven.
    let current = current_totp(&secrets.secret);
    let spaced = format!("{} {}", &current[..3], &current[3..]);
    assert!(assert_ok!(t.core.mfa.verify("u1", &spaced)).valid);

    let rejected = assert_ok!(t.core.mfa.verify("u1", &wrong_totp(&secrets.secret)));
    assert!(!rejected.valid);
    assert_eq!(rejected.method, None);
}

#[test]
fn test_backup_code_is_single_use() {
    let t = TestCore::new(test_config());
    let secrets = enrolled(&t, "u1");
    let code = secrets.backup_codes[3].clone();

    let dashed = format!("{}-{}", &code[..4], code[4..].to_lowercase());
    let first = assert_ok!(t.core.mfa.verify("u1", &dashed));
    assert!(first.valid);
    assert_eq!(first.method, Some(MfaMethod::BackupCode));
    assert_eq!(first.backup_codes_remaining, Some(9));

    let second = assert_ok!(t.core.mfa.verify("u1", &code));
    assert!(!second.valid);
    assert_eq!(t.core.mfa.backup_codes_remaining("u1"), 9);
}

#[tokio::test]
async fn test_rate_limit_blocks_correct_code_until_window_passes() {
    let mut config = test_config();
    config.mfa.max_attempts = 3;
    config.mfa.attempt_window_ms = 1_000;
    let mut t = TestCore::new(config);
    let secrets = enrolled(&t, "u1");
    t.drain_audit();

    for _ in 0..3 {
        assert!(!assert_ok!(t.core.mfa.verify("u1", "ZZZZZZZZ")).valid);
    }

    let err = assert_err!(t.core.mfa.verify("u1", &current_totp(&secrets.secret)));
    match err {
        AuthError::RateLimitExceeded { retry_after_secs } => assert!(retry_after_secs >= 1),
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert!(t
        .drain_audit()
        .iter()
        .any(|e| e.event_type == AuditEventType::MfaVerified && e.outcome == AuditOutcome::Blocked));

    // Other users are unaffected.
    let other = enrolled(&t, "u2");
    assert!(assert_ok!(t.core.mfa.verify("u2", &current_totp(&other.secret))).valid);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(assert_ok!(t.core.mfa.verify("u1", &current_totp(&secrets.secret))).valid);
}

#[test]
fn test_success_resets_failure_count() {
    let mut config = test_config();
    config.mfa.max_attempts = 3;
    let t = TestCore::new(config);
    let secrets = enrolled(&t, "u1");

    for _ in 0..2 {
        assert!(!assert_ok!(t.core.mfa.verify("u1", "ZZZZZZZZ")).valid);
    }
    assert!(assert_ok!(t.core.mfa.verify("u1", &current_totp(&secrets.secret))).valid);
    for _ in 0..2 {
        assert!(!assert_ok!(t.core.mfa.verify("u1", "ZZZZZZZZ")).valid);
    }
    // Two failures since the reset, still under the limit.
    assert!(assert_ok!(t.core.mfa.verify("u1", &current_totp(&secrets.secret))).valid);
}

#[test]
fn test_disable_requires_current_otp() {
    let mut t = TestCore::new(test_config());
    let secrets = enrolled(&t, "u1");

    assert!(!assert_ok!(t.core.mfa.disable("u1", &wrong_totp(&secrets.secret))));
    assert!(t.core.mfa.is_enrolled("u1"));

    assert!(assert_ok!(t.core.mfa.disable("u1", &current_totp(&secrets.secret))));
    assert!(!t.core.mfa.is_enrolled("u1"));
    assert!(!t.core.mfa.status("u1").enrolled);
    assert!(matches!(
        t.core.mfa.verify("u1", &current_totp(&secrets.secret)),
        Err(AuthError::MfaNotEnrolled)
    ));

    let events = t.drain_audit();
    assert!(events
        .iter()
        .any(|e| e.event_type == AuditEventType::MfaDisabled));
    // No plaintext secret or code ever reaches the audit stream.
    let serialized = serde_json::to_string(&events).expect("serialize");
    assert!(!serialized.contains(&secrets.secret));
    assert!(secrets
        .backup_codes
        .iter()
        .all(|code| !serialized.contains(code.as_str())));
}

#[test]
fn test_regenerate_backup_codes() {
    let t = TestCore::new(test_config());
    let secrets = enrolled(&t, "u1");
    let old_code = secrets.backup_codes[0].clone();

    assert_eq!(
        assert_ok!(t.core.mfa.regenerate_backup_codes("u1", &wrong_totp(&secrets.secret))),
        None
    );

    let fresh = assert_ok!(t
        .core
        .mfa
        .regenerate_backup_codes("u1", &current_totp(&secrets.secret)))
    .expect("codes issued");
    assert_eq!(fresh.len(), 10);
    assert_eq!(t.core.mfa.backup_codes_remaining("u1"), 10);

    assert!(!assert_ok!(t.core.mfa.verify("u1", &old_code)).valid);
    let result = assert_ok!(t.core.mfa.verify("u1", &fresh[0]));
    assert!(result.valid);
    assert_eq!(result.backup_codes_remaining, Some(9));
}

#[test]
fn test_regenerate_without_enrollment_is_error() {
    let t = TestCore::new(test_config());
    let err = assert_err!(t.core.mfa.regenerate_backup_codes("ghost", "123456"));
    assert!(matches!(err, AuthError::MfaNotEnrolled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_guesses_cannot_exceed_attempt_limit() {
    let t = TestCore::new(test_config());
    let secrets = enrolled(&t, "u1");

    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let mfa = Arc::clone(&t.core.mfa);
            let barrier = Arc::clone(&barrier);
            tokio::task::spawn_blocking(move || {
                barrier.wait();
                mfa.verify("u1", "ZZZZZZZZ")
            })
        })
        .collect();

    let mut evaluated = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(verification) => {
                assert!(!verification.valid);
                evaluated += 1;
            }
            Err(AuthError::RateLimitExceeded { .. }) => limited += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(evaluated, 5);
    assert_eq!(limited, 11);
    let err = assert_err!(t.core.mfa.verify("u1", &current_totp(&secrets.secret)));
    assert!(matches!(err, AuthError::RateLimitExceeded { .. }));
}
