//! End-to-end authentication flows against in-memory storage.

mod common;

use std::time::{Duration, Instant};

use common::{DOCTOR_PASSWORD, config, device, harness, harness_with};
use medrec_auth::AuthError;
use medrec_auth::storage::RoleStorage;

#[tokio::test]
async fn doctor_login_returns_roles_and_tokens() {
    let h = harness();
    let doctor = h.doctor().await;

    let pair = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .expect("login succeeds");

    assert_eq!(pair.user.id, doctor.id);
    assert!(pair.user.roles.contains(&"Doctor".to_string()));
    assert_eq!(pair.expires_in, 900);
    assert_eq!(pair.refresh_token.len(), 128);
    assert!(pair.refresh_token.chars().all(|c| c.is_ascii_hexdigit()));

    let claims = h
        .service
        .issuer()
        .verify_access(&pair.access_token)
        .expect("access token verifies");
    assert_eq!(claims.sub, doctor.id.to_string());
    assert_eq!(claims.roles, vec!["Doctor"]);
    assert_eq!(claims.iss, "medrec");
    assert_eq!(claims.lifetime_secs(), 900);
}

#[tokio::test]
async fn sixth_attempt_is_locked_even_with_correct_password() {
    let h = harness();
    h.doctor().await;

    for _ in 0..5 {
        let err = h
            .service
            .login("dr.house", "Wrong-Guess-Again-1", device("203.0.113.9"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    }

    let err = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("203.0.113.9"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, AuthError::AccountLocked { .. }),
        "expected lockout, got {err:?}"
    );

    // Another origin is tracked separately.
    assert!(
        h.service
            .login("dr.house", DOCTOR_PASSWORD, device("198.51.100.4"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn success_before_limit_resets_failure_count() {
    let h = harness();
    h.doctor().await;
    let origin = device("10.9.9.9");

    for _ in 0..4 {
        let _ = h.service.login("dr.house", "nope", origin.clone()).await;
    }
    h.service
        .login("dr.house", DOCTOR_PASSWORD, origin.clone())
        .await
        .expect("fifth attempt succeeds");

    let err = h
        .service
        .login("dr.house", "nope", origin)
        .await
        .unwrap_err();
    match err {
        AuthError::InvalidCredentials { remaining_attempts } => {
            assert_eq!(remaining_attempts, Some(4));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn logout_then_refresh_fails() {
    let h = harness();
    let doctor = h.doctor().await;
    let pair = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();

    let revoked = h.service.logout(doctor.id, false, None).await.unwrap();
    assert_eq!(revoked, 1);

    let err = h
        .service
        .refresh(&pair.refresh_token, device("10.1.0.7"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials { .. }));
}

#[tokio::test]
async fn single_device_logout_keeps_other_sessions() {
    let h = harness();
    let doctor = h.doctor().await;
    let laptop = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();
    let tablet = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.8"))
        .await
        .unwrap();

    let revoked = h
        .service
        .logout(doctor.id, false, Some(&laptop.refresh_token))
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    assert!(
        h.service
            .refresh(&laptop.refresh_token, device("10.1.0.7"))
            .await
            .is_err()
    );
    assert!(
        h.service
            .refresh(&tablet.refresh_token, device("10.1.0.8"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn all_devices_logout_ignores_presented_token() {
    let h = harness();
    let doctor = h.doctor().await;
    let first = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();
    h.service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.8"))
        .await
        .unwrap();

    let revoked = h
        .service
        .logout(doctor.id, true, Some(&first.refresh_token))
        .await
        .unwrap();
    assert_eq!(revoked, 2);
    assert!(h.service.list_sessions(doctor.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn rotation_invalidates_consumed_secret() {
    let h = harness();
    h.doctor().await;
    let first = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();

    let second = h
        .service
        .refresh(&first.refresh_token, device("10.1.0.7"))
        .await
        .expect("first rotation");
    assert_ne!(second.refresh_token, first.refresh_token);

    assert!(
        h.service
            .refresh(&first.refresh_token, device("10.1.0.7"))
            .await
            .is_err()
    );

    let third = h
        .service
        .refresh(&second.refresh_token, device("10.1.0.7"))
        .await
        .expect("second rotation");
    assert!(
        h.service
            .refresh(&second.refresh_token, device("10.1.0.7"))
            .await
            .is_err()
    );
    assert_eq!(third.user.username, "dr.house");
}

#[tokio::test]
async fn refresh_picks_up_role_changes() {
    let h = harness();
    let doctor = h.doctor().await;
    let pair = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();

    h.roles.assign_role(doctor.id, "Auditor").await.unwrap();
    h.roles.unassign_role(doctor.id, "Doctor").await.unwrap();

    let rotated = h
        .service
        .refresh(&pair.refresh_token, device("10.1.0.7"))
        .await
        .unwrap();
    assert_eq!(rotated.user.roles, vec!["Auditor"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_double_refresh_has_single_winner() {
    let h = harness();
    h.doctor().await;
    let pair = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let service = h.service.clone();
        let secret = pair.refresh_token.clone();
        tasks.push(tokio::spawn(async move {
            service.refresh(&secret, device("10.1.0.7")).await
        }));
    }

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, AuthError::InvalidCredentials { .. })),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(h.refresh_tokens.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wrong_logins_get_at_most_max_attempts_checks() {
    let h = harness();
    h.doctor().await;

    let mut tasks = Vec::new();
    for _ in 0..30 {
        let service = h.service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .login("dr.house", "Wrong-Guess-Again-1", device("203.0.113.77"))
                .await
        }));
    }

    let (mut checked, mut locked) = (0, 0);
    for task in tasks {
        match task.await.unwrap() {
            Err(AuthError::InvalidCredentials { .. }) => checked += 1,
            Err(AuthError::AccountLocked { .. }) => locked += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(checked, 5);
    assert_eq!(locked, 25);

    let err = h
        .service
        .login("dr.house", DOCTOR_PASSWORD, device("203.0.113.77"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));
}

#[tokio::test]
async fn unknown_user_and_wrong_password_are_indistinguishable() {
    let delay = Duration::from_millis(100);
    let h = harness_with(&config(delay));
    h.doctor().await;

    let started = Instant::now();
    let ghost = h
        .service
        .login("ghost", "Wrong-Guess-Again-1", device("10.2.0.1"))
        .await
        .unwrap_err();
    let ghost_elapsed = started.elapsed();

    let started = Instant::now();
    let known = h
        .service
        .login("dr.house", "Wrong-Guess-Again-1", device("10.2.0.1"))
        .await
        .unwrap_err();
    let known_elapsed = started.elapsed();

    assert!(matches!(ghost, AuthError::InvalidCredentials { .. }));
    assert!(matches!(known, AuthError::InvalidCredentials { .. }));
    assert_eq!(ghost.to_string(), known.to_string());
    assert_eq!(ghost.error_code(), known.error_code());

    assert!(ghost_elapsed >= delay);
    assert!(known_elapsed >= delay);
    let gap = ghost_elapsed.abs_diff(known_elapsed);
    assert!(gap < Duration::from_millis(250), "latency gap {gap:?}");
}

#[tokio::test]
async fn sessions_list_active_records_without_secrets() {
    let h = harness();
    let doctor = h.doctor().await;
    h.service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();
    h.service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.8"))
        .await
        .unwrap();

    let sessions = h.service.list_sessions(doctor.id).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.device_name == "Firefox on Linux"));

    let json = serde_json::to_string(&sessions).unwrap();
    assert!(!json.contains("argon2"));
}

#[tokio::test]
async fn purge_removes_nothing_fresh() {
    let h = harness();
    h.doctor().await;
    h.service
        .login("dr.house", DOCTOR_PASSWORD, device("10.1.0.7"))
        .await
        .unwrap();
    assert_eq!(h.service.purge_expired_tokens().await.unwrap(), 0);
    assert_eq!(h.refresh_tokens.len(), 1);
}
