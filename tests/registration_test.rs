//! Tests for components/registration.rs

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{Harness, token};
use kodegen_native_push::*;

#[tokio::test]
async fn test_first_update_always_submits() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();

    assert!(coordinator.should_update_registration());
    assert!(coordinator.update_registration().await);
    assert_eq!(harness.provider.submission_count(), 1);
    assert!(!coordinator.should_update_registration());
}

#[tokio::test]
async fn test_repeated_updates_without_changes_submit_once() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();

    for _ in 0..5 {
        assert!(coordinator.update_registration().await);
    }
    assert_eq!(harness.provider.submission_count(), 1);
}

#[tokio::test]
async fn test_same_device_token_twice_is_idempotent() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.update_registration().await;

    assert!(coordinator.record_device_token(token(1)));
    assert!(coordinator.update_registration().await);
    assert_eq!(harness.provider.submission_count(), 2);

    // Same token again: nothing to submit
    assert!(!coordinator.record_device_token(token(1)));
    assert!(!coordinator.should_update_registration());
    assert_eq!(coordinator.notify_device_token_received(token(1)).await, Some(true));
    assert_eq!(harness.provider.submission_count(), 2);
}

#[tokio::test]
async fn test_dirty_flag_lifecycle() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.update_registration().await;
    assert!(!coordinator.should_update_registration());

    // Authorization change raises the flag
    assert!(coordinator.record_authorization(
        AuthorizationStatus::Authorized,
        AuthorizedSettings::ALERT
    ));
    assert!(coordinator.should_update_registration());

    // Successful submit clears it
    assert!(coordinator.update_registration().await);
    assert!(!coordinator.should_update_registration());

    // Unchanged authorization does not
    assert!(!coordinator.record_authorization(
        AuthorizationStatus::Authorized,
        AuthorizedSettings::ALERT
    ));
    assert!(!coordinator.should_update_registration());

    // Failed submit leaves it raised
    coordinator.record_authorization(AuthorizationStatus::Denied, AuthorizedSettings::empty());
    harness.provider.script(&[false]);
    assert!(!coordinator.update_registration().await);
    assert!(coordinator.should_update_registration());

    // Next trigger retries
    assert_eq!(coordinator.trigger_update().await, Some(true));
    assert!(!coordinator.should_update_registration());
    assert_eq!(harness.provider.submission_count(), 4);
}

#[tokio::test]
async fn test_token_then_authorization_scenario() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.update_registration().await;

    // Token arrives
    assert!(coordinator.record_device_token(token(0xab)));
    assert!(coordinator.should_update_registration());
    assert!(coordinator.update_registration().await);
    assert!(!coordinator.should_update_registration());

    // Authorization arrives
    coordinator.record_authorization(AuthorizationStatus::Authorized, AuthorizedSettings::ALERT);
    assert!(coordinator.should_update_registration());
    assert!(coordinator.update_registration().await);
    assert!(!coordinator.should_update_registration());

    let payload = harness.provider.last_submission().expect("submitted");
    assert_eq!(payload.device_token, Some(token(0xab)));
    assert_eq!(payload.authorization_status, AuthorizationStatus::Authorized);
    assert_eq!(payload.channel_id.as_deref(), Some("channel-id"));
    assert_eq!(harness.provider.submission_count(), 3);
}

#[tokio::test]
async fn test_concurrent_updates_are_coalesced() {
    let harness = Harness::new();
    let coordinator = Arc::new(harness.coordinator());
    harness.provider.hold();

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.update_registration().await })
    };
    harness.provider.entered.notified().await;

    let second = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.update_registration().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second caller waits for the in-flight update
    assert!(!second.is_finished());
    assert_eq!(harness.provider.submission_count(), 1);

    harness.provider.release();
    assert!(first.await.expect("first update"));
    assert!(second.await.expect("second update"));

    // The waiter saw the flag cleared and submitted nothing
    assert_eq!(harness.provider.submission_count(), 1);
    assert_eq!(harness.provider.max_in_flight(), 1);
}

#[tokio::test]
async fn test_waiter_retries_after_failed_update() {
    let harness = Harness::new();
    let coordinator = Arc::new(harness.coordinator());
    harness.provider.script(&[false]);
    harness.provider.hold();

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.update_registration().await })
    };
    harness.provider.entered.notified().await;

    let second = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.update_registration().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.provider.release();

    assert!(!first.await.expect("first update"));
    assert!(second.await.expect("second update"));
    assert_eq!(harness.provider.submission_count(), 2);
    assert_eq!(harness.provider.max_in_flight(), 1);
    assert!(!coordinator.should_update_registration());
}

#[tokio::test]
async fn test_change_during_update_keeps_flag_raised() {
    let harness = Harness::new();
    let coordinator = Arc::new(harness.coordinator());
    harness.provider.hold();

    let update = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.update_registration().await })
    };
    harness.provider.entered.notified().await;

    // Token lands while the payload built without it is in flight
    coordinator.record_device_token(token(7));
    harness.provider.release();

    assert!(update.await.expect("update"));
    assert!(coordinator.should_update_registration());
    assert_eq!(harness.provider.last_submission().expect("payload").device_token, None);

    assert!(coordinator.update_registration().await);
    assert_eq!(
        harness.provider.last_submission().expect("payload").device_token,
        Some(token(7))
    );
    assert!(!coordinator.should_update_registration());
}

#[tokio::test]
async fn test_token_registration_failure_keeps_state() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.record_device_token(token(3));

    coordinator.notify_device_token_registration_failed(&"no network");

    assert_eq!(coordinator.device_token(), Some(token(3)));
    assert!(coordinator.should_update_registration());
}

#[tokio::test]
async fn test_state_rehydrates_from_store() {
    let harness = Harness::new();
    {
        let coordinator = harness.coordinator();
        coordinator.record_device_token(token(9));
        coordinator.record_authorization(
            AuthorizationStatus::Provisional,
            AuthorizedSettings::NOTIFICATION_CENTER,
        );
    }

    let coordinator = harness.coordinator();
    assert_eq!(coordinator.device_token(), Some(token(9)));
    let snapshot = coordinator.authorization_snapshot();
    assert_eq!(snapshot.status, AuthorizationStatus::Provisional);
    assert_eq!(snapshot.granted_settings, AuthorizedSettings::NOTIFICATION_CENTER);
    assert!(snapshot.prompted_before);
    assert!(coordinator.should_update_registration());
}

#[tokio::test]
async fn test_restart_with_unchanged_payload_skips_submission() {
    let harness = Harness::new();
    {
        let coordinator = harness.coordinator();
        coordinator.record_device_token(token(4));
        assert!(coordinator.update_registration().await);
    }
    assert_eq!(harness.provider.submission_count(), 1);
    assert!(harness.store.get(keys::LAST_REGISTRATION_PAYLOAD).is_some());

    // Same store, nothing changed: the flag clears without a provider call
    let coordinator = harness.coordinator();
    assert!(coordinator.should_update_registration());
    assert!(coordinator.update_registration().await);
    assert!(!coordinator.should_update_registration());
    assert_eq!(harness.provider.submission_count(), 1);
}

#[tokio::test]
async fn test_restart_with_changed_payload_submits() {
    let harness = Harness::new();
    {
        let coordinator = harness.coordinator();
        coordinator.record_device_token(token(4));
        assert!(coordinator.update_registration().await);
    }

    let coordinator = harness.coordinator();
    coordinator.record_device_token(token(5));
    assert!(coordinator.update_registration().await);
    assert_eq!(harness.provider.submission_count(), 2);
    assert_eq!(
        harness.provider.last_submission().expect("payload").device_token,
        Some(token(5))
    );
}

#[tokio::test]
async fn test_failed_submission_is_not_remembered() {
    let harness = Harness::new();
    harness.provider.script(&[false]);
    {
        let coordinator = harness.coordinator();
        assert!(!coordinator.update_registration().await);
    }
    assert!(harness.store.get(keys::LAST_REGISTRATION_PAYLOAD).is_none());

    let coordinator = harness.coordinator();
    assert!(coordinator.update_registration().await);
    assert_eq!(harness.provider.submission_count(), 2);
}

#[tokio::test]
async fn test_opt_in_requires_authorization_preference_and_token() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();

    coordinator.record_authorization(AuthorizationStatus::Authorized, AuthorizedSettings::ALERT);
    coordinator.set_user_push_notifications_enabled(true);
    assert!(!coordinator.build_payload().opt_in, "no token yet");

    coordinator.record_device_token(token(1));
    assert!(coordinator.build_payload().opt_in);

    coordinator.set_user_push_notifications_enabled(false);
    assert!(!coordinator.build_payload().opt_in);

    coordinator.set_user_push_notifications_enabled(true);
    coordinator.record_authorization(AuthorizationStatus::Authorized, AuthorizedSettings::empty());
    assert!(!coordinator.build_payload().opt_in, "nothing granted");
}

#[tokio::test]
async fn test_background_flag_derivation() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    assert!(!coordinator.background_push_allowed(), "no token yet");

    coordinator.record_device_token(token(2));
    assert!(coordinator.background_push_allowed());
    assert!(coordinator.build_payload().background);

    coordinator.set_background_push_notifications_enabled(false);
    assert!(!coordinator.build_payload().background);

    coordinator.set_background_push_notifications_enabled(true);
    harness.provider.set_background_refresh(false);
    assert!(!coordinator.background_push_allowed());

    harness.provider.set_background_refresh(true);
    harness.privacy.disable(Features::PUSH);
    assert!(!coordinator.background_push_allowed());
}

#[tokio::test]
async fn test_successful_update_reports_flags_to_channel() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.record_device_token(token(4));
    coordinator.record_authorization(AuthorizationStatus::Authorized, AuthorizedSettings::ALERT);
    coordinator.set_user_push_notifications_enabled(true);

    assert!(coordinator.update_registration().await);
    assert!(harness.channel.opt_in());
    assert!(harness.channel.background());
}

#[tokio::test]
async fn test_payload_carries_quiet_time_badge_categories_and_tags() {
    let harness = Harness::new();
    let config = PushConfig {
        auto_badge: true,
        ..PushConfig::default()
    };
    let coordinator = harness.coordinator_with(&config);

    coordinator.set_quiet_time(
        TimeOfDay::new(22, 0).expect("valid"),
        TimeOfDay::new(7, 30).expect("valid"),
    );
    coordinator.set_quiet_time_enabled(true);
    coordinator.set_time_zone(Some(chrono_tz::Europe::Berlin));
    coordinator.set_badge_number(5);
    coordinator.set_categories(["reply", "accept"]);
    harness.channel.add_tags(&["sports".to_string()]);

    let payload = coordinator.build_payload();
    assert!(payload.quiet_time_enabled);
    let range = payload.quiet_time.as_ref().expect("quiet time set");
    assert_eq!(range.start.to_string(), "22:00");
    assert_eq!(range.end.to_string(), "07:30");
    assert_eq!(payload.time_zone, "Europe/Berlin");
    assert_eq!(payload.badge, Some(5));
    assert_eq!(payload.categories, vec!["accept".to_string(), "reply".to_string()]);
    assert_eq!(payload.tags, vec!["sports".to_string()]);

    let json = serde_json::to_value(&payload).expect("serializable");
    assert_eq!(json["quiet_time"]["start"], "22:00");
}

#[tokio::test]
async fn test_badge_only_dirties_with_auto_badge() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.update_registration().await;

    coordinator.set_badge_number(3);
    assert!(!coordinator.should_update_registration());
    assert_eq!(coordinator.build_payload().badge, None);
    assert_eq!(coordinator.settings().badge(), 3);

    coordinator.reset_badge();
    assert_eq!(coordinator.settings().badge(), 0);
}

#[tokio::test]
async fn test_auto_badge_reset_marks_dirty() {
    let harness = Harness::new();
    let config = PushConfig {
        auto_badge: true,
        ..PushConfig::default()
    };
    let coordinator = harness.coordinator_with(&config);
    coordinator.set_badge_number(9);
    coordinator.update_registration().await;

    coordinator.reset_badge();
    assert!(coordinator.should_update_registration());
    assert!(coordinator.update_registration().await);
    assert_eq!(harness.provider.last_submission().expect("payload").badge, Some(0));
}

#[tokio::test]
async fn test_requested_options_and_categories_only_dirty_on_change() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.update_registration().await;

    assert!(!coordinator.set_requested_options(NotificationOptions::default()));
    assert!(!coordinator.should_update_registration());

    assert!(coordinator.set_requested_options(NotificationOptions::ALERT));
    assert!(coordinator.should_update_registration());
    coordinator.update_registration().await;

    assert!(coordinator.set_categories(["a"]));
    coordinator.update_registration().await;
    assert!(!coordinator.set_categories(["a"]));
    assert!(!coordinator.should_update_registration());
}

#[tokio::test]
async fn test_enable_user_push_prompts_once() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.record_device_token(token(5));

    assert_eq!(coordinator.enable_user_push_notifications(true).await, Some(true));
    assert_eq!(harness.provider.authorization_requests(), 1);

    let snapshot = coordinator.authorization_snapshot();
    assert_eq!(snapshot.status, AuthorizationStatus::Authorized);
    assert!(snapshot.prompted_before);
    assert!(harness.provider.last_submission().expect("submitted").opt_in);

    // Already determined: no second prompt
    coordinator.enable_user_push_notifications(true).await;
    assert_eq!(harness.provider.authorization_requests(), 1);
}

#[tokio::test]
async fn test_empty_grant_records_denied() {
    let harness = Harness::new();
    harness.provider.set_grant(AuthorizedSettings::empty());
    let coordinator = harness.coordinator();

    let snapshot = coordinator.request_authorization().await.expect("answered");
    assert_eq!(snapshot.status, AuthorizationStatus::Denied);
    assert!(snapshot.prompted_before);
    assert!(!coordinator.user_push_allowed());
}

#[tokio::test]
async fn test_failed_authorization_request_leaves_snapshot() {
    let harness = Harness::new();
    harness.provider.fail_authorization(true);
    let coordinator = harness.coordinator();
    coordinator.record_device_token(token(6));

    assert_eq!(coordinator.request_authorization().await, None);
    assert_eq!(coordinator.authorization_snapshot(), AuthorizationSnapshot::default());

    // Enabling still persists the preference and submits
    assert_eq!(coordinator.enable_user_push_notifications(true).await, Some(true));
    assert_eq!(harness.provider.authorization_requests(), 2);
    assert!(coordinator.settings().user_push_enabled());
    assert!(!harness.provider.last_submission().expect("submitted").opt_in);
}

#[tokio::test]
async fn test_provisional_request_records_provisional() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.set_requested_options(NotificationOptions::ALERT | NotificationOptions::PROVISIONAL);

    let snapshot = coordinator.request_authorization().await.expect("answered");
    assert_eq!(snapshot.status, AuthorizationStatus::Provisional);
    assert!(coordinator.user_push_allowed());
}

#[tokio::test]
async fn test_disabling_user_push_does_not_prompt() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();

    coordinator.enable_user_push_notifications(false).await;
    assert_eq!(harness.provider.authorization_requests(), 0);
    assert!(!coordinator.settings().user_push_enabled());
}

#[tokio::test]
async fn test_push_disabled_gates_updates() {
    let harness = Harness::with_features(Features::ALL - Features::PUSH);
    let coordinator = harness.coordinator();

    assert_eq!(coordinator.trigger_update().await, None);
    assert_eq!(coordinator.notify_device_token_received(token(1)).await, None);
    assert_eq!(coordinator.enable_user_push_notifications(true).await, None);
    assert_eq!(harness.provider.submission_count(), 0);
    assert_eq!(harness.provider.authorization_requests(), 0);

    // Preference is still persisted for when push comes back
    assert!(coordinator.settings().user_push_enabled());
}

#[tokio::test]
async fn test_update_with_completion_fires_once() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let completion = Completion::new(
        move |updated: bool| {
            assert!(updated);
            counter.fetch_add(1, Ordering::SeqCst);
        },
        false,
    );
    coordinator.update_registration_with(completion).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_authorization_status_prompt_rules() {
    assert!(AuthorizationStatus::NotDetermined.can_request(false));
    assert!(!AuthorizationStatus::Ephemeral.can_request(false));
    assert!(AuthorizationStatus::Ephemeral.can_request(true));
    assert!(!AuthorizationStatus::Denied.can_request(true));
    assert!(!AuthorizationStatus::Authorized.can_request(true));
    assert!(AuthorizationStatus::Provisional.is_authorized());
    assert!(!AuthorizationStatus::Denied.is_authorized());
}

#[tokio::test]
async fn test_ephemeral_prompts_only_with_extended_permission() {
    let harness = Harness::new();
    let coordinator = harness.coordinator();
    coordinator.record_authorization(AuthorizationStatus::Ephemeral, AuthorizedSettings::ALERT);

    coordinator.enable_user_push_notifications(true).await;
    assert_eq!(harness.provider.authorization_requests(), 0);

    coordinator.set_extended_permission_enabled(true);
    assert!(coordinator.should_update_registration());
    coordinator.enable_user_push_notifications(true).await;
    assert_eq!(harness.provider.authorization_requests(), 1);
    assert_eq!(
        coordinator.authorization_snapshot().status,
        AuthorizationStatus::Authorized
    );
}
