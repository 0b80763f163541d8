use std::sync::Once;
use std::time::Duration;

use harvester_core::{
    canonical_item_id, CaptionFingerprints, FingerprintVerdict, HarvestPhase, ItemOutcome, Record,
    SessionState, StopReason, TerminationPolicy,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

#[test]
fn seeded_quota_stops_before_start() {
    init_logging();
    let policy = TerminationPolicy {
        row_limit: Some(3),
        ..TerminationPolicy::default()
    };
    let full = SessionState::new("Test", 3);
    assert_eq!(policy.before_start(&full), Some(StopReason::RowLimit));

    let partial = SessionState::new("Test", 2);
    assert_eq!(policy.before_start(&partial), None);
}

#[test]
fn zero_session_cap_stops_before_start() {
    let policy = TerminationPolicy {
        session_row_cap: Some(0),
        ..TerminationPolicy::default()
    };
    assert_eq!(
        policy.before_start(&SessionState::new("Test", 0)),
        Some(StopReason::SessionCap)
    );
}

#[test]
fn inserts_drive_row_limit_and_session_cap() {
    init_logging();
    let policy = TerminationPolicy {
        row_limit: Some(10),
        session_row_cap: Some(2),
        ..TerminationPolicy::default()
    };
    let mut session = SessionState::new("Test", 5);
    session.record_attempt();
    session.record_outcome(ItemOutcome::Inserted);
    assert_eq!(policy.after_item(&session, Duration::ZERO), None);

    session.record_attempt();
    session.record_outcome(ItemOutcome::Merged);
    assert_eq!(policy.after_item(&session, Duration::ZERO), None);

    session.record_attempt();
    session.record_outcome(ItemOutcome::Inserted);
    assert_eq!(session.running_total(), 7);
    assert_eq!(
        policy.after_item(&session, Duration::ZERO),
        Some(StopReason::SessionCap)
    );
}

#[test]
fn timeout_wins_over_quota() {
    let policy = TerminationPolicy {
        timeout: Some(Duration::from_secs(10)),
        row_limit: Some(1),
        ..TerminationPolicy::default()
    };
    let session = SessionState::new("Test", 1);
    assert_eq!(
        policy.after_item(&session, Duration::from_secs(11)),
        Some(StopReason::Timeout)
    );
    assert_eq!(
        policy.after_item(&session, Duration::from_secs(10)),
        Some(StopReason::RowLimit)
    );
}

#[test]
fn attempt_cap_counts_every_item() {
    let policy = TerminationPolicy {
        attempt_cap: Some(2),
        ..TerminationPolicy::default()
    };
    let mut session = SessionState::new("Test", 0);
    session.record_attempt();
    session.record_outcome(ItemOutcome::Missed);
    assert_eq!(policy.after_item(&session, Duration::ZERO), None);
    session.record_attempt();
    session.record_outcome(ItemOutcome::SkippedDuplicate);
    assert_eq!(
        policy.after_item(&session, Duration::ZERO),
        Some(StopReason::AttemptCap)
    );
}

#[test]
fn idle_rounds_reset_on_growth() {
    let policy = TerminationPolicy {
        max_idle_rounds: 2,
        ..TerminationPolicy::default()
    };
    let mut session = SessionState::new("Test", 0);

    assert_eq!(session.finish_round(), 0);
    assert_eq!(policy.after_round(&session, Duration::ZERO), None);

    session.record_outcome(ItemOutcome::Inserted);
    assert_eq!(session.finish_round(), 1);
    assert_eq!(session.idle_rounds(), 0);

    session.finish_round();
    assert_eq!(policy.after_round(&session, Duration::ZERO), None);
    session.finish_round();
    assert_eq!(
        policy.after_round(&session, Duration::ZERO),
        Some(StopReason::Idle)
    );
    assert_eq!(session.rounds(), 4);
    assert_eq!(session.rounds_since_cooldown(), 4);
}

#[test]
fn idle_check_disabled_by_zero_and_round_limit_applies() {
    let policy = TerminationPolicy {
        max_rounds: Some(3),
        ..TerminationPolicy::default()
    };
    let mut session = SessionState::new("Test", 0);
    session.finish_round();
    session.finish_round();
    assert_eq!(policy.after_round(&session, Duration::ZERO), None);
    session.finish_round();
    assert_eq!(
        policy.after_round(&session, Duration::ZERO),
        Some(StopReason::RoundLimit)
    );
}

#[test]
fn failed_advance_is_exhaustion() {
    let policy = TerminationPolicy::default();
    assert_eq!(policy.after_advance(true), None);
    assert_eq!(policy.after_advance(false), Some(StopReason::Exhausted));
}

#[test]
fn summary_reports_counts_and_reason() {
    let mut session = SessionState::new("Test", 4);
    for outcome in [
        ItemOutcome::Inserted,
        ItemOutcome::Merged,
        ItemOutcome::Missed,
        ItemOutcome::SkippedDuplicate,
        ItemOutcome::Inserted,
    ] {
        session.record_attempt();
        session.record_outcome(outcome);
    }
    session.finish_round();
    let summary = session.summary(StopReason::Idle);
    assert_eq!(summary.group_key, "Test");
    assert_eq!(summary.attempted_count, 5);
    assert_eq!(summary.saved_count, 2);
    assert_eq!(summary.merged_count, 1);
    assert_eq!(summary.skipped_count, 1);
    assert_eq!(summary.miss_count, 1);
    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.running_total, 6);
    assert_eq!(summary.stop_reason.to_string(), "IDLE");
}

#[test]
fn stop_reason_codes_round_trip() {
    for reason in [StopReason::RowLimit, StopReason::Exhausted, StopReason::Cancelled] {
        assert_eq!(StopReason::from_code(reason.code()), Some(reason));
    }
    assert_eq!(StopReason::from_code("NOPE"), None);
    assert_eq!(
        HarvestPhase::Stopped(StopReason::Timeout).to_string(),
        "STOPPED(TIMEOUT)"
    );
}

#[test]
fn caption_fingerprint_only_tracks_untimestamped_records() {
    let mut fingerprints = CaptionFingerprints::new(10);
    let untimed = Record::new("alice|", "Test")
        .with_field("author", "alice")
        .with_field("text", "0123456789 tail one");
    let same_prefix = Record::new("alice|", "Test")
        .with_field("author", "alice")
        .with_field("text", "0123456789 different tail");
    let timed = same_prefix.clone().with_field("timestamp", "2024-01-01");

    assert_eq!(fingerprints.observe(&untimed), FingerprintVerdict::Fresh);
    assert_eq!(fingerprints.observe(&same_prefix), FingerprintVerdict::Repeat);
    assert_eq!(fingerprints.observe(&timed), FingerprintVerdict::Fresh);
    assert_eq!(fingerprints.observe(&timed), FingerprintVerdict::Fresh);
    assert_eq!(fingerprints.len(), 1);

    let other_author = untimed.clone().with_field("author", "bob");
    assert_eq!(fingerprints.observe(&other_author), FingerprintVerdict::Fresh);
}

#[test]
fn canonical_ids_drop_query_and_trailing_slash() {
    assert_eq!(
        canonical_item_id(" https://x.com/alice/status/42?s=20 "),
        "https://x.com/alice/status/42"
    );
    assert_eq!(
        canonical_item_id("https://Example.com/p/abc/"),
        "https://example.com/p/abc"
    );
    assert_eq!(
        canonical_item_id("https://sosyal.example/tags/Doğa#post-3"),
        "https://sosyal.example/tags/Do%C4%9Fa#post-3"
    );
    assert_eq!(canonical_item_id("alice|2024-01-01"), "alice|2024-01-01");
}
