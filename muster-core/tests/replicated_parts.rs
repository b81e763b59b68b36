use muster_core::{
    checksum_of, CoordinationError, MismatchPolicy, PartNameAndChecksum, ReplicatedPartTracker,
    TableId,
};

fn part(name: &str, data: &[u8]) -> PartNameAndChecksum {
    PartNameAndChecksum { part_name: name.to_string(), checksum: checksum_of(data) }
}

#[test]
fn first_claim_wins_for_duplicate_parts() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    tracker
        .add_part_names("host-b", &table, &[part("p1", b"x"), part("p2", b"y")], "/tables/events")
        .unwrap();
    tracker
        .add_part_names("host-a", &table, &[part("p1", b"x"), part("p3", b"z")], "/tables/events")
        .unwrap();
    tracker.finalize(MismatchPolicy::Abort).unwrap();

    // host-b registered first, so it keeps p1 even though host-a sorts lower.
    assert_eq!(tracker.get_part_names("host-b", &table), ["p1", "p2"]);
    assert_eq!(tracker.get_part_names("host-a", &table), ["p3"]);
}

#[test]
fn checksum_divergence_aborts_finalize() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    tracker.add_part_names("host-1", &table, &[part("p1", b"x")], "/tables/events").unwrap();
    tracker.add_part_names("host-2", &table, &[part("p1", b"DIFFERENT")], "/tables/events").unwrap();

    let err = tracker.finalize(MismatchPolicy::Abort).unwrap_err();
    assert!(matches!(err, CoordinationError::PartChecksumMismatch { .. }));
    // No ownership was assigned.
    assert!(tracker.get_part_names("host-1", &table).is_empty());
    assert!(tracker.get_part_names("host-2", &table).is_empty());
}

#[test]
fn exclude_table_policy_keeps_healthy_tables() {
    let tracker = ReplicatedPartTracker::new();
    let good = TableId::new("db", "good");
    let bad = TableId::new("db", "bad");
    tracker.add_part_names("host-1", &good, &[part("p1", b"x")], "/tables/good").unwrap();
    tracker.add_part_names("host-1", &bad, &[part("p1", b"x")], "/tables/bad").unwrap();
    tracker.add_part_names("host-2", &bad, &[part("p1", b"DIFFERENT")], "/tables/bad").unwrap();

    tracker.finalize(MismatchPolicy::ExcludeTable).unwrap();
    assert_eq!(tracker.excluded_tables(), [bad.clone()]);
    assert_eq!(tracker.get_part_names("host-1", &good), ["p1"]);
    assert!(tracker.get_part_names("host-1", &bad).is_empty());
    assert!(tracker.get_part_names("host-2", &bad).is_empty());
}

#[test]
fn registration_after_finalize_is_rejected() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    tracker.add_part_names("h1", &table, &[part("p1", b"x")], "/zk").unwrap();
    tracker.finalize(MismatchPolicy::Abort).unwrap();

    let err = tracker.add_part_names("h2", &table, &[part("p2", b"y")], "/zk").unwrap_err();
    assert!(matches!(err, CoordinationError::LateRegistration { .. }));
    let err = tracker.add_data_path("h2", &table, "/data").unwrap_err();
    assert!(matches!(err, CoordinationError::LateRegistration { .. }));
}

#[test]
fn repeat_finalize_is_a_noop() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    tracker.add_part_names("h1", &table, &[part("p1", b"x")], "/zk").unwrap();
    tracker.finalize(MismatchPolicy::Abort).unwrap();
    tracker.finalize(MismatchPolicy::Abort).unwrap();
    assert_eq!(tracker.get_part_names("h1", &table), ["p1"]);
}

#[test]
fn re_registration_by_same_host_does_not_duplicate() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    tracker.add_part_names("h1", &table, &[part("p1", b"x")], "/zk").unwrap();
    tracker.add_part_names("h1", &table, &[part("p1", b"x")], "/zk").unwrap();
    tracker.finalize(MismatchPolicy::Abort).unwrap();
    assert_eq!(tracker.get_part_names("h1", &table), ["p1"]);
}

#[test]
fn data_paths_accumulate_per_host() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    tracker.add_data_path("h1", &table, "/disk1/db/events").unwrap();
    tracker.add_data_path("h1", &table, "/disk2/db/events").unwrap();
    tracker.add_data_path("h2", &table, "/disk1/db/events").unwrap();

    assert_eq!(tracker.get_data_paths("h1", &table), ["/disk1/db/events", "/disk2/db/events"]);
    assert_eq!(tracker.get_data_paths("h2", &table), ["/disk1/db/events"]);
    assert!(tracker.get_data_paths("h3", &table).is_empty());
}

#[test]
fn has_part_names_reflects_registration() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    assert!(!tracker.has_part_names("h1", &table));
    tracker.add_data_path("h1", &table, "/p").unwrap();
    // A data path alone is not a part registration.
    assert!(!tracker.has_part_names("h1", &table));
    tracker.add_part_names("h1", &table, &[part("p1", b"x")], "/zk").unwrap();
    assert!(tracker.has_part_names("h1", &table));
    assert!(!tracker.has_part_names("h2", &table));
}

#[test]
fn zk_path_kept_from_first_registration() {
    let tracker = ReplicatedPartTracker::new();
    let table = TableId::new("db", "events");
    assert!(tracker.get_table_zk_path(&table).is_none());
    tracker.add_part_names("h1", &table, &[part("p1", b"x")], "/zk/events").unwrap();
    tracker.add_part_names("h2", &table, &[part("p1", b"x")], "/zk/events").unwrap();
    assert_eq!(tracker.get_table_zk_path(&table).as_deref(), Some("/zk/events"));
}
