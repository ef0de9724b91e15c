//! Failover log scenarios: rollback decisions against branch history and
//! persistence round-trips.

mod fixtures;

use syncpoint::{FailoverEntry, FailoverTable, RollbackDecision, RollbackRequest, SeqNo};

fn table_with_branches() -> FailoverTable {
    let table = FailoverTable::new(25, SeqNo::ZERO);
    table
        .replace_failover_log(vec![
            FailoverEntry {
                uuid: 7,
                by_seqno: 100,
            },
            FailoverEntry {
                uuid: 3,
                by_seqno: 50,
            },
        ])
        .expect("seed branches");
    table
}

fn request(start: u64, uuid: u64) -> RollbackRequest {
    RollbackRequest {
        start_seqno: SeqNo::new(start),
        cur_seqno: SeqNo::new(100),
        vb_uuid: uuid,
        snap_start_seqno: SeqNo::new(start),
        snap_end_seqno: SeqNo::new(start),
        purge_seqno: SeqNo::ZERO,
        strict_uuid_match: false,
        max_collection_high_seqno: None,
    }
}

#[test]
fn resume_inside_an_old_branch_needs_no_rollback() {
    let table = table_with_branches();
    let decision = table.needs_rollback(&RollbackRequest {
        snap_start_seqno: SeqNo::new(55),
        snap_end_seqno: SeqNo::new(60),
        ..request(60, 3)
    });
    assert_eq!(
        decision,
        RollbackDecision::Unnecessary {
            snap_start_seqno: SeqNo::new(60),
            snap_end_seqno: SeqNo::new(60),
        }
    );
}

#[test]
fn resume_past_the_branch_end_rewinds_to_it() {
    let table = table_with_branches();
    let decision = table.needs_rollback(&request(120, 3));
    assert_eq!(decision.rollback_seqno(), Some(SeqNo::new(100)));
}

#[test]
fn unknown_branch_rewinds_to_zero() {
    let table = table_with_branches();
    let decision = table.needs_rollback(&request(40, 99));
    assert_eq!(decision.rollback_seqno(), Some(SeqNo::ZERO));
}

#[test]
fn any_start_inside_the_head_branch_resumes() {
    let table = table_with_branches();
    let head_uuid = table.latest_uuid();
    // The head branch began at 100 and extends to the current high seqno.
    for start in [100u64, 120, 135, 150] {
        let decision = table.needs_rollback(&RollbackRequest {
            cur_seqno: SeqNo::new(150),
            ..request(start, head_uuid)
        });
        assert!(!decision.needs_rollback(), "start {start} should resume");
    }
}

#[test]
fn json_round_trip_preserves_the_branch_sequence() {
    let table = table_with_branches();
    table.create_entry(SeqNo::new(100));

    let json = table.to_json();
    let restored = FailoverTable::from_json(&json, 25, SeqNo::new(100)).expect("restore");

    let original: Vec<(u64, u64)> = table
        .failover_log()
        .iter()
        .map(|entry| (entry.uuid, entry.by_seqno))
        .collect();
    let reloaded: Vec<(u64, u64)> = restored
        .failover_log()
        .iter()
        .map(|entry| (entry.uuid, entry.by_seqno))
        .collect();
    assert_eq!(original, reloaded);
    assert_eq!(restored.latest_uuid(), table.latest_uuid());
}

#[test]
fn takeover_truncates_branches_that_never_happened() {
    let table = table_with_branches();
    // New active takes over at seqno 80: the branch point at 100 is bogus.
    table.create_entry(SeqNo::new(80));

    let log = table.failover_log();
    assert_eq!(log[0].by_seqno, 80);
    assert_eq!(log[1].by_seqno, 50);

    // A client that was streaming the dead branch must now rewind.
    let decision = table.needs_rollback(&RollbackRequest {
        cur_seqno: SeqNo::new(80),
        ..request(95, 3)
    });
    assert_eq!(decision.rollback_seqno(), Some(SeqNo::new(80)));
}

#[test]
fn mid_snapshot_resume_clamps_the_snapshot_range() {
    let table = table_with_branches();
    let decision = table.needs_rollback(&RollbackRequest {
        snap_start_seqno: SeqNo::new(55),
        snap_end_seqno: SeqNo::new(58),
        ..request(57, 3)
    });
    let RollbackDecision::Unnecessary {
        snap_start_seqno,
        snap_end_seqno,
    } = decision
    else {
        panic!("expected resume, got {decision:?}");
    };
    assert_eq!(snap_start_seqno, SeqNo::new(57));
    assert_eq!(snap_end_seqno, SeqNo::new(58));
}
