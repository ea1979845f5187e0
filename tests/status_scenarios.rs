//! Scenarios 3 and 4 from SPEC_FULL.md §8: DONE preflight checks and the
//! dry-run oracle's equivalence to the real call.

use pmtool_engine::dependency::{self, GraphKind};
use pmtool_engine::error::{Error, StatusReason};
use pmtool_engine::repo;
use pmtool_engine::status;
use pmtool_engine::store::Store;

#[test]
fn task_done_requires_every_subtask_done() {
    let store = Store::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            let p = repo::project::create(tx, "P", None)?;
            let t = repo::task::create(tx, p.id, None, "T", None)?;
            let s1 = repo::subtask::create(tx, t.id, "S1", None)?;
            let s2 = repo::subtask::create(tx, t.id, "S2", None)?;

            let err = status::update_status(tx, GraphKind::Task, t.id, "DONE").unwrap_err();
            match err {
                Error::StatusTransition {
                    reason: StatusReason::ChildNotDone,
                    details,
                } => {
                    let ids: Vec<i64> = details.incomplete_children.iter().map(|n| n.id).collect();
                    assert!(ids.contains(&s1.id));
                    assert!(ids.contains(&s2.id));
                }
                other => panic!("expected ChildNotDone, got {other:?}"),
            }

            status::update_status(tx, GraphKind::SubTask, s1.id, "DONE")?;
            status::update_status(tx, GraphKind::SubTask, s2.id, "DONE")?;
            status::update_status(tx, GraphKind::Task, t.id, "DONE")?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn done_requires_predecessor_done_and_dry_run_matches() {
    let store = Store::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            let p = repo::project::create(tx, "P", None)?;
            let t1 = repo::task::create(tx, p.id, None, "T1", None)?;
            let t2 = repo::task::create(tx, p.id, None, "T2", None)?;
            dependency::add(tx, GraphKind::Task, t1.id, t2.id)?;

            let dry = status::validate_done_transition(tx, GraphKind::Task, t2.id);
            let real = status::update_status(tx, GraphKind::Task, t2.id, "DONE");

            assert!(matches!(
                dry,
                Err(Error::StatusTransition {
                    reason: StatusReason::PrerequisiteNotDone,
                    ..
                })
            ));
            assert!(matches!(
                real,
                Err(Error::StatusTransition {
                    reason: StatusReason::PrerequisiteNotDone,
                    ..
                })
            ));

            // the dry-run oracle must not have mutated anything
            let t2_after = repo::task::get_by_id(tx, t2.id)?.unwrap();
            assert_eq!(t2_after.status, pmtool_engine::models::Status::Unset);
            Ok(())
        })
        .unwrap();
}

#[test]
fn dry_run_status_update_returns_the_verdict_update_status_would_act_on() {
    let store = Store::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            let p = repo::project::create(tx, "P", None)?;
            let t1 = repo::task::create(tx, p.id, None, "T1", None)?;
            let t2 = repo::task::create(tx, p.id, None, "T2", None)?;
            dependency::add(tx, GraphKind::Task, t1.id, t2.id)?;

            let verdict = status::dry_run_status_update(tx, GraphKind::Task, t2.id, "DONE")?;
            assert!(!verdict.ok);
            assert_eq!(verdict.reason, Some(StatusReason::PrerequisiteNotDone));
            let blockers: Vec<i64> = verdict
                .details
                .as_ref()
                .unwrap()
                .incomplete_predecessors
                .iter()
                .map(|n| n.id)
                .collect();
            assert_eq!(blockers, vec![t1.id]);

            // no mutation, and a second call returns the identical verdict
            let t2_after = repo::task::get_by_id(tx, t2.id)?.unwrap();
            assert_eq!(t2_after.status, pmtool_engine::models::Status::Unset);
            assert_eq!(
                verdict,
                status::dry_run_status_update(tx, GraphKind::Task, t2.id, "DONE")?
            );

            status::update_status(tx, GraphKind::Task, t1.id, "DONE")?;
            let now_allowed = status::dry_run_status_update(tx, GraphKind::Task, t2.id, "DONE")?;
            assert!(now_allowed.ok);
            assert!(now_allowed.reason.is_none());
            status::update_status(tx, GraphKind::Task, t2.id, "DONE")?;
            Ok(())
        })
        .unwrap();
}
