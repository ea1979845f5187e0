//! Scenario 5 from SPEC_FULL.md §8: order_index holes survive a delete and
//! are only ever a Doctor warning, never an error.

use pmtool_engine::repo;
use pmtool_engine::store::Store;

#[test]
fn deleting_a_middle_sibling_leaves_an_order_index_hole() {
    let store = Store::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            let p = repo::project::create(tx, "P", None)?;
            let sp0 = repo::subproject::create(tx, p.id, None, "SP0", None)?;
            let sp1 = repo::subproject::create(tx, p.id, None, "SP1", None)?;
            let sp2 = repo::subproject::create(tx, p.id, None, "SP2", None)?;
            assert_eq!((sp0.order_index, sp1.order_index, sp2.order_index), (0, 1, 2));

            repo::subproject::delete(tx, sp1.id)?;

            let remaining = repo::subproject::get_by_parent(tx, p.id, None)?;
            let indices: Vec<i64> = remaining.iter().map(|s| s.order_index).collect();
            assert_eq!(indices, vec![0, 2]);
            Ok(())
        })
        .unwrap();

    let report = store.doctor().unwrap();
    assert!(report.is_healthy());
    assert!(report.warnings.iter().any(|i| i.code == "ORDER_W001"));
}

#[test]
fn subtask_mutation_bubbles_updated_at_up_to_project() {
    let store = Store::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            let p = repo::project::create(tx, "P", None)?;
            let t = repo::task::create(tx, p.id, None, "T", None)?;
            let st = repo::subtask::create(tx, t.id, "ST", None)?;

            let p_before = repo::project::get_by_id(tx, p.id)?.unwrap().updated_at;
            let t_before = repo::task::get_by_id(tx, t.id)?.unwrap().updated_at;
            std::thread::sleep(std::time::Duration::from_secs(1));

            repo::subtask::update(tx, st.id, Some("ST renamed"), None)?;

            let p_after = repo::project::get_by_id(tx, p.id)?.unwrap().updated_at;
            let t_after = repo::task::get_by_id(tx, t.id)?.unwrap().updated_at;
            assert_ne!(p_before, p_after, "SubTask update must bubble to Project");
            assert_ne!(t_before, t_after, "SubTask update must touch its Task");
            Ok(())
        })
        .unwrap();
}

#[test]
fn subproject_create_touches_project_updated_at() {
    let store = Store::open_in_memory().unwrap();
    store
        .transaction(|tx| {
            let p = repo::project::create(tx, "P", None)?;
            let p_before = p.updated_at.clone();
            std::thread::sleep(std::time::Duration::from_secs(1));

            repo::subproject::create(tx, p.id, None, "SP", None)?;

            let p_after = repo::project::get_by_id(tx, p.id)?.unwrap().updated_at;
            assert_ne!(p_before, p_after);
            Ok(())
        })
        .unwrap();
}

#[test]
fn cascade_dry_run_rolls_back_and_reports_exact_counts() {
    let store = Store::open_in_memory().unwrap();
    let project_id = store
        .transaction(|tx| {
            let p = repo::project::create(tx, "P", None)?;
            let t = repo::task::create(tx, p.id, None, "T", None)?;
            repo::subtask::create(tx, t.id, "S1", None)?;
            repo::subtask::create(tx, t.id, "S2", None)?;
            Ok(p.id)
        })
        .unwrap();

    let impact = store
        .dry_run(|tx| {
            pmtool_engine::deletion::delete(
                tx,
                pmtool_engine::deletion::EntityKind::Project,
                project_id,
                pmtool_engine::deletion::Mode::Cascade,
                true,
            )
        })
        .unwrap();
    assert_eq!(impact.tasks, 1);
    assert_eq!(impact.subtasks, 2);

    let still_there = store
        .transaction(|tx| repo::project::get_by_id(tx, project_id))
        .unwrap();
    assert!(still_there.is_some());

    let impact_real = store
        .transaction(|tx| {
            pmtool_engine::deletion::delete(
                tx,
                pmtool_engine::deletion::EntityKind::Project,
                project_id,
                pmtool_engine::deletion::Mode::Cascade,
                false,
            )
        })
        .unwrap();
    assert_eq!(impact_real.tasks, 1);
    assert_eq!(impact_real.subtasks, 2);
    let gone = store
        .transaction(|tx| repo::project::get_by_id(tx, project_id))
        .unwrap();
    assert!(gone.is_none());
}
