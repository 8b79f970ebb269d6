use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

use rusqlite::Connection;
use tempfile::TempDir;
use uplink_core::model::{NewPartner, Partner};
use uplink_core::{Engine, EngineError, EngineSettings};

fn engine(dir: &TempDir) -> (Engine, PathBuf) {
    let db_path = dir.path().join("db").join("uplink.db");
    let settings = EngineSettings::standard().expect("standard settings");
    let engine = Engine::open_at(&db_path, settings).expect("engine open");
    (engine, db_path)
}

/// A second engine on the same file with a different depth limit.
fn engine_with_max(db_path: &Path, max_levels: u32) -> Engine {
    let mut settings = EngineSettings::standard().expect("standard settings");
    settings.max_levels = max_levels;
    Engine::open_at(db_path, settings).expect("engine open")
}

fn profile(name: &str) -> NewPartner {
    NewPartner {
        name: name.to_string(),
        email: format!("{}@example.test", name.to_ascii_lowercase()),
    }
}

fn join(engine: &mut Engine, sponsor: Option<&Partner>, name: &str) -> Partner {
    engine
        .register_partner(sponsor.map(|s| s.partner_code.as_str()), &profile(name))
        .expect("register")
}

fn edge_count(conn: &Connection, child_id: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM hierarchy_edges WHERE child_id = ?1",
        [child_id],
        |r| r.get(0),
    )
    .unwrap()
}

#[test]
fn register_writes_pointer_and_closure_rows_together() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);

    let root = join(&mut engine, None, "Root");
    let mid = join(&mut engine, Some(&root), "Mid");
    let leaf = join(&mut engine, Some(&mid), "Leaf");

    assert_eq!(root.sponsor_id, None);
    assert_eq!(leaf.sponsor_id.as_deref(), Some(mid.partner_id.as_str()));
    assert!(leaf.partner_code.starts_with("UP-"));
    assert_eq!(leaf.partner_code.len(), 11);
    assert!(leaf.active);

    let upline = engine.resolve_upline(&leaf.partner_id, 10).unwrap();
    let ids: Vec<(&str, u32)> = upline.iter().map(|e| (e.ancestor_id.as_str(), e.level)).collect();
    assert_eq!(ids, vec![(mid.partner_id.as_str(), 1), (root.partner_id.as_str(), 2)]);

    let conn = Connection::open(&db_path).unwrap();
    assert_eq!(edge_count(&conn, &root.partner_id), 0);
    assert_eq!(edge_count(&conn, &mid.partner_id), 1);
    assert_eq!(edge_count(&conn, &leaf.partner_id), 2);

    let found = engine.partner_by_code(&mid.partner_code).unwrap().expect("by code");
    assert_eq!(found.partner_id, mid.partner_id);
}

#[test]
fn unknown_sponsor_code_is_rejected_without_writing() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);
    join(&mut engine, None, "Root");

    let err = engine
        .register_partner(Some("UP-NOPE0000"), &profile("Orphan"))
        .unwrap_err();
    assert!(matches!(err, EngineError::SponsorNotFound(ref code) if code == "UP-NOPE0000"));

    let conn = Connection::open(&db_path).unwrap();
    let partners: i64 = conn.query_row("SELECT COUNT(*) FROM partners", [], |r| r.get(0)).unwrap();
    assert_eq!(partners, 1);
}

#[test]
fn deactivated_sponsor_cannot_recruit() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _) = engine(&dir);
    let root = join(&mut engine, None, "Root");

    assert!(engine.deactivate_partner(&root.partner_id).unwrap());
    assert!(!engine.deactivate_partner(&root.partner_id).unwrap(), "second deactivate is a no-op");

    let err = engine
        .register_partner(Some(&root.partner_code), &profile("Late"))
        .unwrap_err();
    assert!(matches!(err, EngineError::SponsorInactive(_)));
}

#[test]
fn chain_longer_than_max_levels_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _) = engine(&dir);
    let max = engine.settings().max_levels;

    // Bottom partner ends up with exactly `max` ancestors.
    let mut bottom = join(&mut engine, None, "P0");
    for i in 1..=max {
        bottom = join(&mut engine, Some(&bottom), &format!("P{i}"));
    }
    assert_eq!(engine.resolve_upline(&bottom.partner_id, max).unwrap().len() as u32, max);

    let err = engine
        .register_partner(Some(&bottom.partner_code), &profile("TooDeep"))
        .unwrap_err();
    match err {
        EngineError::HierarchyTooDeep { depth, max_levels } => {
            assert_eq!(max_levels, max);
            assert_eq!(depth, max + 1);
        }
        other => panic!("expected HierarchyTooDeep, got {other:?}"),
    }
}

#[test]
fn cycle_guard_rejects_linking_an_ancestor_under_its_descendant() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);

    let a = join(&mut engine, None, "A");
    let b = join(&mut engine, Some(&a), "B");
    let c = join(&mut engine, Some(&b), "C");

    assert!(!engine.can_link(&a.partner_id, &c.partner_id).unwrap());
    assert!(!engine.can_link(&a.partner_id, &a.partner_id).unwrap());
    assert!(engine.can_link(&c.partner_id, &a.partner_id).unwrap());

    let err = engine.attach_sponsor(&a.partner_id, &c.partner_code).unwrap_err();
    assert!(matches!(err, EngineError::CycleDetected { .. }));

    // Nothing was written: A is still a root with no closure rows.
    let conn = Connection::open(&db_path).unwrap();
    let sponsor: Option<String> = conn
        .query_row("SELECT sponsor_id FROM partners WHERE partner_id = ?1", [&a.partner_id], |r| r.get(0))
        .unwrap();
    assert_eq!(sponsor, None);
    assert_eq!(edge_count(&conn, &a.partner_id), 0);
}

#[test]
fn attach_grafts_the_whole_subtree() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _) = engine(&dir);

    let top = join(&mut engine, None, "Top");
    let under_top = join(&mut engine, Some(&top), "UnderTop");

    let lone = join(&mut engine, None, "Lone");
    let lone_child = join(&mut engine, Some(&lone), "LoneChild");
    let lone_grandchild = join(&mut engine, Some(&lone_child), "LoneGrandchild");

    // lone +2, lone_child +2, lone_grandchild +2
    let added = engine.attach_sponsor(&lone.partner_id, &under_top.partner_code).unwrap();
    assert_eq!(added, 6);

    let upline = engine.resolve_upline(&lone_grandchild.partner_id, 10).unwrap();
    let ids: Vec<&str> = upline.iter().map(|e| e.ancestor_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            lone_child.partner_id.as_str(),
            lone.partner_id.as_str(),
            under_top.partner_id.as_str(),
            top.partner_id.as_str(),
        ]
    );
    assert_eq!(engine.get_team_size(&top.partner_id).unwrap(), 4);

    let err = engine.attach_sponsor(&lone.partner_id, &top.partner_code).unwrap_err();
    assert!(matches!(err, EngineError::AlreadySponsored(_)));

    // The closure rows and the pointers agree everywhere after the graft.
    let report = engine.sweep().unwrap();
    assert_eq!(report.audited, 5);
    assert!(report.drifted.is_empty());
    assert!(report.failures.is_empty());
}

#[test]
fn upline_levels_are_strictly_increasing_and_unique() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _) = engine(&dir);

    let root = join(&mut engine, None, "Root");
    let left = join(&mut engine, Some(&root), "Left");
    let right = join(&mut engine, Some(&root), "Right");
    let mut everyone = vec![root.clone(), left.clone(), right.clone()];
    let mut parent = left;
    for i in 0..5 {
        let p = join(&mut engine, Some(&parent), &format!("L{i}"));
        everyone.push(p.clone());
        everyone.push(join(&mut engine, Some(&right), &format!("R{i}")));
        parent = p;
    }

    for p in &everyone {
        let upline = engine.resolve_upline(&p.partner_id, 10).unwrap();
        let mut seen = HashSet::new();
        for (idx, e) in upline.iter().enumerate() {
            assert_eq!(e.level, idx as u32 + 1);
            assert!(seen.insert(e.ancestor_id.clone()), "repeated ancestor");
            assert_ne!(e.ancestor_id, p.partner_id);
        }
        assert_eq!(upline, engine.resolve_upline_by_pointers(&p.partner_id, 10).unwrap());
    }

    let truncated = engine.resolve_upline(&parent.partner_id, 2).unwrap();
    assert_eq!(truncated.len(), 2);
    assert_eq!(engine.descendants(&root.partner_id).unwrap().len(), everyone.len() - 1);
}

#[test]
fn pointer_walk_reports_a_corrupted_cycle() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);

    let a = join(&mut engine, None, "A");
    let b = join(&mut engine, Some(&a), "B");
    let c = join(&mut engine, Some(&b), "C");

    // Bypass the engine: point A at C directly.
    let conn = Connection::open(&db_path).unwrap();
    conn.execute(
        "UPDATE partners SET sponsor_id = ?1 WHERE partner_id = ?2",
        [&c.partner_id, &a.partner_id],
    )
    .unwrap();

    let err = engine.resolve_upline_by_pointers(&c.partner_id, 10).unwrap_err();
    assert!(matches!(err, EngineError::CircularReferenceDetected { .. }));

    // The closure read notices that A's level-1 row is missing.
    let err = engine.resolve_upline(&a.partner_id, 10).unwrap_err();
    assert!(matches!(err, EngineError::ReconciliationDriftDetected { .. }));

    let report = engine.sweep().unwrap();
    assert_eq!(report.failures.len(), 3, "every partner on the loop fails to walk");
}

#[test]
fn unknown_partner_lookups_fail_cleanly() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _) = engine(&dir);

    assert!(matches!(
        engine.resolve_upline("missing", 10).unwrap_err(),
        EngineError::PartnerNotFound(_)
    ));
    assert!(matches!(
        engine.deactivate_partner("missing").unwrap_err(),
        EngineError::PartnerNotFound(_)
    ));
    assert!(engine.partner("missing").unwrap().is_none());
}

#[test]
fn opposite_attaches_race_and_only_one_links() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);
    let rounds = 5;

    for round in 0..rounds {
        let a = join(&mut engine, None, &format!("A{round}"));
        join(&mut engine, Some(&a), &format!("A{round}Child"));
        let c = join(&mut engine, None, &format!("C{round}"));
        let c_child = join(&mut engine, Some(&c), &format!("C{round}Child"));

        let barrier = Arc::new(Barrier::new(3));
        let spawn_attach = |child: &Partner, sponsor: &Partner| {
            let (db_path, barrier) = (db_path.clone(), barrier.clone());
            let (child_id, sponsor_code) = (child.partner_id.clone(), sponsor.partner_code.clone());
            thread::spawn(move || {
                let mut engine = engine_with_max(&db_path, 10);
                barrier.wait();
                engine.attach_sponsor(&child_id, &sponsor_code)
            })
        };
        let a_under_c = spawn_attach(&a, &c);
        let c_under_a = spawn_attach(&c, &a);
        let recruit = {
            let (db_path, barrier) = (db_path.clone(), barrier.clone());
            let code = c_child.partner_code.clone();
            thread::spawn(move || {
                let mut engine = engine_with_max(&db_path, 10);
                barrier.wait();
                engine.register_partner(Some(&code), &profile("Recruit"))
            })
        };

        let results = [a_under_c.join().expect("thread"), c_under_a.join().expect("thread")];
        recruit.join().expect("thread").expect("registration under the subtree");

        let linked = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(linked, 1, "round {round}: exactly one direction may link");
        let rejected = results.into_iter().find_map(Result::err).expect("one rejection");
        assert!(matches!(rejected, EngineError::CycleDetected { .. }), "got {rejected:?}");
    }

    let report = engine.sweep().unwrap();
    assert_eq!(report.audited, rounds * 5);
    assert!(report.drifted.is_empty(), "{:?}", report.drifted);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
}

#[test]
fn guard_refuses_a_sponsor_whose_pointers_loop() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);
    let x = join(&mut engine, None, "X");
    let y = join(&mut engine, Some(&x), "Y");
    let newcomer = join(&mut engine, None, "Newcomer");

    // Strip Y's closure rows and close the loop X -> Y -> X.
    let conn = Connection::open(&db_path).unwrap();
    conn.execute("DELETE FROM hierarchy_edges WHERE child_id = ?1", [&y.partner_id])
        .unwrap();
    conn.execute(
        "UPDATE partners SET sponsor_id = ?1 WHERE partner_id = ?2",
        [&y.partner_id, &x.partner_id],
    )
    .unwrap();

    assert!(!engine.can_link(&newcomer.partner_id, &y.partner_id).unwrap());
    assert!(!engine.can_link(&newcomer.partner_id, &x.partner_id).unwrap());
}

#[test]
fn guard_refuses_a_sponsor_whose_pointers_run_past_the_limit() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);
    let mut bottom = join(&mut engine, None, "P0");
    for i in 1..=3 {
        bottom = join(&mut engine, Some(&bottom), &format!("P{i}"));
    }
    let newcomer = join(&mut engine, None, "Newcomer");

    let conn = Connection::open(&db_path).unwrap();
    conn.execute("DELETE FROM hierarchy_edges WHERE child_id = ?1", [&bottom.partner_id])
        .unwrap();

    assert!(engine.can_link(&newcomer.partner_id, &bottom.partner_id).unwrap());
    let shallow = engine_with_max(&db_path, 2);
    assert!(!shallow.can_link(&newcomer.partner_id, &bottom.partner_id).unwrap());
}

#[test]
fn lowered_depth_limit_reports_too_deep_rather_than_a_cycle() {
    let dir = TempDir::new().unwrap();
    let (mut engine, db_path) = engine(&dir);
    let mut bottom = join(&mut engine, None, "P0");
    for i in 1..=3 {
        bottom = join(&mut engine, Some(&bottom), &format!("P{i}"));
    }
    let loner = join(&mut engine, None, "Loner");

    let mut shallow = engine_with_max(&db_path, 2);
    let err = shallow
        .register_partner(Some(&bottom.partner_code), &profile("Late"))
        .unwrap_err();
    assert!(
        matches!(err, EngineError::HierarchyTooDeep { depth: 3, max_levels: 2 }),
        "got {err:?}"
    );

    let err = shallow
        .attach_sponsor(&loner.partner_id, &bottom.partner_code)
        .unwrap_err();
    assert!(
        matches!(err, EngineError::HierarchyTooDeep { depth: 3, max_levels: 2 }),
        "got {err:?}"
    );
}
