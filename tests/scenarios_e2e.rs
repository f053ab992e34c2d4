use fai_progress::{ProgressEngine, ProgressSnapshot, RuleTable, SessionId, FINISHED_TASK};

fn engine() -> ProgressEngine {
    ProgressEngine::new(RuleTable::fai().unwrap()).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn defvar_install_line_starts_installation() {
    let engine = engine();
    let id = engine.open_session().unwrap();
    engine.activate_task(id, "defvar").unwrap();

    let snapshot = engine.ingest(id, "FAI_ACTION: install").unwrap().unwrap();
    assert_eq!(snapshot.session, id);
    assert_eq!(snapshot.task, "defvar");
    assert_eq!(snapshot.message, "Starting installation");
    assert!(approx(snapshot.rule_fraction, 1.0));
    assert!(approx(snapshot.task_fraction, 1.0));
}

#[test]
fn action_line_sets_label_without_counting() {
    let engine = engine();
    let id = engine.open_session().unwrap();
    engine.activate_task(id, "action").unwrap();

    let snapshot = engine.ingest(id, "FAI_ACTION: partition").unwrap().unwrap();
    assert_eq!(snapshot.label, "Performing partition");
    assert_eq!(snapshot.message, "Performing partition");

    let ctx = engine.task_context(id, "action").unwrap();
    assert_eq!(ctx.active_action_label(), Some("Performing partition"));
    assert_eq!(ctx.total_hits(), 0);
}

#[test]
fn parted_lines_widen_fixed_rule() {
    let engine = engine();
    let id = engine.open_session().unwrap();
    engine.activate_task(id, "partition").unwrap();

    let snapshots: Vec<ProgressSnapshot> = (0..10)
        .map(|i| {
            engine
                .ingest(id, &format!("Executing: parted -s /dev/sda mkpart primary {i}"))
                .unwrap()
                .unwrap()
        })
        .collect();

    for (i, snapshot) in snapshots.iter().enumerate() {
        let expected = f64::from(u32::try_from(i + 1).unwrap()) / 10.0;
        assert!(approx(snapshot.rule_fraction, expected), "snapshot {i}: {}", snapshot.rule_fraction);
        assert_eq!(snapshot.message, "Partitioning harddisk");
    }
    assert!(approx(snapshots[9].rule_fraction, 1.0));
    // parted is one of three progress rules for partition
    assert!(approx(snapshots[9].task_fraction, 1.0 / 3.0));
}

#[test]
fn recurring_get_lines_emit_each_occurrence() {
    let engine = engine();
    let id = engine.open_session().unwrap();
    engine.activate_task(id, "instsoft").unwrap();

    let first = engine
        .ingest(id, "Get: 1 http://mirror/ stable/main libfoo amd64 1.2 [100kB]")
        .unwrap()
        .unwrap();
    assert_eq!(first.message, "Retrieving libfoo 1.2 ...");
    assert!(approx(first.rule_fraction, 1.0));

    let second = engine
        .ingest(id, "Get: 2 http://mirror/ stable/main libbar amd64 2.0 [5kB]")
        .unwrap()
        .unwrap();
    assert_eq!(second.message, "Retrieving libbar 2.0 ...");
    assert!(approx(second.rule_fraction, 1.0));
    assert_ne!(first.message, second.message);
}

#[test]
fn package_summary_records_totals_silently() {
    let engine = engine();
    let id = engine.open_session().unwrap();
    engine.activate_task(id, "instsoft").unwrap();

    let out = engine
        .ingest(id, "3 upgraded, 10 newly installed, 2 to remove and 0 not upgraded.")
        .unwrap();
    assert!(out.is_none());

    let totals = engine.task_context(id, "instsoft").unwrap().package_totals().unwrap();
    assert_eq!((totals.upgrades, totals.installs, totals.removes), (3, 10, 2));
    assert_eq!(engine.task_context(id, "instsoft").unwrap().total_hits(), 0);
}

#[test]
fn unmatched_line_is_ignored() {
    let engine = engine();
    let id = engine.open_session().unwrap();
    engine.activate_task(id, "partition").unwrap();
    let before = engine.task_context(id, "partition").unwrap();

    assert!(engine.ingest(id, "W: some unrelated warning").unwrap().is_none());

    assert_eq!(engine.task_context(id, "partition").unwrap(), before);
    assert_eq!(engine.session_stats(id).unwrap().snapshots, 0);
}

#[test]
fn full_log_replay_progresses_to_the_end() {
    let engine = engine();
    let id = engine.open_session_with_id(SessionId::new()).unwrap();

    let mut snapshots = Vec::new();
    for line in include_str!("fixtures/fai_install.log").lines() {
        if let Some(snapshot) = engine.ingest(id, line).unwrap() {
            snapshots.push(snapshot);
        }
    }

    assert!(!engine.is_open(id).unwrap());
    assert!(!snapshots.is_empty());

    let mut last = 0.0;
    for snapshot in &snapshots {
        assert!((0.0..=1.0).contains(&snapshot.rule_fraction));
        assert!((0.0..=1.0).contains(&snapshot.task_fraction));
        let overall = snapshot.overall_percent.unwrap();
        assert!(overall >= last, "overall went from {last} to {overall}");
        last = overall;
    }

    let [.., savelog, end] = snapshots.as_slice() else {
        panic!("replay emitted {} snapshots", snapshots.len());
    };
    assert_eq!(savelog.task, "savelog");
    assert_eq!(savelog.message, "Installation finished");
    assert!(approx(savelog.overall_percent.unwrap(), 98.0));
    assert_eq!(end.task, FINISHED_TASK);
    assert_eq!(end.message, "Finished");
    assert!(approx(end.overall_percent.unwrap(), 100.0));

    let messages: Vec<&str> = snapshots.iter().map(|s| s.message.as_str()).collect();
    assert!(messages.contains(&"Retrieving libbar 2.0-1 ..."));
    assert!(messages.contains(&"Executing script 30-interface of class DEBIAN"));
    assert!(messages.contains(&"Running test 10-check"));
}

#[test]
fn softupdate_uses_softupdate_targets() {
    let extrbase = [
        "I: Retrieving libc6 2.36-9",
        "I: Validating libc6 2.36-9",
        "I: Unpacking the base system...",
        "I: Extracting base-files...",
        "I: Unpacking libc6...",
        "I: Configuring libc6...",
        "I: Resolving dependencies",
        "I: Checking component main on http://deb.debian.org/debian...",
    ];

    let run = |action: &str| {
        let engine = engine();
        let id = engine.open_session().unwrap();
        engine.ingest(id, "Calling task_action").unwrap();
        engine.ingest(id, &format!("FAI_ACTION: {action}")).unwrap();
        engine.ingest(id, "Calling task_extrbase").unwrap();
        for line in extrbase {
            let snapshot = engine.ingest(id, line).unwrap().unwrap();
            assert!(snapshot.task_fraction < 1.0);
        }
        engine.ingest(id, "Calling task_debconf").unwrap().unwrap()
    };

    let install = run("install");
    assert_eq!(install.task, "debconf");
    assert!(approx(install.overall_percent.unwrap(), 15.0));

    let softupdate = run("softupdate");
    assert!(approx(softupdate.overall_percent.unwrap(), 5.0));
}

#[test]
fn one_package_barely_moves_instsoft() {
    let engine = engine();
    let id = engine.open_session().unwrap();
    engine.ingest(id, "Calling task_instsoft").unwrap();
    engine
        .ingest(id, "0 upgraded, 2500 newly installed, 0 to remove and 0 not upgraded.")
        .unwrap();

    let get = engine
        .ingest(id, "Get: 1 http://mirror/ stable/main libfoo amd64 1.2 [100kB]")
        .unwrap()
        .unwrap();
    assert!(approx(get.rule_fraction, 1.0));

    let mut last = get;
    for line in ["Unpacking libfoo (from .../libfoo_1.2_amd64.deb) ...", "Setting up libfoo (1.2) ..."] {
        let snapshot = engine.ingest(id, line).unwrap().unwrap();
        assert!(snapshot.overall_percent.unwrap() >= last.overall_percent.unwrap());
        last = snapshot;
    }

    // three steps out of roughly 2500 per kind
    assert!(last.task_fraction < 0.01, "task fraction {}", last.task_fraction);
    assert!(last.overall_percent.unwrap() < 1.0, "overall {:?}", last.overall_percent);
}
