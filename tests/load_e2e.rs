use std::io::Write;

use fai_progress::{ConfigError, EngineConfig, ProgressEngine, RuleRecord, RuleTable, WeightingPolicy};

#[test]
fn bundled_table_builds_strict_engine() {
    let table = RuleTable::fai().unwrap();
    assert!(table.has_milestones());
    assert!(table.has_rules("partition"));
    assert!(table.knows_task("savelog"));
    assert!(!table.has_rules("savelog"));

    // the apt rules are shared by updatebase and instsoft
    let shared: Vec<usize> = table.lookup("updatebase").iter().map(|r| r.id().index()).collect();
    let instsoft: Vec<usize> = table.lookup("instsoft").iter().map(|r| r.id().index()).collect();
    assert_eq!(shared, instsoft);

    let engine = ProgressEngine::new(table).unwrap();
    assert!(engine.config().strict_actions);
}

#[test]
fn invalid_tables_refuse_to_start() {
    let cases = vec![
        (
            RuleRecord {
                tasks: Vec::new(),
                ..RuleRecord::new("x", "update_progress", "^x")
            },
            "empty task set",
        ),
        (RuleRecord::new("x", "update_progress", "^x").expected_hits(0), "zero hits"),
        (RuleRecord::new("x", "update_progress", "^x").expected_hits(-3), "negative hits"),
        (RuleRecord::new("x", "update_progress", "(unclosed"), "bad pattern"),
    ];

    for (record, what) in cases {
        let records = vec![RuleRecord::new("ok", "update_progress", "^fine"), record];
        let err = RuleTable::load(records).unwrap_err();
        let record_index = match err {
            ConfigError::EmptyTaskSet { record, .. }
            | ConfigError::InvalidExpectedHits { record, .. }
            | ConfigError::InvalidPattern { record, .. } => record,
            other => panic!("{what}: unexpected error {other}"),
        };
        assert_eq!(record_index, 1, "{what}");
    }
}

#[test]
fn yaml_file_with_custom_action_needs_handler() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        r"
- tasks: [finish]
  action: reboot
  parameters:
    pattern: '^Rebooting'
"
    )
    .unwrap();

    let table = RuleTable::from_path(file.path()).unwrap();
    let err = ProgressEngine::new(table.clone()).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownAction { record: 0, .. }));

    let lenient = EngineConfig {
        strict_actions: false,
        ..EngineConfig::default()
    };
    assert!(ProgressEngine::builder(table).config(lenient).build().is_ok());
}

#[test]
fn json_file_loads_document() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{
  "milestones": [{{ "task": "partition", "target_percent": 10 }}],
  "rules": [{{
    "tasks": ["partition"],
    "action": "update_progress",
    "parameters": {{ "message_template": "Partitioning", "pattern": "^Executing: parted", "expected_hits": 2 }}
  }}]
}}"#
    )
    .unwrap();

    let table = RuleTable::from_path(file.path()).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.milestone("partition").map(|m| m.description()), Some("partition"));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RuleTable::from_path(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn engine_config_from_yaml() {
    let config = EngineConfig::from_yaml_str(
        r"
weighting: package_count
strict_actions: false
directives:
  hangup: null
",
    )
    .unwrap();
    assert_eq!(config.weighting, WeightingPolicy::PackageCount);
    assert!(!config.strict_actions);
    assert_eq!(config.stream_capacity, 1024);
    assert!(config.directives.hangup.is_none());
    assert!(config.directives.task_switch.is_some());

    let err = EngineConfig::from_yaml_str("weighting: heaviest").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { format: "YAML", .. }));
}
