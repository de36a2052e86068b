// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Rule configuration persistence on disk

use detectlink::config::{field, ConfigStore, ConfigValue};
use detectlink::error::ConfigError;
use detectlink::rules::{Combinator, Relation, RuleSpec};

#[test]
fn first_run_bootstraps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.ini");

    let store = ConfigStore::open(&path).unwrap();
    assert!(path.exists());

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("[Config]"));
    let keys: Vec<&str> = text
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once('=').map(|(k, _)| k.trim()))
        .collect();
    assert_eq!(
        keys,
        vec![
            "yolo_model",
            "type_1",
            "type_2",
            "relation_1",
            "relation_2",
            "number_1",
            "number_2",
            "logic",
            "command",
            "negate_command",
            "has_negate",
        ]
    );
    assert_eq!(store.snapshot().get_int(field::NUMBER_1), 0);
}

#[test]
fn edits_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");

    {
        let store = ConfigStore::open(&path).unwrap();
        store
            .update(|record| {
                record.set_raw(field::TYPE_1, "person")?;
                record.set_raw(field::RELATION_1, "3")?;
                record.set_raw(field::NUMBER_1, "2")?;
                record.set_raw(field::LOGIC, "1")?;
                record.set_raw(field::COMMAND, "show %1 ; now")?;
                record.set_raw(field::NEGATE_COMMAND, "True")?;
                record.set_raw(field::HAS_NEGATE, "True")
            })
            .unwrap();
    }

    let store = ConfigStore::open(&path).unwrap();
    let record = store.snapshot();
    assert_eq!(record.get_str(field::COMMAND), "show %1 ; now");
    assert_eq!(record.get(field::NEGATE_COMMAND), Some(&ConfigValue::Str("True".to_string())));
    assert!(record.get_bool(field::HAS_NEGATE));

    let rule = RuleSpec::from_record(&record);
    assert_eq!(rule.clause_a.relation, Some(Relation::NotEqual));
    assert_eq!(rule.combinator, Some(Combinator::AOrB));
    assert!(rule.warnings().is_empty());
}

#[test]
fn export_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = ConfigStore::open(dir.path().join("a.ini")).unwrap();
    source
        .update(|record| {
            record.set_raw(field::TYPE_2, "dog")?;
            record.set_raw(field::NUMBER_2, "4")
        })
        .unwrap();
    let exported = dir.path().join("rules.json");
    source.export_to(&exported).unwrap();

    let target = ConfigStore::open(dir.path().join("b.ini")).unwrap();
    let before = target.revision();
    let record = target.import_from(&exported).unwrap();
    assert_eq!(record.get_str(field::TYPE_2), "dog");
    assert_eq!(record.get_int(field::NUMBER_2), 4);
    assert!(target.revision() > before);

    let reopened = ConfigStore::open(dir.path().join("b.ini")).unwrap();
    assert_eq!(reopened.snapshot(), record);
}

#[test]
fn corrupt_file_is_reported_not_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    std::fs::write(&path, "[Config]\nnumber_1 = lots\n").unwrap();

    let err = ConfigStore::open(&path).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedValueType { .. }));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "[Config]\nnumber_1 = lots\n"
    );
}

#[test]
fn corrupt_file_falls_back_until_reset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.ini");
    std::fs::write(&path, "[Config]\nnumber_1 = lots\n").unwrap();

    let (store, err) = ConfigStore::open_or_default(&path);
    assert!(matches!(err, Some(ConfigError::UnsupportedValueType { .. })));
    assert_eq!(store.snapshot().get_int(field::NUMBER_1), 0);
    assert!(RuleSpec::from_record(&store.snapshot()).evaluate(3, 0));

    store.reset().unwrap();
    let reopened = ConfigStore::open(&path).unwrap();
    assert_eq!(reopened.snapshot(), store.snapshot());
}
