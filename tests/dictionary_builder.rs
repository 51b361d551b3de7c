//! 词典构建器集成测试
//!
//! 冲突裁决、坏记录计数、原子发布与导出文件来源

use std::fs;

use lexistream::config::BuilderConfig;
use lexistream::error::DictionaryError;
use lexistream::dictionary::{
    common_words, ConflictPolicy, DictionaryBuilder, DictionaryEntry, DictionarySource,
    ExportFileSource, MemorySource, Tag,
};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::TestStore;

fn builder(env: &TestStore) -> DictionaryBuilder {
    DictionaryBuilder::new(env.store(), BuilderConfig::default())
}

#[test]
fn test_higher_tag_wins_conflict() {
    let env = TestStore::new();
    let a = MemorySource::from_pairs("a", Tag::Common, &[("gato", "cat")]);
    let b = MemorySource::from_pairs("b", Tag::Unverified, &[("gato", "cat.")]);

    let report = builder(&env).build(&[&a, &b]).unwrap();

    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(report.published, 1);
    let entry = env.store.get("gato").unwrap().unwrap();
    assert_eq!(entry.tag, Tag::Common);
    assert_eq!(entry.translation, "cat");
}

#[test]
fn test_equal_tags_latest_source_wins() {
    let env = TestStore::new();
    let a = MemorySource::from_pairs("a", Tag::Rare, &[("banco", "bench")]);
    let b = MemorySource::from_pairs("b", Tag::Rare, &[("banco", "bank")]);

    builder(&env).build(&[&a, &b]).unwrap();

    assert_eq!(env.store.get("banco").unwrap().unwrap().translation, "bank");
}

#[test]
fn test_alternative_policies() {
    let a = MemorySource::from_pairs("a", Tag::Rare, &[("banco", "bench")]);
    let b = MemorySource::from_pairs("b", Tag::Rare, &[("banco", "bank")]);
    let c = MemorySource::from_pairs("c", Tag::Unverified, &[("banco", "shoal")]);
    let sources: [&dyn DictionarySource; 3] = [&a, &b, &c];

    let cases = [
        (ConflictPolicy::TagThenLatest, "bank"),
        (ConflictPolicy::PreferTag, "bench"),
        (ConflictPolicy::KeepFirst, "bench"),
        (ConflictPolicy::KeepLast, "shoal"),
    ];

    for (policy, expected) in cases {
        let env = TestStore::new();
        let report = builder(&env).with_policy(policy).build(&sources).unwrap();

        assert_eq!(report.conflicts_resolved, 2, "{:?}", policy);
        let entry = env.store.get("banco").unwrap().unwrap();
        assert_eq!(entry.translation, expected, "{:?}", policy);
    }
}

#[test]
fn test_malformed_and_empty_records_are_counted() {
    let env = TestStore::new();
    let source = MemorySource::from_pairs(
        "ruidoso",
        Tag::Rare,
        &[("<b>Casa</b>", "house"), ("...", "nothing"), ("mesa", "  ")],
    )
    .with_malformed("columna faltante");

    let report = builder(&env).build(&[&source]).unwrap();

    assert_eq!(report.total_source_records, 4);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 3);
    assert_eq!(report.published, 1);
    assert_eq!(report.sources[0].rejected, 3);
    assert_eq!(env.store.get("casa").unwrap().unwrap().translation, "house");
}

#[test]
fn test_build_replaces_previous_generation() {
    let env = TestStore::with_words(&[("viejo", "old")]);

    let first = MemorySource::from_pairs("uno", Tag::Common, &[("nuevo", "new")]);
    let report = builder(&env).build(&[&first]).unwrap();
    assert_eq!(report.generation, 1);
    assert!(env.store.get("viejo").unwrap().is_none());

    let second = MemorySource::from_pairs("dos", Tag::Common, &[("otro", "other")]);
    let config = BuilderConfig {
        include_live_entries: true,
        ..BuilderConfig::default()
    };
    let report = DictionaryBuilder::new(env.store(), config)
        .build(&[&second])
        .unwrap();

    assert_eq!(report.generation, 2);
    assert_eq!(report.published, 2);
    assert_eq!(report.sources[0].name, "live");
    assert!(env.store.get("nuevo").unwrap().is_some());

    let stats = env.store.stats().unwrap();
    assert_eq!(stats.generation, 2);
    let names: Vec<&str> = stats.sources.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"live"));
    assert!(names.contains(&"dos"));
}

#[test]
fn test_seeded_common_words_yield_to_later_sources() {
    let env = TestStore::new();
    let config = BuilderConfig {
        seed_common_words: true,
        ..BuilderConfig::default()
    };
    let override_source = MemorySource::from_pairs("propio", Tag::Common, &[("bonito", "nice")]);

    let report = DictionaryBuilder::new(env.store(), config)
        .build(&[&override_source])
        .unwrap();

    let seeded = common_words().records().count();
    assert_eq!(report.total_source_records, seeded + 1);
    assert_eq!(env.store.get("bonito").unwrap().unwrap().translation, "nice");
    assert_eq!(env.store.get("gato").unwrap().unwrap().translation, "cat");
}

#[test]
fn test_failed_publish_keeps_store_intact() {
    let env = TestStore::with_words(&[("perro", "dog")]);
    let staging = env.dir.path().join("dictionary.redb.staging");
    fs::create_dir(&staging).unwrap();

    let source = MemorySource::from_pairs("nuevo", Tag::Common, &[("gato", "cat")]);
    let result = builder(&env).build(&[&source]);

    assert!(result.is_err());
    assert_eq!(env.store.get("perro").unwrap().unwrap().translation, "dog");
    assert!(env.store.get("gato").unwrap().is_none());
    assert_eq!(env.store.generation().unwrap(), 0);
    assert!(env.store.is_available());
}

#[test]
fn test_export_file_round_trips_through_builder() {
    let env = TestStore::with_words(&[("sol", "sun"), ("luna", "moon")]);
    env.store
        .upsert(DictionaryEntry::new("nube".into(), "cloud".into(), Tag::Unverified))
        .unwrap();

    let export_path = env.dir.path().join("export.tsv");
    let mut file = fs::File::create(&export_path).unwrap();
    env.store.export_to_writer(&mut file).unwrap();
    drop(file);

    let target = TestStore::new();
    let source = ExportFileSource::new(&export_path);
    let report = builder(&target).build(&[&source]).unwrap();

    assert_eq!(report.published, 3);
    assert_eq!(report.rejected, 0);

    let original: Vec<(String, String, Tag)> = env
        .store
        .export_all()
        .unwrap()
        .into_iter()
        .map(|e| (e.normalized_word, e.translation, e.tag))
        .collect();
    let rebuilt: Vec<(String, String, Tag)> = target
        .store
        .export_all()
        .unwrap()
        .into_iter()
        .map(|e| (e.normalized_word, e.translation, e.tag))
        .collect();
    assert_eq!(original, rebuilt);
}

#[test]
fn test_unreadable_source_aborts_build() {
    let env = TestStore::with_words(&[("perro", "dog"), ("gato", "cat")]);
    let missing = ExportFileSource::new(env.dir.path().join("no-existe.tsv"));
    let present = MemorySource::from_pairs("ok", Tag::Common, &[("rojo", "red")]);

    let result = builder(&env).build(&[&present, &missing]);

    assert!(matches!(result, Err(DictionaryError::Io(_))));
    assert_eq!(env.store.len().unwrap(), 2);
    assert_eq!(env.store.get("gato").unwrap().unwrap().translation, "cat");
    assert!(env.store.get("rojo").unwrap().is_none());
    assert_eq!(env.store.generation().unwrap(), 0);
}

#[test]
fn test_build_without_sources_is_refused() {
    let env = TestStore::with_words(&[("perro", "dog")]);

    let result = builder(&env).build(&[]);

    assert!(matches!(result, Err(DictionaryError::Config(_))));
    assert_eq!(env.store.get("perro").unwrap().unwrap().translation, "dog");
    assert_eq!(env.store.generation().unwrap(), 0);
}
