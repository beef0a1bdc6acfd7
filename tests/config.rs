use colonnade::engine::config::{CompactionPolicy, DeltaTime, ExecutionMode, RuntimeConfig};
use colonnade::engine::error::{ConfigError, ECSError};

#[test]
fn defaults_are_sequential_and_measured() {
    let config = RuntimeConfig::default();
    assert_eq!(config.mode, ExecutionMode::Sequential);
    assert_eq!(config.worker_threads, None);
    assert_eq!(config.thread_name_prefix, "colonnade");
    assert!(config.inner_parallelism);
    assert!(config.conflict_detection);
    assert_eq!(config.compaction, CompactionPolicy::EveryTick);
    assert_eq!(config.delta_time, DeltaTime::Measured);
    assert_eq!(config.initial_capacity, 0);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_document_yields_defaults() {
    let config = RuntimeConfig::from_toml_str("").unwrap();
    assert_eq!(config, RuntimeConfig::default());
}

#[test]
fn full_document_parses() {
    let source = r#"
        mode = "parallel"
        worker_threads = 4
        thread_name_prefix = "sim"
        inner_parallelism = false
        conflict_detection = true
        compaction = { threshold = 128 }
        delta_time = { fixed = 0.016 }
        initial_capacity = 10000
    "#;

    let config = RuntimeConfig::from_toml_str(source).unwrap();
    assert_eq!(config.mode, ExecutionMode::Parallel);
    assert_eq!(config.worker_threads, Some(4));
    assert_eq!(config.thread_name_prefix, "sim");
    assert!(!config.inner_parallelism);
    assert_eq!(config.compaction, CompactionPolicy::Threshold(128));
    assert_eq!(config.delta_time, DeltaTime::Fixed(0.016));
    assert_eq!(config.initial_capacity, 10_000);
}

#[test]
fn unit_variants_parse_as_strings() {
    let config = RuntimeConfig::from_toml_str("compaction = \"manual\"\ndelta_time = \"measured\"").unwrap();
    assert_eq!(config.compaction, CompactionPolicy::Manual);
    assert_eq!(config.delta_time, DeltaTime::Measured);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = RuntimeConfig::from_toml_str("workers = 4");
    assert!(matches!(result, Err(ECSError::Config(ConfigError::Invalid(_)))));
}

#[test]
fn out_of_range_values_are_rejected() {
    for source in ["worker_threads = 0", "delta_time = { fixed = -0.5 }", "mode = \"turbo\""] {
        let result = RuntimeConfig::from_toml_str(source);
        assert!(
            matches!(result, Err(ECSError::Config(ConfigError::Invalid(_)))),
            "accepted `{source}`"
        );
    }

    let nan = RuntimeConfig::sequential().with_fixed_delta(f64::NAN);
    assert!(matches!(nan.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn builders_compose() {
    let config = RuntimeConfig::parallel()
        .with_worker_threads(2)
        .with_compaction(CompactionPolicy::Manual)
        .with_fixed_delta(0.5)
        .with_conflict_detection(false)
        .with_inner_parallelism(false);

    assert_eq!(config.mode, ExecutionMode::Parallel);
    assert_eq!(config.worker_threads, Some(2));
    assert_eq!(config.compaction, CompactionPolicy::Manual);
    assert_eq!(config.delta_time, DeltaTime::Fixed(0.5));
    assert!(!config.conflict_detection);
    assert!(!config.inner_parallelism);
}
