//! Layered configuration loading and wiring a context from the result.

use conduit_support::config::ConfigLoader;
use conduit_support::context::SupportContextBuilder;
use conduit_support::id_generator::UuidGeneratorKind;
use conduit_support::SupportError;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn test_environment_file_and_overrides_layer_on_base() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "conduit.toml",
        r#"
[exchange]
pooled = true
pool_capacity = 50

[uuid]
generator = "simple"

[async_processing]
await_timeout_ms = 5000
"#,
    );
    write_config(
        &dir,
        "conduit.staging.toml",
        r#"
[exchange]
pool_capacity = 10

[reload]
enabled = true
folder = "routes"
"#,
    );

    let overrides = HashMap::from([(
        "CONDUIT__ASYNC_PROCESSING__AWAIT_TIMEOUT_MS".to_string(),
        "250".to_string(),
    )]);
    let loader =
        ConfigLoader::load_with_overrides(Some(dir.path().to_path_buf()), "staging", Some(overrides))
            .unwrap();

    let config = loader.config();
    assert_eq!(loader.environment(), "staging");
    assert!(config.exchange.pooled);
    assert_eq!(config.exchange.pool_capacity, 10);
    assert_eq!(config.uuid.generator, UuidGeneratorKind::Simple);
    assert!(config.reload.enabled);
    assert_eq!(config.reload.folder, "routes");
    assert_eq!(config.async_processing.await_timeout(), Some(Duration::from_millis(250)));
    // untouched sections keep their defaults
    assert!(config.polling.use_fixed_delay);
    assert_eq!(config.reload.pattern, "*.yaml,*.xml");
}

#[test]
fn test_missing_directory_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let loader = ConfigLoader::load_with_overrides(
        Some(dir.path().join("absent")),
        "production",
        Some(HashMap::new()),
    )
    .unwrap();
    assert_eq!(*loader.config(), Default::default());
}

#[test]
fn test_invalid_values_are_all_reported() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "conduit.toml",
        r#"
[polling]
delay_ms = 0

[reload]
enabled = true
"#,
    );

    let err = ConfigLoader::load_with_overrides(
        Some(dir.path().to_path_buf()),
        "development",
        Some(HashMap::new()),
    )
    .unwrap_err();
    let SupportError::Configuration(message) = err else {
        panic!("expected a configuration error, got {err:?}");
    };
    assert!(message.contains("polling.delay_ms"));
    assert!(message.contains("reload.folder"));
}

#[tokio::test]
async fn test_context_built_from_loaded_config() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "conduit.toml",
        r#"
[exchange]
pooled = "true"
pool_capacity = "8"

[uuid]
generator = "simple"

[async_processing]
await_timeout_ms = 100
statistics_enabled = true
"#,
    );
    let config = ConfigLoader::load_file(&dir.path().join("conduit.toml")).unwrap();

    let context = SupportContextBuilder::new("from-file")
        .config(config)
        .build()
        .unwrap();
    assert!(context.exchange_factory_manager().is_pooled());
    assert_eq!(context.exchange_factory_manager().capacity(), 8);
    assert_eq!(context.await_manager().timeout(), Some(Duration::from_millis(100)));
    assert!(context.await_manager().is_statistics_enabled());

    let first = context.new_exchange();
    let second = context.new_exchange();
    assert_eq!(first.exchange_id(), "1");
    assert_eq!(second.exchange_id(), "2");
}
