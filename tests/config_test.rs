use std::io::Write;

use redq::config::{Config, ExposeSecret, OptionsFile};
use redq::Error;

// Both cases touch the same process environment, so they run in one test.
#[test]
fn config_from_env_requires_redis_url() {
    unsafe {
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("REDQ_OPTIONS");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::set_var("REDIS_URL", "redis://:secret@localhost:6379/0");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.redis_url.expose_secret(),
        "redis://:secret@localhost:6379/0"
    );
    assert!(!config.log_level.is_empty());
    assert!(!format!("{config:?}").contains("secret@"));

    // No options file means defaults for every primitive.
    assert_eq!(config.load_options().unwrap(), OptionsFile::default());

    unsafe {
        std::env::remove_var("REDIS_URL");
    }
}

#[test]
fn options_file_loads_sections_from_disk() {
    let path = std::env::temp_dir().join(format!("redq-options-{}.toml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
[queue]
get_max_chunk_size = 10
processing_timeout = 60

[pool]
ack_ttl = 30

[pool.replica_sync]
enabled = true
required_count = 2
"#
    )
    .unwrap();
    drop(file);

    let options = OptionsFile::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(options.queue.get_max_chunk_size, 10);
    assert_eq!(options.queue.processing_timeout, 60);
    assert_eq!(options.queue.add_max_chunk_size, 100);
    assert_eq!(options.pool.ack_ttl, 30);
    assert!(options.pool.replica_sync.enabled);
    assert_eq!(options.pool.replica_sync.required_count, 2);
    assert_eq!(options.unique_queue, Default::default());
}

#[test]
fn options_file_rejects_unknown_keys() {
    let err = OptionsFile::from_toml_str("[queue]\nget_max_chunk = 10\n").unwrap_err();
    assert!(matches!(err, Error::UnknownOption(ref key) if key == "get_max_chunk"));

    let err = OptionsFile::from_toml_str("[worker]\n").unwrap_err();
    assert!(matches!(err, Error::UnknownOption(ref key) if key == "worker"));
}

#[test]
fn missing_options_file_is_an_error() {
    assert!(OptionsFile::load("/nonexistent/redq-options.toml").is_err());
}
