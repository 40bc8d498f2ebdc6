use taskq_rs::config::{Config, ProcessorConfig};

// Env vars are process-global; keep every env assertion in one test so
// parallel tests can't race on them.
#[test]
fn config_from_env() {
    unsafe {
        std::env::remove_var("TASKQ_QUEUE_CAPACITY");
        std::env::remove_var("TASKQ_WORKER_NAME");
    }
    let config = Config::from_env().unwrap();
    assert!(!config.log_level.is_empty());
    assert_eq!(config.queue_capacity, None);
    assert_eq!(config.worker_name, None);

    unsafe {
        std::env::set_var("TASKQ_QUEUE_CAPACITY", "64");
        std::env::set_var("TASKQ_WORKER_NAME", "mailer");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.queue_capacity, Some(64));

    let applied = config.apply_to(ProcessorConfig::default().capacity(8));
    assert_eq!(applied.capacity, Some(64));
    assert_eq!(applied.worker_name, "mailer");

    unsafe {
        std::env::set_var("TASKQ_QUEUE_CAPACITY", "lots");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("TASKQ_QUEUE_CAPACITY", "0");
    }
    assert!(Config::from_env().is_err());

    // Clean up
    unsafe {
        std::env::remove_var("TASKQ_QUEUE_CAPACITY");
        std::env::remove_var("TASKQ_WORKER_NAME");
    }
}

#[test]
fn processor_config_from_toml() {
    let config = ProcessorConfig::from_toml_str(
        r#"
        [processor]
        capacity = 1024
        worker_name = "ingest-worker"
        "#,
    )
    .unwrap();
    assert_eq!(config.capacity, Some(1024));
    assert_eq!(config.worker_name, "ingest-worker");
}

#[test]
fn processor_config_defaults_missing_fields() {
    let config = ProcessorConfig::from_toml_str("[processor]\ncapacity = 3\n").unwrap();
    assert_eq!(config.capacity, Some(3));
    assert_eq!(config.worker_name, ProcessorConfig::default().worker_name);

    let empty = ProcessorConfig::from_toml_str("").unwrap();
    assert_eq!(empty, ProcessorConfig::default());
}

#[test]
fn processor_config_rejects_bad_values() {
    assert!(ProcessorConfig::from_toml_str("[processor]\ncapacity = 0\n").is_err());
    assert!(ProcessorConfig::from_toml_str("[processor]\nworker_name = \"  \"\n").is_err());
    assert!(ProcessorConfig::from_toml_str("[processor]\ncapacity = \"big\"\n").is_err());
}

#[test]
fn processor_config_from_missing_file_fails() {
    let path = std::env::temp_dir().join(format!("taskq-missing-{}.toml", uuid::Uuid::new_v4()));
    assert!(ProcessorConfig::from_file(&path).is_err());
}

#[test]
fn processor_config_from_file() {
    let path = std::env::temp_dir().join(format!("taskq-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "[processor]\nworker_name = \"from-file\"\n").unwrap();

    let config = ProcessorConfig::from_file(&path).unwrap();
    assert_eq!(config.worker_name, "from-file");
    assert_eq!(config.capacity, None);

    std::fs::remove_file(&path).unwrap();
}
