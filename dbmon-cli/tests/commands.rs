//! Command runner tests against real files.
//!
//! This test suite covers:
//! - transform writing YAML or JSON with owner-only permissions
//! - transform dry runs leaving the filesystem untouched
//! - duplicate names failing the run with a schema error
//! - blank fields excluding only their own entry
//! - validate reports and remediation scripts
//! - discover turning saved RDS descriptions into an input document
//! - discover scoped by the discovery block of a config document

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};

use dbmon_cli::{DiscoverArgs, RunStatus, TransformArgs, ValidateArgs, commands, failure_code};
use dbmon_core::{DbMonError, InputFormat, ReportFormat, normalize, parse_document};
use tempfile::TempDir;

const MIXED: &str = r"
mysql_databases:
  - name: legacy-mysql
    host: mysql.internal
    user: newrelic
    password: legacy-pass
databases:
  - name: enhanced-pg
    type: postgresql
    provider: ec2
    connection: {host: 10.0.0.12, database: orders}
    credentials: {password: pg-pass}
";

const AURORA_WITHOUT_READER: &str = r"
databases:
  - name: orders-cluster
    type: mysql
    provider: aurora
    connection:
      cluster_endpoint: orders.cluster-abc123.us-west-2.rds.amazonaws.com
    credentials: {password: p}
  - name: healthy
    type: mysql
    connection: {host: mysql.internal}
    credentials: {password: p}
";

fn write_input(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn transform_args(inputs: Vec<PathBuf>, output: Option<PathBuf>) -> TransformArgs {
    TransformArgs {
        inputs,
        output,
        region: None,
        dry_run: false,
        show_secrets: false,
    }
}

fn validate_args(inputs: Vec<PathBuf>, fix_output: &Path) -> ValidateArgs {
    ValidateArgs {
        inputs,
        fix: true,
        fix_output: fix_output.to_path_buf(),
        offline: true,
        format: ReportFormat::Text,
        region: None,
    }
}

// =============================================================================
// transform
// =============================================================================

#[tokio::test]
async fn test_transform_writes_yaml() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "databases.yml", MIXED);
    let output = dir.path().join("out.yml");

    let status = commands::transform(&transform_args(vec![input], Some(output.clone())))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Clean);
    let rendered = std::fs::read_to_string(&output).unwrap();
    assert!(rendered.contains("service_name: legacy-mysql"));
    assert!(rendered.contains("service_name: enhanced-pg"));
    assert!(rendered.contains("legacy-pass"));
    assert!(!rendered.contains("password_source"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn test_transform_json_by_extension() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "databases.yml", MIXED);
    let output = dir.path().join("out.json");

    commands::transform(&transform_args(vec![input], Some(output.clone())))
        .await
        .unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(value["mysql_databases"][0]["service_name"], "legacy-mysql");
    assert_eq!(value["postgresql_databases"][0]["database"], "orders");
}

#[tokio::test]
async fn test_transform_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "databases.yml", MIXED);
    let output = dir.path().join("out.yml");

    let mut args = transform_args(vec![input], Some(output.clone()));
    args.dry_run = true;
    commands::transform(&args).await.unwrap();

    assert!(!output.exists());
}

#[tokio::test]
async fn test_transform_reports_issues_but_writes_healthy_entries() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "aurora.yml", AURORA_WITHOUT_READER);
    let output = dir.path().join("out.yml");

    let status = commands::transform(&transform_args(vec![input], Some(output.clone())))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::IssuesFound);
    assert_eq!(status.code(), 1);
    let rendered = std::fs::read_to_string(&output).unwrap();
    assert!(rendered.contains("service_name: healthy"));
    assert!(!rendered.contains("orders-cluster"));
}

#[tokio::test]
async fn test_transform_duplicate_names_fail_without_output() {
    let dir = TempDir::new().unwrap();
    let first = write_input(
        &dir,
        "first.yml",
        "mysql_databases:\n  - {name: prod-db, host: a.internal, password: p}\n",
    );
    let second = write_input(
        &dir,
        "second.yml",
        "postgresql_databases:\n  - {name: prod-db, host: b.internal, password: p}\n",
    );
    let output = dir.path().join("out.yml");

    let err = commands::transform(&transform_args(vec![first, second], Some(output.clone())))
        .await
        .unwrap_err();

    assert!(matches!(err, DbMonError::Schema { .. }));
    assert_eq!(failure_code(&anyhow::Error::new(err)), 1);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_transform_blank_fields_exclude_only_their_entry() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        &dir,
        "blank.yml",
        r"
databases:
  - name: blank-user
    type: mysql
    connection: {host: mysql.internal}
    credentials: {username: '', password: p}
  - name: blank-database
    type: postgresql
    connection: {host: pg.internal, database: ''}
    credentials: {password: p}
  - name: backend-named-password
    type: mysql
    connection: {host: mysql.internal}
    credentials: {password: env_var}
    labels: {origin: aws_secrets_manager}
",
    );
    let output = dir.path().join("out.yml");

    let status = commands::transform(&transform_args(vec![input], Some(output.clone())))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::IssuesFound);
    let rendered = std::fs::read_to_string(&output).unwrap();
    assert!(rendered.contains("service_name: backend-named-password"));
    assert!(rendered.contains("password: env_var"));
    assert!(!rendered.contains("blank-user"));
    assert!(!rendered.contains("blank-database"));
}

#[tokio::test]
async fn test_transform_missing_input_is_io_failure() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.yml");

    let err = commands::transform(&transform_args(vec![missing], None))
        .await
        .unwrap_err();

    assert!(matches!(err, DbMonError::Io { .. }));
    assert_eq!(failure_code(&anyhow::Error::new(err)), 2);
}

// =============================================================================
// validate
// =============================================================================

#[tokio::test]
async fn test_validate_offline_writes_fix_script() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "aurora.yml", AURORA_WITHOUT_READER);
    let script_path = dir.path().join("fix.sh");

    let status = commands::validate(&validate_args(vec![input], &script_path))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::IssuesFound);
    let script = std::fs::read_to_string(&script_path).unwrap();
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("# Generated: "));
    assert!(script.contains("# orders-cluster: connection.reader_endpoint"));
    assert!(script.contains("aws rds describe-db-clusters"));
}

#[tokio::test]
async fn test_validate_clean_input_without_fix() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "databases.yml", MIXED);
    let script_path = dir.path().join("fix.sh");

    let mut args = validate_args(vec![input], &script_path);
    args.fix = false;
    args.format = ReportFormat::Json;
    let status = commands::validate(&args).await.unwrap();

    assert_eq!(status, RunStatus::Clean);
    assert!(!script_path.exists());
}

#[test]
fn test_validate_missing_env_var_credential_fix() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        &dir,
        "env.yml",
        r"
databases:
  - name: from-env
    type: postgresql
    connection: {host: pg.internal}
    credentials: {password_source: env_var, password_env: DBMON_CLI_TEST_PASS}
",
    );
    let script_path = dir.path().join("fix.sh");
    let mut args = validate_args(vec![input], &script_path);
    args.offline = false;

    temp_env::with_var_unset("DBMON_CLI_TEST_PASS", || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime builds");
        let status = runtime.block_on(commands::validate(&args)).unwrap();
        assert_eq!(status, RunStatus::IssuesFound);
    });

    let script = std::fs::read_to_string(&script_path).unwrap();
    assert!(script.contains("export DBMON_CLI_TEST_PASS='YOUR_PASSWORD'"));
}

// =============================================================================
// discover
// =============================================================================

const INSTANCES: &str = r#"{
  "DBInstances": [
    {
      "DBInstanceIdentifier": "orders-db",
      "Engine": "mysql",
      "EngineVersion": "8.0.35",
      "DBInstanceStatus": "available",
      "Endpoint": {"Address": "orders-db.abc123.us-east-1.rds.amazonaws.com", "Port": 3306},
      "TagList": [{"Key": "monitor", "Value": "newrelic"}, {"Key": "team", "Value": "payments"}]
    },
    {
      "DBInstanceIdentifier": "untagged",
      "Engine": "postgres",
      "DBInstanceStatus": "available",
      "Endpoint": {"Address": "untagged.abc123.us-east-1.rds.amazonaws.com", "Port": 5432},
      "TagList": []
    }
  ]
}"#;

fn discover_args(instances: PathBuf, output: PathBuf) -> DiscoverArgs {
    DiscoverArgs {
        region: "us-east-1".to_string(),
        instances: Some(instances),
        clusters: None,
        config: None,
        tag_filters: Vec::new(),
        output: Some(output),
    }
}

#[tokio::test]
async fn test_discover_output_feeds_normalizer() {
    let dir = TempDir::new().unwrap();
    let instances = write_input(&dir, "instances.json", INSTANCES);
    let output = dir.path().join("discovered.yml");

    let status = commands::discover_resources(&discover_args(instances, output.clone()))
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Clean);

    let text = std::fs::read_to_string(&output).unwrap();
    let config = normalize(&[parse_document(&text, InputFormat::Yaml).unwrap()]).unwrap();
    let names: Vec<&str> = config.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["orders-db"]);
}

#[tokio::test]
async fn test_discover_tag_filter_override() {
    let dir = TempDir::new().unwrap();
    let instances = write_input(&dir, "instances.json", INSTANCES);
    let output = dir.path().join("discovered.json");

    let mut args = discover_args(instances, output.clone());
    args.tag_filters = vec![("team".to_string(), "search".to_string())];
    commands::discover_resources(&args).await.unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(value["mysql_databases"].as_array().unwrap().len(), 0);
    assert_eq!(value["_metadata"]["tag_filters"]["team"], "search");
}

#[tokio::test]
async fn test_discover_requires_a_description_file() {
    let dir = TempDir::new().unwrap();
    let mut args = discover_args(dir.path().join("unused.json"), dir.path().join("out.yml"));
    args.instances = None;

    let err = commands::discover_resources(&args).await.unwrap_err();
    assert!(matches!(err, DbMonError::Configuration { .. }));
}

#[tokio::test]
async fn test_discover_uses_config_discovery_block() {
    let dir = TempDir::new().unwrap();
    let instances = write_input(&dir, "instances.json", INSTANCES);
    let config = write_input(
        &dir,
        "databases.yml",
        "discovery:\n  regions: [us-east-1]\n  tag_filters: {team: payments}\n",
    );
    let output = dir.path().join("discovered.json");

    let mut args = discover_args(instances, output.clone());
    args.config = Some(config);
    commands::discover_resources(&args).await.unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(value["mysql_databases"][0]["name"], "orders-db");
    assert_eq!(value["_metadata"]["tag_filters"]["team"], "payments");
    assert!(value["_metadata"]["tag_filters"].get("monitor").is_none());
}

#[tokio::test]
async fn test_discover_config_region_scope_and_disable() {
    let dir = TempDir::new().unwrap();
    let instances = write_input(&dir, "instances.json", INSTANCES);

    let other_region = write_input(&dir, "eu.yml", "discovery:\n  regions: [eu-west-1]\n");
    let output = dir.path().join("scoped.json");
    let mut args = discover_args(instances.clone(), output.clone());
    args.config = Some(other_region);
    commands::discover_resources(&args).await.unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(value["mysql_databases"].as_array().unwrap().len(), 0);
    assert_eq!(value["_metadata"]["regions_scanned"].as_array().unwrap().len(), 0);

    let disabled = write_input(&dir, "off.yml", "discovery:\n  enabled: false\n");
    let untouched = dir.path().join("untouched.json");
    let mut args = discover_args(instances, untouched.clone());
    args.config = Some(disabled);
    let status = commands::discover_resources(&args).await.unwrap();
    assert_eq!(status, RunStatus::Clean);
    assert!(!untouched.exists());
}
