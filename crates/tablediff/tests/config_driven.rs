//! Differs built from a YAML file on disk.

use std::io::Write;
use std::sync::Arc;

use futures::TryStreamExt;
use tablediff::core::SqlValue;
use tablediff::dialect::DialectKind;
use tablediff::{Config, DiffError, DiffKind, MemoryDatabase, TableDiffer, TableSegment};

const CONFIG: &str = r#"
table1:
  database:
    type: postgres
    host: localhost
    database: crm
    user: diff
    ssl_mode: disable
  table: public.contacts
  columns: [email]
table2:
  database:
    type: mysql
    host: localhost
    database: crm
    user: diff
    ssl_mode: disable
  table: contacts
  key_column: contact_id
  columns: [email]
diff:
  bisection_threshold: 4
  bisection_factor: 2
  max_concurrency: 2
type_overrides:
  - dialect: postgres
    type_name: citext
    category: text
"#;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn differ(config: &Config) -> TableDiffer {
    TableDiffer::new(
        config.diff.get_bisection_threshold(),
        config.diff.get_bisection_factor(),
        config.diff.get_max_concurrency(),
    )
    .unwrap()
    .with_registry(config.registry())
}

fn segments(config: &Config) -> (TableSegment, TableSegment) {
    let pg = MemoryDatabase::new("pg", DialectKind::Postgres);
    let path_a = config.table1.table_path().unwrap();
    pg.create_table(&path_a, &[("id", "bigint"), ("email", "citext")]);

    let my = MemoryDatabase::new("mysql", DialectKind::Mysql);
    let path_b = config.table2.table_path().unwrap();
    my.create_table(&path_b, &[("contact_id", "int"), ("email", "varchar(255)")]);

    for k in 1..=50i64 {
        let email = SqlValue::from(format!("user{}@example.com", k));
        pg.insert(&path_a, vec![SqlValue::I64(k), email.clone()]).unwrap();
        if k != 17 {
            my.insert(&path_b, vec![SqlValue::I64(k), email]).unwrap();
        }
    }

    let seg = |db: MemoryDatabase, table: &tablediff::config::TableConfig| {
        TableSegment::new(
            Arc::new(db),
            table.table_path().unwrap(),
            config.key_column_for(table),
            None,
            table.columns.clone(),
        )
        .unwrap()
    };
    (seg(pg, &config.table1), seg(my, &config.table2))
}

#[tokio::test]
async fn test_diff_from_config_file() {
    let file = write_config(CONFIG);
    let config = Config::load(file.path()).unwrap();
    let (a, b) = segments(&config);

    let events: Vec<_> = differ(&config)
        .diff_tables(&a, &b)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!((events[0].kind, events[0].key), (DiffKind::Removed, 17));
    assert_eq!(
        events[0].a,
        Some(vec![Some("user17@example.com".to_string())])
    );
}

#[tokio::test]
async fn test_missing_override_rejects_column() {
    let file = write_config(&CONFIG.replace("type_name: citext", "type_name: ltree"));
    let config = Config::load(file.path()).unwrap();
    let (a, b) = segments(&config);

    let err = differ(&config).diff_tables(&a, &b).await.err().unwrap();
    assert!(matches!(err, DiffError::Config(_)));
    assert!(err.to_string().contains("citext"));
}

#[test]
fn test_invalid_file_is_config_error() {
    let file = write_config(&CONFIG.replace("bisection_factor: 2", "bisection_factor: 1"));
    let err = Config::load(file.path()).unwrap_err();
    assert_eq!(err.exit_code(), tablediff::error::EXIT_CONFIG_ERROR);

    let file = write_config("table1: [not, a, table]");
    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, DiffError::Yaml(_)));
}
