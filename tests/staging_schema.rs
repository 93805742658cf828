use gradeimportd::db::{self, MAIN_TABLE, STAGING_TABLE};
use gradeimportd::staging::{count_rows, ensure_schema_present, truncate_staging};
use gradeimportd::ImportError;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn schema_check_never_creates_tables() {
    let workspace = temp_dir("gradeimport-schema-missing");
    let conn = db::open_db(&workspace, Duration::from_secs(5)).expect("open db");

    let err = ensure_schema_present(&conn).unwrap_err();
    assert!(matches!(err, ImportError::SchemaMissing { ref table } if table == MAIN_TABLE));
    assert!(!db::table_exists(&conn, MAIN_TABLE).expect("exists"));
    assert!(!db::table_exists(&conn, STAGING_TABLE).expect("exists"));

    db::provision_results_tables(&conn).expect("provision");
    ensure_schema_present(&conn).expect("schema present");
}

#[test]
fn staging_missing_a_column_is_reported() {
    let workspace = temp_dir("gradeimport-schema-column");
    let conn = db::open_db(&workspace, Duration::from_secs(5)).expect("open db");
    db::provision_results_tables(&conn).expect("provision");
    conn.execute_batch(&format!(
        "DROP TABLE {s}; CREATE TABLE {s}(id INTEGER PRIMARY KEY, \"SNH\" TEXT);",
        s = STAGING_TABLE
    ))
    .expect("narrow staging");

    match ensure_schema_present(&conn) {
        Err(ImportError::SchemaMissing { table }) => {
            assert!(table.starts_with(STAGING_TABLE), "{table}");
            assert!(table.contains("Semester_Offered"), "{table}");
        }
        other => panic!("expected SchemaMissing, got {other:?}"),
    }
}

#[test]
fn truncate_empties_staging_and_leaves_main_alone() {
    let workspace = temp_dir("gradeimport-truncate");
    let conn = db::open_db(&workspace, Duration::from_secs(5)).expect("open db");
    db::provision_results_tables(&conn).expect("provision");
    for table in [MAIN_TABLE, STAGING_TABLE] {
        for i in 0..5 {
            conn.execute(
                &format!("INSERT INTO {table}(\"SNH\", \"Grade\") VALUES(?, 'A')"),
                [format!("s{i}")],
            )
            .expect("seed");
        }
    }

    truncate_staging(&conn).expect("truncate");
    assert_eq!(count_rows(&conn, STAGING_TABLE).expect("count"), 0);
    assert_eq!(count_rows(&conn, MAIN_TABLE).expect("count"), 5);

    // Already empty is fine.
    truncate_staging(&conn).expect("truncate again");
}

#[test]
fn truncate_without_staging_table_fails() {
    let workspace = temp_dir("gradeimport-truncate-missing");
    let conn = db::open_db(&workspace, Duration::from_secs(5)).expect("open db");
    let err = truncate_staging(&conn).unwrap_err();
    assert!(matches!(err, ImportError::StagingClearFailed(_)), "{err:?}");
    assert_eq!(err.code(), "staging_clear_failed");
}
