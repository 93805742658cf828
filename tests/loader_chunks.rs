use gradeimportd::db::{self, MAIN_TABLE, STAGING_TABLE};
use gradeimportd::loader::{read_table, BatchLoader};
use gradeimportd::staging::{count_rows, truncate_staging};
use gradeimportd::ImportError;
use rusqlite::Connection;
use std::io::Write;
use std::path::{Path, PathBuf};
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

fn provisioned(prefix: &str) -> (PathBuf, Connection) {
    let workspace = temp_dir(prefix);
    let conn = db::open_db(&workspace, Duration::from_secs(5)).expect("open db");
    db::provision_results_tables(&conn).expect("provision");
    (workspace, conn)
}

fn write_csv(path: &Path, rows: usize) {
    let mut f = std::fs::File::create(path).expect("create csv");
    writeln!(f, "SNH,Course_ID,Course_Name,Grade,Course_Attribute ,year").expect("header");
    for i in 0..rows {
        writeln!(f, "s{i},C{i},Course {i},{},Required,2022", i % 100).expect("row");
    }
}

fn loader(batch: usize) -> BatchLoader {
    BatchLoader::new(batch, Duration::from_secs(30)).expect("loader")
}

#[test]
fn chunk_boundaries_load_every_row_in_order() {
    let (workspace, mut conn) = provisioned("gradeimport-chunks");
    let n = 4;
    for rows in [n, n + 1, 2 * n - 1] {
        let csv = workspace.join(format!("rows-{rows}.csv"));
        write_csv(&csv, rows);
        truncate_staging(&conn).expect("truncate");

        let summary = loader(n).load_file(&mut conn, &csv).expect("load");
        assert_eq!(summary.total, rows as u64);
        assert_eq!(summary.imported, rows as u64);

        let staged = read_table(&conn, STAGING_TABLE).expect("read staging");
        assert_eq!(staged.len(), rows);
        for (i, r) in staged.iter().enumerate() {
            assert_eq!(r.snh.as_deref(), Some(format!("s{i}").as_str()));
            assert_eq!(r.course_attribute.as_deref(), Some("Required"));
            assert_eq!(r.year, Some(2022));
        }
    }
}

#[test]
fn zero_grade_is_kept_not_nulled() {
    let (workspace, mut conn) = provisioned("gradeimport-zero-grade");
    let csv = workspace.join("zero.csv");
    write_csv(&csv, 1);
    loader(10).load_file(&mut conn, &csv).expect("load");
    let staged = read_table(&conn, STAGING_TABLE).expect("read staging");
    assert_eq!(staged[0].grade.as_deref(), Some("0"));
}

#[test]
fn loading_touches_staging_only() {
    let (workspace, mut conn) = provisioned("gradeimport-isolation");
    conn.execute(
        &format!("INSERT INTO {MAIN_TABLE}(\"SNH\", \"Grade\") VALUES('live', 'B')"),
        [],
    )
    .expect("seed main");

    for rows in [0usize, 1] {
        let csv = workspace.join(format!("tiny-{rows}.csv"));
        write_csv(&csv, rows);
        truncate_staging(&conn).expect("truncate");
        let summary = loader(2000).load_file(&mut conn, &csv).expect("load");
        assert_eq!(summary.imported, rows as u64);
        assert_eq!(count_rows(&conn, STAGING_TABLE).expect("count"), rows as u64);

        let main = read_table(&conn, MAIN_TABLE).expect("read main");
        assert_eq!(main.len(), 1);
        assert_eq!(main[0].snh.as_deref(), Some("live"));
    }
}

#[test]
fn retry_after_truncate_does_not_duplicate() {
    let (workspace, mut conn) = provisioned("gradeimport-retry");
    let csv = workspace.join("retry.csv");
    write_csv(&csv, 7);

    loader(3).load_file(&mut conn, &csv).expect("first load");
    truncate_staging(&conn).expect("truncate");
    loader(3).load_file(&mut conn, &csv).expect("second load");
    assert_eq!(count_rows(&conn, STAGING_TABLE).expect("count"), 7);
}

#[test]
fn failing_chunk_reports_its_index_and_keeps_earlier_chunks() {
    let (workspace, mut conn) = provisioned("gradeimport-chunk-fail");
    conn.execute_batch(&format!(
        "CREATE TRIGGER reject_bad BEFORE INSERT ON {STAGING_TABLE}
         WHEN NEW.\"SNH\" = 's4'
         BEGIN SELECT RAISE(ABORT, 'rejected row'); END;"
    ))
    .expect("trigger");
    let csv = workspace.join("bad.csv");
    write_csv(&csv, 8);

    let err = loader(3).load_file(&mut conn, &csv).unwrap_err();
    match err {
        ImportError::BatchInsertFailed { chunk_index, cause } => {
            assert_eq!(chunk_index, 1);
            assert!(cause.contains("rejected row"), "{cause}");
        }
        other => panic!("expected BatchInsertFailed, got {other:?}"),
    }
    // Chunk 0 committed; chunk 1 rolled back as a whole.
    assert_eq!(count_rows(&conn, STAGING_TABLE).expect("count"), 3);
}

#[test]
fn chunk_over_its_time_budget_is_rolled_back() {
    let (workspace, mut conn) = provisioned("gradeimport-chunk-timeout");
    let csv = workspace.join("slow.csv");
    write_csv(&csv, 5);

    let tight = BatchLoader::new(5, Duration::from_nanos(1)).expect("loader");
    let err = tight.load_file(&mut conn, &csv).unwrap_err();
    assert!(matches!(err, ImportError::BatchInsertFailed { chunk_index: 0, .. }), "{err:?}");
    assert_eq!(count_rows(&conn, STAGING_TABLE).expect("count"), 0);
}

#[test]
fn unsupported_extension_is_rejected() {
    let (workspace, mut conn) = provisioned("gradeimport-bad-ext");
    let txt = workspace.join("grades.txt");
    std::fs::write(&txt, "SNH\nx\n").expect("write");
    let err = loader(10).load_file(&mut conn, &txt).unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedFileType(_)), "{err:?}");
}

#[test]
fn invalid_utf8_csv_is_unreadable() {
    let (workspace, mut conn) = provisioned("gradeimport-bad-utf8");
    let csv = workspace.join("broken.csv");
    std::fs::write(&csv, [b'S', b'N', b'H', b'\n', 0xff, 0xfe, 0xfd, b'\n']).expect("write");
    let err = loader(10).load_file(&mut conn, &csv).unwrap_err();
    assert!(matches!(err, ImportError::UnreadableFile { .. }), "{err:?}");
    assert_eq!(count_rows(&conn, STAGING_TABLE).expect("count"), 0);
}
