use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradeimportd");
    let mut child = Command::new(exe)
        .env("GRADEIMPORT_BATCH_SIZE", "2")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradeimportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value["result"].clone()
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value.get("error").and_then(|e| e.get("code")).and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradeimport-router-smoke");
    let upload = workspace.join("term1.csv");
    std::fs::write(
        &upload,
        "SNH,Course_ID,Grade,year\ns1,C1,A,2024\ns2,C2,B,2024\ns3,C3,C,2024\n",
    )
    .expect("write upload");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);

    let health = request_ok(si, rd, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());

    let early = request(si, rd, "2", "imports.tasks.list", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    let missing = request(si, rd, "3", "workspace.select", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));

    request_ok(
        si,
        rd,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let provisioned = request_ok(si, rd, "5", "admin.schema.provision", json!({}));
    assert_eq!(provisioned["tables"].as_array().map(|a| a.len()), Some(2));

    let bad_type = request(
        si,
        rd,
        "6",
        "uploads.store",
        json!({ "inPath": upload.to_string_lossy(), "fileName": "term1.txt" }),
    );
    assert_eq!(error_code(&bad_type), Some("unsupported_file_type"));

    let stored = request_ok(
        si,
        rd,
        "7",
        "uploads.store",
        json!({ "inPath": upload.to_string_lossy() }),
    );
    let artifact_id = stored["id"].as_str().expect("artifact id").to_string();
    assert_eq!(stored["originalName"], "term1.csv");

    let uploads = request_ok(si, rd, "8", "uploads.list", json!({}));
    assert_eq!(uploads["uploads"].as_array().map(|a| a.len()), Some(1));

    let created = request_ok(
        si,
        rd,
        "9",
        "imports.tasks.create",
        json!({ "artifactIds": [artifact_id] }),
    );
    let task_id = created["id"].as_str().expect("task id").to_string();
    assert_eq!(created["status"], "pending");
    assert_eq!(created["batchSize"], 2);

    let started = request_ok(si, rd, "10", "imports.tasks.start", json!({ "taskId": task_id }));
    assert_eq!(started["queued"], true);

    let deadline = Instant::now() + Duration::from_secs(20);
    let status = loop {
        let s = request_ok(si, rd, "11", "imports.tasks.status", json!({ "taskId": task_id }));
        if s["status"] == "completed" || s["status"] == "failed" {
            break s;
        }
        assert!(Instant::now() < deadline, "task did not finish: {}", s);
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(status["status"], "completed", "{}", status);
    assert_eq!(status["importedRecords"], 3);
    assert_eq!(status["progress"], 100);
    assert_eq!(status["generation"], 1);

    let again = request(si, rd, "12", "imports.tasks.start", json!({ "taskId": task_id }));
    assert_eq!(error_code(&again), Some("invalid_transition"));

    let tasks = request_ok(si, rd, "13", "imports.tasks.list", json!({}));
    assert_eq!(tasks["tasks"].as_array().map(|a| a.len()), Some(1));

    let stats = request_ok(si, rd, "14", "scratch.stats", json!({}));
    assert_eq!(stats["artifactCount"], 1);

    let swept = request_ok(si, rd, "15", "scratch.sweep", json!({ "maxHours": 24 }));
    assert_eq!(swept["removedDirs"], 0);
    let bad_hours = request(si, rd, "16", "scratch.sweep", json!({ "maxHours": "soon" }));
    assert_eq!(error_code(&bad_hours), Some("bad_params"));

    let deleted = request_ok(
        si,
        rd,
        "17",
        "uploads.delete",
        json!({ "artifactId": artifact_id }),
    );
    assert_eq!(deleted["deleted"], true);

    let unknown = request(si, rd, "18", "grades.export", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn switching_workspaces_lets_queued_imports_finish() {
    let first = temp_dir("gradeimport-switch-a");
    let second = temp_dir("gradeimport-switch-b");
    let upload = first.join("bulk.csv");
    let mut csv = String::from("SNH,Course_ID,Grade,year\n");
    for i in 0..500 {
        csv.push_str(&format!("s{i},C{i},A,2024\n"));
    }
    std::fs::write(&upload, csv).expect("write upload");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, rd) = (&mut stdin, &mut reader);

    request_ok(si, rd, "1", "workspace.select", json!({ "path": first.to_string_lossy() }));
    request_ok(si, rd, "2", "admin.schema.provision", json!({}));
    request_ok(si, rd, "3", "uploads.store", json!({ "inPath": upload.to_string_lossy() }));
    let created = request_ok(si, rd, "4", "imports.tasks.create", json!({}));
    let task_id = created["id"].as_str().expect("task id").to_string();
    request_ok(si, rd, "5", "imports.tasks.start", json!({ "taskId": task_id }));

    // Switch away while the import is queued or running; the sidecar keeps
    // answering.
    request_ok(si, rd, "6", "workspace.select", json!({ "path": second.to_string_lossy() }));
    let health = request_ok(si, rd, "7", "health", json!({}));
    assert!(health["workspacePath"].is_string());
    let none = request_ok(si, rd, "8", "imports.tasks.list", json!({}));
    assert_eq!(none["tasks"].as_array().map(|a| a.len()), Some(0));

    // Coming back waits for the old worker, so the task was never cut short.
    request_ok(si, rd, "9", "workspace.select", json!({ "path": first.to_string_lossy() }));
    let status = request_ok(si, rd, "10", "imports.tasks.status", json!({ "taskId": task_id }));
    assert_eq!(status["status"], "completed", "{}", status);
    assert_eq!(status["importedRecords"], 500);

    // Selecting the current workspace again keeps the running service.
    request_ok(si, rd, "11", "workspace.select", json!({ "path": first.to_string_lossy() }));
    let tasks = request_ok(si, rd, "12", "imports.tasks.list", json!({}));
    assert_eq!(tasks["tasks"].as_array().map(|a| a.len()), Some(1));

    drop(stdin);
    let _ = child.wait();
}
