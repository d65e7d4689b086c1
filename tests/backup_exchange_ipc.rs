use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

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
    let exe = env!("CARGO_BIN_EXE_lmsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn lmsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
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
    let value = send(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn bundle_moves_store_between_workspaces() {
    let src_workspace = temp_dir("lmsd-backup-src");
    let dst_workspace = temp_dir("lmsd-backup-dst");
    let bundle = src_workspace.join("export.lmsbundle.zip");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": src_workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "courseId": "C1", "title": "Rhythm 101" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "enrollment.add",
        json!({ "courseId": "C1", "studentId": "S1" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "profile.award",
        json!({ "category": "reading", "amount": 40 }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("lms-store-v1")
    );
    assert_eq!(exported.get("entryCount").and_then(|v| v.as_i64()), Some(3));

    // Same sidecar, fresh workspace.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "workspace.select",
        json!({ "path": dst_workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.import",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(imported.get("courses").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(imported.get("users").and_then(|v| v.as_i64()), Some(1));

    let listed = request_ok(&mut stdin, &mut reader, "8", "courses.list", json!({}));
    let courses = listed.get("courses").and_then(|v| v.as_array()).expect("courses");
    assert_eq!(courses.len(), 1);
    assert_eq!(
        courses[0].get("title").and_then(|v| v.as_str()),
        Some("Rhythm 101")
    );

    let profile = request_ok(&mut stdin, &mut reader, "9", "profile.get", json!({}));
    assert_eq!(
        profile.pointer("/profile/xp").and_then(|v| v.as_i64()),
        Some(40)
    );
    assert_eq!(
        profile.pointer("/profile/stats/reading").and_then(|v| v.as_i64()),
        Some(40)
    );
}

#[test]
fn import_of_missing_bundle_fails_cleanly() {
    let workspace = temp_dir("lmsd-backup-missing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = send(
        &mut stdin,
        &mut reader,
        "2",
        "backup.import",
        json!({ "inPath": workspace.join("does-not-exist.zip").to_string_lossy() }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("import_failed")
    );

    // Workspace state is untouched by the failed import.
    let listed = request_ok(&mut stdin, &mut reader, "3", "courses.list", json!({}));
    assert_eq!(
        listed.get("courses").and_then(|v| v.as_array()).map(|c| c.len()),
        Some(0)
    );
}
