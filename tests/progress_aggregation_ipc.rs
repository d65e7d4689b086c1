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

fn request_ok(
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn progress_matches_the_worked_example() {
    let workspace = temp_dir("lmsd-progress-example");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "courseId": "C1", "title": "Rhythm 101", "createdBy": "ADMIN1" }),
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
        "assignments.create",
        json!({ "courseId": "C1", "assignmentId": "A1", "title": "Quiz 1", "maxPoints": 50, "createdBy": "ADMIN1" }),
    );
    let graded = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grading.grade",
        json!({ "assignmentId": "A1", "studentId": "S1", "score": 40, "feedback": "good" }),
    );
    assert_eq!(
        graded.pointer("/submission/score").and_then(|v| v.as_i64()),
        Some(40)
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "progress.student",
        json!({ "studentId": "S1" }),
    );
    assert_eq!(report.get("courses"), Some(&json!(["C1"])));
    assert_eq!(report.get("gradedCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        report.get("averagePercent").and_then(|v| v.as_i64()),
        Some(80)
    );
}

#[test]
fn progress_without_graded_work_is_zeroed() {
    let workspace = temp_dir("lmsd-progress-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "progress.student",
        json!({ "studentId": "S1" }),
    );
    assert_eq!(report.get("courses"), Some(&json!([])));
    assert_eq!(report.get("gradedCount").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(
        report.get("averagePercent").and_then(|v| v.as_i64()),
        Some(0)
    );
}

#[test]
fn progress_aggregates_across_courses() {
    let workspace = temp_dir("lmsd-progress-multi");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (i, cid) in ["C1", "C2"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "courses.create",
            json!({ "courseId": cid }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "enrollment.add",
            json!({ "courseId": cid, "studentId": "S1" }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "assignments.create",
        json!({ "courseId": "C1", "assignmentId": "A1", "maxPoints": 50 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "a2",
        "assignments.create",
        json!({ "courseId": "C2", "assignmentId": "A2", "maxPoints": 50 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "grading.grade",
        json!({ "assignmentId": "A1", "studentId": "S1", "score": 40 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "grading.grade",
        json!({ "assignmentId": "A2", "studentId": "S1", "score": 30 }),
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "p",
        "progress.student",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(report.get("courses"), Some(&json!(["C1", "C2"])));
    assert_eq!(report.get("gradedCount").and_then(|v| v.as_i64()), Some(2));
    // 70 of 100 points across both graded submissions.
    assert_eq!(
        report.get("averagePercent").and_then(|v| v.as_i64()),
        Some(70)
    );
}
