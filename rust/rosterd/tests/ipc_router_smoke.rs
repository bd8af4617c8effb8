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
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rosterd-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "session.set",
        json!({ "name": "Smoke Teacher", "formClass": "JSS1" }),
    );
    let _ = request(&mut stdin, &mut reader, "4", "session.get", json!({}));
    let added = request(
        &mut stdin,
        &mut reader,
        "5",
        "roster.add",
        json!({ "fullName": "Smoke Student" }),
    );
    let student_id = added
        .get("result")
        .and_then(|v| v.get("student"))
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string();
    let _ = request(&mut stdin, &mut reader, "6", "roster.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "7", "roster.classes", json!({}));
    let _ = request(&mut stdin, &mut reader, "8", "roster.reconcile", json!({}));
    let _ = request(&mut stdin, &mut reader, "9", "exambank.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "roster.remove",
        json!({ "studentId": student_id, "confirmed": true }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "roster.importClassLists",
        json!({ "classLists": "{}" }),
    );
    let _ = request(&mut stdin, &mut reader, "12", "setup.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "setup.update",
        json!({ "section": "roster", "patch": { "maxWriteAttempts": 5 } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "16", "session.clear", json!({}));

    let unknown = {
        let payload = json!({ "id": "17", "method": "grades.compute", "params": {} });
        writeln!(stdin, "{}", payload).expect("write request");
        stdin.flush().expect("flush request");
        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        serde_json::from_str::<serde_json::Value>(line.trim()).expect("parse response json")
    };
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    drop(stdin);
    let status = child.wait().expect("wait for sidecar");
    assert!(status.success());

    let _ = std::fs::remove_dir_all(workspace);
}
