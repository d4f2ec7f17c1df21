use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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
    let exe = env!("CARGO_BIN_EXE_mappingd");
    let mut child = Command::new(exe)
        .env_remove("MAPPINGD_TEMPLATES_ROOT")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn mappingd");
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn write_template(root: &Path, integration: &str, file: &str, body: &str) {
    let dir = root.join(integration);
    std::fs::create_dir_all(&dir).expect("create integration dir");
    std::fs::write(dir.join(file), body).expect("write template");
}

fn integrations_config() -> serde_json::Value {
    json!([
        { "name": "burp", "features": ["upload"], "uploaders": ["html", "xml"],
          "legacyMappingReference": [
              { "source": "vulnerability", "legacyTemplate": "issue" },
              { "source": "html_evidence", "legacyTemplate": "html_evidence" }
          ] },
        { "name": "nessus", "features": ["upload"], "uploaders": ["xml"] },
        { "name": "projects", "features": ["upload"], "uploaders": ["package"] },
        { "name": "jira", "features": ["export"], "uploaders": [] }
    ])
}

#[test]
fn forward_then_reverse_roundtrip() {
    let workspace = temp_dir("mappingd-ipc-roundtrip");
    let root = workspace.join("templates").join("plugins");
    write_template(&root, "burp", "issue.template", "#[Description]#\n%ip%: open\n");
    write_template(&root, "nessus", "report_item.template", "#[Title]#\n%report_item.plugin_name%\n\n#[Notes]#\nno placeholder here\n");
    write_template(&root, "projects", "node.template", "#[Title]#\n%node.label%\n");

    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let early = request(&mut stdin, &mut reader, "0", "mappings.migrate", json!({}));
    assert_eq!(
        early.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );

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
        "config.update",
        json!({ "patch": { "integrations": integrations_config() } }),
    );

    let cfg = request_ok(&mut stdin, &mut reader, "3", "config.get", json!({}));
    assert_eq!(
        cfg.get("templatesRoot").and_then(|v| v.as_str()),
        Some(&*root.to_string_lossy())
    );
    assert!(cfg.get("reportTemplateProperties").map(|v| v.is_null()).unwrap_or(false));

    let preview = request_ok(&mut stdin, &mut reader, "4", "mappings.preview", json!({}));
    let names: Vec<&str> = preview
        .get("integrations")
        .and_then(|v| v.as_array())
        .expect("integrations")
        .iter()
        .filter_map(|i| i.get("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(names, vec!["burp", "nessus"]);

    let report = request_ok(&mut stdin, &mut reader, "5", "mappings.migrate", json!({}));
    assert_eq!(report.get("filesMigrated").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(report.get("mappingsCreated").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(report.get("fieldsCreated").and_then(|v| v.as_u64()), Some(3));
    assert!(root.join("burp/issue.template.legacy").exists());
    assert!(root.join("nessus/report_item.template.legacy").exists());
    assert!(root.join("projects/node.template").exists());

    let burp = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "mappings.list",
        json!({ "component": "burp" }),
    );
    let mappings = burp.get("mappings").and_then(|v| v.as_array()).expect("mappings");
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].get("source").and_then(|v| v.as_str()), Some("vulnerability"));
    assert!(mappings[0].get("destination").map(|v| v.is_null()).unwrap_or(false));
    let field = &mappings[0]["fields"][0];
    assert_eq!(field.get("sourceField").and_then(|v| v.as_str()), Some("ip"));
    assert_eq!(field.get("destinationField").and_then(|v| v.as_str()), Some("Description"));
    assert_eq!(field.get("content").and_then(|v| v.as_str()), Some("{{ burp[ip] }}: open"));

    let nessus = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "mappings.list",
        json!({ "component": "nessus" }),
    );
    assert_eq!(
        nessus.pointer("/mappings/0/fields/1/sourceField").and_then(|v| v.as_str()),
        Some("custom text")
    );
    assert_eq!(
        nessus.pointer("/mappings/0/fields/1/content").and_then(|v| v.as_str()),
        Some("no placeholder here")
    );

    let again = request_ok(&mut stdin, &mut reader, "8", "mappings.migrate", json!({}));
    assert_eq!(again.get("filesMigrated").and_then(|v| v.as_u64()), Some(0));
    let all = request_ok(&mut stdin, &mut reader, "9", "mappings.list", json!({}));
    assert_eq!(all.get("mappings").and_then(|v| v.as_array()).map(|v| v.len()), Some(2));

    let reverse = request_ok(&mut stdin, &mut reader, "10", "mappings.reverse", json!({}));
    assert_eq!(
        reverse.pointer("/integrations/0/mappingsDeleted").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert!(root.join("burp/issue.template").exists());
    assert!(root.join("nessus/report_item.template").exists());
    assert!(!root.join("burp/issue.template.legacy").exists());

    let empty = request_ok(&mut stdin, &mut reader, "11", "mappings.list", json!({}));
    assert_eq!(empty.get("mappings").and_then(|v| v.as_array()).map(|v| v.len()), Some(0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn variants_produce_one_mapping_each() {
    let workspace = temp_dir("mappingd-ipc-variants");
    let root = workspace.join("custom-root");
    write_template(&root, "nessus", "evidence.template", "#[Port]#\n%evidence.port%/%evidence.protocol%\n");

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
        "config.update",
        json!({ "patch": {
            "templatesRoot": root.to_string_lossy(),
            "integrations": integrations_config(),
            "reportTemplateProperties": [2, 3]
        } }),
    );

    let report = request_ok(&mut stdin, &mut reader, "3", "mappings.migrate", json!({}));
    assert_eq!(report.get("mappingsCreated").and_then(|v| v.as_u64()), Some(2));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "mappings.list",
        json!({ "component": "nessus" }),
    );
    let mappings = listed.get("mappings").and_then(|v| v.as_array()).expect("mappings");
    let destinations: Vec<&str> = mappings
        .iter()
        .filter_map(|m| m.get("destination").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(destinations, vec!["rtp_2", "rtp_3"]);
    for m in mappings {
        assert_eq!(
            m.pointer("/fields/0/content").and_then(|v| v.as_str()),
            Some("{{ nessus[evidence.port] }}/{{ nessus[evidence.protocol] }}")
        );
        assert_eq!(
            m.pointer("/fields/0/sourceField").and_then(|v| v.as_str()),
            Some("evidence.port")
        );
    }

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bad_requests_are_reported() {
    let workspace = temp_dir("mappingd-ipc-bad");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let unknown = request(&mut stdin, &mut reader, "1", "mappings.explode", json!({}));
    assert_eq!(
        unknown.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let bad_patch = request(
        &mut stdin,
        &mut reader,
        "3",
        "config.update",
        json!({ "patch": { "reportTemplateProperties": "all" } }),
    );
    assert_eq!(
        bad_patch.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let bad_component = request(
        &mut stdin,
        &mut reader,
        "4",
        "mappings.list",
        json!({ "component": 7 }),
    );
    assert_eq!(
        bad_component.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    // Multi-uploader integration with no legacy reference.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "config.update",
        json!({ "patch": { "integrations": [
            { "name": "qualys", "features": ["upload"], "uploaders": ["vuln", "was"] }
        ] } }),
    );
    let failed = request(&mut stdin, &mut reader, "6", "mappings.migrate", json!({}));
    assert_eq!(
        failed.pointer("/error/code").and_then(|v| v.as_str()),
        Some("migration_failed")
    );
    assert_eq!(
        failed.pointer("/error/details/kind").and_then(|v| v.as_str()),
        Some("config")
    );

    writeln!(stdin, "not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(v.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_json"));

    let _ = std::fs::remove_dir_all(workspace);
}
