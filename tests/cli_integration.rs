// CLI integration tests for table lifecycle, writes, planning and scans.
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn cmd(store: &Path) -> Command {
    let exe = env!("CARGO_BIN_EXE_hbtable");
    let mut command = Command::new(exe);
    command.arg("--store").arg(store).env_remove("RUST_LOG");
    command
}

fn run(store: &Path, args: &[&str]) -> Output {
    cmd(store).args(args).output().expect("run hbtable")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = std::str::from_utf8(&output.stdout).expect("utf8");
    serde_json::from_str(text.trim()).expect("valid json")
}

fn stderr_json(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("json error line");
    serde_json::from_str(line).expect("valid json")
}

#[test]
fn lifecycle_put_scan_delete_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");

    let created = stdout_json(&run(
        &store,
        &["table", "create", "events", "--family", "d", "--family", "m"],
    ));
    assert_eq!(created["created"], true);
    assert_eq!(created["families"], serde_json::json!(["d", "m"]));
    assert!(store.exists());

    for key in ["5", "20", "2000"] {
        let put = stdout_json(&run(
            &store,
            &[
                "put",
                "events",
                key,
                "--key-type",
                "long",
                "--column",
                &format!("d:name=row-{key}"),
            ],
        ));
        assert_eq!(put["cells"], 1);
        assert_eq!(put["write_buffer_configured"], false);
    }

    let scan = stdout_json(&run(
        &store,
        &[
            "--var",
            "LOW=10",
            "scan",
            "events",
            "--key-type",
            "long",
            "--start",
            "${LOW}",
            "--stop",
            "1,000@#,##0",
        ],
    ));
    assert_eq!(scan["count"], 1);
    assert_eq!(scan["rows"][0]["key"], "8000000000000014");
    assert_eq!(scan["rows"][0]["cells"][0]["value"], "row-20");
    assert_eq!(scan["plan"]["upper"], "80000000000003e8");

    let exists = stdout_json(&run(&store, &["key-exists", "events", "5", "--key-type", "long"]));
    assert_eq!(exists["exists"], true);
    stdout_json(&run(&store, &["delete-row", "events", "5", "--key-type", "long"]));
    let exists = stdout_json(&run(&store, &["key-exists", "events", "5", "--key-type", "long"]));
    assert_eq!(exists["exists"], false);

    let all = stdout_json(&run(&store, &["scan", "events", "--key-type", "long", "--cache", "1"]));
    assert_eq!(all["count"], 2);
    assert_eq!(all["plan"]["cache_size"], 1);

    let disabled = stdout_json(&run(&store, &["table", "disable", "events"]));
    assert_eq!(disabled["disabled"], true);
    let available = stdout_json(&run(&store, &["table", "available", "events"]));
    assert_eq!(available["available"], false);
    stdout_json(&run(&store, &["table", "delete", "events"]));
    let exists = stdout_json(&run(&store, &["table", "exists", "events"]));
    assert_eq!(exists["exists"], false);
}

#[test]
fn plan_resolves_date_literals_without_a_table() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");

    let plan = stdout_json(&run(
        &store,
        &[
            "plan",
            "events",
            "--key-type",
            "date",
            "--start",
            "2024-01-01@yyyy-MM-dd",
            "--stop",
            "2024-02-01@yyyy-MM-dd",
            "--cache",
            "50",
        ],
    ));
    assert_eq!(plan["table"], "events");
    assert_eq!(plan["cache_size"], 50);
    assert_eq!(plan["lower"], "8000018cc251f400");
    assert_eq!(plan["upper"], "8000018d61f71800");
    assert!(!store.exists());

    let stop_only = stdout_json(&run(
        &store,
        &["plan", "events", "--key-type", "long", "--stop", "99"],
    ));
    assert!(stop_only["lower"].is_null());
    assert!(stop_only["upper"].is_null());
    assert_eq!(stop_only["cache_size"], 0);
}

#[test]
fn mapping_file_supplies_key_type_and_mask() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");
    let mapping = temp.path().join("mapping.json");
    std::fs::write(
        &mapping,
        r##"{"table":"events","key_type":"LONG","key_mask":"#,##0"}"##,
    )
    .expect("write mapping");

    let plan = stdout_json(&run(
        &store,
        &[
            "plan",
            "events",
            "--mapping",
            mapping.to_str().expect("path"),
            "--start",
            "1,000",
        ],
    ));
    assert_eq!(plan["lower"], "80000000000003e8");
}

#[test]
fn bad_literal_is_parse_error_naming_the_bound() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");

    let output = run(
        &store,
        &["plan", "events", "--key-type", "long", "--start", "1", "--stop", "abc"],
    );
    assert_eq!(output.status.code(), Some(3));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["kind"], "Parse");
    assert_eq!(err["error"]["bound"], "upper");
    assert_eq!(err["error"]["literal"], "abc");
}

#[test]
fn store_failures_are_io_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");

    let output = run(&store, &["table", "disable", "missing"]);
    assert_eq!(output.status.code(), Some(8));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["kind"], "Io");
    assert_eq!(err["error"]["table"], "missing");
    let causes = err["error"]["causes"].as_array().expect("causes");
    assert!(
        causes
            .iter()
            .any(|cause| cause.as_str().unwrap_or_default().contains("does not exist"))
    );

    stdout_json(&run(&store, &["table", "create", "t", "--family", "f"]));
    stdout_json(&run(&store, &["table", "disable", "t"]));
    let output = run(&store, &["scan", "t"]);
    assert_eq!(output.status.code(), Some(8));
}

#[test]
fn usage_errors_exit_with_code_two() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");

    let output = run(&store, &["table", "create", "t"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stderr_json(&output)["error"]["kind"], "Usage");

    let output = run(&store, &["put", "t", "k", "--column", "nofamily"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn completion_prints_a_script() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");
    let output = run(&store, &["completion", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hbtable"));
}

#[cfg(unix)]
#[test]
fn non_utf8_environment_does_not_abort() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");
    let output = cmd(&store)
        .env("HBTABLE_BAD_BYTES", OsStr::from_bytes(&[0xff, 0xfe]))
        .args(["table", "exists", "events"])
        .output()
        .expect("run hbtable");
    let exists = stdout_json(&output);
    assert_eq!(exists["exists"], false);
}

#[test]
fn no_wal_puts_are_not_counted_as_wal_edits() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = temp.path().join("store.json");
    stdout_json(&run(&store, &["table", "create", "t", "--family", "f"]));

    let logged = stdout_json(&run(&store, &["put", "t", "a", "--column", "f:q=1"]));
    assert_eq!(logged["write_to_wal"], true);
    let unlogged = stdout_json(&run(
        &store,
        &["put", "t", "b", "--column", "f:q=2", "--no-wal"],
    ));
    assert_eq!(unlogged["write_to_wal"], false);

    let snapshot: Value =
        serde_json::from_str(&std::fs::read_to_string(&store).expect("read store")).expect("json");
    assert_eq!(snapshot["tables"][0]["wal_edits"], 1);
    assert_eq!(snapshot["tables"][0]["rows"].as_array().map(Vec::len), Some(2));
}
