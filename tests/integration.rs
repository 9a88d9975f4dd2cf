use std::path::Path;
use std::process::{Command, Output};

fn idref_cmd(fixture: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_idref"));
    cmd.current_dir(Path::new("tests/fixtures").join(fixture));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn index_prints_listing_in_document_order() {
    let out = idref_cmd("book")
        .args(["index", "doc.sgml", "--events", "doc.esis"])
        .output()
        .unwrap();
    assert!(out.status.success(), "index failed: {}", stderr(&out));

    let listing = stdout(&out);
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(
        lines,
        [
            "Identifier (element)",
            "--------------------",
            "intro (chapter)",
            "setup (chapter)",
            "box1 (para)",
        ]
    );
}

#[test]
fn index_json_lists_entries_and_anomalies() {
    let out = idref_cmd("book")
        .args(["index", "doc.sgml", "--events", "truncated.esis", "--format", "json"])
        .output()
        .unwrap();
    assert!(out.status.success(), "index failed: {}", stderr(&out));

    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["identifier"], "intro");
    assert_eq!(entries[0]["element_name"], "chapter");
    assert_eq!(json["anomalies"].as_array().unwrap().len(), 1);
    assert!(stderr(&out).contains("warning: record 3: id=setup has no owning element"), "{}", stderr(&out));
}

#[test]
fn strict_index_rejects_truncated_stream() {
    let out = idref_cmd("book")
        .args(["index", "doc.sgml", "--events", "truncated.esis", "--strict"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("Malformed Event Stream"), "{}", stderr(&out));
}

#[test]
fn resolve_points_at_attribute_assignment() {
    let out = idref_cmd("book")
        .args(["resolve", "doc.sgml", "SETUP", "--events", "doc.esis"])
        .output()
        .unwrap();
    assert!(out.status.success(), "resolve failed: {}", stderr(&out));
    assert_eq!(stdout(&out).trim_end(), "doc.sgml:7:10: ID=Setup");
}

#[test]
fn resolve_json_reports_byte_range() {
    let out = idref_cmd("book")
        .args(["resolve", "doc.sgml", "box1", "--events", "doc.esis", "--format", "json"])
        .output()
        .unwrap();
    assert!(out.status.success(), "resolve failed: {}", stderr(&out));

    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    let text = std::fs::read_to_string("tests/fixtures/book/doc.sgml").unwrap();
    let start = text.find("id=\"box1\"").unwrap();
    assert_eq!(json["span"]["byte_range"]["start"], start);
    assert_eq!(json["span"]["text"], "id=\"box1\"");
    assert_eq!(json["span"]["line"], 9);
}

#[test]
fn unknown_identifier_exits_one_with_suggestion() {
    let out = idref_cmd("book")
        .args(["resolve", "doc.sgml", "intro2", "--events", "doc.esis"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("Unknown Identifier"), "{err}");
    assert!(err.contains("intro"), "{err}");
}

#[test]
fn stale_index_is_distinct_from_unknown() {
    let out = idref_cmd("book")
        .args(["resolve", "doc.sgml", "gone", "--events", "stale.esis"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Stale Index"), "{}", stderr(&out));
}

#[test]
fn case_sensitive_flag_disables_folding() {
    let out = idref_cmd("book")
        .args(["resolve", "doc.sgml", "INTRO", "--events", "doc.esis", "--case-sensitive"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Stale Index"), "{}", stderr(&out));
}

#[test]
fn line_command_resolves_listing_entry() {
    let out = idref_cmd("book")
        .args(["line", "doc.sgml", "intro (chapter)", "--events", "doc.esis"])
        .output()
        .unwrap();
    assert!(out.status.success(), "line failed: {}", stderr(&out));
    assert_eq!(stdout(&out).trim_end(), "doc.sgml:3:10: id=\"intro\"");
}

#[test]
fn events_command_dumps_records() {
    let out = idref_cmd("book")
        .args(["events", "doc.sgml", "--events", "doc.esis"])
        .output()
        .unwrap();
    assert!(out.status.success(), "events failed: {}", stderr(&out));
    let dump = stdout(&out);
    assert!(
        dump.starts_with("start BOOK\nattribute ID=INTRO (ID)\nstart CHAPTER\nattribute ID= (IMPLIED)\nstart TITLE\n"),
        "{dump}"
    );
    assert!(dump.contains("attribute LINKEND=SETUP (TOKEN)\nstart XREF\n"), "{dump}");
}

#[test]
fn missing_parser_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("idref.toml");
    std::fs::write(&config, "[parser]\nprogram = \"idref-no-such-parser\"\n").unwrap();

    let out = idref_cmd("book")
        .arg("--config")
        .arg(&config)
        .args(["index", "doc.sgml"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(stdout(&out).is_empty(), "no listing expected: {}", stdout(&out));
    assert!(stderr(&out).contains("Parser Failed"), "{}", stderr(&out));
}

#[test]
fn missing_config_file_is_reported() {
    let out = idref_cmd("book")
        .args(["--config", "absent.toml", "index", "doc.sgml", "--events", "doc.esis"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("Config Not Found"), "{}", stderr(&out));
}

#[cfg(unix)]
#[test]
fn configured_parser_output_is_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("idref.toml");
    std::fs::write(
        &config,
        "[parser]\nprogram = \"sh\"\nargs = [\"-c\", \"cat doc.esis\", \"sh\"]\ntimeout_secs = 10\n",
    )
    .unwrap();

    let out = idref_cmd("book")
        .arg("--config")
        .arg(&config)
        .args(["resolve", "doc.sgml", "intro"])
        .output()
        .unwrap();
    assert!(out.status.success(), "resolve failed: {}", stderr(&out));
    assert_eq!(stdout(&out).trim_end(), "doc.sgml:3:10: id=\"intro\"");
}

#[cfg(unix)]
#[test]
fn hung_parser_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("idref.toml");
    std::fs::write(
        &config,
        "[parser]\nprogram = \"sh\"\nargs = [\"-c\", \"sleep 30; echo done\", \"sh\"]\ntimeout_secs = 1\n",
    )
    .unwrap();

    let start = std::time::Instant::now();
    let out = idref_cmd("book")
        .arg("--config")
        .arg(&config)
        .args(["index", "doc.sgml"])
        .output()
        .unwrap();
    assert!(start.elapsed() < std::time::Duration::from_secs(10), "took {:?}", start.elapsed());
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("Parser Timed Out"), "{}", stderr(&out));
}
