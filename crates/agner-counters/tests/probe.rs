//! Probe tool integration tests using fake shell scripts.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use agner_counters::{CounterDatabase, CounterError, CounterRef, ProbeBuild, ProbeConfig};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

#[test]
fn probe_parses_tool_output() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_script(
        dir.path(),
        "list-counters",
        r#"echo "Detected CPU - Model: 0x9e" >&2
echo "counter_id,name,supported,scheme,family"
echo "1,Core cyc,1,0x8,0x1000"
echo "9,Instruct,1,0x8,0x1000"
echo "400,BaClrAny,0,0x10,0x20""#,
    );

    let db = CounterDatabase::probe(&ProbeConfig::prebuilt(tool)).unwrap();
    assert!(db.is_supported(&CounterRef::Id(1)));
    assert!(!db.is_supported(&CounterRef::Id(400)));
    assert_eq!(db.list_supported_counters().len(), 2);
}

#[test]
fn probe_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_script(dir.path(), "list-counters", "echo 'no driver' >&2\nexit 3");

    let err = CounterDatabase::probe(&ProbeConfig::prebuilt(tool)).unwrap_err();
    match err {
        CounterError::ProbeFailed { stderr, .. } => assert_eq!(stderr, "no driver"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn probe_empty_output_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let tool = write_script(dir.path(), "list-counters", "true");

    let err = CounterDatabase::probe(&ProbeConfig::prebuilt(tool)).unwrap_err();
    assert!(matches!(err, CounterError::EmptyFeed));
}

#[test]
fn probe_missing_tool_without_build_fails_to_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let config = ProbeConfig::prebuilt(dir.path().join("missing"));

    let err = CounterDatabase::probe(&config).unwrap_err();
    assert!(matches!(err, CounterError::ProbeSpawn { .. }));
}

/// Probe config for `root/out/list-counters` built by a fake `make`.
fn config_with_make(root: &Path, make_body: &str) -> ProbeConfig {
    let make = write_script(root, "fake-make", make_body);
    let mut config = ProbeConfig::for_root(root);
    config.build = Some(ProbeBuild {
        make: make.display().to_string(),
        ..config.build.take().expect("for_root builds the tool")
    });
    config
}

#[test]
fn probe_builds_missing_tool_first() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_make(
        dir.path(),
        r#"[ "$1" = out/list-counters ] || exit 9
mkdir -p out
cat > "$1" <<'TOOL'
#!/bin/sh
echo "counter_id,name,supported,scheme,family"
echo "1,Core cyc,1,0x8,0x1000"
TOOL
chmod +x "$1""#,
    );
    assert!(!config.tool.exists());

    let db = CounterDatabase::probe(&config).unwrap();
    assert!(config.tool.exists());
    assert!(db.is_supported(&CounterRef::Id(1)));
}

#[test]
fn probe_build_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_make(dir.path(), "echo 'no compiler' >&2\nexit 2");

    let err = CounterDatabase::probe(&config).unwrap_err();
    assert!(matches!(err, CounterError::ProbeBuild(_)));
    assert!(!config.tool.exists());
}

#[test]
fn probe_existing_tool_is_not_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_make(dir.path(), "exit 1");
    fs::create_dir(dir.path().join("out")).unwrap();
    write_script(
        &dir.path().join("out"),
        "list-counters",
        r#"echo "counter_id,name,supported,scheme,family"
echo "9,Instruct,1,0x8,0x1000""#,
    );

    let db = CounterDatabase::probe(&config).unwrap();
    assert!(db.is_supported(&CounterRef::Name("Instruct".to_string())));
}
