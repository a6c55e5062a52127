use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

/// Helper to create a temp directory that is cleaned up on drop.
struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "cookbook_store_cli_test_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        Self { path }
    }

    fn path(&self) -> &PathBuf {
        &self.path
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Runs the binary against `db` with the `t_` prefix.
fn run(db: &Path, args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_cookbook-store"))
        .arg("--db")
        .arg(db)
        .args(["--prefix", "t_"])
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("COOKBOOK_STORE_DB")
        .env_remove("COOKBOOK_STORE_PREFIX")
        .env_remove("COOKBOOK_STORE_BUSY_TIMEOUT_MS")
        .env_remove("COOKBOOK_STORE_LOG")
        .output()
        .expect("failed to run cookbook-store")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Minimal Chef cookbook-version document whose files reference `checksums`.
fn write_version(dir: &TempDir, cookbook: &str, version: &str, checksums: &[&str]) -> PathBuf {
    let files: Vec<serde_json::Value> = checksums
        .iter()
        .enumerate()
        .map(|(i, checksum)| {
            serde_json::json!({
                "name": format!("file{i}.txt"),
                "path": format!("files/default/file{i}.txt"),
                "checksum": checksum,
                "specificity": "default"
            })
        })
        .collect();
    let json = serde_json::json!({
        "cookbook_name": cookbook,
        "version": version,
        "name": format!("{cookbook}-{version}"),
        "chef_type": "cookbook_version",
        "json_class": "Chef::CookbookVersion",
        "files": files,
        "metadata": {"name": cookbook, "version": version}
    });
    let path = dir.join(&format!("{cookbook}-{version}.json"));
    fs::write(&path, serde_json::to_string_pretty(&json).unwrap())
        .expect("failed to write document");
    path
}

fn migrated(dir: &TempDir) -> PathBuf {
    let db = dir.join("store.db");
    let out = run(&db, &["migrate", "up"]);
    assert!(out.status.success(), "migrate up failed: {}", stderr(&out));
    db
}

fn import(db: &Path, docs: &[PathBuf]) -> Output {
    let mut args = vec!["import".to_string()];
    args.extend(docs.iter().map(|p| p.display().to_string()));
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    run(db, &args)
}

// ---------------------------------------------------------------------------
// Migrate tests
// ---------------------------------------------------------------------------

#[test]
fn migrate_up_creates_tables() {
    let dir = TempDir::new("migrate_up");
    let db = migrated(&dir);

    let out = run(&db, &["migrate", "status"]);
    assert!(out.status.success());
    let stdout = stdout(&out);
    assert!(stdout.contains("Tables exist: yes"), "{stdout}");
    assert!(stdout.contains("Cookbook count: 0"), "{stdout}");
}

#[test]
fn migrate_down_removes_tables() {
    let dir = TempDir::new("migrate_down");
    let db = migrated(&dir);

    let out = run(&db, &["migrate", "down"]);
    assert!(out.status.success());
    let out = run(&db, &["migrate", "status"]);
    assert!(stdout(&out).contains("Tables exist: no"));
}

#[test]
fn migrate_seed_and_refresh_from_directory() {
    let dir = TempDir::new("migrate_seed");
    let docs = TempDir::new("migrate_seed_docs");
    write_version(&docs, "apache2", "1.0.0", &["aa01"]);
    write_version(&docs, "apache2", "2.1.0", &["aa02"]);
    write_version(&docs, "mysql", "8.0.1", &["bb01"]);
    let db = migrated(&dir);

    let source = docs.path().display().to_string();
    let out = run(&db, &["migrate", "seed", "--source", &source]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Cookbooks created: 2"), "{text}");
    assert!(text.contains("Versions inserted: 3"), "{text}");

    let out = run(&db, &["migrate", "refresh", "--source", &source]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("Versions inserted: 3"));

    let out = run(&db, &["migrate", "status"]);
    assert!(stdout(&out).contains("Version count: 3"));
}

#[test]
fn config_file_supplies_prefix() {
    let dir = TempDir::new("config_file");
    let config = dir.join("settings.yaml");
    fs::write(&config, "prefix: cfg_\nlog_level: warn\n").unwrap();
    let db = dir.join("store.db");

    let out = std::process::Command::new(env!("CARGO_BIN_EXE_cookbook-store"))
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .args(["migrate", "up"])
        .env_remove("COOKBOOK_STORE_PREFIX")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("prefix 'cfg_'"));
}

#[test]
fn invalid_prefix_is_rejected() {
    let dir = TempDir::new("bad_prefix");
    let out = std::process::Command::new(env!("CARGO_BIN_EXE_cookbook-store"))
        .arg("--db")
        .arg(dir.join("store.db"))
        .args(["--prefix", "bad;prefix", "migrate", "up"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error:"));
}

// ---------------------------------------------------------------------------
// Import, read and export tests
// ---------------------------------------------------------------------------

#[test]
fn import_then_list_versions_and_show() {
    let dir = TempDir::new("import_list");
    let db = migrated(&dir);
    let docs = [
        write_version(&dir, "mysql", "1.0.0", &["0a"]),
        write_version(&dir, "mysql", "2.1.0", &["0b"]),
        write_version(&dir, "mysql", "1.5.3", &["0c"]),
        write_version(&dir, "apt", "7.0.0", &[]),
    ];

    let out = import(&db, &docs);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Imported 4 cookbook version(s)."));

    let out = run(&db, &["list"]);
    assert_eq!(stdout(&out), "apt\t1\nmysql\t3\n");

    let out = run(&db, &["versions", "mysql"]);
    assert_eq!(stdout(&out), "2.1.0\n1.5.3\n1.0.0\n");

    let out = run(&db, &["show", "mysql", "1.5.3"]);
    assert!(out.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(doc["name"], "mysql-1.5.3");
    assert_eq!(doc["files"][0]["checksum"], "0c");
}

#[test]
fn import_rejects_invalid_documents() {
    let dir = TempDir::new("import_invalid");
    let db = migrated(&dir);
    let bad = write_version(&dir, "nginx", "1.0.0", &["not-hex!"]);

    let out = import(&db, &[bad]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("validation error"));

    let out = run(&db, &["list"]);
    assert!(stdout(&out).contains("No cookbooks stored."));
}

#[test]
fn validate_reports_counts() {
    let dir = TempDir::new("validate");
    let a = write_version(&dir, "ntp", "1.0.0", &["ab"]);
    let b = write_version(&dir, "git", "2.0.0", &["cd"]);

    let out = std::process::Command::new(env!("CARGO_BIN_EXE_cookbook-store"))
        .arg("validate")
        .arg(&a)
        .arg(&b)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Validated 2 document(s) for 2 cookbook(s)."));
}

#[test]
fn show_unknown_version_fails() {
    let dir = TempDir::new("show_missing");
    let db = migrated(&dir);
    import(&db, &[write_version(&dir, "ntp", "1.0.0", &[])]);

    let out = run(&db, &["show", "ntp", "9.9.9"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cookbook version not found: ntp 9.9.9"));

    let out = run(&db, &["versions", "missing"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cookbook not found: missing"));
}

#[test]
fn export_bundle_seeds_another_database() {
    let dir = TempDir::new("export");
    let db = migrated(&dir);
    import(
        &db,
        &[
            write_version(&dir, "redis", "4.0.0", &["11"]),
            write_version(&dir, "redis", "4.1.0", &["22"]),
        ],
    );

    let bundle = dir.join("bundle.json");
    let bundle_arg = bundle.display().to_string();
    let out = run(&db, &["export", "--output", &bundle_arg]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Exported 2 version(s)"));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&bundle).unwrap()).unwrap();
    assert!(written["generated_at"].as_str().is_some());
    assert_eq!(written["versions"].as_array().unwrap().len(), 2);

    let other = dir.join("other.db");
    run(&other, &["migrate", "up"]);
    let out = run(&other, &["migrate", "seed", "--source", &bundle_arg]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&run(&other, &["versions", "redis"])), "4.1.0\n4.0.0\n");
}

// ---------------------------------------------------------------------------
// Delete tests
// ---------------------------------------------------------------------------

#[test]
fn delete_cookbook_prints_cleanup_candidates() {
    let dir = TempDir::new("delete_cookbook");
    let db = migrated(&dir);
    import(
        &db,
        &[
            write_version(&dir, "apache2", "1.0.0", &["aa", "bb"]),
            write_version(&dir, "apache2", "2.0.0", &["bb", "cc"]),
        ],
    );

    let out = run(&db, &["delete", "apache2"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Deleted cookbook apache2"), "{text}");
    assert!(text.contains("Cleanup candidates: 3\n  aa\n  bb\n  cc\n"), "{text}");

    let out = run(&db, &["migrate", "status"]);
    assert!(stdout(&out).contains("Cookbook count: 0"));
}

#[test]
fn delete_single_version() {
    let dir = TempDir::new("delete_version");
    let db = migrated(&dir);
    import(
        &db,
        &[
            write_version(&dir, "ntp", "1.0.0", &["01"]),
            write_version(&dir, "ntp", "1.1.0", &["02"]),
        ],
    );

    let out = run(&db, &["delete", "ntp", "1.1"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Deleted ntp-1.1.0"));
    assert!(stdout(&out).contains("  02"));

    assert_eq!(stdout(&run(&db, &["versions", "ntp"])), "1.0.0\n");
}
