//! End-to-end CLI tests: subcommands, flags, exit codes, JSON reports.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn ailang() -> Command {
    Command::cargo_bin("ailang").expect("binary built")
}

fn write_module(root: &Path, path: &str, source: &str) -> std::path::PathBuf {
    let file = root.join(format!("{}.ail", path));
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, source).unwrap();
    file
}

#[test]
fn test_hello_world_prints_and_exits_zero() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nimport std/io (println)\nexport func main() -> () ! {IO} {\n  println(\"Hello\")\n}\n",
    );
    ailang()
        .args(["run"])
        .arg(&entry)
        .args(["--caps", "IO"])
        .assert()
        .success()
        .stdout("Hello\n");
}

#[test]
fn test_missing_capability_exits_one() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nimport std/io (println)\nexport func main() -> () ! {IO} {\n  println(\"Hello\")\n}\n",
    );
    ailang()
        .args(["run"])
        .arg(&entry)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CAP_MISSING"));
}

#[test]
fn test_json_reports_go_to_stdout() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nimport std/io (println)\nexport func main() -> () ! {IO} {\n  println(\"Hello\")\n}\n",
    );
    let assert = ailang()
        .args(["run"])
        .arg(&entry)
        .args(["--json", "--compact"])
        .assert()
        .failure();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value =
        serde_json::from_str(stdout.lines().next().expect("one report")).unwrap();
    assert_eq!(report["code"], "CAP_MISSING");
    assert_eq!(report["phase"], "effect");
    assert_eq!(report["schema"], "ailang-report/1");
}

#[test]
fn test_entry_and_args_json() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nexport func double(x: int) -> int { x * 2 }\n",
    );
    ailang()
        .args(["run"])
        .arg(&entry)
        .args(["--entry", "double", "--args-json", "21"])
        .assert()
        .success()
        .stdout("42\n");
}

#[test]
fn test_check_reports_cycle() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "a",
        "module a\nimport b (f)\nexport func g() -> int { f() }\n",
    );
    write_module(
        dir.path(),
        "b",
        "module b\nimport a (g)\nexport func f() -> int { g() }\n",
    );
    ailang()
        .args(["check"])
        .arg(&entry)
        .assert()
        .failure()
        .stderr(predicate::str::contains("LDR002"))
        .stderr(predicate::str::contains("a -> b -> a"));
}

#[test]
fn test_check_clean_module_exits_zero() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nexport func f(x: int) -> int { x + 1 }\n",
    );
    ailang().args(["check"]).arg(&entry).assert().success();
}

#[test]
fn test_iface_json_is_stable() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nexport type Color = Red | Green\n\
         export func pick(c: Color) -> int {\n  match c { Red => 0, Green => 1 }\n}\n",
    );
    let first = ailang()
        .args(["iface"])
        .arg(&entry)
        .args(["--compact"])
        .assert()
        .success();
    let second = ailang()
        .args(["iface"])
        .arg(&entry)
        .args(["--compact"])
        .assert()
        .success();
    let a = String::from_utf8(first.get_output().stdout.clone()).unwrap();
    let b = String::from_utf8(second.get_output().stdout.clone()).unwrap();
    assert_eq!(a, b);

    let iface: serde_json::Value = serde_json::from_str(&a).unwrap();
    assert_eq!(iface["module"], "m");
    assert_eq!(iface["exports"][0]["name"], "pick");
    assert_eq!(iface["constructors"][0]["ctor"], "Green");
    assert!(iface["digest"].as_str().unwrap().len() == 64);
}

#[test]
fn test_multiarg_entry_suggests_record() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nexport func f(x: int, y: int) -> int { x + y }\n",
    );
    ailang()
        .args(["run"])
        .arg(&entry)
        .args(["--entry", "f", "--args-json", "{\"x\":1,\"y\":2}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RUN_MULTIARG_UNSUPPORTED"));
}

#[test]
fn test_virtual_time_flag() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nimport std/clock (now)\nexport func main() -> int ! {Clock} { now() }\n",
    );
    ailang()
        .args(["run"])
        .arg(&entry)
        .args(["--caps", "Clock", "--virtual-time", "--seed", "99"])
        .assert()
        .success()
        .stdout("99\n");
}

#[test]
fn test_warning_does_not_fail_run() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        dir.path(),
        "m",
        "module m\nexport func main() -> int {\n  match true { true => 1 }\n}\n",
    );
    ailang()
        .args(["run"])
        .arg(&entry)
        .assert()
        .success()
        .stdout("1\n")
        .stderr(predicate::str::contains("ELA_W01"));
}
