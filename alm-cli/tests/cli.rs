use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn alm() -> Command {
    Command::cargo_bin("alm-cli").expect("binary exists")
}

#[test]
fn accepts_a_valid_program() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("main.alm");
    fs::write(&input, "func main(): integer { println(\"hi\"); return 0; }").expect("write input");

    alm()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("no errors"));
}

#[test]
fn reports_diagnostics_with_locations() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("main.alm");
    fs::write(&input, "func main(): integer {\n    integer a;\n    return a;\n}").expect("write input");

    alm()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("main.alm:3:12: semantic error: 'a' is not initialized"))
        .stderr(predicate::str::contains("compilation failed with 1 error(s)"));
}

#[test]
fn reports_syntax_errors() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("main.alm");
    fs::write(&input, "func main(): integer { return 0 }").expect("write input");

    alm()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("syntax error: expected ';' after return"));
}

#[test]
fn dumps_the_annotated_tree() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("main.alm");
    fs::write(&input, "func main(): integer { long big = 7; return 0; }").expect("write input");
    let output = dir.path().join("out/tree.txt");

    alm()
        .arg(&input)
        .arg("--dump-tree")
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let tree = fs::read_to_string(&output).expect("read dump");
    assert!(tree.starts_with("entry main(): integer"));
    assert!(tree.contains("cast long"));
}

#[test]
fn imports_bundled_library_modules() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("main.alm");
    fs::write(
        &input,
        "import math, strings;\nfunc main(): integer { println(repeat(\"ab\", 2)); return gcd(12, 18); }",
    )
    .expect("write input");

    alm().arg(&input).assert().success();
}

#[test]
fn supports_custom_lib_dir() {
    let dir = tempdir().expect("tempdir");
    let lib = dir.path().join("mylib");
    fs::create_dir_all(&lib).expect("create lib");
    fs::write(lib.join("answer.alm"), "func answer(): integer { return 42; }").expect("write lib");
    let input = dir.path().join("main.alm");
    fs::write(&input, "import answer;\nfunc main(): integer { return answer(); }").expect("write input");

    alm().arg(&input).arg("--lib-dir").arg(&lib).assert().success();

    alm()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("library module 'answer' was not found"));
}

#[test]
fn reports_missing_lib_dir() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("main.alm");
    fs::write(&input, "func main(): integer { return 0; }").expect("write input");

    alm()
        .arg(&input)
        .arg("--lib-dir")
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("library directory was not found"));
}

#[test]
fn rejects_other_extensions() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("main.txt");
    fs::write(&input, "func main(): integer { return 0; }").expect("write input");

    alm()
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported source file extension"));
}
