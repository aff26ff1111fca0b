use std::io::Write;

use assert_cmd::Command;
use tempfile::NamedTempFile;

fn write_script(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("pyweb_cli_test_")
        .suffix(".py")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn pyweb() -> Command {
    Command::cargo_bin("pyweb").unwrap()
}

#[test]
fn run_prints_the_trailing_expression() {
    let script = write_script("1 + 1\n");
    pyweb()
        .args(["run", script.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn run_with_dom_script() {
    let script = write_script(
        "node = web.create_element('div')\nweb.set_text(node, 'hi')\nweb.get_text(node)\n",
    );
    pyweb()
        .args(["run", script.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout("hi\n");
}

#[test]
fn blocked_import_fails_with_a_security_error() {
    let script = write_script("import socket\n");
    let assert = pyweb()
        .args(["run", script.path().to_str().unwrap()])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_lowercase();
    assert!(stderr.contains("security"), "stderr was: {stderr}");
}

#[test]
fn muted_script_reports_only_the_generic_error() {
    let script = write_script("1 / 0\n");
    let assert = pyweb()
        .args(["run", "--muted", script.path().to_str().unwrap()])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("Script error."), "stderr was: {stderr}");
    assert!(!stderr.contains("ZeroDivisionError"), "stderr was: {stderr}");
}

#[test]
fn exec_evaluates_inline_source() {
    pyweb()
        .args(["exec", "'ab' * 3"])
        .assert()
        .success()
        .stdout("ababab\n");
}

#[test]
fn compile_error_exits_with_one() {
    let script = write_script("def (\n");
    let assert = pyweb()
        .args(["run", script.path().to_str().unwrap()])
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("compile error"), "stderr was: {stderr}");
}

#[test]
fn version_reports_the_guest_interpreter() {
    let assert = pyweb().arg("version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.starts_with('3'), "stdout was: {stdout}");
}

#[test]
fn missing_arguments_show_usage() {
    pyweb().assert().code(2);
    pyweb().args(["run"]).assert().code(2);
    pyweb().args(["frobnicate"]).assert().code(2);
}
