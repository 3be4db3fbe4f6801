use std::{path::Path, process::Command};

use mktemp::Temp;
use pretty_assertions::assert_eq;

struct Run {
    success: bool,
    stdout: String,
    stderr: String,
}

fn sousc(source: &str, args: &[&str]) -> Run {
    let file = Temp::new_file().unwrap();
    let path: &Path = file.as_ref();
    std::fs::write(path, source).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_sousc"))
        .arg(path)
        .args(args)
        .env_remove("SOUS_LOG")
        .output()
        .unwrap();

    Run {
        success: output.status.success(),
        stdout: strip_ansi_escapes::strip_str(String::from_utf8_lossy(&output.stdout)),
        stderr: strip_ansi_escapes::strip_str(String::from_utf8_lossy(&output.stderr)),
    }
}

#[test]
fn generates_javascript() {
    let run = sousc("serve(1 + 2);", &["js"]);

    assert!(run.success);
    assert_eq!(run.stdout, "console.log(3);\n");
}

#[test]
fn indent_flag() {
    let run = sousc("while (fresh) { break; }", &["js", "--indent", "2"]);

    assert_eq!(run.stdout, "while (true) {\n  break;\n}\n");
}

#[test]
fn parsed_mode_only_checks_syntax() {
    // Undeclared, but grammatical
    let run = sousc("serve(y);", &["parsed"]);

    assert!(run.success);
    assert!(run.stdout.ends_with("is syntactically correct\n"));
}

#[test]
fn optimized_mode_prints_the_ir() {
    let run = sousc("ingredient x := 3 * 7;", &["optimized", "--no-color"]);

    assert!(run.success);
    assert!(run.stdout.starts_with("let x#"), "{}", run.stdout);
    assert!(run.stdout.contains(": int = 21"), "{}", run.stdout);
}

#[test]
fn reports_errors_with_position() {
    let run = sousc("ingredient x := 1;\ningredient x := 1;\n", &["js"]);

    assert!(!run.success);
    assert!(run.stdout.is_empty());

    let mut lines = run.stderr.lines();
    assert_eq!(lines.next(), Some("error: 2:12: identifier `x` already declared"));
    assert_eq!(lines.next(), Some("2 | ingredient x := 1;"));
    assert_eq!(lines.next(), Some("               ^"));
}
