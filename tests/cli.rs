//! 命令行集成测试

use assert_cmd::Command;

fn lexistream(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lexistream").unwrap();
    cmd.current_dir(dir.path())
        .env("LEXISTREAM_STORE_PATH", dir.path().join("cli.redb"))
        .env("LEXISTREAM_LOG_LEVEL", "error")
        .arg("--offline");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{:?}", output);
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn test_add_then_lookup() {
    let dir = tempfile::tempdir().unwrap();

    let added = stdout_of(lexistream(&dir).args(["add", "Mariposa", "butterfly"]));
    assert!(added.contains("'mariposa' -> 'butterfly'"), "{}", added);

    let found = stdout_of(lexistream(&dir).args(["lookup", "MARIPOSA"]));
    assert!(found.contains("'mariposa' -> 'butterfly' (common)"), "{}", found);

    let missing = stdout_of(lexistream(&dir).args(["lookup", "oruga"]));
    assert!(missing.contains("not found"), "{}", missing);
}

#[test]
fn test_combine_export_and_translate() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("words.tsv");
    std::fs::write(&source, "# comment\nhola\thello\nmundo\tworld\n").unwrap();

    let combined = stdout_of(lexistream(&dir).arg("combine").arg(&source));
    assert!(combined.contains("Published generation 1 with 2 entries"), "{}", combined);

    let exported = stdout_of(lexistream(&dir).arg("export"));
    let rows: Vec<&str> = exported.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("hola\thello\tunverified\t"));

    let translated = stdout_of(lexistream(&dir).args(["translate", "Hola, mundo cruel."]));
    assert_eq!(translated.trim(), "hello , world cruel .");
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = tempfile::tempdir().unwrap();
    lexistream(&dir).arg("borrar").assert().failure();
}

#[test]
fn test_combine_with_missing_file_keeps_dictionary() {
    let dir = tempfile::tempdir().unwrap();
    stdout_of(lexistream(&dir).args(["add", "perro", "dog"]));

    lexistream(&dir)
        .args(["combine", "no-existe.tsv"])
        .assert()
        .failure();

    let found = stdout_of(lexistream(&dir).args(["lookup", "perro"]));
    assert!(found.contains("'perro' -> 'dog'"), "{}", found);
}

#[test]
fn test_interactive_session_reads_commands() {
    let dir = tempfile::tempdir().unwrap();

    let output = stdout_of(
        lexistream(&dir)
            .arg("interactive")
            .write_stdin("add queso cheese\nlookup queso\nborrar\nexit\n"),
    );

    assert!(output.contains("Added 'queso' -> 'cheese'"), "{}", output);
    assert!(output.contains("'queso' -> 'cheese' (common)"), "{}", output);
    assert!(output.contains("Unknown command: borrar"), "{}", output);
}

#[test]
fn test_interactive_session_ends_at_eof() {
    let dir = tempfile::tempdir().unwrap();

    let output = stdout_of(lexistream(&dir).arg("interactive").write_stdin("stats\n"));

    assert!(output.contains("Total translations: 0"), "{}", output);
}
