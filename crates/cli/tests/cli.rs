use assert_cmd::Command;

fn libris() -> Command {
    let mut cmd = Command::cargo_bin("libris").unwrap();
    cmd.env_remove("LIBRIS_ENV")
        .env("LIBRIS_CONFIG_DIR", std::env::temp_dir().join("libris-cli-no-config"));
    cmd
}

#[test]
fn help_lists_subcommands() {
    let output = libris().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("config"));
}

#[test]
fn config_prints_effective_settings() {
    let output = libris()
        .env("LIBRIS_SERVER__PORT", "9191")
        .arg("config")
        .output()
        .unwrap();
    assert!(output.status.success());

    let settings: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(settings["environment"], "local");
    assert_eq!(settings["server"]["port"], 9191);
    assert_eq!(settings["database"]["books_collection"], "books");
}

#[test]
fn unknown_environment_fails() {
    libris()
        .env("LIBRIS_ENV", "qa")
        .arg("config")
        .assert()
        .failure();
}
