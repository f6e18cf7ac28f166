use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const PROVIDER_VARS: [&str; 12] = [
    "STRIPE_SECRET_KEY",
    "APP_URL",
    "VITE_APP_URL",
    "MAILCHIMP_API_KEY",
    "VITE_MAILCHIMP_API_KEY",
    "MAILCHIMP_SERVER_PREFIX",
    "VITE_MAILCHIMP_SERVER_PREFIX",
    "MAILCHIMP_LIST_ID",
    "VITE_MAILCHIMP_LIST_ID",
    "APP_ENV",
    "NODE_ENV",
    "FUNDRAISER_BIND",
];

fn fundraiser(config_dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fundraiser"));
    command
        .env("FUNDRAISER_CONFIG_DIR", config_dir)
        .env_remove("FUNDRAISER_CONFIG")
        .env("RUST_LOG", "warn");
    for name in PROVIDER_VARS {
        command.env_remove(name);
    }
    command
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn config_check_redacts_secrets() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("fundraiser.toml"),
        r#"
version = 1
environment = "development"
app_url = "https://everybodyscool.org"

[stripe]
secret_key = "sk_live_should_not_print"
timeout = "5s"

[mailchimp]
list_id = "abc123"
"#,
    )
    .unwrap();

    let output = fundraiser(root.path())
        .env("MAILCHIMP_API_KEY", "mc-secret-us1")
        .args(["config", "check"])
        .output()
        .expect("failed to run fundraiser config check");

    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("# loaded from"));
    assert!(text.contains("<redacted>"));
    assert!(text.contains("timeout = \"5s\""));
    assert!(text.contains("environment = \"development\""));
    assert!(!text.contains("sk_live_should_not_print"));
    assert!(!text.contains("mc-secret-us1"));
}

#[test]
fn config_check_reports_invalid_values() {
    let root = TempDir::new().unwrap();
    let file = root.path().join("broken.toml");
    fs::write(&file, "version = 1\n[renderer]\nradius = 40\n").unwrap();

    let output = fundraiser(root.path())
        .arg("--config")
        .arg(&file)
        .args(["config", "check"])
        .output()
        .expect("failed to run fundraiser config check");

    assert!(!output.status.success());
    let errors = String::from_utf8_lossy(&output.stderr);
    assert!(errors.contains("renderer.radius"), "{errors}");
}

#[test]
fn config_where_lists_paths() {
    let root = TempDir::new().unwrap();
    let output = fundraiser(root.path())
        .args(["config", "where"])
        .output()
        .expect("failed to run fundraiser config where");

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains(&root.path().display().to_string()));
    assert!(text.contains("(missing)"));
    assert!(text.contains("built-in defaults"));
}

#[test]
fn cpu_render_writes_png() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("out/planet.png");

    let output = fundraiser(root.path())
        .args(["render", "--backend", "cpu", "--size", "32x24", "--time", "1.5"])
        .arg("--output")
        .arg(&target)
        .output()
        .expect("failed to run fundraiser render");

    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("planet.png"));
    let bytes = fs::read(&target).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}
