//! Integration tests for the `mealplan` binary.
//!
//! Config tests run against a temporary `XDG_CONFIG_HOME`. Database tests
//! create an isolated database per test and drop it on completion; with no
//! API key configured every generation fails as `unavailable`, which lets
//! the full sync path run without network access.

use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

use mealplan_test_utils::{create_test_db, drop_test_db, pg_url};

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

fn mealplan(config_home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mealplan"));
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("MEALPLAN_DATABASE_URL")
        .env_remove("OPENAI_API_KEY")
        .env_remove("MEALPLAN_OPENAI_BASE_URL")
        .env_remove("MEALPLAN_OPENAI_MODEL")
        .env("RUST_LOG", "warn");
    cmd
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

/// Every JSON document printed on stdout, in order.
fn json_documents(text: &str) -> Vec<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .collect::<Result<_, _>>()
        .unwrap()
}

// -----------------------------------------------------------------------
// Tests: init
// -----------------------------------------------------------------------

#[test]
fn init_writes_private_config_and_refuses_overwrite() {
    let home = TempDir::new().unwrap();

    let out = mealplan(&home)
        .args(["init", "--db-url", "postgresql://db:5432/meals", "--openai-api-key", "sk-test"])
        .output()
        .unwrap();
    let text = stdout(&out);
    assert!(text.contains("database.url = postgresql://db:5432/meals"));
    assert!(!text.contains("sk-test"), "api key must not be echoed");

    let path = home.path().join("mealplan").join("config.toml");
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("postgresql://db:5432/meals"));
    assert!(contents.contains("sk-test"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let again = mealplan(&home).arg("init").output().unwrap();
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));

    let forced = mealplan(&home).args(["init", "--force"]).output().unwrap();
    stdout(&forced);
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(!contents.contains("sk-test"));
}

#[test]
fn broken_config_file_is_reported() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("mealplan");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[database\n").unwrap();

    let out = mealplan(&home).arg("list").output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("failed to parse config file"));
}

// -----------------------------------------------------------------------
// Tests: sync / show / list / refresh against PostgreSQL
// -----------------------------------------------------------------------

#[tokio::test]
async fn sync_show_list_and_refresh() {
    let (pool, db_name) = create_test_db().await;
    let db_url = format!("{}/{db_name}", pg_url().await);
    let home = TempDir::new().unwrap();

    // First sync: a weekly generation is dispatched; with --wait the
    // committed outcome is printed as well.
    let out = mealplan(&home)
        .args([
            "--database-url",
            &db_url,
            "sync",
            "--user",
            " Ana@Example.com ",
            "--diet",
            "Vegan",
            "--allergen",
            "peanut",
            "--wait",
        ])
        .output()
        .unwrap();
    let docs = json_documents(&stdout(&out));
    assert_eq!(docs.len(), 2);

    let first = &docs[0];
    assert_eq!(first["status"], "pending");
    assert_eq!(first["pending"], true);
    assert_eq!(first["refreshed"]["weekly"], true);
    assert!(first["plan"]["week_start"].is_null());

    let settled = &docs[1];
    assert_eq!(settled["status"], "error");
    assert_eq!(settled["pending"], false);
    assert!(
        settled["error"].as_str().unwrap().contains("unavailable"),
        "unexpected error: {}",
        settled["error"]
    );
    assert!(settled.get("refreshed").is_none());

    // The key is normalized, so `show` finds the same record.
    let out = mealplan(&home)
        .args(["--database-url", &db_url, "show", "--user", "ana@example.com"])
        .output()
        .unwrap();
    let docs = json_documents(&stdout(&out));
    assert_eq!(docs[0]["status"], "error");
    assert_eq!(docs[0]["meta"]["diet"], "Vegan");

    let out = mealplan(&home)
        .args(["--database-url", &db_url, "list"])
        .output()
        .unwrap();
    let text = stdout(&out);
    assert!(text.contains("Plans: 1"), "got:\n{text}");
    assert!(text.contains("error=1"), "got:\n{text}");
    assert!(text.contains("ana@example.com"));

    // The failed weekly job is retried by the batch refresh.
    let out = mealplan(&home)
        .args(["--database-url", &db_url, "refresh"])
        .output()
        .unwrap();
    let text = stdout(&out);
    assert!(text.contains("Scanned: 1"), "got:\n{text}");
    assert!(text.contains("weekly regenerated: 1"), "got:\n{text}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn show_without_plan_fails() {
    let (pool, db_name) = create_test_db().await;
    let db_url = format!("{}/{db_name}", pg_url().await);
    let home = TempDir::new().unwrap();

    let out = mealplan(&home)
        .args(["--database-url", &db_url, "show", "--user", "nobody@example.com"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no plan for nobody@example.com"));

    pool.close().await;
    drop_test_db(&db_name).await;
}
