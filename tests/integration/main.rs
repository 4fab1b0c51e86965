//! Integration tests for Shipwright

mod matrix;

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn shipwright() -> Command {
        let mut cmd = cargo_bin_cmd!("shipwright");
        cmd.env_remove("SHIPWRIGHT_PIPELINE");
        cmd
    }

    /// Single linux platform whose build is a shell script
    fn write_pipeline(dir: &Path, build_script: &str, extra: &str) -> std::path::PathBuf {
        let path = dir.join("shipwright.toml");
        let content = format!(
            r#"
provision = []

[general]
run_log = false

[storage]
cache_dir = "cache"
artifact_dir = "artifacts"

[[platform]]
name = "linux"
os = "linux"

[[cache]]
name = "deps"
key_files = ["lock"]
paths = ["deps"]

[build]
program = "sh"
args = ["-c", "{script}"]
profile_arg = ""
profile = "release"
secret_env = []
output_dir = "out"

[[artifacts]]
name = "debs"
include = ["*.deb"]
exclude = ["*.sig"]
{extra}
"#,
            script = build_script,
            extra = extra
        );
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        shipwright()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Cross-platform release pipeline engine"));
    }

    #[test]
    fn version_displays() {
        shipwright()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("shipwright"));
    }

    #[test]
    fn config_path_uses_pipeline_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release.toml");
        shipwright()
            .args(["config", "path", "--pipeline"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("release.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let dir = TempDir::new().unwrap();
        shipwright()
            .args(["config", "show", "--pipeline"])
            .arg(dir.path().join("missing.toml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("[build]"))
            .stdout(predicate::str::contains("tauri-release.conf.json"));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shipwright.toml");
        shipwright()
            .args(["config", "init", "--pipeline"])
            .arg(&path)
            .assert()
            .success();
        assert!(fs::read_to_string(&path).unwrap().contains("[[platform]]"));
    }

    #[test]
    fn plan_lists_default_platforms() {
        let dir = TempDir::new().unwrap();
        shipwright()
            .args(["plan", "--pipeline"])
            .arg(dir.path().join("missing.toml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("ubuntu-22.04"))
            .stdout(predicate::str::contains("windows-latest"))
            .stdout(predicate::str::contains("apt-get install"));
    }

    #[test]
    fn plan_json_reports_misconfigured_platform() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(
            dir.path(),
            "true",
            "[[platform]]\nname = \"haiku\"\nos = \"beos\"\n",
        );

        let output = shipwright()
            .args(["plan", "--format", "json", "--pipeline"])
            .arg(&path)
            .output()
            .unwrap();
        assert!(output.status.success());

        let plans: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let haiku = plans
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["platform"] == "haiku")
            .unwrap();
        assert!(haiku["error"].as_str().unwrap().contains("beos"));
    }

    #[test]
    fn unknown_platform_filter_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(dir.path(), "true", "");
        shipwright()
            .args(["run", "--platform", "solaris", "--pipeline"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("No platform named solaris"));
    }

    #[test]
    fn push_to_other_branch_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(dir.path(), "exit 9", "");
        shipwright()
            .args(["run", "--event", "push", "--branch", "feature/x", "--pipeline"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Trigger conditions not met"));
    }

    #[cfg(unix)]
    #[test]
    fn run_builds_collects_and_caches() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lock"), "v1").unwrap();
        fs::create_dir_all(dir.path().join("deps")).unwrap();
        fs::write(dir.path().join("deps/lib.a"), "lib").unwrap();
        let path = write_pipeline(
            dir.path(),
            "mkdir -p out && echo pkg > out/app.deb && echo sig > out/app.deb.sig",
            "",
        );

        shipwright()
            .args(["run", "--pipeline"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("All 1 platform(s) succeeded"));

        assert!(dir.path().join("artifacts/linux/app.deb").exists());
        assert!(!dir.path().join("artifacts/linux/app.deb.sig").exists());
        // Collection never touches the output tree
        assert!(dir.path().join("out/app.deb.sig").exists());

        let output = shipwright()
            .args(["run", "--format", "json", "--pipeline"])
            .arg(&path)
            .output()
            .unwrap();
        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["status"], "success");
        assert_eq!(
            report["outcomes"]["linux"]["cache_entries"][0]["outcome"],
            "hit-exact"
        );

        shipwright()
            .args(["cache", "list", "--pipeline"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("linux~deps~"));
    }

    #[cfg(unix)]
    #[test]
    fn failed_build_exits_nonzero_with_tail() {
        let dir = TempDir::new().unwrap();
        let path = write_pipeline(dir.path(), "echo bundling failed >&2; exit 3", "");

        shipwright()
            .args(["run", "--pipeline"])
            .arg(&path)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("build tool failure"))
            .stdout(predicate::str::contains("exit code 3"))
            .stdout(predicate::str::contains("bundling failed"));
    }
}
