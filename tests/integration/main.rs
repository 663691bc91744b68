//! Integration tests for rustup-layers

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    const OPTIONS: &[&str] = &[
        "BP_RUSTUP_ENABLED",
        "BP_RUSTUP_INIT_VERSION",
        "BP_RUSTUP_INIT_LIBC",
        "BP_RUSTUP_INIT_ARGS",
        "BP_RUST_PROFILE",
        "BP_RUST_TOOLCHAIN",
        "BP_RUST_TARGET",
        "CNB_BUILDPACK_DIR",
        "CNB_LAYERS_DIR",
        "CNB_APP_DIR",
        "CNB_STACK_ID",
        "CNB_BP_PLAN_PATH",
    ];

    fn rustup_layers() -> Command {
        let mut cmd = cargo_bin_cmd!("rustup-layers");
        for name in OPTIONS {
            cmd.env_remove(name);
        }
        cmd
    }

    #[test]
    fn help_displays() {
        rustup_layers()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Installs rustup and a Rust toolchain"));
    }

    #[test]
    fn version_displays() {
        rustup_layers()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("rustup-layers"));
    }

    #[test]
    fn detect_passes_by_default() {
        rustup_layers()
            .arg("detect")
            .assert()
            .success()
            .stdout(predicate::str::contains("provides rustup, rust"));
    }

    #[test]
    fn detect_json_lists_plans() {
        rustup_layers()
            .args(["detect", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"pass\": true"))
            .stdout(predicate::str::contains("\"provides\""));
    }

    #[test]
    fn detect_fails_when_disabled() {
        rustup_layers()
            .arg("detect")
            .env("BP_RUSTUP_ENABLED", "false")
            .assert()
            .code(100);
    }

    #[test]
    fn bad_boolean_is_rejected() {
        rustup_layers()
            .arg("detect")
            .env("BP_RUSTUP_ENABLED", "maybe")
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("BP_RUSTUP_ENABLED"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn disabled_build_reports_unmet() {
        let layers = TempDir::new().unwrap();
        rustup_layers()
            .arg("build")
            .arg("--layers")
            .arg(layers.path())
            .env("BP_RUSTUP_ENABLED", "0")
            .assert()
            .success()
            .stdout(predicate::str::contains("Unmet: rustup, rust"));

        assert_eq!(std::fs::read_dir(layers.path()).unwrap().count(), 0);
    }

    #[test]
    fn disabled_build_json_with_plan() {
        let temp = TempDir::new().unwrap();
        let plan = temp.path().join("plan.toml");
        std::fs::write(&plan, "[[entries]]\nname = \"rust\"\n").unwrap();

        rustup_layers()
            .arg("build")
            .arg("--layers")
            .arg(temp.path())
            .arg("--plan")
            .arg(&plan)
            .args(["--format", "json"])
            .env("BP_RUSTUP_ENABLED", "false")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"layers\": []"))
            .stdout(predicate::str::contains("\"name\": \"rust\""))
            .stdout(predicate::str::contains("rustup\"").not());
    }

    #[test]
    fn build_without_catalog_fails_resolution() {
        let layers = TempDir::new().unwrap();
        rustup_layers()
            .arg("build")
            .arg("--layers")
            .arg(layers.path())
            .args(["--stack", "io.buildpacks.stacks.jammy"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("rustup-init-gnu"))
            .stderr(predicate::str::contains("BP_RUSTUP_INIT_VERSION"));
    }

    #[test]
    fn config_shows_defaults() {
        rustup_layers()
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("BP_RUST_TOOLCHAIN"))
            .stdout(predicate::str::contains("stable"));
    }

    #[test]
    fn config_reads_descriptor_and_environment() {
        let buildpack = TempDir::new().unwrap();
        std::fs::write(
            buildpack.path().join("buildpack.toml"),
            r#"
[buildpack]
id = "example/rustup"
name = "Example Rustup"
version = "1.2.3"

[[metadata.configurations]]
name = "BP_RUST_TOOLCHAIN"
default = "nightly"
build = true
"#,
        )
        .unwrap();

        rustup_layers()
            .args(["config", "--format", "json"])
            .arg("--buildpack-dir")
            .arg(buildpack.path())
            .env("BP_RUST_PROFILE", "default")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"toolchain\": \"nightly\""))
            .stdout(predicate::str::contains("\"profile\": \"default\""))
            .stdout(predicate::str::contains("\"profile_set\": true"));
    }

    #[test]
    fn invalid_descriptor_is_reported() {
        let buildpack = TempDir::new().unwrap();
        std::fs::write(buildpack.path().join("buildpack.toml"), "[[[").unwrap();

        rustup_layers()
            .arg("config")
            .arg("--buildpack-dir")
            .arg(buildpack.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("buildpack.toml"));
    }
}
