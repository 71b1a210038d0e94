//! Integration tests for depcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn depcache() -> Command {
        cargo_bin_cmd!("depcache")
    }

    /// Write a config pointing the cache at a scratch directory
    fn scratch_config(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("config.toml");
        let cache_dir = temp.path().join("cache");
        std::fs::write(
            &path,
            format!("[cache]\ndir = '{}'\n", cache_dir.display()),
        )
        .unwrap();
        path
    }

    fn fetch(config: &Path, location: &str) -> Command {
        let mut cmd = depcache();
        cmd.arg("--config").arg(config).args(["fetch", location]);
        cmd
    }

    #[test]
    fn help_displays() {
        depcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache-aware artifact accessor"));
    }

    #[test]
    fn version_displays() {
        depcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depcache"));
    }

    #[test]
    fn config_path() {
        depcache()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = scratch_config(&temp);

        depcache()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("max_age_secs = 86400"));
    }

    #[test]
    fn config_init_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("nested").join("config.toml");

        depcache()
            .arg("--config")
            .arg(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        assert!(config.exists());
    }

    #[test]
    fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[cache\n").unwrap();

        depcache()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn fetch_file_into_cache() {
        let temp = TempDir::new().unwrap();
        let config = scratch_config(&temp);
        let source = temp.path().join("lib-1.0.jar");
        std::fs::write(&source, b"jar bytes").unwrap();

        let output = fetch(&config, source.to_str().unwrap())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let cached = PathBuf::from(String::from_utf8(output).unwrap().trim());
        assert!(cached.starts_with(temp.path().join("cache")));
        assert!(cached.ends_with("lib-1.0.jar"));
        assert_eq!(std::fs::read(&cached).unwrap(), b"jar bytes");
    }

    #[test]
    fn fetch_then_lookup_shows_record() {
        let temp = TempDir::new().unwrap();
        let config = scratch_config(&temp);
        let source = temp.path().join("lib-2.0.pom");
        std::fs::write(&source, b"<project/>").unwrap();
        let location = format!("file://{}", source.display());

        fetch(&config, &location).assert().success();

        depcache()
            .arg("--config")
            .arg(&config)
            .args(["lookup", &location])
            .assert()
            .success()
            .stdout(predicate::str::contains("fresh"))
            .stdout(predicate::str::contains("lib-2.0.pom"));
    }

    #[test]
    fn fetch_json_includes_checksum() {
        let temp = TempDir::new().unwrap();
        let config = scratch_config(&temp);
        let source = temp.path().join("data.bin");
        std::fs::write(&source, b"abc").unwrap();

        fetch(&config, source.to_str().unwrap())
            .args(["--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            ));
    }

    #[test]
    fn lookup_unknown_location() {
        let temp = TempDir::new().unwrap();
        let config = scratch_config(&temp);

        depcache()
            .arg("--config")
            .arg(&config)
            .args(["lookup", "https://repo.example.com/never/fetched.jar"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entry"));
    }

    #[test]
    fn fetch_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let config = scratch_config(&temp);
        let missing = temp.path().join("missing.jar");

        fetch(&config, missing.to_str().unwrap())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Resource not found"));
    }

    #[test]
    fn fetch_unsupported_scheme_fails() {
        let temp = TempDir::new().unwrap();
        let config = scratch_config(&temp);

        fetch(&config, "ftp://repo.example.com/lib.jar")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unsupported resource location"));
    }

    #[test]
    fn refresh_and_offline_conflict() {
        depcache()
            .args(["fetch", "https://repo/a.jar", "--refresh", "--offline"])
            .assert()
            .failure();
    }
}
