//! End-to-end tests for the kiln binary

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn kiln_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.current_dir(dir)
        .env_remove("KILN_PROFILE")
        .env_remove("KILN_JOBS")
        .env_remove("KILN_BUILD_DIR")
        .env_remove("KILN_JSON")
        .env_remove("KILN_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const BASIC_MANIFEST: &str = r#"
[project]
name = "demo"

[profiles.profiling]
inherits = "release"
opt-level = 3
"#;

// ══════════════════════════════════════════════════════════════════════════════
// HELP AND ERRORS
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_help_lists_commands() {
    let temp_dir = TempDir::new().unwrap();
    kiln_cmd(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("clean"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("KILN_PROFILE"));
}

#[test]
fn test_build_outside_project_fails() {
    let temp_dir = TempDir::new().unwrap();
    kiln_cmd(temp_dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load project"))
        .stderr(predicate::str::contains("kiln.toml"));
}

#[test]
fn test_unknown_profile_fails() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "kiln.toml", BASIC_MANIFEST);
    write(temp_dir.path(), "src/main.cpp", "int main() { return 0; }\n");

    kiln_cmd(temp_dir.path())
        .args(["build", "--profile", "shipping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile not found: shipping"));
}

#[test]
fn test_missing_entry_point_fails() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "kiln.toml", BASIC_MANIFEST);

    kiln_cmd(temp_dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Entry point not found"));
}

#[test]
fn test_profiles_lists_builtin_and_custom() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "kiln.toml", BASIC_MANIFEST);

    kiln_cmd(temp_dir.path())
        .arg("profiles")
        .assert()
        .success()
        .stdout(predicate::str::contains("debug"))
        .stdout(predicate::str::contains("internal"))
        .stdout(predicate::str::contains("release"))
        .stdout(predicate::str::contains("profiling    O3"));
}

#[test]
fn test_profiles_keeps_custom_name_case() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "kiln.toml",
        "[project]\nname = \"demo\"\n\n[profiles.Profiling]\ninherits = \"release\"\n",
    );

    kiln_cmd(temp_dir.path())
        .arg("profiles")
        .assert()
        .success()
        .stdout(predicate::str::contains("Profiling    O2"));
}

#[test]
fn test_completions_generated() {
    let temp_dir = TempDir::new().unwrap();
    kiln_cmd(temp_dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kiln"));
}

// ══════════════════════════════════════════════════════════════════════════════
// BUILDS WITH A SCRIPTED TOOLCHAIN
// ══════════════════════════════════════════════════════════════════════════════

#[cfg(unix)]
mod scripted {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Compiler/linker stand-in: compiles unless the source has `#error`,
    /// links a shell script that prints its working directory
    const FAKE_CC: &str = r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -c) src="$2"; shift ;;
  esac
  shift
done
if [ -n "$src" ]; then
  if grep -q '#error' "$src"; then
    echo "$src:1:2: error: #error unfinished" >&2
    exit 1
  fi
  echo "object" > "$out"
else
  printf '#!/bin/sh\necho "running in $(pwd)" "$@"\n' > "$out"
  chmod +x "$out"
fi
"#;

    fn create_project() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let cc = root.join("tools/fake-cc");
        write(root, "tools/fake-cc", FAKE_CC);
        fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).unwrap();

        write(
            root,
            "kiln.toml",
            &format!(
                "[project]\nname = \"demo\"\n\n\
                 [toolchain]\ncompiler = \"{0}\"\nlinker = \"{0}\"\njobs = 2\n",
                cc.display()
            ),
        );
        write(root, "src/main.cpp", "#include \"util.h\"\nint main() { return 0; }\n");
        write(root, "src/util.h", "#pragma once\n");
        write(root, "data/settings.ini", "volume=3\n");
        temp_dir
    }

    #[test]
    fn test_build_then_noop() {
        let project = create_project();

        kiln_cmd(project.path())
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("Built demo (debug)"))
            .stdout(predicate::str::contains("1 compiled, 0 reused, linked"));

        assert!(project.path().join("build/demo").is_file());
        assert!(project.path().join("build/data/settings.ini").is_file());

        kiln_cmd(project.path())
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("demo (debug) is up to date"));
    }

    #[test]
    fn test_build_json_summary() {
        let project = create_project();

        let output = kiln_cmd(project.path())
            .args(["build", "--json", "--release"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(summary["success"], true);
        assert_eq!(summary["profile"], "release");
        assert_eq!(summary["compiled_units"], 1);
        assert_eq!(summary["recompiled"][0]["reason"], "new");
    }

    #[test]
    fn test_compile_error_reported_with_output() {
        let project = create_project();
        write(project.path(), "src/main.cpp", "#error unfinished\nint main() {}\n");

        kiln_cmd(project.path())
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("main.cpp"))
            .stderr(predicate::str::contains("error: #error unfinished"));

        assert!(!project.path().join("build").exists());
    }

    #[test]
    fn test_run_uses_build_directory() {
        let project = create_project();

        kiln_cmd(project.path())
            .args(["run", "--", "--level", "3"])
            .assert()
            .success()
            .stdout(predicate::str::contains("running in"))
            .stdout(predicate::str::contains("build --level 3"));
    }

    #[test]
    fn test_deploy_and_clean() {
        let project = create_project();

        kiln_cmd(project.path())
            .arg("deploy")
            .assert()
            .success()
            .stdout(predicate::str::contains("Deployed 2 files"))
            .stdout(predicate::str::contains("demo.zip"));
        assert!(project.path().join("deploy/demo/demo").is_file());
        assert!(project.path().join("deploy/demo.zip").is_file());
        assert!(project.path().join("deploy/demo/data/settings.ini").is_file());

        kiln_cmd(project.path())
            .arg("clean")
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed"));
        assert!(!project.path().join("build").exists());
        assert!(!project.path().join("deploy").exists());
    }
}
