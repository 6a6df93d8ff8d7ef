//! Toolchain adapters.
//!
//! An adapter maps a project layout to the ordered gate commands that decide
//! red/green for it. Detection is marker-file based and first-match wins, in
//! a fixed priority order, so a polyglot repository gets one deterministic
//! toolchain.

use std::path::Path;

use crate::core::types::GateCommand;

/// A supported project toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    PythonPytest,
    RustCargo,
    Node,
}

impl Adapter {
    /// Stable identifier used in logs and context text.
    pub fn id(self) -> &'static str {
        match self {
            Adapter::PythonPytest => "python-pytest",
            Adapter::RustCargo => "rust-cargo",
            Adapter::Node => "node",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Adapter::PythonPytest => "Python project (pytest).",
            Adapter::RustCargo => "Rust project (cargo test/clippy/fmt).",
            Adapter::Node => "Node/JS/TS project (npm scripts).",
        }
    }

    fn detect(self, project: &Path) -> bool {
        match self {
            Adapter::PythonPytest => {
                project.join("pyproject.toml").exists()
                    || project.join("pytest.ini").exists()
                    || project.join("tox.ini").exists()
                    || has_pytest_files(project)
            }
            Adapter::RustCargo => project.join("Cargo.toml").exists(),
            Adapter::Node => project.join("package.json").exists(),
        }
    }

    /// Ordered gate commands for this toolchain.
    pub fn commands(self, project: &Path) -> Vec<GateCommand> {
        match self {
            Adapter::PythonPytest => {
                let test = if project.join("uv.lock").exists() {
                    GateCommand::new(["uv", "run", "pytest", "-q"])
                } else {
                    GateCommand::new(["python3", "-m", "pytest", "-q"])
                };
                vec![test, GateCommand::new(["python3", "-m", "ruff", "check", "."])]
            }
            Adapter::RustCargo => vec![
                GateCommand::new(["cargo", "fmt", "--all", "--", "--check"]),
                GateCommand::new([
                    "cargo",
                    "clippy",
                    "--all-targets",
                    "--all-features",
                    "--",
                    "-D",
                    "warnings",
                ]),
                GateCommand::new(["cargo", "test"]),
            ],
            Adapter::Node => vec![
                GateCommand::new(["npm", "test", "--silent"]),
                GateCommand::new(["npm", "run", "lint", "--silent"]),
                GateCommand::new(["npm", "run", "typecheck", "--silent"]),
            ],
        }
    }
}

const DETECTION_ORDER: [Adapter; 3] = [Adapter::PythonPytest, Adapter::RustCargo, Adapter::Node];

/// Pick the first adapter whose markers are present, or `None`.
pub fn detect_adapter(project: &Path) -> Option<Adapter> {
    DETECTION_ORDER.into_iter().find(|a| a.detect(project))
}

fn has_pytest_files(project: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(project.join("tests")) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|e| {
        e.file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("test_") && name.ends_with(".py"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_python_via_pyproject() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("pyproject.toml"), "[project]\n").expect("write");
        assert_eq!(detect_adapter(temp.path()), Some(Adapter::PythonPytest));
    }

    #[test]
    fn detects_python_via_test_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("tests")).expect("mkdir");
        fs::write(temp.path().join("tests/test_calc.py"), "def test_ok(): pass\n")
            .expect("write");
        assert_eq!(detect_adapter(temp.path()), Some(Adapter::PythonPytest));
    }

    #[test]
    fn detects_rust_via_cargo_toml() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[package]\n").expect("write");
        assert_eq!(detect_adapter(temp.path()), Some(Adapter::RustCargo));
    }

    #[test]
    fn detects_node_via_package_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("package.json"), "{}\n").expect("write");
        assert_eq!(detect_adapter(temp.path()), Some(Adapter::Node));
    }

    #[test]
    fn python_wins_over_rust_in_mixed_repos() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("pyproject.toml"), "[project]\n").expect("write");
        fs::write(temp.path().join("Cargo.toml"), "[package]\n").expect("write");
        assert_eq!(detect_adapter(temp.path()), Some(Adapter::PythonPytest));
    }

    #[test]
    fn empty_directory_has_no_adapter() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(detect_adapter(temp.path()), None);
    }

    #[test]
    fn python_prefers_uv_when_locked() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("pyproject.toml"), "[project]\n").expect("write");
        fs::write(temp.path().join("uv.lock"), "").expect("write");
        let cmds = Adapter::PythonPytest.commands(temp.path());
        assert_eq!(cmds[0].render(), "uv run pytest -q");
    }

    #[test]
    fn python_falls_back_to_module_pytest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmds = Adapter::PythonPytest.commands(temp.path());
        assert_eq!(cmds[0].render(), "python3 -m pytest -q");
    }

    #[test]
    fn rust_commands_run_fmt_clippy_test_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmds = Adapter::RustCargo.commands(temp.path());
        let rendered: Vec<String> = cmds.iter().map(GateCommand::render).collect();
        assert_eq!(rendered[0], "cargo fmt --all -- --check");
        assert!(rendered[1].starts_with("cargo clippy"));
        assert_eq!(rendered[2], "cargo test");
    }
}
