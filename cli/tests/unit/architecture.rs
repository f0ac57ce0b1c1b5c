//! Structural tests for architectural boundary enforcement.
//!
//! These scan source files to verify that the layer boundaries hold:
//! domain is pure, application talks to the outside only through ports,
//! and presentation decisions stay out of the services.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

fn src_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
        .replace('\\', "/")
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-comment lines outside `#[cfg(test)]` blocks, with 1-based line numbers.
fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut tracker = CfgTestTracker::new();
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            let comment =
                trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*');
            (!in_test && !comment).then(|| (i + 1, line.to_string()))
        })
        .collect()
}

/// Every production line under `layer` that mentions one of `forbidden`.
fn forbidden_mentions(layer: &str, forbidden: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join(layer)) {
        let rel = relative(&file);
        for (lineno, line) in production_lines(&file) {
            for needle in forbidden {
                if line.contains(needle) {
                    violations.push(format!("{rel}:{lineno}: `{needle}`: {line}"));
                }
            }
        }
    }
    violations
}

// ── Layer boundaries ──────────────────────────────────────────────────────────

#[test]
fn test_domain_is_pure() {
    let violations = forbidden_mentions(
        "domain",
        &[
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
            "tokio",
            "std::fs",
            "std::process",
            "println!",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay free of I/O and outer layers:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_application_has_no_imports_from_outer_layers() {
    let violations = forbidden_mentions(
        "application",
        &["crate::infra", "crate::commands", "crate::output", "println!"],
    );
    assert!(
        violations.is_empty(),
        "application/ must reach the outside only through ports:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_infra_has_no_imports_from_commands_or_output() {
    let violations = forbidden_mentions(
        "infra",
        &["crate::commands", "crate::output", "println!", "eprintln!"],
    );
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/ or print:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_command_runner_constructed_only_in_infra_or_app() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir()) {
        let rel = relative(&file);
        if rel.contains("/infra/") || rel.ends_with("app.rs") {
            continue;
        }
        for (lineno, line) in production_lines(&file) {
            if line.contains("TokioCommandRunner::new") {
                violations.push(format!("{rel}:{lineno}: {line}"));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "TokioCommandRunner::new outside infra/ — use app.command_runner():\n{}",
        violations.join("\n")
    );
}

// ── Presentation ──────────────────────────────────────────────────────────────

#[test]
fn test_no_inline_json_branching_in_commands() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("commands")) {
        let rel = relative(&file);
        for (lineno, line) in production_lines(&file) {
            let trimmed = line.trim();
            if line.contains("json: bool")
                || trimmed.starts_with("if json")
                || trimmed.starts_with("if !json")
            {
                violations.push(format!("{rel}:{lineno}: {line}"));
            }
        }
    }
    assert!(
        violations.is_empty(),
        "Found inline JSON branching in commands/ — use app.renderer() instead:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_commands_use_standardized_confirmation() {
    let violations = forbidden_mentions("commands", &["Confirm::new()", "io::stdin().lock()"]);
    assert!(
        violations.is_empty(),
        "Confirmation prompts must go through app.confirm():\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_command_handlers_are_reasonably_sized() {
    let mut violations = Vec::new();
    for file in collect_rs_files(&src_dir().join("commands")) {
        let count = production_lines(&file)
            .iter()
            .filter(|(_, l)| !l.trim().is_empty())
            .count();
        if count > 100 {
            violations.push(format!("{}: {count} non-test lines (limit: 100)", relative(&file)));
        }
    }
    assert!(
        violations.is_empty(),
        "Command handlers are too long — move logic into application services:\n{}",
        violations.join("\n")
    );
}
