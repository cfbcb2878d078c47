//! Test utilities shared across test modules
//!
//! Fixtures that lay out a fake home directory inside a `TempDir`, plus a
//! fake host config document shaped like the one Claude Code writes.

use serde_json::{Value, json};
use std::fs;
use tempfile::TempDir;

use crate::paths::{Paths, SecretBackendKind};

/// Create a Paths struct for testing using a temporary directory
///
/// Mirrors the real ~/.claude-swap/, ~/.claude/ and ~/.claude.json layout.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    let home = temp_dir.path();
    Paths::from_parts(
        home.join(".claude-swap"),
        home.join(".claude"),
        home.join(".claude.json"),
        home.join(".zshrc"),
        SecretBackendKind::File,
    )
}

/// A host config document logged in as `email`
pub fn host_config(email: &str, uuid: &str) -> Value {
    json!({
        "numStartups": 12,
        "theme": "dark",
        "projects": { "/work/app": { "allowedTools": ["Bash"] } },
        "oauthAccount": {
            "accountUuid": uuid,
            "emailAddress": email,
            "organizationName": "Personal"
        },
        "userID": "abc123"
    })
}

/// Write a host config document logged in as `email`
pub fn login_as(paths: &Paths, email: &str, uuid: &str) {
    write_host_config(paths, &host_config(email, uuid));
}

pub fn write_host_config(paths: &Paths, doc: &Value) {
    if let Some(parent) = paths.claude_config.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&paths.claude_config, serde_json::to_string_pretty(doc).unwrap()).unwrap();
}

pub fn read_host_config(paths: &Paths) -> Value {
    serde_json::from_str(&fs::read_to_string(&paths.claude_config).unwrap()).unwrap()
}
