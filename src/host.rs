//! The host application's own config document (`.claude.json`).
//!
//! ccswap reads exactly one field from it, the logged-in identity under
//! `oauthAccount`, and on restore merges exactly that field back in.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fs_utils::write_private_atomic;

/// Field of the host config that carries the logged-in identity
pub const IDENTITY_FIELD: &str = "oauthAccount";

/// Who the host application is logged in as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub uuid: String,
}

impl Identity {
    /// Extract the identity from a host config document, if it has one
    pub fn from_document(doc: &Value) -> Option<Self> {
        let account = doc.get(IDENTITY_FIELD)?;
        let email = account.get("emailAddress")?.as_str()?.trim();
        if email.is_empty() {
            return None;
        }
        let uuid = account
            .get("accountUuid")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Self {
            email: email.to_string(),
            uuid: uuid.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    path: PathBuf,
}

impl HostConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The live document, `None` if the host has never written one
    pub fn read(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read host config: {}", self.path.display()))?;
        let doc = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in host config: {}", self.path.display()))?;
        Ok(Some(doc))
    }

    /// Identity the host is currently logged in as
    pub fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.read()?.as_ref().and_then(Identity::from_document))
    }

    /// Replace the live identity field with the one from `snapshot`,
    /// leaving every other field of the live document as it is.
    pub fn merge_identity(&self, snapshot: &Value) -> Result<()> {
        let mut live = match self.read()? {
            Some(Value::Object(map)) => map,
            Some(_) => bail!(
                "Host config is not a JSON object: {}",
                self.path.display()
            ),
            None => Map::new(),
        };

        match snapshot.get(IDENTITY_FIELD) {
            Some(identity) => {
                live.insert(IDENTITY_FIELD.to_string(), identity.clone());
            }
            None => {
                live.remove(IDENTITY_FIELD);
            }
        }

        let mut content = serde_json::to_vec_pretty(&Value::Object(live))
            .context("Failed to serialize host config")?;
        content.push(b'\n');
        write_private_atomic(&self.path, &content, |bytes| {
            match serde_json::from_slice::<Value>(bytes) {
                Ok(Value::Object(_)) => Ok(()),
                Ok(_) => Err("host config is not a JSON object".into()),
                Err(e) => Err(e.to_string()),
            }
        })
    }
}
