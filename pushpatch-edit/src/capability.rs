//! Push-notification entitlements descriptor.

use crate::FileEdit;
use crate::error::{PatchError, PatchResult};
use anyhow::Context;
use camino::Utf8Path;
use plist::{Dictionary, Value};
use std::io::Cursor;
use tracing::debug;

pub const APS_ENVIRONMENT_KEY: &str = "aps-environment";
pub const ENTITLEMENTS_EXTENSION: &str = "entitlements";
pub const PUSH_CAPABILITY: &str = "com.apple.Push";

/// Entitlements file name derived from the last component of a bundle id.
pub fn default_entitlements_name(bundle_id: &str) -> String {
    let tail = bundle_id.rsplit('.').next().unwrap_or(bundle_id);
    format!("{tail}.{ENTITLEMENTS_EXTENSION}")
}

pub fn aps_environment(sandbox: bool) -> &'static str {
    if sandbox { "development" } else { "production" }
}

/// Signing capabilities declared for the main target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityDescriptor {
    entries: Dictionary,
}

impl CapabilityDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(path: &Utf8Path, bytes: &[u8]) -> PatchResult<Self> {
        let value = Value::from_reader(Cursor::new(bytes))
            .map_err(|e| PatchError::malformed(path.to_path_buf(), e.to_string()))?;
        let entries = value.into_dictionary().ok_or_else(|| {
            PatchError::malformed(path.to_path_buf(), "entitlements root is not a dictionary")
        })?;
        Ok(Self { entries })
    }

    pub fn aps_environment(&self) -> Option<&str> {
        self.entries
            .get(APS_ENVIRONMENT_KEY)
            .and_then(Value::as_string)
    }

    /// Returns true when the stored environment changed.
    pub fn set_push_notifications(&mut self, sandbox: bool) -> bool {
        let wanted = aps_environment(sandbox);
        if self.aps_environment() == Some(wanted) {
            return false;
        }
        self.entries
            .insert(APS_ENVIRONMENT_KEY.to_string(), Value::String(wanted.to_string()));
        true
    }

    pub fn to_xml(&self) -> PatchResult<Vec<u8>> {
        let mut buf = Vec::new();
        Value::Dictionary(self.entries.clone())
            .to_writer_xml(&mut buf)
            .context("serialize entitlements")?;
        if !buf.ends_with(b"\n") {
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

/// Edit that declares push notifications in the entitlements file at `path`.
///
/// `existing` is the current file content, if any. Returns `None` when the
/// file already declares the wanted environment.
pub fn push_capability_edit(
    path: &Utf8Path,
    existing: Option<&[u8]>,
    sandbox: bool,
) -> PatchResult<Option<FileEdit>> {
    let mut descriptor = match existing {
        Some(bytes) => CapabilityDescriptor::from_bytes(path, bytes)?,
        None => CapabilityDescriptor::new(),
    };

    let changed = descriptor.set_push_notifications(sandbox);
    if !changed && existing.is_some() {
        debug!(path = %path, "entitlements already up to date");
        return Ok(None);
    }

    let after = descriptor.to_xml()?;
    Ok(Some(FileEdit::new(
        path.to_path_buf(),
        existing.map(<[u8]>::to_vec),
        after,
    )))
}
