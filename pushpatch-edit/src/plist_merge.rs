//! Typed merge of desired settings into `Info.plist`.
//!
//! Values are compared by kind before writing so that an unchanged desired
//! state never touches the file.

use crate::FileEdit;
use crate::error::{PatchError, PatchResult};
use anyhow::Context;
use camino::Utf8Path;
use plist::{Dictionary, Value};
use pushpatch_types::settings::{DesiredSetting, SettingValue};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

pub const INFO_PLIST_NAME: &str = "Info.plist";
pub const BACKGROUND_MODES_KEY: &str = "UIBackgroundModes";
pub const REMOTE_NOTIFICATION_MODE: &str = "remote-notification";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub changed: bool,
    /// Keys whose value was written, in processing order.
    pub written_keys: Vec<String>,
    /// Keys carrying a kind that is never written.
    pub skipped_keys: Vec<String>,
    pub background_mode_added: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("UIBackgroundModes is not an array")]
    BackgroundModesNotArray,
}

pub fn merge(
    dict: &mut Dictionary,
    settings: &[DesiredSetting],
    add_background_mode: bool,
) -> Result<MergeOutcome, MergeError> {
    let mut outcome = MergeOutcome::default();

    for setting in settings {
        let current = dict.get(&setting.key);
        let (desired, in_sync) = match &setting.value {
            SettingValue::Boolean(b) => (
                Value::Boolean(*b),
                current.and_then(Value::as_boolean) == Some(*b),
            ),
            SettingValue::Enum(n) => (
                Value::from(*n),
                current.and_then(Value::as_signed_integer) == Some(*n),
            ),
            SettingValue::Text(_) => {
                debug!(key = %setting.key, "text settings are not written");
                outcome.skipped_keys.push(setting.key.clone());
                continue;
            }
        };

        if in_sync {
            continue;
        }
        dict.insert(setting.key.clone(), desired);
        outcome.written_keys.push(setting.key.clone());
        outcome.changed = true;
    }

    if add_background_mode {
        match dict.get_mut(BACKGROUND_MODES_KEY) {
            None => {
                dict.insert(
                    BACKGROUND_MODES_KEY.to_string(),
                    Value::Array(vec![Value::String(REMOTE_NOTIFICATION_MODE.to_string())]),
                );
                outcome.background_mode_added = true;
            }
            Some(Value::Array(modes)) => {
                if !modes
                    .iter()
                    .any(|m| m.as_string() == Some(REMOTE_NOTIFICATION_MODE))
                {
                    modes.push(Value::String(REMOTE_NOTIFICATION_MODE.to_string()));
                    outcome.background_mode_added = true;
                }
            }
            Some(_) => return Err(MergeError::BackgroundModesNotArray),
        }
        outcome.changed |= outcome.background_mode_added;
    }

    Ok(outcome)
}

pub fn parse_document(path: &Utf8Path, bytes: &[u8]) -> PatchResult<Dictionary> {
    let value = Value::from_reader(Cursor::new(bytes))
        .map_err(|e| PatchError::malformed(path.to_path_buf(), e.to_string()))?;
    value
        .into_dictionary()
        .ok_or_else(|| PatchError::malformed(path.to_path_buf(), "root is not a dictionary"))
}

/// Merge `settings` into the plist bytes read from `path`.
///
/// Returns the merge outcome and, only when something changed, the rewrite.
pub fn plist_edit(
    path: &Utf8Path,
    bytes: &[u8],
    settings: &[DesiredSetting],
    add_background_mode: bool,
) -> PatchResult<(MergeOutcome, Option<FileEdit>)> {
    let mut dict = parse_document(path, bytes)?;
    let outcome = merge(&mut dict, settings, add_background_mode)
        .map_err(|e| PatchError::malformed(path.to_path_buf(), e.to_string()))?;

    if !outcome.changed {
        debug!(path = %path, "plist already up to date");
        return Ok((outcome, None));
    }

    let mut after = Vec::with_capacity(bytes.len());
    Value::Dictionary(dict)
        .to_writer_xml(&mut after)
        .with_context(|| format!("serialize {}", path))?;
    if !after.ends_with(b"\n") {
        after.push(b'\n');
    }
    let edit = FileEdit::new(path.to_path_buf(), Some(bytes.to_vec()), after);
    Ok((outcome, Some(edit)))
}
