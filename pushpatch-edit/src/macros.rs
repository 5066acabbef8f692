//! Feature macro flips in the generated `Classes/Preprocessor.h`.

use crate::FileEdit;
use crate::error::{PatchError, PatchResult};
use camino::Utf8Path;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

pub const PREPROCESSOR_REL_PATH: &str = "Classes/Preprocessor.h";
pub const LOCATION_MACRO: &str = "UNITY_USES_LOCATION";
pub const REMOTE_NOTIFICATIONS_MACRO: &str = "UNITY_USES_REMOTE_NOTIFICATIONS";

// The name and the `0` must both be whole tokens.
pub static LOCATION_DISABLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(UNITY_USES_LOCATION) 0\b").expect("Invalid UNITY_USES_LOCATION regex")
});
pub static REMOTE_NOTIFICATIONS_DISABLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(UNITY_USES_REMOTE_NOTIFICATIONS) 0\b")
        .expect("Invalid UNITY_USES_REMOTE_NOTIFICATIONS regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroFlags {
    pub location_enabled: bool,
    pub push_enabled: bool,
}

impl MacroFlags {
    fn enabled_macros(self) -> impl Iterator<Item = (&'static str, &'static Regex)> {
        [
            (LOCATION_MACRO, &*LOCATION_DISABLED, self.location_enabled),
            (
                REMOTE_NOTIFICATIONS_MACRO,
                &*REMOTE_NOTIFICATIONS_DISABLED,
                self.push_enabled,
            ),
        ]
        .into_iter()
        .filter_map(|(name, pattern, on)| on.then_some((name, pattern)))
    }
}

/// Rewrite every match of `disabled` (a `(<name>) 0` pattern) to `<name> 1`.
/// Returns the new text and the number of rewrites.
pub fn enable_macro(text: &str, disabled: &Regex) -> (String, usize) {
    let count = disabled.find_iter(text).count();
    if count == 0 {
        return (text.to_string(), 0);
    }
    (disabled.replace_all(text, "${1} 1").into_owned(), count)
}

/// Enable the macros whose flag is set. Macros missing from the text are skipped.
pub fn patch(text: &str, flags: MacroFlags) -> (String, bool) {
    let mut current = text.to_string();
    let mut changed = false;
    for (name, disabled) in flags.enabled_macros() {
        let (next, count) = enable_macro(&current, disabled);
        if count == 0 {
            debug!(name, "macro absent or already enabled");
            continue;
        }
        debug!(name, count, "enabled macro");
        current = next;
        changed = true;
    }
    (current, changed)
}

/// Edit for the header at `path`, or `None` when no macro needed flipping.
pub fn macro_edit(path: &Utf8Path, bytes: &[u8], flags: MacroFlags) -> PatchResult<Option<FileEdit>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PatchError::malformed(path.to_path_buf(), e.to_string()))?;
    let (after, changed) = patch(text, flags);
    if !changed {
        return Ok(None);
    }
    Ok(Some(FileEdit::new(
        path.to_path_buf(),
        Some(bytes.to_vec()),
        after.into_bytes(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "#pragma once\n\n#define UNITY_USES_LOCATION 0\n#define UNITY_USES_REMOTE_NOTIFICATIONS 0\n";

    #[test]
    fn both_flags_flip_both_macros() {
        let flags = MacroFlags {
            location_enabled: true,
            push_enabled: true,
        };
        let (text, changed) = patch(HEADER, flags);
        assert!(changed);
        assert_eq!(
            text,
            "#pragma once\n\n#define UNITY_USES_LOCATION 1\n#define UNITY_USES_REMOTE_NOTIFICATIONS 1\n"
        );
    }

    #[test]
    fn disabled_flag_leaves_macro_alone() {
        let flags = MacroFlags {
            location_enabled: true,
            push_enabled: false,
        };
        let (text, _) = patch(HEADER, flags);
        assert!(text.contains("UNITY_USES_LOCATION 1"));
        assert!(text.contains("UNITY_USES_REMOTE_NOTIFICATIONS 0"));
    }

    #[test]
    fn absent_macro_is_skipped() {
        let flags = MacroFlags {
            location_enabled: true,
            push_enabled: true,
        };
        let (text, changed) = patch("#define OTHER 0\n", flags);
        assert!(!changed);
        assert_eq!(text, "#define OTHER 0\n");
    }

    #[test]
    fn already_enabled_is_unchanged() {
        let flags = MacroFlags {
            location_enabled: true,
            push_enabled: false,
        };
        let (_, changed) = patch("#define UNITY_USES_LOCATION 1\n", flags);
        assert!(!changed);
    }

    #[test]
    fn longer_identifiers_and_numbers_are_not_matched() {
        let text = "#define UNITY_USES_LOCATION_EXTRA 0\n#define MY_UNITY_USES_LOCATION 0\n#define UNITY_USES_LOCATION 00\n";
        let (out, count) = enable_macro(text, &LOCATION_DISABLED);
        assert_eq!(count, 0);
        assert_eq!(out, text);
    }

    #[test]
    fn every_occurrence_is_rewritten() {
        let text = "#if X\n#define UNITY_USES_LOCATION 0\n#else\n#define UNITY_USES_LOCATION 0\n#endif\n";
        let (out, count) = enable_macro(text, &LOCATION_DISABLED);
        assert_eq!(count, 2);
        assert!(!out.contains("UNITY_USES_LOCATION 0"));
    }

    #[test]
    fn macro_at_start_and_end_of_text_is_rewritten() {
        let (out, count) = enable_macro("UNITY_USES_REMOTE_NOTIFICATIONS 0", &REMOTE_NOTIFICATIONS_DISABLED);
        assert_eq!(count, 1);
        assert_eq!(out, "UNITY_USES_REMOTE_NOTIFICATIONS 1");
    }

    #[test]
    fn macro_edit_rejects_invalid_utf8() {
        let err = macro_edit(Utf8Path::new("/out/Classes/Preprocessor.h"), &[0xff, 0xfe], MacroFlags::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
