//! Edit engine for Unity iOS build output.
//!
//! Responsibilities:
//! - Parse and rewrite the Xcode project (`openstep`, `project`).
//! - Resolve which targets receive frameworks and capabilities (`resolve`).
//! - Write the push-notification entitlements file (`capability`).
//! - Merge typed settings into `Info.plist` (`plist_merge`).
//! - Flip feature macros in `Preprocessor.h` (`macros`).
//!
//! Every editor returns a [`FileEdit`] describing the bytes it wants on disk;
//! callers decide whether to write or preview.

pub mod capability;
pub mod error;
pub mod macros;
pub mod openstep;
pub mod plist_merge;
pub mod project;
pub mod resolve;

pub use error::{PatchError, PatchResult};

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use diffy::PatchFormatter;
use fs_err as fs;

/// Desired contents of one file, paired with what is there now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub path: Utf8PathBuf,
    /// `None` when the file does not exist yet.
    pub before: Option<Vec<u8>>,
    pub after: Vec<u8>,
}

impl FileEdit {
    pub fn new(path: impl Into<Utf8PathBuf>, before: Option<Vec<u8>>, after: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.before.is_none()
    }

    /// False when writing `after` would leave the file byte-identical.
    pub fn is_change(&self) -> bool {
        self.before.as_deref() != Some(self.after.as_slice())
    }
}

/// Read a file that may legitimately be absent.
pub fn read_optional(path: &Utf8Path) -> anyhow::Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("read {}", path))?;
    Ok(Some(bytes))
}

/// Unified diff of every edit that changes its file, with paths shown
/// relative to `root`.
pub fn render_patch(root: &Utf8Path, edits: &[FileEdit]) -> String {
    let mut out = String::new();
    let formatter = PatchFormatter::new();

    for edit in edits.iter().filter(|e| e.is_change()) {
        let rel = edit.path.strip_prefix(root).unwrap_or(edit.path.as_path());
        let old = edit
            .before
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        let new = String::from_utf8_lossy(&edit.after);

        out.push_str(&format!("diff --git a/{0} b/{0}\n", rel));
        if edit.is_creation() {
            out.push_str(&format!("--- /dev/null\n+++ b/{0}\n", rel));
        } else {
            out.push_str(&format!("--- a/{0}\n+++ b/{0}\n", rel));
        }

        let patch = diffy::create_patch(&old, &new);
        let body = formatter.fmt_patch(&patch).to_string();
        // diffy names the sides itself; the headers above already did.
        out.push_str(body.strip_prefix("--- original\n+++ modified\n").unwrap_or(&body));
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}
