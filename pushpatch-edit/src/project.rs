//! In-memory view of a generated Xcode project and the target-scoped
//! mutations the notification wiring needs.
//!
//! The graph remembers the text it was parsed from and only produces an edit
//! when a mutation actually changed something.

use crate::FileEdit;
use crate::error::{PatchError, PatchResult};
use crate::openstep::{self, PbxDict, PbxValue};
use crate::resolve::ResolvedTargets;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pushpatch_types::platform::TargetRole;
use tracing::debug;
use uuid::Uuid;

pub const PROJECT_DIR_NAME: &str = "Unity-iPhone.xcodeproj";
pub const PROJECT_FILE_NAME: &str = "project.pbxproj";
pub const CODE_SIGN_ENTITLEMENTS: &str = "CODE_SIGN_ENTITLEMENTS";

const SYSTEM_FRAMEWORKS_DIR: &str = "System/Library/Frameworks";
const FRAMEWORKS_GROUP: &str = "Frameworks";
const ENTITLEMENTS_FILE_TYPE: &str = "text.plist.entitlements";

const OBJECT_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9a, 0x4e, 0x1c, 0x07, 0x3b, 0x52, 0x4f, 0x8d, 0xa1, 0x66, 0x2e, 0x90, 0x5c, 0x13, 0x7b,
    0x44,
]);

/// `<output_dir>/Unity-iPhone.xcodeproj/project.pbxproj`
pub fn project_path(output_dir: &Utf8Path) -> Utf8PathBuf {
    output_dir.join(PROJECT_DIR_NAME).join(PROJECT_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub role: TargetRole,
}

#[derive(Debug, Clone)]
pub struct ProjectGraph {
    path: Utf8PathBuf,
    original: String,
    /// Root dictionary with an empty placeholder where `objects` sits.
    root: PbxDict,
    objects: PbxDict,
    root_object: String,
    dirty: bool,
}

impl ProjectGraph {
    pub fn open(path: &Utf8Path) -> PatchResult<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path))?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Utf8Path, text: &str) -> PatchResult<Self> {
        let malformed = |message: String| PatchError::malformed(path.to_path_buf(), message);

        let value = openstep::parse(text).map_err(|e| malformed(e.to_string()))?;
        let PbxValue::Dict(mut root) = value else {
            return Err(malformed("root is not a dictionary".to_string()));
        };
        let objects = match root.insert("objects", PbxDict::new()) {
            Some(PbxValue::Dict(objects)) => objects,
            _ => return Err(malformed("missing objects table".to_string())),
        };
        let root_object = root
            .get_str("rootObject")
            .map(str::to_string)
            .ok_or_else(|| malformed("missing rootObject".to_string()))?;
        if objects.get_dict(&root_object).is_none() {
            return Err(malformed(format!(
                "rootObject {root_object} is not in the objects table"
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            original: text.to_string(),
            root,
            objects,
            root_object,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Text the graph was parsed from.
    pub fn source_text(&self) -> &str {
        &self.original
    }

    fn malformed(&self, message: impl Into<String>) -> PatchError {
        PatchError::malformed(self.path.clone(), message)
    }

    fn object(&self, id: &str) -> Option<&PbxDict> {
        self.objects.get_dict(id)
    }

    fn isa(&self, id: &str) -> Option<&str> {
        self.object(id).and_then(|o| o.get_str("isa"))
    }

    fn project_object(&self) -> Option<&PbxDict> {
        self.object(&self.root_object)
    }

    /// Targets in the order the project lists them.
    pub fn targets(&self) -> Vec<Target> {
        let Some(ids) = self.project_object().and_then(|p| p.get_array("targets")) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(PbxValue::as_str)
            .filter_map(|id| {
                let object = self.object(id)?;
                Some(Target {
                    id: id.to_string(),
                    name: object.get_str("name")?.to_string(),
                    role: role_for(object.get_str("productType")),
                })
            })
            .collect()
    }

    pub fn target_by_name(&self, name: &str) -> Option<Target> {
        self.targets().into_iter().find(|t| t.name == name)
    }

    pub fn target(&self, id: &str) -> Option<Target> {
        self.targets().into_iter().find(|t| t.id == id)
    }

    fn require_target(&self, id: &str) -> PatchResult<()> {
        if self.target(id).is_some() {
            Ok(())
        } else {
            Err(PatchError::MissingTarget {
                message: format!("no target with id {id} in {}", self.path),
            })
        }
    }

    fn configuration_ids(&self, target_id: &str) -> Vec<String> {
        self.object(target_id)
            .and_then(|t| t.get_str("buildConfigurationList"))
            .and_then(|list| self.object(list))
            .and_then(|list| list.get_array("buildConfigurations"))
            .map(|ids| {
                ids.iter()
                    .filter_map(PbxValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First value of `key` across the target's build configurations.
    pub fn build_property_for_any_config(&self, target_id: &str, key: &str) -> Option<String> {
        self.configuration_ids(target_id).iter().find_map(|id| {
            self.object(id)?
                .get_dict("buildSettings")?
                .get_str(key)
                .map(str::to_string)
        })
    }

    /// Set `key` on every build configuration of the target.
    pub fn set_build_property(
        &mut self,
        target_id: &str,
        key: &str,
        value: &str,
    ) -> PatchResult<bool> {
        let ids = self.configuration_ids(target_id);
        if ids.is_empty() {
            return Err(self.malformed(format!(
                "target {target_id} has no build configurations"
            )));
        }

        let path = self.path.clone();
        let mut changed = false;
        for id in ids {
            let settings = self
                .objects
                .get_dict_mut(&id)
                .and_then(|config| config.dict_entry("buildSettings"))
                .ok_or_else(|| {
                    PatchError::malformed(path.clone(), format!("bad build configuration {id}"))
                })?;
            if settings.get_str(key) != Some(value) {
                settings.insert(key, value);
                changed = true;
            }
        }
        if changed {
            debug!(target = target_id, key, value, "set build property");
            self.dirty = true;
        }
        Ok(changed)
    }

    fn frameworks_phase_id(&self, target_id: &str) -> Option<String> {
        self.object(target_id)?
            .get_array("buildPhases")?
            .iter()
            .filter_map(PbxValue::as_str)
            .find(|id| self.isa(id) == Some("PBXFrameworksBuildPhase"))
            .map(str::to_string)
    }

    /// Names of frameworks linked by the target's frameworks phase.
    pub fn linked_frameworks(&self, target_id: &str) -> Vec<String> {
        let Some(files) = self
            .frameworks_phase_id(target_id)
            .and_then(|phase| self.object(&phase))
            .and_then(|phase| phase.get_array("files"))
        else {
            return Vec::new();
        };
        files
            .iter()
            .filter_map(PbxValue::as_str)
            .filter_map(|build_file| self.object(build_file)?.get_str("fileRef"))
            .filter_map(|file_ref| {
                let object = self.object(file_ref)?;
                object.get_str("name").or_else(|| {
                    object
                        .get_str("path")
                        .map(|p| p.rsplit('/').next().unwrap_or(p))
                })
            })
            .map(str::to_string)
            .collect()
    }

    fn find_file_ref(&self, matches: impl Fn(&PbxDict) -> bool) -> Option<String> {
        self.objects
            .iter()
            .find(|(_, object)| {
                object.as_dict().is_some_and(|o| {
                    o.get_str("isa") == Some("PBXFileReference") && matches(o)
                })
            })
            .map(|(id, _)| id.to_string())
    }

    /// Deterministic 24-hex-digit object id derived from `seed`.
    fn new_object_id(&self, seed: &str) -> String {
        let mut attempt = 0u32;
        loop {
            let key = if attempt == 0 {
                seed.to_string()
            } else {
                format!("{seed}#{attempt}")
            };
            let mut id = Uuid::new_v5(&OBJECT_ID_NAMESPACE, key.as_bytes())
                .simple()
                .to_string()
                .to_ascii_uppercase();
            id.truncate(24);
            if !self.objects.contains_key(&id) {
                return id;
            }
            attempt += 1;
        }
    }

    fn main_group_id(&self) -> Option<String> {
        self.project_object()?
            .get_str("mainGroup")
            .map(str::to_string)
    }

    fn frameworks_group_id(&self) -> Option<String> {
        let main = self.main_group_id()?;
        let group = self
            .object(&main)?
            .get_array("children")
            .and_then(|children| {
                children.iter().filter_map(PbxValue::as_str).find(|id| {
                    self.object(id).is_some_and(|g| {
                        g.get_str("isa") == Some("PBXGroup")
                            && (g.get_str("name") == Some(FRAMEWORKS_GROUP)
                                || g.get_str("path") == Some(FRAMEWORKS_GROUP))
                    })
                })
            })
            .map(str::to_string);
        group.or(Some(main))
    }

    fn add_to_group(&mut self, group_id: &str, child_id: &str) -> PatchResult<()> {
        let path = self.path.clone();
        let children = self
            .objects
            .get_dict_mut(group_id)
            .and_then(|group| group.array_entry("children"))
            .ok_or_else(|| PatchError::malformed(path, format!("bad group {group_id}")))?;
        if !children.iter().any(|c| c.as_str() == Some(child_id)) {
            children.push(child_id.into());
        }
        Ok(())
    }

    /// Link a system framework into the target's frameworks phase.
    ///
    /// A framework that is already linked is left as is, including its weak flag.
    pub fn add_framework(
        &mut self,
        target_id: &str,
        framework: &str,
        weak: bool,
    ) -> PatchResult<bool> {
        self.require_target(target_id)?;
        let mut changed = false;

        let ref_path = format!("{SYSTEM_FRAMEWORKS_DIR}/{framework}");
        let file_ref = match self.find_file_ref(|o| o.get_str("path") == Some(ref_path.as_str()))
        {
            Some(id) => id,
            None => {
                let id = self.new_object_id(&format!("PBXFileReference|{ref_path}"));
                let mut object = PbxDict::new();
                object.insert("isa", "PBXFileReference");
                object.insert("lastKnownFileType", "wrapper.framework");
                object.insert("name", framework);
                object.insert("path", ref_path.as_str());
                object.insert("sourceTree", "SDKROOT");
                self.objects.insert(id.clone(), object);
                if let Some(group) = self.frameworks_group_id() {
                    self.add_to_group(&group, &id)?;
                }
                changed = true;
                id
            }
        };

        let phase = match self.frameworks_phase_id(target_id) {
            Some(id) => id,
            None => {
                let id = self.new_object_id(&format!("PBXFrameworksBuildPhase|{target_id}"));
                let mut object = PbxDict::new();
                object.insert("isa", "PBXFrameworksBuildPhase");
                object.insert("buildActionMask", "2147483647");
                object.insert("files", PbxValue::Array(Vec::new()));
                object.insert("runOnlyForDeploymentPostprocessing", "0");
                self.objects.insert(id.clone(), object);

                let path = self.path.clone();
                self.objects
                    .get_dict_mut(target_id)
                    .and_then(|target| target.array_entry("buildPhases"))
                    .ok_or_else(|| {
                        PatchError::malformed(path, format!("bad build phases on {target_id}"))
                    })?
                    .push(id.as_str().into());
                changed = true;
                id
            }
        };

        let already_linked = self
            .object(&phase)
            .and_then(|p| p.get_array("files"))
            .is_some_and(|files| {
                files.iter().filter_map(PbxValue::as_str).any(|build_file| {
                    self.object(build_file).and_then(|o| o.get_str("fileRef"))
                        == Some(file_ref.as_str())
                })
            });

        if !already_linked {
            let id = self.new_object_id(&format!("PBXBuildFile|{target_id}|{file_ref}"));
            let mut object = PbxDict::new();
            object.insert("isa", "PBXBuildFile");
            object.insert("fileRef", file_ref.as_str());
            if weak {
                let mut settings = PbxDict::new();
                settings.insert("ATTRIBUTES", PbxValue::Array(vec!["Weak".into()]));
                object.insert("settings", settings);
            }
            self.objects.insert(id.clone(), object);

            let path = self.path.clone();
            self.objects
                .get_dict_mut(&phase)
                .and_then(|p| p.array_entry("files"))
                .ok_or_else(|| PatchError::malformed(path, format!("bad frameworks phase {phase}")))?
                .push(id.into());
            changed = true;
        }

        if changed {
            debug!(target = target_id, framework, weak, "linked framework");
            self.dirty = true;
        } else {
            debug!(target = target_id, framework, "framework already linked");
        }
        Ok(changed)
    }

    /// Link a framework into whichever target plays `role`.
    pub fn link_framework(
        &mut self,
        targets: &ResolvedTargets,
        role: TargetRole,
        framework: &str,
        optional: bool,
    ) -> PatchResult<bool> {
        let target_id = targets.id_for(role).to_string();
        self.add_framework(&target_id, framework, optional)
    }

    /// Associate an entitlements file with the main target.
    ///
    /// `rel_path` is relative to the build output directory.
    pub fn attach_capability_file(&mut self, main_id: &str, rel_path: &str) -> PatchResult<bool> {
        self.require_target(main_id)?;
        let mut changed = false;

        let existing = self.find_file_ref(|o| {
            let Some(path) = o.get_str("path") else {
                return false;
            };
            path == rel_path
                || (o.get_str("lastKnownFileType") == Some(ENTITLEMENTS_FILE_TYPE)
                    && rel_path.ends_with(&format!("/{path}")))
        });
        if existing.is_none() {
            let id = self.new_object_id(&format!("PBXFileReference|{rel_path}"));
            let mut object = PbxDict::new();
            object.insert("isa", "PBXFileReference");
            object.insert("lastKnownFileType", ENTITLEMENTS_FILE_TYPE);
            object.insert("path", rel_path);
            object.insert("sourceTree", "<group>");
            self.objects.insert(id.clone(), object);
            if let Some(group) = self.main_group_id() {
                self.add_to_group(&group, &id)?;
            }
            changed = true;
        }

        changed |= self.set_build_property(main_id, CODE_SIGN_ENTITLEMENTS, rel_path)?;
        if changed {
            self.dirty = true;
        }
        Ok(changed)
    }

    /// Mark a system capability enabled in the project's target attributes.
    pub fn enable_system_capability(
        &mut self,
        target_id: &str,
        capability: &str,
    ) -> PatchResult<bool> {
        self.require_target(target_id)?;
        let path = self.path.clone();
        let entry = self
            .objects
            .get_dict_mut(&self.root_object)
            .and_then(|p| p.dict_entry("attributes"))
            .and_then(|a| a.dict_entry("TargetAttributes"))
            .and_then(|t| t.dict_entry(target_id))
            .and_then(|t| t.dict_entry("SystemCapabilities"))
            .and_then(|s| s.dict_entry(capability))
            .ok_or_else(|| PatchError::malformed(path, "project attributes are not dictionaries"))?;
        if entry.get_str("enabled") == Some("1") {
            return Ok(false);
        }
        entry.insert("enabled", "1");
        self.dirty = true;
        Ok(true)
    }

    pub fn to_text(&self) -> String {
        let mut root = self.root.clone();
        root.insert("objects", self.objects.clone());
        let project_name = self
            .path
            .parent()
            .filter(|dir| dir.extension() == Some("xcodeproj"))
            .and_then(Utf8Path::file_stem);
        openstep::to_string_named(&PbxValue::Dict(root), project_name)
    }

    /// The rewrite this graph needs, if any mutation changed its content.
    pub fn pending_edit(&self) -> Option<FileEdit> {
        if !self.dirty {
            return None;
        }
        let after = self.to_text();
        if after == self.original {
            return None;
        }
        Some(FileEdit::new(
            self.path.clone(),
            Some(self.original.as_bytes().to_vec()),
            after.into_bytes(),
        ))
    }
}

fn role_for(product_type: Option<&str>) -> TargetRole {
    match product_type {
        Some("com.apple.product-type.application") => TargetRole::MainApplication,
        Some("com.apple.product-type.framework") => TargetRole::SharedFrameworkHost,
        _ => TargetRole::Other,
    }
}
