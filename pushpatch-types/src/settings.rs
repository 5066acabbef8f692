use serde::{Deserialize, Serialize};

/// Well-known setting keys the orchestrator derives its switches from.
pub mod keys {
    /// Location-based notification triggers; links CoreLocation and flips `UNITY_USES_LOCATION`.
    pub const USE_LOCATION_TRIGGER: &str = "UnityUseLocationNotificationTrigger";
    /// Remote notifications; adds the push capability and the background mode.
    pub const ADD_REMOTE_NOTIFICATION_CAPABILITY: &str = "UnityAddRemoteNotificationCapability";
    /// Sign push with the production APS environment instead of development.
    pub const USE_APS_RELEASE_ENVIRONMENT: &str = "UnityUseAPSReleaseEnvironment";
}

/// One entry of the desired-state settings list.
///
/// On disk a setting is a flat record: `{ "key": ..., "kind": ..., "value": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SettingRecord", into = "SettingRecord")]
pub struct DesiredSetting {
    pub key: String,
    pub value: SettingValue,
}

impl DesiredSetting {
    pub fn boolean(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value: SettingValue::Boolean(value),
        }
    }

    pub fn enumeration(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: SettingValue::Enum(value),
        }
    }

    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: SettingValue::Text(value.into()),
        }
    }
}

/// Typed setting value. The variant is the setting's kind.
///
/// Enum-kind values (presentation and authorization options) are stored as
/// their integer representation; no range validation is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Boolean(bool),
    Enum(i64),
    Text(String),
}

impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingValue::Boolean(_) => SettingKind::Boolean,
            SettingValue::Enum(_) => SettingKind::Enum,
            SettingValue::Text(_) => SettingKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "integer")]
    Enum,
    #[serde(alias = "string")]
    Text,
}

impl std::fmt::Display for SettingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SettingKind::Boolean => "boolean",
            SettingKind::Enum => "enum",
            SettingKind::Text => "text",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingRecord {
    key: String,
    kind: SettingKind,
    value: SettingLiteral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SettingLiteral {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl TryFrom<SettingRecord> for DesiredSetting {
    type Error = String;

    fn try_from(record: SettingRecord) -> Result<Self, Self::Error> {
        let value = match (record.kind, record.value) {
            (SettingKind::Boolean, SettingLiteral::Bool(b)) => SettingValue::Boolean(b),
            (SettingKind::Enum, SettingLiteral::Int(i)) => SettingValue::Enum(i),
            (SettingKind::Text, SettingLiteral::Str(s)) => SettingValue::Text(s),
            (kind, _) => {
                return Err(format!(
                    "setting '{}' declares kind {} but carries a value of another type",
                    record.key, kind
                ));
            }
        };
        Ok(Self {
            key: record.key,
            value,
        })
    }
}

impl From<DesiredSetting> for SettingRecord {
    fn from(setting: DesiredSetting) -> Self {
        let kind = setting.value.kind();
        let value = match setting.value {
            SettingValue::Boolean(b) => SettingLiteral::Bool(b),
            SettingValue::Enum(i) => SettingLiteral::Int(i),
            SettingValue::Text(s) => SettingLiteral::Str(s),
        };
        Self {
            key: setting.key,
            kind,
            value,
        }
    }
}

/// Find a setting by key. Duplicate keys resolve to the last entry.
pub fn find_setting<'a>(settings: &'a [DesiredSetting], key: &str) -> Option<&'a DesiredSetting> {
    settings.iter().rev().find(|s| s.key == key)
}

/// Read a boolean switch; absent or non-boolean entries read as `false`.
pub fn bool_setting(settings: &[DesiredSetting], key: &str) -> bool {
    find_setting(settings, key)
        .and_then(|s| s.value.as_bool())
        .unwrap_or(false)
}
