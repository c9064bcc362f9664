//! Interface for audit events.

use serde::Serialize;
use serde_json::Value;

/// A tracked account setting changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingChanged {
    pub user_id: i64,
    pub table: &'static str,
    pub setting: &'static str,
    pub old_value: Value,
    pub new_value: Value,
}

/// Port for emitting audit events.
pub trait EventEmitter: Send + Sync {
    fn setting_changed(&self, event: &SettingChanged);
}
