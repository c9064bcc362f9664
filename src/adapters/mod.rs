//! Implementations of the ports.

mod discussion;
mod email_change;
mod memory;
mod postgres;
mod preferences;
mod rabbitmq;

use chrono::{DateTime, Utc};

pub use discussion::{DisabledDiscussion, HttpDiscussionService, StaticCourseCatalog};
pub use email_change::ConfirmationEmailChange;
pub use memory::MemoryStore;
pub use postgres::PgAccountStore;
pub use preferences::StorePreferences;
pub use rabbitmq::RabbitMqMailer;

use crate::ports::{Clock, EventEmitter, SettingChanged};

/// System clock using the OS time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Audit events written to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl EventEmitter for TracingEvents {
    fn setting_changed(&self, event: &SettingChanged) {
        tracing::info!(
            target: "audit",
            user_id = event.user_id,
            table = event.table,
            setting = event.setting,
            old_value = %event.old_value,
            new_value = %event.new_value,
            "setting changed"
        );
    }
}
