//! These traits define what the account API needs from the outside world.

pub mod clock;
pub mod discussion;
pub mod email_change;
pub mod events;
pub mod mailer;
pub mod preferences;
pub mod store;

pub use clock::*;
pub use discussion::*;
pub use email_change::*;
pub use events::*;
pub use mailer::*;
pub use preferences::*;
pub use store::*;
