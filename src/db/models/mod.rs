//! Database models.
//! Re-exported at `crate::db::models` so callers can `use crate::db::models::*;`.

pub mod live_notification;
pub mod match_snapshot;
pub mod static_data;
pub mod tracked_target;

pub use self::live_notification::*;
pub use self::match_snapshot::*;
pub use self::static_data::*;
pub use self::tracked_target::*;
