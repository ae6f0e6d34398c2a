pub mod live_notification;
pub mod match_snapshot;
pub mod static_data;
pub mod tracked_target;

pub use live_notification::LiveNotificationRepository;
pub use match_snapshot::MatchSnapshotRepository;
pub use static_data::{DisplayTable, StaticDataRepository};
pub use tracked_target::TrackedTargetRepository;
