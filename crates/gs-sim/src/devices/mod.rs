//! Small demonstration devices.

pub mod follower;
pub mod lag;

pub use follower::Follower;
pub use lag::FirstOrderLag;
