//! Local instance identity, directory layout, and slot locking.

mod id;
mod layout;
mod lock;

pub use id::InstanceId;
pub use layout::InstanceLayout;
pub use lock::{InstanceLock, LockGuard};
