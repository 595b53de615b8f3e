//! Multicast peer discovery — presence announcements out, membership in.

pub mod announce;
pub mod listener;
