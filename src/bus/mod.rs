//! Shared half-duplex serial bus.
//!
//! Every device module talks to its endpoints through this layer:
//! [`address`] maps endpoints to wire bytes, [`command`] and [`queue`] hold
//! outbound traffic per category, [`frame`] delimits and checks wire frames,
//! [`mailbox`] hands received frames to the main loop and [`transport`]
//! ties them together.

pub mod address;
pub mod command;
pub mod frame;
pub mod mailbox;
pub mod queue;
pub mod transport;
