//! R3 ASCII robot-controller protocol: command/pattern templating, typed
//! response extraction, and the stateful client built on both.

pub mod client;
pub mod extract;
pub mod template_fmt;

pub use client::R3Client;
