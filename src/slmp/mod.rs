//! SLMP 3E binary protocol: frame construction/parsing, device addressing,
//! and the stateful client built on both.

pub mod client;
pub mod device;
pub mod frame;

pub use client::{Command, SlmpClient};
pub use device::{Device, DeviceExtension};
pub use frame::FrameHeader;
