//! Channel Relay — forwards posts and albums to one channel through a caption template.

pub mod channels;
pub mod config;
pub mod error;
pub mod relay;
pub mod template;
