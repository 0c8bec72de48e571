//! External programs in pseudo-terminals, via portable-pty

mod bridge;
mod config;
mod handle;

pub use bridge::ProcessBridge;
pub use config::PtyConfig;
pub use handle::PtyHandle;
