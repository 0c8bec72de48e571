//! Scripting boundary
//!
//! Engines plug in through [`ScriptEngine`]; the server ships
//! [`BannerEngine`].

mod builtin;
mod engine;
mod host;

pub use builtin::BannerEngine;
pub use engine::{EntryScript, ScriptCache, ScriptEngine};
pub use host::ScriptHost;
