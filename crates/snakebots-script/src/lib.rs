//! Sandboxed rhai scripting backend for SnakeBots agents.
//!
//! A [`ScriptRuntime`] implements [`snakebots_core::DecisionBackend`]: every tick it calls
//! the agent script's `fn step()` with `this` bound to a persistent map, under an
//! instruction quota and a wall-clock budget. Scripts only see the capability registry:
//! `log`, `findFood`, `findSegments`, and the `math`, `string` and `os` modules.

mod capabilities;
mod quota;
mod runtime;

pub use runtime::{ENTRY_POINT, ScriptRuntime};

/// Support helpers compiled in front of every agent script.
pub const PRELUDE: &str = include_str!("prelude.rhai");

/// Bundled example bot used when no scripts are supplied.
pub const DEMO_SCRIPT: &str = include_str!("../scripts/demobot.rhai");
