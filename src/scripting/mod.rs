//! Sandboxed Lua scripting.
//!
//! Scripts define `on_beat(ctx, beat)` and/or `process(ctx)`; both are
//! optional. Script errors are returned as strings and never unwind into
//! the audio callback.
mod api;
mod context;
mod lua_runtime;
mod sandbox;

pub use api::{project_transport, register_context_api};
pub use context::{ContextHandle, DropCounts, PluginContext};
pub use lua_runtime::{ON_BEAT_HOOK, PROCESS_HOOK, ScriptRuntime};
pub use sandbox::{BUDGET_EXCEEDED, StepBudget, configure_package_path, create_sandboxed_vm};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to create Lua VM: {0}")]
    Init(String),
    #[error("Lua engine not initialized")]
    NotInitialized,
    #[error("{0}")]
    Compile(String),
    #[error("{0}")]
    Runtime(String),
}

/// Human-readable message for an interpreter error, without the traceback.
pub(crate) fn describe_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::SyntaxError { message, .. } => first_line(message),
        mlua::Error::RuntimeError(message) => first_line(message),
        mlua::Error::MemoryError(message) => format!("out of memory: {}", first_line(message)),
        mlua::Error::CallbackError { cause, .. } => describe_error(cause),
        mlua::Error::WithContext { cause, .. } => describe_error(cause),
        other => first_line(&other.to_string()),
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}
