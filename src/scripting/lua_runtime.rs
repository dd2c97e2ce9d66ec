use super::api::{project_transport, register_context_api};
use super::context::ContextHandle;
use super::sandbox::{StepBudget, create_sandboxed_vm};
use super::{ScriptError, describe_error};
use crate::config::RuntimeConfig;
use mlua::{Function, Lua, Table, Value};
use std::sync::Arc;

pub const ON_BEAT_HOOK: &str = "on_beat";
pub const PROCESS_HOOK: &str = "process";

/// Chunk name shown in error messages.
const CHUNK_NAME: &str = "=script";

struct Interpreter {
    // dropped before `lua`
    ctx: Table,
    lua: Lua,
}

/// One sandboxed interpreter bound to one [`ContextHandle`]. Swapping
/// scripts means building a new runtime, never reloading this one.
pub struct ScriptRuntime {
    interpreter: Option<Interpreter>,
    context: ContextHandle,
    budget: Arc<StepBudget>,
    has_script: bool,
}

impl ScriptRuntime {
    pub fn init(context: ContextHandle, config: &RuntimeConfig) -> Result<Self, ScriptError> {
        let budget = Arc::new(StepBudget::new(config.step_budget));
        let lua = create_sandboxed_vm(config, Arc::clone(&budget))
            .map_err(|e| ScriptError::Init(describe_error(&e)))?;
        let ctx = register_context_api(&lua, &context)
            .map_err(|e| ScriptError::Init(describe_error(&e)))?;

        Ok(Self {
            interpreter: Some(Interpreter { ctx, lua }),
            context,
            budget,
            has_script: false,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.interpreter.is_some()
    }

    pub fn has_script(&self) -> bool {
        self.has_script
    }

    /// Compiles `source` without running it.
    pub fn check(&self, source: &str) -> Result<(), ScriptError> {
        let interpreter = self.interpreter.as_ref().ok_or(ScriptError::NotInitialized)?;
        compile(&interpreter.lua, source).map(|_| ())
    }

    /// Compiles and runs the top-level chunk, which defines the hooks.
    pub fn load(&mut self, source: &str) -> Result<(), ScriptError> {
        let interpreter = self.interpreter.as_ref().ok_or(ScriptError::NotInitialized)?;
        self.has_script = false;

        let chunk = compile(&interpreter.lua, source)?;
        refresh_fields(interpreter, &self.context);
        self.budget.reset();
        chunk
            .call::<()>(())
            .map_err(|e| ScriptError::Runtime(describe_error(&e)))?;

        self.has_script = true;
        Ok(())
    }

    /// Calls `on_beat(ctx, beat)` when the script defines it.
    pub fn call_on_beat(&mut self, beat: i32) -> Result<(), ScriptError> {
        let Some(interpreter) = self.loaded() else {
            return Ok(());
        };
        let Some(hook) = lookup_hook(&interpreter.lua, ON_BEAT_HOOK) else {
            return Ok(());
        };
        refresh_fields(interpreter, &self.context);
        self.budget.reset();
        hook.call::<()>((interpreter.ctx.clone(), beat))
            .map_err(|e| ScriptError::Runtime(describe_error(&e)))
    }

    /// Calls `process(ctx)` when the script defines it.
    pub fn call_process(&mut self) -> Result<(), ScriptError> {
        let Some(interpreter) = self.loaded() else {
            return Ok(());
        };
        let Some(hook) = lookup_hook(&interpreter.lua, PROCESS_HOOK) else {
            return Ok(());
        };
        refresh_fields(interpreter, &self.context);
        self.budget.reset();
        hook.call::<()>(interpreter.ctx.clone())
            .map_err(|e| ScriptError::Runtime(describe_error(&e)))
    }

    pub fn shutdown(&mut self) {
        self.interpreter = None;
        self.has_script = false;
    }

    /// Instructions charged to the most recent load or hook call, rounded
    /// up to the hook interval.
    pub fn steps_used(&self) -> u64 {
        self.budget.used()
    }

    fn loaded(&self) -> Option<&Interpreter> {
        if self.has_script {
            self.interpreter.as_ref()
        } else {
            None
        }
    }
}

fn compile(lua: &Lua, source: &str) -> Result<Function, ScriptError> {
    lua.load(source)
        .set_name(CHUNK_NAME)
        .into_function()
        .map_err(|e| ScriptError::Compile(describe_error(&e)))
}

fn lookup_hook(lua: &Lua, name: &str) -> Option<Function> {
    match lua.globals().raw_get::<Value>(name) {
        Ok(Value::Function(hook)) => Some(hook),
        _ => None,
    }
}

fn refresh_fields(interpreter: &Interpreter, context: &ContextHandle) {
    if let Some(transport) = context.with(|c| *c.transport()) {
        let _ = project_transport(&interpreter.ctx, &transport);
    }
}
