//! Interpreter construction with a restricted standard library.
//!
//! Scripts get the base library, coroutines, strings, tables, math, utf8 and
//! a `require` that can only find Lua files below the configured module
//! directories. There is no io, os or debug library, no native module
//! loading and no way to read a file outside the module path.
//!
//! Every thread the script creates is charged against the same instruction
//! budget. `pcall`, `xpcall`, `coroutine.resume` and `coroutine.wrap` are
//! replaced by versions that re-raise once the budget is spent, so a script
//! cannot catch the interrupt and keep running.

use crate::config::RuntimeConfig;
use mlua::{Function, HookTriggers, Lua, LuaOptions, StdLib, Table, Value, VmState};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const BUDGET_EXCEEDED: &str =
    "Script exceeded maximum instruction count (possible infinite loop)";

/// Base-library functions that reach the filesystem.
const BLOCKED_GLOBALS: &[&str] = &["dofile", "loadfile"];

/// Wraps the error-catching builtins; `check` raises once the budget is
/// spent, before the protected call and again after it returns.
const GUARDED_CALLS: &str = r#"
local pcall, xpcall, resume, wrap, check = ...

local function settle(...)
    check()
    return ...
end

local guarded = {}

function guarded.pcall(f, ...)
    check()
    return settle(pcall(f, ...))
end

function guarded.xpcall(f, handler, ...)
    check()
    return settle(xpcall(f, handler, ...))
end

function guarded.resume(co, ...)
    check()
    return settle(resume(co, ...))
end

function guarded.wrap(f)
    local step = wrap(f)
    return function(...)
        check()
        return settle(step(...))
    end
end

return guarded
"#;

/// Instruction counter shared with the interpreter's count hook. Reset
/// before every load or hook call.
#[derive(Debug)]
pub struct StepBudget {
    used: AtomicU64,
    limit: u64,
}

impl StepBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            limit,
        }
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::Relaxed);
    }

    /// Charges `steps` and reports whether the budget still holds.
    pub fn charge(&self, steps: u64) -> bool {
        let used = self.used.fetch_add(steps, Ordering::Relaxed) + steps;
        used <= self.limit
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    pub fn exhausted(&self) -> bool {
        self.used() > self.limit
    }
}

pub fn create_sandboxed_vm(config: &RuntimeConfig, budget: Arc<StepBudget>) -> mlua::Result<Lua> {
    let lua = Lua::new_with(
        StdLib::COROUTINE
            | StdLib::TABLE
            | StdLib::STRING
            | StdLib::UTF8
            | StdLib::MATH
            | StdLib::PACKAGE,
        LuaOptions::default(),
    )?;

    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        globals.raw_set(*name, Value::Nil)?;
    }

    configure_package_path(&lua, &config.module_paths)?;

    if let Some(limit) = config.memory_limit {
        lua.set_memory_limit(limit)?;
    }

    guard_protected_calls(&lua, Arc::clone(&budget))?;

    // Global, so coroutines created by the script inherit it.
    let interval = config.hook_interval.max(1);
    lua.set_global_hook(
        HookTriggers::new().every_nth_instruction(interval),
        move |_, _| {
            if budget.charge(interval as u64) {
                Ok(VmState::Continue)
            } else {
                Err(mlua::Error::runtime(BUDGET_EXCEEDED))
            }
        },
    )?;

    Ok(lua)
}

fn guard_protected_calls(lua: &Lua, budget: Arc<StepBudget>) -> mlua::Result<()> {
    let globals = lua.globals();
    let coroutine: Table = globals.get("coroutine")?;

    let check = lua.create_function(move |_, ()| {
        if budget.exhausted() {
            Err(mlua::Error::runtime(BUDGET_EXCEEDED))
        } else {
            Ok(())
        }
    })?;

    let guarded: Table = lua.load(GUARDED_CALLS).set_name("=sandbox").call((
        globals.get::<Function>("pcall")?,
        globals.get::<Function>("xpcall")?,
        coroutine.get::<Function>("resume")?,
        coroutine.get::<Function>("wrap")?,
        check,
    ))?;

    globals.raw_set("pcall", guarded.get::<Function>("pcall")?)?;
    globals.raw_set("xpcall", guarded.get::<Function>("xpcall")?)?;
    coroutine.raw_set("resume", guarded.get::<Function>("resume")?)?;
    coroutine.raw_set("wrap", guarded.get::<Function>("wrap")?)?;
    Ok(())
}

/// Points `require` at the module directories and removes every way of
/// loading native code.
pub fn configure_package_path<P: AsRef<Path>>(lua: &Lua, module_paths: &[P]) -> mlua::Result<()> {
    let path = module_paths
        .iter()
        .flat_map(|dir| {
            let dir = dir.as_ref().display().to_string();
            [format!("{dir}/?.lua"), format!("{dir}/?/init.lua")]
        })
        .collect::<Vec<_>>()
        .join(";");

    let package: mlua::Table = lua.globals().get("package")?;
    package.set("path", path)?;
    package.set("cpath", "")?;
    package.set("loadlib", Value::Nil)?;
    Ok(())
}
