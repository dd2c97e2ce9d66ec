//! The `ctx` table handed to scripts.
//!
//! Functions:
//!   ctx.note(pitch, velocity, duration_beats, channel?)
//!   ctx.note_on(pitch, velocity, channel?)
//!   ctx.note_off(pitch, channel?)
//!   ctx.cc(controller, value, channel?)
//!   ctx.pitch_bend(value, channel?)
//!   ctx.log(message)
//!
//! Fields (refreshed before every hook call):
//!   beat, bar, tempo, playing, sample_rate, time_sig_num, time_sig_den

use super::context::ContextHandle;
use crate::events::{MidiEvent, bend_value, channel_number, data_byte};
use crate::timing::TransportSnapshot;
use mlua::{Lua, Result as LuaResult, Table, Value};

/// Builds the `ctx` table, binds every capability to `context` and
/// publishes it as a global.
pub fn register_context_api(lua: &Lua, context: &ContextHandle) -> LuaResult<Table> {
    let ctx = lua.create_table()?;

    macro_rules! capability {
        ($name:literal, $args:ty, |$c:ident, $pat:pat_param| $body:expr) => {{
            let context = context.clone();
            ctx.set(
                $name,
                lua.create_function(move |_, $pat: $args| {
                    context.with(|$c| $body);
                    Ok(())
                })?,
            )?;
        }};
    }

    capability!(
        "note",
        (i64, i64, f64, Option<i64>),
        |c, (pitch, velocity, duration, channel)| c.play_note(
            data_byte(pitch),
            data_byte(velocity),
            duration,
            channel_number(channel.unwrap_or(0)),
        )
    );

    capability!(
        "note_on",
        (i64, i64, Option<i64>),
        |c, (pitch, velocity, channel)| c.emit(MidiEvent::note_on(
            data_byte(pitch),
            data_byte(velocity),
            channel_number(channel.unwrap_or(0)),
        ))
    );

    capability!(
        "note_off",
        (i64, Option<i64>),
        |c, (pitch, channel)| c.emit(MidiEvent::note_off(
            data_byte(pitch),
            channel_number(channel.unwrap_or(0)),
        ))
    );

    capability!(
        "cc",
        (i64, i64, Option<i64>),
        |c, (controller, value, channel)| c.emit(MidiEvent::control_change(
            data_byte(controller),
            data_byte(value),
            channel_number(channel.unwrap_or(0)),
        ))
    );

    capability!(
        "pitch_bend",
        (i64, Option<i64>),
        |c, (value, channel)| c.emit(MidiEvent::pitch_bend(
            bend_value(value),
            channel_number(channel.unwrap_or(0)),
        ))
    );

    {
        let context = context.clone();
        ctx.set(
            "log",
            lua.create_function(move |_, message: Value| {
                let line = describe(&message);
                context.with(|c| c.log(line));
                Ok(())
            })?,
        )?;
    }

    project_transport(&ctx, &TransportSnapshot::default())?;
    lua.globals().set("ctx", ctx.clone())?;
    Ok(ctx)
}

/// Writes the read-only transport fields onto `ctx`. Anything a script
/// stored under these names is overwritten.
pub fn project_transport(ctx: &Table, transport: &TransportSnapshot) -> LuaResult<()> {
    ctx.raw_set("beat", transport.beat)?;
    ctx.raw_set("bar", transport.bar)?;
    ctx.raw_set("tempo", transport.tempo)?;
    ctx.raw_set("playing", transport.playing)?;
    ctx.raw_set("sample_rate", transport.sample_rate)?;
    ctx.raw_set("time_sig_num", transport.time_sig_num)?;
    ctx.raw_set("time_sig_den", transport.time_sig_den)?;
    Ok(())
}

/// `ctx.log` accepts any value rather than raising on non-strings.
fn describe(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy(),
        other => format!("<{}>", other.type_name()),
    }
}
