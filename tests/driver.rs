//! Block driver behavior as seen from the host: transport in, wire events
//! and log lines out.

use beatlua::events::ALL_NOTES_OFF;
use beatlua::{
    BlockDriver, EngineConfig, HostEvent, HostEventKind, HostTransport, RuntimeConfig,
    ScriptEditor, create_engine,
};
use std::sync::mpsc;
use std::time::Duration;

fn transport(beat: f64, playing: bool) -> HostTransport {
    HostTransport {
        tempo: Some(120.0),
        beat_position: Some(beat),
        time_signature: Some((4, 4)),
        playing,
        sample_rate: 48000.0,
        block_size: 512,
    }
}

fn run_block(driver: &mut BlockDriver, beat: f64, playing: bool) -> Vec<HostEvent> {
    let mut sink = Vec::with_capacity(64);
    let mut left = [0.0f32; 16];
    let mut right = [0.0f32; 16];
    driver.process_block(
        Some(&transport(beat, playing)),
        &mut sink,
        &mut [&mut left[..], &mut right[..]],
    );
    sink
}

/// An active driver with `source` loaded, parked at beat 0 with the
/// transport stopped and the log drained.
fn loaded_with(config: EngineConfig, source: &str) -> (ScriptEditor, BlockDriver) {
    let (mut editor, mut driver) = create_engine(config);
    driver.activate();
    editor.submit_script(source);
    run_block(&mut driver, 0.0, false);
    assert!(driver.has_script(), "script failed to load: {:?}", editor.drain_logs());
    editor.drain_logs();
    (editor, driver)
}

fn loaded(source: &str) -> (ScriptEditor, BlockDriver) {
    loaded_with(EngineConfig::default(), source)
}

fn is_all_notes_off(event: &HostEvent, expected_channel: u8) -> bool {
    event.kind
        == HostEventKind::ControlChange {
            channel: expected_channel,
            controller: ALL_NOTES_OFF,
            value: 0,
        }
}

#[test]
fn beat_only_script_is_silent_between_beats() {
    let (mut editor, mut driver) =
        loaded("function on_beat(ctx, beat) ctx.note_on(60, 100) end");

    let events = run_block(&mut driver, 0.5, true);

    assert!(events.is_empty());
    assert!(editor.drain_logs().is_empty());
}

#[test]
fn note_is_released_after_its_duration() {
    let (_editor, mut driver) =
        loaded("function on_beat(ctx, beat) if beat == 1 then ctx.note(60, 127, 1.0) end end");

    let events = run_block(&mut driver, 1.0, true);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].kind,
        HostEventKind::NoteOn {
            channel: 0,
            pitch: 60,
            velocity: 1.0,
            note_id: 60
        }
    );
    assert_eq!(driver.scheduled_note_offs(), 1);

    assert!(run_block(&mut driver, 1.5, true).is_empty());

    let events = run_block(&mut driver, 2.0, true);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0].kind,
        HostEventKind::NoteOff {
            channel: 0,
            pitch: 60,
            ..
        }
    ));
    assert_eq!(driver.scheduled_note_offs(), 0);

    assert!(run_block(&mut driver, 3.0, true).is_empty());
}

#[test]
fn note_offs_are_released_while_stopped() {
    let (_editor, mut driver) =
        loaded("function on_beat(ctx, beat) ctx.note(72, 90, 0.5, 2) end");

    assert_eq!(run_block(&mut driver, 1.0, true).len(), 1);
    let events = run_block(&mut driver, 1.75, false);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0].kind,
        HostEventKind::NoteOff {
            channel: 2,
            pitch: 72,
            ..
        }
    ));
}

#[test]
fn stop_request_silences_everything() {
    let (mut editor, mut driver) =
        loaded("function on_beat(ctx, beat) ctx.note(60, 100, 8) end");
    run_block(&mut driver, 1.0, true);
    assert_eq!(driver.scheduled_note_offs(), 1);

    editor.request_stop();
    let events = run_block(&mut driver, 1.5, true);

    assert_eq!(events.len(), 16);
    for (channel, event) in events.iter().enumerate() {
        assert!(is_all_notes_off(event, channel as u8));
    }
    assert_eq!(driver.scheduled_note_offs(), 0);
    assert!(!driver.has_script());
    assert_eq!(driver.current_source(), "");
    assert_eq!(editor.drain_logs(), vec!["Script stopped."]);

    assert!(run_block(&mut driver, 2.0, true).is_empty());
}

#[test]
fn beat_hook_fires_once_per_integer_beat() {
    let (mut editor, mut driver) =
        loaded("function on_beat(ctx, beat) ctx.log('beat ' .. beat) end");

    for step in 1..=32 {
        run_block(&mut driver, step as f64 / 8.0, true);
    }
    assert_eq!(
        editor.drain_logs(),
        vec!["beat 1", "beat 2", "beat 3", "beat 4"]
    );

    for step in 33..=64 {
        run_block(&mut driver, step as f64 / 8.0, false);
    }
    assert!(editor.drain_logs().is_empty());
}

#[test]
fn beat_hook_sees_transport_fields() {
    let (mut editor, mut driver) = loaded(
        "function on_beat(ctx, beat) ctx.log(string.format('%d %d %g', beat, ctx.bar, ctx.tempo)) end",
    );

    run_block(&mut driver, 9.25, true);

    assert_eq!(editor.drain_logs(), vec!["9 2 120"]);
}

#[test]
fn runaway_script_is_interrupted() {
    let config = EngineConfig {
        runtime: RuntimeConfig {
            step_budget: 200_000,
            ..Default::default()
        },
        ..Default::default()
    };
    let (mut editor, mut driver) =
        loaded_with(config, "function process(ctx) while true do end end");

    run_block(&mut driver, 0.25, true);

    let logs = editor.drain_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("process error: "));
    assert!(logs[0].contains("maximum instruction count"));
    assert!(driver.has_script());
}

#[test]
fn runaway_script_cannot_escape_the_budget() {
    let sources = [
        "function process(ctx) coroutine.wrap(function() while true do end end)() end",
        "function process(ctx) while true do pcall(function() while true do end end) end end",
        "function process(ctx) while true do xpcall(function() while true do end end, tostring) end end",
        "function process(ctx)\n  while true do\n    coroutine.resume(coroutine.create(function() while true do end end))\n  end\nend",
    ];

    for source in sources {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let config = EngineConfig {
                runtime: RuntimeConfig {
                    step_budget: 200_000,
                    ..Default::default()
                },
                ..Default::default()
            };
            let (mut editor, mut driver) = loaded_with(config, source);
            run_block(&mut driver, 0.25, true);
            let _ = tx.send((editor.drain_logs(), driver.has_script()));
        });

        let (logs, still_loaded) = rx
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("block never returned for {source:?}"));
        assert_eq!(logs.len(), 1, "{source:?}");
        assert!(logs[0].starts_with("process error: "), "{source:?}");
        assert!(logs[0].contains("maximum instruction count"), "{source:?}");
        assert!(still_loaded);
    }
}

#[test]
fn hook_errors_are_logged_and_do_not_unload() {
    let (mut editor, mut driver) = loaded(
        "function on_beat(ctx, beat) error('bad beat') end\nfunction process(ctx) ctx.cc(7, 100) end",
    );

    let events = run_block(&mut driver, 1.0, true);

    let logs = editor.drain_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("on_beat error: "));
    assert!(logs[0].contains("bad beat"));
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].kind,
        HostEventKind::ControlChange {
            channel: 0,
            controller: 7,
            value: 100
        }
    );
}

#[test]
fn current_source_round_trips() {
    let source = "-- sequencer\nfunction process(ctx)\n  local x = 'ü'\nend\n";
    let (_editor, driver) = loaded(source);
    assert_eq!(driver.current_source(), source);
}

#[test]
fn second_block_crosses_into_beat_one() {
    let (mut editor, mut driver) = create_engine(EngineConfig::default());
    editor.submit_script("function on_beat(ctx, beat) ctx.log('beat ' .. beat) end");
    driver.activate();
    editor.drain_logs();

    run_block(&mut driver, 0.9, true);
    let first = editor.drain_logs();
    assert!(!first.contains(&"beat 1".to_string()));

    run_block(&mut driver, 1.2, true);
    assert_eq!(editor.drain_logs(), vec!["beat 1"]);
    assert_eq!(driver.transport().last_beat_int, 1);
}

#[test]
fn compile_error_keeps_previous_script() {
    let previous = "function process(ctx) ctx.log('still here') end";
    let (mut editor, mut driver) = loaded(previous);

    editor.submit_script("function process(ctx");
    let events = run_block(&mut driver, 0.0, false);

    assert!(events.is_empty());
    let logs = editor.drain_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("Script error: "));
    assert_eq!(driver.current_source(), previous);
    assert!(driver.has_script());

    run_block(&mut driver, 0.5, true);
    assert_eq!(editor.drain_logs(), vec!["still here"]);
}

#[test]
fn swap_replaces_the_running_script() {
    let (mut editor, mut driver) = loaded("function process(ctx) ctx.log('old') end");

    editor.submit_script("function process(ctx) ctx.log('new') end");
    let events = run_block(&mut driver, 0.5, true);

    assert_eq!(events.len(), 16);
    assert_eq!(
        editor.drain_logs(),
        vec!["Script loaded successfully.", "new"]
    );
}

#[test]
fn deactivate_keeps_source_for_next_activation() {
    let source = "function process(ctx) ctx.log('tick') end";
    let (mut editor, mut driver) = loaded(source);

    driver.deactivate();
    assert!(!driver.has_script());
    assert_eq!(run_block(&mut driver, 0.5, true).len(), 16);
    assert!(editor.drain_logs().is_empty());

    driver.activate();
    assert!(driver.has_script());
    run_block(&mut driver, 0.75, true);
    assert_eq!(
        editor.drain_logs(),
        vec!["Script loaded successfully.", "tick"]
    );
}

#[test]
fn saved_state_restores_the_script() {
    let source = "function on_beat(ctx, beat) ctx.note_on(64, 80) end";
    let (_editor, driver) = loaded(source);
    let blob = driver.save_state().unwrap();

    let (_other_editor, mut restored) = create_engine(EngineConfig::default());
    restored.restore_state(&blob).unwrap();
    assert_eq!(restored.current_source(), source);
    assert!(!restored.has_script());

    restored.activate();
    assert!(restored.has_script());
    let events = run_block(&mut restored, 1.0, true);
    assert!(matches!(
        events.last().map(|e| e.kind),
        Some(HostEventKind::NoteOn { pitch: 64, .. })
    ));
}

#[test]
fn full_schedule_drops_whole_notes() {
    let config = EngineConfig {
        max_scheduled_notes: 2,
        ..Default::default()
    };
    let (mut editor, mut driver) = loaded_with(
        config,
        "function on_beat(ctx, beat) for p = 60, 63 do ctx.note(p, 100, 4) end end",
    );

    let events = run_block(&mut driver, 1.0, true);

    assert_eq!(events.len(), 2);
    assert_eq!(driver.scheduled_note_offs(), 2);
    let logs = editor.drain_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("2 notes"));
}
