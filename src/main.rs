use beatlua::{EngineConfig, EventSink, FreeRunningClock, HostEvent, ScriptEditor, create_engine};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use midir::{MidiOutput, MidiOutputConnection};
use notify::{Event, EventKind, RecursiveMode, Result as NotifyResult, Watcher};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MIDI_QUEUE_CAPACITY: usize = 4096;

/// Runs a Lua MIDI script against a free-running clock and sends the
/// result to a MIDI output port. The script is reloaded whenever the file
/// changes.
#[derive(Parser, Debug)]
#[command(name = "beatlua", version)]
struct Args {
    /// Lua script defining `on_beat(ctx, beat)` and/or `process(ctx)`
    script: PathBuf,

    /// RON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = 120.0)]
    tempo: f64,

    /// Substring of the MIDI output port name (defaults to the first port)
    #[arg(short, long)]
    midi_port: Option<String>,

    /// Print the available MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,
}

/// Forwards wire events to the MIDI thread as raw messages.
struct MidiForwarder {
    queue: HeapProd<[u8; 3]>,
}

impl EventSink for MidiForwarder {
    fn push(&mut self, event: HostEvent) {
        if let Some(bytes) = event.to_midi_bytes() {
            let _ = self.queue.try_push(bytes);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_ports {
        let midi_out = MidiOutput::new("beatlua")?;
        for port in midi_out.ports() {
            println!("{}", midi_out.port_name(&port)?);
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let (mut editor, mut driver) = create_engine(config);
    submit_file(&mut editor, &args.script);

    let (midi_tx, midi_rx) = HeapRb::<[u8; 3]>::new(MIDI_QUEUE_CAPACITY).split();
    let connection = connect_midi(args.midi_port.as_deref())?;
    let running = Arc::new(AtomicBool::new(true));
    let midi_thread = {
        let running = Arc::clone(&running);
        std::thread::spawn(move || midi_output_thread(midi_rx, connection, running))
    };

    let host = cpal::default_host();
    let device = host.default_output_device().ok_or("No output device")?;
    let supported = device.default_output_config()?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err("Unsupported sample format".into());
    }
    let stream_config: cpal::StreamConfig = supported.into();
    let channels = usize::from(stream_config.channels).max(1);
    let sample_rate = f64::from(stream_config.sample_rate.0);
    info!(channels, sample_rate, tempo = args.tempo, "audio output ready");

    let mut clock = FreeRunningClock::new(args.tempo, sample_rate);
    clock.start();
    driver.activate();

    let mut sink = MidiForwarder { queue: midi_tx };
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let transport = clock.next_block(data.len() / channels);
            driver.process_block(Some(&transport), &mut sink, &mut [data]);
        },
        |err| error!(%err, "audio stream error"),
        None,
    )?;
    stream.play()?;

    let watch = watch_script(&args.script)?;
    info!(script = %args.script.display(), "watching script; press Ctrl+C to stop");

    loop {
        match watch.changes.recv_timeout(Duration::from_millis(50)) {
            Ok(()) => {
                while watch.changes.try_recv().is_ok() {}
                submit_file(&mut editor, &args.script);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for line in editor.drain_logs() {
            info!(target: "script", "{line}");
        }
    }

    running.store(false, Ordering::Relaxed);
    drop(stream);
    let _ = midi_thread.join();
    Ok(())
}

fn submit_file(editor: &mut ScriptEditor, path: &Path) {
    match std::fs::read_to_string(path) {
        Ok(source) => editor.submit_script(source),
        Err(e) => warn!(path = %path.display(), error = %e, "could not read script"),
    }
}

/// File change notifications. The watcher lives as long as the receiver.
struct ScriptWatch {
    changes: Receiver<()>,
    _watcher: notify::RecommendedWatcher,
}

fn watch_script(path: &Path) -> NotifyResult<ScriptWatch> {
    let (tx, rx) = crossbeam::channel::unbounded();
    let mut watcher = notify::recommended_watcher(move |res: NotifyResult<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                let _ = tx.send(());
            }
        }
        Err(e) => warn!(error = %e, "watch error"),
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(ScriptWatch {
        changes: rx,
        _watcher: watcher,
    })
}

fn connect_midi(
    name: Option<&str>,
) -> Result<Option<MidiOutputConnection>, Box<dyn std::error::Error>> {
    let midi_out = MidiOutput::new("beatlua")?;
    let ports = midi_out.ports();

    let port = match name {
        Some(name) => ports
            .into_iter()
            .find(|p| midi_out.port_name(p).is_ok_and(|n| n.contains(name)))
            .ok_or_else(|| format!("MIDI port '{name}' not found"))?,
        None => match ports.into_iter().next() {
            Some(port) => port,
            None => {
                warn!("no MIDI output ports, generated events are discarded");
                return Ok(None);
            }
        },
    };

    let port_name = midi_out.port_name(&port)?;
    let connection = midi_out.connect(&port, "beatlua-output")?;
    info!(port = %port_name, "connected MIDI output");
    Ok(Some(connection))
}

fn midi_output_thread(
    mut queue: HeapCons<[u8; 3]>,
    mut connection: Option<MidiOutputConnection>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        for message in queue.pop_iter() {
            if let Some(conn) = connection.as_mut() {
                if let Err(e) = conn.send(&message) {
                    warn!(error = %e, "MIDI send failed");
                }
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    if let Some(conn) = connection {
        conn.close();
    }
}
