use crate::channels::{EventConsumer, ScriptConsumer};
use crate::config::EngineConfig;
use crate::events::{EventSink, HostEvent};
use crate::scripting::{ContextHandle, PluginContext, ScriptRuntime};
use crate::state::{self, StateError};
use crate::timing::{HostTransport, TransportSnapshot};
use ringbuf::traits::Consumer;

/// The audio-thread half of the engine. Call [`BlockDriver::process_block`]
/// once per audio block; it never waits on the editor thread.
pub struct BlockDriver {
    config: EngineConfig,
    swaps: ScriptConsumer,
    events: EventConsumer,
    context: ContextHandle,
    runtime: Option<ScriptRuntime>,
    transport: TransportSnapshot,
    source: String,
    active: bool,
}

impl BlockDriver {
    pub fn new(
        config: EngineConfig,
        swaps: ScriptConsumer,
        events: EventConsumer,
        context: PluginContext,
    ) -> Self {
        Self {
            config,
            swaps,
            events,
            context: ContextHandle::new(context),
            runtime: None,
            transport: TransportSnapshot::default(),
            source: String::new(),
            active: false,
        }
    }

    /// Builds the interpreter and loads the current source, if any.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        self.reload();
        tracing::debug!(has_script = self.has_script(), "block driver activated");
    }

    /// Silences everything and tears the interpreter down. The source is
    /// kept for the next activation.
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.context.with(|c| c.all_notes_off());
        self.shutdown_runtime();
        self.active = false;
        tracing::debug!("block driver deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_script(&self) -> bool {
        self.runtime.as_ref().is_some_and(ScriptRuntime::has_script)
    }

    /// Source of the script being run (or last attempted).
    pub fn current_source(&self) -> &str {
        &self.source
    }

    pub fn transport(&self) -> &TransportSnapshot {
        &self.transport
    }

    pub fn scheduled_note_offs(&self) -> usize {
        self.context.with(|c| c.note_offs().len()).unwrap_or(0)
    }

    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        state::encode_state(&self.source)
    }

    /// Restores a saved source. While active it replaces the running script
    /// the same way a swap does.
    pub fn restore_state(&mut self, blob: &[u8]) -> Result<(), StateError> {
        let source = state::decode_state(blob)?;
        if self.active {
            self.apply_swap(source);
        } else {
            self.source = source;
        }
        Ok(())
    }

    pub fn process_block(
        &mut self,
        host: Option<&HostTransport>,
        sink: &mut impl EventSink,
        outputs: &mut [&mut [f32]],
    ) {
        while let Some(message) = self.swaps.try_pop() {
            self.apply_swap(message.source);
        }

        if let Some(host) = host {
            self.transport.update(host);
        }
        let transport = self.transport;
        self.context.with(|c| c.set_transport(transport));

        if self.transport.playing {
            self.run_hooks();
        }

        self.transport.mark_beat();

        self.context.with(|c| c.release_due_note_offs());
        self.report_drops();

        while let Some(event) = self.events.try_pop() {
            sink.push(HostEvent::from_midi(event, self.transport.beat));
        }

        for output in outputs.iter_mut() {
            output.fill(0.0);
        }
    }

    fn run_hooks(&mut self) {
        let Some(runtime) = self.runtime.as_mut().filter(|rt| rt.has_script()) else {
            return;
        };

        if self.transport.is_beat_boundary() {
            if let Err(e) = runtime.call_on_beat(self.transport.current_beat_int()) {
                let line = format!("on_beat error: {e}");
                self.context.with(|c| c.log(line));
            }
        }

        if let Err(e) = runtime.call_process() {
            let line = format!("process error: {e}");
            self.context.with(|c| c.log(line));
        }
    }

    fn apply_swap(&mut self, source: String) {
        if !source.is_empty() {
            if let Some(runtime) = self.runtime.as_ref().filter(|rt| rt.has_script()) {
                if let Err(e) = runtime.check(&source) {
                    tracing::warn!(error = %e, "rejected script swap, keeping previous script");
                    self.log(format!("Script error: {e}"));
                    return;
                }
            }
        }

        self.source = source;
        self.context.with(|c| c.all_notes_off());

        if self.active {
            self.reload();
        } else {
            self.shutdown_runtime();
        }
    }

    /// Replaces interpreter and context with fresh ones and loads the
    /// current source into them.
    fn reload(&mut self) {
        self.shutdown_runtime();
        self.context = ContextHandle::new(self.context.detach());

        let mut runtime = match ScriptRuntime::init(self.context.clone(), &self.config.runtime) {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "failed to start script engine");
                self.log(format!("Failed to start script engine: {e}"));
                return;
            }
        };

        if self.source.is_empty() {
            self.runtime = Some(runtime);
            self.log("Script stopped.".to_string());
            return;
        }

        match runtime.load(&self.source) {
            Ok(()) => {
                tracing::info!(bytes = self.source.len(), "script loaded");
                self.log("Script loaded successfully.".to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "script failed to load");
                self.log(format!("Script error: {e}"));
            }
        }
        self.runtime = Some(runtime);
    }

    fn shutdown_runtime(&mut self) {
        if let Some(mut runtime) = self.runtime.take() {
            runtime.shutdown();
        }
    }

    fn report_drops(&mut self) {
        let Some(dropped) = self.context.with(|c| c.take_dropped()) else {
            return;
        };
        if dropped.events > 0 || dropped.notes > 0 {
            self.log(format!(
                "Dropped {} events and {} notes this block (queue or schedule full)",
                dropped.events, dropped.notes
            ));
        }
    }

    fn log(&self, line: String) {
        self.context.with(|c| c.log(line));
    }
}
