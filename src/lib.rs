pub mod channels;
pub mod config;
pub mod editor;
pub mod engine;
pub mod events;
pub mod scripting;
pub mod state;
pub mod timing;

pub use config::{ConfigError, EngineConfig, RuntimeConfig};
pub use editor::ScriptEditor;
pub use engine::BlockDriver;
pub use events::{EventSink, HostEvent, HostEventKind, MidiEvent};
pub use scripting::ScriptError;
pub use state::StateError;
pub use timing::{FreeRunningClock, HostTransport, TransportSnapshot};

use scripting::PluginContext;
use timing::NoteOffSchedule;

/// Allocates the three queues and returns both halves of the engine: the
/// editor handle for the UI/console thread and the block driver for the
/// audio thread. The driver starts inactive.
pub fn create_engine(config: EngineConfig) -> (ScriptEditor, BlockDriver) {
    let (swap_tx, swap_rx) = channels::script_channel(config.script_capacity);
    let (event_tx, event_rx) = channels::event_channel(config.event_capacity);
    let (log_tx, log_rx) = channels::log_channel(config.log_capacity);

    let context = PluginContext::new(
        event_tx,
        log_tx,
        NoteOffSchedule::with_capacity(config.max_scheduled_notes),
    );

    let editor = ScriptEditor::new(swap_tx, log_rx);
    let driver = BlockDriver::new(config, swap_rx, event_rx, context);
    (editor, driver)
}
