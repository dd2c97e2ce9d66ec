mod clock;
mod scheduler;
mod transport;

pub use clock::FreeRunningClock;
pub use scheduler::{NoteOffSchedule, ScheduledNoteOff, SchedulerError};
pub use transport::{HostTransport, TransportSnapshot};
