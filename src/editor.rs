use crate::channels::{LogConsumer, ScriptProducer, ScriptSwapMessage};
use ringbuf::traits::{Consumer, Producer};

/// The editor-thread half of the engine.
///
/// Swaps that do not fit into the queue are held back and retried on the
/// next call; a newer submission replaces a held-back one, so the block
/// driver always ends up with the latest source.
pub struct ScriptEditor {
    swaps: ScriptProducer,
    logs: LogConsumer,
    backlog: Option<ScriptSwapMessage>,
}

impl ScriptEditor {
    pub fn new(swaps: ScriptProducer, logs: LogConsumer) -> Self {
        Self {
            swaps,
            logs,
            backlog: None,
        }
    }

    pub fn submit_script(&mut self, source: impl Into<String>) {
        self.send(ScriptSwapMessage::new(source));
    }

    /// Stops the running script. Equivalent to submitting an empty source.
    pub fn request_stop(&mut self) {
        self.send(ScriptSwapMessage::stop());
    }

    /// Every log line produced since the last call, oldest first.
    pub fn drain_logs(&mut self) -> Vec<String> {
        self.flush();
        self.logs.pop_iter().collect()
    }

    /// Whether a swap is still waiting for room in the queue.
    pub fn has_pending(&self) -> bool {
        self.backlog.is_some()
    }

    fn send(&mut self, message: ScriptSwapMessage) {
        self.flush();
        if self.backlog.is_some() {
            self.backlog = Some(message);
            return;
        }
        if let Err(message) = self.swaps.try_push(message) {
            tracing::debug!("script queue full, holding swap back");
            self.backlog = Some(message);
        }
    }

    fn flush(&mut self) {
        if let Some(message) = self.backlog.take() {
            if let Err(message) = self.swaps.try_push(message) {
                self.backlog = Some(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{log_channel, script_channel};

    #[test]
    fn submissions_reach_the_queue_in_order() {
        let (tx, mut rx) = script_channel(4);
        let (_log_tx, log_rx) = log_channel(4);
        let mut editor = ScriptEditor::new(tx, log_rx);

        editor.submit_script("a = 1");
        editor.request_stop();

        assert_eq!(rx.try_pop(), Some(ScriptSwapMessage::new("a = 1")));
        assert!(rx.try_pop().unwrap().is_stop());
    }

    #[test]
    fn full_queue_keeps_only_the_newest_backlog() {
        let (tx, mut rx) = script_channel(1);
        let (_log_tx, log_rx) = log_channel(4);
        let mut editor = ScriptEditor::new(tx, log_rx);

        editor.submit_script("first");
        editor.submit_script("second");
        editor.submit_script("third");
        assert!(editor.has_pending());

        assert_eq!(rx.try_pop(), Some(ScriptSwapMessage::new("first")));
        editor.drain_logs();
        assert!(!editor.has_pending());
        assert_eq!(rx.try_pop(), Some(ScriptSwapMessage::new("third")));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn drain_logs_returns_everything_in_order() {
        let (tx, _rx) = script_channel(1);
        let (mut log_tx, log_rx) = log_channel(8);
        let mut editor = ScriptEditor::new(tx, log_rx);

        log_tx.try_push("one".to_string()).unwrap();
        log_tx.try_push("two".to_string()).unwrap();

        assert_eq!(editor.drain_logs(), vec!["one", "two"]);
        assert!(editor.drain_logs().is_empty());
    }
}
