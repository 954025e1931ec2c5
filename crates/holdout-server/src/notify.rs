use holdout_core::ids::PlayerId;

/// Fire-and-forget sink for player-facing messages.
///
/// The engine hands over a message key and formatted detail; rendering and
/// localization belong to whatever front end is plugged in. Nothing in this
/// crate consumes a return value from a notification.
pub trait Notifier: Send + Sync {
    fn notify(&self, player: PlayerId, key: &str, detail: &str);
}

/// Default sink: structured log lines only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, player: PlayerId, key: &str, detail: &str) {
        tracing::debug!(%player, key, detail, "notify");
    }
}

/// Test sink that records every notification in order.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(PlayerId, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, player: PlayerId, key: &str, _detail: &str) {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((player, key.to_string()));
    }
}

impl RecordingNotifier {
    /// Keys sent to one player, in send order.
    pub fn keys_for(&self, player: PlayerId) -> Vec<String> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, k)| k.clone())
            .collect()
    }
}
