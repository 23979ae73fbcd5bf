//! User-visible notices produced while a merge runs.

use std::sync::Mutex;

/// Notice severity, mirroring the alert levels of the surrounding UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

/// Sink for notices. Injected so the merge core never renders anything
/// itself.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Routes notices to the `log` facade.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Warning => log::warn!("{}", message),
            Severity::Danger => log::error!("{}", message),
            _ => log::info!("{}", message),
        }
    }
}

/// Collects notices in memory, for tests and for callers that render
/// notices themselves after the merge returns.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<(Severity, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all collected notices, oldest first.
    pub fn drain(&self) -> Vec<(Severity, String)> {
        std::mem::take(&mut *self.notices.lock().unwrap())
    }

    /// Message texts only, oldest first. Leaves the notices in place.
    pub fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.notices
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}
