use serde::{Deserialize, Serialize};

use super::SignalWatcher;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// Observes online/offline transitions. Since the watcher only reports
/// changes, every `Online` it delivers is an offline-to-online edge.
pub type ConnectivityWatcher = SignalWatcher<Connectivity>;
