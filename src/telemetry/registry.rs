//! Devices the caller wants updates for.

use std::collections::HashSet;

use dashmap::DashSet;

use super::types::request::Request;

/// Set of device identifiers the caller is subscribed to.
///
/// The set survives disconnects: it describes what the caller wants, not what the server
/// currently knows, and is replayed in full every time a connection opens.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    devices: DashSet<String>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a device. Returns `false` if it was already tracked.
    pub fn add(&self, device_id: &str) -> bool {
        if self.devices.contains(device_id) {
            return false;
        }
        self.devices.insert(device_id.to_owned())
    }

    /// Stop tracking a device. Returns `false` if it was not tracked.
    pub fn remove(&self, device_id: &str) -> bool {
        self.devices.remove(device_id).is_some()
    }

    #[must_use]
    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains(device_id)
    }

    /// Copy of the tracked devices.
    #[must_use]
    pub fn snapshot(&self) -> HashSet<String> {
        self.devices.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Hand one subscribe request per tracked device to `sender`, in no particular order.
    ///
    /// Returns the number of requests issued.
    pub fn replay<F: FnMut(Request)>(&self, mut sender: F) -> usize {
        let devices = self.snapshot();
        let count = devices.len();

        #[cfg(feature = "tracing")]
        tracing::debug!(count, "Replaying device subscriptions");

        for device_id in devices {
            sender(Request::subscribe(device_id));
        }

        count
    }
}
