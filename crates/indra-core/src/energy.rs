// ── Live session energy ──
//
// The vendor only reports a lifetime energy counter. Energy for the current
// plug-in is that counter minus a baseline taken when the vehicle was first
// seen. Supplier stop/start cycles briefly report `notCharging`, so the
// baseline is dropped only after consecutive `notCharging` polls.
//
// Baselines outlive the process: the poller writes them to the account
// record whenever one changes and seeds the tracker from it on startup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::CableState;

/// Consecutive `notCharging` polls that confirm an unplug.
const UNPLUG_CONFIRM_POLLS: u32 = 2;

/// One device's baseline, as persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyBaseline {
    /// Lifetime counter at plug-in, kWh.
    #[serde(default)]
    pub total_kwh: Option<f64>,
    #[serde(default)]
    pub not_charging_polls: u32,
}

/// Per-device baseline bookkeeping, owned by the poller.
#[derive(Debug, Default)]
pub struct EnergyTracker {
    devices: BTreeMap<String, EnergyBaseline>,
    changed: bool,
}

impl EnergyTracker {
    /// Resume from baselines saved by an earlier run.
    pub fn from_saved(devices: BTreeMap<String, EnergyBaseline>) -> Self {
        Self {
            devices,
            changed: false,
        }
    }

    /// Feed one poll's cable state and lifetime counter; returns the energy
    /// delivered since plug-in, if known.
    pub fn observe(
        &mut self,
        device_uid: &str,
        cable: CableState,
        total_kwh: Option<f64>,
    ) -> Option<f64> {
        let entry = self.devices.entry(device_uid.to_owned()).or_default();
        let before = *entry;

        if cable == CableState::NotCharging {
            entry.not_charging_polls = entry.not_charging_polls.saturating_add(1);
            if entry.not_charging_polls >= UNPLUG_CONFIRM_POLLS && entry.total_kwh.is_some() {
                debug!(device_uid, "unplug confirmed, baseline cleared");
                entry.total_kwh = None;
            }
        } else {
            entry.not_charging_polls = 0;
        }

        if cable.has_vehicle() && entry.total_kwh.is_none() {
            if let Some(total) = total_kwh {
                debug!(device_uid, baseline_kwh = total, "vehicle plugged in");
                entry.total_kwh = Some(total);
            }
        }

        let delivered = match (entry.total_kwh, total_kwh) {
            (Some(base), Some(total)) => Some((total - base).max(0.0)),
            _ => None,
        };
        if *entry != before {
            self.changed = true;
        }
        delivered
    }

    pub fn forget(&mut self, device_uid: &str) {
        if self.devices.remove(device_uid).is_some() {
            self.changed = true;
        }
    }

    /// The baselines to persist, if any changed since the last call.
    pub fn take_changes(&mut self) -> Option<BTreeMap<String, EnergyBaseline>> {
        if !std::mem::take(&mut self.changed) {
            return None;
        }
        Some(self.devices.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn baseline_set_on_plug_in() {
        let mut tracker = EnergyTracker::default();
        assert_eq!(tracker.observe("d", CableState::Unknown, Some(100.0)), None);
        assert_eq!(
            tracker.observe("d", CableState::Connected, Some(100.0)),
            Some(0.0)
        );
        assert_eq!(
            tracker.observe("d", CableState::Charging, Some(104.5)),
            Some(4.5)
        );
    }

    #[test]
    fn single_not_charging_poll_keeps_baseline() {
        let mut tracker = EnergyTracker::default();
        tracker.observe("d", CableState::Charging, Some(10.0));
        assert_eq!(
            tracker.observe("d", CableState::NotCharging, Some(12.0)),
            Some(2.0)
        );
        assert_eq!(
            tracker.observe("d", CableState::Charging, Some(13.0)),
            Some(3.0)
        );
    }

    #[test]
    fn two_not_charging_polls_clear_baseline() {
        let mut tracker = EnergyTracker::default();
        tracker.observe("d", CableState::Charging, Some(10.0));
        tracker.observe("d", CableState::NotCharging, Some(12.0));
        assert_eq!(tracker.observe("d", CableState::NotCharging, Some(12.0)), None);

        // Next plug-in starts from the new counter value.
        assert_eq!(
            tracker.observe("d", CableState::Connected, Some(12.0)),
            Some(0.0)
        );
    }

    #[test]
    fn missing_counter_is_unknown() {
        let mut tracker = EnergyTracker::default();
        assert_eq!(tracker.observe("d", CableState::Charging, None), None);
        tracker.observe("d", CableState::Charging, Some(5.0));
        assert_eq!(tracker.observe("d", CableState::Charging, None), None);
        assert_eq!(
            tracker.observe("d", CableState::Charging, Some(6.0)),
            Some(1.0)
        );
    }

    #[test]
    fn devices_are_independent() {
        let mut tracker = EnergyTracker::default();
        tracker.observe("a", CableState::Charging, Some(1.0));
        assert_eq!(tracker.observe("b", CableState::Charging, Some(50.0)), Some(0.0));
        tracker.forget("a");
        assert_eq!(tracker.observe("a", CableState::Charging, Some(3.0)), Some(0.0));
    }

    #[test]
    fn saved_baseline_survives_restart() {
        let mut tracker = EnergyTracker::default();
        tracker.observe("d", CableState::Charging, Some(10.0));
        let saved = tracker.take_changes().unwrap();

        let mut resumed = EnergyTracker::from_saved(saved);
        assert_eq!(
            resumed.observe("d", CableState::Charging, Some(16.5)),
            Some(6.5)
        );
    }

    #[test]
    fn saved_unplug_count_carries_over() {
        let mut tracker = EnergyTracker::default();
        tracker.observe("d", CableState::Charging, Some(10.0));
        tracker.observe("d", CableState::NotCharging, Some(11.0));

        let mut resumed = EnergyTracker::from_saved(tracker.take_changes().unwrap());
        assert_eq!(resumed.observe("d", CableState::NotCharging, Some(11.0)), None);
    }

    #[test]
    fn changes_reported_only_when_baseline_moves() {
        let mut tracker = EnergyTracker::default();
        assert!(tracker.take_changes().is_none());

        tracker.observe("d", CableState::Charging, Some(10.0));
        assert!(tracker.take_changes().is_some());

        // Same plug-in, counter rising: nothing new to persist.
        tracker.observe("d", CableState::Charging, Some(11.0));
        tracker.observe("d", CableState::Charging, Some(12.0));
        assert!(tracker.take_changes().is_none());

        tracker.forget("d");
        assert!(tracker.take_changes().unwrap().is_empty());
        tracker.forget("d");
        assert!(tracker.take_changes().is_none());
    }
}
