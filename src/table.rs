/// Bounded AP → station association table.
///
/// One entry per access point holding the distinct stations seen
/// transmitting to it. Both dimensions are fixed at compile time, so the
/// memory footprint does not depend on how noisy the RF environment is.
///
/// Only APs marked active for the current cycle accept observations;
/// frames addressed to anything else are dropped silently.
use heapless::Vec;

/// Outcome of a single [`AssociationTable::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// New station recorded under the AP
    Added,
    /// Station already recorded (under this AP or an earlier one)
    Duplicate,
    /// AP's station set is full; observation dropped
    Saturated,
    /// AP is not part of the current cycle
    UnknownAp,
}

#[derive(Debug)]
struct Entry<const STATIONS: usize> {
    ap: [u8; 6],
    active: bool,
    stations: Vec<[u8; 6], STATIONS>,
}

impl<const STATIONS: usize> Entry<STATIONS> {
    fn new(ap: [u8; 6]) -> Self {
        Self {
            ap,
            active: true,
            stations: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct AssociationTable<const APS: usize, const STATIONS: usize> {
    entries: Vec<Entry<STATIONS>, APS>,
}

impl<const APS: usize, const STATIONS: usize> AssociationTable<APS, STATIONS> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Mark the APs scanned this cycle as the only ones accepting observations.
    ///
    /// Without `retain`, every station set starts empty. With `retain`, sets of
    /// re-scanned APs carry over; entries for APs missing from this scan are
    /// kept until their slot is needed, oldest first.
    pub fn begin_cycle<I>(&mut self, aps: I, retain: bool)
    where
        I: IntoIterator<Item = [u8; 6]>,
    {
        for entry in self.entries.iter_mut() {
            entry.active = false;
        }

        for ap in aps {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.ap == ap) {
                entry.active = true;
                continue;
            }
            if self.entries.is_full() {
                match self.entries.iter().position(|e| !e.active) {
                    Some(idx) => {
                        self.entries.remove(idx);
                    }
                    None => {
                        log::debug!("association table full, not tracking AP");
                        continue;
                    }
                }
            }
            let _ = self.entries.push(Entry::new(ap));
        }

        if !retain {
            self.entries.retain(|e| e.active);
            for entry in self.entries.iter_mut() {
                entry.stations.clear();
            }
        }
    }

    /// Record that `station` was seen transmitting to `ap`.
    ///
    /// Idempotent per station; within a cycle the first AP a station is seen
    /// under keeps it. Retained sets of APs outside this cycle do not count.
    pub fn observe(&mut self, ap: &[u8; 6], station: &[u8; 6]) -> Observed {
        let Some(idx) = self.entries.iter().position(|e| e.active && e.ap == *ap) else {
            return Observed::UnknownAp;
        };
        if self
            .entries
            .iter()
            .filter(|e| e.active)
            .any(|e| e.stations.contains(station))
        {
            return Observed::Duplicate;
        }
        match self.entries[idx].stations.push(*station) {
            Ok(()) => Observed::Added,
            Err(_) => Observed::Saturated,
        }
    }

    /// Clear one AP's station set.
    pub fn reset(&mut self, ap: &[u8; 6]) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.ap == *ap) {
            entry.stations.clear();
        }
    }

    /// Drop every entry, retained or not.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of distinct stations recorded for `ap` (0 when unknown).
    pub fn count(&self, ap: &[u8; 6]) -> usize {
        self.stations(ap).len()
    }

    pub fn stations(&self, ap: &[u8; 6]) -> &[[u8; 6]] {
        self.entries
            .iter()
            .find(|e| e.ap == *ap)
            .map(|e| e.stations.as_slice())
            .unwrap_or(&[])
    }

    /// Sum of station counts over the APs active this cycle.
    pub fn total(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.active)
            .map(|e| e.stations.len())
            .sum()
    }

    pub fn is_active(&self, ap: &[u8; 6]) -> bool {
        self.entries.iter().any(|e| e.active && e.ap == *ap)
    }
}

impl<const APS: usize, const STATIONS: usize> Default for AssociationTable<APS, STATIONS> {
    fn default() -> Self {
        Self::new()
    }
}
