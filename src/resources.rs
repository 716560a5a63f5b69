// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference-counted, deferred-reclaim storage for the payload blobs an
//! enabled AP publishes: the beacon template, the probe-response template,
//! the FILS discovery frame and the unsolicited broadcast probe response.
//!
//! A snapshot is immutable once published. Replacing it swaps the slot's
//! pointer and moves the previous snapshot onto a retire list; the retired
//! snapshot is dropped only once the quiescence check confirms no reader
//! still holds a reference to it. Readers take a transient `Arc` and never
//! observe a torn value.

use {
    crate::error::Error,
    parking_lot::RwLock,
    std::{any::Any, sync::Arc},
};

/// Beacon template. `head` covers everything up to and including the TIM
/// element, `tail` everything after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
}

impl Beacon {
    /// Assembles a beacon template from caller-supplied fragments. A beacon
    /// without a head cannot be scheduled for transmission.
    pub fn assemble(head: Vec<u8>, tail: Vec<u8>) -> Result<Self, Error> {
        if head.is_empty() {
            return Err(Error::InvalidArgument("beacon head must not be empty"));
        }
        Ok(Self { head, tail })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResp(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilsDiscovery {
    pub min_interval: u32,
    pub max_interval: u32,
    pub tmpl: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsolBcastProbeResp {
    pub interval: u32,
    pub tmpl: Vec<u8>,
}

/// A single published-snapshot slot. Writers replace the whole `Arc`; readers
/// clone it under a short read lock and finish against that clone.
pub struct Slot<T> {
    cur: RwLock<Option<Arc<T>>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self { cur: RwLock::new(None) }
    }
}

impl<T> Slot<T> {
    /// Publishes a new snapshot, returning the previous one (if any) so the
    /// caller can retire it.
    pub fn publish(&self, value: T) -> Option<Arc<T>> {
        self.cur.write().replace(Arc::new(value))
    }

    /// Takes a transient reference to the current snapshot.
    pub fn reader(&self) -> Option<Arc<T>> {
        self.cur.read().clone()
    }

    /// Detaches the current snapshot. Readers already holding a reference
    /// keep it; new readers observe an empty slot.
    pub fn take(&self) -> Option<Arc<T>> {
        self.cur.write().take()
    }

    pub fn is_published(&self) -> bool {
        self.cur.read().is_some()
    }
}

/// Snapshots detached from their slot but possibly still referenced by
/// in-flight readers. `reclaim` drops the ones the quiescence check clears.
#[derive(Default)]
pub struct RetireList {
    retired: Vec<Arc<dyn Any + Send + Sync>>,
}

impl RetireList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retire<T: Send + Sync + 'static>(&mut self, snapshot: Arc<T>) {
        self.retired.push(snapshot as Arc<dyn Any + Send + Sync>);
    }

    /// Drops every retired snapshot with no remaining reader reference and
    /// returns how many were reclaimed. Snapshots still held by a reader stay
    /// on the list for a later pass.
    pub fn reclaim(&mut self) -> usize {
        let before = self.retired.len();
        self.retired.retain(|s| Arc::strong_count(s) > 1);
        before - self.retired.len()
    }

    pub fn pending(&self) -> usize {
        self.retired.len()
    }
}

/// The four resource slots owned by one AP interface.
#[derive(Default)]
pub struct ResourceSet {
    pub beacon: Slot<Beacon>,
    pub probe_resp: Slot<ProbeResp>,
    pub fils_discovery: Slot<FilsDiscovery>,
    pub unsol_bcast_probe_resp: Slot<UnsolBcastProbeResp>,
}

impl ResourceSet {
    pub fn publish_beacon(&self, beacon: Beacon, retire: &mut RetireList) {
        if let Some(old) = self.beacon.publish(beacon) {
            retire.retire(old);
        }
    }

    pub fn publish_probe_resp(&self, probe_resp: ProbeResp, retire: &mut RetireList) {
        if let Some(old) = self.probe_resp.publish(probe_resp) {
            retire.retire(old);
        }
    }

    pub fn publish_fils_discovery(&self, fils: FilsDiscovery, retire: &mut RetireList) {
        if let Some(old) = self.fils_discovery.publish(fils) {
            retire.retire(old);
        }
    }

    pub fn publish_unsol_bcast_probe_resp(
        &self,
        resp: UnsolBcastProbeResp,
        retire: &mut RetireList,
    ) {
        if let Some(old) = self.unsol_bcast_probe_resp.publish(resp) {
            retire.retire(old);
        }
    }

    /// Detaches all four snapshots at once. Detachment is visible to new
    /// readers before any reclamation runs; readers in flight complete
    /// against the old values.
    pub fn detach_all(&self, retire: &mut RetireList) {
        if let Some(b) = self.beacon.take() {
            retire.retire(b);
        }
        if let Some(p) = self.probe_resp.take() {
            retire.retire(p);
        }
        if let Some(f) = self.fils_discovery.take() {
            retire.retire(f);
        }
        if let Some(u) = self.unsol_bcast_probe_resp.take() {
            retire.retire(u);
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[test]
    fn beacon_requires_head() {
        assert_matches!(
            Beacon::assemble(vec![], vec![1, 2, 3]),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(Beacon::assemble(vec![0x80, 0x00], vec![]), Ok(_));
    }

    #[test]
    fn replaced_snapshot_survives_until_reader_finishes() {
        let set = ResourceSet::default();
        let mut retire = RetireList::new();

        set.publish_beacon(Beacon { head: vec![1], tail: vec![] }, &mut retire);
        let reader = set.beacon.reader().expect("published beacon");

        // Replace while a reader holds the old snapshot.
        set.publish_beacon(Beacon { head: vec![2], tail: vec![] }, &mut retire);
        assert_eq!(retire.pending(), 1);
        assert_eq!(retire.reclaim(), 0);
        assert_eq!(reader.head, vec![1]);

        // New readers observe the replacement immediately.
        assert_eq!(set.beacon.reader().expect("beacon").head, vec![2]);

        // Once the reader finishes the old snapshot becomes reclaimable.
        drop(reader);
        assert_eq!(retire.reclaim(), 1);
        assert_eq!(retire.pending(), 0);
    }

    #[test]
    fn detach_all_empties_every_slot() {
        let set = ResourceSet::default();
        let mut retire = RetireList::new();

        set.publish_beacon(Beacon { head: vec![1], tail: vec![] }, &mut retire);
        set.publish_probe_resp(ProbeResp(vec![2]), &mut retire);
        set.publish_fils_discovery(
            FilsDiscovery { min_interval: 20, max_interval: 100, tmpl: vec![3] },
            &mut retire,
        );
        set.publish_unsol_bcast_probe_resp(
            UnsolBcastProbeResp { interval: 50, tmpl: vec![4] },
            &mut retire,
        );

        set.detach_all(&mut retire);
        assert!(!set.beacon.is_published());
        assert!(!set.probe_resp.is_published());
        assert!(!set.fils_discovery.is_published());
        assert!(!set.unsol_bcast_probe_resp.is_published());

        // Nothing holds a reference, so everything reclaims in one pass.
        assert_eq!(retire.reclaim(), 4);
    }
}
