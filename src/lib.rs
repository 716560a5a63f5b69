// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Lifecycle and concurrency control for a wireless access point and the
//! station table bound to it: starting and stopping an AP, replicating
//! control-plane state to VLAN sub-interfaces, and adding, changing,
//! removing and querying peer stations while the AP is live.
//!
//! The core is a library-level control surface. It owns no wire protocol;
//! the driver backend, channel-context allocator, parameter-validation
//! policy and timer scheduler are all external collaborators reached
//! through traits.
//!
//! Two locking domains exist. The radio lock guards the interface registry,
//! channel-context refcounts and the snapshot retire list; the station-table
//! lock guards all station records. When both are needed the radio lock is
//! taken first. Power-save recomputation runs with neither lock held.

pub mod ap;
pub mod channel;
pub mod device;
pub mod error;
pub mod iface;
pub mod resources;
pub mod station;
pub mod timer;
pub mod vlan;

pub use {
    ap::{ApConfig, BeaconUpdate, PowerSaveMode, TimedEvent},
    channel::{ChannelAllocator, ContextId, SharingMode},
    device::{BssChange, CacOutcome, DeviceOps, LinkStatus},
    error::Error,
    iface::{Band, ChannelDef, ChannelWidth, IfaceId, IfaceType, MacAddr},
    resources::{Beacon, FilsDiscovery, ProbeResp, ResourceSet, UnsolBcastProbeResp},
    station::{
        DefaultPolicy, RoleClassification, StationFlags, StationInfo, StationParams,
        StationPolicy,
    },
    timer::{EventId, Scheduler, Timer},
};

use {
    crate::{iface::IfaceRegistry, station::StationTable},
    channel::ChanCtxManager,
    parking_lot::Mutex,
    resources::RetireList,
    std::sync::Arc,
};

/// State guarded by the radio lock.
pub(crate) struct Radio {
    pub(crate) ifaces: IfaceRegistry,
    pub(crate) chanctx: ChanCtxManager,
    pub(crate) retire: RetireList,
    /// Radio-wide count of buffered broadcast frames awaiting DTIM delivery.
    pub(crate) total_bc_buffered: usize,
}

/// The MLME core for one radio.
pub struct ApMlme<D: DeviceOps> {
    pub(crate) device: D,
    pub(crate) allocator: Box<dyn ChannelAllocator + Send>,
    pub(crate) policy: Box<dyn StationPolicy + Send>,
    // Lock order: `radio` before `stations`, never the reverse.
    pub(crate) radio: Mutex<Radio>,
    pub(crate) stations: Mutex<StationTable>,
    pub(crate) timer: Timer<TimedEvent>,
}

impl<D: DeviceOps> ApMlme<D> {
    pub fn new(
        device: D,
        allocator: Box<dyn ChannelAllocator + Send>,
        policy: Box<dyn StationPolicy + Send>,
        scheduler: Box<dyn Scheduler + Send>,
    ) -> Self {
        Self {
            device,
            allocator,
            policy,
            radio: Mutex::new(Radio {
                ifaces: IfaceRegistry::new(),
                chanctx: ChanCtxManager::new(),
                retire: RetireList::new(),
                total_bc_buffered: 0,
            }),
            stations: Mutex::new(StationTable::new()),
            timer: Timer::new(scheduler),
        }
    }

    /// Registers a new interface on this radio.
    pub fn add_iface(&mut self, addr: MacAddr, iftype: IfaceType) -> IfaceId {
        self.radio.lock().ifaces.add(addr, iftype)
    }

    /// Registers a VLAN sub-interface under an AP interface. If the parent is
    /// already enabled the VLAN inherits its channel context, control-port
    /// policy, encryption headroom and carrier state.
    pub fn add_vlan(&mut self, parent: IfaceId, addr: MacAddr) -> Result<IfaceId, Error> {
        let mut radio = self.radio.lock();
        let Radio { ifaces, chanctx, .. } = &mut *radio;

        let (parent_ctx, control_port, headroom, carrier) = {
            let p = ifaces.get(parent)?;
            if p.iftype != IfaceType::Ap {
                return Err(Error::InvalidArgument("VLAN parent must be an AP interface"));
            }
            (p.chanctx, p.control_port, p.crypto_headroom, p.carrier)
        };

        let id = ifaces.add(addr, IfaceType::ApVlan);
        {
            let vlan = ifaces.get_mut(id)?;
            vlan.parent = Some(parent);
            vlan.control_port = control_port;
            vlan.crypto_headroom = headroom;
            vlan.carrier = carrier;
            if let Some(ctx) = parent_ctx {
                chanctx.bind(ctx, vlan);
            }
        }
        ifaces.get_mut(parent)?.vlans.push(id);
        if carrier {
            self.device.set_link_status(id, LinkStatus::UP);
        }
        Ok(id)
    }

    /// Records whether a client interface currently has a serving AP. TDLS
    /// peers can only be added while associated.
    pub fn set_client_association(&mut self, id: IfaceId, associated: bool) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let iface = radio.ifaces.get_mut(id)?;
        if iface.iftype != IfaceType::Client {
            return Err(Error::InvalidArgument("association state applies to client interfaces"));
        }
        iface.client_associated = associated;
        Ok(())
    }

    /// Selects user-space or kernel mesh peering management for a mesh
    /// interface, which decides how its peers may be mutated.
    pub fn set_mesh_user_mpm(&mut self, id: IfaceId, user_managed: bool) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let iface = radio.ifaces.get_mut(id)?;
        if iface.iftype != IfaceType::Mesh {
            return Err(Error::InvalidArgument("peering management applies to mesh interfaces"));
        }
        iface.mesh_user_mpm = user_managed;
        Ok(())
    }

    /// Hands out the interface's resource set so data-path readers can take
    /// snapshot references without going through the radio lock again.
    pub fn resources(&self, id: IfaceId) -> Result<Arc<ResourceSet>, Error> {
        Ok(self.radio.lock().ifaces.get(id)?.resources.clone())
    }

    /// Runs one quiescence pass over retired snapshots, dropping every one
    /// with no remaining reader. Returns how many were reclaimed.
    pub fn reclaim_resources(&mut self) -> usize {
        self.radio.lock().retire.reclaim()
    }

    pub fn pending_retired(&self) -> usize {
        self.radio.lock().retire.pending()
    }

    /// Adjusts an interface's multicast-member count, as reported by the
    /// data path. The count never goes below zero.
    pub fn bump_mcast_members(&mut self, id: IfaceId, delta: i32) -> Result<u32, Error> {
        let mut radio = self.radio.lock();
        let iface = radio.ifaces.get_mut(id)?;
        let count = i64::from(iface.num_mcast_sta) + i64::from(delta);
        iface.num_mcast_sta = count.max(0) as u32;
        Ok(iface.num_mcast_sta)
    }

    pub fn mcast_members(&self, id: IfaceId) -> Result<u32, Error> {
        Ok(self.radio.lock().ifaces.get(id)?.num_mcast_sta)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}
