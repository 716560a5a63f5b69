// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interface records and the registry that owns them. Stations refer to their
//! owning interface by `IfaceId` rather than by reference so ownership can be
//! reassigned (AP <-> VLAN) atomically under the station-table lock.

use {
    crate::{
        ap::BeaconUpdate,
        channel::ContextId,
        error::Error,
        resources::ResourceSet,
        timer::EventId,
    },
    std::{
        collections::{HashMap, VecDeque},
        sync::Arc,
    },
};

pub type MacAddr = [u8; 6];

pub const BCAST_ADDR: MacAddr = [0xff; 6];

/// A valid station address is unicast and not all-zero.
pub fn is_valid_unicast(addr: &MacAddr) -> bool {
    addr[0] & 0x01 == 0 && *addr != [0; 6]
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct IfaceId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfaceType {
    Ap,
    ApVlan,
    Client,
    Mesh,
    Adhoc,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    TwoGhz,
    FiveGhz,
    SixGhz,
    /// Sub-1GHz (S1G) operation.
    SubGhz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelWidth {
    Cbw20,
    Cbw40,
    Cbw80,
    Cbw80P80,
    Cbw160,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDef {
    pub channel: u8,
    pub band: Band,
    pub width: ChannelWidth,
}

/// Policy for the controlled port carrying pre-authentication traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPortPolicy {
    pub ethertype: u16,
    pub no_encrypt: bool,
    pub no_preauth: bool,
    pub over_mgmt_protocol: bool,
}

impl Default for ControlPortPolicy {
    fn default() -> Self {
        // 0x888e is the PAE (port access entity) ether-type.
        Self { ethertype: 0x888e, no_encrypt: false, no_preauth: false, over_mgmt_protocol: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeOperation {
    pub default_pe_duration: u8,
    pub twt_responder: bool,
    pub bss_color: u8,
}

/// P2P opportunistic power save attributes carried in beacons of a GO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct P2pPowerSave {
    pub ctwindow: u8,
    pub opp_ps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Wep40,
    Wep104,
    Tkip,
    Ccmp128,
    Ccmp256,
    Gcmp128,
    Gcmp256,
}

/// Channel-switch state for an AP that announced a switch and is waiting for
/// the switch count to elapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSwitch {
    pub count: u8,
    pub block_tx: bool,
}

/// An in-progress channel availability check. The timer cancels synchronously
/// on teardown, before the abort is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacState {
    pub chandef: ChannelDef,
    pub timer_id: EventId,
}

pub struct Iface {
    pub id: IfaceId,
    pub addr: MacAddr,
    pub iftype: IfaceType,

    // Operating parameters applied on start.
    pub ssid: Vec<u8>,
    pub hidden_ssid: bool,
    pub beacon_interval: u16,
    pub dtim_period: u8,
    pub dtim_count: u8,
    pub he_oper: Option<HeOperation>,
    pub p2p_ps: P2pPowerSave,
    pub beacon_rate: Option<u32>,
    pub beacon_rate_set: bool,
    pub s1g: bool,
    pub control_port: ControlPortPolicy,
    pub crypto_headroom: usize,
    pub ftm_responder: Option<Vec<u8>>,

    // BSS topology.
    pub vlans: Vec<IfaceId>,
    pub parent: Option<IfaceId>,

    // Live state.
    pub carrier: bool,
    pub chanctx: Option<ContextId>,
    pub csa: Option<ChannelSwitch>,
    pub cac: Option<CacState>,
    pub next_beacon: Option<BeaconUpdate>,
    pub bc_buffered: VecDeque<Vec<u8>>,
    pub num_mcast_sta: u32,
    pub assigned_4addr_sta: Option<MacAddr>,

    // Role-specific configuration.
    pub mesh_user_mpm: bool,
    pub client_associated: bool,

    /// Published resource snapshots. Shared so data-path readers can hold the
    /// set without going through the registry lock.
    pub resources: Arc<ResourceSet>,
}

impl Iface {
    pub fn new(id: IfaceId, addr: MacAddr, iftype: IfaceType) -> Self {
        Self {
            id,
            addr,
            iftype,
            ssid: Vec::new(),
            hidden_ssid: false,
            beacon_interval: 100,
            dtim_period: 2,
            dtim_count: 0,
            he_oper: None,
            p2p_ps: P2pPowerSave::default(),
            beacon_rate: None,
            beacon_rate_set: false,
            s1g: false,
            control_port: ControlPortPolicy::default(),
            crypto_headroom: 0,
            ftm_responder: None,
            vlans: Vec::new(),
            parent: None,
            carrier: false,
            chanctx: None,
            csa: None,
            cac: None,
            next_beacon: None,
            bc_buffered: VecDeque::new(),
            num_mcast_sta: 0,
            assigned_4addr_sta: None,
            mesh_user_mpm: false,
            client_associated: false,
            resources: Arc::new(ResourceSet::default()),
        }
    }

    /// An AP interface is enabled iff its beacon snapshot is published.
    pub fn enabled(&self) -> bool {
        self.resources.beacon.is_published()
    }
}

/// Maintains a record of all interfaces on this radio.
pub struct IfaceRegistry {
    ifaces: HashMap<IfaceId, Iface>,
    next_id: u16,
}

impl IfaceRegistry {
    pub fn new() -> Self {
        Self { ifaces: HashMap::new(), next_id: 0 }
    }

    pub fn add(&mut self, addr: MacAddr, iftype: IfaceType) -> IfaceId {
        let id = IfaceId(self.next_id);
        self.next_id += 1;
        self.ifaces.insert(id, Iface::new(id, addr, iftype));
        id
    }

    pub fn get(&self, id: IfaceId) -> Result<&Iface, Error> {
        self.ifaces.get(&id).ok_or(Error::NotFound)
    }

    pub fn get_mut(&mut self, id: IfaceId) -> Result<&mut Iface, Error> {
        self.ifaces.get_mut(&id).ok_or(Error::NotFound)
    }

    /// All interfaces belonging to the same BSS as `id`: the AP interface and
    /// its VLAN sub-interfaces. Non-AP roles form a BSS of their own.
    pub fn bss_members(&self, id: IfaceId) -> Result<Vec<IfaceId>, Error> {
        let iface = self.get(id)?;
        match iface.iftype {
            IfaceType::Ap => {
                let mut members = vec![id];
                members.extend(iface.vlans.iter().copied());
                Ok(members)
            }
            IfaceType::ApVlan => match iface.parent {
                Some(parent) => self.bss_members(parent),
                None => Ok(vec![id]),
            },
            _ => Ok(vec![id]),
        }
    }
}
