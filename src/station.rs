// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The station table: peer records keyed by MAC address, guarded by the
//! station-table lock. Lookups are scoped to the BSS of the interface the
//! caller names, so an AP and its VLAN sub-interfaces see one peer set.

use {
    crate::{
        device::DeviceOps,
        error::Error,
        iface::{is_valid_unicast, IfaceId, IfaceType, MacAddr},
        ApMlme, Radio,
    },
    log::{debug, warn},
    std::collections::HashMap,
};

/// Upper bound on table occupancy, limited by the association ID space.
pub const MAX_STATIONS: usize = 2007;

bitflags::bitflags! {
    pub struct StationFlags: u32 {
        const AUTHENTICATED  = 1 << 0;
        const ASSOCIATED     = 1 << 1;
        const AUTHORIZED     = 1 << 2;
        const SHORT_PREAMBLE = 1 << 3;
        const WME            = 1 << 4;
        const MFP            = 1 << 5;
        const TDLS_PEER      = 1 << 6;
        const FOUR_ADDR      = 1 << 7;
    }
}

/// Caller-supplied station parameters. Flag updates are masked: only bits in
/// `flags_mask` change, to the values given in `flags_set`.
#[derive(Debug, Clone)]
pub struct StationParams {
    pub flags_mask: StationFlags,
    pub flags_set: StationFlags,
    pub listen_interval: Option<u16>,
    pub capability_info: Option<u16>,
    pub supported_rates: Option<Vec<u8>>,
    pub ht_cap: Option<Vec<u8>>,
    pub vht_cap: Option<Vec<u8>>,
    pub he_cap: Option<Vec<u8>>,
    pub eht_cap: Option<Vec<u8>>,
    pub airtime_weight: Option<u16>,
    /// Requested owner reassignment to an AP or AP-VLAN interface.
    pub vlan: Option<IfaceId>,
}

impl Default for StationParams {
    fn default() -> Self {
        Self {
            flags_mask: StationFlags::empty(),
            flags_set: StationFlags::empty(),
            listen_interval: None,
            capability_info: None,
            supported_rates: None,
            ht_cap: None,
            vht_cap: None,
            he_cap: None,
            eht_cap: None,
            airtime_weight: None,
            vlan: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Station {
    pub addr: MacAddr,
    /// Owning interface, reassignable between an AP and its VLANs.
    pub owner: IfaceId,
    pub flags: StationFlags,
    pub listen_interval: u16,
    pub capability_info: u16,
    pub supported_rates: Vec<u8>,
    pub ht_cap: Option<Vec<u8>>,
    pub vht_cap: Option<Vec<u8>>,
    pub he_cap: Option<Vec<u8>>,
    pub eht_cap: Option<Vec<u8>>,
    pub airtime_weight: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl Station {
    pub fn new(owner: IfaceId, addr: MacAddr) -> Self {
        Self {
            addr,
            owner,
            flags: StationFlags::empty(),
            listen_interval: 0,
            capability_info: 0,
            supported_rates: Vec::new(),
            ht_cap: None,
            vht_cap: None,
            he_cap: None,
            eht_cap: None,
            airtime_weight: 0,
            rx_packets: 0,
            tx_packets: 0,
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }
}

/// Point-in-time view of a station, produced under the table lock. Owns all
/// of its data; it never aliases the live record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationInfo {
    pub addr: MacAddr,
    pub owner: IfaceId,
    pub flags: StationFlags,
    pub listen_interval: u16,
    pub capability_info: u16,
    pub supported_rates: Vec<u8>,
    pub ht_cap: Option<Vec<u8>>,
    pub vht_cap: Option<Vec<u8>>,
    pub he_cap: Option<Vec<u8>>,
    pub eht_cap: Option<Vec<u8>>,
    pub airtime_weight: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl StationInfo {
    fn snapshot(sta: &Station) -> Self {
        Self {
            addr: sta.addr,
            owner: sta.owner,
            flags: sta.flags,
            listen_interval: sta.listen_interval,
            capability_info: sta.capability_info,
            supported_rates: sta.supported_rates.clone(),
            ht_cap: sta.ht_cap.clone(),
            vht_cap: sta.vht_cap.clone(),
            he_cap: sta.he_cap.clone(),
            eht_cap: sta.eht_cap.clone(),
            airtime_weight: sta.airtime_weight,
            rx_packets: sta.rx_packets,
            tx_packets: sta.tx_packets,
            rx_bytes: sta.rx_bytes,
            tx_bytes: sta.tx_bytes,
        }
    }
}

/// What a station currently is, derived from its owning interface's type and
/// its own flags. Parameter-change legality is judged per classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleClassification {
    MeshUser,
    MeshKernel,
    Ibss,
    TdlsSetup,
    TdlsActive,
    ApClientAssoc,
    ApClientUnassoc,
}

pub fn classify_role(
    iftype: IfaceType,
    mesh_user_mpm: bool,
    flags: StationFlags,
) -> Result<RoleClassification, Error> {
    use RoleClassification::*;
    match iftype {
        IfaceType::Mesh => Ok(if mesh_user_mpm { MeshUser } else { MeshKernel }),
        IfaceType::Adhoc => Ok(Ibss),
        IfaceType::Client if flags.contains(StationFlags::TDLS_PEER) => {
            Ok(if flags.contains(StationFlags::AUTHORIZED) { TdlsActive } else { TdlsSetup })
        }
        // On a client interface the non-TDLS record is the serving AP and is
        // treated like an AP-side client for legality purposes.
        IfaceType::Ap | IfaceType::ApVlan | IfaceType::Client => {
            Ok(if flags.contains(StationFlags::ASSOCIATED) { ApClientAssoc } else { ApClientUnassoc })
        }
        IfaceType::Monitor => Err(Error::NotSupported),
    }
}

/// Parameter validation and application, delegated so platform rules can be
/// swapped out. `DefaultPolicy` implements the stock rules.
pub trait StationPolicy {
    fn validate_change(
        &self,
        role: RoleClassification,
        params: &StationParams,
    ) -> Result<(), Error>;
    fn apply(&self, sta: &mut Station, params: &StationParams) -> Result<(), Error>;
}

pub struct DefaultPolicy;

impl StationPolicy for DefaultPolicy {
    fn validate_change(
        &self,
        role: RoleClassification,
        params: &StationParams,
    ) -> Result<(), Error> {
        use RoleClassification::*;
        match role {
            MeshUser => Ok(()),
            MeshKernel => {
                // Kernel-managed peering owns these flags.
                if params.flags_mask.intersects(
                    StationFlags::AUTHENTICATED
                        | StationFlags::ASSOCIATED
                        | StationFlags::AUTHORIZED,
                ) {
                    Err(Error::NotSupported)
                } else {
                    Ok(())
                }
            }
            Ibss => {
                if !(params.flags_mask - StationFlags::AUTHORIZED).is_empty()
                    || params.supported_rates.is_some()
                    || params.vlan.is_some()
                {
                    Err(Error::InvalidArgument(
                        "only authorization may change for an IBSS peer",
                    ))
                } else {
                    Ok(())
                }
            }
            TdlsSetup => {
                if params.vlan.is_some() {
                    Err(Error::InvalidArgument("TDLS peers cannot be moved to a VLAN"))
                } else {
                    Ok(())
                }
            }
            TdlsActive => {
                if params.vlan.is_some() {
                    Err(Error::InvalidArgument("TDLS peers cannot be moved to a VLAN"))
                } else if params.capability_info.is_some()
                    || params.supported_rates.is_some()
                    || params.ht_cap.is_some()
                    || params.vht_cap.is_some()
                    || params.he_cap.is_some()
                    || params.eht_cap.is_some()
                {
                    Err(Error::InvalidArgument(
                        "capabilities are fixed once a TDLS link is up",
                    ))
                } else {
                    Ok(())
                }
            }
            ApClientUnassoc => {
                let becomes_assoc = params.flags_mask.contains(StationFlags::ASSOCIATED)
                    && params.flags_set.contains(StationFlags::ASSOCIATED);
                let becomes_auth = params.flags_mask.contains(StationFlags::AUTHORIZED)
                    && params.flags_set.contains(StationFlags::AUTHORIZED);
                if becomes_auth && !becomes_assoc {
                    Err(Error::InvalidArgument("cannot authorize an unassociated station"))
                } else {
                    Ok(())
                }
            }
            ApClientAssoc => Ok(()),
        }
    }

    fn apply(&self, sta: &mut Station, params: &StationParams) -> Result<(), Error> {
        if let Some(rates) = &params.supported_rates {
            if rates.is_empty() {
                return Err(Error::InvalidArgument("supported rate set must not be empty"));
            }
        }
        sta.flags = (sta.flags - params.flags_mask) | (params.flags_set & params.flags_mask);
        if let Some(v) = params.listen_interval {
            sta.listen_interval = v;
        }
        if let Some(v) = params.capability_info {
            sta.capability_info = v;
        }
        if let Some(v) = &params.supported_rates {
            sta.supported_rates = v.clone();
        }
        if let Some(v) = &params.ht_cap {
            sta.ht_cap = Some(v.clone());
        }
        if let Some(v) = &params.vht_cap {
            sta.vht_cap = Some(v.clone());
        }
        if let Some(v) = &params.he_cap {
            sta.he_cap = Some(v.clone());
        }
        if let Some(v) = &params.eht_cap {
            sta.eht_cap = Some(v.clone());
        }
        if let Some(v) = params.airtime_weight {
            sta.airtime_weight = v;
        }
        Ok(())
    }
}

/// The peer table for one radio.
pub struct StationTable {
    stations: HashMap<MacAddr, Station>,
}

impl StationTable {
    pub fn new() -> Self {
        Self { stations: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn insert(&mut self, sta: Station) -> Result<(), Error> {
        if self.stations.contains_key(&sta.addr) {
            return Err(Error::InvalidArgument("duplicate station address"));
        }
        self.stations.insert(sta.addr, sta);
        Ok(())
    }

    pub fn get(&self, scope: &[IfaceId], addr: &MacAddr) -> Option<&Station> {
        self.stations.get(addr).filter(|s| scope.contains(&s.owner))
    }

    pub fn get_mut(&mut self, scope: &[IfaceId], addr: &MacAddr) -> Option<&mut Station> {
        self.stations.get_mut(addr).filter(|s| scope.contains(&s.owner))
    }

    pub fn remove(&mut self, scope: &[IfaceId], addr: &MacAddr) -> Option<Station> {
        if self.get(scope, addr).is_some() {
            self.stations.remove(addr)
        } else {
            None
        }
    }

    /// Removes every station owned by one of `owners`, returning how many
    /// records were destroyed. Destroying a record releases its per-station
    /// state, security material included.
    pub fn flush(&mut self, owners: &[IfaceId]) -> usize {
        let before = self.stations.len();
        self.stations.retain(|_, s| !owners.contains(&s.owner));
        before - self.stations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }
}

struct RebindUndo {
    old_owner: IfaceId,
    new_owner: IfaceId,
    bound_4addr: bool,
    authorized: bool,
    old_vlan_had_binding: bool,
}

impl<D: DeviceOps> ApMlme<D> {
    /// Adds a station record. Validation happens before allocation; a failed
    /// parameter apply destroys the not-yet-visible record.
    pub fn add_station(
        &mut self,
        id: IfaceId,
        addr: MacAddr,
        params: StationParams,
    ) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let Radio { ifaces, .. } = &mut *radio;

        let target = match params.vlan {
            Some(vlan) => {
                let t = ifaces.get(vlan)?;
                if !matches!(t.iftype, IfaceType::Ap | IfaceType::ApVlan) {
                    return Err(Error::InvalidArgument(
                        "station VLAN target must be an AP or AP-VLAN interface",
                    ));
                }
                vlan
            }
            None => id,
        };
        let iface = ifaces.get(target)?;
        if addr == iface.addr {
            return Err(Error::InvalidArgument(
                "station address equals the interface address",
            ));
        }
        if !is_valid_unicast(&addr) {
            return Err(Error::InvalidArgument(
                "station address must be a valid unicast address",
            ));
        }
        let tdls = params.flags_set.contains(StationFlags::TDLS_PEER);
        if tdls {
            if iface.iftype != IfaceType::Client {
                return Err(Error::NotSupported);
            }
            if !iface.client_associated {
                return Err(Error::InvalidArgument(
                    "TDLS peer requires an associated client interface",
                ));
            }
        }

        let mut stations = self.stations.lock();
        if stations.len() >= MAX_STATIONS {
            return Err(Error::OutOfMemory);
        }
        let mut sta = Station::new(target, addr);
        if tdls {
            sta.flags.insert(StationFlags::TDLS_PEER);
        }
        self.policy.apply(&mut sta, &params)?;
        if sta.flags.contains(StationFlags::ASSOCIATED) && !tdls {
            // Rate control comes up before the record becomes visible.
            self.device.init_rate_control(addr);
        }
        stations.insert(sta)?;
        debug!("added station {:02x?} on iface {:?}", addr, target);
        Ok(())
    }

    /// Removes one station by address, or flushes every station owned by the
    /// interface when no address is given. Flushing an empty table succeeds.
    pub fn remove_station(&mut self, id: IfaceId, addr: Option<MacAddr>) -> Result<(), Error> {
        let radio = self.radio.lock();
        let mut stations = self.stations.lock();
        match addr {
            Some(addr) => {
                let scope = radio.ifaces.bss_members(id)?;
                let sta = stations.remove(&scope, &addr).ok_or(Error::NotFound)?;
                debug!("removed station {:02x?} from iface {:?}", sta.addr, sta.owner);
                Ok(())
            }
            None => {
                radio.ifaces.get(id)?;
                let flushed = stations.flush(&[id]);
                debug!("flushed {} stations from iface {:?}", flushed, id);
                Ok(())
            }
        }
    }

    /// Applies a parameter change to an existing station, including an
    /// optional VLAN reassignment. Runs under the table lock for the whole
    /// operation; the VLAN rebind and the parameter apply share a single
    /// rollback boundary.
    pub fn change_station(
        &mut self,
        id: IfaceId,
        addr: MacAddr,
        params: StationParams,
    ) -> Result<(), Error> {
        // Lock order: radio/context lock, then the station table.
        let mut radio = self.radio.lock();
        let Radio { ifaces, .. } = &mut *radio;
        let scope = ifaces.bss_members(id)?;
        let mut stations = self.stations.lock();
        let sta = stations.get_mut(&scope, &addr).ok_or(Error::NotFound)?;

        let owner_id = sta.owner;
        let (owner_type, mesh_user_mpm) = {
            let owner = ifaces.get(owner_id)?;
            (owner.iftype, owner.mesh_user_mpm)
        };
        let role = classify_role(owner_type, mesh_user_mpm, sta.flags)?;
        self.policy.validate_change(role, &params)?;

        let mut undo = None;
        if let Some(target) = params.vlan {
            if target != owner_id {
                let target_type = ifaces.get(target)?.iftype;
                if !matches!(target_type, IfaceType::Ap | IfaceType::ApVlan) {
                    return Err(Error::InvalidArgument(
                        "station VLAN target must be an AP or AP-VLAN interface",
                    ));
                }
                if !scope.contains(&target) {
                    return Err(Error::InvalidArgument(
                        "station VLAN target belongs to a different BSS",
                    ));
                }
                let four_addr = sta.flags.contains(StationFlags::FOUR_ADDR);
                let bind_4addr = four_addr && target_type == IfaceType::ApVlan;
                if bind_4addr && ifaces.get(target)?.assigned_4addr_sta.is_some() {
                    return Err(Error::Busy);
                }
                let authorized = sta.flags.contains(StationFlags::AUTHORIZED);

                let mut old_vlan_had_binding = false;
                {
                    let old = ifaces.get_mut(owner_id)?;
                    if old.assigned_4addr_sta == Some(addr) {
                        old.assigned_4addr_sta = None;
                        old_vlan_had_binding = true;
                    }
                    if authorized {
                        old.num_mcast_sta = old.num_mcast_sta.saturating_sub(1);
                    }
                }
                sta.owner = target;
                {
                    let new = ifaces.get_mut(target)?;
                    if bind_4addr {
                        new.assigned_4addr_sta = Some(addr);
                    }
                    if authorized {
                        new.num_mcast_sta += 1;
                    }
                }
                if bind_4addr {
                    self.device.set_4addr_mode(addr, true);
                }
                if authorized {
                    self.device.notify_address_binding(target, addr);
                }
                undo = Some(RebindUndo {
                    old_owner: owner_id,
                    new_owner: target,
                    bound_4addr: bind_4addr,
                    authorized,
                    old_vlan_had_binding,
                });
            }
        }

        if let Err(e) = self.policy.apply(sta, &params) {
            if let Some(u) = undo {
                sta.owner = u.old_owner;
                if let Ok(new) = ifaces.get_mut(u.new_owner) {
                    if u.bound_4addr && new.assigned_4addr_sta == Some(addr) {
                        new.assigned_4addr_sta = None;
                    }
                    if u.authorized {
                        new.num_mcast_sta = new.num_mcast_sta.saturating_sub(1);
                    }
                }
                if let Ok(old) = ifaces.get_mut(u.old_owner) {
                    if u.old_vlan_had_binding {
                        old.assigned_4addr_sta = Some(addr);
                    }
                    if u.authorized {
                        old.num_mcast_sta += 1;
                    }
                }
                if u.bound_4addr {
                    self.device.set_4addr_mode(addr, false);
                }
                warn!(
                    "station {:02x?} VLAN rebind rolled back after parameter apply failed",
                    addr
                );
            }
            return Err(e);
        }

        let want_ps_recalc = owner_type == IfaceType::Client
            && params.flags_mask.contains(StationFlags::AUTHORIZED);
        drop(stations);
        drop(radio);
        if want_ps_recalc {
            // Outside the table lock; the power-save subsystem takes its own
            // locks and must not nest inside ours.
            self.device.recalc_ps();
            self.device.recalc_ps_for_iface(owner_id);
        }
        Ok(())
    }

    /// Returns a point-in-time snapshot of a station's state.
    pub fn get_station(&self, id: IfaceId, addr: MacAddr) -> Result<StationInfo, Error> {
        let radio = self.radio.lock();
        let scope = radio.ifaces.bss_members(id)?;
        let stations = self.stations.lock();
        let sta = stations.get(&scope, &addr).ok_or(Error::NotFound)?;
        Ok(StationInfo::snapshot(sta))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{iface::BCAST_ADDR, test_utils::fake_mlme},
        assert_matches::assert_matches,
        test_case::test_case,
    };

    const STA_ADDR: MacAddr = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    const STA_ADDR_2: MacAddr = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01];

    fn assoc_params() -> StationParams {
        StationParams {
            flags_mask: StationFlags::ASSOCIATED | StationFlags::WME,
            flags_set: StationFlags::ASSOCIATED | StationFlags::WME,
            listen_interval: Some(10),
            capability_info: Some(0x0431),
            supported_rates: Some(vec![0x02, 0x04, 0x0b, 0x16]),
            ..Default::default()
        }
    }

    #[test_case(IfaceType::Ap, false, StationFlags::ASSOCIATED, Ok(RoleClassification::ApClientAssoc))]
    #[test_case(IfaceType::Ap, false, StationFlags::empty(), Ok(RoleClassification::ApClientUnassoc))]
    #[test_case(IfaceType::ApVlan, false, StationFlags::ASSOCIATED, Ok(RoleClassification::ApClientAssoc))]
    #[test_case(IfaceType::Mesh, true, StationFlags::empty(), Ok(RoleClassification::MeshUser))]
    #[test_case(IfaceType::Mesh, false, StationFlags::empty(), Ok(RoleClassification::MeshKernel))]
    #[test_case(IfaceType::Adhoc, false, StationFlags::empty(), Ok(RoleClassification::Ibss))]
    #[test_case(IfaceType::Client, false, StationFlags::TDLS_PEER, Ok(RoleClassification::TdlsSetup))]
    #[test_case(IfaceType::Client, false, StationFlags::TDLS_PEER | StationFlags::AUTHORIZED, Ok(RoleClassification::TdlsActive))]
    #[test_case(IfaceType::Monitor, false, StationFlags::empty(), Err(Error::NotSupported))]
    fn role_classification(
        iftype: IfaceType,
        mesh_user_mpm: bool,
        flags: StationFlags,
        expected: Result<RoleClassification, Error>,
    ) {
        assert_eq!(classify_role(iftype, mesh_user_mpm, flags), expected);
    }

    #[test]
    fn validate_rejects_peering_flags_for_kernel_mesh() {
        let params = StationParams {
            flags_mask: StationFlags::AUTHORIZED,
            flags_set: StationFlags::AUTHORIZED,
            ..Default::default()
        };
        assert_matches!(
            DefaultPolicy.validate_change(RoleClassification::MeshKernel, &params),
            Err(Error::NotSupported)
        );
    }

    #[test]
    fn validate_rejects_capability_update_on_active_tdls() {
        let params =
            StationParams { supported_rates: Some(vec![0x02]), ..Default::default() };
        assert_matches!(
            DefaultPolicy.validate_change(RoleClassification::TdlsActive, &params),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn validate_rejects_authorizing_unassociated_client() {
        let params = StationParams {
            flags_mask: StationFlags::AUTHORIZED,
            flags_set: StationFlags::AUTHORIZED,
            ..Default::default()
        };
        assert_matches!(
            DefaultPolicy.validate_change(RoleClassification::ApClientUnassoc, &params),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn apply_honors_flag_mask() {
        let mut sta = Station::new(IfaceId(0), STA_ADDR);
        sta.flags = StationFlags::ASSOCIATED | StationFlags::WME;
        let params = StationParams {
            flags_mask: StationFlags::ASSOCIATED | StationFlags::AUTHORIZED,
            flags_set: StationFlags::AUTHORIZED,
            ..Default::default()
        };
        DefaultPolicy.apply(&mut sta, &params).expect("apply");
        // ASSOCIATED was masked off, AUTHORIZED set, WME untouched.
        assert_eq!(sta.flags, StationFlags::AUTHORIZED | StationFlags::WME);
    }

    #[test]
    fn apply_rejects_empty_rate_set() {
        let mut sta = Station::new(IfaceId(0), STA_ADDR);
        let params = StationParams { supported_rates: Some(vec![]), ..Default::default() };
        assert_matches!(
            DefaultPolicy.apply(&mut sta, &params),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn table_lookup_is_bss_scoped() {
        let mut table = StationTable::new();
        let mut sta = Station::new(IfaceId(7), STA_ADDR);
        sta.flags = StationFlags::ASSOCIATED;
        table.insert(sta).expect("insert");

        assert!(table.get(&[IfaceId(7)], &STA_ADDR).is_some());
        assert!(table.get(&[IfaceId(8)], &STA_ADDR).is_none());
        assert!(table.remove(&[IfaceId(8)], &STA_ADDR).is_none());
        assert!(table.remove(&[IfaceId(7)], &STA_ADDR).is_some());
    }

    #[test]
    fn add_rejects_own_interface_address() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        let err = mlme.add_station(ap, [2, 0, 0, 0, 0, 1], assoc_params());
        assert_matches!(err, Err(Error::InvalidArgument(_)));
    }

    #[test]
    fn add_rejects_non_unicast_address() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        assert_matches!(
            mlme.add_station(ap, BCAST_ADDR, assoc_params()),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            mlme.add_station(ap, [0x01, 0, 0x5e, 0, 0, 1], assoc_params()),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn add_rejects_tdls_peer_on_unassociated_client() {
        let (mut mlme, _env) = fake_mlme();
        let client = mlme.add_iface([2, 0, 0, 0, 0, 9], IfaceType::Client);
        let params = StationParams {
            flags_mask: StationFlags::TDLS_PEER,
            flags_set: StationFlags::TDLS_PEER,
            ..Default::default()
        };
        assert_matches!(
            mlme.add_station(client, STA_ADDR, params.clone()),
            Err(Error::InvalidArgument(_))
        );

        // Once the client associates the same request is accepted.
        mlme.set_client_association(client, true).expect("associate");
        mlme.add_station(client, STA_ADDR, params).expect("add TDLS peer");
    }

    #[test]
    fn add_rejects_duplicate_address() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        mlme.add_station(ap, STA_ADDR, assoc_params()).expect("first add");
        assert_matches!(
            mlme.add_station(ap, STA_ADDR, assoc_params()),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn add_initializes_rate_control_for_associated_station() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        mlme.add_station(ap, STA_ADDR, assoc_params()).expect("add");
        assert_eq!(mlme.device().rate_init, vec![STA_ADDR]);
    }

    #[test]
    fn add_then_get_round_trips_parameters() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        mlme.add_station(ap, STA_ADDR, assoc_params()).expect("add");

        let info = mlme.get_station(ap, STA_ADDR).expect("get");
        assert!(info.flags.contains(StationFlags::ASSOCIATED | StationFlags::WME));
        assert_eq!(info.listen_interval, 10);
        assert_eq!(info.capability_info, 0x0431);
        assert_eq!(info.supported_rates, vec![0x02, 0x04, 0x0b, 0x16]);
        assert_eq!(info.owner, ap);
    }

    #[test]
    fn get_unknown_station_is_not_found() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        assert_matches!(mlme.get_station(ap, STA_ADDR), Err(Error::NotFound));
    }

    #[test]
    fn remove_unknown_station_is_not_found() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        assert_matches!(mlme.remove_station(ap, Some(STA_ADDR)), Err(Error::NotFound));
    }

    #[test]
    fn remove_without_address_flushes_interface() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        for last in [1u8, 2, 3] {
            let mut addr = STA_ADDR;
            addr[5] = last;
            mlme.add_station(ap, addr, assoc_params()).expect("add");
        }

        mlme.remove_station(ap, None).expect("flush");
        for last in [1u8, 2, 3] {
            let mut addr = STA_ADDR;
            addr[5] = last;
            assert_matches!(mlme.get_station(ap, addr), Err(Error::NotFound));
        }
        // Flushing again is idempotent.
        mlme.remove_station(ap, None).expect("flush empty");
    }

    #[test]
    fn change_station_moves_owner_to_vlan() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        let vlan = mlme.add_vlan(ap, [2, 0, 0, 0, 0, 2]).expect("vlan");
        mlme.add_station(ap, STA_ADDR, assoc_params()).expect("add");

        let params = StationParams { vlan: Some(vlan), ..Default::default() };
        mlme.change_station(ap, STA_ADDR, params).expect("change");
        assert_eq!(mlme.get_station(ap, STA_ADDR).expect("get").owner, vlan);
    }

    #[test]
    fn authorized_station_vlan_move_adjusts_multicast_and_notifies_bridge() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        let vlan = mlme.add_vlan(ap, [2, 0, 0, 0, 0, 2]).expect("vlan");
        mlme.add_station(ap, STA_ADDR, assoc_params()).expect("add");
        let authorize = StationParams {
            flags_mask: StationFlags::AUTHORIZED,
            flags_set: StationFlags::AUTHORIZED,
            ..Default::default()
        };
        mlme.change_station(ap, STA_ADDR, authorize).expect("authorize");
        mlme.bump_mcast_members(ap, 1).expect("account");

        let params = StationParams { vlan: Some(vlan), ..Default::default() };
        mlme.change_station(ap, STA_ADDR, params).expect("move");

        assert_eq!(mlme.mcast_members(ap).expect("ap count"), 0);
        assert_eq!(mlme.mcast_members(vlan).expect("vlan count"), 1);
        assert_eq!(mlme.device().bindings, vec![(vlan, STA_ADDR)]);
    }

    #[test]
    fn four_addr_move_to_occupied_vlan_is_busy() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        let vlan = mlme.add_vlan(ap, [2, 0, 0, 0, 0, 2]).expect("vlan");

        let four_addr = StationParams {
            flags_mask: StationFlags::FOUR_ADDR | StationFlags::ASSOCIATED,
            flags_set: StationFlags::FOUR_ADDR | StationFlags::ASSOCIATED,
            supported_rates: Some(vec![0x02]),
            ..Default::default()
        };
        mlme.add_station(ap, STA_ADDR, four_addr.clone()).expect("add A");
        mlme.add_station(ap, STA_ADDR_2, four_addr).expect("add B");

        // A takes the VLAN's 4-address slot.
        let to_vlan = StationParams { vlan: Some(vlan), ..Default::default() };
        mlme.change_station(ap, STA_ADDR, to_vlan.clone()).expect("bind A");
        assert_eq!(mlme.device().four_addr, vec![(STA_ADDR, true)]);

        // B cannot displace it, and keeps its original owner.
        assert_matches!(mlme.change_station(ap, STA_ADDR_2, to_vlan), Err(Error::Busy));
        assert_eq!(mlme.get_station(ap, STA_ADDR_2).expect("get B").owner, ap);
        assert_eq!(mlme.get_station(ap, STA_ADDR).expect("get A").owner, vlan);
    }

    #[test]
    fn failed_apply_rolls_back_vlan_rebind() {
        let (mut mlme, _env) = fake_mlme();
        let ap = mlme.add_iface([2, 0, 0, 0, 0, 1], IfaceType::Ap);
        let vlan = mlme.add_vlan(ap, [2, 0, 0, 0, 0, 2]).expect("vlan");
        mlme.add_station(ap, STA_ADDR, assoc_params()).expect("add");

        // The empty rate set fails the apply step after the rebind happened.
        let params = StationParams {
            vlan: Some(vlan),
            supported_rates: Some(vec![]),
            ..Default::default()
        };
        assert_matches!(
            mlme.change_station(ap, STA_ADDR, params),
            Err(Error::InvalidArgument(_))
        );
        assert_eq!(mlme.get_station(ap, STA_ADDR).expect("get").owner, ap);
    }

    #[test]
    fn authorization_change_on_client_recalcs_power_save_outside_lock() {
        let (mut mlme, _env) = fake_mlme();
        let client = mlme.add_iface([2, 0, 0, 0, 0, 9], IfaceType::Client);
        mlme.add_station(client, STA_ADDR, assoc_params()).expect("add");

        let params = StationParams {
            flags_mask: StationFlags::AUTHORIZED,
            flags_set: StationFlags::AUTHORIZED,
            ..Default::default()
        };
        mlme.change_station(client, STA_ADDR, params).expect("authorize");
        assert_eq!(mlme.device().ps_recalcs, 1);
        assert_eq!(mlme.device().ps_iface_recalcs, vec![client]);
    }

    #[test]
    fn change_station_on_mesh_kernel_peer_is_not_supported() {
        let (mut mlme, _env) = fake_mlme();
        let mesh = mlme.add_iface([2, 0, 0, 0, 0, 5], IfaceType::Mesh);
        mlme.add_station(mesh, STA_ADDR, StationParams::default()).expect("add");

        let params = StationParams {
            flags_mask: StationFlags::AUTHORIZED,
            flags_set: StationFlags::AUTHORIZED,
            ..Default::default()
        };
        assert_matches!(
            mlme.change_station(mesh, STA_ADDR, params),
            Err(Error::NotSupported)
        );
    }
}
