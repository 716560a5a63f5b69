// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! AP lifecycle: bring-up, teardown, beacon replacement and the channel
//! switch / channel availability check hooks. All mutation happens under the
//! radio lock; resource snapshots are swapped and retired so concurrent
//! readers finish against the values they started with.

use {
    crate::{
        channel::{ChannelAllocator, ChanCtxManager, SharingMode},
        device::{BssChange, CacOutcome, DeviceOps, LinkStatus},
        error::Error,
        iface::{
            Band, CacState, ChannelDef, ChannelSwitch, Cipher, ControlPortPolicy, HeOperation,
            IfaceId, IfaceRegistry, IfaceType, P2pPowerSave,
        },
        resources::{Beacon, FilsDiscovery, ProbeResp, UnsolBcastProbeResp},
        timer::EventId,
        vlan::{encryption_headroom, fanout_control_port},
        ApMlme, Radio,
    },
    log::{debug, info},
};

/// Power-save configuration requested at start. Only `Off` is accepted for
/// now; drivers in this stack do not beacon-schedule around an absent GO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSaveMode {
    Off,
    Enabled,
}

/// Everything the management layer supplies to bring an AP up.
#[derive(Debug, Clone)]
pub struct ApConfig {
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
    pub beacon_interval: u16,
    pub dtim_period: u8,
    pub ssid: Vec<u8>,
    pub hidden_ssid: bool,
    pub chandef: ChannelDef,
    pub power_save: PowerSaveMode,
    pub he_oper: Option<HeOperation>,
    pub p2p_ps: P2pPowerSave,
    pub beacon_rate: Option<u32>,
    pub control_port: ControlPortPolicy,
    pub ciphers: Vec<Cipher>,
    pub ftm_responder: Option<Vec<u8>>,
    pub probe_resp: Option<Vec<u8>>,
    pub fils_discovery: Option<FilsDiscovery>,
    pub unsol_bcast_probe_resp: Option<UnsolBcastProbeResp>,
}

/// A staged beacon replacement, applied immediately by `change_beacon` or
/// held as the post-switch beacon while a channel switch is counting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconUpdate {
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
    pub probe_resp: Option<Vec<u8>>,
    pub fils_discovery: Option<FilsDiscovery>,
    pub unsol_bcast_probe_resp: Option<UnsolBcastProbeResp>,
}

impl BeaconUpdate {
    pub fn new(head: Vec<u8>, tail: Vec<u8>) -> Self {
        Self {
            head,
            tail,
            probe_resp: None,
            fils_discovery: None,
            unsol_bcast_probe_resp: None,
        }
    }
}

/// Events delivered back through `handle_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEvent {
    CacFinished(IfaceId),
}

// Releases the channel context from the AP and its VLANs and restores the
// pre-start beacon interval. Shared by every post-acquisition failure path.
fn unwind_start<A: ChannelAllocator + ?Sized>(
    ifaces: &mut IfaceRegistry,
    chanctx: &mut ChanCtxManager,
    alloc: &mut A,
    id: IfaceId,
    vlans: &[IfaceId],
    prev_beacon_interval: u16,
) {
    for vlan in vlans {
        if let Ok(v) = ifaces.get_mut(*vlan) {
            chanctx.unbind(alloc, v);
        }
    }
    if let Ok(iface) = ifaces.get_mut(id) {
        chanctx.unbind(alloc, iface);
        iface.beacon_interval = prev_beacon_interval;
    }
}

impl<D: DeviceOps> ApMlme<D> {
    /// Brings an AP interface up. On success the interface is enabled (its
    /// beacon snapshot is published), carrier is on for the interface and
    /// every VLAN sub-interface, and the driver has been started. Any failure
    /// after the channel context was acquired releases it again and restores
    /// the previous beacon interval.
    pub fn start_ap(&mut self, id: IfaceId, config: ApConfig) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let Radio { ifaces, chanctx, retire, .. } = &mut *radio;

        {
            let iface = ifaces.get(id)?;
            if iface.iftype != IfaceType::Ap {
                return Err(Error::NotSupported);
            }
            if iface.enabled() {
                return Err(Error::AlreadyEnabled);
            }
        }
        if config.power_save != PowerSaveMode::Off {
            return Err(Error::UnsupportedMode);
        }
        if config.beacon_interval == 0 {
            return Err(Error::InvalidArgument("beacon interval must be non-zero"));
        }
        if config.dtim_period == 0 {
            return Err(Error::InvalidArgument("DTIM period must be non-zero"));
        }

        let mut changed =
            BssChange::BEACON | BssChange::BEACON_ENABLED | BssChange::SSID | BssChange::P2P_PS;
        let prev_beacon_interval;
        let vlans;
        let resources;
        {
            let iface = ifaces.get_mut(id)?;
            prev_beacon_interval = iface.beacon_interval;
            if iface.beacon_interval != config.beacon_interval {
                changed |= BssChange::BEACON_INT;
            }
            iface.beacon_interval = config.beacon_interval;
            iface.dtim_period = config.dtim_period;
            iface.ssid = config.ssid.clone();
            iface.hidden_ssid = config.hidden_ssid;
            if config.he_oper.is_some() {
                changed |= BssChange::HE_BSS_COLOR;
            }
            iface.he_oper = config.he_oper;
            iface.p2p_ps = config.p2p_ps;
            iface.beacon_rate = config.beacon_rate;
            iface.beacon_rate_set = config.beacon_rate.is_some();
            iface.s1g = config.chandef.band == Band::SubGhz;
            vlans = iface.vlans.clone();
            resources = iface.resources.clone();
        }

        let ctx = {
            let iface = ifaces.get_mut(id)?;
            match chanctx.assign(
                self.allocator.as_mut(),
                iface,
                &config.chandef,
                SharingMode::Shared,
            ) {
                Ok(ctx) => ctx,
                Err(e) => {
                    iface.beacon_interval = prev_beacon_interval;
                    return Err(e);
                }
            }
        };
        // VLAN sub-interfaces share the parent's context.
        for vlan in &vlans {
            if let Ok(v) = ifaces.get_mut(*vlan) {
                chanctx.bind(ctx, v);
            }
        }

        let headroom = encryption_headroom(&config.ciphers);
        fanout_control_port(ifaces, id, &vlans, config.control_port, headroom);

        let beacon = match Beacon::assemble(config.head, config.tail) {
            Ok(beacon) => beacon,
            Err(e) => {
                unwind_start(
                    ifaces,
                    chanctx,
                    self.allocator.as_mut(),
                    id,
                    &vlans,
                    prev_beacon_interval,
                );
                return Err(e);
            }
        };
        resources.publish_beacon(beacon, retire);
        if let Some(p) = config.probe_resp {
            resources.publish_probe_resp(ProbeResp(p), retire);
        }
        if let Some(f) = config.fils_discovery {
            resources.publish_fils_discovery(f, retire);
            changed |= BssChange::FILS_DISCOVERY;
        }
        if let Some(u) = config.unsol_bcast_probe_resp {
            resources.publish_unsol_bcast_probe_resp(u, retire);
            changed |= BssChange::UNSOL_BCAST_PROBE_RESP;
        }
        if let Ok(iface) = ifaces.get_mut(id) {
            iface.ftm_responder = config.ftm_responder;
        }

        if let Err(e) = self.device.start_ap(id) {
            // The driver never came up; the just-published snapshots go
            // straight to the retire list.
            resources.detach_all(retire);
            unwind_start(
                ifaces,
                chanctx,
                self.allocator.as_mut(),
                id,
                &vlans,
                prev_beacon_interval,
            );
            return Err(e);
        }

        {
            let iface = ifaces.get_mut(id)?;
            iface.dtim_count = iface.dtim_period - 1;
            iface.carrier = true;
        }
        self.device.notify_bss_changed(id, changed);
        self.device.set_link_status(id, LinkStatus::UP);
        for vlan in &vlans {
            if let Ok(v) = ifaces.get_mut(*vlan) {
                v.carrier = true;
            }
            self.device.set_link_status(*vlan, LinkStatus::UP);
        }
        info!("started AP on iface {:?} ({} VLANs)", id, vlans.len());
        Ok(())
    }

    /// Tears an AP interface down. The driver stop hook runs only after
    /// carrier-off and resource detachment, so the driver never observes a
    /// stopping interface as still publishing live beacons.
    pub fn stop_ap(&mut self, id: IfaceId) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let Radio { ifaces, chanctx, retire, total_bc_buffered } = &mut *radio;

        let (vlans, resources) = {
            let iface = ifaces.get(id)?;
            if !iface.enabled() {
                return Err(Error::NotEnabled);
            }
            (iface.vlans.clone(), iface.resources.clone())
        };

        {
            let iface = ifaces.get_mut(id)?;
            if let Some(csa) = iface.csa.take() {
                if csa.block_tx {
                    self.device.wake_tx_queues(id);
                }
            }
            iface.next_beacon = None;
            iface.carrier = false;
        }
        self.device.set_link_status(id, LinkStatus::DOWN);
        for vlan in &vlans {
            if let Ok(v) = ifaces.get_mut(*vlan) {
                v.carrier = false;
            }
            self.device.set_link_status(*vlan, LinkStatus::DOWN);
        }

        // Detachment is visible to new readers before any reclamation runs.
        resources.detach_all(retire);

        {
            let iface = ifaces.get_mut(id)?;
            iface.ftm_responder = None;
        }

        {
            let mut stations = self.stations.lock();
            let mut owners = vlans.clone();
            owners.push(id);
            let flushed = stations.flush(&owners);
            if flushed > 0 {
                debug!("flushed {} stations during AP stop on iface {:?}", flushed, id);
            }
        }

        {
            let iface = ifaces.get_mut(id)?;
            iface.beacon_rate = None;
            iface.beacon_rate_set = false;
            iface.ssid.clear();
            iface.hidden_ssid = false;
        }
        self.device.notify_bss_changed(id, BssChange::BEACON_ENABLED);

        {
            let iface = ifaces.get_mut(id)?;
            if let Some(cac) = iface.cac.take() {
                // Synchronous cancel: after this the callback cannot fire.
                self.timer.cancel_event(cac.timer_id);
                self.device.report_cac_event(id, cac.chandef, CacOutcome::Aborted);
            }
        }

        self.device.stop_ap(id);

        {
            let iface = ifaces.get_mut(id)?;
            let drained = iface.bc_buffered.len();
            iface.bc_buffered.clear();
            *total_bc_buffered = total_bc_buffered.saturating_sub(drained);
        }

        for vlan in &vlans {
            if let Ok(v) = ifaces.get_mut(*vlan) {
                chanctx.unbind(self.allocator.as_mut(), v);
            }
        }
        {
            let iface = ifaces.get_mut(id)?;
            chanctx.unbind(self.allocator.as_mut(), iface);
        }
        info!("stopped AP on iface {:?}", id);
        Ok(())
    }

    /// Replaces the published beacon (and optionally the probe response) of
    /// an enabled AP. The previous snapshots move to the retire list and are
    /// reclaimed once no reader holds them.
    pub fn change_beacon(&mut self, id: IfaceId, update: BeaconUpdate) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let Radio { ifaces, retire, .. } = &mut *radio;

        let resources = {
            let iface = ifaces.get(id)?;
            if !iface.enabled() {
                return Err(Error::NotEnabled);
            }
            iface.resources.clone()
        };

        let beacon = Beacon::assemble(update.head, update.tail)?;
        let mut changed = BssChange::BEACON;
        resources.publish_beacon(beacon, retire);
        if let Some(p) = update.probe_resp {
            resources.publish_probe_resp(ProbeResp(p), retire);
        }
        if let Some(f) = update.fils_discovery {
            resources.publish_fils_discovery(f, retire);
            changed |= BssChange::FILS_DISCOVERY;
        }
        if let Some(u) = update.unsol_bcast_probe_resp {
            resources.publish_unsol_bcast_probe_resp(u, retire);
            changed |= BssChange::UNSOL_BCAST_PROBE_RESP;
        }
        let reclaimed = retire.reclaim();
        debug!(
            "beacon replaced on iface {:?}, {} snapshots reclaimed, {} pending",
            id,
            reclaimed,
            retire.pending()
        );
        self.device.notify_bss_changed(id, changed);
        Ok(())
    }

    /// Announces a channel switch. The post-switch beacon is staged; transmit
    /// queues stop if the announcement blocks transmission.
    pub fn start_channel_switch(
        &mut self,
        id: IfaceId,
        count: u8,
        block_tx: bool,
        next_beacon: BeaconUpdate,
    ) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let iface = radio.ifaces.get_mut(id)?;
        if !iface.enabled() {
            return Err(Error::NotEnabled);
        }
        if iface.csa.is_some() {
            return Err(Error::Busy);
        }
        iface.csa = Some(ChannelSwitch { count, block_tx });
        iface.next_beacon = Some(next_beacon);
        if block_tx {
            self.device.stop_tx_queues(id);
        }
        Ok(())
    }

    /// Starts a channel availability check cycle on the interface. Completion
    /// arrives via `handle_timeout`; teardown cancels the timer and reports
    /// the cycle as aborted.
    pub fn start_cac(
        &mut self,
        id: IfaceId,
        chandef: ChannelDef,
        duration_nanos: i64,
    ) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let iface = radio.ifaces.get_mut(id)?;
        if iface.cac.is_some() {
            return Err(Error::Busy);
        }
        let timer_id = self.timer.schedule_event(duration_nanos, TimedEvent::CacFinished(id));
        iface.cac = Some(CacState { chandef, timer_id });
        Ok(())
    }

    /// Delivers a fired timer back into the core. Events canceled before the
    /// deadline never surface here.
    pub fn handle_timeout(&mut self, event_id: EventId) {
        let event = match self.timer.triggered(&event_id) {
            Some(event) => event,
            None => return,
        };
        match event {
            TimedEvent::CacFinished(id) => {
                let mut radio = self.radio.lock();
                let cac = match radio.ifaces.get_mut(id).ok().and_then(|i| i.cac.take()) {
                    Some(cac) => cac,
                    None => return,
                };
                self.device.report_cac_event(id, cac.chandef, CacOutcome::Finished);
            }
        }
    }

    /// Buffers a broadcast frame for DTIM delivery, counted against the
    /// radio-wide buffered-frame total.
    pub fn buffer_broadcast(&mut self, id: IfaceId, frame: Vec<u8>) -> Result<(), Error> {
        let mut radio = self.radio.lock();
        let Radio { ifaces, total_bc_buffered, .. } = &mut *radio;
        let iface = ifaces.get_mut(id)?;
        if !iface.enabled() {
            return Err(Error::NotEnabled);
        }
        iface.bc_buffered.push_back(frame);
        *total_bc_buffered += 1;
        Ok(())
    }

    pub fn buffered_broadcast_total(&self) -> usize {
        self.radio.lock().total_bc_buffered
    }
}
