// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The seam between this core and its collaborators: the driver backend, the
//! power-save subsystem, bridge learning and radar/CAC reporting. The core
//! only ever calls through `DeviceOps`; implementations translate into their
//! platform's driver interface.

use crate::{
    error::Error,
    iface::{ChannelDef, IfaceId, MacAddr},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus(u8);

impl LinkStatus {
    pub const DOWN: Self = Self(0);
    pub const UP: Self = Self(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacOutcome {
    Finished,
    Aborted,
}

bitflags::bitflags! {
    /// Aggregate set of BSS fields that changed during an operation, reported
    /// to collaborators in one notification.
    pub struct BssChange: u32 {
        const BEACON_INT             = 1 << 0;
        const BEACON_ENABLED         = 1 << 1;
        const BEACON                 = 1 << 2;
        const SSID                   = 1 << 3;
        const P2P_PS                 = 1 << 4;
        const HE_BSS_COLOR           = 1 << 5;
        const FILS_DISCOVERY         = 1 << 6;
        const UNSOL_BCAST_PROBE_RESP = 1 << 7;
    }
}

pub trait DeviceOps {
    /// Starts beaconing for an enabled AP interface.
    fn start_ap(&mut self, iface: IfaceId) -> Result<(), Error>;
    /// Stops beaconing. Called only after carrier-off and resource
    /// detachment, so the driver never observes a stopping interface as
    /// still publishing live beacons.
    fn stop_ap(&mut self, iface: IfaceId);
    /// Signals carrier up/down for an interface.
    fn set_link_status(&mut self, iface: IfaceId, status: LinkStatus);
    /// Binds or unbinds a station's 4-address (WDS bridging) association.
    fn set_4addr_mode(&mut self, sta: MacAddr, enabled: bool);
    fn stop_tx_queues(&mut self, iface: IfaceId);
    fn wake_tx_queues(&mut self, iface: IfaceId);
    /// Reports the aggregate changed-field set after a lifecycle operation.
    fn notify_bss_changed(&mut self, iface: IfaceId, changed: BssChange);
    /// Recomputes radio-wide power-save state. Must never be called with the
    /// station-table lock held.
    fn recalc_ps(&mut self);
    fn recalc_ps_for_iface(&mut self, iface: IfaceId);
    /// Informs bridge/learning collaborators of an address-to-interface
    /// mapping change.
    fn notify_address_binding(&mut self, iface: IfaceId, mac: MacAddr);
    fn report_cac_event(&mut self, iface: IfaceId, chandef: ChannelDef, outcome: CacOutcome);
    /// Initializes rate-control state for a newly associated station.
    fn init_rate_control(&mut self, sta: MacAddr);
}

#[cfg(test)]
pub use test_utils::*;

#[cfg(test)]
mod test_utils {
    use super::*;

    /// Records every driver call so tests can assert ordering and arguments.
    #[derive(Default)]
    pub struct FakeDevice {
        pub started: Vec<IfaceId>,
        pub stopped: Vec<IfaceId>,
        pub link: Vec<(IfaceId, LinkStatus)>,
        pub four_addr: Vec<(MacAddr, bool)>,
        pub queues_stopped: Vec<IfaceId>,
        pub queues_woken: Vec<IfaceId>,
        pub bss_changes: Vec<(IfaceId, BssChange)>,
        pub ps_recalcs: usize,
        pub ps_iface_recalcs: Vec<IfaceId>,
        pub bindings: Vec<(IfaceId, MacAddr)>,
        pub cac_events: Vec<(IfaceId, ChannelDef, CacOutcome)>,
        pub rate_init: Vec<MacAddr>,
        pub fail_start_ap: Option<i32>,
    }

    impl FakeDevice {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn link_status(&self, iface: IfaceId) -> Option<LinkStatus> {
            self.link.iter().rev().find(|(id, _)| *id == iface).map(|(_, s)| *s)
        }
    }

    impl DeviceOps for FakeDevice {
        fn start_ap(&mut self, iface: IfaceId) -> Result<(), Error> {
            if let Some(code) = self.fail_start_ap {
                return Err(Error::Backend(code));
            }
            self.started.push(iface);
            Ok(())
        }

        fn stop_ap(&mut self, iface: IfaceId) {
            self.stopped.push(iface);
        }

        fn set_link_status(&mut self, iface: IfaceId, status: LinkStatus) {
            self.link.push((iface, status));
        }

        fn set_4addr_mode(&mut self, sta: MacAddr, enabled: bool) {
            self.four_addr.push((sta, enabled));
        }

        fn stop_tx_queues(&mut self, iface: IfaceId) {
            self.queues_stopped.push(iface);
        }

        fn wake_tx_queues(&mut self, iface: IfaceId) {
            self.queues_woken.push(iface);
        }

        fn notify_bss_changed(&mut self, iface: IfaceId, changed: BssChange) {
            self.bss_changes.push((iface, changed));
        }

        fn recalc_ps(&mut self) {
            self.ps_recalcs += 1;
        }

        fn recalc_ps_for_iface(&mut self, iface: IfaceId) {
            self.ps_iface_recalcs.push(iface);
        }

        fn notify_address_binding(&mut self, iface: IfaceId, mac: MacAddr) {
            self.bindings.push((iface, mac));
        }

        fn report_cac_event(&mut self, iface: IfaceId, chandef: ChannelDef, outcome: CacOutcome) {
            self.cac_events.push((iface, chandef, outcome));
        }

        fn init_rate_control(&mut self, sta: MacAddr) {
            self.rate_init.push(sta);
        }
    }
}
