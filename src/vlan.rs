// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Control-plane fan-out from an AP interface to its VLAN sub-interfaces.

use crate::iface::{Cipher, ControlPortPolicy, IfaceId, IfaceRegistry};

/// Transmit headroom reserved for encryption headers, derived from the
/// configured pairwise ciphers.
pub fn encryption_headroom(ciphers: &[Cipher]) -> usize {
    ciphers
        .iter()
        .map(|c| match c {
            Cipher::Wep40 | Cipher::Wep104 => 4,
            Cipher::Tkip => 8,
            Cipher::Ccmp128 | Cipher::Gcmp128 => 8,
            Cipher::Ccmp256 | Cipher::Gcmp256 => 8,
        })
        .max()
        .unwrap_or(0)
}

/// Applies the control-port policy and encryption headroom to the AP
/// interface and every VLAN sub-interface in `vlans`.
pub fn fanout_control_port(
    ifaces: &mut IfaceRegistry,
    ap: IfaceId,
    vlans: &[IfaceId],
    policy: ControlPortPolicy,
    headroom: usize,
) {
    for id in std::iter::once(ap).chain(vlans.iter().copied()) {
        if let Ok(iface) = ifaces.get_mut(id) {
            iface.control_port = policy;
            iface.crypto_headroom = headroom;
        }
    }
}
