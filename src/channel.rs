// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shared channel contexts. The physical allocator lives behind the
//! `ChannelAllocator` trait; this module tracks which interfaces reference a
//! context and releases it back to the allocator when the last reference
//! drops. An AP interface and its VLAN sub-interfaces all share one context.

use {
    crate::{
        error::Error,
        iface::{ChannelDef, Iface, IfaceId},
    },
    log::debug,
    std::collections::HashMap,
};

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct ContextId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingMode {
    Shared,
    Exclusive,
}

/// The radio's channel-context allocator, external to this core.
pub trait ChannelAllocator {
    fn acquire(
        &mut self,
        iface: IfaceId,
        chandef: &ChannelDef,
        mode: SharingMode,
    ) -> Result<ContextId, Error>;
    fn release(&mut self, iface: IfaceId, ctx: ContextId);
}

/// Refcounts live channel contexts for one radio.
pub struct ChanCtxManager {
    refs: HashMap<ContextId, u32>,
}

impl ChanCtxManager {
    pub fn new() -> Self {
        Self { refs: HashMap::new() }
    }

    /// Acquires a context from the allocator and binds it to `iface`.
    pub fn assign<A: ChannelAllocator + ?Sized>(
        &mut self,
        alloc: &mut A,
        iface: &mut Iface,
        chandef: &ChannelDef,
        mode: SharingMode,
    ) -> Result<ContextId, Error> {
        let ctx = alloc.acquire(iface.id, chandef, mode)?;
        *self.refs.entry(ctx).or_insert(0) += 1;
        iface.chanctx = Some(ctx);
        debug!("iface {:?} bound to channel context {:?}", iface.id, ctx);
        Ok(ctx)
    }

    /// Binds an already-acquired context to an additional interface, e.g. a
    /// VLAN sub-interface sharing its parent's channel.
    pub fn bind(&mut self, ctx: ContextId, iface: &mut Iface) {
        *self.refs.entry(ctx).or_insert(0) += 1;
        iface.chanctx = Some(ctx);
    }

    /// Unbinds `iface` from its context. The context is released back to the
    /// allocator once the last referencing interface unbinds.
    pub fn unbind<A: ChannelAllocator + ?Sized>(&mut self, alloc: &mut A, iface: &mut Iface) {
        let ctx = match iface.chanctx.take() {
            Some(ctx) => ctx,
            None => return,
        };
        if let Some(count) = self.refs.get_mut(&ctx) {
            *count -= 1;
            if *count == 0 {
                self.refs.remove(&ctx);
                alloc.release(iface.id, ctx);
                debug!("channel context {:?} released", ctx);
            }
        }
    }

    pub fn refcount(&self, ctx: ContextId) -> u32 {
        self.refs.get(&ctx).copied().unwrap_or(0)
    }
}

#[cfg(test)]
pub use test_utils::*;

#[cfg(test)]
mod test_utils {
    use {super::*, parking_lot::Mutex, std::sync::Arc};

    #[derive(Default)]
    pub struct FakeAllocatorState {
        pub next: u32,
        pub fail_acquire: Option<Error>,
        pub acquired: Vec<(IfaceId, ChannelDef, SharingMode)>,
        pub released: Vec<(IfaceId, ContextId)>,
    }

    pub struct FakeAllocator {
        state: Arc<Mutex<FakeAllocatorState>>,
    }

    impl FakeAllocator {
        pub fn new() -> (Self, Arc<Mutex<FakeAllocatorState>>) {
            let state = Arc::new(Mutex::new(FakeAllocatorState::default()));
            (Self { state: state.clone() }, state)
        }
    }

    impl ChannelAllocator for FakeAllocator {
        fn acquire(
            &mut self,
            iface: IfaceId,
            chandef: &ChannelDef,
            mode: SharingMode,
        ) -> Result<ContextId, Error> {
            let mut state = self.state.lock();
            if let Some(e) = state.fail_acquire.clone() {
                return Err(e);
            }
            state.next += 1;
            state.acquired.push((iface, *chandef, mode));
            Ok(ContextId(state.next))
        }

        fn release(&mut self, iface: IfaceId, ctx: ContextId) {
            self.state.lock().released.push((iface, ctx));
        }
    }
}
