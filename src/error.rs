// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use thiserror::Error;

/// Errors surfaced by the AP control surface. Collaborator failures are passed
/// through as `Backend` with the opaque code the collaborator reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("interface is already enabled")]
    AlreadyEnabled,
    #[error("interface is not enabled")]
    NotEnabled,
    #[error("no matching entry")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("requested power save mode is not supported")]
    UnsupportedMode,
    #[error("operation not supported for this interface role")]
    NotSupported,
    #[error("resource busy")]
    Busy,
    #[error("out of memory")]
    OutOfMemory,
    #[error("backend failure: code {0}")]
    Backend(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_code_is_preserved() {
        let e = Error::Backend(-16);
        assert_eq!(e, Error::Backend(-16));
        assert_eq!(format!("{}", e), "backend failure: code -16");
    }
}
