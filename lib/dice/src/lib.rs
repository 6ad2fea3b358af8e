// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Measured-boot DICE/RIoT identity core: a bounded-buffer DER/X.509
//! builder and the boot-time identity engine built on top of it. `no_std`
//! outside of tests; the board support package supplies the hardware
//! primitives in [`primitives`] and [`layout`].

#![cfg_attr(not(test), no_std)]

pub mod der;
pub mod dfu;
pub mod engine;
pub mod layout;
pub mod log;
pub mod pem;
pub mod primitives;
#[cfg(test)]
pub mod testutil;
pub mod x509;

pub use der::{DerError, DerResult, DerWriter};
pub use engine::{boot, BootError, BootReason, RollbackPolicy};
pub use primitives::{Digest, Ecc, Hash, Kdf, PrivKey, PubKey, Rng, Signature};
