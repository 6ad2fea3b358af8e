// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contracts for the hardware/crypto collaborators the identity engine does
//! not implement itself: the RNG, the hash and ECC primitives, and the
//! flash/memory-protection hardware. Concrete implementations live with
//! the board support package (`stage0`) or, for tests, in `testutil`.

use crate::x509::{COORD_LEN, PUB_LEN};

pub const DIGEST_LEN: usize = 32;
pub const SHA1_LEN: usize = 20;

pub type Digest = [u8; DIGEST_LEN];
pub type PrivKey = [u8; COORD_LEN];
/// Uncompressed point, `x || y`, without the `0x04` tag byte.
pub type PubKey = [u8; PUB_LEN];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; COORD_LEN],
    pub s: [u8; COORD_LEN],
}

/// Hardware random number generator. Called exactly once per device
/// lifetime, at first-boot provisioning.
pub trait Rng {
    fn fill(&mut self, buf: &mut [u8]);
}

/// SHA-256 and SHA-1, the two digest widths this profile needs (SHA-256 for
/// measurements/serials/TBS digests, SHA-1 for authorityKeyIdentifier).
pub trait Hash {
    fn sha256(&self, input: &[u8]) -> Digest;
    fn sha1(&self, input: &[u8]) -> [u8; SHA1_LEN];
}

/// Keyed derivation used for certificate serial numbers
/// (`Kdf(pub, "Serial", 32)`).
pub trait Kdf {
    fn derive(&self, ikm: &[u8], label: &[u8], out: &mut [u8]);
}

/// The ECC operations the engine needs: deterministic key derivation from a
/// seed, ECDSA signing, and ECDSA verification. `derive_key` must be a pure
/// function of `(seed, label)` — this is what makes compound-key derivation
/// and alias-cert caching deterministic (see `engine` module docs).
pub trait Ecc {
    fn derive_key(&self, seed: &[u8], label: &[u8]) -> (PubKey, PrivKey);
    fn sign(&self, digest: &Digest, priv_key: &PrivKey) -> Signature;
    fn verify(&self, digest: &Digest, sig: &Signature, pub_key: &PubKey) -> bool;
}

/// Strips redundant leading zero bytes from a big-endian integer down to a
/// fixed width, or left-pads with zeros if it's shorter. Corresponds to the
/// reference's `MpiToInt`/`MpiToFixed`: in this crate it is pure byte
/// munging over already-fixed-width arrays, not a bignum-library call, so
/// it is a free function rather than a primitive contract.
pub fn mpi_to_fixed(mpi: &[u8], out: &mut [u8]) {
    let skip = mpi.len().saturating_sub(out.len());
    let src = &mpi[skip..];
    let pad = out.len() - src.len();
    out[..pad].fill(0);
    out[pad..].copy_from_slice(src);
}
