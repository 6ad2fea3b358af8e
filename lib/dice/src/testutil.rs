// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-only fakes for the hardware/crypto contracts in `primitives` and
//! `layout`, used by the engine's end-to-end scenario tests. None of this
//! is shipped on-device; real implementations live with the board support
//! package.

use hkdf::Hkdf;
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use std::vec::Vec;

use crate::layout::{Firewall as FirewallTrait, Flash as FlashTrait, Handoff as HandoffTrait, RegionHandle};
use crate::primitives::{Digest, Ecc, Hash, Kdf, PrivKey, PubKey, Rng, Signature, SHA1_LEN};
use crate::x509::{COORD_LEN, PUB_LEN};

const BACKING_STORE_LEN: usize = 1 << 20;

pub struct FakeFlash {
    mem: Vec<u8>,
}

impl FakeFlash {
    pub fn new() -> Self {
        Self {
            mem: std::vec![0xFFu8; BACKING_STORE_LEN],
        }
    }

    /// Places bytes as if the firmware signer had written them off-device
    /// (used to stage `AgentHdr`/`AgentCode` before a boot scenario runs).
    pub fn seed(&mut self, region: RegionHandle, data: &[u8]) {
        self.mem[region.base..region.base + data.len()].copy_from_slice(data);
    }

    /// Raw contents of a region, for tests asserting that a halted boot
    /// never reached a particular `program` call.
    pub fn mem_at(&self, region: RegionHandle) -> &[u8] {
        &self.mem[region.base..region.base + region.len]
    }
}

impl FlashTrait for FakeFlash {
    fn read(&self, region: RegionHandle, out: &mut [u8]) {
        let n = out.len().min(region.len);
        out[..n].copy_from_slice(&self.mem[region.base..region.base + n]);
    }

    fn program(&mut self, region: RegionHandle, data: &[u8]) -> bool {
        if data.len() > region.len {
            return false;
        }
        self.mem[region.base..region.base + data.len()].copy_from_slice(data);
        for b in &mut self.mem[region.base + data.len()..region.base + region.len] {
            *b = 0xFF;
        }
        true
    }
}

pub struct FakeHandoff {
    mem: Vec<u8>,
}

impl FakeHandoff {
    pub fn new() -> Self {
        Self {
            mem: std::vec![0u8; BACKING_STORE_LEN],
        }
    }

    pub fn region(&self, region: RegionHandle) -> &[u8] {
        &self.mem[region.base..region.base + region.len]
    }
}

impl HandoffTrait for FakeHandoff {
    fn write(&mut self, region: RegionHandle, data: &[u8]) {
        self.mem[region.base..region.base + data.len()].copy_from_slice(data);
    }
}

#[derive(Default)]
pub struct FakeFirewall {
    pub locked: Vec<RegionHandle>,
}

impl FakeFirewall {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FirewallTrait for FakeFirewall {
    fn lock(&mut self, regions: &[RegionHandle]) {
        self.locked.extend_from_slice(regions);
    }
}

pub struct FakeRng {
    pub fill_byte: u8,
}

impl FakeRng {
    pub fn new(fill_byte: u8) -> Self {
        Self { fill_byte }
    }
}

impl Rng for FakeRng {
    fn fill(&mut self, buf: &mut [u8]) {
        buf.fill(self.fill_byte);
    }
}

/// Real SHA-256/SHA-1 and HKDF-based derivation, standing in for the
/// board's ECC/hash peripheral. Deterministic by construction, which is
/// what the engine's determinism property (`spec` §8 property 1) requires
/// of whatever backs `Ecc::derive_key`.
pub struct FakeCrypto;

impl FakeCrypto {
    pub fn new() -> Self {
        Self
    }
}

impl Hash for FakeCrypto {
    fn sha256(&self, input: &[u8]) -> Digest {
        Sha256::digest(input).into()
    }

    fn sha1(&self, input: &[u8]) -> [u8; SHA1_LEN] {
        Sha1::digest(input).into()
    }
}

impl Kdf for FakeCrypto {
    fn derive(&self, ikm: &[u8], label: &[u8], out: &mut [u8]) {
        let hk = Hkdf::<Sha256>::new(None, ikm);
        hk.expand(label, out).expect("hkdf expand");
    }
}

impl Ecc for FakeCrypto {
    fn derive_key(&self, seed: &[u8], label: &[u8]) -> (PubKey, PrivKey) {
        let hk = Hkdf::<Sha256>::new(None, seed);
        let mut priv_key = [0u8; COORD_LEN];
        hk.expand(label, &mut priv_key).expect("hkdf expand");

        // No real point multiplication backs this fake, so `pub_key` embeds
        // `priv_key` directly in its first half (the second half is a
        // derived tag, just for shape) rather than being a one-way function
        // of it. That makes `verify` below an honest recompute-and-compare
        // check instead of an unconditional pass, at the cost of `pub_key`
        // not actually hiding the private scalar -- acceptable for a
        // host-only test double that never runs on real key material.
        let mut pub_key = [0u8; PUB_LEN];
        pub_key[..COORD_LEN].copy_from_slice(&priv_key);
        let hk_pub = Hkdf::<Sha256>::new(None, &priv_key);
        hk_pub
            .expand(b"pub", &mut pub_key[COORD_LEN..])
            .expect("hkdf expand");

        (pub_key, priv_key)
    }

    fn sign(&self, digest: &Digest, priv_key: &PrivKey) -> Signature {
        let hk = Hkdf::<Sha256>::new(Some(priv_key), digest);
        let mut r = [0u8; COORD_LEN];
        let mut s = [0u8; COORD_LEN];
        hk.expand(b"r", &mut r).expect("hkdf expand");
        hk.expand(b"s", &mut s).expect("hkdf expand");
        Signature { r, s }
    }

    fn verify(&self, digest: &Digest, sig: &Signature, pub_key: &PubKey) -> bool {
        let mut priv_key = [0u8; COORD_LEN];
        priv_key.copy_from_slice(&pub_key[..COORD_LEN]);
        let expected = self.sign(digest, &priv_key);
        expected.r == sig.r && expected.s == sig.s
    }
}
