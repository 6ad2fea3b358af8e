// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The persistent and handoff data model (`spec` §3): fixed-layout records
//! identified by a magic word, and the region-handle abstraction that lets
//! the engine address them without depending on concrete link addresses.
//!
//! Records are `hubpack`-serialized rather than read by raw pointer cast:
//! this gives a canonical, padding-free byte encoding for free (see the
//! `Signable` note on `AgentHdr`) instead of relying on a particular
//! compiler's struct layout.

use crate::primitives::{Digest, PrivKey, PubKey};
use hubpack::SerializedSize;
use serde::{Deserialize, Serialize};
use serde_big_array::big_array;
use zeroize::Zeroize;

big_array! { BigArray; }

/// ASCII "BARN", read back as a little-endian `u32`. Never `0x0000_0000`
/// or `0xFFFF_FFFF`, both of which collide with erased/uninitialized flash.
pub const MAGIC: u32 = 0x4E52_4142;
pub const BARNACLE_VERSION: u16 = 1;

pub const SERIAL_LEN: usize = crate::x509::SERIAL_LEN;
pub const AGENT_NAME_LEN: usize = 32;
pub const CERT_BAG_LEN: usize = 2048;
pub const COMPOUND_CERT_LEN: usize = 1024;
pub const CERT_STORE_BAG_LEN: usize = 4096;

pub const ISSUED_SLOT_ROOT: usize = 0;
pub const ISSUED_SLOT_INTERMEDIATE: usize = 1;
pub const ISSUED_SLOT_DEVICE: usize = 2;
pub const ISSUED_SLOTS: usize = 3;

pub const CERTSTORE_SLOT_ROOT: usize = 0;
pub const CERTSTORE_SLOT_DEVICE: usize = 1;
pub const CERTSTORE_SLOT_LOADER: usize = 2;
pub const CERTSTORE_SLOT_AGENT: usize = 3;
pub const CERTSTORE_SLOTS: usize = 4;

/// Upper bound on the agent image the engine will read into a stack buffer
/// and digest in one pass. Sized to the board support package's own
/// `agent_code` region (`stage0::main::AGENT_CODE_LEN`) so that region and
/// cap can never drift apart the way they did when each crate hardcoded its
/// own number; both now name this one constant.
pub const AGENT_CODE_MAX: usize = 512 * 1024;

/// A region the identity engine is told about rather than one it hardcodes;
/// the concrete base address comes from the linker script or build
/// configuration supplied by the boot environment (`spec` §9).
#[derive(Clone, Copy, Debug)]
pub struct RegionHandle {
    pub base: usize,
    pub len: usize,
}

/// All region handles the engine needs for one boot, gathered so `boot()`
/// takes one parameter instead of seven.
#[derive(Clone, Copy, Debug)]
pub struct Regions {
    pub fw_device_id: RegionHandle,
    pub issued_certs: RegionHandle,
    pub fw_cache: RegionHandle,
    pub agent_hdr: RegionHandle,
    pub agent_code: RegionHandle,
    pub compound_id: RegionHandle,
    pub cert_store: RegionHandle,
}

/// Flash read/program primitive (`spec` §4.4, §6 `FlashPages`). A single
/// implementor backs every flash-resident region; regions are distinguished
/// by the handle passed in, not by which trait object is called.
pub trait Flash {
    fn read(&self, region: RegionHandle, out: &mut [u8]);
    /// Erases and programs the pages covering `region`. `data` must fit
    /// within `region.len`. Returns `false` on any hardware error.
    fn program(&mut self, region: RegionHandle, data: &[u8]) -> bool;
}

/// RAM handoff primitive for `CompoundId`/`CertStore`.
pub trait Handoff {
    fn write(&mut self, region: RegionHandle, data: &[u8]);
}

/// Memory-protection ("firewall") engagement, applied once per boot just
/// before handoff (`spec` §4.4, §9 "scoped acquisition").
pub trait Firewall {
    fn lock(&mut self, regions: &[RegionHandle]);
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, SerializedSize)]
pub struct CertTableEntry {
    pub start: u16,
    pub size: u16,
}

/// Flags stored in `IssuedCerts.flags` (`spec` §6).
pub struct IssuedFlags;
impl IssuedFlags {
    pub const PROVISIONED: u8 = 0b0000_0001;
    pub const AUTHENTICATED_BOOT: u8 = 0b0000_0010;
    pub const WRITELOCK: u8 = 0b0000_0100;

    pub fn has(flags: u8, bit: u8) -> bool {
        flags & bit != 0
    }
}

/// Holds the device's long-lived private key, so it is zeroized on drop
/// rather than left to linger on the stack after the engine is done
/// reading it (`spec` §3 invariant 3: `priv_key` never leaves the locked
/// region).
#[derive(Serialize, Deserialize, SerializedSize, Zeroize)]
#[zeroize(drop)]
pub struct FwDeviceId {
    pub magic: u32,
    #[serde(with = "BigArray")]
    pub pub_key: PubKey,
    pub priv_key: PrivKey,
}

impl FwDeviceId {
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}

#[derive(Serialize, Deserialize, SerializedSize)]
pub struct IssuedCerts {
    pub magic: u32,
    pub flags: u8,
    #[serde(with = "BigArray")]
    pub code_auth_pub: PubKey,
    pub cert_table: [CertTableEntry; ISSUED_SLOTS],
    #[serde(with = "BigArray")]
    pub cert_bag: [u8; CERT_BAG_LEN],
}

impl IssuedCerts {
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn slot(&self, slot: usize) -> Option<&[u8]> {
        let entry = self.cert_table[slot];
        if entry.size == 0 {
            return None;
        }
        let start = entry.start as usize;
        let end = start + entry.size as usize;
        self.cert_bag.get(start..end)
    }
}

#[derive(Serialize, Deserialize, SerializedSize, Zeroize)]
#[zeroize(drop)]
pub struct FwCache {
    pub magic: u32,
    pub last_issued: u32,
    pub last_version: u32,
    pub agent_hdr_digest: Digest,
    #[serde(with = "BigArray")]
    pub compound_pub: PubKey,
    pub compound_priv: PrivKey,
    pub compound_cert_size: u16,
    #[serde(with = "BigArray")]
    #[zeroize(skip)]
    pub cert: [u8; COMPOUND_CERT_LEN],
}

impl FwCache {
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn cert_pem(&self) -> &[u8] {
        &self.cert[..self.compound_cert_size as usize]
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, SerializedSize)]
pub struct HdrInfo {
    pub magic: u32,
    pub version: u16,
    pub size: u16,
}

#[derive(Clone, Copy, Serialize, Deserialize, SerializedSize)]
pub struct AgentInfo {
    pub name: [u8; AGENT_NAME_LEN],
    pub version: u32,
    pub issued: u32,
    pub size: u32,
    pub digest: Digest,
}

/// The signable subset of `AgentHdr`: `spec` §9 requires a canonical byte
/// encoding of exactly this struct prior to hashing, which `hubpack`
/// provides (fixed field order, no padding) without needing `repr(C)` and
/// a raw pointer cast.
#[derive(Clone, Copy, Serialize, Deserialize, SerializedSize)]
pub struct Signable {
    pub hdr: HdrInfo,
    pub agent: AgentInfo,
}

impl Signable {
    pub const SIZE: usize = <Self as SerializedSize>::MAX_SIZE;

    pub fn to_bytes(&self) -> ([u8; Self::SIZE], usize) {
        let mut buf = [0u8; Self::SIZE];
        let n = hubpack::serialize(&mut buf, self).unwrap_or(0);
        (buf, n)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, SerializedSize)]
pub struct AgentHdr {
    pub sign: Signable,
    pub signature_r: [u8; crate::x509::COORD_LEN],
    pub signature_s: [u8; crate::x509::COORD_LEN],
}

static_assertions::const_assert!(Signable::SIZE > 0);

#[derive(Serialize, Deserialize, SerializedSize, Zeroize)]
#[zeroize(drop)]
pub struct CompoundId {
    pub magic: u32,
    #[serde(with = "BigArray")]
    pub pub_key: PubKey,
    pub priv_key: PrivKey,
}

#[derive(Serialize, Deserialize, SerializedSize)]
pub struct CertStore {
    pub magic: u32,
    pub cert_table: [CertTableEntry; CERTSTORE_SLOTS],
    pub cursor: u16,
    #[serde(with = "BigArray")]
    pub cert_bag: [u8; CERT_STORE_BAG_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStoreError {
    Overflow,
}

impl CertStore {
    pub fn zeroed() -> Self {
        Self {
            magic: MAGIC,
            cert_table: [CertTableEntry::default(); CERTSTORE_SLOTS],
            cursor: 0,
            cert_bag: [0; CERT_STORE_BAG_LEN],
        }
    }

    /// Appends a NUL-terminated PEM into `slot`, advancing the cursor.
    /// Fails with `Overflow` rather than writing a truncated entry.
    pub fn append(&mut self, slot: usize, pem: &[u8]) -> Result<(), CertStoreError> {
        let start = self.cursor as usize;
        let end = start + pem.len() + 1;
        if end > self.cert_bag.len() {
            return Err(CertStoreError::Overflow);
        }
        self.cert_bag[start..start + pem.len()].copy_from_slice(pem);
        self.cert_bag[start + pem.len()] = 0;
        self.cert_table[slot] = CertTableEntry {
            start: start as u16,
            size: pem.len() as u16,
        };
        self.cursor = end as u16;
        Ok(())
    }
}
