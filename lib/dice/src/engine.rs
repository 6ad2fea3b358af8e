// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The boot-time identity engine (`spec` §4.5): provisioning, per-boot
//! firmware verification, compound-key derivation, and handoff assembly,
//! in that order, once per boot.

use hubpack::SerializedSize;
use serde::{Deserialize, Serialize};

use crate::der::DerError;
use crate::layout::{
    AgentHdr, CertStore, CertStoreError, CompoundId, Firewall, Flash, FwCache, FwDeviceId, Handoff,
    IssuedCerts, IssuedFlags, Regions, AGENT_CODE_MAX, AGENT_NAME_LEN, CERTSTORE_SLOT_DEVICE,
    CERTSTORE_SLOT_LOADER, CERTSTORE_SLOT_ROOT, ISSUED_SLOT_DEVICE, ISSUED_SLOT_ROOT, MAGIC,
};
use crate::log::LogSink;
use crate::primitives::{Ecc, Hash, Kdf, Rng};
use crate::x509::{self, CertKind, TbsParams, PUB_LEN, SERIAL_LEN};

const NOT_BEFORE: [u8; 13] = *b"170101000000Z";
const NOT_AFTER: [u8; 13] = *b"370101000000Z";

/// Whether a detected rollback (`spec` §4.5 step 6, §9) halts the boot or
/// only logs. The default comes from `dice.toml`'s `rollback_policy` (read
/// by `build.rs`, `Enforce` if unset); the `rollback-warn` Cargo feature
/// forces `Warn` regardless, for bring-up/lab builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollbackPolicy {
    Warn,
    Enforce,
}

mod config {
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        if cfg!(feature = "rollback-warn") || !config::ROLLBACK_ENFORCE_DEFAULT {
            RollbackPolicy::Warn
        } else {
            RollbackPolicy::Enforce
        }
    }
}

/// Computed once at the top of `boot`, per `spec` §9: replaces a flag that
/// the reference mutates mid-function with a value fixed before any work
/// happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IdentityState {
    NeedIdentity,
    HaveIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    HeaderInvalid,
    LayoutMismatch,
    CodeDigestMismatch,
    AuthBootSignatureInvalid,
    RollbackDetected,
    FlashWriteFailed,
    CertStoreOverflow,
    Der(DerError),
}

impl From<DerError> for BootError {
    fn from(e: DerError) -> Self {
        BootError::Der(e)
    }
}

impl From<CertStoreError> for BootError {
    fn from(_: CertStoreError) -> Self {
        BootError::CertStoreOverflow
    }
}

/// Why the boot environment reset, when it knows. Purely observational
/// (`spec` §3 supplement, `BarnacleFWViolation`): absence (`None`) is a
/// valid value and never changes whether `boot` succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootReason {
    PowerOn,
    Watchdog,
    FirewallViolation,
    Other,
}

fn trimmed_name(name: &[u8; AGENT_NAME_LEN]) -> &str {
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    core::str::from_utf8(&name[..end]).unwrap_or("agent")
}

/// `serial[0] & 0x80 == 0` (positive) and `serial[0] & 0x01 != 0`
/// (non-null), per `spec` §3 invariant 6.
fn sanitize_serial(serial: &mut [u8; SERIAL_LEN]) {
    serial[0] &= !0x80;
    serial[0] |= 0x01;
}

fn read_record<T>(flash: &dyn Flash, region: crate::layout::RegionHandle, buf: &mut [u8]) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
{
    flash.read(region, buf);
    hubpack::deserialize::<T>(buf).ok().map(|(v, _)| v)
}

fn write_record<T>(
    flash: &mut dyn Flash,
    region: crate::layout::RegionHandle,
    buf: &mut [u8],
    record: &T,
) -> Result<(), BootError>
where
    T: Serialize,
{
    let n = hubpack::serialize(buf, record).map_err(|_| BootError::FlashWriteFailed)?;
    for b in &mut buf[n..] {
        *b = 0xFF;
    }
    if flash.program(region, buf) {
        Ok(())
    } else {
        Err(BootError::FlashWriteFailed)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn boot(
    flash: &mut dyn Flash,
    handoff: &mut dyn Handoff,
    firewall: &mut dyn Firewall,
    rng: &mut dyn Rng,
    hash: &dyn Hash,
    kdf: &dyn Kdf,
    ecc: &dyn Ecc,
    log: &mut dyn LogSink,
    regions: Regions,
    policy: RollbackPolicy,
    reset_reason: Option<BootReason>,
) -> Result<(), BootError> {
    if reset_reason == Some(BootReason::FirewallViolation) {
        log.print("previous reset was caused by a firewall violation");
    }

    let mut fw_device_id_buf = [0u8; FwDeviceId::MAX_SIZE];
    let existing_device_id: Option<FwDeviceId> =
        read_record(flash, regions.fw_device_id, &mut fw_device_id_buf);
    let state = match &existing_device_id {
        Some(r) if r.magic == MAGIC => IdentityState::HaveIdentity,
        _ => IdentityState::NeedIdentity,
    };

    let mut generate_certs = false;
    let device_id = match state {
        IdentityState::NeedIdentity => {
            let mut cdi = [0u8; 32];
            rng.fill(&mut cdi);
            let (pub_key, priv_key) = ecc.derive_key(&cdi, b"Identity");
            let record = FwDeviceId {
                magic: MAGIC,
                pub_key,
                priv_key,
            };
            write_record(flash, regions.fw_device_id, &mut fw_device_id_buf, &record)?;
            generate_certs = true;
            record
        }
        IdentityState::HaveIdentity => existing_device_id.expect("checked above"),
    };

    let mut issued_buf = [0u8; IssuedCerts::MAX_SIZE];
    let existing_issued: Option<IssuedCerts> = read_record(flash, regions.issued_certs, &mut issued_buf);
    let issued_valid = existing_issued.as_ref().is_some_and(|r| r.is_valid());

    let issued = if generate_certs || !issued_valid {
        log.print("issued-certs: bootstrapping self-signed device certificate");
        let mut serial = [0u8; SERIAL_LEN];
        kdf.derive(&device_id.pub_key, b"Serial", &mut serial);
        sanitize_serial(&mut serial);

        let mut der_buf = [0u8; 1024];
        let der_len = x509::finalize(&mut der_buf, hash, ecc, &device_id.priv_key, |w| {
            x509::build_tbs(
                w,
                &TbsParams {
                    serial: &serial,
                    issuer_cn: "CyReP Device",
                    issuer_org: "Microsoft",
                    issuer_country: "US",
                    not_before: &NOT_BEFORE,
                    not_after: &NOT_AFTER,
                    subject_cn: "CyReP Device",
                    subject_org: "Microsoft",
                    subject_country: "US",
                    subject_pub: &device_id.pub_key,
                    kind: CertKind::Device {
                        external_root: false,
                    },
                    issuer_pub_sha1: None,
                    riot: None,
                },
            )
        })?;

        let mut record = IssuedCerts {
            magic: MAGIC,
            flags: IssuedFlags::PROVISIONED,
            code_auth_pub: [0u8; PUB_LEN],
            cert_table: Default::default(),
            cert_bag: [0xFFu8; crate::layout::CERT_BAG_LEN],
        };
        let mut pem_buf = [0u8; 2048];
        let pem_len = crate::pem::der_to_pem(&der_buf[..der_len], crate::pem::LABEL_CERTIFICATE, &mut pem_buf)
            .map_err(|_| BootError::CertStoreOverflow)?;
        record.cert_bag[..pem_len].copy_from_slice(&pem_buf[..pem_len]);
        record.cert_table[ISSUED_SLOT_DEVICE] = crate::layout::CertTableEntry {
            start: 0,
            size: pem_len as u16,
        };

        write_record(flash, regions.issued_certs, &mut issued_buf, &record)?;
        record
    } else {
        existing_issued.expect("checked above")
    };

    let mut agent_hdr_buf = [0u8; AgentHdr::MAX_SIZE];
    let agent_hdr: AgentHdr =
        read_record(flash, regions.agent_hdr, &mut agent_hdr_buf).ok_or(BootError::HeaderInvalid)?;

    if agent_hdr.sign.hdr.magic != MAGIC || agent_hdr.sign.hdr.version > crate::layout::BARNACLE_VERSION {
        return Err(BootError::HeaderInvalid);
    }
    if regions.agent_hdr.base + agent_hdr.sign.hdr.size as usize != regions.agent_code.base {
        return Err(BootError::LayoutMismatch);
    }

    let agent_size = agent_hdr.sign.agent.size as usize;
    if agent_size > AGENT_CODE_MAX {
        return Err(BootError::LayoutMismatch);
    }
    let mut code_buf = [0u8; AGENT_CODE_MAX];
    flash.read(regions.agent_code, &mut code_buf[..agent_size]);
    let code_digest = hash.sha256(&code_buf[..agent_size]);
    if code_digest != agent_hdr.sign.agent.digest {
        return Err(BootError::CodeDigestMismatch);
    }

    let (sign_bytes, sign_len) = agent_hdr.sign.to_bytes();
    let d = hash.sha256(&sign_bytes[..sign_len]);

    let auth_boot_enabled = IssuedFlags::has(issued.flags, IssuedFlags::PROVISIONED)
        && IssuedFlags::has(issued.flags, IssuedFlags::AUTHENTICATED_BOOT)
        && issued.code_auth_pub != [0u8; PUB_LEN];
    if auth_boot_enabled {
        let sig = crate::primitives::Signature {
            r: agent_hdr.signature_r,
            s: agent_hdr.signature_s,
        };
        if !ecc.verify(&d, &sig, &issued.code_auth_pub) {
            return Err(BootError::AuthBootSignatureInvalid);
        }
    }

    let mut fw_cache_buf = [0u8; FwCache::MAX_SIZE];
    let existing_cache: Option<FwCache> = read_record(flash, regions.fw_cache, &mut fw_cache_buf);
    let cache_valid = existing_cache.as_ref().is_some_and(|c| c.is_valid());

    if let Some(cache) = existing_cache.as_ref().filter(|_| cache_valid) {
        let rolled_back = cache.last_version >= agent_hdr.sign.agent.version
            || cache.last_issued >= agent_hdr.sign.agent.issued;
        if rolled_back {
            match policy {
                RollbackPolicy::Warn => log.print("rollback detected: proceeding (warn mode)"),
                RollbackPolicy::Enforce => return Err(BootError::RollbackDetected),
            }
        }
    }

    let cache = if !cache_valid || existing_cache.as_ref().unwrap().agent_hdr_digest != d {
        log.print("agent digest changed: deriving new compound key and alias certificate");
        let (compound_pub, compound_priv) = ecc.derive_key(&d, b"Identity");

        let mut serial = [0u8; SERIAL_LEN];
        kdf.derive(&compound_pub, b"Serial", &mut serial);
        sanitize_serial(&mut serial);

        let devid_sha1 = hash.sha1(&device_id.pub_key);
        let agent_name = trimmed_name(&agent_hdr.sign.agent.name);

        let mut der_buf = [0u8; 1024];
        let der_len = x509::finalize(&mut der_buf, hash, ecc, &device_id.priv_key, |w| {
            x509::build_tbs(
                w,
                &TbsParams {
                    serial: &serial,
                    issuer_cn: "CyReP Device",
                    issuer_org: "Microsoft",
                    issuer_country: "US",
                    not_before: &NOT_BEFORE,
                    not_after: &NOT_AFTER,
                    subject_cn: agent_name,
                    subject_org: "Microsoft",
                    subject_country: "US",
                    subject_pub: &compound_pub,
                    kind: CertKind::Alias,
                    issuer_pub_sha1: Some(&devid_sha1),
                    riot: Some((&device_id.pub_key, &agent_hdr.sign.agent.digest)),
                },
            )
        })?;

        let mut pem_buf = [0u8; 1024];
        let pem_len = crate::pem::der_to_pem(&der_buf[..der_len], crate::pem::LABEL_CERTIFICATE, &mut pem_buf)
            .map_err(|_| BootError::CertStoreOverflow)?;

        let mut cert = [0u8; crate::layout::COMPOUND_CERT_LEN];
        cert[..pem_len].copy_from_slice(&pem_buf[..pem_len]);

        let record = FwCache {
            magic: MAGIC,
            last_issued: agent_hdr.sign.agent.issued,
            last_version: agent_hdr.sign.agent.version,
            agent_hdr_digest: d,
            compound_pub,
            compound_priv,
            compound_cert_size: pem_len as u16,
            cert,
        };
        write_record(flash, regions.fw_cache, &mut fw_cache_buf, &record)?;
        record
    } else {
        existing_cache.expect("checked valid above")
    };

    let mut cert_store = CertStore::zeroed();
    if IssuedFlags::has(issued.flags, IssuedFlags::PROVISIONED) {
        if let Some(root_pem) = issued.slot(ISSUED_SLOT_ROOT) {
            cert_store.append(CERTSTORE_SLOT_ROOT, root_pem)?;
        }
    }
    if let Some(device_pem) = issued.slot(ISSUED_SLOT_DEVICE) {
        cert_store.append(CERTSTORE_SLOT_DEVICE, device_pem)?;
    }
    cert_store.append(CERTSTORE_SLOT_LOADER, cache.cert_pem())?;

    let mut cert_store_buf = [0u8; CertStore::MAX_SIZE];
    let n = hubpack::serialize(&mut cert_store_buf, &cert_store).map_err(|_| BootError::CertStoreOverflow)?;
    handoff.write(regions.cert_store, &cert_store_buf[..n]);

    let compound_id = CompoundId {
        magic: MAGIC,
        pub_key: cache.compound_pub,
        priv_key: cache.compound_priv,
    };
    let mut compound_id_buf = [0u8; CompoundId::MAX_SIZE];
    let n = hubpack::serialize(&mut compound_id_buf, &compound_id).map_err(|_| BootError::CertStoreOverflow)?;
    handoff.write(regions.compound_id, &compound_id_buf[..n]);

    firewall.lock(&[regions.fw_device_id, regions.fw_cache]);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{RegionHandle, AGENT_NAME_LEN};
    use crate::testutil::{FakeCrypto, FakeFirewall, FakeFlash, FakeHandoff, FakeRng};

    fn test_regions() -> Regions {
        let mut base = 0x1000usize;
        let mut handle = |len: usize| {
            let r = RegionHandle { base, len };
            base += len + 0x100;
            r
        };
        Regions {
            fw_device_id: handle(FwDeviceId::MAX_SIZE),
            issued_certs: handle(IssuedCerts::MAX_SIZE),
            fw_cache: handle(FwCache::MAX_SIZE),
            agent_hdr: handle(AgentHdr::MAX_SIZE),
            agent_code: handle(4096),
            compound_id: handle(CompoundId::MAX_SIZE),
            cert_store: handle(CertStore::MAX_SIZE),
        }
    }

    fn seed_agent(flash: &mut FakeFlash, regions: &Regions, hash: &FakeCrypto, code: &[u8], version: u32, issued: u32) {
        let digest = hash.sha256(code);
        let mut name = [0u8; AGENT_NAME_LEN];
        name[..5].copy_from_slice(b"agent");

        let hdr = AgentHdr {
            sign: crate::layout::Signable {
                hdr: crate::layout::HdrInfo {
                    magic: MAGIC,
                    version: 1,
                    size: (regions.agent_code.base - regions.agent_hdr.base) as u16,
                },
                agent: crate::layout::AgentInfo {
                    name,
                    version,
                    issued,
                    size: code.len() as u32,
                    digest,
                },
            },
            signature_r: [0u8; crate::x509::COORD_LEN],
            signature_s: [0u8; crate::x509::COORD_LEN],
        };

        let mut buf = [0u8; AgentHdr::MAX_SIZE];
        let n = hubpack::serialize(&mut buf, &hdr).unwrap();
        flash.seed(regions.agent_hdr, &buf[..n]);
        flash.seed(regions.agent_code, code);
    }

    /// Like `seed_agent`, but signs the header digest with `signing_key`
    /// instead of leaving `signature_r`/`signature_s` zeroed, so
    /// authenticated-boot verification has something to check.
    fn seed_agent_signed(
        flash: &mut FakeFlash,
        regions: &Regions,
        crypto: &FakeCrypto,
        code: &[u8],
        version: u32,
        issued: u32,
        signing_key: &crate::primitives::PrivKey,
    ) {
        let digest = crypto.sha256(code);
        let mut name = [0u8; AGENT_NAME_LEN];
        name[..5].copy_from_slice(b"agent");

        let sign = crate::layout::Signable {
            hdr: crate::layout::HdrInfo {
                magic: MAGIC,
                version: 1,
                size: (regions.agent_code.base - regions.agent_hdr.base) as u16,
            },
            agent: crate::layout::AgentInfo {
                name,
                version,
                issued,
                size: code.len() as u32,
                digest,
            },
        };
        let (sign_bytes, sign_len) = sign.to_bytes();
        let d = crypto.sha256(&sign_bytes[..sign_len]);
        let sig = crypto.sign(&d, signing_key);

        let hdr = AgentHdr {
            sign,
            signature_r: sig.r,
            signature_s: sig.s,
        };

        let mut buf = [0u8; AgentHdr::MAX_SIZE];
        let n = hubpack::serialize(&mut buf, &hdr).unwrap();
        flash.seed(regions.agent_hdr, &buf[..n]);
        flash.seed(regions.agent_code, code);
    }

    /// Pre-seeds a valid device identity so `boot` takes the warm-start path
    /// (`IdentityState::HaveIdentity`) instead of provisioning a fresh one.
    fn seed_device_id(flash: &mut FakeFlash, regions: &Regions, crypto: &FakeCrypto) {
        let (pub_key, priv_key) = crypto.derive_key(&[0x77u8; 32], b"Identity");
        let record = FwDeviceId {
            magic: MAGIC,
            pub_key,
            priv_key,
        };
        let mut buf = [0u8; FwDeviceId::MAX_SIZE];
        let n = hubpack::serialize(&mut buf, &record).unwrap();
        flash.seed(regions.fw_device_id, &buf[..n]);
    }

    /// Pre-seeds an `IssuedCerts` record with authenticated boot turned on,
    /// so `boot` takes the existing-issued-certs path instead of
    /// bootstrapping a fresh self-signed record (which always starts with
    /// `AUTHENTICATED_BOOT` off and a zero `code_auth_pub`).
    fn seed_issued_certs_auth_boot(flash: &mut FakeFlash, regions: &Regions, code_auth_pub: crate::primitives::PubKey) {
        let record = IssuedCerts {
            magic: MAGIC,
            flags: IssuedFlags::PROVISIONED | IssuedFlags::AUTHENTICATED_BOOT,
            code_auth_pub,
            cert_table: Default::default(),
            cert_bag: [0xFFu8; crate::layout::CERT_BAG_LEN],
        };
        let mut buf = [0u8; IssuedCerts::MAX_SIZE];
        let n = hubpack::serialize(&mut buf, &record).unwrap();
        flash.seed(regions.issued_certs, &buf[..n]);
    }

    struct Harness {
        flash: FakeFlash,
        handoff: FakeHandoff,
        firewall: FakeFirewall,
        rng: FakeRng,
        crypto: FakeCrypto,
        regions: Regions,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                flash: FakeFlash::new(),
                handoff: FakeHandoff::new(),
                firewall: FakeFirewall::new(),
                rng: FakeRng::new(0x42),
                crypto: FakeCrypto::new(),
                regions: test_regions(),
            }
        }

        fn boot(&mut self, policy: RollbackPolicy) -> Result<(), BootError> {
            let mut log = crate::log::NullLog;
            boot(
                &mut self.flash,
                &mut self.handoff,
                &mut self.firewall,
                &mut self.rng,
                &self.crypto,
                &self.crypto,
                &self.crypto,
                &mut log,
                self.regions,
                policy,
                None,
            )
        }
    }

    fn read_cert_store(h: &Harness) -> CertStore {
        let bytes = h.handoff.region(h.regions.cert_store);
        hubpack::deserialize::<CertStore>(bytes).unwrap().0
    }

    #[test]
    fn s1_cold_boot_provisions_identity_and_certs() {
        let mut h = Harness::new();
        let code = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code, 1, 1);

        h.boot(RollbackPolicy::Enforce).expect("cold boot succeeds");

        let store = read_cert_store(&h);
        assert!(store.cert_table[CERTSTORE_SLOT_DEVICE].size > 0);
        assert!(store.cert_table[CERTSTORE_SLOT_LOADER].size > 0);
        assert_eq!(store.cert_table[CERTSTORE_SLOT_ROOT].size, 0);
    }

    #[test]
    fn s2_warm_boot_unchanged_agent_is_idempotent() {
        let mut h = Harness::new();
        let code = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code, 1, 1);
        h.boot(RollbackPolicy::Enforce).unwrap();
        let first = read_cert_store(&h);

        h.boot(RollbackPolicy::Enforce).unwrap();
        let second = read_cert_store(&h);

        assert_eq!(first.cert_bag[..], second.cert_bag[..]);
    }

    #[test]
    fn s3_updated_agent_rewrites_loader_cert() {
        let mut h = Harness::new();
        let code_v1 = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code_v1, 1, 1);
        h.boot(RollbackPolicy::Enforce).unwrap();
        let first = read_cert_store(&h);

        let code_v2 = [0xCDu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code_v2, 2, 2);
        h.boot(RollbackPolicy::Enforce).unwrap();
        let second = read_cert_store(&h);

        assert_ne!(first.cert_bag[..], second.cert_bag[..]);
    }

    #[test]
    fn s4_auth_boot_wrong_signature_halts_before_flash_writes() {
        let mut h = Harness::new();
        seed_device_id(&mut h.flash, &h.regions, &h.crypto);
        let (code_auth_pub, _code_auth_priv) = h.crypto.derive_key(&[0xAAu8; 32], b"CodeAuth");
        seed_issued_certs_auth_boot(&mut h.flash, &h.regions, code_auth_pub);

        let code = [0xABu8; 256];
        let (_wrong_pub, wrong_priv) = h.crypto.derive_key(&[0xBBu8; 32], b"CodeAuth");
        seed_agent_signed(&mut h.flash, &h.regions, &h.crypto, &code, 1, 1, &wrong_priv);

        let fw_cache_before = h.flash.mem_at(h.regions.fw_cache).to_vec();
        let handoff_before = h.handoff.region(h.regions.cert_store).to_vec();

        let result = h.boot(RollbackPolicy::Enforce);
        assert_eq!(result, Err(BootError::AuthBootSignatureInvalid));

        assert_eq!(h.flash.mem_at(h.regions.fw_cache).to_vec(), fw_cache_before);
        assert_eq!(h.handoff.region(h.regions.cert_store).to_vec(), handoff_before);
    }

    #[test]
    fn s5_rollback_warn_mode_proceeds() {
        let mut h = Harness::new();
        let code_v2 = [0xCDu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code_v2, 2, 2);
        h.boot(RollbackPolicy::Enforce).unwrap();

        let code_v1 = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code_v1, 1, 1);
        let result = h.boot(RollbackPolicy::Warn);
        assert!(result.is_ok());
    }

    #[test]
    fn s5_rollback_enforce_mode_halts() {
        let mut h = Harness::new();
        let code_v2 = [0xCDu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code_v2, 2, 2);
        h.boot(RollbackPolicy::Enforce).unwrap();

        let code_v1 = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code_v1, 1, 1);
        let result = h.boot(RollbackPolicy::Enforce);
        assert_eq!(result, Err(BootError::RollbackDetected));
    }

    #[test]
    fn s6_tampered_agent_code_halts_before_mutation() {
        let mut h = Harness::new();
        let code = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code, 1, 1);
        h.boot(RollbackPolicy::Enforce).unwrap();

        let mut tampered = code;
        tampered[0] ^= 0xFF;
        h.flash.seed(h.regions.agent_code, &tampered);

        let result = h.boot(RollbackPolicy::Enforce);
        assert_eq!(result, Err(BootError::CodeDigestMismatch));
    }

    #[test]
    fn s6_tampered_agent_header_sign_halts_before_mutation() {
        // Property 7's other half: flipping a byte of `AgentHdr.sign` (not
        // `AgentCode`) must also be caught before anything else happens.
        // `agent.digest` no longer matches the untouched code, so this
        // surfaces as the same pre-mutation `CodeDigestMismatch` halt.
        let mut h = Harness::new();
        let code = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code, 1, 1);
        h.boot(RollbackPolicy::Enforce).unwrap();

        let mut hdr_buf = [0u8; AgentHdr::MAX_SIZE];
        let mut hdr: AgentHdr = read_record(&h.flash, h.regions.agent_hdr, &mut hdr_buf).unwrap();
        hdr.sign.agent.digest[0] ^= 0xFF;
        let mut buf = [0u8; AgentHdr::MAX_SIZE];
        let n = hubpack::serialize(&mut buf, &hdr).unwrap();
        h.flash.seed(h.regions.agent_hdr, &buf[..n]);

        let result = h.boot(RollbackPolicy::Enforce);
        assert_eq!(result, Err(BootError::CodeDigestMismatch));
    }

    #[test]
    fn determinism_of_compound_key_derivation() {
        let h1_key = {
            let crypto = FakeCrypto::new();
            crypto.derive_key(&[0x11u8; 32], b"Identity")
        };
        let h2_key = {
            let crypto = FakeCrypto::new();
            crypto.derive_key(&[0x11u8; 32], b"Identity")
        };
        assert_eq!(h1_key.0, h2_key.0);
        assert_eq!(h1_key.1, h2_key.1);
    }

    #[test]
    fn serial_sanitization_clears_sign_bit_and_sets_low_bit() {
        let mut serial = [0xFFu8; SERIAL_LEN];
        sanitize_serial(&mut serial);
        assert_eq!(serial[0] & 0x80, 0);
        assert_eq!(serial[0] & 0x01, 0x01);

        let mut serial = [0x00u8; SERIAL_LEN];
        sanitize_serial(&mut serial);
        assert_eq!(serial[0] & 0x80, 0);
        assert_eq!(serial[0] & 0x01, 0x01);
    }

    #[test]
    fn header_with_bad_magic_is_rejected() {
        let mut h = Harness::new();
        let code = [0xABu8; 256];
        seed_agent(&mut h.flash, &h.regions, &h.crypto, &code, 1, 1);

        h.flash.seed(h.regions.agent_hdr, &[0u8; 4]);

        let result = h.boot(RollbackPolicy::Enforce);
        assert_eq!(result, Err(BootError::HeaderInvalid));
    }
}
