// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side tooling for exercising the identity engine off-device. Plays
//! the same role as a serial-port cert fetcher would on real hardware
//! (see the reference `get-cert` binary this is modeled on), but drives
//! the engine directly against an in-memory flash image instead of a
//! physical device.

mod crypto;
mod sim;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dice::engine::{self, RollbackPolicy};
use dice::layout::{CertStore, RegionHandle, Regions};

use crate::crypto::HostCrypto;
use crate::sim::{SimFirewall, SimFlash, SimHandoff, SimRng};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
enum Args {
    /// Run a cold-boot provisioning cycle against a scratch flash image and
    /// dump the resulting certificate chain.
    Demo {
        /// Directory to write the device/alias/chain PEM files into.
        #[clap(long, default_value = "dice-demo-out")]
        out_dir: PathBuf,

        /// Bytes of the agent image to measure (a deterministic filler
        /// pattern is used when omitted).
        #[clap(long)]
        agent_image: Option<PathBuf>,

        /// Treat a detected rollback as fatal instead of logging it.
        #[clap(long)]
        enforce_rollback: bool,
    },
}

const AGENT_NAME_LEN: usize = 32;

fn region_layout() -> (Regions, usize) {
    let mut base = 0usize;
    let mut next = |len: usize| {
        let r = RegionHandle { base, len };
        base += len;
        r
    };
    let regions = Regions {
        fw_device_id: next(4096),
        issued_certs: next(4096),
        fw_cache: next(2048),
        agent_hdr: next(512),
        agent_code: next(64 * 1024),
        compound_id: next(256),
        cert_store: next(4096),
    };
    (regions, base)
}

fn main() -> Result<()> {
    match Args::parse() {
        Args::Demo {
            out_dir,
            agent_image,
            enforce_rollback,
        } => run_demo(out_dir, agent_image, enforce_rollback),
    }
}

fn run_demo(out_dir: PathBuf, agent_image: Option<PathBuf>, enforce_rollback: bool) -> Result<()> {
    let (regions, flash_len) = region_layout();

    let code = match agent_image {
        Some(path) => fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
        None => vec![0xABu8; 4096],
    };

    let mut flash = SimFlash::new(flash_len);
    let crypto = HostCrypto::new();

    seed_agent_header(&mut flash, &regions, &crypto, &code, 1, 1)?;

    let mut handoff = SimHandoff::new(4096);
    let mut firewall = SimFirewall::default();
    let mut rng = SimRng::new();
    let mut log = StderrLog;

    let policy = if enforce_rollback {
        RollbackPolicy::Enforce
    } else {
        RollbackPolicy::Warn
    };

    engine::boot(
        &mut flash,
        &mut handoff,
        &mut firewall,
        &mut rng,
        &crypto,
        &crypto,
        &crypto,
        &mut log,
        regions,
        policy,
        None,
    )
    .map_err(|e| anyhow::anyhow!("identity engine failed: {:?}", e))?;

    fs::create_dir_all(&out_dir)?;
    let store_bytes = handoff.region(regions.cert_store);
    let (store, _): (CertStore, usize) =
        hubpack::deserialize(store_bytes).context("decoding cert store")?;

    for (name, slot) in [
        ("device", dice::layout::CERTSTORE_SLOT_DEVICE),
        ("loader", dice::layout::CERTSTORE_SLOT_LOADER),
        ("root", dice::layout::CERTSTORE_SLOT_ROOT),
    ] {
        let entry = store.cert_table[slot];
        if entry.size == 0 {
            continue;
        }
        let start = entry.start as usize;
        let end = start + entry.size as usize;
        let pem = &store.cert_bag[start..end];
        let path = out_dir.join(format!("{}.pem", name));
        fs::write(&path, pem)?;
        println!("wrote {}", path.display());
    }

    Ok(())
}

fn seed_agent_header(
    flash: &mut SimFlash,
    regions: &Regions,
    crypto: &HostCrypto,
    code: &[u8],
    version: u32,
    issued: u32,
) -> Result<()> {
    use dice::layout::{AgentHdr, AgentInfo, HdrInfo, Signable, MAGIC};
    use dice::primitives::Hash;

    let mut name = [0u8; AGENT_NAME_LEN];
    let bytes = b"agent";
    name[..bytes.len()].copy_from_slice(bytes);

    let hdr = AgentHdr {
        sign: Signable {
            hdr: HdrInfo {
                magic: MAGIC,
                version: 1,
                size: (regions.agent_code.base - regions.agent_hdr.base) as u16,
            },
            agent: AgentInfo {
                name,
                version,
                issued,
                size: code.len() as u32,
                digest: crypto.sha256(code),
            },
        },
        signature_r: [0u8; dice::x509::COORD_LEN],
        signature_s: [0u8; dice::x509::COORD_LEN],
    };

    let mut buf = [0u8; 512];
    let n = hubpack::serialize(&mut buf, &hdr).map_err(|_| anyhow::anyhow!("agent header too large"))?;
    flash.seed(regions.agent_hdr, &buf[..n]);
    flash.seed(regions.agent_code, code);
    Ok(())
}

struct StderrLog;

impl dice::log::LogSink for StderrLog {
    fn print(&mut self, msg: &str) {
        eprintln!("[dice] {}", msg);
    }
}
