// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot entry point: wires the linker-placed regions and board peripherals
//! to the identity engine and jumps to the agent image on success.

#![no_std]
#![no_main]

mod crypto;
mod firewall;
mod flash;
mod log;
mod rng;

use cortex_m_rt::entry;
use panic_semihosting as _;
use dice::engine::{self, RollbackPolicy};
use dice::layout::{RegionHandle, Regions, AGENT_CODE_MAX};

use crate::crypto::Lpc55Crypto;
use crate::firewall::Lpc55Firewall;
use crate::flash::Lpc55Flash;
use crate::log::SwoLog;
use crate::rng::Lpc55Rng;

// Supplied by the linker script; each symbol marks the start of the named
// section. Sizes are fixed by the same script (`spec` §9 region-handle
// note: the core takes region handles, not globals, but something has to
// resolve the addresses, and that's here).
extern "C" {
    static __fw_device_id_start: u8;
    static __issued_certs_start: u8;
    static __fw_cache_start: u8;
    static __agent_hdr_start: u8;
    static __agent_code_start: u8;
    static __compound_id_start: u8;
    static __cert_store_start: u8;
}

const FW_DEVICE_ID_LEN: usize = 4096;
const ISSUED_CERTS_LEN: usize = 4096;
const FW_CACHE_LEN: usize = 2048;
const AGENT_HDR_LEN: usize = 512;
// Matches the engine's own read/digest cap so a legitimately-sized agent
// image is never rejected purely for not fitting an unrelated constant.
const AGENT_CODE_LEN: usize = AGENT_CODE_MAX;
const COMPOUND_ID_LEN: usize = 256;
const CERT_STORE_LEN: usize = 4096;

fn regions() -> Regions {
    unsafe {
        Regions {
            fw_device_id: RegionHandle {
                base: &__fw_device_id_start as *const u8 as usize,
                len: FW_DEVICE_ID_LEN,
            },
            issued_certs: RegionHandle {
                base: &__issued_certs_start as *const u8 as usize,
                len: ISSUED_CERTS_LEN,
            },
            fw_cache: RegionHandle {
                base: &__fw_cache_start as *const u8 as usize,
                len: FW_CACHE_LEN,
            },
            agent_hdr: RegionHandle {
                base: &__agent_hdr_start as *const u8 as usize,
                len: AGENT_HDR_LEN,
            },
            agent_code: RegionHandle {
                base: &__agent_code_start as *const u8 as usize,
                len: AGENT_CODE_LEN,
            },
            compound_id: RegionHandle {
                base: &__compound_id_start as *const u8 as usize,
                len: COMPOUND_ID_LEN,
            },
            cert_store: RegionHandle {
                base: &__cert_store_start as *const u8 as usize,
                len: CERT_STORE_LEN,
            },
        }
    }
}

#[entry]
fn main() -> ! {
    let peripherals = lpc55_pac::Peripherals::take().expect("peripherals already taken");

    let mut flash = Lpc55Flash::new(peripherals.FLASH);
    let mut firewall = Lpc55Firewall::new(peripherals.SYSCON);
    let mut rng = Lpc55Rng::new(peripherals.RNG);
    let crypto = Lpc55Crypto;
    let mut log = SwoLog;
    let mut ram_handoff = RamHandoff;

    // TODO: decode the AHB secure-fault status register to distinguish a
    // firewall-violation reset from a plain power-on; not yet wired up.
    let reset_reason = None;

    match engine::boot(
        &mut flash,
        &mut ram_handoff,
        &mut firewall,
        &mut rng,
        &crypto,
        &crypto,
        &crypto,
        &mut log,
        regions(),
        RollbackPolicy::default(),
        reset_reason,
    ) {
        Ok(()) => {
            let agent_code = unsafe { &__agent_code_start as *const u8 };
            unsafe { jump_to_agent(agent_code) }
        }
        Err(_) => panic!("identity engine failed; halting"),
    }
}

/// Writes directly into the fixed handoff RAM region rather than copying
/// through an intermediate buffer; the region is owned exclusively by the
/// core until the jump below.
struct RamHandoff;

impl dice::layout::Handoff for RamHandoff {
    fn write(&mut self, region: RegionHandle, data: &[u8]) {
        let dst = region.base as *mut u8;
        for (i, b) in data.iter().enumerate() {
            unsafe { core::ptr::write_volatile(dst.add(i), *b) };
        }
    }
}

unsafe fn jump_to_agent(entry: *const u8) -> ! {
    let sp = core::ptr::read_volatile(entry as *const u32);
    let reset = core::ptr::read_volatile(entry.add(4) as *const u32);
    cortex_m::register::msp::write(sp);
    let reset_fn: extern "C" fn() -> ! = core::mem::transmute(reset);
    reset_fn()
}
