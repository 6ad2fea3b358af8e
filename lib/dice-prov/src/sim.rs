// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side stand-ins for the board's flash, handoff RAM, firewall and RNG,
//! so the identity engine can run unmodified against a scratch in-memory
//! image instead of real hardware.

use dice::layout::{Firewall, Flash, Handoff, RegionHandle};
use dice::primitives::Rng;
use rand::RngCore;

pub struct SimFlash {
    mem: Vec<u8>,
}

impl SimFlash {
    pub fn new(len: usize) -> Self {
        Self {
            mem: vec![0xFFu8; len],
        }
    }

    pub fn seed(&mut self, region: RegionHandle, data: &[u8]) {
        self.mem[region.base..region.base + data.len()].copy_from_slice(data);
    }
}

impl Flash for SimFlash {
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

pub struct SimHandoff {
    mem: Vec<u8>,
}

impl SimHandoff {
    pub fn new(len: usize) -> Self {
        Self { mem: vec![0u8; len] }
    }

    pub fn region(&self, region: RegionHandle) -> &[u8] {
        &self.mem[region.base..region.base + region.len]
    }
}

impl Handoff for SimHandoff {
    fn write(&mut self, region: RegionHandle, data: &[u8]) {
        self.mem[region.base..region.base + data.len()].copy_from_slice(data);
    }
}

#[derive(Default)]
pub struct SimFirewall {
    pub locked: Vec<RegionHandle>,
}

impl Firewall for SimFirewall {
    fn lock(&mut self, regions: &[RegionHandle]) {
        self.locked.extend_from_slice(regions);
    }
}

pub struct SimRng;

impl SimRng {
    pub fn new() -> Self {
        Self
    }
}

impl Rng for SimRng {
    fn fill(&mut self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }
}
