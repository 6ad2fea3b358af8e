// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware RNG, called exactly once per device lifetime at first-boot
//! provisioning (`spec` §5).

use dice::Rng;
use lpc55_pac::RNG;

pub struct Lpc55Rng {
    rng: RNG,
}

impl Lpc55Rng {
    pub fn new(rng: RNG) -> Self {
        Self { rng }
    }
}

impl Rng for Lpc55Rng {
    fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(4) {
            while self.rng.counter_val.read().bits() == 0 {
                cortex_m::asm::nop();
            }
            let word = self.rng.random_number.read().bits().to_ne_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}
