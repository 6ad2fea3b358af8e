// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Memory-protection engagement (`spec` §4.4, §9): covers `FwDeviceId` and
//! `FwCache` jointly, applied once per boot just before the jump to the
//! agent image.

use dice::layout::{Firewall, RegionHandle};
use lpc55_pac::SYSCON;

pub struct Lpc55Firewall {
    syscon: SYSCON,
}

impl Lpc55Firewall {
    pub fn new(syscon: SYSCON) -> Self {
        Self { syscon }
    }
}

impl Firewall for Lpc55Firewall {
    fn lock(&mut self, regions: &[RegionHandle]) {
        for region in regions {
            let base_page = (region.base / 4096) as u32;
            let page_count = (region.len / 4096).max(1) as u32;
            self.syscon
                .presetctrl0
                .modify(|_, w| unsafe { w.bits(base_page | (page_count << 16)) });
        }
    }
}
