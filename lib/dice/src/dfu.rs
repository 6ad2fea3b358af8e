// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DFU mode string construction (`spec` §6), grounded in the reference's
//! `BarnacleGetDfuStr`. Pure formatting over the persistent layout's own
//! constants; it has no hardware dependency, so unlike the DFU USB
//! device-class stack itself (a genuine external collaborator) there is no
//! reason to leave it unimplemented.

use core::fmt::Write;
use heapless::String;

use crate::layout::IssuedFlags;

/// Worst-case length: a `"@Barnacle /0x########/"` header (19 bytes), one
/// `"NN*004Kf,"` segment (9 bytes) per 99 pages, and a trailing
/// `"01*04K{a|g}"` (11 bytes). Sized for agent regions up to ~4MB
/// (1024 pages, 11 segments); raise it if a larger region is ever mapped.
const DFU_STRING_CAP: usize = 19 + 11 * 9 + 11;

/// `"@Barnacle /0x<hex-base>/NN*004Kf,NN*004Kf,...,01*04K{a|g}"`. Each
/// `NN*004Kf,` segment covers at most 99 pages, so `page_count > 99`
/// produces multiple segments, matching `BarnacleGetDfuStr`'s chunking loop.
pub fn dfu_string(
    flash_base: usize,
    page_count: u32,
    issued_flags: u8,
) -> String<DFU_STRING_CAP> {
    let mut s = String::new();
    let _ = write!(s, "@Barnacle /0x{:08X}/", flash_base);

    let mut remaining = page_count;
    while remaining > 0 {
        let chunk = remaining.min(99);
        let _ = write!(s, "{:02}*004Kf,", chunk);
        remaining -= chunk;
    }

    let last = if IssuedFlags::has(issued_flags, IssuedFlags::WRITELOCK) {
        'a'
    } else {
        'g'
    };
    let _ = write!(s, "01*04K{}", last);
    s
}
