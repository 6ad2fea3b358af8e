// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SWO diagnostic sink (`spec` §6 `swoPrint`), backed by semihosting since
//! this board support package has no dedicated SWO driver.

use cortex_m_semihosting::hprintln;
use dice::log::LogSink;

pub struct SwoLog;

impl LogSink for SwoLog {
    fn print(&mut self, msg: &str) {
        let _ = hprintln!("{}", msg);
    }
}
