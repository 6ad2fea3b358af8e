// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `swoPrint` (`spec` §6): a diagnostic sink, not a logging framework. The
//! engine calls this immediately before its first failure exit and at a
//! handful of informational points (rollback warnings, cache hits/misses).

pub trait LogSink {
    fn print(&mut self, msg: &str);
}

/// Discards everything. Used by tests that don't care about diagnostics.
pub struct NullLog;

impl LogSink for NullLog {
    fn print(&mut self, _msg: &str) {}
}
