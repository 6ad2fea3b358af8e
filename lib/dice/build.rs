// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reads an optional `dice.toml` from the crate root and emits a small
//! generated module pinning the build-time default rollback policy, the
//! one product decision in `spec` §9 that isn't already expressed as a
//! Cargo feature (curve selection is; see the `curve-p256`/`curve-p384`/
//! `curve-p521` features instead).

use serde::Deserialize;
use std::{env, fs, path::Path};

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    rollback_policy: Option<String>,
}

fn main() {
    println!("cargo:rerun-if-changed=dice.toml");

    let raw = fs::read_to_string("dice.toml").unwrap_or_default();
    let cfg: Config = toml::from_str(&raw).unwrap_or_default();

    let enforce = match cfg.rollback_policy.as_deref() {
        Some("warn") => false,
        Some("enforce") | None => true,
        Some(other) => panic!("dice.toml: unknown rollback_policy {other:?}"),
    };

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR");
    let dest = Path::new(&out_dir).join("config.rs");
    fs::write(
        dest,
        format!("pub const ROLLBACK_ENFORCE_DEFAULT: bool = {enforce};\n"),
    )
    .expect("write config.rs");
}
