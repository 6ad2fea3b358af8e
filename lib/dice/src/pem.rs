// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DER to PEM conversion: base64 armor with a 64-column hard wrap and
//! `-----BEGIN/END <label>-----` framing.

use base64::{engine::general_purpose::STANDARD, Engine};

pub const LABEL_CERTIFICATE: &str = "CERTIFICATE";
pub const LABEL_CSR: &str = "CERTIFICATE REQUEST";
pub const LABEL_EC_PRIVATE_KEY: &str = "EC PRIVATE KEY";
pub const LABEL_PUBLIC_KEY: &str = "PUBLIC KEY";

const WRAP_COLUMN: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PemError {
    Overflow,
}

/// Encodes `der` as PEM with `label`, writing into `out` and returning the
/// number of bytes written. Fails with `Overflow` rather than truncating.
pub fn der_to_pem(der: &[u8], label: &str, out: &mut [u8]) -> Result<usize, PemError> {
    let mut pos = 0;
    let mut write = |bytes: &[u8], pos: &mut usize| -> Result<(), PemError> {
        let end = pos.checked_add(bytes.len()).ok_or(PemError::Overflow)?;
        if end > out.len() {
            return Err(PemError::Overflow);
        }
        out[*pos..end].copy_from_slice(bytes);
        *pos = end;
        Ok(())
    };

    write(b"-----BEGIN ", &mut pos)?;
    write(label.as_bytes(), &mut pos)?;
    write(b"-----\n", &mut pos)?;

    let b64_len = base64_encoded_len(der.len());
    let mut scratch = [0u8; BASE64_SCRATCH_LEN];
    let b64 = if b64_len <= scratch.len() {
        let n = STANDARD
            .encode_slice(der, &mut scratch)
            .map_err(|_| PemError::Overflow)?;
        &scratch[..n]
    } else {
        return Err(PemError::Overflow);
    };

    for chunk in b64.chunks(WRAP_COLUMN) {
        write(chunk, &mut pos)?;
        write(b"\n", &mut pos)?;
    }

    write(b"-----END ", &mut pos)?;
    write(label.as_bytes(), &mut pos)?;
    write(b"-----\n", &mut pos)?;

    Ok(pos)
}

/// Upper bound on the certificates this encoder produces; sized generously
/// above the largest alias certificate so `der_to_pem` never needs a heap.
const BASE64_SCRATCH_LEN: usize = 2048;

const fn base64_encoded_len(input_len: usize) -> usize {
    (input_len + 2) / 3 * 4
}
