// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side `Hash`/`Kdf`/`Ecc` wiring over the RustCrypto P-256 stack,
//! mirroring the board support package's `Lpc55Crypto` so the same engine
//! code runs identically off-device.

use dice::{Digest, Ecc, Hash, Kdf, PrivKey, PubKey, Signature};
use ecdsa::signature::{digest::Digest as _, Signer};
use hmac::{Hmac, Mac, NewMac};
use p256::ecdsa::{SigningKey, VerifyingKey};
use sha2::Sha256;

pub struct HostCrypto;

impl HostCrypto {
    pub fn new() -> Self {
        Self
    }
}

impl Hash for HostCrypto {
    fn sha256(&self, input: &[u8]) -> Digest {
        Sha256::digest(input).into()
    }

    fn sha1(&self, input: &[u8]) -> [u8; 20] {
        sha1::Sha1::digest(input).into()
    }
}

impl Kdf for HostCrypto {
    fn derive(&self, ikm: &[u8], label: &[u8], out: &mut [u8]) {
        let mut mac = Hmac::<Sha256>::new_from_slice(ikm).expect("hmac key");
        mac.update(label);
        let digest = mac.finalize().into_bytes();
        let n = out.len().min(digest.len());
        out[..n].copy_from_slice(&digest[..n]);
    }
}

impl Ecc for HostCrypto {
    fn derive_key(&self, seed: &[u8], label: &[u8]) -> (PubKey, PrivKey) {
        let mut scalar = [0u8; 32];
        self.derive(seed, label, &mut scalar);
        let signing_key = SigningKey::from_bytes(&scalar).expect("derived scalar in range");
        let verifying_key = VerifyingKey::from(&signing_key);
        let point = verifying_key.to_encoded_point(false);
        let mut pub_key = [0u8; 64];
        pub_key.copy_from_slice(&point.as_bytes()[1..]);
        (pub_key, scalar)
    }

    fn sign(&self, digest: &Digest, priv_key: &PrivKey) -> Signature {
        let signing_key = SigningKey::from_bytes(priv_key).expect("valid signing key");
        let sig: p256::ecdsa::Signature = signing_key.sign(digest);
        let (r, s) = sig.split_bytes();
        let mut out = Signature::default();
        out.r.copy_from_slice(&r);
        out.s.copy_from_slice(&s);
        out
    }

    fn verify(&self, digest: &Digest, sig: &Signature, pub_key: &PubKey) -> bool {
        use ecdsa::signature::Verifier;
        use p256::elliptic_curve::sec1::FromEncodedPoint;

        let mut encoded = [0u8; 65];
        encoded[0] = 0x04;
        encoded[1..].copy_from_slice(pub_key);
        let point = match p256::EncodedPoint::from_bytes(encoded) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let verifying_key = match Option::<p256::AffinePoint>::from(p256::AffinePoint::from_encoded_point(&point))
            .and_then(|affine| VerifyingKey::from_encoded_point(&affine.into()).ok())
        {
            Some(k) => k,
            None => return false,
        };

        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&sig.r);
        raw[32..].copy_from_slice(&sig.s);
        let signature = match p256::ecdsa::Signature::try_from(&raw[..]) {
            Ok(s) => s,
            Err(_) => return false,
        };
        verifying_key.verify(digest, &signature).is_ok()
    }
}
