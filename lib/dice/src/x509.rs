// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The X.509 v3 certificate and PKCS#10 CSR profile built atop `der`.
//!
//! Field layout, OID values, and the RIoT extension shape are grounded in
//! the RIoT reference `x509bldr.c`: `X509GetDeviceCertTBS`,
//! `X509GetAliasCertTBS`, `X509GetRootCertTBS`, `X509GetDERCsrTbs`, and
//! `X509AddExtensions`.

use crate::der::{DerResult, DerWriter};
use crate::primitives::{Digest, Ecc, Hash, PrivKey, PubKey, SHA1_LEN};
use base64::{engine::general_purpose::STANDARD, Engine};

#[cfg(feature = "curve-p521")]
pub const COORD_LEN: usize = 66;
#[cfg(all(feature = "curve-p384", not(feature = "curve-p521")))]
pub const COORD_LEN: usize = 48;
#[cfg(not(any(feature = "curve-p384", feature = "curve-p521")))]
pub const COORD_LEN: usize = 32;

pub const PUB_LEN: usize = 2 * COORD_LEN;
pub const SERIAL_LEN: usize = 20;
pub const GUID_CN_LEN: usize = 24;

/// KeyUsage bit field: digitalSignature (bit 0) | keyCertSign (bit 5).
pub const KEY_USAGE: u8 = 0x84;

const ECDSA_WITH_SHA256_OID: [i32; 8] = [1, 2, 840, 10045, 4, 3, 2, -1];
const EC_PUBLIC_KEY_OID: [i32; 7] = [1, 2, 840, 10045, 2, 1, -1];
const KEY_USAGE_OID: [i32; 5] = [2, 5, 29, 15, -1];
const EXT_KEY_USAGE_OID: [i32; 5] = [2, 5, 29, 37, -1];
const AUTH_KEY_ID_OID: [i32; 5] = [2, 5, 29, 35, -1];
const BASIC_CONSTRAINTS_OID: [i32; 5] = [2, 5, 29, 19, -1];
const CLIENT_AUTH_OID_FULL: [i32; 9] = [1, 3, 6, 1, 5, 5, 7, 3, 2];
const SHA256_OID: [i32; 10] = [2, 16, 840, 1, 101, 3, 4, 2, 1, -1];
const COMMON_NAME_OID_FULL: [i32; 5] = [2, 5, 4, 3, -1];
const ORG_NAME_OID_FULL: [i32; 5] = [2, 5, 4, 10, -1];
const COUNTRY_NAME_OID_FULL: [i32; 5] = [2, 5, 4, 6, -1];
pub const RIOT_OID: [i32; 7] = [2, 23, 133, 5, 4, 1, -1];

#[cfg(feature = "curve-p521")]
fn curve_oid() -> [i32; 6] {
    [1, 3, 132, 0, 35, -1]
}
#[cfg(all(feature = "curve-p384", not(feature = "curve-p521")))]
fn curve_oid() -> [i32; 6] {
    [1, 3, 132, 0, 34, -1]
}
#[cfg(not(any(feature = "curve-p384", feature = "curve-p521")))]
fn curve_oid() -> [i32; 8] {
    [1, 2, 840, 10045, 3, 1, 7, -1]
}

#[derive(Clone, Copy)]
pub enum CertKind {
    Root,
    Device { external_root: bool },
    Alias,
}

fn add_rdn(w: &mut DerWriter, oid: &[i32], value: &str) -> DerResult<()> {
    w.start_constructed(true)?; // RelativeDistinguishedName ::= SET OF ...
    w.start_constructed(false)?; // AttributeTypeAndValue
    w.add_oid(oid)?;
    w.add_utf8_string(value)?;
    w.pop_nesting()?;
    w.pop_nesting()
}

/// X.501 name, in `{C, O, CN}` order as used throughout the reference.
pub fn build_name(w: &mut DerWriter, cn: &str, org: &str, country: &str) -> DerResult<()> {
    w.start_constructed(false)?; // Name ::= RDNSequence
    add_rdn(w, &COUNTRY_NAME_OID_FULL, country)?;
    add_rdn(w, &ORG_NAME_OID_FULL, org)?;
    add_rdn(w, &COMMON_NAME_OID_FULL, cn)?;
    w.pop_nesting()
}

pub fn build_validity(
    w: &mut DerWriter,
    not_before: &[u8; 13],
    not_after: &[u8; 13],
) -> DerResult<()> {
    w.start_constructed(false)?;
    w.add_utctime(not_before)?;
    w.add_utctime(not_after)?;
    w.pop_nesting()
}

pub fn build_spki(w: &mut DerWriter, pub_key: &PubKey) -> DerResult<()> {
    w.start_constructed(false)?; // SubjectPublicKeyInfo
    w.start_constructed(false)?; // AlgorithmIdentifier
    w.add_oid(&EC_PUBLIC_KEY_OID)?;
    w.add_oid(&curve_oid())?;
    w.pop_nesting()?;
    let mut point = [0u8; 1 + PUB_LEN];
    point[0] = 0x04;
    point[1..].copy_from_slice(pub_key);
    w.add_bit_string(&point)?;
    w.pop_nesting()
}

fn add_extension_entry<F>(w: &mut DerWriter, oid: &[i32], content: F) -> DerResult<()>
where
    F: FnOnce(&mut DerWriter) -> DerResult<()>,
{
    w.start_constructed(false)?; // Extension
    w.add_oid(oid)?;
    w.start_octet_string()?;
    content(w)?;
    w.pop_nesting()?; // close OCTET STRING
    w.pop_nesting() // close Extension
}

fn add_key_usage(w: &mut DerWriter) -> DerResult<()> {
    add_extension_entry(w, &KEY_USAGE_OID, |w| w.add_bit_string(&[KEY_USAGE]))
}

fn add_ext_key_usage(w: &mut DerWriter) -> DerResult<()> {
    add_extension_entry(w, &EXT_KEY_USAGE_OID, |w| {
        w.start_constructed(false)?;
        w.add_oid(&CLIENT_AUTH_OID_FULL)?;
        w.pop_nesting()
    })
}

fn add_auth_key_id(w: &mut DerWriter, issuer_pub_sha1: &[u8; SHA1_LEN]) -> DerResult<()> {
    add_extension_entry(w, &AUTH_KEY_ID_OID, |w| {
        w.start_constructed(false)?;
        w.add_explicit_octet_string(0, issuer_pub_sha1)?;
        w.pop_nesting()
    })
}

fn add_basic_constraints(w: &mut DerWriter, path_len: u32) -> DerResult<()> {
    add_extension_entry(w, &BASIC_CONSTRAINTS_OID, |w| {
        w.start_constructed(false)?;
        w.add_boolean(true)?;
        w.add_integer(&path_len.to_be_bytes())?;
        w.pop_nesting()
    })
}

fn add_riot_extension(w: &mut DerWriter, devid_pub: &PubKey, fwid: &Digest) -> DerResult<()> {
    add_extension_entry(w, &RIOT_OID, |w| {
        w.start_constructed(false)?; // RIoT extension body
        w.add_integer(&[1])?; // version
        build_spki(w, devid_pub)?;
        w.start_constructed(false)?; // fwid
        w.add_oid(&SHA256_OID)?;
        w.add_octet_string(fwid)?;
        w.pop_nesting()?;
        w.pop_nesting()
    })
}

#[allow(clippy::too_many_arguments)]
fn build_extensions(
    w: &mut DerWriter,
    kind: CertKind,
    issuer_pub_sha1: Option<&[u8; SHA1_LEN]>,
    riot: Option<(&PubKey, &Digest)>,
) -> DerResult<()> {
    w.start_explicit(3)?;
    w.start_constructed(false)?; // SEQUENCE OF Extension
    match kind {
        CertKind::Root => {
            add_key_usage(w)?;
            add_basic_constraints(w, 2)?;
        }
        CertKind::Device { external_root } => {
            add_key_usage(w)?;
            if external_root {
                if let Some(sha1) = issuer_pub_sha1 {
                    add_auth_key_id(w, sha1)?;
                }
            }
            add_basic_constraints(w, 1)?;
        }
        CertKind::Alias => {
            add_key_usage(w)?;
            add_ext_key_usage(w)?;
            if let Some(sha1) = issuer_pub_sha1 {
                add_auth_key_id(w, sha1)?;
            }
            if let Some((devid_pub, fwid)) = riot {
                add_riot_extension(w, devid_pub, fwid)?;
            }
        }
    }
    w.pop_nesting()?;
    w.pop_nesting()
}

pub struct TbsParams<'a> {
    pub serial: &'a [u8; SERIAL_LEN],
    pub issuer_cn: &'a str,
    pub issuer_org: &'a str,
    pub issuer_country: &'a str,
    pub not_before: &'a [u8; 13],
    pub not_after: &'a [u8; 13],
    pub subject_cn: &'a str,
    pub subject_org: &'a str,
    pub subject_country: &'a str,
    pub subject_pub: &'a PubKey,
    pub kind: CertKind,
    pub issuer_pub_sha1: Option<&'a [u8; SHA1_LEN]>,
    pub riot: Option<(&'a PubKey, &'a Digest)>,
}

pub fn build_tbs(w: &mut DerWriter, p: &TbsParams) -> DerResult<()> {
    w.start_constructed(false)?; // TBSCertificate
    w.add_explicit_integer(0, 2)?; // version v3
    w.add_integer(p.serial)?;
    w.start_constructed(false)?; // signature AlgorithmIdentifier
    w.add_oid(&ECDSA_WITH_SHA256_OID)?;
    w.pop_nesting()?;
    build_name(w, p.issuer_cn, p.issuer_org, p.issuer_country)?;
    build_validity(w, p.not_before, p.not_after)?;
    build_name(w, p.subject_cn, p.subject_org, p.subject_country)?;
    build_spki(w, p.subject_pub)?;
    build_extensions(w, p.kind, p.issuer_pub_sha1, p.riot)?;
    w.pop_nesting()
}

/// `CertificationRequestInfo`, the PKCS#10 analog of a TBSCertificate: no
/// issuer, no validity, no extensions, an empty attributes set.
pub fn build_csr_info(
    w: &mut DerWriter,
    subject_cn: &str,
    subject_org: &str,
    subject_country: &str,
    subject_pub: &PubKey,
) -> DerResult<()> {
    w.start_constructed(false)?;
    w.add_integer(&[0])?;
    build_name(w, subject_cn, subject_org, subject_country)?;
    build_spki(w, subject_pub)?;
    w.start_explicit(0)?; // attributes [0] IMPLICIT SET OF, empty
    w.pop_nesting()?;
    w.pop_nesting()
}

/// Wraps an already-built TBS/CertificationRequestInfo (written by
/// `build_inner`) in the outer `SEQUENCE { inner, signatureAlgorithm,
/// signatureValue }` shape shared by certificates and CSRs, signing the
/// encoded inner bytes with `priv_key`.
pub fn finalize<F>(
    buf: &mut [u8],
    hash: &dyn Hash,
    ecc: &dyn Ecc,
    priv_key: &PrivKey,
    build_inner: F,
) -> DerResult<usize>
where
    F: FnOnce(&mut DerWriter) -> DerResult<()>,
{
    let mut w = DerWriter::new(buf);
    w.start_constructed(false)?;
    let inner_start = w.len();
    build_inner(&mut w)?;
    let inner_end = w.len();

    let digest = hash.sha256(&w.as_bytes()[inner_start..inner_end]);
    let sig = ecc.sign(&digest, priv_key);

    w.start_constructed(false)?;
    w.add_oid(&ECDSA_WITH_SHA256_OID)?;
    w.pop_nesting()?;

    w.start_bit_string()?;
    w.start_constructed(false)?;
    w.add_integer(&sig.r)?;
    w.add_integer(&sig.s)?;
    w.pop_nesting()?;
    w.pop_nesting()?;

    w.pop_nesting()?;
    Ok(w.len())
}

/// Alias-cert subject-CN substitution: `"*"` becomes a base64 GUID derived
/// from the DevID public key. Returns the number of bytes written to `out`.
pub fn guid_cn(hash: &dyn Hash, devid_pub: &PubKey, out: &mut [u8; GUID_CN_LEN]) -> usize {
    let digest = hash.sha256(devid_pub);
    STANDARD.encode_slice(&digest[..16], out).unwrap_or(0)
}
