// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-pass, bounded-buffer ASN.1 DER encoder.
//!
//! The writer owns a caller-supplied byte buffer and an explicit nesting
//! stack of pending length fields. Every constructed value (SEQUENCE, SET,
//! explicit context tags, OCTET STRING and BIT STRING wrappers) reserves a
//! maximum-width long-form length field when opened, and `pop_nesting`
//! rewrites that field in minimal form and shifts the payload left to close
//! the gap. Nothing is ever copied more than once per frame.

/// Long-form length fields are reserved as `0x84` + 4 big-endian bytes,
/// which covers any buffer this encoder could plausibly be asked to fill.
const MAX_LEN_WIDTH: usize = 5;

/// Maximum number of concurrently open constructed values.
pub const MAX_NESTING: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerError {
    Overflow,
    InvalidPop,
    NestingFull,
    BadOid,
}

pub type DerResult<T> = Result<T, DerError>;

#[derive(Clone, Copy)]
struct Frame {
    /// Offset of the identifier octet that opened this frame.
    start: usize,
    /// Width, in bytes, reserved for the length field (always
    /// `MAX_LEN_WIDTH` today; kept as a field so a future caller could
    /// reserve a tighter width for known-small content).
    reserved: usize,
}

pub struct DerWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    stack: [Option<Frame>; MAX_NESTING],
    depth: usize,
}

impl<'a> DerWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            stack: [None; MAX_NESTING],
            depth: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Depth of the nesting stack. A completed object has depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> DerResult<()> {
        let end = self.pos.checked_add(bytes.len()).ok_or(DerError::Overflow)?;
        if end > self.buf.len() {
            return Err(DerError::Overflow);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn push_frame(&mut self, start: usize, reserved: usize) -> DerResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(DerError::NestingFull);
        }
        self.stack[self.depth] = Some(Frame { start, reserved });
        self.depth += 1;
        Ok(())
    }

    fn open(&mut self, tag: u8) -> DerResult<()> {
        let before = self.pos;
        self.push_bytes(&[tag]).and_then(|_| {
            self.push_bytes(&[0u8; MAX_LEN_WIDTH])
        }).map_err(|e| {
            self.pos = before;
            e
        })?;
        self.push_frame(before, MAX_LEN_WIDTH).map_err(|e| {
            self.pos = before;
            e
        })
    }

    /// Open a SEQUENCE (`constructed == false`) or SET (`true`).
    pub fn start_constructed(&mut self, set: bool) -> DerResult<()> {
        self.open(if set { 0x31 } else { 0x30 })
    }

    /// Open an explicit context tag `[N]`.
    pub fn start_explicit(&mut self, tag: u8) -> DerResult<()> {
        self.open(0xA0 | tag)
    }

    /// Open an OCTET STRING whose content is built incrementally by nested
    /// calls (as opposed to `add_octet_string`, which takes content that is
    /// already fully assembled).
    pub fn start_octet_string(&mut self) -> DerResult<()> {
        self.open(0x04)
    }

    /// Open a BIT STRING whose content is built incrementally. Writes the
    /// leading "unused bits" octet (always 0 here; every value this encoder
    /// produces is a whole number of octets) as the first content byte.
    pub fn start_bit_string(&mut self) -> DerResult<()> {
        self.open(0x03)?;
        self.push_bytes(&[0x00])
    }

    /// Close the most recently opened frame: compute the inner length,
    /// rewrite the length field in minimal long/short form, and shift the
    /// content left by the bytes reclaimed from the over-reserved field.
    pub fn pop_nesting(&mut self) -> DerResult<()> {
        if self.depth == 0 {
            return Err(DerError::InvalidPop);
        }
        self.depth -= 1;
        let frame = self.stack[self.depth].take().ok_or(DerError::InvalidPop)?;

        let content_start = frame.start + 1 + frame.reserved;
        let content_len = self.pos - content_start;

        let mut len_bytes = [0u8; MAX_LEN_WIDTH];
        let len_width = encode_length(content_len, &mut len_bytes);
        let shift = frame.reserved - len_width;

        if shift > 0 {
            self.buf
                .copy_within(content_start..self.pos, content_start - shift);
            self.pos -= shift;
        }

        let len_pos = frame.start + 1;
        self.buf[len_pos..len_pos + len_width].copy_from_slice(&len_bytes[..len_width]);
        Ok(())
    }

    fn raw_tlv_header(&mut self, tag: u8, len: usize) -> DerResult<()> {
        let before = self.pos;
        self.push_bytes(&[tag]).map_err(|e| {
            self.pos = before;
            e
        })?;
        let mut lb = [0u8; MAX_LEN_WIDTH];
        let w = encode_length(len, &mut lb);
        self.push_bytes(&lb[..w]).map_err(|e| {
            self.pos = before;
            e
        })
    }

    pub fn add_boolean(&mut self, value: bool) -> DerResult<()> {
        self.raw_tlv_header(0x01, 1)?;
        self.push_bytes(&[if value { 0xFF } else { 0x00 }])
    }

    /// INTEGER from a big-endian unsigned magnitude. Strips redundant
    /// leading zero bytes and sign-extends with a single `0x00` if the
    /// high bit of the remaining leading byte would otherwise read as
    /// negative.
    pub fn add_integer(&mut self, magnitude: &[u8]) -> DerResult<()> {
        let mut start = 0;
        while start + 1 < magnitude.len() && magnitude[start] == 0 {
            start += 1;
        }
        let trimmed = &magnitude[start..];
        let needs_pad = trimmed[0] & 0x80 != 0;
        let len = trimmed.len() + needs_pad as usize;

        self.raw_tlv_header(0x02, len)?;
        if needs_pad {
            self.push_bytes(&[0x00])?;
        }
        self.push_bytes(trimmed)
    }

    /// `[tag] INTEGER value`, used for the explicit-tagged certificate
    /// version field; `value` is expected to be small and non-negative.
    pub fn add_explicit_integer(&mut self, tag: u8, value: u32) -> DerResult<()> {
        let magnitude = value.to_be_bytes();
        let mut start = 0;
        while start + 1 < magnitude.len() && magnitude[start] == 0 {
            start += 1;
        }
        let trimmed = &magnitude[start..];
        let needs_pad = trimmed[0] & 0x80 != 0;
        let int_len = trimmed.len() + needs_pad as usize;
        let inner_len = 2 + int_len;

        self.raw_tlv_header(0xA0 | tag, inner_len)?;
        self.raw_tlv_header(0x02, int_len)?;
        if needs_pad {
            self.push_bytes(&[0x00])?;
        }
        self.push_bytes(trimmed)
    }

    /// OID from an arc array terminated by the sentinel `-1`. The first two
    /// arcs are folded into a single byte via `(a*40 + b)` per X.690.
    pub fn add_oid(&mut self, arcs: &[i32]) -> DerResult<()> {
        let mut encoded = [0u8; 32];
        let mut n = 0usize;

        let mut it = arcs.iter().take_while(|&&a| a != -1).copied();
        let a = it.next().ok_or(DerError::BadOid)?;
        let b = it.next().ok_or(DerError::BadOid)?;
        if a < 0 || b < 0 {
            return Err(DerError::BadOid);
        }
        n += encode_arc((a * 40 + b) as u32, &mut encoded[n..])?;
        for arc in it {
            if arc < 0 {
                return Err(DerError::BadOid);
            }
            n += encode_arc(arc as u32, &mut encoded[n..])?;
        }

        self.raw_tlv_header(0x06, n)?;
        self.push_bytes(&encoded[..n])
    }

    pub fn add_utf8_string(&mut self, s: &str) -> DerResult<()> {
        self.raw_tlv_header(0x0C, s.len())?;
        self.push_bytes(s.as_bytes())
    }

    /// UTCTime content, pre-formatted as `YYMMDDHHMMSSZ` (13 bytes).
    pub fn add_utctime(&mut self, yymmddhhmmssz: &[u8; 13]) -> DerResult<()> {
        self.raw_tlv_header(0x17, 13)?;
        self.push_bytes(yymmddhhmmssz)
    }

    /// OCTET STRING whose content is already fully assembled.
    pub fn add_octet_string(&mut self, content: &[u8]) -> DerResult<()> {
        self.raw_tlv_header(0x04, content.len())?;
        self.push_bytes(content)
    }

    /// BIT STRING (zero unused bits) whose content is already fully
    /// assembled.
    pub fn add_bit_string(&mut self, content: &[u8]) -> DerResult<()> {
        self.raw_tlv_header(0x03, content.len() + 1)?;
        self.push_bytes(&[0x00])?;
        self.push_bytes(content)
    }

    /// `[tag] OCTET STRING content`, used for authorityKeyIdentifier.
    pub fn add_explicit_octet_string(&mut self, tag: u8, content: &[u8]) -> DerResult<()> {
        self.raw_tlv_header(0xA0 | tag, 2 + content.len())?;
        self.raw_tlv_header(0x04, content.len())?;
        self.push_bytes(content)
    }
}

fn encode_length(len: usize, out: &mut [u8; MAX_LEN_WIDTH]) -> usize {
    if len < 0x80 {
        out[0] = len as u8;
        1
    } else {
        let be = (len as u32).to_be_bytes();
        let first_nonzero = be.iter().position(|&b| b != 0).unwrap_or(3);
        let sig = &be[first_nonzero..];
        out[0] = 0x80 | sig.len() as u8;
        out[1..1 + sig.len()].copy_from_slice(sig);
        1 + sig.len()
    }
}

fn encode_arc(mut v: u32, out: &mut [u8]) -> DerResult<usize> {
    let mut tmp = [0u8; 5];
    let mut i = 0;
    tmp[i] = (v & 0x7f) as u8;
    v >>= 7;
    i += 1;
    while v > 0 {
        tmp[i] = 0x80 | (v & 0x7f) as u8;
        v >>= 7;
        i += 1;
    }
    if i > out.len() {
        return Err(DerError::Overflow);
    }
    for j in 0..i {
        out[j] = tmp[i - 1 - j];
    }
    Ok(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_sign_extends_high_bit() {
        let mut buf = [0u8; 16];
        let mut w = DerWriter::new(&mut buf);
        w.add_integer(&[0x80]).unwrap();
        assert_eq!(w.as_bytes(), &[0x02, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn integer_strips_leading_zeros() {
        let mut buf = [0u8; 16];
        let mut w = DerWriter::new(&mut buf);
        w.add_integer(&[0x00, 0x00, 0x01]).unwrap();
        assert_eq!(w.as_bytes(), &[0x02, 0x01, 0x01]);
    }

    #[test]
    fn long_form_length_boundary() {
        let mut buf = [0u8; 300];
        let mut w = DerWriter::new(&mut buf);
        w.start_constructed(false).unwrap();
        w.add_octet_string(&[0u8; 127]).unwrap();
        w.pop_nesting().unwrap();
        // 127 content + 2-byte octet-string header = 129 -> long form, 1 len byte
        assert_eq!(w.as_bytes()[0], 0x30);
        assert_eq!(w.as_bytes()[1], 0x81);
        assert_eq!(w.as_bytes()[2], 129);
    }

    #[test]
    fn oid_riot_extension() {
        let mut buf = [0u8; 16];
        let mut w = DerWriter::new(&mut buf);
        // 2.23.133.5.4.1
        w.add_oid(&[2, 23, 133, 5, 4, 1, -1]).unwrap();
        assert_eq!(w.as_bytes(), &[0x06, 0x06, 0x67, 0x81, 0x05, 0x05, 0x04, 0x01]);
    }

    #[test]
    fn oid_ecdsa_with_sha256() {
        let mut buf = [0u8; 16];
        let mut w = DerWriter::new(&mut buf);
        // 1.2.840.10045.4.3.2
        w.add_oid(&[1, 2, 840, 10045, 4, 3, 2, -1]).unwrap();
        assert_eq!(
            w.as_bytes(),
            &[0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02]
        );
    }

    #[test]
    fn nesting_overflow_past_eight_frames() {
        let mut buf = [0u8; 64];
        let mut w = DerWriter::new(&mut buf);
        for _ in 0..MAX_NESTING {
            w.start_constructed(false).unwrap();
        }
        assert_eq!(w.start_constructed(false), Err(DerError::NestingFull));
    }

    #[test]
    fn pop_on_empty_stack_is_invalid() {
        let mut buf = [0u8; 16];
        let mut w = DerWriter::new(&mut buf);
        assert_eq!(w.pop_nesting(), Err(DerError::InvalidPop));
    }

    #[test]
    fn overflow_leaves_cursor_unchanged() {
        let mut buf = [0u8; 4];
        let mut w = DerWriter::new(&mut buf);
        let before = w.len();
        assert_eq!(w.add_octet_string(&[1, 2, 3, 4, 5]), Err(DerError::Overflow));
        assert_eq!(w.len(), before);
    }

    #[test]
    fn nesting_balanced_after_sequence() {
        let mut buf = [0u8; 64];
        let mut w = DerWriter::new(&mut buf);
        w.start_constructed(false).unwrap();
        w.add_boolean(true).unwrap();
        w.pop_nesting().unwrap();
        assert_eq!(w.depth(), 0);
    }
}
