//! delta::svndiff
//!
//! Wire encoding of svndiff0 streams.

use super::window::{Instruction, Window};
use super::DeltaError;

/// Magic header of an svndiff version 0 stream.
pub const SVNDIFF0_HEADER: &[u8; 4] = b"SVN\0";

/// Maximum encoded size of a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

/// Inline instruction lengths must be below this value.
const INLINE_LEN_LIMIT: usize = 0x3f;

/// Append `value` as a big-endian base-128 varint.
///
/// ```
/// use svnbridge::delta::{decode_varint, encode_varint};
///
/// let mut buf = Vec::new();
/// encode_varint(130, &mut buf);
/// assert_eq!(buf, vec![0x81, 0x02]);
/// assert_eq!(decode_varint(&buf).unwrap(), (130, 2));
/// ```
pub fn encode_varint(value: u64, out: &mut Vec<u8>) {
    let mut groups = [0u8; MAX_VARINT_LEN];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7f) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

/// Decode a varint from the start of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), DeltaError> {
    let mut value: u64 = 0;
    for (i, &b) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN || value > (u64::MAX >> 7) {
            return Err(DeltaError::VarintOverflow);
        }
        value = (value << 7) | u64::from(b & 0x7f);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(DeltaError::Truncated { what: "integer" })
}

/// A cursor over an input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn varint(&mut self) -> Result<u64, DeltaError> {
        let (value, used) = decode_varint(&self.buf[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn size(&mut self) -> Result<usize, DeltaError> {
        let value = self.varint()?;
        usize::try_from(value).map_err(|_| DeltaError::VarintOverflow)
    }

    fn byte(&mut self, what: &'static str) -> Result<u8, DeltaError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(DeltaError::Truncated { what })?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DeltaError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DeltaError::Truncated { what })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

fn pack_instruction(op: &Instruction, out: &mut Vec<u8>) {
    let opcode = op.opcode() << 6;
    let len = op.len();
    if len > 0 && len < INLINE_LEN_LIMIT {
        out.push(opcode | len as u8);
    } else {
        out.push(opcode);
        encode_varint(len as u64, out);
    }
    match *op {
        Instruction::Source { offset, .. } | Instruction::Target { offset, .. } => {
            encode_varint(offset as u64, out);
        }
        Instruction::New { .. } => {}
    }
}

fn unpack_instructions(buf: &[u8]) -> Result<Vec<Instruction>, DeltaError> {
    let mut reader = Reader::new(buf);
    let mut ops = Vec::new();
    while !reader.at_end() {
        let b = reader.byte("instruction")?;
        let opcode = b >> 6;
        let mut len = usize::from(b & 0x3f);
        if len == 0 {
            len = reader.size()?;
        }
        let op = match opcode {
            Instruction::OP_SOURCE => Instruction::Source {
                offset: reader.size()?,
                len,
            },
            Instruction::OP_TARGET => Instruction::Target {
                offset: reader.size()?,
                len,
            },
            Instruction::OP_NEW => Instruction::New { len },
            other => return Err(DeltaError::BadOpcode { opcode: other }),
        };
        ops.push(op);
    }
    Ok(ops)
}

/// Encode one window (without the stream header).
pub fn pack_window(window: &Window) -> Vec<u8> {
    let mut instructions = Vec::new();
    for op in &window.ops {
        pack_instruction(op, &mut instructions);
    }

    let mut out = Vec::with_capacity(instructions.len() + window.new_data.len() + 16);
    encode_varint(window.sview_offset, &mut out);
    encode_varint(window.sview_len as u64, &mut out);
    encode_varint(window.tview_len as u64, &mut out);
    encode_varint(instructions.len() as u64, &mut out);
    encode_varint(window.new_data.len() as u64, &mut out);
    out.extend_from_slice(&instructions);
    out.extend_from_slice(&window.new_data);
    out
}

/// Decode one window from the start of `buf`.
///
/// Returns the window and the number of bytes consumed.
pub fn unpack_window(buf: &[u8]) -> Result<(Window, usize), DeltaError> {
    let mut reader = Reader::new(buf);
    let sview_offset = reader.varint()?;
    let sview_len = reader.size()?;
    let tview_len = reader.size()?;
    let instr_len = reader.size()?;
    let newdata_len = reader.size()?;
    let instructions = reader.take(instr_len, "instructions")?;
    let new_data = reader.take(newdata_len, "new data")?.to_vec();
    let ops = unpack_instructions(instructions)?;
    let window = Window {
        sview_offset,
        sview_len,
        tview_len,
        ops,
        new_data,
    };
    window.check()?;
    Ok((window, reader.pos))
}

/// Encode a full delta stream: header plus windows.
pub fn encode_delta(windows: &[Window]) -> Vec<u8> {
    let mut out = SVNDIFF0_HEADER.to_vec();
    for window in windows {
        out.extend(pack_window(window));
    }
    out
}

/// Decode a full delta stream.
///
/// # Errors
///
/// Returns [`DeltaError::BadMagic`] if the header is missing and
/// [`DeltaError::Truncated`] if a window is cut short.
pub fn decode_delta(buf: &[u8]) -> Result<Vec<Window>, DeltaError> {
    if buf.len() < SVNDIFF0_HEADER.len() || &buf[..4] != SVNDIFF0_HEADER {
        return Err(DeltaError::BadMagic);
    }
    let mut pos = SVNDIFF0_HEADER.len();
    let mut windows = Vec::new();
    while pos < buf.len() {
        let (window, used) = unpack_window(&buf[pos..])?;
        windows.push(window);
        pos += used;
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_small_values() {
        let mut buf = Vec::new();
        encode_varint(0, &mut buf);
        assert_eq!(buf, vec![0]);
        buf.clear();
        encode_varint(127, &mut buf);
        assert_eq!(buf, vec![0x7f]);
        buf.clear();
        encode_varint(128, &mut buf);
        assert_eq!(buf, vec![0x81, 0x00]);
    }

    #[test]
    fn varint_130_roundtrip() {
        let mut buf = Vec::new();
        encode_varint(130, &mut buf);
        assert_eq!(decode_varint(&buf).unwrap(), (130, buf.len()));
    }

    #[test]
    fn varint_max_fits_in_ten_bytes() {
        let mut buf = Vec::new();
        encode_varint(u64::MAX, &mut buf);
        assert_eq!(buf.len(), 10);
        assert_eq!(decode_varint(&buf).unwrap().0, u64::MAX);
    }

    #[test]
    fn varint_overflow_rejected() {
        let buf = [0xffu8; 11];
        assert_eq!(decode_varint(&buf), Err(DeltaError::VarintOverflow));
    }

    #[test]
    fn varint_truncated() {
        assert!(matches!(
            decode_varint(&[0x81]),
            Err(DeltaError::Truncated { .. })
        ));
    }

    #[test]
    fn inline_and_extended_lengths() {
        let mut out = Vec::new();
        pack_instruction(&Instruction::New { len: 5 }, &mut out);
        assert_eq!(out, vec![0x80 | 5]);

        out.clear();
        pack_instruction(&Instruction::Source { offset: 1, len: 0x40 }, &mut out);
        assert_eq!(out, vec![0x00, 0x40, 0x01]);

        out.clear();
        pack_instruction(&Instruction::Target { offset: 0, len: 0 }, &mut out);
        assert_eq!(unpack_instructions(&out).unwrap(), vec![Instruction::Target { offset: 0, len: 0 }]);
    }

    #[test]
    fn bad_opcode_rejected() {
        assert_eq!(
            unpack_instructions(&[0xc1]),
            Err(DeltaError::BadOpcode { opcode: 3 })
        );
    }

    #[test]
    fn missing_header_rejected() {
        assert_eq!(decode_delta(b"SVN\x01"), Err(DeltaError::BadMagic));
        assert_eq!(decode_delta(b"SV"), Err(DeltaError::BadMagic));
    }

    #[test]
    fn empty_stream_has_no_windows() {
        assert_eq!(decode_delta(SVNDIFF0_HEADER).unwrap(), Vec::<Window>::new());
    }

    #[test]
    fn truncated_window_rejected() {
        let mut bytes = encode_delta(&[Window::from_new_data(b"hello".to_vec())]);
        bytes.pop();
        assert!(matches!(
            decode_delta(&bytes),
            Err(DeltaError::Truncated { .. })
        ));
    }

    #[test]
    fn inconsistent_windows_rejected_on_decode() {
        let mut bytes = SVNDIFF0_HEADER.to_vec();
        for field in [0, 0, u64::MAX, 0, 0] {
            encode_varint(field, &mut bytes);
        }
        assert!(matches!(
            decode_delta(&bytes),
            Err(DeltaError::ViewOutOfRange { .. })
        ));

        let short = Window {
            sview_offset: 0,
            sview_len: 0,
            tview_len: 9,
            ops: vec![Instruction::New { len: 3 }],
            new_data: b"abc".to_vec(),
        };
        assert!(matches!(
            decode_delta(&encode_delta(&[short])),
            Err(DeltaError::TargetLengthMismatch { expected: 9, actual: 3 })
        ));
    }

    #[test]
    fn known_encoding() {
        let bytes = encode_delta(&[Window::from_new_data(b"abc".to_vec())]);
        assert_eq!(
            bytes,
            vec![b'S', b'V', b'N', 0, 0, 0, 3, 1, 3, 0x83, b'a', b'b', b'c']
        );
    }
}
