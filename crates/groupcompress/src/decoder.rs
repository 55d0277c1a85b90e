//! Applies a delta's instruction stream against its aggregate source.

use crate::delta::{decode_instruction, Instruction};
use crate::error::Error;
use crate::varint::read_base128_u64;

/// Apply `delta` against `source`, returning the reconstructed target.
///
/// `source` must be the same aggregate of bytes (in the same order) that
/// was indexed when the delta was produced; a copy instruction referencing
/// bytes past `source_size` or past `source.len()` is rejected rather than
/// read out of bounds.
pub fn apply_delta_to_source(source: &[u8], delta: &[u8]) -> Result<Vec<u8>, Error> {
    if delta.len() < crate::delta::DELTA_SIZE_MIN {
        return Err(Error::SourceBad);
    }
    let (source_size, n1) = read_base128_u64(delta)?;
    if source_size as usize != source.len() {
        return Err(Error::SourceBad);
    }
    let (target_size, n2) = read_base128_u64(&delta[n1..])?;

    let mut out = Vec::with_capacity(target_size as usize);
    let mut pos = n1 + n2;
    while pos < delta.len() {
        let (instr, new_pos) = decode_instruction(delta, pos)?;
        match instr {
            Instruction::Insert(payload) => out.extend_from_slice(payload),
            Instruction::Copy { offset, length } => {
                let start = offset as usize;
                let end = start.checked_add(length as usize).ok_or(Error::SourceBad)?;
                let chunk = source.get(start..end).ok_or(Error::SourceBad)?;
                out.extend_from_slice(chunk);
            }
        }
        pos = new_pos;
    }

    if out.len() as u64 != target_size {
        return Err(Error::SourceBad);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{encode_copy_instruction, write_instruction};
    use crate::varint::write_base128_u64;

    fn build_delta(source_size: u64, target_size: u64, instrs: &[Instruction<&[u8]>]) -> Vec<u8> {
        let mut out = Vec::new();
        write_base128_u64(&mut out, source_size).unwrap();
        write_base128_u64(&mut out, target_size).unwrap();
        for instr in instrs {
            write_instruction(&mut out, instr).unwrap();
        }
        out
    }

    #[test]
    fn applies_pure_insert() {
        let delta = build_delta(0, 5, &[Instruction::Insert(b"hello")]);
        assert_eq!(apply_delta_to_source(b"", &delta).unwrap(), b"hello");
    }

    #[test]
    fn applies_copy_then_insert() {
        let source = b"the quick brown fox";
        let delta = build_delta(
            source.len() as u64,
            9,
            &[Instruction::Copy { offset: 4, length: 5 }, Instruction::Insert(b" jump")],
        );
        assert_eq!(apply_delta_to_source(source, &delta).unwrap(), b"quick jump");
    }

    #[test]
    fn rejects_source_size_mismatch() {
        let delta = build_delta(10, 0, &[]);
        assert_eq!(apply_delta_to_source(b"short", &delta), Err(Error::SourceBad));
    }

    #[test]
    fn rejects_out_of_bounds_copy() {
        let source = b"abc";
        let mut out = Vec::new();
        write_base128_u64(&mut out, source.len() as u64).unwrap();
        write_base128_u64(&mut out, 5).unwrap();
        out.extend_from_slice(&encode_copy_instruction(0, 5).unwrap());
        assert_eq!(apply_delta_to_source(source, &out), Err(Error::SourceBad));
    }

    #[test]
    fn rejects_reserved_opcode() {
        let mut out = Vec::new();
        write_base128_u64(&mut out, 0).unwrap();
        write_base128_u64(&mut out, 0).unwrap();
        out.push(0x00);
        assert_eq!(apply_delta_to_source(b"", &out), Err(Error::SourceBad));
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert_eq!(apply_delta_to_source(b"", &[0x00, 0x00]), Err(Error::SourceBad));
        assert_eq!(apply_delta_to_source(b"", &[]), Err(Error::SourceBad));
    }
}
