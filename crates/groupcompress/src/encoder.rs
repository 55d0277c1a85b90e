//! Greedy match-and-emit delta encoding against a prebuilt [`Index`].

use crate::delta::{write_instruction, Instruction, RABIN_WINDOW};
use crate::error::Error;
use crate::index::Index;
use crate::rabin::RabinWindow;
use crate::varint::write_base128_u64;

/// A match shorter than this many bytes costs more in copy-instruction
/// overhead than it saves versus just inserting the bytes literally.
const BREAK_EVEN: usize = 4;

/// Once a match reaches this length, stop scanning the bucket for a
/// possibly-longer one; diminishing returns aren't worth the extra work.
const GOOD_ENOUGH: usize = 4096;

/// Encode `target` as a delta against `index`, the aggregate of whatever
/// sources were indexed beforehand. `max_delta_size`, if given, aborts the
/// encode (with [`Error::SizeTooBig`] and no partial output) as soon as the
/// output could no longer beat it.
pub fn encode(index: &Index, target: &[u8], max_delta_size: Option<usize>) -> Result<Vec<u8>, Error> {
    if target.is_empty() {
        return Err(Error::BufferEmpty);
    }

    let mut out = Vec::new();
    write_base128_u64(&mut out, index.total_indexed_bytes()).map_err(|_| Error::OutOfMemory)?;
    write_base128_u64(&mut out, target.len() as u64).map_err(|_| Error::OutOfMemory)?;

    let mut check_size = |out: &Vec<u8>| -> Result<(), Error> {
        if let Some(max) = max_delta_size {
            if out.len() > max {
                return Err(Error::SizeTooBig);
            }
        }
        Ok(())
    };

    let mut pending_start = 0usize;
    let mut i = 0usize;

    let emit_insert = |out: &mut Vec<u8>, payload: &[u8]| -> Result<(), Error> {
        if payload.is_empty() {
            return Ok(());
        }
        write_instruction(out, &Instruction::Insert(payload))?;
        Ok(())
    };

    if target.len() < RABIN_WINDOW {
        emit_insert(&mut out, target)?;
        check_size(&out)?;
        return Ok(out);
    }

    let mut window = RabinWindow::new(target[0..RABIN_WINDOW].try_into().unwrap());

    while i + RABIN_WINDOW <= target.len() {
        let hash = window.hash().finish();
        let remaining = &target[i..];
        let best = index.find_best_match(hash, remaining, BREAK_EVEN.saturating_sub(1), GOOD_ENOUGH);

        if let Some((entry, forward_len)) = best {
            let (matched_entry, copy_start, total_len) =
                Index::extend_backward(entry, forward_len, target, pending_start, i);

            if total_len >= BREAK_EVEN {
                emit_insert(&mut out, &target[pending_start..copy_start])?;
                write_instruction(
                    &mut out,
                    &Instruction::Copy { offset: matched_entry.offset, length: total_len as u64 },
                )?;
                check_size(&out)?;

                i += forward_len;
                pending_start = i;

                if i + RABIN_WINDOW <= target.len() {
                    window = RabinWindow::new(target[i..i + RABIN_WINDOW].try_into().unwrap());
                }
                continue;
            }
        }

        i += 1;
        if i + RABIN_WINDOW <= target.len() {
            window.push(target[i + RABIN_WINDOW - 1]);
        }
    }

    emit_insert(&mut out, &target[pending_start..])?;
    check_size(&out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_insert_when_index_is_empty() {
        let index = Index::new(None);
        let delta = encode(&index, b"hello world", None).unwrap();
        // header (2 bytes: source_size=0, target_size=11) + one insert instruction
        assert_eq!(delta[0], 0);
        assert_eq!(delta[1], b"hello world".len() as u8);
    }

    #[test]
    fn rejects_empty_target() {
        let index = Index::new(None);
        assert_eq!(encode(&index, b"", None), Err(Error::BufferEmpty));
    }

    #[test]
    fn finds_exact_repeat_as_copy() {
        let source = b"the quick brown fox jumps over the lazy dog and then some more padding bytes here";
        let mut index = Index::new(None);
        index.add_source(source, 0).unwrap();
        let delta = encode(&index, source, None).unwrap();
        // A full self-match should collapse to header + a single copy
        // instruction, far smaller than the source itself.
        assert!(delta.len() < source.len() / 2, "delta too large: {}", delta.len());
    }

    #[test]
    fn aborts_when_max_size_exceeded() {
        let source = vec![0u8; 256];
        let mut index = Index::new(None);
        index.add_source(&source, 0).unwrap();
        let target: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        assert_eq!(encode(&index, &target, Some(1)), Err(Error::SizeTooBig));
    }
}
