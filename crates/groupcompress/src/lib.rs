//! Rabin-hash based binary delta compression.
//!
//! This crate builds a match index over one or more source buffers and
//! uses it to produce compact, xdelta-style binary deltas against target
//! buffers, in the same wire format used by Bazaar's groupcompress
//! storage format: a header of two varints (source size, target size)
//! followed by a stream of copy and insert instructions.
//!
//! The typical flow is: build an [`Index`] over your source material with
//! [`Index::add_source`] (and, for building on top of prior deltas,
//! [`Index::add_delta_source`]); then call [`make_delta`] for each target
//! buffer you want encoded against it. [`apply_delta`] reverses the
//! process.

mod decoder;
mod delta;
mod encoder;
mod error;
mod index;
mod rabin;
mod varint;

pub use delta::{
    decode_copy_instruction, encode_copy_instruction, Instruction, DELTA_SIZE_MIN, MAX_COPY_SIZE,
    MAX_INSERT_SIZE,
};
pub use error::Error;
pub use index::Index;
pub use rabin::{rabin_hash, RabinHash};
pub use varint::{decode_base128_int, encode_base128_int, read_base128_u64, write_base128_u64};

/// Encode `target` as a delta against everything `index` has indexed so
/// far. Returns `Ok(None)` if no delta would be smaller than simply
/// inserting `target` verbatim, in which case the caller is expected to
/// store the fulltext instead.
///
/// `max_delta_size`, if given, aborts the encode early (with
/// [`Error::SizeTooBig`]) once the output could no longer fit, rather than
/// producing a partial result.
pub fn make_delta(
    index: &Index,
    target: &[u8],
    max_delta_size: Option<usize>,
) -> Result<Option<Vec<u8>>, Error> {
    if index.is_empty() {
        return Err(Error::IndexNeeded);
    }
    let delta = encoder::encode(index, target, max_delta_size)?;

    // Compare against the all-insert baseline rather than re-deriving the
    // break-even arithmetic: an index with nothing in it can only ever
    // produce inserts, so this is exactly what "no beneficial match
    // exists" looks like.
    let empty_index = Index::new(None);
    let baseline = encoder::encode(&empty_index, target, None)?;
    if delta.len() >= baseline.len() {
        return Ok(None);
    }
    Ok(Some(delta))
}

/// Apply `delta` against `source`, reconstructing the buffer it was
/// produced from. `source` must be exactly the aggregate of bytes the
/// index held when the delta was encoded.
pub fn apply_delta(source: &[u8], delta: &[u8]) -> Result<Vec<u8>, Error> {
    decoder::apply_delta_to_source(source, delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trip() {
        let source = b"a reasonably long piece of text that repeats itself, a reasonably long piece";
        let mut index = Index::new(None);
        index.add_source(source, 0).unwrap();
        let delta = make_delta(&index, source, None).unwrap().unwrap();
        assert_eq!(apply_delta(source, &delta).unwrap(), source);
    }

    #[test]
    fn pure_append_is_cheap() {
        let source = b"0123456789".repeat(8);
        let mut target = source.clone();
        target.extend_from_slice(b" and then some freshly appended tail content");
        let mut index = Index::new(None);
        index.add_source(&source, 0).unwrap();
        let delta = make_delta(&index, &target, None).unwrap().unwrap();
        assert_eq!(apply_delta(&source, &delta).unwrap(), target);
        assert!(delta.len() < target.len());
    }

    #[test]
    fn middle_edit_keeps_head_and_tail_as_copies() {
        let source = b"AAAAAAAAAAAAAAAAAAAA middle text stays the same BBBBBBBBBBBBBBBBBBBB".to_vec();
        let mut target = source.clone();
        let mid = target.len() / 2;
        target.splice(mid..mid, b"<<INSERTED>>".iter().copied());
        let mut index = Index::new(None);
        index.add_source(&source, 0).unwrap();
        let delta = make_delta(&index, &target, None).unwrap().unwrap();
        assert_eq!(apply_delta(&source, &delta).unwrap(), target);
    }

    #[test]
    fn rejects_corrupt_delta_against_source() {
        let source = b"0123456789abcdef0123456789abcdef";
        let mut index = Index::new(None);
        index.add_source(source, 0).unwrap();
        let target = b"0123456789abcdef0123456789abcdef-extra";
        let delta = make_delta(&index, target, None).unwrap().unwrap();

        // Flip an offset byte in the first copy instruction so it points
        // out of range, rather than flipping an arbitrary bit (which
        // might just decode to different, still in-bounds, literal
        // bytes).
        let mut corrupt = delta;
        for b in corrupt.iter_mut() {
            if *b & 0x80 != 0 {
                *b |= 0x7f;
                break;
            }
        }
        assert!(apply_delta(source, &corrupt).is_err());
    }

    #[test]
    fn trips_max_size_with_no_partial_result() {
        let source = vec![0u8; 4096];
        let mut index = Index::new(None);
        index.add_source(&source, 0).unwrap();
        let target: Vec<u8> = (0u32..4096).map(|i| (i % 251) as u8).collect();
        assert_eq!(make_delta(&index, &target, Some(1)), Err(Error::SizeTooBig));
    }

    #[test]
    fn aggregates_multiple_sources() {
        let s1 = b"the first source buffer has this exact phrase in it".to_vec();
        let s2 = b"the second source buffer has this exact phrase in it too".to_vec();
        let mut index = Index::new(None);
        index.add_source(&s1, 0).unwrap();
        index.add_source(&s2, 0).unwrap();

        let mut aggregate = s1.clone();
        aggregate.extend_from_slice(&s2);

        let target = b"this exact phrase in it".to_vec();
        let delta = make_delta(&index, &target, None).unwrap().unwrap();
        assert_eq!(apply_delta(&aggregate, &delta).unwrap(), target);
    }

    #[test]
    fn empty_index_yields_index_needed() {
        let index = Index::new(None);
        assert_eq!(make_delta(&index, b"anything", None), Err(Error::IndexNeeded));
    }

    #[test]
    fn no_beneficial_match_returns_none() {
        let mut index = Index::new(None);
        index.add_source(&[0u8; 64], 0).unwrap();
        let target = b"completely unrelated short text";
        assert_eq!(make_delta(&index, target, None).unwrap(), None);
    }
}
