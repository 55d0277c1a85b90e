//! The match index: a hash table keyed by Rabin hash, pointing into one or
//! more source buffers concatenated (conceptually) into a single aggregate
//! byte space.

use crate::delta::{decode_instruction, Instruction, HASH_LIMIT, RABIN_WINDOW};
use crate::error::Error;
use crate::rabin::rabin_hash;
use crate::varint::read_base128_u64;

const MIN_HSIZE: u32 = 1 << 4;
const MAX_HSIZE: u32 = 1 << 24;

/// An entry sampled at one position of one indexed buffer.
///
/// `origin` is the single underlying buffer this sample came from: a
/// whole source fulltext, or (for a delta indexed via
/// [`Index::add_delta_source`]) just the one insert-literal region the
/// sample was taken from. Keeping `origin` around, rather than only a
/// forward slice, is what lets match extension look backwards as well as
/// forwards without ever reading past that buffer's own boundaries.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexEntry<'a> {
    pub hash_val: u32,
    /// Position in the aggregate source space.
    pub offset: u64,
    pub origin: &'a [u8],
    pub local: u32,
}

impl<'a> IndexEntry<'a> {
    fn forward(&self) -> &'a [u8] {
        &self.origin[self.local as usize..]
    }

    fn backward(&self) -> &'a [u8] {
        &self.origin[..self.local as usize]
    }

    /// The same entry, advanced `n` bytes forward (used once a match has
    /// been extended, to keep the window in sync with the target cursor).
    pub fn advance(&self, n: u64) -> Self {
        Self {
            hash_val: self.hash_val,
            offset: self.offset + n,
            origin: self.origin,
            local: self.local + n as u32,
        }
    }

    /// The same entry, moved `n` bytes backward (used when a match has
    /// been extended backwards into the pending insert run).
    fn retreat(&self, n: u64) -> Self {
        Self {
            hash_val: self.hash_val,
            offset: self.offset - n,
            origin: self.origin,
            local: self.local - n as u32,
        }
    }
}

fn ideal_hsize(indexable_bytes: u64) -> u32 {
    let windows = (indexable_bytes / RABIN_WINDOW as u64).max(1);
    let mut hsize: u32 = 1;
    while (hsize as u64) < windows && hsize < MAX_HSIZE {
        hsize <<= 1;
    }
    hsize.clamp(MIN_HSIZE, MAX_HSIZE)
}

/// The Rabin-hash based match index. Holds borrowed references to every
/// source it was given, so it can never outlive them: a new source buffer
/// must stay alive for as long as the index that was built from it.
#[derive(Debug)]
pub struct Index<'a> {
    /// `(aggregate start offset, size)` for every source or delta added,
    /// in insertion order. Kept only for bookkeeping and footprint
    /// reporting; match data lives directly in `entries`.
    sources: Vec<(u64, u64)>,
    buckets: Vec<Vec<u32>>,
    entries: Vec<IndexEntry<'a>>,
    hash_mask: u32,
    max_bytes_to_index: Option<usize>,
    total_indexed_bytes: u64,
    aggregate_size: u64,
}

impl<'a> Default for Index<'a> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<'a> Index<'a> {
    pub fn new(max_bytes_to_index: Option<usize>) -> Self {
        Self {
            sources: Vec::new(),
            buckets: vec![Vec::new(); MIN_HSIZE as usize],
            entries: Vec::new(),
            hash_mask: MIN_HSIZE - 1,
            max_bytes_to_index,
            total_indexed_bytes: 0,
            aggregate_size: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_indexed_bytes == 0
    }

    pub fn total_indexed_bytes(&self) -> u64 {
        self.total_indexed_bytes
    }

    /// Reported memory footprint: the hash array, the entry pool, and the
    /// source list.
    pub fn size_in_bytes(&self) -> u64 {
        let hash_bytes: usize = self
            .buckets
            .iter()
            .map(|b| std::mem::size_of::<Vec<u32>>() + b.capacity() * std::mem::size_of::<u32>())
            .sum();
        let entry_bytes = self.entries.capacity() * std::mem::size_of::<IndexEntry>();
        let source_bytes = self.sources.capacity() * std::mem::size_of::<(u64, u64)>();
        (hash_bytes + entry_bytes + source_bytes) as u64
    }

    fn remaining_budget(&self) -> Option<usize> {
        self.max_bytes_to_index
            .map(|m| m.saturating_sub(self.total_indexed_bytes as usize))
    }

    /// Stride between sampled windows: one per window when uncapped, a
    /// coarser window-aligned stride when `max_bytes_to_index` bounds how
    /// much of this buffer may be sampled.
    fn stride_for(n_real: usize, cap: Option<usize>) -> usize {
        match cap {
            None => RABIN_WINDOW,
            Some(budget) => {
                let denom = (budget / RABIN_WINDOW).max(1);
                let raw = n_real.div_ceil(denom);
                raw.div_ceil(RABIN_WINDOW) * RABIN_WINDOW
            }
        }
        .max(RABIN_WINDOW)
    }

    fn insert_entry(&mut self, entry: IndexEntry<'a>) {
        let idx = self.entries.len() as u32;
        self.entries.push(entry);
        let bucket = (entry.hash_val & self.hash_mask) as usize;
        self.buckets[bucket].push(idx);
    }

    /// Recompute the ideal hash table size for the current indexed volume
    /// and, if it changed, rebuild the table from the entry pool (which is
    /// append-only, so redistributing it preserves original insertion
    /// order within each bucket).
    fn rebalance(&mut self) {
        let want = ideal_hsize(self.total_indexed_bytes.max(RABIN_WINDOW as u64));
        if want as usize == self.buckets.len() {
            return;
        }
        self.hash_mask = want - 1;
        self.buckets = vec![Vec::new(); want as usize];
        for (idx, entry) in self.entries.iter().enumerate() {
            let bucket = (entry.hash_val & self.hash_mask) as usize;
            self.buckets[bucket].push(idx as u32);
        }
    }

    /// Clip every bucket's chain to `HASH_LIMIT`, keeping the entries with
    /// the fewest distinct bytes in their window. Buckets that collide
    /// this heavily are usually runs of a single repeated byte; the extra
    /// entries have vanishing marginal value for match quality and would
    /// otherwise blow up encode time.
    fn prune_all(&mut self) {
        for bucket in &mut self.buckets {
            if bucket.len() <= HASH_LIMIT {
                continue;
            }
            let entries = &self.entries;
            bucket.sort_by_key(|&idx| {
                let e = &entries[idx as usize];
                let window = &e.forward()[..RABIN_WINDOW.min(e.forward().len())];
                let mut seen = [false; 256];
                let mut distinct = 0u32;
                for &b in window {
                    if !seen[b as usize] {
                        seen[b as usize] = true;
                        distinct += 1;
                    }
                }
                (distinct, e.offset)
            });
            bucket.truncate(HASH_LIMIT);
        }
    }

    /// Add a fulltext source buffer to the index.
    pub fn add_source(&mut self, buf: &'a [u8], unadded_bytes: u64) -> Result<(), Error> {
        if buf.len() < RABIN_WINDOW {
            return Err(Error::SourceEmpty);
        }
        let span_start = self.aggregate_size;
        self.sources.push((span_start, buf.len() as u64));

        if self.remaining_budget() != Some(0) {
            let stride = Self::stride_for(buf.len(), self.remaining_budget());
            let last = buf.len() - RABIN_WINDOW;
            let positions: Vec<usize> = (0..=last).step_by(stride).collect();
            for &p in positions.iter().rev() {
                let window: [u8; RABIN_WINDOW] = buf[p..p + RABIN_WINDOW].try_into().unwrap();
                let hash = rabin_hash(window);
                self.insert_entry(IndexEntry {
                    hash_val: hash.finish(),
                    offset: span_start + p as u64,
                    origin: buf,
                    local: p as u32,
                });
            }
            self.total_indexed_bytes += buf.len() as u64;
        }
        self.aggregate_size += buf.len() as u64 + unadded_bytes;
        self.rebalance();
        self.prune_all();
        log::debug!(
            "indexed fulltext source of {} bytes at aggregate offset {span_start}",
            buf.len()
        );
        Ok(())
    }

    /// Index a previously produced delta by walking its insert-literal
    /// regions only; the copy control bytes never become indexable
    /// windows, so a re-delta against this aggregate can never reference
    /// another delta's plumbing.
    pub fn add_delta_source(&mut self, delta: &'a [u8], unadded_bytes: u64) -> Result<(), Error> {
        let (_, n1) = read_base128_u64(delta)?;
        let (_, n2) = read_base128_u64(&delta[n1..])?;
        let mut pos = n1 + n2;

        let mut regions: Vec<(usize, usize)> = Vec::new();
        while pos < delta.len() {
            let (instr, new_pos) = decode_instruction(delta, pos)?;
            if let Instruction::Insert(payload) = instr {
                regions.push((new_pos - payload.len(), new_pos));
            }
            pos = new_pos;
        }

        let total_insert_bytes: usize = regions.iter().map(|&(s, e)| e - s).sum();
        if total_insert_bytes < RABIN_WINDOW {
            return Err(Error::SourceEmpty);
        }

        let span_start = self.aggregate_size;
        self.sources.push((span_start, delta.len() as u64));

        if self.remaining_budget() != Some(0) {
            let stride = Self::stride_for(total_insert_bytes, self.remaining_budget());
            for (start, end) in regions.into_iter().rev() {
                let region = &delta[start..end];
                if region.len() < RABIN_WINDOW {
                    continue;
                }
                let last = region.len() - RABIN_WINDOW;
                let positions: Vec<usize> = (0..=last).step_by(stride).collect();
                for &p in positions.iter().rev() {
                    let window: [u8; RABIN_WINDOW] = region[p..p + RABIN_WINDOW].try_into().unwrap();
                    let hash = rabin_hash(window);
                    self.insert_entry(IndexEntry {
                        hash_val: hash.finish(),
                        offset: span_start + (start + p) as u64,
                        origin: region,
                        local: p as u32,
                    });
                }
            }
            self.total_indexed_bytes += total_insert_bytes as u64;
        }
        self.aggregate_size += delta.len() as u64 + unadded_bytes;
        self.rebalance();
        self.prune_all();
        log::debug!(
            "indexed {total_insert_bytes} insert bytes from a {}-byte delta source",
            delta.len()
        );
        Ok(())
    }

    /// Look up the best match in `target_remaining` (which starts at the
    /// current scan position) among entries sharing `hash`. `min_len` is
    /// the shortest match worth replacing the current best; `good_enough`
    /// stops the scan early once a long enough match is found.
    pub(crate) fn find_best_match(
        &self,
        hash: u32,
        target_remaining: &[u8],
        min_len: usize,
        good_enough: usize,
    ) -> Option<(IndexEntry<'a>, usize)> {
        let bucket = &self.buckets[(hash & self.hash_mask) as usize];
        let mut best: Option<(IndexEntry<'a>, usize)> = None;

        for &idx in bucket {
            let entry = self.entries[idx as usize];
            if entry.hash_val != hash {
                continue;
            }
            let candidate = entry.forward();
            if candidate.len() < RABIN_WINDOW || candidate.len() <= min_len {
                continue;
            }
            let overlap = candidate
                .iter()
                .zip(target_remaining.iter())
                .take_while(|(a, b)| a == b)
                .count();
            if overlap <= min_len {
                continue;
            }
            let take = match best {
                None => true,
                Some((_, best_len)) if overlap > best_len => true,
                Some((best_entry, best_len)) => overlap == best_len && entry.offset < best_entry.offset,
            };
            if take {
                best = Some((entry, overlap));
                if overlap >= good_enough {
                    break;
                }
            }
        }
        best
    }

    /// Extend a forward match backwards into the bytes the encoder hasn't
    /// yet committed to output (i.e. `target[pending_start..i]`), bounded
    /// by how far back `entry`'s own origin buffer goes.
    pub(crate) fn extend_backward(
        entry: IndexEntry<'a>,
        forward_len: usize,
        target: &[u8],
        pending_start: usize,
        i: usize,
    ) -> (IndexEntry<'a>, usize, usize) {
        let backward = entry.backward();
        let max_back = backward.len().min(i - pending_start);
        let mut back = 0usize;
        while back < max_back && backward[backward.len() - 1 - back] == target[i - 1 - back] {
            back += 1;
        }
        let matched_entry = if back == 0 { entry } else { entry.retreat(back as u64) };
        (matched_entry, i - back, back + forward_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sources_shorter_than_window() {
        let mut index = Index::new(None);
        assert_eq!(index.add_source(b"short", 0), Err(Error::SourceEmpty));
    }

    #[test]
    fn bucket_chains_stay_within_hash_limit() {
        let mut index = Index::new(None);
        // Every 16-byte window here is identical, so they all land in the
        // same bucket; the prune step must still clip the chain.
        let buf = vec![b'x'; 1 << 16];
        index.add_source(&buf, 0).unwrap();
        assert!(index.buckets.iter().all(|b| b.len() <= HASH_LIMIT));
    }

    #[test]
    fn multi_source_offsets_are_aggregated() {
        let s1 = b"foo".repeat(32);
        let s2 = b"bar".repeat(32);
        let mut index = Index::new(None);
        index.add_source(&s1, 0).unwrap();
        index.add_source(&s2, 0).unwrap();
        assert_eq!(index.sources[0], (0, s1.len() as u64));
        assert_eq!(index.sources[1], (s1.len() as u64, s2.len() as u64));
    }
}
