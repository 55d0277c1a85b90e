/// Flat error taxonomy for the delta engine. Every error kind carries no
/// data beyond its kind: callers get to know *what* went wrong, not an
/// attached diagnostic, matching the original C extension's errno-style
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Allocation failed while building an index or encoding a delta.
    OutOfMemory,
    /// `make_delta` was called against an index with no indexed sources.
    IndexNeeded,
    /// A source (or the insert-only content of an indexed delta) was
    /// shorter than `RABIN_WINDOW` and cannot be indexed.
    SourceEmpty,
    /// A delta buffer is malformed: a reserved opcode, truncation, a
    /// source-size mismatch, or an out-of-bounds copy.
    SourceBad,
    /// The target buffer passed to `make_delta` was empty.
    BufferEmpty,
    /// `encode` exceeded the caller-supplied `max_delta_size`.
    SizeTooBig,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Error::OutOfMemory => "out of memory",
            Error::IndexNeeded => "an index is required before a delta can be made",
            Error::SourceEmpty => "source is too small to index",
            Error::SourceBad => "delta buffer is malformed or inconsistent with its source",
            Error::BufferEmpty => "target buffer is empty",
            Error::SizeTooBig => "delta exceeded the requested maximum size",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}
