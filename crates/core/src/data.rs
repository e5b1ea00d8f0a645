//! Dense and sparse views of asset bytes.
//!
//! A [`DenseData`] is one contiguous run of bytes at a known offset. A
//! [`SparseData`] is the normalized union of dense runs for a single asset:
//! disjoint, non-adjacent, sorted by start offset. Buffers are immutable and
//! cheap to clone; everyone holding a fragment shares the same allocation.

use crate::range::Range;
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fmt;

/// An immutable byte buffer tagged with its starting offset within the asset.
///
/// The `eof` flag records that the buffer is known to end at the end of the
/// file; it is set by whole-file fetches and lets sparse coverage answer
/// unbounded queries.
#[derive(Clone)]
pub struct DenseData {
    start: u64,
    data: Bytes,
    eof: bool,
}

impl DenseData {
    pub fn new(start: u64, data: impl Into<Bytes>) -> Self {
        Self {
            start,
            data: data.into(),
            eof: false,
        }
    }

    /// A buffer whose last byte is known to be the last byte of the asset.
    pub fn with_eof(start: u64, data: impl Into<Bytes>) -> Self {
        Self {
            start,
            data: data.into(),
            eof: true,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// The byte range this buffer covers.
    pub fn range(&self) -> Range {
        if self.eof {
            Range::bounds_to_eof(self.start, self.end())
        } else {
            Range::bounds(self.start, self.end())
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The bytes from an absolute offset to the end of this buffer, or `None`
    /// if the offset falls outside it.
    pub fn data_at(&self, offset: u64) -> Option<&[u8]> {
        if offset < self.start || offset >= self.end() {
            return None;
        }
        Some(&self.data[(offset - self.start) as usize..])
    }
}

impl fmt::Debug for DenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DenseData({:?}, {} bytes)", self.range(), self.len())
    }
}

/// An ordered, non-overlapping, non-adjacent collection of dense fragments
/// for a single asset.
#[derive(Clone, Default)]
pub struct SparseData {
    fragments: BTreeMap<u64, DenseData>,
}

impl SparseData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dense(data: DenseData) -> Self {
        let mut sparse = Self::new();
        sparse.insert(data);
        sparse
    }

    /// Insert a fragment, coalescing with everything it overlaps or touches.
    ///
    /// Where the new fragment and an existing one cover the same offset the
    /// new bytes win; the non-overlapping prefix and suffix of displaced
    /// fragments are retained and the whole run becomes one buffer. A
    /// fragment flagged end-of-file truncates anything recorded beyond it.
    pub fn insert(&mut self, new: DenseData) {
        if new.is_empty() && !new.is_eof() {
            return;
        }
        let new_upper = if new.is_eof() { u64::MAX } else { new.end() };

        let mut affected: Vec<u64> = Vec::new();
        if let Some((&key, frag)) = self.fragments.range(..new.start()).next_back() {
            if frag.end() >= new.start() {
                affected.push(key);
            }
        }
        affected.extend(
            self.fragments
                .range(new.start()..)
                .take_while(|(&key, _)| key <= new_upper)
                .map(|(&key, _)| key),
        );

        let mut prefix: Option<(u64, Bytes)> = None;
        let mut suffix: Option<(Bytes, bool)> = None;
        for key in affected {
            let Some(frag) = self.fragments.remove(&key) else {
                continue;
            };
            if frag.start() < new.start() {
                let keep = (new.start() - frag.start()) as usize;
                prefix = Some((frag.start(), frag.bytes().slice(..keep)));
            }
            if new.is_eof() {
                // The new buffer ends at end-of-file; nothing valid exists
                // beyond it.
                continue;
            }
            if frag.end() > new.end() {
                let skip = (new.end() - frag.start()) as usize;
                suffix = Some((frag.bytes().slice(skip..), frag.is_eof()));
            } else if frag.end() == new.end() && frag.is_eof() {
                suffix = Some((Bytes::new(), true));
            }
        }

        let eof = new.is_eof() || suffix.as_ref().is_some_and(|(_, eof)| *eof);
        let suffix_bytes = suffix.map(|(bytes, _)| bytes).unwrap_or_default();
        if prefix.is_none() && suffix_bytes.is_empty() {
            self.fragments.insert(
                new.start(),
                DenseData {
                    start: new.start(),
                    data: new.data,
                    eof,
                },
            );
            return;
        }

        let start = prefix.as_ref().map_or(new.start(), |(start, _)| *start);
        let prefix_bytes = prefix.map(|(_, bytes)| bytes).unwrap_or_default();
        let mut buf =
            BytesMut::with_capacity(prefix_bytes.len() + new.len() + suffix_bytes.len());
        buf.extend_from_slice(&prefix_bytes);
        buf.extend_from_slice(new.as_slice());
        buf.extend_from_slice(&suffix_bytes);
        self.fragments.insert(
            start,
            DenseData {
                start,
                data: buf.freeze(),
                eof,
            },
        );
    }

    /// Whether the fragments cover every byte of `range`. Normalization
    /// guarantees a contiguous request is covered by a single fragment, so
    /// this is a lookup, not a walk.
    pub fn contains_range(&self, range: &Range) -> bool {
        let Some((_, frag)) = self.fragments.range(..=range.start()).next_back() else {
            return false;
        };
        if range.start() > frag.end() {
            return false;
        }
        if range.goes_to_eof() && !frag.is_eof() {
            return false;
        }
        range.end() <= frag.end()
    }

    /// The contiguous bytes starting at `offset`, or `None` when the offset
    /// falls in a hole. The returned slice runs to the end of the covering
    /// fragment.
    pub fn data_at(&self, offset: u64) -> Option<&[u8]> {
        let (_, frag) = self.fragments.range(..=offset).next_back()?;
        frag.data_at(offset)
    }

    /// Fragments in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &DenseData> {
        self.fragments.values()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Total bytes held across all fragments.
    pub fn total_bytes(&self) -> u64 {
        self.fragments.values().map(|f| f.len() as u64).sum()
    }
}

impl fmt::Debug for SparseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.fragments.values().map(|frag| frag.range()))
            .finish()
    }
}
