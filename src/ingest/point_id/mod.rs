
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::Rng;

/// Low bits of every point id hold the allocator tag
const TAG_BITS: u32 = 10;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;
/// Sequence slots per wall-clock millisecond
const SLOTS_PER_MILLI: u64 = 1000;

/// End of the most recently reserved block, shared by every allocator in the process
static LAST_RESERVED: AtomicU64 = AtomicU64::new(0);

/// Hands out vector point identifiers.
///
/// Each run reserves a contiguous block of sequence numbers seeded from the
/// wall clock, so ids grow with chunk ordinal within a run and blocks never
/// overlap inside one process. The random tag in the low bits separates
/// allocators in different processes that reserve the same sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointIdAllocator {
    tag: u64,
}

/// Ids reserved for one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointIdBlock {
    base: u64,
    len: usize,
    tag: u64,
}

impl Default for PointIdAllocator {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl PointIdAllocator {
    #[inline]
    pub fn new() -> Self {
        Self {
            tag: rand::thread_rng().gen_range(0..=TAG_MASK),
        }
    }

    /// Allocator with a fixed tag; only the low 10 bits are kept
    #[inline]
    pub fn with_tag(tag: u16) -> Self {
        Self {
            tag: u64::from(tag) & TAG_MASK,
        }
    }

    #[inline]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Reserve ids for `count` ordinals
    #[inline]
    pub fn reserve(&self, count: usize) -> PointIdBlock {
        let now = u64::try_from(Utc::now().timestamp_millis())
            .unwrap_or(0)
            .saturating_mul(SLOTS_PER_MILLI);
        let span = count.max(1) as u64;

        let mut current = LAST_RESERVED.load(Ordering::Relaxed);
        loop {
            let base = now.max(current);
            match LAST_RESERVED.compare_exchange_weak(
                current,
                base + span,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return PointIdBlock {
                        base,
                        len: count,
                        tag: self.tag,
                    };
                }
                Err(observed) => current = observed,
            }
        }
    }
}

impl PointIdBlock {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Id for `ordinal`, or `None` if the ordinal lies outside the block
    #[inline]
    pub fn id_for(&self, ordinal: usize) -> Option<u64> {
        if ordinal >= self.len {
            return None;
        }
        Some(((self.base + ordinal as u64) << TAG_BITS) | self.tag)
    }
}
