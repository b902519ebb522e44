//! Trophy strata: partition keys and the partitions that produce them
//!
//! A [`Partition`] deterministically maps a trophy count to a [`Stratum`].
//! Three shapes are supported:
//! - `Bands`: lookup table of inclusive trophy ranges (the arena table)
//! - `Buckets`: fixed-width floors over `[0, ceiling)`
//! - `Custom`: caller-supplied function over a declared stratum list
//!
//! Every partition clamps: trophies above the top range land in the last
//! stratum, trophies below the lowest range land in the first.

use std::fmt;
use std::sync::Arc;

/// Width of a trophy bucket in bucket-based mode
pub const BUCKET_WIDTH: u32 = 100;

/// Exclusive upper bound of the bucket range (100 buckets of 100)
pub const BUCKET_CEILING: u32 = 10_000;

/// Arena tiers and their inclusive trophy ranges
pub const ARENA_TABLE: [(u32, u32, u32); 24] = [
    (2, 0, 299),
    (3, 300, 599),
    (4, 600, 999),
    (5, 1000, 1299),
    (6, 1300, 1599),
    (7, 1600, 1999),
    (8, 2000, 2299),
    (9, 2300, 2599),
    (10, 2600, 2999),
    (11, 3000, 3399),
    (12, 3400, 3799),
    (13, 3800, 4199),
    (14, 4200, 4599),
    (15, 4600, 4999),
    (16, 5000, 5499),
    (17, 5500, 5999),
    (18, 6000, 6499),
    (19, 6500, 6999),
    (20, 7000, 7499),
    (21, 7500, 7999),
    (22, 8000, 8499),
    (23, 8500, 8999),
    (24, 9000, 9499),
    (25, 9500, 10000),
];

/// A trophy-range partition key used for quota allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stratum {
    /// Arena tier number
    Arena(u32),

    /// Fixed-width bucket starting at `floor`
    Bucket { floor: u32, width: u32 },

    /// Caller-defined band
    Band(u32),
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stratum::Arena(n) => write!(f, "Arena {}", n),
            Stratum::Bucket { floor, width } => {
                write!(f, "{}-{}", floor, floor + width.saturating_sub(1))
            }
            Stratum::Band(n) => write!(f, "Band {}", n),
        }
    }
}

/// Inclusive trophy range mapped to one stratum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrophyBand {
    pub stratum: Stratum,
    pub low: u32,
    pub high: u32,
}

impl TrophyBand {
    pub fn new(stratum: Stratum, low: u32, high: u32) -> Self {
        Self { stratum, low, high }
    }

    pub fn contains(&self, trophies: u32) -> bool {
        self.low <= trophies && trophies <= self.high
    }
}

/// Caller-supplied partition function for hybrid mode
pub type PartitionFn = Arc<dyn Fn(u32) -> Stratum + Send + Sync>;

/// Deterministic mapping from trophy count to stratum
#[derive(Clone)]
pub enum Partition {
    /// Lookup table of trophy bands, sorted by `low`
    Bands(Vec<TrophyBand>),

    /// Uniform buckets of `width` trophies over `[0, ceiling)`
    Buckets { width: u32, ceiling: u32 },

    /// Caller function over a declared, non-empty stratum list
    Custom {
        strata: Vec<Stratum>,
        assign: PartitionFn,
    },
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Bands(bands) => f.debug_tuple("Bands").field(bands).finish(),
            Partition::Buckets { width, ceiling } => f
                .debug_struct("Buckets")
                .field("width", width)
                .field("ceiling", ceiling)
                .finish(),
            Partition::Custom { strata, .. } => f
                .debug_struct("Custom")
                .field("strata", strata)
                .finish_non_exhaustive(),
        }
    }
}

impl Partition {
    /// The fixed arena lookup table
    pub fn arenas() -> Self {
        Partition::Bands(
            ARENA_TABLE
                .iter()
                .map(|&(arena, low, high)| TrophyBand::new(Stratum::Arena(arena), low, high))
                .collect(),
        )
    }

    /// 100-trophy buckets spanning 0..10000
    pub fn buckets() -> Self {
        Partition::Buckets {
            width: BUCKET_WIDTH,
            ceiling: BUCKET_CEILING,
        }
    }

    /// Build a band table, sorting bands by their lower bound
    pub fn bands(mut bands: Vec<TrophyBand>) -> Self {
        bands.sort_by_key(|b| b.low);
        Partition::Bands(bands)
    }

    /// Wrap a caller function; results outside `strata` clamp to the last entry
    pub fn custom<F>(strata: Vec<Stratum>, assign: F) -> Self
    where
        F: Fn(u32) -> Stratum + Send + Sync + 'static,
    {
        Partition::Custom {
            strata,
            assign: Arc::new(assign),
        }
    }

    /// All strata this partition can produce, in ascending order
    pub fn strata(&self) -> Vec<Stratum> {
        let mut strata: Vec<Stratum> = match self {
            Partition::Bands(bands) => bands.iter().map(|b| b.stratum).collect(),
            Partition::Buckets { width, ceiling } => (0..bucket_count(*width, *ceiling))
                .map(|i| Stratum::Bucket {
                    floor: i * width,
                    width: *width,
                })
                .collect(),
            Partition::Custom { strata, .. } => strata.clone(),
        };
        strata.sort();
        strata.dedup();
        strata
    }

    /// Check that the partition can produce at least one stratum
    pub fn is_empty(&self) -> bool {
        match self {
            Partition::Bands(bands) => bands.is_empty(),
            Partition::Buckets { width, ceiling } => bucket_count(*width, *ceiling) == 0,
            Partition::Custom { strata, .. } => strata.is_empty(),
        }
    }

    /// Map a trophy count to its stratum
    ///
    /// Must not be called on an empty partition.
    pub fn stratum_for(&self, trophies: u32) -> Stratum {
        match self {
            Partition::Bands(bands) => {
                // Last band whose lower bound is <= trophies; below the table
                // falls back to the first band
                bands
                    .iter()
                    .rev()
                    .find(|b| b.low <= trophies)
                    .or_else(|| bands.first())
                    .map(|b| b.stratum)
                    .unwrap_or(Stratum::Band(0))
            }
            Partition::Buckets { width, ceiling } => {
                let count = bucket_count(*width, *ceiling).max(1);
                let index = (trophies / width).min(count - 1);
                Stratum::Bucket {
                    floor: index * width,
                    width: *width,
                }
            }
            Partition::Custom { strata, assign } => {
                let stratum = assign(trophies);
                if strata.contains(&stratum) {
                    stratum
                } else {
                    strata.last().copied().unwrap_or(stratum)
                }
            }
        }
    }
}

fn bucket_count(width: u32, ceiling: u32) -> u32 {
    if width == 0 {
        0
    } else {
        ceiling.div_ceil(width)
    }
}
