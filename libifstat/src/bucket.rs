//! Packet size classification

use serde::Serialize;

/// Number of size ranges in the histogram
pub const SIZE_BUCKETS: usize = 7;
/// Number of counter slots per filter (size ranges, plus total bytes and total packets)
pub const BUCKET_LAST: usize = SIZE_BUCKETS + 2;

/// Index of a counter slot in a filter's counter table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(usize)]
pub enum BucketIndex {
    UpTo64 = 0,
    From65To127,
    From128To255,
    From256To511,
    From512To1023,
    From1024To1512,
    From1513,
    TotalBytes,
    TotalPackets,
}

impl BucketIndex {
    /// All counter slots, in table order
    pub const ALL: [BucketIndex; BUCKET_LAST] = [
        BucketIndex::UpTo64,
        BucketIndex::From65To127,
        BucketIndex::From128To255,
        BucketIndex::From256To511,
        BucketIndex::From512To1023,
        BucketIndex::From1024To1512,
        BucketIndex::From1513,
        BucketIndex::TotalBytes,
        BucketIndex::TotalPackets,
    ];

    /// Size ranges only
    pub const SIZES: [BucketIndex; SIZE_BUCKETS] = [
        BucketIndex::UpTo64,
        BucketIndex::From65To127,
        BucketIndex::From128To255,
        BucketIndex::From256To511,
        BucketIndex::From512To1023,
        BucketIndex::From1024To1512,
        BucketIndex::From1513,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short label, as used in reports
    pub const fn label(self) -> &'static str {
        match self {
            BucketIndex::UpTo64 => "64",
            BucketIndex::From65To127 => "65-127",
            BucketIndex::From128To255 => "128-255",
            BucketIndex::From256To511 => "256-511",
            BucketIndex::From512To1023 => "512-1023",
            BucketIndex::From1024To1512 => "1024-1512",
            BucketIndex::From1513 => "1513+",
            BucketIndex::TotalBytes => "bytes",
            BucketIndex::TotalPackets => "packets",
        }
    }
}

/// Map a packet length to its size range
///
/// Note: 127 matches no explicit range and falls into `1513+`.
pub fn classify(size: u16) -> BucketIndex {
    match size {
        0..=64 => BucketIndex::UpTo64,
        65..=126 => BucketIndex::From65To127,
        128..=255 => BucketIndex::From128To255,
        256..=511 => BucketIndex::From256To511,
        512..=1023 => BucketIndex::From512To1023,
        1024..=1512 => BucketIndex::From1024To1512,
        _ => BucketIndex::From1513,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds() {
        let cases = [
            (0, BucketIndex::UpTo64),
            (64, BucketIndex::UpTo64),
            (65, BucketIndex::From65To127),
            (126, BucketIndex::From65To127),
            (128, BucketIndex::From128To255),
            (255, BucketIndex::From128To255),
            (256, BucketIndex::From256To511),
            (511, BucketIndex::From256To511),
            (512, BucketIndex::From512To1023),
            (1023, BucketIndex::From512To1023),
            (1024, BucketIndex::From1024To1512),
            (1512, BucketIndex::From1024To1512),
            (1513, BucketIndex::From1513),
            (u16::MAX, BucketIndex::From1513),
        ];
        for (size, expected) in cases {
            assert_eq!(classify(size), expected, "size {}", size);
        }
    }

    #[test]
    fn gap_at_127() {
        assert_eq!(classify(127), BucketIndex::From1513);
    }

    #[test]
    fn total_over_u16() {
        let mut per_bucket = [0usize; SIZE_BUCKETS];
        for size in 0..=u16::MAX {
            let b = classify(size);
            assert!(b.index() < SIZE_BUCKETS);
            per_bucket[b.index()] += 1;
        }
        assert_eq!(per_bucket.iter().sum::<usize>(), 65536);
        assert_eq!(per_bucket[BucketIndex::UpTo64.index()], 65);
        assert_eq!(per_bucket[BucketIndex::From65To127.index()], 62);
        // 1513..=65535 plus the stray 127
        assert_eq!(per_bucket[BucketIndex::From1513.index()], 65536 - 1513 + 1);
    }

    #[test]
    fn table_order() {
        for (i, b) in BucketIndex::ALL.iter().enumerate() {
            assert_eq!(b.index(), i);
        }
        assert_eq!(BucketIndex::SIZES[..], BucketIndex::ALL[..SIZE_BUCKETS]);
    }
}
