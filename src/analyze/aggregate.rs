//! Thresholded bucketing of classifier output and batch reduction.
//! Pure functions, no I/O.

use serde::{Deserialize, Serialize};

/// Classifier calls below this confidence are never trusted.
pub const CONFIDENCE_THRESHOLD: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentBucket {
    Bullish,
    Bearish,
    Neutral,
}

impl SentimentBucket {
    /// Fixed enumeration order; also the tie-break order for the dominant bucket.
    pub const ALL: [SentimentBucket; 3] = [Self::Bullish, Self::Bearish, Self::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Neutral => "NEUTRAL",
        }
    }

    /// Dashboard label with its marker.
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH 🚀",
            Self::Bearish => "BEARISH 🔻",
            Self::Neutral => "NEUTRAL 😐",
        }
    }
}

/// `score < 0.75` (or not a number) is NEUTRAL whatever the label says.
pub fn bucket_for(label: &str, score: f32, positive_label: &str) -> SentimentBucket {
    if !(score >= CONFIDENCE_THRESHOLD) {
        SentimentBucket::Neutral
    } else if label == positive_label {
        SentimentBucket::Bullish
    } else {
        SentimentBucket::Bearish
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BucketCounts {
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
}

impl BucketCounts {
    pub fn get(&self, b: SentimentBucket) -> usize {
        match b {
            SentimentBucket::Bullish => self.bullish,
            SentimentBucket::Bearish => self.bearish,
            SentimentBucket::Neutral => self.neutral,
        }
    }

    fn bump(&mut self, b: SentimentBucket) {
        match b {
            SentimentBucket::Bullish => self.bullish += 1,
            SentimentBucket::Bearish => self.bearish += 1,
            SentimentBucket::Neutral => self.neutral += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.bullish + self.bearish + self.neutral
    }

    /// Highest count; on a tie the earlier bucket in [`SentimentBucket::ALL`] wins.
    pub fn dominant(&self) -> SentimentBucket {
        let mut best = SentimentBucket::ALL[0];
        for b in SentimentBucket::ALL.into_iter().skip(1) {
            if self.get(b) > self.get(best) {
                best = b;
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub total: usize,
    pub counts: BucketCounts,
    pub dominant: SentimentBucket,
    /// `100 * bullish / total`.
    pub bullish_pct: f64,
}

/// Reduce already-bucketed labels. `None` for an empty batch ("no data").
pub fn summarize<I>(buckets: I) -> Option<SentimentSummary>
where
    I: IntoIterator<Item = SentimentBucket>,
{
    let mut counts = BucketCounts::default();
    for b in buckets {
        counts.bump(b);
    }
    let total = counts.total();
    if total == 0 {
        return None;
    }
    Some(SentimentSummary {
        total,
        counts,
        dominant: counts.dominant(),
        bullish_pct: 100.0 * counts.bullish as f64 / total as f64,
    })
}

/// Bucket raw `(label, score)` pairs and reduce them.
pub fn aggregate<'a, I>(batch: I, positive_label: &str) -> Option<SentimentSummary>
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    summarize(
        batch
            .into_iter()
            .map(|(label, score)| bucket_for(label, score, positive_label)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use SentimentBucket::*;

    const POS: &str = "LABEL_1";
    const NEG: &str = "LABEL_0";

    #[test]
    fn threshold_gates_labels() {
        assert_eq!(bucket_for(POS, 0.75, POS), Bullish);
        assert_eq!(bucket_for(NEG, 0.75, POS), Bearish);
        assert_eq!(bucket_for(POS, 0.7499, POS), Neutral);
        assert_eq!(bucket_for(NEG, 0.10, POS), Neutral);
        assert_eq!(bucket_for(POS, f32::NAN, POS), Neutral);
        assert_eq!(bucket_for("something_else", 0.99, POS), Bearish);
    }

    #[test]
    fn empty_batch_is_no_data() {
        assert_eq!(aggregate(Vec::<(&str, f32)>::new(), POS), None);
    }

    #[test]
    fn low_confidence_batch_is_all_neutral() {
        let batch = vec![(POS, 0.70), (NEG, 0.70), (POS, 0.70)];
        let s = aggregate(batch, POS).unwrap();
        assert_eq!(s.counts.neutral, 3);
        assert_eq!(s.dominant, Neutral);
        assert_eq!(s.bullish_pct, 0.0);
    }

    #[test]
    fn two_bulls_one_bear() {
        let s = aggregate(vec![(POS, 0.9), (POS, 0.9), (NEG, 0.9)], POS).unwrap();
        assert_eq!(
            s.counts,
            BucketCounts {
                bullish: 2,
                bearish: 1,
                neutral: 0
            }
        );
        assert_eq!(s.total, 3);
        assert_eq!(s.dominant, Bullish);
        assert!((s.bullish_pct - 66.666).abs() < 0.01);
    }

    #[test]
    fn ties_follow_enumeration_order() {
        assert_eq!(summarize([Bullish, Bearish]).unwrap().dominant, Bullish);
        assert_eq!(summarize([Neutral, Bearish]).unwrap().dominant, Bearish);
        assert_eq!(summarize([Neutral, Bullish]).unwrap().dominant, Bullish);
        assert_eq!(
            summarize([Neutral, Bearish, Bullish]).unwrap().dominant,
            Bullish
        );
        assert_eq!(summarize([Neutral, Neutral, Bullish]).unwrap().dominant, Neutral);
    }
}
