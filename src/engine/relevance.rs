use serde::{Deserialize, Serialize};
use std::fmt;

/// Optional distance cutoff applied to search results after ranking.
///
/// Distances are squared L2, so a cutoff is an upper bound: a hit is kept when
/// its distance is less than or equal to the cutoff.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelevancePolicy {
    /// Keep every ranked hit
    #[default]
    AcceptAll,
    /// Keep hits no farther than `value`
    MaxDistance { value: f32 },
    /// Cutoff of `base - step * min(words, max_words)`, where `words` is the
    /// number of whitespace-separated words in the query. Longer queries are
    /// held to a tighter cutoff.
    QueryLengthScaled {
        base: f32,
        step: f32,
        max_words: usize,
    },
}

impl RelevancePolicy {
    #[inline]
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::AcceptAll => Ok(()),
            Self::MaxDistance { value } => {
                if value.is_finite() && value >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("max distance must be a non-negative number, got {value}"))
                }
            }
            Self::QueryLengthScaled {
                base,
                step,
                max_words,
            } => {
                if !base.is_finite() || base < 0.0 {
                    return Err(format!("base must be a non-negative number, got {base}"));
                }
                if !step.is_finite() || step < 0.0 {
                    return Err(format!("step must be a non-negative number, got {step}"));
                }
                if max_words == 0 {
                    return Err("max_words must be at least 1".to_string());
                }
                if base - step * (max_words as f32) < 0.0 {
                    return Err(format!(
                        "cutoff becomes negative for queries of {max_words} words"
                    ));
                }
                Ok(())
            }
        }
    }

    /// Largest accepted distance for `query`, or `None` when every hit is kept
    #[inline]
    pub fn cutoff(&self, query: &str) -> Option<f32> {
        match *self {
            Self::AcceptAll => None,
            Self::MaxDistance { value } => Some(value),
            Self::QueryLengthScaled {
                base,
                step,
                max_words,
            } => {
                let words = query.split_whitespace().count().min(max_words);
                Some(base - step * words as f32)
            }
        }
    }

    #[inline]
    pub fn accepts(&self, query: &str, distance: f32) -> bool {
        self.cutoff(query).is_none_or(|max| distance <= max)
    }
}

impl fmt::Display for RelevancePolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::AcceptAll => write!(f, "accept all"),
            Self::MaxDistance { value } => write!(f, "max distance {value}"),
            Self::QueryLengthScaled {
                base,
                step,
                max_words,
            } => write!(
                f,
                "scaled by query length ({base} - {step} per word, up to {max_words} words)"
            ),
        }
    }
}
