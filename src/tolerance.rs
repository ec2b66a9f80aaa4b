use crate::value::Number;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Slack applied to numeric comparisons.
///
/// A tolerance widens the right-hand side of a comparison into a band of
/// accepted values. `left = right` holds when `left` falls inside the band,
/// `left >= right` when `left` reaches the bottom of the band, `left <= right`
/// when it does not exceed the top of the band.
///
/// ```
/// # use formulary::Tolerance;
/// let tolerance = Tolerance::range(-1.0, 1.0);
/// assert_eq!(tolerance.band(6.0), (5.0, 7.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Tolerance {
    /// Signed offsets added to the right-hand side
    #[allow(missing_docs)]
    Range { lower: f64, upper: f64 },
    /// Signed integer offsets, compared exactly for integer operands
    #[allow(missing_docs)]
    IntegerRange { lower: i64, upper: i64 },
    /// A fraction of the magnitude of the right-hand side, on both sides
    Proportion(f64),
}

impl Tolerance {
    /// Offsets added to the right-hand side
    pub fn range(lower: f64, upper: f64) -> Self {
        Self::Range { lower, upper }
    }

    /// Integer offsets added to the right-hand side
    pub fn integer_range(lower: i64, upper: i64) -> Self {
        Self::IntegerRange { lower, upper }
    }

    /// `percentage` percent of the right-hand side, on both sides
    pub fn percentage(percentage: f64) -> Self {
        Self::Proportion(percentage / 100.0)
    }

    /// The band of values accepted for `right`
    pub fn band(&self, right: f64) -> (f64, f64) {
        match *self {
            Self::Range { lower, upper } => (right + lower, right + upper),
            #[allow(clippy::cast_precision_loss)]
            Self::IntegerRange { lower, upper } => (right + lower as f64, right + upper as f64),
            Self::Proportion(proportion) => {
                let slack = (right * proportion).abs();
                (right - slack, right + slack)
            }
        }
    }

    /// Where `left` falls relative to the band around `right`: `Less` below
    /// it, `Equal` inside it, `Greater` above it.
    pub fn position(&self, left: Number, right: Number) -> Option<Ordering> {
        if let (Self::IntegerRange { lower, upper }, Number::Integer(l), Number::Integer(r)) =
            (self, left, right)
        {
            let low = r.saturating_add(*lower);
            let high = r.saturating_add(*upper);
            return Some(if l < low {
                Ordering::Less
            } else if l > high {
                Ordering::Greater
            } else {
                Ordering::Equal
            });
        }
        let left = left.as_f64();
        let (low, high) = self.band(right.as_f64());
        if left.is_nan() || low.is_nan() || high.is_nan() {
            return None;
        }
        Some(if left < low {
            Ordering::Less
        } else if left > high {
            Ordering::Greater
        } else {
            Ordering::Equal
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Tolerance;
    use crate::value::Number;
    use std::cmp::Ordering;

    #[test]
    fn integer_ranges_are_exact() {
        let tolerance = Tolerance::integer_range(-1, 1);
        assert_eq!(
            tolerance.position(Number::Integer(5), Number::Integer(6)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            tolerance.position(Number::Integer(4), Number::Integer(6)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn proportions() {
        let tolerance = Tolerance::percentage(10.0);
        assert_eq!(
            tolerance.position(Number::Float(105.0), Number::Integer(100)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            tolerance.position(Number::Float(111.0), Number::Integer(100)),
            Some(Ordering::Greater)
        );
        assert_eq!(tolerance.position(Number::Float(f64::NAN), Number::Integer(1)), None);
    }
}
