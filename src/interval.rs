use std::fmt::{Debug, Formatter};

use chrono::DateTime;
use chrono_tz::Tz;

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Interval {
    /// Inclusive.
    pub start: DateTime<Tz>,

    /// Exclusive.
    pub end: DateTime<Tz>,
}

impl Debug for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl Interval {
    pub const fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        Self { start, end }
    }

    pub fn contains(self, other: DateTime<Tz>) -> bool {
        (self.start <= other) && (other < self.end)
    }

    /// Half-open overlap: touching intervals do not overlap.
    pub fn overlaps(self, other: Self) -> bool {
        (self.start < other.end) && (other.start < self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Bogota;

    fn at(hour: u32, minute: u32) -> DateTime<Tz> {
        Bogota.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_overlaps_partial() {
        let a = Interval::new(at(10, 0), at(10, 30));
        let b = Interval::new(at(10, 15), at(10, 45));
        assert!(a.overlaps(b));
        assert!(b.overlaps(a));
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let a = Interval::new(at(10, 0), at(10, 30));
        let b = Interval::new(at(10, 30), at(11, 0));
        assert!(!a.overlaps(b));
        assert!(!b.overlaps(a));
    }

    #[test]
    fn test_contained_interval_overlaps() {
        let outer = Interval::new(at(9, 0), at(12, 0));
        let inner = Interval::new(at(10, 0), at(10, 30));
        assert!(outer.overlaps(inner));
        assert!(inner.overlaps(outer));
    }

    #[test]
    fn test_contains_is_half_open() {
        let a = Interval::new(at(10, 0), at(10, 30));
        assert!(a.contains(at(10, 0)));
        assert!(!a.contains(at(10, 30)));
    }
}
