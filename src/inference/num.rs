//! Numeric facets: `min`/`max`/`size`/`between`/`gt`/... collected while the
//! final kind is still unknown, then mapped to length, value or item bounds.
use crate::ir::{Constraints, Format, Kind};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bound {
    pub value: f64,
    pub exclusive: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawBounds {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl RawBounds {
    pub fn set_lower(&mut self, value: f64, exclusive: bool) {
        self.lower = Some(Bound { value, exclusive });
    }

    pub fn set_upper(&mut self, value: f64, exclusive: bool) {
        self.upper = Some(Bound { value, exclusive });
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Writes the bounds into `c` in the units `kind` measures.
    pub fn apply(&self, kind: Kind, format: Option<Format>, c: &mut Constraints) {
        // file sizes are kilobytes, not lengths
        if format == Some(Format::Binary) {
            return;
        }
        match kind {
            Kind::String => {
                c.min_length = self.lower.map(|b| count(b, true));
                c.max_length = self.upper.map(|b| count(b, false));
            }
            Kind::Array => {
                c.min_items = self.lower.map(|b| count(b, true));
                c.max_items = self.upper.map(|b| count(b, false));
            }
            Kind::Integer => {
                c.minimum = self.lower.map(|b| if b.exclusive { b.value.floor() + 1.0 } else { b.value });
                c.maximum = self.upper.map(|b| if b.exclusive { b.value.ceil() - 1.0 } else { b.value });
            }
            Kind::Number => {
                c.minimum = self.lower.map(|b| b.value);
                c.maximum = self.upper.map(|b| b.value);
            }
            Kind::Boolean | Kind::Object | Kind::Union => {}
        }
    }
}

fn count(b: Bound, lower: bool) -> u64 {
    let v = b.value.max(0.0);
    let v = match (lower, b.exclusive) {
        (true, true) => v.floor() + 1.0,
        (true, false) => v.ceil(),
        (false, true) => (v.ceil() - 1.0).max(0.0),
        (false, false) => v.floor(),
    };
    v as u64
}

/// Numeric rule parameter; field references (`gt:other_field`) are not numbers.
pub fn parse_param(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(bounds: &RawBounds, kind: Kind) -> Constraints {
        let mut c = Constraints::default();
        bounds.apply(kind, None, &mut c);
        c
    }

    #[test]
    fn units_follow_the_final_kind() {
        let mut b = RawBounds::default();
        b.set_lower(1.0, false);
        b.set_upper(10.0, false);

        let s = applied(&b, Kind::String);
        assert_eq!((s.min_length, s.max_length), (Some(1), Some(10)));
        let i = applied(&b, Kind::Integer);
        assert_eq!((i.minimum, i.maximum), (Some(1.0), Some(10.0)));
        let a = applied(&b, Kind::Array);
        assert_eq!((a.min_items, a.max_items), (Some(1), Some(10)));
        assert!(applied(&b, Kind::Boolean).is_empty());
    }

    #[test]
    fn exclusive_bounds_tighten_integers() {
        let mut b = RawBounds::default();
        b.set_lower(0.0, true);
        b.set_upper(5.0, true);
        let i = applied(&b, Kind::Integer);
        assert_eq!((i.minimum, i.maximum), (Some(1.0), Some(4.0)));
    }

    #[test]
    fn file_sizes_are_not_lengths() {
        let mut b = RawBounds::default();
        b.set_upper(2048.0, false);
        let mut c = Constraints::default();
        b.apply(Kind::String, Some(Format::Binary), &mut c);
        assert!(c.is_empty());
    }

    #[test]
    fn field_references_are_not_numeric() {
        assert_eq!(parse_param("12.5"), Some(12.5));
        assert_eq!(parse_param("starts_at"), None);
    }
}
