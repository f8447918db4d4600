use super::Route;
use crate::model::tuple::Tuple;

/// Splits `[min, max]` into equal width buckets, one per receiver.
///
/// Values below the range land in the first bucket, values above it
/// in the last. Tuples without a numeric key go to the first bucket.
pub struct RangeRoute {
    fields: Vec<String>,
    min: i64,
    max: i64,
    width: i64,
}

impl RangeRoute {
    pub fn new(fields: Vec<String>, min: i64, max: i64, receivers: usize) -> Self {
        let buckets = i64::try_from(receivers.max(1)).unwrap_or(i64::MAX);
        let span = max.saturating_sub(min).max(0);
        let width = num::Integer::div_ceil(&span, &buckets).max(1);
        Self {
            fields,
            min,
            max,
            width,
        }
    }

    fn bucket(&self, value: f64, receivers: usize) -> usize {
        let last = receivers.max(1) - 1;
        if value < self.min as f64 {
            0
        } else if value > self.max as f64 {
            last
        } else {
            let index = ((value - self.min as f64) / self.width as f64).floor() as usize;
            index.min(last)
        }
    }
}

impl Route for RangeRoute {
    fn route(&mut self, tuple: &Tuple, receivers: usize) -> Vec<usize> {
        let key = self
            .fields
            .first()
            .and_then(|field| tuple.get(field))
            .and_then(|value| value.as_f64());
        match key {
            Some(value) => vec![self.bucket(value, receivers)],
            None => vec![0],
        }
    }
}

#[test]
fn buckets_are_equal_width_and_clamped() {
    let mut route = RangeRoute::new(vec!["k".to_owned()], 0, 100, 4);
    let at = |route: &mut RangeRoute, k: i64| route.route(&Tuple::new().with("k", k), 4)[0];
    assert_eq!(at(&mut route, -5), 0);
    assert_eq!(at(&mut route, 0), 0);
    assert_eq!(at(&mut route, 24), 0);
    assert_eq!(at(&mut route, 25), 1);
    assert_eq!(at(&mut route, 74), 2);
    assert_eq!(at(&mut route, 100), 3);
    assert_eq!(at(&mut route, 1000), 3);
}

#[test]
fn width_rounds_up() {
    // ceil(10 / 3) = 4: buckets [0,4) [4,8) [8,10]
    let mut route = RangeRoute::new(vec!["k".to_owned()], 0, 10, 3);
    let found: Vec<usize> = (0..=10)
        .map(|k| route.route(&Tuple::new().with("k", k), 3)[0])
        .collect();
    assert_eq!(found, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2]);
}

#[test]
fn non_numeric_key_goes_first() {
    let mut route = RangeRoute::new(vec!["k".to_owned()], 0, 10, 3);
    assert_eq!(route.route(&Tuple::new().with("k", "x"), 3), vec![0]);
    assert_eq!(route.route(&Tuple::new(), 3), vec![0]);
}
