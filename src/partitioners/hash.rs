use std::hash::Hasher;

use seahash::SeaHasher;

use super::Route;
use crate::model::tuple::Tuple;

/// Routes by a hash of the selected fields, or of the whole tuple if
/// none are selected.
pub struct HashRoute {
    fields: Vec<String>,
}

impl HashRoute {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    fn hash(&self, tuple: &Tuple) -> u64 {
        let mut hasher = SeaHasher::new();
        if self.fields.is_empty() {
            for (name, value) in tuple.fields() {
                hasher.write(name.as_bytes());
                value.hash_into(&mut hasher);
            }
        } else {
            for field in &self.fields {
                match tuple.get(field) {
                    Some(value) => value.hash_into(&mut hasher),
                    None => hasher.write_u8(0),
                }
            }
        }
        hasher.finish()
    }
}

impl Route for HashRoute {
    fn route(&mut self, tuple: &Tuple, receivers: usize) -> Vec<usize> {
        let receivers = receivers.max(1) as u64;
        vec![(self.hash(tuple) % receivers) as usize]
    }
}

#[test]
fn same_key_same_receiver() {
    let mut route = HashRoute::new(vec!["k".to_owned()]);
    let rng = fastrand::Rng::with_seed(7);
    for _ in 0..100 {
        let key = rng.i64(..);
        let first = Tuple::new().with("k", key).with("v", rng.i32(..));
        let second = Tuple::new().with("k", key).with("v", rng.i32(..));
        assert_eq!(route.route(&first, 4), route.route(&second, 4));
    }
}

#[test]
fn whole_tuple_is_hashed_without_fields() {
    let mut route = HashRoute::new(Vec::new());
    let tuple = Tuple::new().with("a", 1).with("b", "x");
    let found = route.route(&tuple, 8);
    assert_eq!(route.route(&tuple.clone(), 8), found);
    assert!(found[0] < 8);
}
