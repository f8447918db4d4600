use super::Route;
use crate::model::tuple::Tuple;

/// Cycles through receivers in registration order.
#[derive(Debug, Default)]
pub struct RoundRobinRoute {
    next: usize,
}

impl Route for RoundRobinRoute {
    fn route(&mut self, _tuple: &Tuple, receivers: usize) -> Vec<usize> {
        let index = self.next % receivers.max(1);
        self.next = (index + 1) % receivers.max(1);
        vec![index]
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}
