use super::Route;
use crate::model::tuple::Tuple;

/// Everything goes to the single receiver fed by this worker.
pub struct OneToOneRoute;

impl Route for OneToOneRoute {
    fn route(&mut self, _tuple: &Tuple, _receivers: usize) -> Vec<usize> {
        vec![0]
    }
}
