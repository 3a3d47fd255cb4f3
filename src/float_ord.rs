use std::cmp::Ordering;

/// Total order over `f64` for use as a heap key.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct FloatOrd(pub(crate) f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Min-heap entry keyed by cost, ties broken by the smaller node index.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct QueueEntry {
    pub(crate) node: usize,
    pub(crate) cost: FloatOrd,
}

impl QueueEntry {
    pub(crate) fn new(node: usize, cost: f64) -> Self {
        Self {
            node,
            cost: FloatOrd(cost),
        }
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the cheapest entry first.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn heap_pops_cheapest_first() {
        let mut heap = BinaryHeap::new();
        heap.push(QueueEntry::new(1, 3.0));
        heap.push(QueueEntry::new(2, 1.0));
        heap.push(QueueEntry::new(0, 1.0));
        heap.push(QueueEntry::new(3, 2.0));
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop()).map(|e| e.node).collect();
        assert_eq!(order, vec![0, 2, 3, 1]);
    }
}
