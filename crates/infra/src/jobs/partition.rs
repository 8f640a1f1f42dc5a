//! Batch partitioner: splits an item list into ordered, fixed-size sub-batches.

/// Iterator over owned sub-batches of at most `size` items.
///
/// Only the final sub-batch may be shorter.
#[derive(Debug)]
pub struct SubBatches<T> {
    items: std::vec::IntoIter<T>,
    size: usize,
}

impl<T> Iterator for SubBatches<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<T> = self.items.by_ref().take(self.size).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = batch_count(self.items.len(), self.size);
        (n, Some(n))
    }
}

impl<T> ExactSizeIterator for SubBatches<T> {}

/// Split `items` into sub-batches of `size` (0 is treated as 1).
pub fn partition<T>(items: Vec<T>, size: usize) -> SubBatches<T> {
    SubBatches {
        items: items.into_iter(),
        size: size.max(1),
    }
}

/// Number of sub-batches `partition(items, size)` yields for `len` items.
pub fn batch_count(len: usize, size: usize) -> usize {
    len.div_ceil(size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_into_fixed_size_batches() {
        let batches: Vec<_> = partition((1..=7).collect(), 3).collect();
        assert_eq!(batches, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut batches = partition(Vec::<u8>::new(), 5);
        assert_eq!(batches.len(), 0);
        assert!(batches.next().is_none());
    }

    #[test]
    fn zero_size_is_clamped() {
        let batches: Vec<_> = partition(vec!['a', 'b'], 0).collect();
        assert_eq!(batches, vec![vec!['a'], vec!['b']]);
        assert_eq!(batch_count(2, 0), 2);
    }

    proptest! {
        #[test]
        fn partition_preserves_items_and_bounds(
            items in proptest::collection::vec(any::<u32>(), 0..200),
            size in 1usize..25,
        ) {
            let batches: Vec<Vec<u32>> = partition(items.clone(), size).collect();

            prop_assert_eq!(batches.len(), batch_count(items.len(), size));
            for (i, batch) in batches.iter().enumerate() {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() <= size);
                if i + 1 < batches.len() {
                    prop_assert_eq!(batch.len(), size);
                }
            }

            let flattened: Vec<u32> = batches.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }
}
