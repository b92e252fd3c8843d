use super::DatasetError;
use burn_dataset::Dataset;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::marker::PhantomData;

/// Endless source of shuffled mini-batches over a dataset.
///
/// The item order is reshuffled at the start of every epoch. A batch that
/// crosses an epoch boundary takes the rest of the finished epoch followed
/// by the head of the next one, so every batch has the requested size.
pub struct MiniBatchSampler<D, I> {
    dataset: D,
    order: Vec<usize>,
    cursor: usize,
    epochs_completed: usize,
    rng: StdRng,
    _item: PhantomData<I>,
}

impl<D: Dataset<I>, I> MiniBatchSampler<D, I> {
    pub fn new(dataset: D, seed: u64) -> Result<Self, DatasetError> {
        if dataset.is_empty() {
            return Err(DatasetError::Empty);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut rng);

        Ok(Self {
            dataset,
            order,
            cursor: 0,
            epochs_completed: 0,
            rng,
            _item: PhantomData,
        })
    }

    pub fn epochs_completed(&self) -> usize {
        self.epochs_completed
    }

    /// Indices of the next `batch_size` items.
    pub fn next_indices(&mut self, batch_size: usize) -> Vec<usize> {
        let mut indices = Vec::with_capacity(batch_size);
        while indices.len() < batch_size {
            if self.cursor == self.order.len() {
                self.epochs_completed += 1;
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            let take = (batch_size - indices.len()).min(self.order.len() - self.cursor);
            indices.extend_from_slice(&self.order[self.cursor..self.cursor + take]);
            self.cursor += take;
        }
        indices
    }

    /// The next `batch_size` items.
    pub fn next_items(&mut self, batch_size: usize) -> Vec<I> {
        self.next_indices(batch_size)
            .into_iter()
            .filter_map(|index| self.dataset.get(index))
            .collect()
    }
}
