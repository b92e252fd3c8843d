use crate::error::{Error, Result};
use crate::metric::{BatchMetrics, measure};
use crate::mnist::{MnistBatch, MnistBatcher, MnistFlatItem};
use crate::model::ConvNet;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn_dataset::Dataset;
use log::info;

/// Metrics of `model` on the first `num_examples` items of `dataset`, in a single forward pass.
pub fn evaluate<B: Backend>(
    model: &ConvNet<B>,
    dataset: &impl Dataset<MnistFlatItem>,
    num_examples: usize,
    device: &B::Device,
) -> Result<BatchMetrics> {
    let items: Vec<_> = (0..num_examples.min(dataset.len()))
        .filter_map(|index| dataset.get(index))
        .collect();
    if items.is_empty() {
        return Err(Error::EmptyEvaluation);
    }
    info!("Evaluating on {} test examples", items.len());

    let batch: MnistBatch<B> = MnistBatcher::default().batch(items, device);
    let output = model.forward_classification(batch.images, batch.targets);
    Ok(measure(&output))
}
