use burn::data::dataloader::Progress;
use burn::prelude::*;
use burn::train::ClassificationOutput;
use burn::train::metric::{AccuracyMetric, Adaptor, LossMetric, Metric, MetricMetadata, Numeric};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchMetrics {
    pub loss: f64,
    /// Fraction of correctly classified examples, in `[0, 1]`.
    pub accuracy: f64,
}

/// Loss and accuracy of single classification batches.
pub struct ClassificationMetrics<B: Backend> {
    loss: LossMetric<B>,
    accuracy: AccuracyMetric<B>,
    metadata: MetricMetadata,
}

impl<B: Backend> ClassificationMetrics<B> {
    /// `items_total` is the number of examples the metrics will see overall.
    pub fn new(items_total: usize) -> Self {
        Self {
            loss: LossMetric::new(),
            accuracy: AccuracyMetric::new(),
            metadata: MetricMetadata {
                progress: Progress::new(0, items_total),
                epoch: 1,
                epoch_total: 1,
                iteration: 0,
                lr: None,
            },
        }
    }

    /// Updates the metrics with `output` and returns the values of that batch.
    pub fn update(&mut self, output: &ClassificationOutput<B>) -> BatchMetrics {
        let [batch_size] = output.targets.dims();
        self.metadata.iteration += 1;
        self.metadata.progress.items_processed += batch_size;

        self.loss.update(&output.adapt(), &self.metadata);
        self.accuracy.update(&output.adapt(), &self.metadata);

        BatchMetrics {
            loss: self.loss.value(),
            // the accuracy metric reports a percentage
            accuracy: self.accuracy.value() / 100.0,
        }
    }

    pub fn iterations(&self) -> usize {
        self.metadata.iteration
    }
}

/// Metrics of a single batch.
pub fn measure<B: Backend>(output: &ClassificationOutput<B>) -> BatchMetrics {
    let [batch_size] = output.targets.dims();
    ClassificationMetrics::new(batch_size).update(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn output(
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
        loss: f32,
    ) -> ClassificationOutput<B> {
        let loss = Tensor::<B, 1>::from_data([loss], &logits.device());
        ClassificationOutput::new(loss, logits, targets)
    }

    #[test]
    fn accuracy_counts_argmax_hits() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_data(
            [
                [0.1, 0.9, 0.0],
                [0.8, 0.1, 0.1],
                [0.2, 0.3, 0.5],
                [0.0, 0.0, 1.0],
            ],
            &device,
        );
        let targets = Tensor::<B, 1, Int>::from_data([1, 0, 0, 2], &device);
        let metrics = measure(&output(logits, targets, 1.0));
        assert!((metrics.accuracy - 0.75).abs() < 1e-9);
    }

    #[test]
    fn values_belong_to_the_latest_batch() {
        let device = Default::default();
        let mut metrics = ClassificationMetrics::<B>::new(4);

        let logits = Tensor::<B, 2>::from_data([[2.0, 1.0], [0.0, 3.0]], &device);
        let targets = Tensor::<B, 1, Int>::from_data([1, 1], &device);
        let first = metrics.update(&output(logits, targets, 0.5));
        assert!((first.loss - 0.5).abs() < 1e-6);
        assert!((first.accuracy - 0.5).abs() < 1e-9);

        let logits = Tensor::<B, 2>::from_data([[2.0, 1.0], [0.0, 3.0]], &device);
        let targets = Tensor::<B, 1, Int>::from_data([0, 1], &device);
        let second = metrics.update(&output(logits, targets, 0.25));
        assert!((second.loss - 0.25).abs() < 1e-6);
        assert!((second.accuracy - 1.0).abs() < 1e-9);
        assert_eq!(metrics.iterations(), 2);
    }
}
