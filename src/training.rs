use crate::error;
use crate::metric::{BatchMetrics, ClassificationMetrics};
use crate::mnist::{MiniBatchSampler, MnistBatch, MnistBatcher, MnistFlatItem};
use crate::model::{ConvNet, ConvNetConfig, ModelConfigExt};
use crate::summary::SummaryWriter;
use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_dataset::Dataset;
use log::{debug, info};

#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Budget of training examples, the loop stops once `step * batch_size` reaches it.
    #[config(default = 200000)]
    pub training_iters: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    /// Number of steps between two metric print-outs.
    #[config(default = 10)]
    pub display_step: usize,
    /// Number of leading test examples used by the final evaluation.
    #[config(default = 256)]
    pub test_examples: usize,
    #[config(default = 0)]
    pub seed: u64,
}

impl TrainingConfig {
    /// Number of optimization steps, i.e. the steps `s >= 1` with `s * batch_size < training_iters`.
    pub fn num_steps(&self) -> usize {
        self.training_iters.saturating_sub(1) / self.batch_size
    }
}

/// Adam with the usual `beta_1 = 0.9`, `beta_2 = 0.999`, `epsilon = 1e-8`.
pub fn optimizer_config() -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayedMetrics {
    pub step: usize,
    pub metrics: BatchMetrics,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    /// Number of optimization steps executed.
    pub steps: usize,
    /// Metrics printed every `display_step` steps, computed without dropout.
    pub displayed: Vec<DisplayedMetrics>,
}

/// Owns the parameters and optimizer state for the duration of a training run.
pub struct TrainingSession<AutoB: AutodiffBackend> {
    model: ConvNet<AutoB>,
    optim: OptimizerAdaptor<Adam, ConvNet<AutoB>, AutoB>,
    batcher: MnistBatcher,
    train_metrics: ClassificationMetrics<AutoB>,
    display_metrics: ClassificationMetrics<AutoB::InnerBackend>,
    config: TrainingConfig,
    device: AutoB::Device,
}

impl<AutoB: AutodiffBackend> TrainingSession<AutoB> {
    /// Seeds the backend, then initializes the parameters and the optimizer.
    pub fn new(config: TrainingConfig, model_config: &ConvNetConfig, device: AutoB::Device) -> Self {
        AutoB::seed(config.seed);
        let model = ModelConfigExt::<AutoB>::init(model_config, &device);
        let optim = config.optimizer.init::<AutoB, ConvNet<AutoB>>();
        info!(
            "Initialized a model with {} parameters, {} training steps planned",
            model.num_params(),
            config.num_steps()
        );

        let planned_items = config.num_steps() * config.batch_size;
        let displayed_items = config.num_steps() / config.display_step * config.batch_size;
        Self {
            model,
            optim,
            batcher: MnistBatcher::default(),
            train_metrics: ClassificationMetrics::new(planned_items),
            display_metrics: ClassificationMetrics::new(displayed_items),
            config,
            device,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &ConvNet<AutoB> {
        &self.model
    }

    /// Runs one optimization step on `batch`.
    /// Returns the metrics of the forward pass used for the update (dropout active).
    pub fn optimize(&mut self, batch: MnistBatch<AutoB>) -> BatchMetrics {
        let output = self
            .model
            .forward_classification(batch.images, batch.targets);
        let metrics = self.train_metrics.update(&output);

        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optim
            .step(self.config.learning_rate, self.model.clone(), grads);

        metrics
    }

    /// Loss and accuracy of the current parameters on `batch`, without dropout.
    pub fn evaluate_batch(&mut self, batch: MnistBatch<AutoB::InnerBackend>) -> BatchMetrics {
        let output = self
            .model
            .valid()
            .forward_classification(batch.images, batch.targets);
        self.display_metrics.update(&output)
    }

    /// Optimizes while `step * batch_size < training_iters`, starting at step 1.
    ///
    /// Every step appends the loss and accuracy to `summary` at the global step
    /// `step * batch_size`. Every `display_step` steps the metrics of the same
    /// batch are recomputed without dropout and printed.
    pub fn train<D: Dataset<MnistFlatItem>>(
        &mut self,
        sampler: &mut MiniBatchSampler<D, MnistFlatItem>,
        summary: &mut SummaryWriter,
    ) -> error::Result<TrainingReport> {
        let batch_size = self.config.batch_size;
        let mut report = TrainingReport::default();

        info!("Starting training...");
        let mut step = 1;
        while step * batch_size < self.config.training_iters {
            let items = sampler.next_items(batch_size);
            let display = step % self.config.display_step == 0;
            let display_items = display.then(|| items.clone());

            let batch: MnistBatch<AutoB> = self.batcher.batch(items, &self.device);
            let metrics = self.optimize(batch);
            debug!(
                "step {step}: loss {:.6}, accuracy {:.5}",
                metrics.loss, metrics.accuracy
            );

            summary.add_scalar("loss", metrics.loss, step * batch_size)?;
            summary.add_scalar("accuracy", metrics.accuracy, step * batch_size)?;

            if let Some(items) = display_items {
                let batch: MnistBatch<AutoB::InnerBackend> =
                    self.batcher.batch(items, &self.device);
                let metrics = self.evaluate_batch(batch);
                println!(
                    "{{\"metric\": \"Minibatch loss\", \"value\": {:.6}}}",
                    metrics.loss
                );
                println!(
                    "{{\"metric\": \"Training accuracy\", \"value\": {:.5}}}",
                    metrics.accuracy
                );
                report.displayed.push(DisplayedMetrics { step, metrics });
            }
            step += 1;
        }
        report.steps = step - 1;

        info!(
            "Finished {} steps over {} epochs, {} metric displays",
            self.train_metrics.iterations(),
            sampler.epochs_completed(),
            self.display_metrics.iterations()
        );
        Ok(report)
    }

    /// Ends the session, handing over the trained parameters.
    pub fn finish(self) -> ConvNet<AutoB> {
        self.model
    }
}
