pub mod artifact;
pub mod backend;
pub mod cli;
pub mod error;
pub mod evaluation;
pub mod metric;
pub mod mnist;
pub mod model;
pub mod summary;
pub mod training;

pub use error::{Error, Result};

use artifact::{EVALUATING_TAG, SavedModelBuilder};
use backend::MainDevice;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn_dataset::Dataset;
use cli::AppArgs;
use log::info;
use metric::BatchMetrics;
use mnist::{MiniBatchSampler, MnistSplits};
use std::path::PathBuf;
use summary::SummaryWriter;
use training::{TrainingReport, TrainingSession};

/// What a [`launch`] produced besides its console output.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: TrainingReport,
    pub saved_model: PathBuf,
    /// Metrics on the held-out training images, absent when none were held out.
    pub validation_metrics: Option<BatchMetrics>,
    pub test_metrics: BatchMetrics,
}

/// Validates the options, trains, saves the trained model and evaluates it on the test set.
pub fn launch<AutoB: AutodiffBackend + MainDevice>(app_args: &AppArgs) -> Result<RunSummary> {
    app_args.check()?;
    let training_config = app_args.training_config()?;
    let model_config = app_args.model_config();

    if AutoB::is_accelerated() {
        println!("GPU available.");
    } else {
        println!("No GPU found... Defaulting to CPU.");
    }

    let splits = MnistSplits::read(&app_args.mnist_data, app_args.validation_size)?;

    artifact::remove_saved_model(&app_args.model_dir);
    let mut builder = SavedModelBuilder::new(&app_args.model_dir)?;

    let mut summary = SummaryWriter::create(&app_args.logs_path)?;
    summary.add_graph(&model_config)?;

    let device = AutoB::main_device();
    let mut sampler = MiniBatchSampler::new(splits.train, training_config.seed)?;
    let mut session =
        TrainingSession::<AutoB>::new(training_config.clone(), &model_config, device.clone());
    let report = session.train(&mut sampler, &mut summary)?;
    summary.close();
    println!("Optimization Finished!");
    let model = session.finish();

    builder.add_model_and_variables(&model, &model_config, &training_config, &[EVALUATING_TAG])?;
    let saved_model = builder.save()?;

    // the trained parameters are evaluated, without dropout
    let model = model.valid();
    let validation_metrics = if splits.validation.is_empty() {
        None
    } else {
        let metrics = evaluation::evaluate(
            &model,
            &splits.validation,
            training_config.test_examples,
            &device,
        )?;
        info!(
            "Validation loss {:.6}, accuracy {:.5}",
            metrics.loss, metrics.accuracy
        );
        Some(metrics)
    };
    let test_metrics = evaluation::evaluate(
        &model,
        &splits.test,
        training_config.test_examples,
        &device,
    )?;
    println!("Testing Accuracy: {}", test_metrics.accuracy);

    Ok(RunSummary {
        report,
        saved_model,
        validation_metrics,
        test_metrics,
    })
}
