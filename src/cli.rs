use crate::error::{Error, Result};
use crate::mnist::dataset::DEFAULT_VALIDATION_SIZE;
use crate::model::ConvNetConfig;
use crate::training::{TrainingConfig, optimizer_config};
use std::ffi::OsString;
use std::path::PathBuf;

pub const HELP: &str = "\
MNIST ConvNet

Trains a small convolutional network on the MNIST handwritten digits,
saves the trained model and reports its accuracy on the test set.

USAGE:
    mnist-convnet [OPTIONS]

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    --learning_rate <FLOAT>     Learning rate, >= 0 [default: 0.001]
    --training_iters <INT>      Number of training examples to go through, > 0 [default: 200000]
    --batch_size <INT>          Batch size, > 0 [default: 128]
    --display_step <INT>        Print metrics every display_step steps, > 0 [default: 10]
    --dropout <FLOAT>           Keep probability of the fully-connected units, in [0, 1] [default: 0.75]
    --mnist_data <PATH>         Path of the MNIST train and test archives [default: /floyd/input/mnist]
                                Missing archives are downloaded into this directory.
    --seed <INT>                Seed of the parameter initialization, dropout and shuffling [default: 0]
    --validation_size <INT>     Number of training images held out for validation [default: 5000]
    --logs_path <PATH>          Directory receiving the scalar summaries [default: ./logs]
    --model_dir <PATH>          Directory receiving the trained model, recreated on every run
                                [default: ./model]
";

pub const DEFAULT_MNIST_DATA: &str = "/floyd/input/mnist";
pub const DEFAULT_LOGS_PATH: &str = "./logs";
pub const DEFAULT_MODEL_DIR: &str = "./model";

/// Raw command-line options, see [`AppArgs::check`] for their valid ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct AppArgs {
    pub learning_rate: f64,
    pub training_iters: i64,
    pub batch_size: i64,
    pub display_step: i64,
    pub dropout: f64,
    pub mnist_data: PathBuf,
    pub seed: u64,
    pub validation_size: usize,
    pub logs_path: PathBuf,
    pub model_dir: PathBuf,
}

impl Default for AppArgs {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            training_iters: 200000,
            batch_size: 128,
            display_step: 10,
            dropout: 0.75,
            mnist_data: DEFAULT_MNIST_DATA.into(),
            seed: 0,
            validation_size: DEFAULT_VALIDATION_SIZE,
            logs_path: DEFAULT_LOGS_PATH.into(),
            model_dir: DEFAULT_MODEL_DIR.into(),
        }
    }
}

impl AppArgs {
    /// Parses the process arguments.
    pub fn parse() -> Result<Self> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        Self::from_arguments(pargs)
    }

    /// Parses `args`, which exclude the program name.
    pub fn parse_from(args: Vec<OsString>) -> Result<Self> {
        Self::from_arguments(pico_args::Arguments::from_vec(args))
    }

    fn from_arguments(mut pargs: pico_args::Arguments) -> Result<Self> {
        let default = Self::default();
        let args = AppArgs {
            learning_rate: pargs
                .opt_value_from_str("--learning_rate")?
                .unwrap_or(default.learning_rate),
            training_iters: pargs
                .opt_value_from_str("--training_iters")?
                .unwrap_or(default.training_iters),
            batch_size: pargs
                .opt_value_from_str("--batch_size")?
                .unwrap_or(default.batch_size),
            display_step: pargs
                .opt_value_from_str("--display_step")?
                .unwrap_or(default.display_step),
            dropout: pargs
                .opt_value_from_str("--dropout")?
                .unwrap_or(default.dropout),
            mnist_data: pargs
                .opt_value_from_os_str("--mnist_data", parse_path)?
                .unwrap_or(default.mnist_data),
            seed: pargs.opt_value_from_str("--seed")?.unwrap_or(default.seed),
            validation_size: pargs
                .opt_value_from_str("--validation_size")?
                .unwrap_or(default.validation_size),
            logs_path: pargs
                .opt_value_from_os_str("--logs_path", parse_path)?
                .unwrap_or(default.logs_path),
            model_dir: pargs
                .opt_value_from_os_str("--model_dir", parse_path)?
                .unwrap_or(default.model_dir),
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(Error::UnusedArguments(remaining));
        }

        Ok(args)
    }

    /// Validates the options without touching the dataset content.
    ///
    /// The dataset path is checked first, then the numeric ranges.
    pub fn check(&self) -> Result<()> {
        if !self.mnist_data.exists() {
            return Err(Error::DatasetNotFound(self.mnist_data.clone()));
        }
        // written to also reject NaN
        if !(self.learning_rate >= 0.0) {
            return Err(Error::invalid(
                "learning_rate",
                "please provide a positive learning_rate",
            ));
        }
        for (name, value) in [
            ("training_iters", self.training_iters),
            ("batch_size", self.batch_size),
            ("display_step", self.display_step),
        ] {
            if value <= 0 {
                return Err(Error::invalid(name, format!("should be > 0, got {value}")));
            }
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(Error::invalid(
                "dropout",
                "dropout should be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }

    pub fn training_config(&self) -> Result<TrainingConfig> {
        let positive = |name: &'static str, value: i64| {
            usize::try_from(value)
                .ok()
                .filter(|value| *value > 0)
                .ok_or_else(|| Error::invalid(name, format!("should be > 0, got {value}")))
        };
        Ok(TrainingConfig::new(optimizer_config())
            .with_learning_rate(self.learning_rate)
            .with_training_iters(positive("training_iters", self.training_iters)?)
            .with_batch_size(positive("batch_size", self.batch_size)?)
            .with_display_step(positive("display_step", self.display_step)?)
            .with_seed(self.seed))
    }

    pub fn model_config(&self) -> ConvNetConfig {
        ConvNetConfig::new().with_keep_prob(self.dropout)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> std::result::Result<PathBuf, &'static str> {
    Ok(s.into())
}
