pub mod dataset;
pub mod sampler;

pub use dataset::{
    DatasetError, HEIGHT, MnistBatch, MnistBatcher, MnistDataset, MnistFlatItem, MnistSplits,
    NUM_CLASSES, WIDTH,
};
pub use sampler::MiniBatchSampler;
