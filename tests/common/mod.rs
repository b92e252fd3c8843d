#![allow(dead_code)]

use mnist_convnet::cli::AppArgs;
use std::path::Path;

pub const SIDE: usize = 28;

fn images(count: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for word in [2051u32, count as u32, SIDE as u32, SIDE as u32] {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    for i in 0..count {
        let label = i % 10;
        // a bright vertical bar whose column depends on the label
        bytes.extend((0..SIDE * SIDE).map(|p| if p % SIDE == 2 + 2 * label { 255 } else { 0 }));
    }
    bytes
}

fn labels(count: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for word in [2049u32, count as u32] {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes.extend((0..count).map(|i| (i % 10) as u8));
    bytes
}

/// Writes a synthetic dataset in the MNIST archive layout.
pub fn write_dataset(dir: &Path, train: usize, test: usize) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("train-images-idx3-ubyte"), images(train)).unwrap();
    std::fs::write(dir.join("train-labels-idx1-ubyte"), labels(train)).unwrap();
    std::fs::write(dir.join("t10k-images-idx3-ubyte"), images(test)).unwrap();
    std::fs::write(dir.join("t10k-labels-idx1-ubyte"), labels(test)).unwrap();
}

/// Options pointing every input and output into `root`.
pub fn app_args(root: &Path) -> AppArgs {
    AppArgs {
        mnist_data: root.join("mnist"),
        logs_path: root.join("logs"),
        model_dir: root.join("model"),
        validation_size: 0,
        ..AppArgs::default()
    }
}
