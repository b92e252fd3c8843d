use crate::backend::Element;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn_common::network::downloader::download_file_as_bytes;
use burn_dataset::{
    Dataset, InMemDataset,
    transform::{Mapper, MapperDataset},
};
use flate2::read::GzDecoder;
use log::info;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Number of leading training images held out as the validation split.
pub const DEFAULT_VALIDATION_SIZE: usize = 5000;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: bad magic number {found}, expected {expected}", path.display())]
    BadMagic {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("{}: images are {rows}x{cols}, expected {}x{}", path.display(), HEIGHT, WIDTH)]
    BadDimensions {
        path: PathBuf,
        rows: usize,
        cols: usize,
    },

    #[error("{}: file is truncated", path.display())]
    Truncated { path: PathBuf },

    #[error("found {images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },

    #[error("validation size should be between 0 and {available}, got {requested}")]
    ValidationSize { requested: usize, available: usize },

    #[error("cannot sample batches from an empty dataset")]
    Empty,
}

impl DatasetError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// MNIST item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MnistFlatItem {
    /// Image as a flat array of floats.
    /// Each value is a brightness, in between 0.0 and 1.0.
    ///
    /// # Shape
    /// [WIDTH * HEIGHT]
    pub image: Vec<Element>,

    /// Label of the image.
    /// Each value is in between 0 and 9.
    pub label: u8,
}

#[derive(Deserialize, Debug, Clone)]
struct MnistFlatItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

struct BytesToFlatImage;

impl Mapper<MnistFlatItemRaw, MnistFlatItem> for BytesToFlatImage {
    /// Convert a raw MNIST item (image bytes) to a MNIST item (flat array image).
    fn map(&self, item: &MnistFlatItemRaw) -> MnistFlatItem {
        debug_assert_eq!(item.image_bytes.len(), WIDTH * HEIGHT);

        let image: Vec<Element> = item
            .image_bytes
            .iter()
            .map(|brightness| {
                let element: Element = (*brightness).as_();
                element / 255.0
            })
            .collect();

        MnistFlatItem {
            image,
            label: item.label,
        }
    }
}

type MappedDataset =
    MapperDataset<InMemDataset<MnistFlatItemRaw>, BytesToFlatImage, MnistFlatItemRaw>;

/// An in-memory split of the MNIST dataset.
pub struct MnistDataset {
    dataset: MappedDataset,
}

impl Dataset<MnistFlatItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistFlatItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

/// The train, validation and test splits read from a dataset directory.
///
/// The MNIST archive holds 60,000 training images and 10,000 test images,
/// the first `validation_size` training images are moved to `validation`.
pub struct MnistSplits {
    pub train: MnistDataset,
    pub validation: MnistDataset,
    pub test: MnistDataset,
}

impl MnistSplits {
    /// Reads the four IDX archives from `dir`, downloading the missing ones.
    pub fn read(dir: &Path, validation_size: usize) -> Result<Self, DatasetError> {
        let mut validation = MnistDataset::read_items(dir, TRAIN_IMAGES, TRAIN_LABELS)?;
        let test = MnistDataset::read_items(dir, TEST_IMAGES, TEST_LABELS)?;

        if validation_size > validation.len() {
            return Err(DatasetError::ValidationSize {
                requested: validation_size,
                available: validation.len(),
            });
        }
        let train = validation.split_off(validation_size);

        let splits = Self {
            train: MnistDataset::from_raw(train),
            validation: MnistDataset::from_raw(validation),
            test: MnistDataset::from_raw(test),
        };
        info!(
            "Loaded MNIST from {dir:?}: {} train, {} validation, {} test",
            splits.train.len(),
            splits.validation.len(),
            splits.test.len()
        );
        Ok(splits)
    }
}

impl MnistDataset {
    fn from_raw(items: Vec<MnistFlatItemRaw>) -> Self {
        let dataset = InMemDataset::new(items);
        let dataset = MapperDataset::new(dataset, BytesToFlatImage);
        Self { dataset }
    }

    fn read_items(
        dir: &Path,
        images_name: &str,
        labels_name: &str,
    ) -> Result<Vec<MnistFlatItemRaw>, DatasetError> {
        let images_path = Self::locate(dir, images_name)?;
        let labels_path = Self::locate(dir, labels_name)?;
        let images = parse_images(&read_archive(&images_path)?, &images_path)?;
        let labels = parse_labels(&read_archive(&labels_path)?, &labels_path)?;

        if images.len() != labels.len() {
            return Err(DatasetError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }

        Ok(images
            .into_iter()
            .zip(labels)
            .map(|(image_bytes, label)| MnistFlatItemRaw { image_bytes, label })
            .collect())
    }

    /// Finds `name` (or its gzipped form) in `dir`.
    /// When neither exists, the gzipped file is downloaded into `dir`.
    fn locate(dir: &Path, name: &str) -> Result<PathBuf, DatasetError> {
        let raw = dir.join(name);
        if raw.exists() {
            return Ok(raw);
        }
        let gz = dir.join(format!("{name}.gz"));
        if !gz.exists() {
            info!("Downloading {name}.gz into {dir:?}");
            let bytes = download_file_as_bytes(&format!("{URL}{name}.gz"), name);
            std::fs::write(&gz, &bytes[..]).map_err(|e| DatasetError::io(&gz, e))?;
        }
        Ok(gz)
    }
}

/// Reads the whole file, decompressing it when it ends in `.gz`.
fn read_archive(path: &Path) -> Result<Vec<u8>, DatasetError> {
    let bytes = std::fs::read(path).map_err(|e| DatasetError::io(path, e))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut decoded = Vec::new();
        GzDecoder::new(&bytes[..])
            .read_to_end(&mut decoded)
            .map_err(|e| DatasetError::io(path, e))?;
        Ok(decoded)
    } else {
        Ok(bytes)
    }
}

fn read_u32(bytes: &[u8], offset: usize, path: &Path) -> Result<u32, DatasetError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|word| word.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| DatasetError::Truncated {
            path: path.to_path_buf(),
        })
}

fn check_magic(bytes: &[u8], expected: u32, path: &Path) -> Result<(), DatasetError> {
    let found = read_u32(bytes, 0, path)?;
    if found != expected {
        return Err(DatasetError::BadMagic {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Parses an IDX3 image archive: a 16-byte header followed by the images.
/// Each image is a vector of bytes.
fn parse_images(bytes: &[u8], path: &Path) -> Result<Vec<Vec<u8>>, DatasetError> {
    check_magic(bytes, IMAGES_MAGIC, path)?;
    let size = read_u32(bytes, 4, path)? as usize;
    let rows = read_u32(bytes, 8, path)? as usize;
    let cols = read_u32(bytes, 12, path)? as usize;
    if rows != HEIGHT || cols != WIDTH {
        return Err(DatasetError::BadDimensions {
            path: path.to_path_buf(),
            rows,
            cols,
        });
    }

    let payload = bytes
        .get(16..16 + size * WIDTH * HEIGHT)
        .ok_or_else(|| DatasetError::Truncated {
            path: path.to_path_buf(),
        })?;
    Ok(payload
        .chunks(WIDTH * HEIGHT)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Parses an IDX1 label archive: an 8-byte header followed by the labels.
fn parse_labels(bytes: &[u8], path: &Path) -> Result<Vec<u8>, DatasetError> {
    check_magic(bytes, LABELS_MAGIC, path)?;
    let size = read_u32(bytes, 4, path)? as usize;
    bytes
        .get(8..8 + size)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| DatasetError::Truncated {
            path: path.to_path_buf(),
        })
}

#[derive(Clone, Default)]
pub struct MnistBatcher {}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// The input feature is the brightness, scaled to [0, 1].
    ///
    /// # Shape
    /// [batch_size, WIDTH * HEIGHT]
    pub images: Tensor<B, 2>,
    /// Class index of each image, the dense form of a one-hot label.
    ///
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistFlatItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistFlatItem>, device: &B::Device) -> MnistBatch<B> {
        let batch_size = items.len();
        let (items_image, items_label): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.image, item.label as i64))
            .unzip();

        let images = TensorData::new(items_image.concat(), [batch_size, WIDTH * HEIGHT])
            .convert::<B::FloatElem>();
        let targets = TensorData::new(items_label, [batch_size]).convert::<B::IntElem>();

        MnistBatch {
            images: Tensor::from_data(images, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    type B = NdArray<f32>;

    pub fn idx_images(count: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in [IMAGES_MAGIC, count as u32, HEIGHT as u32, WIDTH as u32] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        for i in 0..count {
            bytes.extend((0..WIDTH * HEIGHT).map(|p| ((i * 31 + p * 7) % 256) as u8));
        }
        bytes
    }

    pub fn idx_labels(count: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in [LABELS_MAGIC, count as u32] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes.extend((0..count).map(|i| (i % NUM_CLASSES) as u8));
        bytes
    }

    fn write_dataset(dir: &Path, train: usize, test: usize) {
        std::fs::write(dir.join(TRAIN_IMAGES), idx_images(train)).unwrap();
        std::fs::write(dir.join(TRAIN_LABELS), idx_labels(train)).unwrap();
        std::fs::write(dir.join(TEST_IMAGES), idx_images(test)).unwrap();
        std::fs::write(dir.join(TEST_LABELS), idx_labels(test)).unwrap();
    }

    #[test]
    fn splits_validation_from_the_head_of_train() {
        let dir = temp_dir::TempDir::new().unwrap();
        write_dataset(dir.path(), 30, 12);

        let splits = MnistSplits::read(dir.path(), 5).unwrap();
        assert_eq!(splits.train.len(), 25);
        assert_eq!(splits.validation.len(), 5);
        assert_eq!(splits.test.len(), 12);
        // labels cycle over the classes, the train split starts at image 5
        assert_eq!(splits.train.get(0).unwrap().label, 5);
        assert_eq!(splits.validation.get(4).unwrap().label, 4);
    }

    #[test]
    fn reads_gzipped_archives() {
        let dir = temp_dir::TempDir::new().unwrap();
        write_dataset(dir.path(), 4, 4);
        let raw = dir.path().join(TEST_IMAGES);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&std::fs::read(&raw).unwrap()).unwrap();
        std::fs::write(dir.path().join(format!("{TEST_IMAGES}.gz")), encoder.finish().unwrap())
            .unwrap();
        std::fs::remove_file(raw).unwrap();

        let splits = MnistSplits::read(dir.path(), 0).unwrap();
        assert_eq!(splits.test.len(), 4);
        let item = splits.test.get(1).unwrap();
        assert_eq!(item.image.len(), WIDTH * HEIGHT);
        assert_eq!(item.image[0], 31.0 / 255.0);
    }

    #[test]
    fn rejects_bad_archives() {
        let path = Path::new("labels");
        let mut images = idx_images(2);
        images[3] = 0;
        assert!(matches!(
            parse_images(&images, path),
            Err(DatasetError::BadMagic { found: 2048, .. })
        ));
        let images = idx_images(2);
        assert!(matches!(
            parse_images(&images[..images.len() - 1], path),
            Err(DatasetError::Truncated { .. })
        ));
        assert!(matches!(
            parse_labels(&idx_images(1), path),
            Err(DatasetError::BadMagic { .. })
        ));
    }

    #[test]
    fn rejects_oversized_validation_split() {
        let dir = temp_dir::TempDir::new().unwrap();
        write_dataset(dir.path(), 3, 3);
        assert!(matches!(
            MnistSplits::read(dir.path(), 4),
            Err(DatasetError::ValidationSize {
                requested: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn batches_flat_images_and_targets() {
        let dir = temp_dir::TempDir::new().unwrap();
        write_dataset(dir.path(), 3, 3);
        let splits = MnistSplits::read(dir.path(), 0).unwrap();
        let items = (0..3).filter_map(|i| splits.train.get(i)).collect();

        let batch: MnistBatch<B> = MnistBatcher::default().batch(items, &Default::default());
        assert_eq!(batch.images.dims(), [3, WIDTH * HEIGHT]);
        assert_eq!(batch.targets.dims(), [3]);
        batch
            .targets
            .into_data()
            .assert_eq(&TensorData::from([0i64, 1, 2]), false);
    }
}
