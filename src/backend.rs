use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;

pub type Element = f32;

/// Recorder used for the saved model parameters.
pub type RecorderTy = NamedMpkFileRecorder<FullPrecisionSettings>;

#[cfg(feature = "ndarray")]
pub type MainBackend = burn::backend::NdArray<Element>;
#[cfg(any(feature = "tch-cpu", feature = "tch-gpu"))]
pub type MainBackend = burn::backend::LibTorch<Element>;
#[cfg(feature = "wgpu")]
pub type MainBackend = burn::backend::Wgpu<Element, i32>;
#[cfg(feature = "cuda")]
pub type MainBackend = burn::backend::Cuda<Element, i32>;

pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }

    /// Whether [`MainDevice::main_device`] is a GPU.
    fn is_accelerated() -> bool {
        false
    }
}

#[cfg(any(feature = "ndarray", feature = "tch-cpu"))]
impl MainDevice for MainBackend {}
#[cfg(any(feature = "wgpu", feature = "cuda"))]
impl MainDevice for MainBackend {
    fn is_accelerated() -> bool {
        true
    }
}
#[cfg(all(feature = "tch-gpu", not(target_os = "macos")))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Cuda(0)
    }

    fn is_accelerated() -> bool {
        true
    }
}
#[cfg(all(feature = "tch-gpu", target_os = "macos"))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Mps
    }

    fn is_accelerated() -> bool {
        true
    }
}

pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;
impl MainDevice for MainAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }

    fn is_accelerated() -> bool {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::is_accelerated()
    }
}

#[cfg(not(feature = "_has-backend"))]
mod err {
    use super::*;
    std::compile_error!(
        "No backend selected. Enable one of the ndarray, tch-cpu, tch-gpu, wgpu or cuda features."
    );

    // pretend to fallback to ndarray (to avoid too many other unrelated errors)
    pub type MainBackend = burn::backend::NdArray<Element>;
    impl MainDevice for MainBackend {}
}
#[cfg(not(feature = "_has-backend"))]
pub use err::*;

#[cfg(any(
    all(
        feature = "ndarray",
        any(
            feature = "tch-cpu",
            feature = "tch-gpu",
            feature = "wgpu",
            feature = "cuda"
        )
    ),
    all(
        feature = "tch-cpu",
        any(feature = "tch-gpu", feature = "wgpu", feature = "cuda")
    ),
    all(feature = "tch-gpu", any(feature = "wgpu", feature = "cuda")),
    all(feature = "wgpu", feature = "cuda"),
))]
std::compile_error!(
    "More than one backend selected. Build with --no-default-features and enable exactly one of the ndarray, tch-cpu, tch-gpu, wgpu or cuda features."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_single_backend_is_selected() {
        let selected = [
            cfg!(feature = "ndarray"),
            cfg!(feature = "tch-cpu"),
            cfg!(feature = "tch-gpu"),
            cfg!(feature = "wgpu"),
            cfg!(feature = "cuda"),
        ];
        assert_eq!(selected.iter().filter(|on| **on).count(), 1);
    }

    #[test]
    fn autodiff_backend_uses_the_inner_device() {
        assert_eq!(
            MainAutoBackend::is_accelerated(),
            MainBackend::is_accelerated()
        );
        assert_eq!(MainAutoBackend::main_device(), MainBackend::main_device());
    }
}
