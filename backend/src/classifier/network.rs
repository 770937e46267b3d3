use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tch::nn::{self, ModuleT, SequentialT};
use tch::vision::resnet;
use tch::{Device, Tensor};

use super::inference::Classifier;
use super::{panic_message, ClassifyError};

const TRUNK_FEATURES: i64 = 2048;
const HIDDEN_FEATURES: i64 = 512;
const NUM_CLASSES: i64 = 2;

/// ResNet-50 trunk with the two-layer sneaker head. Variable names follow the
/// torchvision layout (`conv1`, `layer1.0.…`, `fc.1`, `fc.3`, `fc.5`) so an
/// exported state dict loads without renaming.
pub struct SneakerNet {
    net: SequentialT,
    device: Device,
    _vs: nn::VarStore,
}

fn build(root: &nn::Path) -> SequentialT {
    let fc = root / "fc";
    let head = nn::seq_t()
        .add_fn_t(|xs, train| xs.dropout(0.5, train))
        .add(nn::linear(&fc / "1", TRUNK_FEATURES, HIDDEN_FEATURES, Default::default()))
        .add_fn(|xs| xs.relu())
        .add(nn::batch_norm1d(&fc / "3", HIDDEN_FEATURES, Default::default()))
        .add_fn_t(|xs, train| xs.dropout(0.3, train))
        .add(nn::linear(&fc / "5", HIDDEN_FEATURES, NUM_CLASSES, Default::default()));

    nn::seq_t()
        .add(resnet::resnet50_no_final_layer(root))
        .add(head)
}

impl SneakerNet {
    /// Builds the skeleton on `device` and fills it from the artifact at `path`.
    /// Missing variables, a corrupt file or a panic inside libtorch all come
    /// back as `ArtifactUnavailable`.
    pub fn load(path: &Path, device: Device) -> Result<Self, ClassifyError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut vs = nn::VarStore::new(device);
            let net = build(&vs.root());
            vs.load(path)?;
            vs.freeze();
            Ok::<_, tch::TchError>((vs, net))
        }));

        match outcome {
            Ok(Ok((vs, net))) => Ok(Self {
                net,
                device,
                _vs: vs,
            }),
            Ok(Err(e)) => Err(ClassifyError::ArtifactUnavailable(format!(
                "failed to load weights from {}: {}",
                path.display(),
                e
            ))),
            Err(payload) => Err(ClassifyError::ArtifactUnavailable(format!(
                "weight loading panicked: {}",
                panic_message(payload)
            ))),
        }
    }

    pub fn boxed(path: &Path, device: Device) -> Result<Box<dyn Classifier>, ClassifyError> {
        Ok(Box::new(Self::load(path, device)?))
    }
}

impl Classifier for SneakerNet {
    fn logits(&self, batch: &Tensor) -> Result<Tensor, ClassifyError> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.net.forward_t(&batch.to_device(self.device), false)
        }))
        .map_err(|payload| ClassifyError::InferenceFailure(panic_message(payload)))
    }
}
