use std::path::Path;
use std::sync::Mutex;

use tch::nn::{FuncT, ModuleT, VarStore};
use tch::{CModule, Device, Kind, Tensor};

use super::classifier::{Classifier, ClassifierError, check_input_shape};
use super::preprocess::{CHANNELS, INPUT_SIZE, InputTensor};
use crate::config::DeviceKind;
use shared::NUM_CLASSES;

enum Network {
    /// TorchScript export of the whole model.
    Scripted(CModule),
    /// ResNet-18 with a 3-way head, parameters restored into a VarStore.
    Native {
        _store: VarStore,
        net: FuncT<'static>,
    },
}

pub struct TorchClassifier {
    network: Mutex<Network>,
    device: Device,
    name: String,
}

impl TorchClassifier {
    pub fn load(path: &Path, device: DeviceKind) -> Result<Self, ClassifierError> {
        let device = match device {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::CudaIfAvailable => Device::cuda_if_available(),
        };
        let load_error = |e: tch::TchError| ClassifierError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let scripted = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("pt") | Some("jit") | Some("ts")
        );

        let network = if scripted {
            let mut module = CModule::load_on_device(path, device).map_err(load_error)?;
            module.set_eval();
            Network::Scripted(module)
        } else {
            let mut store = VarStore::new(device);
            let net = tch::vision::resnet::resnet18(&store.root(), NUM_CLASSES as i64);
            store.load(path).map_err(load_error)?;
            store.freeze();
            Network::Native { _store: store, net }
        };

        log::info!("Loaded ResNet-18 weights from {} on {:?}", path.display(), device);
        Ok(Self {
            network: Mutex::new(network),
            device,
            name: format!("resnet18 ({})", path.display()),
        })
    }

    fn to_device_tensor(&self, input: &InputTensor) -> Result<Tensor, ClassifierError> {
        let data = input
            .as_slice()
            .ok_or_else(|| ClassifierError::Backend("input tensor is not contiguous".into()))?;
        let side = INPUT_SIZE as i64;
        Tensor::from_slice(data)
            .f_view([1, CHANNELS as i64, side, side])
            .map(|t| t.to_device(self.device))
            .map_err(|e| ClassifierError::Backend(e.to_string()))
    }
}

impl Classifier for TorchClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn logits(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifierError> {
        check_input_shape(input)?;
        let xs = self.to_device_tensor(input)?;
        let network = self.network.lock().map_err(|_| ClassifierError::Poisoned)?;

        let output = tch::no_grad(|| match &*network {
            Network::Scripted(module) => module.forward_ts(&[xs]),
            Network::Native { net, .. } => Ok(net.forward_t(&xs, false)),
        })
        .map_err(|e| ClassifierError::Backend(e.to_string()))?;

        let flat = output
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .f_view([-1i64])
            .map_err(|e| ClassifierError::Backend(e.to_string()))?;
        let num_elements = flat.size()[0] as usize;
        let mut output_vec = vec![0.0f32; num_elements];
        flat.f_copy_data(&mut output_vec, num_elements)
            .map_err(|e| ClassifierError::Backend(e.to_string()))?;
        Ok(output_vec)
    }
}
