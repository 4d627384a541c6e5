//! Dense classification head with exact input gradients.
//!
//! The transfer-learning models end in the same head: the backbone feature
//! map is reduced (global average pooling or flatten), passed through ReLU
//! dense layers with dropout, then through the `dense_pred` layer whose
//! output is softmaxed. [`Network`] evaluates that head on the preprocessed
//! image tensor and back-propagates to the input.
//!
//! # Artifact format
//!
//! ```json
//! {
//!   "architecture": "DenseNet201",
//!   "layers": [
//!     { "kind": "global_average_pooling", "name": "avg_pool" },
//!     { "kind": "dense", "name": "fc1", "kernel": [[...]], "bias": [...], "activation": "relu" },
//!     { "kind": "dropout", "name": "dropout_1", "rate": 0.5 },
//!     { "kind": "dense", "name": "dense_pred", "kernel": [[...]], "bias": [...] },
//!     { "kind": "activation", "name": "probs", "activation": "softmax" }
//!   ]
//! }
//! ```
//!
//! Kernels are stored `[inputs][units]`.

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Classifier, LOGIT_LAYER};
use crate::normalize::ChannelLayout;
use crate::perturbation::softmax;

/// Element-wise or vector activation attached to a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Softmax,
}

impl Activation {
    fn apply(self, z: &Array1<f32>) -> Array1<f32> {
        match self {
            Self::Linear => z.clone(),
            Self::Relu => z.mapv(|v| v.max(0.0)),
            Self::Softmax => softmax(z.view()),
        }
    }

    /// Gradient w.r.t. the activation input `z`, given the gradient w.r.t. its output.
    fn backward(self, z: &Array1<f32>, grad: Array1<f32>) -> Array1<f32> {
        match self {
            Self::Linear => grad,
            Self::Relu => grad * &z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Softmax => {
                let s = softmax(z.view());
                let dot = grad.dot(&s);
                (grad - dot) * &s
            }
        }
    }
}

/// One layer as serialized in a model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    GlobalAveragePooling {
        name: String,
    },
    Flatten {
        name: String,
    },
    Dense {
        name: String,
        kernel: Vec<Vec<f32>>,
        bias: Vec<f32>,
        #[serde(default)]
        activation: Activation,
    },
    Dropout {
        name: String,
        rate: f32,
    },
    Activation {
        name: String,
        activation: Activation,
    },
}

impl LayerSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::GlobalAveragePooling { name }
            | Self::Flatten { name }
            | Self::Dense { name, .. }
            | Self::Dropout { name, .. }
            | Self::Activation { name, .. } => name,
        }
    }
}

/// Serialized classification head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkArtifact {
    pub architecture: String,
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pooling {
    GlobalAverage,
    Flatten,
}

#[derive(Debug, Clone)]
enum Layer {
    Dense {
        kernel: Array2<f32>,
        bias: Array1<f32>,
        activation: Activation,
    },
    /// Identity at inference time.
    Dropout,
    Activation(Activation),
}

/// A dense head evaluated on images of a fixed shape.
#[derive(Debug, Clone)]
pub struct Network {
    input_shape: [usize; 3],
    layout: ChannelLayout,
    pooling: Pooling,
    layers: Vec<Layer>,
    logit_index: usize,
    num_classes: usize,
}

impl Network {
    /// Validate an artifact against `input_shape` and build the network.
    pub fn from_artifact(
        artifact: NetworkArtifact,
        input_shape: [usize; 3],
        layout: ChannelLayout,
    ) -> Result<Self> {
        let channel_axis = layout.channel_axis(3).unwrap_or(2);
        if input_shape[channel_axis] != 3 {
            return Err(Error::InvalidShape {
                expected: format!("three-channel image ({layout})"),
                found: input_shape.to_vec(),
            });
        }

        let mut specs = artifact.layers.into_iter();
        let (pooling, mut features) = match specs.next() {
            Some(LayerSpec::GlobalAveragePooling { .. }) => (Pooling::GlobalAverage, 3),
            Some(LayerSpec::Flatten { .. }) => {
                (Pooling::Flatten, input_shape.iter().product::<usize>())
            }
            Some(other) => {
                return Err(Error::Configuration(format!(
                    "first layer '{}' must be global_average_pooling or flatten",
                    other.name()
                )));
            }
            None => return Err(Error::Configuration("artifact has no layers".to_string())),
        };

        let mut layers = Vec::new();
        let mut logits = None;
        for spec in specs {
            let layer = match spec {
                LayerSpec::GlobalAveragePooling { name } | LayerSpec::Flatten { name } => {
                    return Err(Error::Configuration(format!(
                        "pooling layer '{name}' may only appear first"
                    )));
                }
                LayerSpec::Dense {
                    name,
                    kernel,
                    bias,
                    activation,
                } => {
                    let kernel = dense_kernel(&name, kernel, features, bias.len())?;
                    features = bias.len();
                    if name == LOGIT_LAYER {
                        logits = Some((layers.len(), features));
                    }
                    Layer::Dense {
                        kernel,
                        bias: Array1::from(bias),
                        activation,
                    }
                }
                LayerSpec::Dropout { name, rate } => {
                    if !(0.0..1.0).contains(&rate) {
                        return Err(Error::Configuration(format!(
                            "dropout '{name}' has rate {rate} outside [0, 1)"
                        )));
                    }
                    Layer::Dropout
                }
                LayerSpec::Activation { activation, .. } => Layer::Activation(activation),
            };
            layers.push(layer);
        }

        let (logit_index, num_classes) = logits.ok_or_else(|| {
            Error::Configuration(format!("model has no '{LOGIT_LAYER}' dense layer"))
        })?;
        layers.truncate(logit_index + 1);

        Ok(Self {
            input_shape,
            layout,
            pooling,
            layers,
            logit_index,
            num_classes,
        })
    }

    /// Expected shape of a single input image.
    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    fn check_input(&self, image: &ArrayViewD<'_, f32>) -> Result<()> {
        if image.shape() != self.input_shape {
            return Err(Error::InvalidShape {
                expected: format!("{:?} ({})", self.input_shape, self.layout),
                found: image.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn pool(&self, image: &ArrayViewD<'_, f32>) -> Array1<f32> {
        match self.pooling {
            Pooling::Flatten => image.iter().copied().collect(),
            Pooling::GlobalAverage => {
                let axis = Axis(self.channel_axis());
                image
                    .axis_iter(axis)
                    .map(|channel| channel.sum() / channel.len() as f32)
                    .collect()
            }
        }
    }

    fn unpool(&self, grad: Array1<f32>) -> Result<ArrayD<f32>> {
        match self.pooling {
            Pooling::Flatten => {
                let entries = self.input_shape.iter().product::<usize>();
                ArrayD::from_shape_vec(IxDyn(&self.input_shape), grad.to_vec()).map_err(|_| {
                    Error::InvalidShape {
                        expected: format!("{entries} gradient entries"),
                        found: vec![grad.len()],
                    }
                })
            }
            Pooling::GlobalAverage => {
                let axis = Axis(self.channel_axis());
                let mut out = ArrayD::zeros(IxDyn(&self.input_shape));
                let per_channel = (out.len() / 3) as f32;
                for (mut channel, g) in out.axis_iter_mut(axis).zip(grad.iter()) {
                    channel.fill(g / per_channel);
                }
                Ok(out)
            }
        }
    }

    fn channel_axis(&self) -> usize {
        self.layout.channel_axis(3).unwrap_or(2)
    }

    /// Forward pass up to the logit layer. Returns the input of every layer
    /// and the pre-activation logits.
    fn trace(&self, image: &ArrayViewD<'_, f32>) -> (Vec<Array1<f32>>, Array1<f32>) {
        let mut x = self.pool(image);
        let mut inputs = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            inputs.push(x.clone());
            match layer {
                Layer::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    let z = x.dot(kernel) + bias;
                    if i == self.logit_index {
                        return (inputs, z);
                    }
                    x = activation.apply(&z);
                }
                Layer::Dropout => {}
                Layer::Activation(activation) => x = activation.apply(&x),
            }
        }
        // `layers` is truncated right after the logit layer.
        (inputs, x)
    }
}

fn dense_kernel(
    name: &str,
    kernel: Vec<Vec<f32>>,
    inputs: usize,
    units: usize,
) -> Result<Array2<f32>> {
    if units == 0 {
        return Err(Error::Configuration(format!("dense '{name}' has no units")));
    }
    if kernel.len() != inputs || kernel.iter().any(|row| row.len() != units) {
        return Err(Error::Configuration(format!(
            "dense '{name}' kernel must be {inputs}x{units}"
        )));
    }
    let flat: Vec<f32> = kernel.into_iter().flatten().collect();
    Array2::from_shape_vec((inputs, units), flat)
        .map_err(|e| Error::Configuration(format!("dense '{name}': {e}")))
}

impl Classifier for Network {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn logits(&self, image: ArrayViewD<'_, f32>) -> Result<Array1<f32>> {
        self.check_input(&image)?;
        Ok(self.trace(&image).1)
    }

    fn logits_input_gradient(
        &self,
        image: ArrayViewD<'_, f32>,
        upstream: ArrayView1<'_, f32>,
    ) -> Result<ArrayD<f32>> {
        self.check_input(&image)?;
        if upstream.len() != self.num_classes {
            return Err(Error::InvalidShape {
                expected: format!("{} logit gradients", self.num_classes),
                found: upstream.shape().to_vec(),
            });
        }

        let (inputs, _) = self.trace(&image);
        let mut grad = upstream.to_owned();
        for (i, layer) in self.layers.iter().enumerate().rev() {
            match layer {
                Layer::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    if i != self.logit_index {
                        let z = inputs[i].dot(kernel) + bias;
                        grad = activation.backward(&z, grad);
                    }
                    grad = kernel.dot(&grad);
                }
                Layer::Dropout => {}
                Layer::Activation(activation) => grad = activation.backward(&inputs[i], grad),
            }
        }
        self.unpool(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn dense(
        name: &str,
        kernel: Vec<Vec<f32>>,
        bias: Vec<f32>,
        activation: Activation,
    ) -> LayerSpec {
        LayerSpec::Dense {
            name: name.to_string(),
            kernel,
            bias,
            activation,
        }
    }

    fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize, scale: f32) -> Vec<Vec<f32>> {
        (0..rows)
            .map(|_| (0..cols).map(|_| rng.random_range(-scale..scale)).collect())
            .collect()
    }

    /// Flatten -> relu(12 -> 4) -> dropout -> dense_pred(4 -> 3) -> softmax.
    ///
    /// Inputs live in [-1, 1] and hidden weights in [-0.2, 0.2], so hidden
    /// pre-activations stay within +-2.4: units 0 and 1 (bias +3) are always
    /// active and units 2 and 3 (bias -3) never are.
    fn relu_network(rng: &mut StdRng) -> Network {
        let artifact = NetworkArtifact {
            architecture: "DenseNet201".to_string(),
            layers: vec![
                LayerSpec::Flatten {
                    name: "flatten".to_string(),
                },
                dense(
                    "fc1",
                    random_matrix(rng, 12, 4, 0.2),
                    vec![3.0, 3.0, -3.0, -3.0],
                    Activation::Relu,
                ),
                LayerSpec::Dropout {
                    name: "dropout".to_string(),
                    rate: 0.5,
                },
                dense(
                    LOGIT_LAYER,
                    random_matrix(rng, 4, 3, 1.0),
                    vec![0.1, -0.2, 0.3],
                    Activation::Linear,
                ),
                LayerSpec::Activation {
                    name: "probs".to_string(),
                    activation: Activation::Softmax,
                },
            ],
        };
        Network::from_artifact(artifact, [2, 2, 3], ChannelLayout::ChannelsLast).unwrap()
    }

    fn random_image(rng: &mut StdRng, shape: [usize; 3]) -> ArrayD<f32> {
        let n = shape.iter().product();
        let data = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap()
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = relu_network(&mut rng);
        let image = random_image(&mut rng, [2, 2, 3]);
        let upstream = Array1::from(vec![0.7_f32, -1.3, 0.4]);

        let grad = net
            .logits_input_gradient(image.view(), upstream.view())
            .unwrap();
        assert_eq!(grad.shape(), image.shape());

        let f = |x: &ArrayD<f32>| net.logits(x.view()).unwrap().dot(&upstream);
        let h = 1e-2_f32;
        for idx in 0..image.len() {
            let mut plus = image.clone();
            let mut minus = image.clone();
            plus.as_slice_mut().unwrap()[idx] += h;
            minus.as_slice_mut().unwrap()[idx] -= h;
            let numeric = (f(&plus) - f(&minus)) / (2.0 * h);
            let analytic = grad.as_slice().unwrap()[idx];
            assert!(
                (numeric - analytic).abs() < 2e-3,
                "index {idx}: numeric {numeric} vs analytic {analytic}"
            );
        }
    }

    #[test]
    fn test_global_average_pooling_channels_first() {
        let artifact = NetworkArtifact {
            architecture: "ResNeXt50".to_string(),
            layers: vec![
                LayerSpec::GlobalAveragePooling {
                    name: "avg_pool".to_string(),
                },
                dense(
                    LOGIT_LAYER,
                    vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, -1.0]],
                    vec![0.0, 0.5],
                    Activation::Softmax,
                ),
            ],
        };
        let net =
            Network::from_artifact(artifact, [3, 2, 2], ChannelLayout::ChannelsFirst).unwrap();

        let mut image = ArrayD::<f32>::zeros(IxDyn(&[3, 2, 2]));
        image.index_axis_mut(Axis(0), 0).fill(1.0);
        image.index_axis_mut(Axis(0), 1).fill(2.0);
        image.index_axis_mut(Axis(0), 2).fill(4.0);

        // Activation on dense_pred is ignored: logits are pre-activation.
        let logits = net.logits(image.view()).unwrap();
        assert!((logits[0] - 5.0).abs() < 1e-6);
        assert!((logits[1] - (2.0 - 4.0 + 0.5)).abs() < 1e-6);

        let grad = net
            .logits_input_gradient(image.view(), Array1::from(vec![1.0_f32, 0.0]).view())
            .unwrap();
        // d(logit 0)/d(pixel) = kernel[c][0] / 4 pixels per channel.
        assert!((grad[[0, 1, 1]] - 0.25).abs() < 1e-6);
        assert!(grad[[1, 0, 0]].abs() < 1e-6);
        assert!((grad[[2, 0, 1]] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_activation_backward_matches_jacobian() {
        let z = Array1::from(vec![0.2_f32, -0.4, 1.1]);
        let g = Array1::from(vec![1.0_f32, 0.0, 0.0]);
        let back = Activation::Softmax.backward(&z, g);
        let s = softmax(z.view());
        // d s_0 / d z_j = s_0 (delta_0j - s_j)
        assert!((back[0] - s[0] * (1.0 - s[0])).abs() < 1e-6);
        assert!((back[1] + s[0] * s[1]).abs() < 1e-6);
        assert!((back[2] + s[0] * s[2]).abs() < 1e-6);
    }

    #[test]
    fn test_missing_logit_layer_is_configuration_error() {
        let artifact = NetworkArtifact {
            architecture: "Xception".to_string(),
            layers: vec![
                LayerSpec::GlobalAveragePooling {
                    name: "avg_pool".to_string(),
                },
                dense("predictions", vec![vec![1.0]; 3], vec![0.0], Activation::Softmax),
            ],
        };
        let err =
            Network::from_artifact(artifact, [4, 4, 3], ChannelLayout::ChannelsLast).unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains(LOGIT_LAYER)));
    }

    #[test]
    fn test_kernel_dimension_mismatch_is_rejected() {
        let artifact = NetworkArtifact {
            architecture: "Xception".to_string(),
            layers: vec![
                LayerSpec::GlobalAveragePooling {
                    name: "avg_pool".to_string(),
                },
                dense(LOGIT_LAYER, vec![vec![1.0, 2.0]; 4], vec![0.0, 0.0], Activation::Linear),
            ],
        };
        assert!(matches!(
            Network::from_artifact(artifact, [4, 4, 3], ChannelLayout::ChannelsLast),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_first_layer_must_pool() {
        let artifact = NetworkArtifact {
            architecture: "Xception".to_string(),
            layers: vec![dense(LOGIT_LAYER, vec![vec![1.0]; 3], vec![0.0], Activation::Linear)],
        };
        assert!(Network::from_artifact(artifact, [4, 4, 3], ChannelLayout::ChannelsLast).is_err());
    }

    #[test]
    fn test_wrong_image_shape_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = relu_network(&mut rng);
        let image = ArrayD::<f32>::zeros(IxDyn(&[3, 2, 2]));
        assert!(matches!(
            net.logits(image.view()),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_artifact_json_roundtrip_defaults_activation() {
        let json = r#"{
            "architecture": "DenseNet201",
            "layers": [
                {"kind": "flatten", "name": "flat"},
                {"kind": "dense", "name": "dense_pred",
                 "kernel": [[1.0], [1.0], [1.0]], "bias": [0.0]}
            ]
        }"#;
        let artifact: NetworkArtifact = serde_json::from_str(json).unwrap();
        match &artifact.layers[1] {
            LayerSpec::Dense { activation, .. } => assert_eq!(*activation, Activation::Linear),
            other => panic!("unexpected layer {other:?}"),
        }
        let net = Network::from_artifact(artifact, [1, 1, 3], ChannelLayout::ChannelsLast).unwrap();
        assert_eq!(net.num_classes(), 1);
        assert_eq!(net.input_shape(), [1, 1, 3]);
    }
}
