//! # MLP Activation Wrapper
//!
//! Selects the hidden activation of a block MLP from config, or by name.
use crate::error::Error;
use burn::nn::{Gelu, LeakyRelu, LeakyReluConfig, PRelu, PReluConfig, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};
use std::str::FromStr;

/// [`Activation`] Configuration.
///
/// Defaults to [`Gelu`].
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum ActivationConfig {
    /// Gaussian error linear unit.
    Gelu,

    /// Rectified linear unit.
    Relu,

    /// Leaky ReLU with a fixed negative slope.
    LeakyRelu(LeakyReluConfig),

    /// Leaky ReLU with a learned negative slope.
    PRelu(PReluConfig),
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::Gelu
    }
}

impl From<LeakyReluConfig> for ActivationConfig {
    fn from(config: LeakyReluConfig) -> Self {
        Self::LeakyRelu(config)
    }
}

impl From<PReluConfig> for ActivationConfig {
    fn from(config: PReluConfig) -> Self {
        Self::PRelu(config)
    }
}

impl FromStr for ActivationConfig {
    type Err = Error;

    /// Parse an activation name; parametric activations get their default config.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "gelu" => Ok(Self::Gelu),
            "relu" => Ok(Self::Relu),
            "leaky_relu" => Ok(LeakyReluConfig::new().into()),
            "prelu" => Ok(PReluConfig::new().into()),
            _ => Err(Error::invalid_argument(
                "activation",
                format!("expected one of gelu, relu, leaky_relu, prelu; got {name:?}"),
            )),
        }
    }
}

impl ActivationConfig {
    /// The activation name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gelu => "gelu",
            Self::Relu => "relu",
            Self::LeakyRelu(_) => "leaky_relu",
            Self::PRelu(_) => "prelu",
        }
    }

    /// Initialize the activation layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Activation<B> {
        match self {
            Self::Gelu => Activation::Gelu(Gelu),
            Self::Relu => Activation::Relu(Relu),
            Self::LeakyRelu(config) => Activation::LeakyRelu(config.init()),
            Self::PRelu(config) => Activation::PRelu(config.init(device)),
        }
    }
}

/// MLP activation layer.
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Activation<B: Backend> {
    /// See [`ActivationConfig::Gelu`].
    Gelu(Gelu),

    /// See [`ActivationConfig::Relu`].
    Relu(Relu),

    /// See [`ActivationConfig::LeakyRelu`].
    LeakyRelu(LeakyRelu),

    /// See [`ActivationConfig::PRelu`].
    PRelu(PRelu<B>),
}

impl<B: Backend> Activation<B> {
    /// Apply the activation elementwise.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Self::Gelu(act) => act.forward(input),
            Self::Relu(act) => act.forward(input),
            Self::LeakyRelu(act) => act.forward(input),
            Self::PRelu(act) => act.forward(input),
        }
    }

    /// Recover the config of this layer; learned parameters are not captured.
    pub fn to_config(&self) -> ActivationConfig {
        match self {
            Self::Gelu(_) => ActivationConfig::Gelu,
            Self::Relu(_) => ActivationConfig::Relu,
            Self::LeakyRelu(act) => {
                LeakyReluConfig::new()
                    .with_negative_slope(act.negative_slope)
                    .into()
            }
            Self::PRelu(act) => PReluConfig::new()
                .with_num_parameters(act.num_params())
                .with_alpha(act.alpha_value)
                .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::prelude::TensorData;
    use burn::tensor::Tolerance;

    type B = NdArray<f32>;

    #[test]
    fn test_names() {
        for name in ["gelu", "relu", "leaky_relu", "prelu"] {
            let config: ActivationConfig = name.parse().unwrap();
            assert_eq!(config.name(), name);
        }
        assert!(matches!(
            "GELU".parse::<ActivationConfig>(),
            Ok(ActivationConfig::Gelu)
        ));
        assert!(matches!(
            "swish".parse::<ActivationConfig>(),
            Err(Error::InvalidArgument {
                arg: "activation",
                ..
            })
        ));
        assert!(matches!(ActivationConfig::default(), ActivationConfig::Gelu));
    }

    #[test]
    fn test_forward() {
        let device = Default::default();
        let input: Tensor<B, 2> = Tensor::from_floats([[-2.0, 0.0], [1.0, 3.0]], &device);

        let relu: Activation<B> = ActivationConfig::Relu.init(&device);
        relu.forward(input.clone())
            .into_data()
            .assert_eq(&TensorData::from([[0.0f32, 0.0], [1.0, 3.0]]), false);

        let leaky: Activation<B> =
            ActivationConfig::from(LeakyReluConfig::new().with_negative_slope(0.5)).init(&device);
        leaky
            .forward(input.clone())
            .into_data()
            .assert_approx_eq(
                &TensorData::from([[-1.0f32, 0.0], [1.0, 3.0]]),
                Tolerance::<f32>::default(),
            );

        // GELU passes large positives, and suppresses large negatives.
        let gelu: Activation<B> = ActivationConfig::Gelu.init(&device);
        let output = gelu.forward(input).into_data().to_vec::<f32>().unwrap();
        assert!(output[0].abs() < 0.05, "{output:?}");
        assert_eq!(output[1], 0.0);
        assert!((output[3] - 3.0).abs() < 0.01, "{output:?}");
    }

    #[test]
    fn test_to_config() {
        let device = Default::default();

        let act: Activation<B> = ActivationConfig::Gelu.init(&device);
        assert!(matches!(act.to_config(), ActivationConfig::Gelu));

        let act: Activation<B> =
            ActivationConfig::from(LeakyReluConfig::new().with_negative_slope(0.2)).init(&device);
        match act.to_config() {
            ActivationConfig::LeakyRelu(config) => assert_eq!(config.negative_slope, 0.2),
            other => panic!("Unexpected config: {other:?}"),
        }

        let act: Activation<B> = ActivationConfig::PRelu(PReluConfig::new()).init(&device);
        assert_eq!(act.to_config().name(), "prelu");
    }
}
