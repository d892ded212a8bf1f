//! # Intensity Scaling
//!
//! Linear rescaling of intensities from ``[a_min, a_max]``,
//! optionally onto ``[b_min, b_max]``, with optional clipping.

use crate::error::{Error, Result};
use burn::config::Config;
use burn::prelude::{Backend, Tensor};

/// Configuration for [`ScaleIntensityRanged`].
#[derive(Config, Debug)]
pub struct ScaleIntensityRangedConfig {
    /// Source range lower bound.
    pub a_min: f64,

    /// Source range upper bound.
    pub a_max: f64,

    /// Target range lower bound.
    #[config(default = "None")]
    pub b_min: Option<f64>,

    /// Target range upper bound.
    #[config(default = "None")]
    pub b_max: Option<f64>,

    /// Clip to ``[b_min, b_max]``; only applies when both are set.
    #[config(default = false)]
    pub clip: bool,
}

impl ScaleIntensityRangedConfig {
    /// Set both target bounds.
    pub fn with_target_range(
        self,
        b_min: f64,
        b_max: f64,
    ) -> Self {
        self.with_b_min(Some(b_min)).with_b_max(Some(b_max))
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<()> {
        if !(self.a_max - self.a_min).is_normal() {
            return Err(Error::InvalidConfig(format!(
                "source range [{}, {}] must be non-empty and finite",
                self.a_min, self.a_max
            )));
        }
        Ok(())
    }

    /// Initialize a [`ScaleIntensityRanged`].
    pub fn init(&self) -> Result<ScaleIntensityRanged> {
        self.try_validate()?;
        Ok(ScaleIntensityRanged {
            a_min: self.a_min,
            a_max: self.a_max,
            target_range: self.b_min.zip(self.b_max),
            clip: self.clip,
        })
    }
}

/// Intensity range scaling transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleIntensityRanged {
    a_min: f64,
    a_max: f64,
    target_range: Option<(f64, f64)>,
    clip: bool,
}

/// An ``(image, label)`` training sample.
#[derive(Debug, Clone)]
pub struct ImageLabelSample<B: Backend, const D: usize, L> {
    /// The image.
    pub image: Tensor<B, D>,

    /// The label; passed through transforms untouched.
    pub label: L,
}

impl ScaleIntensityRanged {
    /// The ``(b_min, b_max)`` target range, if both bounds are set.
    pub fn target_range(&self) -> Option<(f64, f64)> {
        self.target_range
    }

    /// Scale a tensor.
    ///
    /// ``(x - a_min) / (a_max - a_min)``, then ``* (b_max - b_min) + b_min``
    /// when a target range is set, then clipped when `clip` is set.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        x: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let x = x
            .sub_scalar(self.a_min)
            .div_scalar(self.a_max - self.a_min);

        match self.target_range {
            Some((b_min, b_max)) => {
                let x = x.mul_scalar(b_max - b_min).add_scalar(b_min);
                if self.clip { x.clamp(b_min, b_max) } else { x }
            }
            None => x,
        }
    }

    /// Scale the image of a sample; the label is passed through.
    pub fn forward_sample<B: Backend, const D: usize, L>(
        &self,
        sample: ImageLabelSample<B, D, L>,
    ) -> ImageLabelSample<B, D, L> {
        ImageLabelSample {
            image: self.forward(sample.image),
            label: sample.label,
        }
    }
}
