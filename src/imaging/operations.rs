//! Transform operations and their resolved, codec-ready form.
//!
//! A [`TransformOp`] is what the registry stores. Some operations carry inner
//! randomness (a rotation whose angle is picked per response); [`TransformOp::resolve`]
//! draws that randomness and produces a concrete [`Distortion`] the codec can apply.

use std::fmt;

use thiserror::Error;

use crate::transform::random::RandomSource;

/// Right-angle rotation supported by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Angle {
    D90,
    D180,
    D270,
}

impl Angle {
    /// Every angle, in the order a random rotation draws from.
    pub const ALL: [Angle; 3] = [Angle::D90, Angle::D180, Angle::D270];

    pub fn degrees(self) -> u16 {
        match self {
            Angle::D90 => 90,
            Angle::D180 => 180,
            Angle::D270 => 270,
        }
    }
}

/// Rotation as registered: either a fixed angle or one picked per response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Fixed(Angle),
    Random,
}

/// A registered visual distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOp {
    /// Gaussian blur with a fixed sigma.
    Blur { sigma: f32 },
    /// Horizontal mirror.
    Flop,
    /// Rotation by a multiple of 90 degrees.
    Rotate(Rotation),
    /// Sharpen hard, then re-encode as a very low quality JPEG.
    DeepFry { quality: u8 },
}

/// Tunables that parameterized operations pick up when parsed from config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationParams {
    pub blur_sigma: f32,
    pub deep_fry_quality: u8,
}

impl Default for OperationParams {
    fn default() -> Self {
        Self {
            blur_sigma: 2.0,
            deep_fry_quality: 5,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transform operation '{0}'")]
pub struct UnknownOperation(pub String);

impl TransformOp {
    /// Parse a configured operation name.
    pub fn from_name(name: &str, params: &OperationParams) -> Result<Self, UnknownOperation> {
        let op = match name.trim().to_ascii_lowercase().as_str() {
            "blur" => TransformOp::Blur {
                sigma: params.blur_sigma,
            },
            "flop" => TransformOp::Flop,
            "rotate-90" => TransformOp::Rotate(Rotation::Fixed(Angle::D90)),
            "rotate-180" => TransformOp::Rotate(Rotation::Fixed(Angle::D180)),
            "rotate-270" => TransformOp::Rotate(Rotation::Fixed(Angle::D270)),
            "rotate-random" => TransformOp::Rotate(Rotation::Random),
            "deep-fry" => TransformOp::DeepFry {
                quality: params.deep_fry_quality,
            },
            _ => return Err(UnknownOperation(name.to_string())),
        };
        Ok(op)
    }

    /// Draw any inner randomness and return the concrete distortion.
    ///
    /// Fixed operations never consult `rng`.
    pub fn resolve(&self, rng: &mut dyn RandomSource) -> Distortion {
        match *self {
            TransformOp::Blur { sigma } => Distortion::Blur { sigma },
            TransformOp::Flop => Distortion::Flop,
            TransformOp::Rotate(Rotation::Fixed(angle)) => Distortion::Rotate(angle),
            TransformOp::Rotate(Rotation::Random) => {
                Distortion::Rotate(Angle::ALL[rng.pick(Angle::ALL.len())])
            }
            TransformOp::DeepFry { quality } => Distortion::DeepFry { quality },
        }
    }
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformOp::Blur { .. } => write!(f, "blur"),
            TransformOp::Flop => write!(f, "flop"),
            TransformOp::Rotate(Rotation::Fixed(angle)) => write!(f, "rotate-{}", angle.degrees()),
            TransformOp::Rotate(Rotation::Random) => write!(f, "rotate-random"),
            TransformOp::DeepFry { .. } => write!(f, "deep-fry"),
        }
    }
}

/// A fully parameterized distortion, ready for the codec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distortion {
    Blur { sigma: f32 },
    Flop,
    Rotate(Angle),
    DeepFry { quality: u8 },
}

impl fmt::Display for Distortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distortion::Blur { sigma } => write!(f, "blur(sigma={})", sigma),
            Distortion::Flop => write!(f, "flop"),
            Distortion::Rotate(angle) => write!(f, "rotate({})", angle.degrees()),
            Distortion::DeepFry { quality } => write!(f, "deep-fry(quality={})", quality),
        }
    }
}
