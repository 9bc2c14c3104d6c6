//! Transform registry and selector.
//!
//! The registry is built once at startup and shared read-only. Format-specific
//! operations are appended into a per-request list; the shared base entries are
//! never touched after construction.

use std::sync::Arc;

use image::ImageFormat;
use thiserror::Error;

use crate::config::schema::TransformConfig;
use crate::imaging::codec::format_from_name;
use crate::imaging::operations::{OperationParams, TransformOp, UnknownOperation};
use crate::transform::random::RandomSource;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("transform registry needs at least one base operation")]
    Empty,
    #[error(transparent)]
    UnknownOperation(#[from] UnknownOperation),
    #[error("unknown image format '{0}'")]
    UnknownFormat(String),
}

/// Ordered, immutable set of transform operations.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    base: Arc<[TransformOp]>,
    conditional: Arc<[(ImageFormat, TransformOp)]>,
}

impl TransformRegistry {
    /// Build a registry from base operations and format-specific extras.
    pub fn new(
        base: Vec<TransformOp>,
        conditional: Vec<(ImageFormat, TransformOp)>,
    ) -> Result<Self, RegistryError> {
        if base.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self {
            base: base.into(),
            conditional: conditional.into(),
        })
    }

    /// Build the registry described by the transform configuration.
    pub fn from_config(config: &TransformConfig) -> Result<Self, RegistryError> {
        let params = OperationParams {
            blur_sigma: config.blur_sigma,
            deep_fry_quality: config.deep_fry_quality,
        };

        let base = config
            .operations
            .iter()
            .map(|name| TransformOp::from_name(name, &params))
            .collect::<Result<Vec<_>, _>>()?;

        let mut conditional = Vec::new();
        for (format_name, names) in &config.format_operations {
            let format = format_from_name(format_name)
                .ok_or_else(|| RegistryError::UnknownFormat(format_name.clone()))?;
            for name in names {
                conditional.push((format, TransformOp::from_name(name, &params)?));
            }
        }

        Self::new(base, conditional)
    }

    /// Operations registered for every format.
    pub fn base(&self) -> &[TransformOp] {
        &self.base
    }

    /// Base operations followed by those registered for `format`.
    ///
    /// Always non-empty. The returned list is a local copy.
    pub fn effective_operations(&self, format: ImageFormat) -> Vec<TransformOp> {
        let mut ops = self.base.to_vec();
        ops.extend(
            self.conditional
                .iter()
                .filter(|(f, _)| *f == format)
                .map(|(_, op)| *op),
        );
        ops
    }

    /// Pick one operation uniformly from the effective list for `format`.
    pub fn select(&self, format: ImageFormat, rng: &mut dyn RandomSource) -> TransformOp {
        let ops = self.effective_operations(format);
        ops[rng.pick(ops.len())]
    }
}
