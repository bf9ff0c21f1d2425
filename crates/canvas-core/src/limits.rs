//! World bounds and size thresholds.
//!
//! The remote store accepts any geometry; these limits are enforced by the
//! mutation entry points before anything is applied locally or written.
//! Out-of-range values are clamped, non-finite values are rejected.

use crate::error::{ModelError, Result};
use crate::object::{Geometry, ObjectDraft, ObjectPatch};
use serde::{Deserialize, Serialize};

/// Width of the square world.
pub const CANVAS_SIZE: f64 = 64_000.0;
/// Smallest allowed width, height or diameter.
pub const MIN_SHAPE_SIZE: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryLimits {
    /// Coordinates are kept within `[-world_half_extent, world_half_extent]`.
    pub world_half_extent: f64,
    pub min_size: f64,
    pub max_size: f64,
}

impl Default for GeometryLimits {
    fn default() -> Self {
        Self {
            world_half_extent: CANVAS_SIZE / 2.0,
            min_size: MIN_SHAPE_SIZE,
            max_size: CANVAS_SIZE,
        }
    }
}

impl GeometryLimits {
    pub fn new(world_half_extent: f64, min_size: f64, max_size: f64) -> Result<Self> {
        if !(world_half_extent > 0.0) {
            return Err(ModelError::InvalidWorldExtent(world_half_extent));
        }
        if !(min_size <= max_size) {
            return Err(ModelError::InvalidLimits {
                min: min_size,
                max: max_size,
            });
        }
        Ok(Self {
            world_half_extent,
            min_size,
            max_size,
        })
    }

    pub fn clamp_coordinate(&self, value: f64) -> f64 {
        value.clamp(-self.world_half_extent, self.world_half_extent)
    }

    pub fn clamp_size(&self, value: f64) -> f64 {
        value.clamp(self.min_size, self.max_size)
    }

    pub fn clamp_radius(&self, value: f64) -> f64 {
        value.clamp(self.min_size / 2.0, self.max_size / 2.0)
    }

    /// Validate and clamp a draft before creation.
    pub fn validate_draft(&self, mut draft: ObjectDraft) -> Result<ObjectDraft> {
        finite("x", draft.x)?;
        finite("y", draft.y)?;
        finite("rotation", draft.rotation)?;
        draft.x = self.clamp_coordinate(draft.x);
        draft.y = self.clamp_coordinate(draft.y);

        match &mut draft.geometry {
            Geometry::Rectangle {
                width,
                height,
                corner_radius,
            } => {
                *width = self.clamp_size(finite("width", *width)?);
                *height = self.clamp_size(finite("height", *height)?);
                if let Some(r) = corner_radius {
                    *r = finite("cornerRadius", *r)?.max(0.0);
                }
            }
            Geometry::Circle { radius } => {
                *radius = self.clamp_radius(finite("radius", *radius)?);
            }
            Geometry::Image { width, height, .. } => {
                *width = self.clamp_size(finite("width", *width)?);
                *height = self.clamp_size(finite("height", *height)?);
            }
        }

        draft.stroke_width = draft
            .stroke_width
            .map(|w| finite("strokeWidth", w).map(|w| w.max(0.0)))
            .transpose()?;
        draft.opacity = draft
            .opacity
            .map(|o| finite("opacity", o).map(|o| o.clamp(0.0, 1.0)))
            .transpose()?;
        Ok(draft)
    }

    /// Validate and clamp a patch before it is applied.
    pub fn validate_patch(&self, mut patch: ObjectPatch) -> Result<ObjectPatch> {
        patch.x = check(&patch.x, "x")?.map(|v| self.clamp_coordinate(v));
        patch.y = check(&patch.y, "y")?.map(|v| self.clamp_coordinate(v));
        patch.rotation = check(&patch.rotation, "rotation")?;
        patch.width = check(&patch.width, "width")?.map(|v| self.clamp_size(v));
        patch.height = check(&patch.height, "height")?.map(|v| self.clamp_size(v));
        patch.radius = check(&patch.radius, "radius")?.map(|v| self.clamp_radius(v));
        patch.corner_radius = check(&patch.corner_radius, "cornerRadius")?.map(|v| v.max(0.0));
        patch.stroke_width = check(&patch.stroke_width, "strokeWidth")?.map(|v| v.max(0.0));
        patch.opacity = check(&patch.opacity, "opacity")?.map(|v| v.clamp(0.0, 1.0));
        Ok(patch)
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModelError::NonFinite { field, value })
    }
}

fn check(value: &Option<f64>, field: &'static str) -> Result<Option<f64>> {
    value.map(|v| finite(field, v)).transpose()
}
