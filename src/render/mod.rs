//! The 3D pipeline: sub-pixel triangle rasterizer and per-mesh renderer.

pub mod rasterizer;
pub mod renderer;

pub use renderer::{DrawError, Renderer};

/// Projection mode of the pipeline.
///
/// The choice decides what the fourth vertex component `w` means (and with
/// it the depth-test values) and whether texture coordinates are
/// interpolated perspective-correct or affine:
///
/// - `Perspective`: `w = 1/z_eye`; textures divide by the interpolated `w`
///   once per pixel.
/// - `Orthographic`: `w = 2 - z_ndc`; attributes interpolate affinely in
///   screen space.
///
/// Both conventions make `w` grow toward the camera, so the depth test is
/// always "greater wins".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Perspective,
    Orthographic,
}
