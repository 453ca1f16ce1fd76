//! Minimal linear algebra for the 3D pipeline.
//!
//! Conventions:
//! - Matrices are stored as `data[row][col]` and multiply **column vectors**
//!   on the right: `Mat4 * Vec`.
//! - Transforms chain right-to-left: `A * B * v` applies B first, then A.

pub mod mat4;
pub mod vec2;
pub mod vec3;
pub mod vec4;

pub use mat4::Mat4;
pub use vec2::Vec2;
pub use vec3::Vec3;
pub use vec4::Vec4;
