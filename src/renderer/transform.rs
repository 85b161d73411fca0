//! Screen and display transforms

use crate::geometry::Rectangle;
use cgmath::{Deg, Matrix4, Vector3};

/// Vertical field of view used to give transformed surfaces perspective
const VERTICAL_FOV_DEGREES: f32 = 30.0;

/// Maps screen coordinates (top-left `(0,0)`, bottom-right `(W,H)`) of
/// `viewport` to normalized GL coordinates (top-left `(-1,1)`, bottom-right
/// `(1,-1)`).
///
/// The `w` component is set from the incoming `z`, so surfaces pushed along
/// the z axis by their own transform receive perspective division.
pub fn screen_to_gl_coords(viewport: &Rectangle) -> Matrix4<f32> {
    let width = viewport.size.width.max(1) as f32;
    let height = viewport.size.height.max(1) as f32;

    let mut m = Matrix4::from_translation(Vector3::new(-1.0, 1.0, 0.0));
    m.z.w = -1.0;

    let near = (height / 2.0) / (VERTICAL_FOV_DEGREES.to_radians() / 2.0).tan();
    let far = -near;

    m = m * Matrix4::from_nonuniform_scale(2.0 / width, -2.0 / height, 2.0 / (near - far));
    m * Matrix4::from_translation(Vector3::new(
        -viewport.top_left.x as f32,
        -viewport.top_left.y as f32,
        0.0,
    ))
}

/// Rotation about the z axis for the display orientation
pub fn display_rotation(degrees: f32) -> Matrix4<f32> {
    Matrix4::from_angle_z(Deg(degrees))
}
