//! GLSL ES sources for the composition program
//!
//! Positions arrive in screen coordinates. Each renderable's own transform is
//! applied around the centre of its screen rectangle, then the screen is
//! mapped to normalized device coordinates and finally rotated for the
//! display orientation.

pub const VERTEX_SHADER: &str = r#"
attribute vec3 position;
attribute vec2 texcoord;
uniform mat4 screen_to_gl_coords;
uniform mat4 display_transform;
uniform mat4 transform;
uniform vec2 centre;
varying vec2 v_texcoord;
void main() {
    vec4 mid = vec4(centre, 0.0, 0.0);
    vec4 transformed = (transform * (vec4(position, 1.0) - mid)) + mid;
    gl_Position = display_transform * screen_to_gl_coords * transformed;
    v_texcoord = texcoord;
}
"#;

pub const FRAGMENT_SHADER: &str = r#"
precision mediump float;
uniform sampler2D tex;
uniform float alpha;
varying vec2 v_texcoord;
void main() {
    vec4 frag = texture2D(tex, v_texcoord);
    gl_FragColor = vec4(frag.xyz, frag.a * alpha);
}
"#;

pub const UNIFORM_SCREEN_TO_GL: &str = "screen_to_gl_coords";
pub const UNIFORM_DISPLAY_TRANSFORM: &str = "display_transform";
pub const UNIFORM_TRANSFORM: &str = "transform";
pub const UNIFORM_CENTRE: &str = "centre";
pub const UNIFORM_ALPHA: &str = "alpha";
pub const UNIFORM_TEX: &str = "tex";

pub const ATTRIB_POSITION: &str = "position";
pub const ATTRIB_TEXCOORD: &str = "texcoord";
