//! Full-Surface Quad
//!
//! Every dispatch draws the same geometry: two triangles covering the whole
//! clip-space square `[-1, 1] × [-1, 1]`. The quad has no meaning of its own;
//! it makes the rasterizer run the fragment stage once per target cell.

use bytemuck::{Pod, Zeroable};

/// Attribute name consumed by the shared vertex stage. Kernels must not reuse it.
pub const POINT_ATTRIBUTE: &str = "point";

/// Entry point of the shared vertex stage.
pub const VERTEX_ENTRY_POINT: &str = "vs_main";

/// Number of vertices drawn per dispatch.
pub const NUM_VERTICES: u32 = 6;

/// The shared vertex stage. Passes the quad corners through untouched.
pub const VERTEX_SHADER_WGSL: &str = r"
@vertex
fn vs_main(@location(0) point: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(point, 0.0, 1.0);
}
";

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
}

pub const VERTICES: [Vertex; NUM_VERTICES as usize] = [
    Vertex { x: -1.0, y: -1.0 },
    Vertex { x: 1.0, y: -1.0 },
    Vertex { x: 1.0, y: 1.0 },
    Vertex { x: -1.0, y: -1.0 },
    Vertex { x: -1.0, y: 1.0 },
    Vertex { x: 1.0, y: 1.0 },
];

const ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x2,
    offset: 0,
    shader_location: 0,
}];

/// Vertex buffer layout matching [`Vertex`] and the `point` attribute.
#[must_use]
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_covers_clip_space() {
        let min_x = VERTICES.iter().map(|v| v.x).fold(f32::MAX, f32::min);
        let max_x = VERTICES.iter().map(|v| v.x).fold(f32::MIN, f32::max);
        let min_y = VERTICES.iter().map(|v| v.y).fold(f32::MAX, f32::min);
        let max_y = VERTICES.iter().map(|v| v.y).fold(f32::MIN, f32::max);
        assert_eq!((min_x, max_x, min_y, max_y), (-1.0, 1.0, -1.0, 1.0));
    }

    #[test]
    fn quad_triangles_have_full_area() {
        let area = |a: &Vertex, b: &Vertex, c: &Vertex| {
            ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() / 2.0
        };
        let total = area(&VERTICES[0], &VERTICES[1], &VERTICES[2])
            + area(&VERTICES[3], &VERTICES[4], &VERTICES[5]);
        assert!((total - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn vertex_stride_is_two_floats() {
        assert_eq!(vertex_layout().array_stride, 8);
    }
}
