//! Graphics call shim.
//!
//! Guests compiled against a C GL ES API import one function per GL entry
//! point under the `env` namespace. [`GlShim`] implements those entry points
//! against a [`GraphicsContext`], translating integer handles through a
//! [`HandleTable`](crate::handles::HandleTable) and handing memory-resident
//! buffers to the context as borrowed slices.
//!
//! ## Failure Model
//!
//! No graphics call traps. The guest only learns about failures through
//! `glGetError` and the compile/link status queries, so invalid enums and
//! objects are forwarded to the context and its own validation applies.

pub mod consts;
mod headless;
mod shim;

pub use headless::{FrameCounters, GlObject, HeadlessGl};
pub use shim::{GlShim, TextureLevel};

use std::fmt::Debug;
use std::hash::Hash;

/// A value returned by a state query.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter<O> {
    /// A bound object (or none)
    Object(Option<O>),
    /// A single integer
    Int(i32),
    /// Four integers (viewport, scissor box)
    Int4([i32; 4]),
    /// A single float
    Float(f32),
    /// Four floats (clear colour)
    Float4([f32; 4]),
    /// A boolean
    Bool(bool),
    /// The context does not know this parameter
    Unsupported,
}

/// The host graphics API the shim drives.
///
/// Shaped after a WebGL2 rendering context: objects are opaque values owned
/// by the context, "no object" is `None`, and bulk data arrives as byte
/// slices borrowed from guest memory.
#[allow(clippy::too_many_arguments, missing_docs)]
pub trait GraphicsContext {
    /// Opaque object reference (framebuffer, texture, buffer, shader,
    /// program or uniform location).
    type Object: Clone + Eq + Hash + Debug;

    fn create_framebuffer(&mut self) -> Option<Self::Object>;
    fn create_texture(&mut self) -> Option<Self::Object>;
    fn create_buffer(&mut self) -> Option<Self::Object>;
    fn create_shader(&mut self, kind: u32) -> Option<Self::Object>;
    fn create_program(&mut self) -> Option<Self::Object>;

    fn delete_framebuffer(&mut self, framebuffer: Option<&Self::Object>);
    fn delete_texture(&mut self, texture: Option<&Self::Object>);
    fn delete_buffer(&mut self, buffer: Option<&Self::Object>);
    fn delete_shader(&mut self, shader: Option<&Self::Object>);
    fn delete_program(&mut self, program: Option<&Self::Object>);

    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<&Self::Object>);
    fn bind_texture(&mut self, target: u32, texture: Option<&Self::Object>);
    fn bind_buffer(&mut self, target: u32, buffer: Option<&Self::Object>);
    fn use_program(&mut self, program: Option<&Self::Object>);

    fn blit_framebuffer(&mut self, src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32);
    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        textarget: u32,
        texture: Option<&Self::Object>,
        level: i32,
    );

    fn enable(&mut self, cap: u32);
    fn disable(&mut self, cap: u32);
    fn is_enabled(&mut self, cap: u32) -> bool;
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn get_parameter(&mut self, pname: u32) -> Parameter<Self::Object>;

    fn active_texture(&mut self, unit: u32);
    fn tex_parameter_i(&mut self, target: u32, pname: u32, param: i32);
    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    fn tex_sub_image_2d(
        &mut self,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    /// `data` is `None` when the guest passed a NULL pointer.
    fn buffer_data(&mut self, target: u32, size: usize, data: Option<&[u8]>, usage: u32);

    fn shader_source(&mut self, shader: Option<&Self::Object>, source: &str);
    fn compile_shader(&mut self, shader: Option<&Self::Object>);
    fn shader_compile_status(&mut self, shader: Option<&Self::Object>) -> bool;
    fn shader_info_log(&mut self, shader: Option<&Self::Object>) -> String;
    fn attach_shader(&mut self, program: Option<&Self::Object>, shader: Option<&Self::Object>);
    fn detach_shader(&mut self, program: Option<&Self::Object>, shader: Option<&Self::Object>);
    fn link_program(&mut self, program: Option<&Self::Object>);
    fn program_parameter(&mut self, program: Option<&Self::Object>, pname: u32) -> i32;
    fn program_info_log(&mut self, program: Option<&Self::Object>) -> String;

    fn get_attrib_location(&mut self, program: Option<&Self::Object>, name: &str) -> i32;
    fn get_uniform_location(
        &mut self,
        program: Option<&Self::Object>,
        name: &str,
    ) -> Option<Self::Object>;
    fn uniform_1i(&mut self, location: Option<&Self::Object>, value: i32);
    fn uniform_1f(&mut self, location: Option<&Self::Object>, value: f32);
    /// `data` holds `16 * count` little-endian floats.
    fn uniform_matrix_4fv(&mut self, location: Option<&Self::Object>, transpose: bool, data: &[u8]);

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn draw_elements(&mut self, mode: u32, count: i32, ty: u32, offset: i32);

    fn clear(&mut self, mask: u32);
    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32);
    fn blend_func(&mut self, sfactor: u32, dfactor: u32);
    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn blend_equation(&mut self, mode: u32);
    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32);

    fn get_error(&mut self) -> u32;
    fn finish(&mut self);
}
