//! GL entry points over a [`GraphicsContext`].

use std::collections::HashMap;

use super::consts::*;
use super::{GraphicsContext, Parameter};
use crate::error::Result;
use crate::handles::{Handle, HandleTable};
use crate::memory::{GuestPtr, MemoryView};

/// Size of the most recent level uploaded to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLevel {
    /// Width in texels
    pub width: i32,
    /// Height in texels
    pub height: i32,
}

/// How `glGetIntegerv` shapes a known query.
enum IntegerQuery {
    Object,
    Int4,
    Int,
}

fn integer_query(pname: u32) -> Option<IntegerQuery> {
    match pname {
        READ_FRAMEBUFFER_BINDING
        | DRAW_FRAMEBUFFER_BINDING
        | ARRAY_BUFFER_BINDING
        | ELEMENT_ARRAY_BUFFER_BINDING
        | TEXTURE_BINDING_2D
        | CURRENT_PROGRAM => Some(IntegerQuery::Object),
        VIEWPORT | SCISSOR_BOX => Some(IntegerQuery::Int4),
        ACTIVE_TEXTURE
        | BLEND_SRC_RGB
        | BLEND_DST_RGB
        | BLEND_SRC_ALPHA
        | BLEND_DST_ALPHA
        | BLEND_EQUATION_RGB
        | BLEND_EQUATION_ALPHA => Some(IntegerQuery::Int),
        _ => None,
    }
}

/// Resolve a guest handle; 0 is always "no object".
fn lookup<O>(objects: &HandleTable<O>, raw: u32) -> Option<&O> {
    let handle = Handle::from_raw(raw);
    if handle.is_null() {
        return None;
    }
    objects.resolve(handle)
}

fn write_i32s(mem: &mut MemoryView<'_>, ptr: GuestPtr, values: &[i32]) -> Result<()> {
    for (i, v) in values.iter().enumerate() {
        mem.write_i32(ptr.wrapping_add(4 * i as u32), *v)?;
    }
    Ok(())
}

fn write_f32s(mem: &mut MemoryView<'_>, ptr: GuestPtr, values: &[f32]) -> Result<()> {
    for (i, v) in values.iter().enumerate() {
        mem.write_f32(ptr.wrapping_add(4 * i as u32), *v)?;
    }
    Ok(())
}

/// The graphics half of the call table.
///
/// Every method corresponds to one `gl*` import. Methods that touch guest
/// memory take the [`MemoryView`] for the current call and return the memory
/// error, if any, so the dispatcher can log it; the context itself has
/// already seen whatever part of the call was valid.
pub struct GlShim<G: GraphicsContext> {
    ctx: G,
    objects: HandleTable<G::Object>,
    bound_texture: Handle,
    textures: HashMap<Handle, TextureLevel>,
}

impl<G: GraphicsContext> GlShim<G> {
    /// Wrap a graphics context.
    pub fn new(ctx: G) -> Self {
        Self {
            ctx,
            objects: HandleTable::new(),
            bound_texture: Handle::NULL,
            textures: HashMap::new(),
        }
    }

    /// The underlying context.
    pub fn context(&self) -> &G {
        &self.ctx
    }

    /// The underlying context, mutably.
    pub fn context_mut(&mut self) -> &mut G {
        &mut self.ctx
    }

    /// Live guest-visible objects.
    pub fn objects(&self) -> &HandleTable<G::Object> {
        &self.objects
    }

    /// Handle last passed to `glBindTexture`.
    pub fn bound_texture(&self) -> Handle {
        self.bound_texture
    }

    /// Recorded size of a texture's most recent upload.
    pub fn texture_level(&self, texture: Handle) -> Option<TextureLevel> {
        self.textures.get(&texture).copied()
    }

    fn handle_for(&mut self, object: Option<G::Object>) -> Handle {
        match object {
            Some(o) => self.objects.intern(o),
            None => Handle::NULL,
        }
    }

    fn store(&mut self, object: Option<G::Object>) -> Handle {
        match object {
            Some(o) => self.objects.allocate(o),
            None => {
                tracing::warn!("graphics context failed to create an object");
                Handle::NULL
            }
        }
    }

    fn gen_objects(
        &mut self,
        mem: &mut MemoryView<'_>,
        n: i32,
        ids: GuestPtr,
        create: fn(&mut G) -> Option<G::Object>,
    ) -> Result<()> {
        for x in 0..n.max(0) as u32 {
            let object = create(&mut self.ctx);
            let handle = self.store(object);
            mem.write_u32(ids.wrapping_add(x.wrapping_mul(4)), handle.raw())?;
        }
        Ok(())
    }

    fn delete_objects(
        &mut self,
        mem: &mut MemoryView<'_>,
        n: i32,
        ids: GuestPtr,
        delete: fn(&mut G, Option<&G::Object>),
    ) -> Result<()> {
        for x in 0..n.max(0) as u32 {
            let handle = Handle::from_raw(mem.read_u32(ids.wrapping_add(x.wrapping_mul(4)))?);
            let object = self.objects.release(handle);
            delete(&mut self.ctx, object.as_ref());
        }
        Ok(())
    }

    // Framebuffers

    /// `glGenFramebuffers`
    pub fn gen_framebuffers(&mut self, mem: &mut MemoryView<'_>, n: i32, ids: GuestPtr) -> Result<()> {
        self.gen_objects(mem, n, ids, G::create_framebuffer)
    }

    /// `glDeleteFramebuffers`
    pub fn delete_framebuffers(
        &mut self,
        mem: &mut MemoryView<'_>,
        n: i32,
        ids: GuestPtr,
    ) -> Result<()> {
        self.delete_objects(mem, n, ids, G::delete_framebuffer)
    }

    /// `glBindFramebuffer`
    pub fn bind_framebuffer(&mut self, target: u32, framebuffer: u32) {
        self.ctx.bind_framebuffer(target, lookup(&self.objects, framebuffer));
    }

    /// `glBlitFramebuffer`
    #[allow(clippy::too_many_arguments)]
    pub fn blit_framebuffer(
        &mut self,
        src_x0: i32,
        src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        dst_x0: i32,
        dst_y0: i32,
        dst_x1: i32,
        dst_y1: i32,
        mask: u32,
        filter: u32,
    ) {
        self.ctx.blit_framebuffer(
            [src_x0, src_y0, src_x1, src_y1],
            [dst_x0, dst_y0, dst_x1, dst_y1],
            mask,
            filter,
        );
    }

    /// `glFramebufferTexture2D`
    pub fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        textarget: u32,
        texture: u32,
        level: i32,
    ) {
        self.ctx.framebuffer_texture_2d(
            target,
            attachment,
            textarget,
            lookup(&self.objects, texture),
            level,
        );
    }

    // Capabilities and rectangles

    /// `glEnable`
    pub fn enable(&mut self, cap: u32) {
        self.ctx.enable(cap);
    }

    /// `glDisable`
    pub fn disable(&mut self, cap: u32) {
        self.ctx.disable(cap);
    }

    /// `glIsEnabled`
    pub fn is_enabled(&mut self, cap: u32) -> i32 {
        i32::from(self.ctx.is_enabled(cap))
    }

    /// `glViewport`
    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.ctx.viewport(x, y, width, height);
    }

    /// `glScissor`
    pub fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.ctx.scissor(x, y, width, height);
    }

    // State queries

    /// `glGetIntegerv`
    pub fn get_integerv(&mut self, mem: &mut MemoryView<'_>, pname: u32, data: GuestPtr) -> Result<()> {
        let value = self.ctx.get_parameter(pname);
        match (integer_query(pname), value) {
            (Some(IntegerQuery::Object), Parameter::Object(object)) => {
                let handle = self.handle_for(object);
                mem.write_u32(data, handle.raw())
            }
            (Some(IntegerQuery::Int4), Parameter::Int4(values)) => write_i32s(mem, data, &values),
            (Some(IntegerQuery::Int), Parameter::Int(v)) => mem.write_i32(data, v),
            (known, value) => {
                if known.is_some() {
                    tracing::debug!(pname = format_args!("{:#06x}", pname), ?value, "unexpected query shape");
                }
                self.write_raw_integer(mem, data, value)
            }
        }
    }

    fn write_raw_integer(
        &mut self,
        mem: &mut MemoryView<'_>,
        data: GuestPtr,
        value: Parameter<G::Object>,
    ) -> Result<()> {
        match value {
            Parameter::Object(object) => {
                let handle = self.handle_for(object);
                mem.write_u32(data, handle.raw())
            }
            Parameter::Int(v) => mem.write_i32(data, v),
            Parameter::Int4(values) => write_i32s(mem, data, &values),
            Parameter::Float(v) => mem.write_i32(data, v as i32),
            Parameter::Float4(values) => write_i32s(mem, data, &values.map(|v| v as i32)),
            Parameter::Bool(b) => mem.write_i32(data, i32::from(b)),
            Parameter::Unsupported => mem.write_i32(data, 0),
        }
    }

    /// `glGetFloatv`
    pub fn get_floatv(&mut self, mem: &mut MemoryView<'_>, pname: u32, data: GuestPtr) -> Result<()> {
        match self.ctx.get_parameter(pname) {
            Parameter::Float4(values) => write_f32s(mem, data, &values),
            Parameter::Float(v) => mem.write_f32(data, v),
            Parameter::Int(v) => mem.write_f32(data, v as f32),
            Parameter::Int4(values) => write_f32s(mem, data, &values.map(|v| v as f32)),
            Parameter::Bool(b) => mem.write_f32(data, if b { 1.0 } else { 0.0 }),
            Parameter::Object(object) => {
                let handle = self.handle_for(object);
                mem.write_f32(data, handle.raw() as f32)
            }
            Parameter::Unsupported => mem.write_f32(data, 0.0),
        }
    }

    /// `glGetTexLevelParameteriv`
    ///
    /// Answered from the upload side-table for the bound texture.
    pub fn get_tex_level_parameteriv(
        &mut self,
        mem: &mut MemoryView<'_>,
        _target: u32,
        _level: i32,
        pname: u32,
        params: GuestPtr,
    ) -> Result<()> {
        let level = self.textures.get(&self.bound_texture);
        let value = match pname {
            TEXTURE_WIDTH => level.map(|l| l.width),
            TEXTURE_HEIGHT => level.map(|l| l.height),
            _ => None,
        };
        mem.write_i32(params, value.unwrap_or(0))
    }

    // Textures

    /// `glGenTextures`
    pub fn gen_textures(&mut self, mem: &mut MemoryView<'_>, n: i32, ids: GuestPtr) -> Result<()> {
        self.gen_objects(mem, n, ids, G::create_texture)
    }

    /// `glDeleteTextures`
    pub fn delete_textures(&mut self, mem: &mut MemoryView<'_>, n: i32, ids: GuestPtr) -> Result<()> {
        for x in 0..n.max(0) as u32 {
            let handle = Handle::from_raw(mem.read_u32(ids.wrapping_add(x.wrapping_mul(4)))?);
            let object = self.objects.release(handle);
            self.ctx.delete_texture(object.as_ref());
            self.textures.remove(&handle);
            if handle == self.bound_texture {
                self.bound_texture = Handle::NULL;
            }
        }
        Ok(())
    }

    /// `glBindTexture`
    pub fn bind_texture(&mut self, target: u32, texture: u32) {
        self.ctx.bind_texture(target, lookup(&self.objects, texture));
        self.bound_texture = Handle::from_raw(texture);
    }

    /// `glActiveTexture`
    pub fn active_texture(&mut self, unit: u32) {
        self.ctx.active_texture(unit);
    }

    /// `glTexParameteri`
    pub fn tex_parameteri(&mut self, target: u32, pname: u32, param: i32) {
        self.ctx.tex_parameter_i(target, pname, param);
    }

    /// `glTexImage2D`
    #[allow(clippy::too_many_arguments)]
    pub fn tex_image_2d(
        &mut self,
        mem: &mut MemoryView<'_>,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        ty: u32,
        data: GuestPtr,
    ) -> Result<()> {
        let pixels = if data == 0 { None } else { Some(mem.tail(data)?) };
        self.ctx.tex_image_2d(
            target,
            level,
            internal_format,
            width,
            height,
            border,
            format,
            ty,
            pixels,
        );
        self.textures
            .insert(self.bound_texture, TextureLevel { width, height });
        Ok(())
    }

    /// `glTexSubImage2D`
    #[allow(clippy::too_many_arguments)]
    pub fn tex_sub_image_2d(
        &mut self,
        mem: &mut MemoryView<'_>,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: GuestPtr,
    ) -> Result<()> {
        let pixels = if pixels == 0 { None } else { Some(mem.tail(pixels)?) };
        self.ctx.tex_sub_image_2d(
            target, level, x_offset, y_offset, width, height, format, ty, pixels,
        );
        Ok(())
    }

    // Buffers and vertex state

    /// `glGenBuffers`
    pub fn gen_buffers(&mut self, mem: &mut MemoryView<'_>, n: i32, ids: GuestPtr) -> Result<()> {
        self.gen_objects(mem, n, ids, G::create_buffer)
    }

    /// `glDeleteBuffers`
    pub fn delete_buffers(&mut self, mem: &mut MemoryView<'_>, n: i32, ids: GuestPtr) -> Result<()> {
        self.delete_objects(mem, n, ids, G::delete_buffer)
    }

    /// `glBindBuffer`
    pub fn bind_buffer(&mut self, target: u32, buffer: u32) {
        self.ctx.bind_buffer(target, lookup(&self.objects, buffer));
    }

    /// `glBufferData`: hands the context exactly `size` bytes.
    pub fn buffer_data(
        &mut self,
        mem: &mut MemoryView<'_>,
        target: u32,
        size: i32,
        data: GuestPtr,
        usage: u32,
    ) -> Result<()> {
        let size = size.max(0) as usize;
        let bytes = if data == 0 { None } else { Some(mem.slice(data, size)?) };
        self.ctx.buffer_data(target, size, bytes, usage);
        Ok(())
    }

    /// `glVertexAttribPointer`
    pub fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.ctx
            .vertex_attrib_pointer(index, size, ty, normalized, stride, offset);
    }

    /// `glEnableVertexAttribArray`
    pub fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.ctx.enable_vertex_attrib_array(index);
    }

    /// `glDrawElements`
    pub fn draw_elements(&mut self, mode: u32, count: i32, ty: u32, offset: i32) {
        self.ctx.draw_elements(mode, count, ty, offset);
    }

    // Shaders and programs

    /// `glCreateShader`
    pub fn create_shader(&mut self, kind: u32) -> u32 {
        let object = self.ctx.create_shader(kind);
        self.store(object).raw()
    }

    /// `glDeleteShader`
    pub fn delete_shader(&mut self, shader: u32) {
        let object = self.objects.release(Handle::from_raw(shader));
        self.ctx.delete_shader(object.as_ref());
    }

    /// `glShaderSource`: the `count` strings are concatenated in order.
    pub fn shader_source(
        &mut self,
        mem: &mut MemoryView<'_>,
        shader: u32,
        count: i32,
        strings: GuestPtr,
        _lengths: GuestPtr,
    ) -> Result<()> {
        let mut source = String::new();
        for ptr in mem.read_u32_array(strings, count.max(0) as usize)? {
            source.push_str(&mem.read_cstr(ptr)?);
        }
        self.ctx.shader_source(lookup(&self.objects, shader), &source);
        Ok(())
    }

    /// `glCompileShader`
    pub fn compile_shader(&mut self, shader: u32) {
        self.ctx.compile_shader(lookup(&self.objects, shader));
    }

    /// `glGetShaderiv`: only `COMPILE_STATUS` is answered.
    pub fn get_shaderiv(
        &mut self,
        mem: &mut MemoryView<'_>,
        shader: u32,
        pname: u32,
        params: GuestPtr,
    ) -> Result<()> {
        if pname != COMPILE_STATUS {
            return mem.write_i32(params, 0);
        }
        let object = lookup(&self.objects, shader);
        let compiled = self.ctx.shader_compile_status(object);
        if !compiled {
            let log = self.ctx.shader_info_log(object);
            tracing::warn!(shader = %Handle::from_raw(shader), "shader compile failed: {}", log);
        }
        mem.write_i32(params, i32::from(compiled))
    }

    /// `glGetShaderInfoLog`: the log goes to tracing, the guest gets "".
    pub fn get_shader_info_log(
        &mut self,
        mem: &mut MemoryView<'_>,
        _shader: u32,
        bufsize: i32,
        length: GuestPtr,
        infolog: GuestPtr,
    ) -> Result<()> {
        if length != 0 {
            mem.write_i32(length, 0)?;
        }
        if bufsize > 0 && infolog != 0 {
            mem.write_cstr(infolog, "");
        }
        Ok(())
    }

    /// `glCreateProgram`
    pub fn create_program(&mut self) -> u32 {
        let object = self.ctx.create_program();
        self.store(object).raw()
    }

    /// `glDeleteProgram`
    pub fn delete_program(&mut self, program: u32) {
        let object = self.objects.release(Handle::from_raw(program));
        self.ctx.delete_program(object.as_ref());
    }

    /// `glAttachShader`
    pub fn attach_shader(&mut self, program: u32, shader: u32) {
        self.ctx.attach_shader(
            lookup(&self.objects, program),
            lookup(&self.objects, shader),
        );
    }

    /// `glDetachShader`
    pub fn detach_shader(&mut self, program: u32, shader: u32) {
        self.ctx.detach_shader(
            lookup(&self.objects, program),
            lookup(&self.objects, shader),
        );
    }

    /// `glLinkProgram`
    pub fn link_program(&mut self, program: u32) {
        self.ctx.link_program(lookup(&self.objects, program));
    }

    /// `glUseProgram`
    pub fn use_program(&mut self, program: u32) {
        self.ctx.use_program(lookup(&self.objects, program));
    }

    /// `glGetProgramiv`
    pub fn get_programiv(
        &mut self,
        mem: &mut MemoryView<'_>,
        program: u32,
        pname: u32,
        params: GuestPtr,
    ) -> Result<()> {
        let object = lookup(&self.objects, program);
        let value = self.ctx.program_parameter(object, pname);
        if pname == LINK_STATUS && value == 0 {
            let log = self.ctx.program_info_log(object);
            tracing::warn!(program = %Handle::from_raw(program), "program link failed: {}", log);
        }
        mem.write_i32(params, value)
    }

    /// `glGetAttribLocation`
    pub fn get_attrib_location(
        &mut self,
        mem: &mut MemoryView<'_>,
        program: u32,
        name: GuestPtr,
    ) -> Result<i32> {
        let name = mem.read_cstr(name)?;
        Ok(self
            .ctx
            .get_attrib_location(lookup(&self.objects, program), &name))
    }

    /// `glGetUniformLocation`: -1 when the program has no such uniform.
    pub fn get_uniform_location(
        &mut self,
        mem: &mut MemoryView<'_>,
        program: u32,
        name: GuestPtr,
    ) -> Result<i32> {
        let name = mem.read_cstr(name)?;
        let location = self
            .ctx
            .get_uniform_location(lookup(&self.objects, program), &name);
        Ok(match location {
            Some(loc) => self.objects.intern(loc).raw() as i32,
            None => -1,
        })
    }

    /// `glUniform1i`
    pub fn uniform_1i(&mut self, location: i32, value: i32) {
        self.ctx
            .uniform_1i(lookup(&self.objects, location as u32), value);
    }

    /// `glUniform1f`
    pub fn uniform_1f(&mut self, location: i32, value: f32) {
        self.ctx
            .uniform_1f(lookup(&self.objects, location as u32), value);
    }

    /// `glUniformMatrix4fv`: reads `16 * count` floats.
    pub fn uniform_matrix_4fv(
        &mut self,
        mem: &mut MemoryView<'_>,
        location: i32,
        count: i32,
        transpose: bool,
        value: GuestPtr,
    ) -> Result<()> {
        let data = mem.slice(value, 64 * count.max(0) as usize)?;
        self.ctx
            .uniform_matrix_4fv(lookup(&self.objects, location as u32), transpose, data);
        Ok(())
    }

    // Frame operations

    /// `glClear`
    pub fn clear(&mut self, mask: u32) {
        self.ctx.clear(mask);
    }

    /// `glClearColor`
    pub fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.ctx.clear_color(red, green, blue, alpha);
    }

    /// `glBlendFunc`
    pub fn blend_func(&mut self, sfactor: u32, dfactor: u32) {
        self.ctx.blend_func(sfactor, dfactor);
    }

    /// `glBlendFuncSeparate`
    pub fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.ctx
            .blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
    }

    /// `glBlendEquation`
    pub fn blend_equation(&mut self, mode: u32) {
        self.ctx.blend_equation(mode);
    }

    /// `glBlendEquationSeparate`
    pub fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        self.ctx.blend_equation_separate(mode_rgb, mode_alpha);
    }

    /// `glGetError`
    pub fn get_error(&mut self) -> u32 {
        self.ctx.get_error()
    }

    /// `glFinish`
    pub fn finish(&mut self) {
        self.ctx.finish();
    }
}
