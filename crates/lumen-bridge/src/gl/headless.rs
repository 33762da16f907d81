//! In-process GL state machine.
//!
//! [`HeadlessGl`] renders nothing. It keeps the object model, bindings and
//! fixed-function state of a GL ES context and validates calls the way a
//! driver would, so guests can run (and be tested) without a display.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::consts::*;
use super::{GraphicsContext, Parameter};

const MAX_TEXTURE_UNITS: u32 = 32;
const MAX_TEXTURE_DIMENSION: i32 = 4096;

/// Object name issued by [`HeadlessGl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlObject(u32);

impl GlObject {
    /// The numeric object name.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GlObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gl:{}", self.0)
    }
}

/// Work submitted since the counters were last taken.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounters {
    /// `glClear` calls
    pub clears: u64,
    /// `glDrawElements` calls that passed validation
    pub draw_calls: u64,
    /// Bytes handed over by texture and buffer uploads
    pub uploaded_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
enum UniformValue {
    Unset,
    Int(i32),
    Float(f32),
    Mat4(Vec<f32>),
}

#[derive(Debug, Default)]
struct ShaderState {
    kind: u32,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramState {
    shaders: Vec<GlObject>,
    linked: bool,
    log: String,
    attributes: Vec<String>,
    uniforms: Vec<String>,
    locations: HashMap<String, GlObject>,
}

#[derive(Debug)]
enum Resource {
    Framebuffer { color: Option<GlObject> },
    Texture { width: i32, height: i32, params: HashMap<u32, i32> },
    Buffer { size: usize },
    Shader(ShaderState),
    Program(ProgramState),
    Uniform { program: GlObject, value: UniformValue },
}

/// A display-less [`GraphicsContext`].
#[derive(Debug)]
pub struct HeadlessGl {
    next_id: u32,
    resources: HashMap<GlObject, Resource>,
    read_framebuffer: Option<GlObject>,
    draw_framebuffer: Option<GlObject>,
    array_buffer: Option<GlObject>,
    element_buffer: Option<GlObject>,
    textures: HashMap<u32, GlObject>,
    program: Option<GlObject>,
    active_texture: u32,
    enabled: HashSet<u32>,
    enabled_attribs: HashSet<u32>,
    viewport: [i32; 4],
    scissor: [i32; 4],
    clear_color: [f32; 4],
    blend_src_rgb: u32,
    blend_dst_rgb: u32,
    blend_src_alpha: u32,
    blend_dst_alpha: u32,
    blend_equation_rgb: u32,
    blend_equation_alpha: u32,
    error: u32,
    counters: FrameCounters,
}

impl HeadlessGl {
    /// A context whose default framebuffer is `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        let size = [0, 0, width as i32, height as i32];
        let mut enabled = HashSet::new();
        enabled.insert(DITHER);
        Self {
            next_id: 0,
            resources: HashMap::new(),
            read_framebuffer: None,
            draw_framebuffer: None,
            array_buffer: None,
            element_buffer: None,
            textures: HashMap::new(),
            program: None,
            active_texture: TEXTURE0,
            enabled,
            enabled_attribs: HashSet::new(),
            viewport: size,
            scissor: size,
            clear_color: [0.0; 4],
            blend_src_rgb: ONE,
            blend_dst_rgb: ZERO,
            blend_src_alpha: ONE,
            blend_dst_alpha: ZERO,
            blend_equation_rgb: FUNC_ADD,
            blend_equation_alpha: FUNC_ADD,
            error: NO_ERROR,
            counters: FrameCounters::default(),
        }
    }

    /// Counters accumulated since the last [`take_counters`](Self::take_counters).
    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Return and reset the counters.
    pub fn take_counters(&mut self) -> FrameCounters {
        std::mem::take(&mut self.counters)
    }

    /// Number of live objects (including uniform locations).
    pub fn live_objects(&self) -> usize {
        self.resources.len()
    }

    /// Current clear colour.
    pub fn clear_color_value(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Size of a texture's storage, if `texture` is one.
    pub fn texture_size(&self, texture: &GlObject) -> Option<(i32, i32)> {
        match self.resources.get(texture) {
            Some(Resource::Texture { width, height, .. }) => Some((*width, *height)),
            _ => None,
        }
    }

    /// Size of a buffer's data store, if `buffer` is one.
    pub fn buffer_size(&self, buffer: &GlObject) -> Option<usize> {
        match self.resources.get(buffer) {
            Some(Resource::Buffer { size }) => Some(*size),
            _ => None,
        }
    }

    /// Value of a texture parameter set through `glTexParameteri`.
    pub fn texture_parameter(&self, texture: &GlObject, pname: u32) -> Option<i32> {
        match self.resources.get(texture) {
            Some(Resource::Texture { params, .. }) => params.get(&pname).copied(),
            _ => None,
        }
    }

    /// Integer value last assigned to a uniform location.
    pub fn uniform_int(&self, location: &GlObject) -> Option<i32> {
        match self.resources.get(location) {
            Some(Resource::Uniform { value: UniformValue::Int(v), .. }) => Some(*v),
            _ => None,
        }
    }

    /// Float value last assigned to a uniform location.
    pub fn uniform_float(&self, location: &GlObject) -> Option<f32> {
        match self.resources.get(location) {
            Some(Resource::Uniform { value: UniformValue::Float(v), .. }) => Some(*v),
            _ => None,
        }
    }

    /// Matrix data last assigned to a uniform location.
    pub fn uniform_matrix(&self, location: &GlObject) -> Option<&[f32]> {
        match self.resources.get(location) {
            Some(Resource::Uniform { value: UniformValue::Mat4(m), .. }) => Some(m.as_slice()),
            _ => None,
        }
    }

    /// Number of vertex attribute arrays enabled.
    pub fn enabled_attributes(&self) -> usize {
        self.enabled_attribs.len()
    }

    /// Colour attachment of a framebuffer.
    pub fn color_attachment(&self, framebuffer: &GlObject) -> Option<GlObject> {
        match self.resources.get(framebuffer) {
            Some(Resource::Framebuffer { color }) => *color,
            _ => None,
        }
    }

    fn record(&mut self, code: u32) {
        // Sticky: the first error wins until glGetError
        if self.error == NO_ERROR {
            tracing::trace!(code = format_args!("{:#06x}", code), "gl error");
            self.error = code;
        }
    }

    fn alloc(&mut self, resource: Resource) -> Option<GlObject> {
        self.next_id = self.next_id.checked_add(1)?;
        let object = GlObject(self.next_id);
        self.resources.insert(object, resource);
        Some(object)
    }

    fn is_framebuffer(&self, o: &GlObject) -> bool {
        matches!(self.resources.get(o), Some(Resource::Framebuffer { .. }))
    }

    fn is_texture(&self, o: &GlObject) -> bool {
        matches!(self.resources.get(o), Some(Resource::Texture { .. }))
    }

    fn is_buffer(&self, o: &GlObject) -> bool {
        matches!(self.resources.get(o), Some(Resource::Buffer { .. }))
    }

    fn shader(&self, o: Option<&GlObject>) -> Option<&ShaderState> {
        match self.resources.get(o?) {
            Some(Resource::Shader(s)) => Some(s),
            _ => None,
        }
    }

    fn shader_mut(&mut self, o: Option<&GlObject>) -> Option<&mut ShaderState> {
        match self.resources.get_mut(o?) {
            Some(Resource::Shader(s)) => Some(s),
            _ => None,
        }
    }

    fn program(&self, o: Option<&GlObject>) -> Option<&ProgramState> {
        match self.resources.get(o?) {
            Some(Resource::Program(p)) => Some(p),
            _ => None,
        }
    }

    fn program_mut(&mut self, o: Option<&GlObject>) -> Option<&mut ProgramState> {
        match self.resources.get_mut(o?) {
            Some(Resource::Program(p)) => Some(p),
            _ => None,
        }
    }

    fn bound_texture(&self) -> Option<GlObject> {
        self.textures.get(&self.active_texture).copied()
    }

    fn buffer_slot(&mut self, target: u32) -> Option<&mut Option<GlObject>> {
        match target {
            ARRAY_BUFFER => Some(&mut self.array_buffer),
            ELEMENT_ARRAY_BUFFER => Some(&mut self.element_buffer),
            _ => None,
        }
    }

    /// Remove `object` if `is_kind` accepts it, then clear bindings to it.
    fn delete_if(&mut self, object: Option<&GlObject>, is_kind: fn(&Self, &GlObject) -> bool) {
        let Some(object) = object else { return };
        if !self.resources.contains_key(object) {
            return;
        }
        if !is_kind(self, object) {
            self.record(INVALID_OPERATION);
            return;
        }
        self.resources.remove(object);
        for slot in [
            &mut self.read_framebuffer,
            &mut self.draw_framebuffer,
            &mut self.array_buffer,
            &mut self.element_buffer,
            &mut self.program,
        ] {
            if slot.as_ref() == Some(object) {
                *slot = None;
            }
        }
        self.textures.retain(|_, t| *t != *object);
    }

    fn check_rect(&mut self, width: i32, height: i32) -> bool {
        if width < 0 || height < 0 {
            self.record(INVALID_VALUE);
            return false;
        }
        true
    }

    fn check_uniform(&mut self, location: Option<&GlObject>) -> Option<GlObject> {
        let location = *location?;
        match self.resources.get(&location) {
            Some(Resource::Uniform { program, .. }) if Some(*program) == self.program => {
                Some(location)
            }
            _ => {
                self.record(INVALID_OPERATION);
                None
            }
        }
    }

    fn set_uniform(&mut self, location: Option<&GlObject>, new_value: UniformValue) {
        let Some(location) = self.check_uniform(location) else { return };
        if let Some(Resource::Uniform { value, .. }) = self.resources.get_mut(&location) {
            *value = new_value;
        }
    }
}

/// Names declared with one of `qualifiers`, in declaration order.
///
/// Understands `attribute vec2 pos;`, `layout(location = 0) in vec2 pos;`
/// and `uniform mat4 proj[2];` style declarations.
fn declared_names(source: &str, qualifiers: &[&str]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for statement in source.split([';', '{', '}']) {
        let tokens: Vec<&str> = statement.split_whitespace().collect();
        let Some(at) = tokens.iter().position(|t| qualifiers.contains(t)) else {
            continue;
        };
        // qualifier, type, name
        if tokens.len() < at + 3 {
            continue;
        }
        let Some(last) = tokens.last() else { continue };
        let name = last.split('[').next().unwrap_or(*last).to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

impl GraphicsContext for HeadlessGl {
    type Object = GlObject;

    fn create_framebuffer(&mut self) -> Option<GlObject> {
        self.alloc(Resource::Framebuffer { color: None })
    }

    fn create_texture(&mut self) -> Option<GlObject> {
        self.alloc(Resource::Texture {
            width: 0,
            height: 0,
            params: HashMap::new(),
        })
    }

    fn create_buffer(&mut self) -> Option<GlObject> {
        self.alloc(Resource::Buffer { size: 0 })
    }

    fn create_shader(&mut self, kind: u32) -> Option<GlObject> {
        if kind != VERTEX_SHADER && kind != FRAGMENT_SHADER {
            self.record(INVALID_ENUM);
            return None;
        }
        self.alloc(Resource::Shader(ShaderState {
            kind,
            ..Default::default()
        }))
    }

    fn create_program(&mut self) -> Option<GlObject> {
        self.alloc(Resource::Program(ProgramState::default()))
    }

    fn delete_framebuffer(&mut self, framebuffer: Option<&GlObject>) {
        self.delete_if(framebuffer, Self::is_framebuffer);
    }

    fn delete_texture(&mut self, texture: Option<&GlObject>) {
        self.delete_if(texture, Self::is_texture);
    }

    fn delete_buffer(&mut self, buffer: Option<&GlObject>) {
        self.delete_if(buffer, Self::is_buffer);
    }

    fn delete_shader(&mut self, shader: Option<&GlObject>) {
        self.delete_if(shader, |gl, o| gl.shader(Some(o)).is_some());
        if let Some(shader) = shader {
            for resource in self.resources.values_mut() {
                if let Resource::Program(p) = resource {
                    p.shaders.retain(|s| s != shader);
                }
            }
        }
    }

    fn delete_program(&mut self, program: Option<&GlObject>) {
        self.delete_if(program, |gl, o| gl.program(Some(o)).is_some());
        if let Some(program) = program {
            self.resources.retain(
                |_, r| !matches!(r, Resource::Uniform { program: owner, .. } if *owner == *program),
            );
        }
    }

    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<&GlObject>) {
        if let Some(fb) = framebuffer {
            if !self.is_framebuffer(fb) {
                self.record(INVALID_OPERATION);
                return;
            }
        }
        let fb = framebuffer.copied();
        match target {
            FRAMEBUFFER => {
                self.read_framebuffer = fb;
                self.draw_framebuffer = fb;
            }
            READ_FRAMEBUFFER => self.read_framebuffer = fb,
            DRAW_FRAMEBUFFER => self.draw_framebuffer = fb,
            _ => self.record(INVALID_ENUM),
        }
    }

    fn bind_texture(&mut self, target: u32, texture: Option<&GlObject>) {
        if target != TEXTURE_2D {
            self.record(INVALID_ENUM);
            return;
        }
        match texture {
            Some(t) if !self.is_texture(t) => self.record(INVALID_OPERATION),
            Some(t) => {
                self.textures.insert(self.active_texture, *t);
            }
            None => {
                self.textures.remove(&self.active_texture);
            }
        }
    }

    fn bind_buffer(&mut self, target: u32, buffer: Option<&GlObject>) {
        if let Some(b) = buffer {
            if !self.is_buffer(b) {
                self.record(INVALID_OPERATION);
                return;
            }
        }
        match self.buffer_slot(target) {
            Some(slot) => *slot = buffer.copied(),
            None => self.record(INVALID_ENUM),
        }
    }

    fn use_program(&mut self, program: Option<&GlObject>) {
        match program {
            None => self.program = None,
            Some(p) => {
                if self.program(Some(p)).is_some_and(|state| state.linked) {
                    self.program = Some(*p);
                } else {
                    self.record(INVALID_OPERATION);
                }
            }
        }
    }

    fn blit_framebuffer(&mut self, src: [i32; 4], dst: [i32; 4], mask: u32, _filter: u32) {
        if mask & !(COLOR_BUFFER_BIT | DEPTH_BUFFER_BIT | STENCIL_BUFFER_BIT) != 0 {
            self.record(INVALID_VALUE);
            return;
        }
        if self.read_framebuffer.is_some() && self.read_framebuffer == self.draw_framebuffer {
            self.record(INVALID_OPERATION);
            return;
        }
        tracing::trace!(?src, ?dst, "blit");
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        _textarget: u32,
        texture: Option<&GlObject>,
        _level: i32,
    ) {
        let bound = match target {
            FRAMEBUFFER | DRAW_FRAMEBUFFER => self.draw_framebuffer,
            READ_FRAMEBUFFER => self.read_framebuffer,
            _ => {
                self.record(INVALID_ENUM);
                return;
            }
        };
        let Some(fb) = bound else {
            self.record(INVALID_OPERATION);
            return;
        };
        if let Some(t) = texture {
            if !self.is_texture(t) {
                self.record(INVALID_OPERATION);
                return;
            }
        }
        if attachment != COLOR_ATTACHMENT0 {
            return;
        }
        if let Some(Resource::Framebuffer { color }) = self.resources.get_mut(&fb) {
            *color = texture.copied();
        }
    }

    fn enable(&mut self, cap: u32) {
        match cap {
            BLEND | CULL_FACE | DEPTH_TEST | DITHER | POLYGON_OFFSET_FILL
            | SAMPLE_ALPHA_TO_COVERAGE | SAMPLE_COVERAGE | SCISSOR_TEST | STENCIL_TEST => {
                self.enabled.insert(cap);
            }
            _ => self.record(INVALID_ENUM),
        }
    }

    fn disable(&mut self, cap: u32) {
        match cap {
            BLEND | CULL_FACE | DEPTH_TEST | DITHER | POLYGON_OFFSET_FILL
            | SAMPLE_ALPHA_TO_COVERAGE | SAMPLE_COVERAGE | SCISSOR_TEST | STENCIL_TEST => {
                self.enabled.remove(&cap);
            }
            _ => self.record(INVALID_ENUM),
        }
    }

    fn is_enabled(&mut self, cap: u32) -> bool {
        self.enabled.contains(&cap)
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if self.check_rect(width, height) {
            self.viewport = [x, y, width, height];
        }
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if self.check_rect(width, height) {
            self.scissor = [x, y, width, height];
        }
    }

    fn get_parameter(&mut self, pname: u32) -> Parameter<GlObject> {
        match pname {
            READ_FRAMEBUFFER_BINDING => Parameter::Object(self.read_framebuffer),
            DRAW_FRAMEBUFFER_BINDING => Parameter::Object(self.draw_framebuffer),
            ARRAY_BUFFER_BINDING => Parameter::Object(self.array_buffer),
            ELEMENT_ARRAY_BUFFER_BINDING => Parameter::Object(self.element_buffer),
            TEXTURE_BINDING_2D => Parameter::Object(self.bound_texture()),
            CURRENT_PROGRAM => Parameter::Object(self.program),
            VIEWPORT => Parameter::Int4(self.viewport),
            SCISSOR_BOX => Parameter::Int4(self.scissor),
            COLOR_CLEAR_VALUE => Parameter::Float4(self.clear_color),
            ACTIVE_TEXTURE => Parameter::Int(self.active_texture as i32),
            BLEND_SRC_RGB => Parameter::Int(self.blend_src_rgb as i32),
            BLEND_DST_RGB => Parameter::Int(self.blend_dst_rgb as i32),
            BLEND_SRC_ALPHA => Parameter::Int(self.blend_src_alpha as i32),
            BLEND_DST_ALPHA => Parameter::Int(self.blend_dst_alpha as i32),
            BLEND_EQUATION_RGB => Parameter::Int(self.blend_equation_rgb as i32),
            BLEND_EQUATION_ALPHA => Parameter::Int(self.blend_equation_alpha as i32),
            MAX_TEXTURE_SIZE => Parameter::Int(MAX_TEXTURE_DIMENSION),
            BLEND | CULL_FACE | DEPTH_TEST | DITHER | SCISSOR_TEST | STENCIL_TEST => {
                Parameter::Bool(self.enabled.contains(&pname))
            }
            _ => {
                self.record(INVALID_ENUM);
                Parameter::Unsupported
            }
        }
    }

    fn active_texture(&mut self, unit: u32) {
        if (TEXTURE0..TEXTURE0 + MAX_TEXTURE_UNITS).contains(&unit) {
            self.active_texture = unit;
        } else {
            self.record(INVALID_ENUM);
        }
    }

    fn tex_parameter_i(&mut self, target: u32, pname: u32, param: i32) {
        if target != TEXTURE_2D {
            self.record(INVALID_ENUM);
            return;
        }
        let Some(texture) = self.bound_texture() else {
            self.record(INVALID_OPERATION);
            return;
        };
        if let Some(Resource::Texture { params, .. }) = self.resources.get_mut(&texture) {
            params.insert(pname, param);
        }
    }

    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        _internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        _format: u32,
        _ty: u32,
        pixels: Option<&[u8]>,
    ) {
        if target != TEXTURE_2D {
            self.record(INVALID_ENUM);
            return;
        }
        if level < 0
            || border != 0
            || !(0..=MAX_TEXTURE_DIMENSION).contains(&width)
            || !(0..=MAX_TEXTURE_DIMENSION).contains(&height)
        {
            self.record(INVALID_VALUE);
            return;
        }
        let Some(texture) = self.bound_texture() else {
            self.record(INVALID_OPERATION);
            return;
        };
        if let Some(Resource::Texture { width: w, height: h, .. }) = self.resources.get_mut(&texture) {
            if level == 0 {
                *w = width;
                *h = height;
            }
        }
        if let Some(p) = pixels {
            let expected = width as usize * height as usize * 4;
            self.counters.uploaded_bytes += expected.min(p.len()) as u64;
        }
    }

    fn tex_sub_image_2d(
        &mut self,
        target: u32,
        _level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        _format: u32,
        _ty: u32,
        pixels: Option<&[u8]>,
    ) {
        if target != TEXTURE_2D {
            self.record(INVALID_ENUM);
            return;
        }
        let Some((tw, th)) = self.bound_texture().and_then(|t| self.texture_size(&t)) else {
            self.record(INVALID_OPERATION);
            return;
        };
        if x_offset < 0
            || y_offset < 0
            || width < 0
            || height < 0
            || x_offset.checked_add(width).map_or(true, |end| end > tw)
            || y_offset.checked_add(height).map_or(true, |end| end > th)
        {
            self.record(INVALID_VALUE);
            return;
        }
        if let Some(p) = pixels {
            let expected = width as usize * height as usize * 4;
            self.counters.uploaded_bytes += expected.min(p.len()) as u64;
        }
    }

    fn buffer_data(&mut self, target: u32, size: usize, data: Option<&[u8]>, _usage: u32) {
        let Some(slot) = self.buffer_slot(target) else {
            self.record(INVALID_ENUM);
            return;
        };
        let Some(buffer) = *slot else {
            self.record(INVALID_OPERATION);
            return;
        };
        if let Some(Resource::Buffer { size: s }) = self.resources.get_mut(&buffer) {
            *s = size;
        }
        if let Some(d) = data {
            self.counters.uploaded_bytes += d.len() as u64;
        }
    }

    fn shader_source(&mut self, shader: Option<&GlObject>, source: &str) {
        match self.shader_mut(shader) {
            Some(state) => state.source = source.to_string(),
            None => self.record(INVALID_OPERATION),
        }
    }

    fn compile_shader(&mut self, shader: Option<&GlObject>) {
        let Some(state) = self.shader_mut(shader) else {
            self.record(INVALID_OPERATION);
            return;
        };
        let source = state.source.trim();
        if source.is_empty() {
            state.compiled = false;
            state.log = "ERROR: 0:1: empty shader source".to_string();
        } else if !source.contains("main") {
            state.compiled = false;
            state.log = "ERROR: 0:1: 'main' : function not defined".to_string();
        } else {
            state.compiled = true;
            state.log.clear();
        }
    }

    fn shader_compile_status(&mut self, shader: Option<&GlObject>) -> bool {
        match self.shader(shader) {
            Some(state) => state.compiled,
            None => {
                self.record(INVALID_OPERATION);
                false
            }
        }
    }

    fn shader_info_log(&mut self, shader: Option<&GlObject>) -> String {
        self.shader(shader).map(|s| s.log.clone()).unwrap_or_default()
    }

    fn attach_shader(&mut self, program: Option<&GlObject>, shader: Option<&GlObject>) {
        let Some(shader) = shader.filter(|s| self.shader(Some(*s)).is_some()).copied() else {
            self.record(INVALID_OPERATION);
            return;
        };
        let Some(state) = self.program_mut(program) else {
            self.record(INVALID_OPERATION);
            return;
        };
        if state.shaders.contains(&shader) {
            self.record(INVALID_OPERATION);
            return;
        }
        state.shaders.push(shader);
    }

    fn detach_shader(&mut self, program: Option<&GlObject>, shader: Option<&GlObject>) {
        let Some(shader) = shader.copied() else {
            self.record(INVALID_OPERATION);
            return;
        };
        let Some(state) = self.program_mut(program) else {
            self.record(INVALID_OPERATION);
            return;
        };
        let before = state.shaders.len();
        state.shaders.retain(|s| *s != shader);
        if state.shaders.len() == before {
            self.record(INVALID_OPERATION);
        }
    }

    fn link_program(&mut self, program: Option<&GlObject>) {
        let Some(attached) = self.program(program).map(|p| p.shaders.clone()) else {
            self.record(INVALID_OPERATION);
            return;
        };

        let compiled = |kind: u32| {
            attached.iter().find_map(|s| match self.shader(Some(s)) {
                Some(state) if state.kind == kind && state.compiled => Some(state.source.clone()),
                _ => None,
            })
        };
        let vertex = compiled(VERTEX_SHADER);
        let fragment = compiled(FRAGMENT_SHADER);

        let outcome = match (vertex, fragment) {
            (Some(vs), Some(fs)) => {
                let attributes = declared_names(&vs, &["attribute", "in"]);
                let mut uniforms = declared_names(&vs, &["uniform"]);
                for name in declared_names(&fs, &["uniform"]) {
                    if !uniforms.contains(&name) {
                        uniforms.push(name);
                    }
                }
                Ok((attributes, uniforms))
            }
            (None, _) => Err("no compiled vertex shader attached"),
            (_, None) => Err("no compiled fragment shader attached"),
        };

        let Some(state) = self.program_mut(program) else { return };
        let stale: Vec<GlObject> = state.locations.drain().map(|(_, loc)| loc).collect();
        match outcome {
            Ok((attributes, uniforms)) => {
                state.linked = true;
                state.log.clear();
                state.attributes = attributes;
                state.uniforms = uniforms;
            }
            Err(reason) => {
                state.linked = false;
                state.log = format!("ERROR: link failed: {}", reason);
                state.attributes.clear();
                state.uniforms.clear();
            }
        }
        for loc in stale {
            self.resources.remove(&loc);
        }
    }

    fn program_parameter(&mut self, program: Option<&GlObject>, pname: u32) -> i32 {
        let Some(state) = self.program(program) else {
            self.record(INVALID_OPERATION);
            return 0;
        };
        let value = match pname {
            LINK_STATUS => Some(i32::from(state.linked)),
            DELETE_STATUS => Some(0),
            ATTACHED_SHADERS => Some(state.shaders.len() as i32),
            ACTIVE_ATTRIBUTES => Some(state.attributes.len() as i32),
            ACTIVE_UNIFORMS => Some(state.uniforms.len() as i32),
            INFO_LOG_LENGTH => Some(if state.log.is_empty() { 0 } else { state.log.len() as i32 + 1 }),
            _ => None,
        };
        value.unwrap_or_else(|| {
            self.record(INVALID_ENUM);
            0
        })
    }

    fn program_info_log(&mut self, program: Option<&GlObject>) -> String {
        self.program(program).map(|p| p.log.clone()).unwrap_or_default()
    }

    fn get_attrib_location(&mut self, program: Option<&GlObject>, name: &str) -> i32 {
        match self.program(program) {
            Some(state) if state.linked => state
                .attributes
                .iter()
                .position(|a| a == name)
                .map_or(-1, |i| i as i32),
            _ => {
                self.record(INVALID_OPERATION);
                -1
            }
        }
    }

    fn get_uniform_location(&mut self, program: Option<&GlObject>, name: &str) -> Option<GlObject> {
        let owner = *program?;
        let (existing, declared) = match self.program(Some(&owner)) {
            Some(state) if state.linked => (
                state.locations.get(name).copied(),
                state.uniforms.iter().any(|u| u == name),
            ),
            _ => {
                self.record(INVALID_OPERATION);
                return None;
            }
        };
        if existing.is_some() || !declared {
            return existing;
        }
        let location = self.alloc(Resource::Uniform {
            program: owner,
            value: UniformValue::Unset,
        })?;
        if let Some(state) = self.program_mut(Some(&owner)) {
            state.locations.insert(name.to_string(), location);
        }
        Some(location)
    }

    fn uniform_1i(&mut self, location: Option<&GlObject>, value: i32) {
        self.set_uniform(location, UniformValue::Int(value));
    }

    fn uniform_1f(&mut self, location: Option<&GlObject>, value: f32) {
        self.set_uniform(location, UniformValue::Float(value));
    }

    fn uniform_matrix_4fv(&mut self, location: Option<&GlObject>, transpose: bool, data: &[u8]) {
        if transpose {
            // Not allowed in GL ES 2
            self.record(INVALID_VALUE);
            return;
        }
        let floats = data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        self.set_uniform(location, UniformValue::Mat4(floats));
    }

    fn vertex_attrib_pointer(
        &mut self,
        _index: u32,
        size: i32,
        _ty: u32,
        _normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        if !(1..=4).contains(&size) || stride < 0 || offset < 0 {
            self.record(INVALID_VALUE);
            return;
        }
        if self.array_buffer.is_none() && offset != 0 {
            self.record(INVALID_OPERATION);
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.enabled_attribs.insert(index);
    }

    fn draw_elements(&mut self, _mode: u32, count: i32, _ty: u32, _offset: i32) {
        if count < 0 {
            self.record(INVALID_VALUE);
            return;
        }
        if self.program.is_none() || self.element_buffer.is_none() {
            self.record(INVALID_OPERATION);
            return;
        }
        self.counters.draw_calls += 1;
    }

    fn clear(&mut self, mask: u32) {
        if mask & !(COLOR_BUFFER_BIT | DEPTH_BUFFER_BIT | STENCIL_BUFFER_BIT) != 0 {
            self.record(INVALID_VALUE);
            return;
        }
        self.counters.clears += 1;
    }

    fn clear_color(&mut self, red: f32, green: f32, blue: f32, alpha: f32) {
        self.clear_color = [red, green, blue, alpha].map(|c| c.clamp(0.0, 1.0));
    }

    fn blend_func(&mut self, sfactor: u32, dfactor: u32) {
        self.blend_func_separate(sfactor, dfactor, sfactor, dfactor);
    }

    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.blend_src_rgb = src_rgb;
        self.blend_dst_rgb = dst_rgb;
        self.blend_src_alpha = src_alpha;
        self.blend_dst_alpha = dst_alpha;
    }

    fn blend_equation(&mut self, mode: u32) {
        self.blend_equation_separate(mode, mode);
    }

    fn blend_equation_separate(&mut self, mode_rgb: u32, mode_alpha: u32) {
        self.blend_equation_rgb = mode_rgb;
        self.blend_equation_alpha = mode_alpha;
    }

    fn get_error(&mut self) -> u32 {
        std::mem::replace(&mut self.error, NO_ERROR)
    }

    fn finish(&mut self) {}
}
