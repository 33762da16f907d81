//! Host functions linked into every guest.
//!
//! Each import decodes its wasm arguments, builds a [`MemoryView`] over the
//! guest's current memory and forwards to the matching shim on
//! [`HostState`]. Memory faults are logged and the call returns a fallback
//! value; only `web_raf` and `proc_exit` trap, with typed payloads the
//! runtime recovers.

use wasmtime::*;

use super::HostState;
use crate::audio::AudioHost;
use crate::error::{BridgeError, Result};
use crate::gl::GraphicsContext;
use crate::memory::MemoryView;
use crate::syscall::errno;
use crate::web::{EventBindings, SCRATCH_SIZE};

/// Namespace of the graphics, audio and window imports.
pub const ENV: &str = "env";

/// Namespace of the WASI imports.
pub const WASI: &str = "wasi_snapshot_preview1";

/// Export holding the guest's function pointers.
pub const FUNCTION_TABLE: &str = "__indirect_function_table";

type Ctx<'a, G, A> = Caller<'a, HostState<G, A>>;

/// Register every import the bridge provides.
pub fn register_all<G, A>(linker: &mut Linker<HostState<G, A>>) -> Result<()>
where
    G: GraphicsContext + 'static,
    A: AudioHost + 'static,
{
    register_gl(linker)?;
    register_audio(linker)?;
    register_web(linker)?;
    register_wasi(linker)?;
    Ok(())
}

fn link_err(name: &str, e: wasmtime::Error) -> BridgeError {
    BridgeError::Wasm(format!("failed to register {}: {}", name, e))
}

/// Helper to get memory from caller.
fn get_memory<T>(caller: &mut Caller<'_, T>) -> Result<Memory> {
    caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| BridgeError::MissingExport("memory".to_string()))
}

/// Run `f` with a view of guest memory and the host state.
///
/// Errors are logged against `call` and replaced by `fallback`.
fn with_memory<G, A, R>(
    caller: &mut Ctx<'_, G, A>,
    call: &'static str,
    fallback: R,
    f: impl FnOnce(&mut MemoryView<'_>, &mut HostState<G, A>) -> Result<R>,
) -> R
where
    G: GraphicsContext + 'static,
    A: AudioHost + 'static,
{
    let memory = match get_memory(caller) {
        Ok(memory) => memory,
        Err(e) => {
            tracing::warn!(call, "{}", e);
            return fallback;
        }
    };
    let (bytes, state) = memory.data_and_store_mut(&mut *caller);
    let mut view = MemoryView::new(bytes);
    match f(&mut view, state) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(call, "{}", e);
            fallback
        }
    }
}

/// Look up a function in a guest table.
pub(crate) fn table_entry(mut store: impl AsContextMut, table: &Table, index: u32) -> Result<Func> {
    match table.get(&mut store, index.into()) {
        Some(Ref::Func(Some(func))) => Ok(func),
        _ => Err(BridgeError::GuestCall(format!(
            "no function at table index {}",
            index
        ))),
    }
}

/// Register the `gl*` imports.
pub fn register_gl<G, A>(linker: &mut Linker<HostState<G, A>>) -> Result<()>
where
    G: GraphicsContext + 'static,
    A: AudioHost + 'static,
{
    // Framebuffers

    linker
        .func_wrap(ENV, "glGenFramebuffers", |mut caller: Ctx<'_, G, A>, n: i32, ids: i32| {
            with_memory(&mut caller, "glGenFramebuffers", (), |mem, s| {
                s.gl.gen_framebuffers(mem, n, ids as u32)
            })
        })
        .map_err(|e| link_err("glGenFramebuffers", e))?;

    linker
        .func_wrap(ENV, "glDeleteFramebuffers", |mut caller: Ctx<'_, G, A>, n: i32, ids: i32| {
            with_memory(&mut caller, "glDeleteFramebuffers", (), |mem, s| {
                s.gl.delete_framebuffers(mem, n, ids as u32)
            })
        })
        .map_err(|e| link_err("glDeleteFramebuffers", e))?;

    linker
        .func_wrap(ENV, "glBindFramebuffer", |mut caller: Ctx<'_, G, A>, target: i32, fb: i32| {
            caller.data_mut().gl.bind_framebuffer(target as u32, fb as u32);
        })
        .map_err(|e| link_err("glBindFramebuffer", e))?;

    linker
        .func_wrap(
            ENV,
            "glBlitFramebuffer",
            |mut caller: Ctx<'_, G, A>,
             sx0: i32,
             sy0: i32,
             sx1: i32,
             sy1: i32,
             dx0: i32,
             dy0: i32,
             dx1: i32,
             dy1: i32,
             mask: i32,
             filter: i32| {
                caller.data_mut().gl.blit_framebuffer(
                    sx0,
                    sy0,
                    sx1,
                    sy1,
                    dx0,
                    dy0,
                    dx1,
                    dy1,
                    mask as u32,
                    filter as u32,
                );
            },
        )
        .map_err(|e| link_err("glBlitFramebuffer", e))?;

    linker
        .func_wrap(
            ENV,
            "glFramebufferTexture2D",
            |mut caller: Ctx<'_, G, A>,
             target: i32,
             attachment: i32,
             textarget: i32,
             texture: i32,
             level: i32| {
                caller.data_mut().gl.framebuffer_texture_2d(
                    target as u32,
                    attachment as u32,
                    textarget as u32,
                    texture as u32,
                    level,
                );
            },
        )
        .map_err(|e| link_err("glFramebufferTexture2D", e))?;

    // Capabilities, rectangles and queries

    linker
        .func_wrap(ENV, "glEnable", |mut caller: Ctx<'_, G, A>, cap: i32| {
            caller.data_mut().gl.enable(cap as u32);
        })
        .map_err(|e| link_err("glEnable", e))?;

    linker
        .func_wrap(ENV, "glDisable", |mut caller: Ctx<'_, G, A>, cap: i32| {
            caller.data_mut().gl.disable(cap as u32);
        })
        .map_err(|e| link_err("glDisable", e))?;

    linker
        .func_wrap(ENV, "glIsEnabled", |mut caller: Ctx<'_, G, A>, cap: i32| -> i32 {
            caller.data_mut().gl.is_enabled(cap as u32)
        })
        .map_err(|e| link_err("glIsEnabled", e))?;

    linker
        .func_wrap(
            ENV,
            "glViewport",
            |mut caller: Ctx<'_, G, A>, x: i32, y: i32, w: i32, h: i32| {
                caller.data_mut().gl.viewport(x, y, w, h);
            },
        )
        .map_err(|e| link_err("glViewport", e))?;

    linker
        .func_wrap(
            ENV,
            "glScissor",
            |mut caller: Ctx<'_, G, A>, x: i32, y: i32, w: i32, h: i32| {
                caller.data_mut().gl.scissor(x, y, w, h);
            },
        )
        .map_err(|e| link_err("glScissor", e))?;

    linker
        .func_wrap(ENV, "glGetIntegerv", |mut caller: Ctx<'_, G, A>, pname: i32, data: i32| {
            with_memory(&mut caller, "glGetIntegerv", (), |mem, s| {
                s.gl.get_integerv(mem, pname as u32, data as u32)
            })
        })
        .map_err(|e| link_err("glGetIntegerv", e))?;

    linker
        .func_wrap(ENV, "glGetFloatv", |mut caller: Ctx<'_, G, A>, pname: i32, data: i32| {
            with_memory(&mut caller, "glGetFloatv", (), |mem, s| {
                s.gl.get_floatv(mem, pname as u32, data as u32)
            })
        })
        .map_err(|e| link_err("glGetFloatv", e))?;

    linker
        .func_wrap(
            ENV,
            "glGetTexLevelParameteriv",
            |mut caller: Ctx<'_, G, A>, target: i32, level: i32, pname: i32, params: i32| {
                with_memory(&mut caller, "glGetTexLevelParameteriv", (), |mem, s| {
                    s.gl.get_tex_level_parameteriv(mem, target as u32, level, pname as u32, params as u32)
                })
            },
        )
        .map_err(|e| link_err("glGetTexLevelParameteriv", e))?;

    linker
        .func_wrap(ENV, "glGetError", |mut caller: Ctx<'_, G, A>| -> i32 {
            caller.data_mut().gl.get_error() as i32
        })
        .map_err(|e| link_err("glGetError", e))?;

    linker
        .func_wrap(ENV, "glFinish", |mut caller: Ctx<'_, G, A>| {
            caller.data_mut().gl.finish();
        })
        .map_err(|e| link_err("glFinish", e))?;

    // Textures

    linker
        .func_wrap(ENV, "glGenTextures", |mut caller: Ctx<'_, G, A>, n: i32, ids: i32| {
            with_memory(&mut caller, "glGenTextures", (), |mem, s| {
                s.gl.gen_textures(mem, n, ids as u32)
            })
        })
        .map_err(|e| link_err("glGenTextures", e))?;

    linker
        .func_wrap(ENV, "glDeleteTextures", |mut caller: Ctx<'_, G, A>, n: i32, ids: i32| {
            with_memory(&mut caller, "glDeleteTextures", (), |mem, s| {
                s.gl.delete_textures(mem, n, ids as u32)
            })
        })
        .map_err(|e| link_err("glDeleteTextures", e))?;

    linker
        .func_wrap(ENV, "glBindTexture", |mut caller: Ctx<'_, G, A>, target: i32, tex: i32| {
            caller.data_mut().gl.bind_texture(target as u32, tex as u32);
        })
        .map_err(|e| link_err("glBindTexture", e))?;

    linker
        .func_wrap(ENV, "glActiveTexture", |mut caller: Ctx<'_, G, A>, unit: i32| {
            caller.data_mut().gl.active_texture(unit as u32);
        })
        .map_err(|e| link_err("glActiveTexture", e))?;

    linker
        .func_wrap(
            ENV,
            "glTexParameteri",
            |mut caller: Ctx<'_, G, A>, target: i32, pname: i32, param: i32| {
                caller
                    .data_mut()
                    .gl
                    .tex_parameteri(target as u32, pname as u32, param);
            },
        )
        .map_err(|e| link_err("glTexParameteri", e))?;

    linker
        .func_wrap(
            ENV,
            "glTexImage2D",
            |mut caller: Ctx<'_, G, A>,
             target: i32,
             level: i32,
             internal_format: i32,
             width: i32,
             height: i32,
             border: i32,
             format: i32,
             ty: i32,
             data: i32| {
                with_memory(&mut caller, "glTexImage2D", (), |mem, s| {
                    s.gl.tex_image_2d(
                        mem,
                        target as u32,
                        level,
                        internal_format,
                        width,
                        height,
                        border,
                        format as u32,
                        ty as u32,
                        data as u32,
                    )
                })
            },
        )
        .map_err(|e| link_err("glTexImage2D", e))?;

    linker
        .func_wrap(
            ENV,
            "glTexSubImage2D",
            |mut caller: Ctx<'_, G, A>,
             target: i32,
             level: i32,
             x_offset: i32,
             y_offset: i32,
             width: i32,
             height: i32,
             format: i32,
             ty: i32,
             pixels: i32| {
                with_memory(&mut caller, "glTexSubImage2D", (), |mem, s| {
                    s.gl.tex_sub_image_2d(
                        mem,
                        target as u32,
                        level,
                        x_offset,
                        y_offset,
                        width,
                        height,
                        format as u32,
                        ty as u32,
                        pixels as u32,
                    )
                })
            },
        )
        .map_err(|e| link_err("glTexSubImage2D", e))?;

    // Buffers and vertex state

    linker
        .func_wrap(ENV, "glGenBuffers", |mut caller: Ctx<'_, G, A>, n: i32, ids: i32| {
            with_memory(&mut caller, "glGenBuffers", (), |mem, s| {
                s.gl.gen_buffers(mem, n, ids as u32)
            })
        })
        .map_err(|e| link_err("glGenBuffers", e))?;

    linker
        .func_wrap(ENV, "glDeleteBuffers", |mut caller: Ctx<'_, G, A>, n: i32, ids: i32| {
            with_memory(&mut caller, "glDeleteBuffers", (), |mem, s| {
                s.gl.delete_buffers(mem, n, ids as u32)
            })
        })
        .map_err(|e| link_err("glDeleteBuffers", e))?;

    linker
        .func_wrap(ENV, "glBindBuffer", |mut caller: Ctx<'_, G, A>, target: i32, buf: i32| {
            caller.data_mut().gl.bind_buffer(target as u32, buf as u32);
        })
        .map_err(|e| link_err("glBindBuffer", e))?;

    linker
        .func_wrap(
            ENV,
            "glBufferData",
            |mut caller: Ctx<'_, G, A>, target: i32, size: i32, data: i32, usage: i32| {
                with_memory(&mut caller, "glBufferData", (), |mem, s| {
                    s.gl.buffer_data(mem, target as u32, size, data as u32, usage as u32)
                })
            },
        )
        .map_err(|e| link_err("glBufferData", e))?;

    linker
        .func_wrap(
            ENV,
            "glVertexAttribPointer",
            |mut caller: Ctx<'_, G, A>,
             index: i32,
             size: i32,
             ty: i32,
             normalized: i32,
             stride: i32,
             offset: i32| {
                caller.data_mut().gl.vertex_attrib_pointer(
                    index as u32,
                    size,
                    ty as u32,
                    normalized != 0,
                    stride,
                    offset,
                );
            },
        )
        .map_err(|e| link_err("glVertexAttribPointer", e))?;

    linker
        .func_wrap(ENV, "glEnableVertexAttribArray", |mut caller: Ctx<'_, G, A>, index: i32| {
            caller.data_mut().gl.enable_vertex_attrib_array(index as u32);
        })
        .map_err(|e| link_err("glEnableVertexAttribArray", e))?;

    linker
        .func_wrap(
            ENV,
            "glDrawElements",
            |mut caller: Ctx<'_, G, A>, mode: i32, count: i32, ty: i32, offset: i32| {
                caller
                    .data_mut()
                    .gl
                    .draw_elements(mode as u32, count, ty as u32, offset);
            },
        )
        .map_err(|e| link_err("glDrawElements", e))?;

    // Shaders and programs

    linker
        .func_wrap(ENV, "glCreateShader", |mut caller: Ctx<'_, G, A>, kind: i32| -> i32 {
            caller.data_mut().gl.create_shader(kind as u32) as i32
        })
        .map_err(|e| link_err("glCreateShader", e))?;

    linker
        .func_wrap(ENV, "glDeleteShader", |mut caller: Ctx<'_, G, A>, shader: i32| {
            caller.data_mut().gl.delete_shader(shader as u32);
        })
        .map_err(|e| link_err("glDeleteShader", e))?;

    linker
        .func_wrap(
            ENV,
            "glShaderSource",
            |mut caller: Ctx<'_, G, A>, shader: i32, count: i32, strings: i32, lengths: i32| {
                with_memory(&mut caller, "glShaderSource", (), |mem, s| {
                    s.gl
                        .shader_source(mem, shader as u32, count, strings as u32, lengths as u32)
                })
            },
        )
        .map_err(|e| link_err("glShaderSource", e))?;

    linker
        .func_wrap(ENV, "glCompileShader", |mut caller: Ctx<'_, G, A>, shader: i32| {
            caller.data_mut().gl.compile_shader(shader as u32);
        })
        .map_err(|e| link_err("glCompileShader", e))?;

    linker
        .func_wrap(
            ENV,
            "glGetShaderiv",
            |mut caller: Ctx<'_, G, A>, shader: i32, pname: i32, params: i32| {
                with_memory(&mut caller, "glGetShaderiv", (), |mem, s| {
                    s.gl
                        .get_shaderiv(mem, shader as u32, pname as u32, params as u32)
                })
            },
        )
        .map_err(|e| link_err("glGetShaderiv", e))?;

    linker
        .func_wrap(
            ENV,
            "glGetShaderInfoLog",
            |mut caller: Ctx<'_, G, A>, shader: i32, bufsize: i32, length: i32, infolog: i32| {
                with_memory(&mut caller, "glGetShaderInfoLog", (), |mem, s| {
                    s.gl.get_shader_info_log(
                        mem,
                        shader as u32,
                        bufsize,
                        length as u32,
                        infolog as u32,
                    )
                })
            },
        )
        .map_err(|e| link_err("glGetShaderInfoLog", e))?;

    linker
        .func_wrap(ENV, "glCreateProgram", |mut caller: Ctx<'_, G, A>| -> i32 {
            caller.data_mut().gl.create_program() as i32
        })
        .map_err(|e| link_err("glCreateProgram", e))?;

    linker
        .func_wrap(ENV, "glDeleteProgram", |mut caller: Ctx<'_, G, A>, program: i32| {
            caller.data_mut().gl.delete_program(program as u32);
        })
        .map_err(|e| link_err("glDeleteProgram", e))?;

    linker
        .func_wrap(
            ENV,
            "glAttachShader",
            |mut caller: Ctx<'_, G, A>, program: i32, shader: i32| {
                caller
                    .data_mut()
                    .gl
                    .attach_shader(program as u32, shader as u32);
            },
        )
        .map_err(|e| link_err("glAttachShader", e))?;

    linker
        .func_wrap(
            ENV,
            "glDetachShader",
            |mut caller: Ctx<'_, G, A>, program: i32, shader: i32| {
                caller
                    .data_mut()
                    .gl
                    .detach_shader(program as u32, shader as u32);
            },
        )
        .map_err(|e| link_err("glDetachShader", e))?;

    linker
        .func_wrap(ENV, "glLinkProgram", |mut caller: Ctx<'_, G, A>, program: i32| {
            caller.data_mut().gl.link_program(program as u32);
        })
        .map_err(|e| link_err("glLinkProgram", e))?;

    linker
        .func_wrap(ENV, "glUseProgram", |mut caller: Ctx<'_, G, A>, program: i32| {
            caller.data_mut().gl.use_program(program as u32);
        })
        .map_err(|e| link_err("glUseProgram", e))?;

    linker
        .func_wrap(
            ENV,
            "glGetProgramiv",
            |mut caller: Ctx<'_, G, A>, program: i32, pname: i32, params: i32| {
                with_memory(&mut caller, "glGetProgramiv", (), |mem, s| {
                    s.gl
                        .get_programiv(mem, program as u32, pname as u32, params as u32)
                })
            },
        )
        .map_err(|e| link_err("glGetProgramiv", e))?;

    linker
        .func_wrap(
            ENV,
            "glGetAttribLocation",
            |mut caller: Ctx<'_, G, A>, program: i32, name: i32| -> i32 {
                with_memory(&mut caller, "glGetAttribLocation", -1, |mem, s| {
                    s.gl.get_attrib_location(mem, program as u32, name as u32)
                })
            },
        )
        .map_err(|e| link_err("glGetAttribLocation", e))?;

    linker
        .func_wrap(
            ENV,
            "glGetUniformLocation",
            |mut caller: Ctx<'_, G, A>, program: i32, name: i32| -> i32 {
                with_memory(&mut caller, "glGetUniformLocation", -1, |mem, s| {
                    s.gl.get_uniform_location(mem, program as u32, name as u32)
                })
            },
        )
        .map_err(|e| link_err("glGetUniformLocation", e))?;

    linker
        .func_wrap(ENV, "glUniform1i", |mut caller: Ctx<'_, G, A>, location: i32, v0: i32| {
            caller.data_mut().gl.uniform_1i(location, v0);
        })
        .map_err(|e| link_err("glUniform1i", e))?;

    linker
        .func_wrap(ENV, "glUniform1f", |mut caller: Ctx<'_, G, A>, location: i32, v0: f32| {
            caller.data_mut().gl.uniform_1f(location, v0);
        })
        .map_err(|e| link_err("glUniform1f", e))?;

    linker
        .func_wrap(
            ENV,
            "glUniformMatrix4fv",
            |mut caller: Ctx<'_, G, A>, location: i32, count: i32, transpose: i32, value: i32| {
                with_memory(&mut caller, "glUniformMatrix4fv", (), |mem, s| {
                    s.gl
                        .uniform_matrix_4fv(mem, location, count, transpose != 0, value as u32)
                })
            },
        )
        .map_err(|e| link_err("glUniformMatrix4fv", e))?;

    // Clear and blend

    linker
        .func_wrap(ENV, "glClear", |mut caller: Ctx<'_, G, A>, mask: i32| {
            caller.data_mut().gl.clear(mask as u32);
        })
        .map_err(|e| link_err("glClear", e))?;

    linker
        .func_wrap(
            ENV,
            "glClearColor",
            |mut caller: Ctx<'_, G, A>, r: f32, g: f32, b: f32, a: f32| {
                caller.data_mut().gl.clear_color(r, g, b, a);
            },
        )
        .map_err(|e| link_err("glClearColor", e))?;

    linker
        .func_wrap(ENV, "glBlendFunc", |mut caller: Ctx<'_, G, A>, sfactor: i32, dfactor: i32| {
            caller
                .data_mut()
                .gl
                .blend_func(sfactor as u32, dfactor as u32);
        })
        .map_err(|e| link_err("glBlendFunc", e))?;

    linker
        .func_wrap(
            ENV,
            "glBlendFuncSeparate",
            |mut caller: Ctx<'_, G, A>, src_rgb: i32, dst_rgb: i32, src_alpha: i32, dst_alpha: i32| {
                caller.data_mut().gl.blend_func_separate(
                    src_rgb as u32,
                    dst_rgb as u32,
                    src_alpha as u32,
                    dst_alpha as u32,
                );
            },
        )
        .map_err(|e| link_err("glBlendFuncSeparate", e))?;

    linker
        .func_wrap(ENV, "glBlendEquation", |mut caller: Ctx<'_, G, A>, mode: i32| {
            caller.data_mut().gl.blend_equation(mode as u32);
        })
        .map_err(|e| link_err("glBlendEquation", e))?;

    linker
        .func_wrap(
            ENV,
            "glBlendEquationSeparate",
            |mut caller: Ctx<'_, G, A>, mode_rgb: i32, mode_alpha: i32| {
                caller
                    .data_mut()
                    .gl
                    .blend_equation_separate(mode_rgb as u32, mode_alpha as u32);
            },
        )
        .map_err(|e| link_err("glBlendEquationSeparate", e))?;

    Ok(())
}

/// Register the `MTY_Audio*` imports.
pub fn register_audio<G, A>(linker: &mut Linker<HostState<G, A>>) -> Result<()>
where
    G: GraphicsContext + 'static,
    A: AudioHost + 'static,
{
    linker
        .func_wrap(
            ENV,
            "MTY_AudioCreate",
            |mut caller: Ctx<'_, G, A>, audio_out: i32, sample_rate: i32| -> i32 {
                with_memory(&mut caller, "MTY_AudioCreate", 0, |mem, s| {
                    s.audio.mty_create(mem, audio_out as u32, sample_rate as u32)
                })
            },
        )
        .map_err(|e| link_err("MTY_AudioCreate", e))?;

    linker
        .func_wrap(ENV, "MTY_AudioDestroy", |mut caller: Ctx<'_, G, A>, audio_inout: i32| {
            with_memory(&mut caller, "MTY_AudioDestroy", (), |mem, s| {
                s.audio.mty_destroy(mem, audio_inout as u32)
            })
        })
        .map_err(|e| link_err("MTY_AudioDestroy", e))?;

    linker
        .func_wrap(ENV, "MTY_AudioPlay", |mut caller: Ctx<'_, G, A>, _ctx: i32| {
            caller.data_mut().audio.play();
        })
        .map_err(|e| link_err("MTY_AudioPlay", e))?;

    linker
        .func_wrap(ENV, "MTY_AudioStop", |mut caller: Ctx<'_, G, A>, _ctx: i32| {
            caller.data_mut().audio.stop();
        })
        .map_err(|e| link_err("MTY_AudioStop", e))?;

    linker
        .func_wrap(
            ENV,
            "MTY_AudioQueue",
            |mut caller: Ctx<'_, G, A>, _ctx: i32, frames: i32, count: i32| {
                with_memory(&mut caller, "MTY_AudioQueue", (), |mem, s| {
                    s.audio.mty_queue(mem, frames as u32, count);
                    Ok(())
                })
            },
        )
        .map_err(|e| link_err("MTY_AudioQueue", e))?;

    linker
        .func_wrap(ENV, "MTY_AudioIsPlaying", |caller: Ctx<'_, G, A>, _ctx: i32| -> i32 {
            i32::from(caller.data().audio.is_playing())
        })
        .map_err(|e| link_err("MTY_AudioIsPlaying", e))?;

    linker
        .func_wrap(ENV, "MTY_AudioGetQueuedFrames", |caller: Ctx<'_, G, A>, _ctx: i32| -> i32 {
            caller.data().audio.queued_frames() as i32
        })
        .map_err(|e| link_err("MTY_AudioGetQueuedFrames", e))?;

    Ok(())
}

/// Register the `web_*` imports.
pub fn register_web<G, A>(linker: &mut Linker<HostState<G, A>>) -> Result<()>
where
    G: GraphicsContext + 'static,
    A: AudioHost + 'static,
{
    linker
        .func_wrap(ENV, "web_get_size", |mut caller: Ctx<'_, G, A>, w: i32, h: i32| {
            with_memory(&mut caller, "web_get_size", (), |mem, s| {
                s.web.get_size(mem, w as u32, h as u32)
            })
        })
        .map_err(|e| link_err("web_get_size", e))?;

    linker
        .func_wrap(ENV, "web_resize_canvas", |mut caller: Ctx<'_, G, A>| {
            caller.data_mut().web.resize_canvas();
        })
        .map_err(|e| link_err("web_resize_canvas", e))?;

    linker
        .func_wrap(ENV, "web_set_title", |mut caller: Ctx<'_, G, A>, title: i32| {
            with_memory(&mut caller, "web_set_title", (), |mem, s| {
                s.web.set_title(mem, title as u32)
            })
        })
        .map_err(|e| link_err("web_set_title", e))?;

    linker
        .func_wrap(ENV, "web_get_pixel_ratio", |caller: Ctx<'_, G, A>| -> f32 {
            caller.data().web.pixel_ratio()
        })
        .map_err(|e| link_err("web_get_pixel_ratio", e))?;

    linker
        .func_wrap(ENV, "web_create_canvas", |mut caller: Ctx<'_, G, A>| {
            caller.data_mut().web.create_canvas();
        })
        .map_err(|e| link_err("web_create_canvas", e))?;

    linker
        .func_wrap(
            ENV,
            "web_attach_events",
            |mut caller: Ctx<'_, G, A>,
             window: i32,
             malloc: i32,
             free: i32,
             mouse_motion: i32,
             mouse_button: i32,
             mouse_wheel: i32,
             keyboard: i32,
             drop: i32| {
                let scratch = match guest_malloc(&mut caller, malloc as u32, SCRATCH_SIZE) {
                    Ok(ptr) => ptr,
                    Err(e) => {
                        tracing::warn!("web_attach_events: scratch allocation failed: {}", e);
                        0
                    }
                };
                caller.data_mut().web.attach_events(EventBindings {
                    window: window as u32,
                    malloc: malloc as u32,
                    free: free as u32,
                    mouse_motion: mouse_motion as u32,
                    mouse_button: mouse_button as u32,
                    mouse_wheel: mouse_wheel as u32,
                    keyboard: keyboard as u32,
                    drop: drop as u32,
                    scratch,
                });
            },
        )
        .map_err(|e| link_err("web_attach_events", e))?;

    linker
        .func_wrap(
            ENV,
            "web_raf",
            |mut caller: Ctx<'_, G, A>, func: i32, opaque: i32| -> wasmtime::Result<()> {
                let handoff = caller.data_mut().web.request_frame(func as u32, opaque as u32);
                Err(wasmtime::Error::new(handoff))
            },
        )
        .map_err(|e| link_err("web_raf", e))?;

    Ok(())
}

/// Call the guest's `malloc` through its function table.
fn guest_malloc<T>(caller: &mut Caller<'_, T>, malloc: u32, size: u32) -> Result<u32> {
    let table = caller
        .get_export(FUNCTION_TABLE)
        .and_then(|e| e.into_table())
        .ok_or_else(|| BridgeError::MissingExport(FUNCTION_TABLE.to_string()))?;
    let func = table_entry(&mut *caller, &table, malloc)?;
    let ptr = func
        .typed::<i32, i32>(&*caller)
        .and_then(|f| f.call(&mut *caller, size as i32))
        .map_err(|e| BridgeError::GuestCall(format!("malloc: {}", e)))?;
    Ok(ptr as u32)
}

/// Register the `wasi_snapshot_preview1` imports.
pub fn register_wasi<G, A>(linker: &mut Linker<HostState<G, A>>) -> Result<()>
where
    G: GraphicsContext + 'static,
    A: AudioHost + 'static,
{
    linker
        .func_wrap(WASI, "args_get", |caller: Ctx<'_, G, A>, _argv: i32, _buf: i32| -> i32 {
            caller.data().wasi.args_get()
        })
        .map_err(|e| link_err("args_get", e))?;

    linker
        .func_wrap(
            WASI,
            "args_sizes_get",
            |mut caller: Ctx<'_, G, A>, argc: i32, buf_size: i32| -> i32 {
                with_memory(&mut caller, "args_sizes_get", errno::INVAL, |mem, s| {
                    s.wasi.args_sizes_get(mem, argc as u32, buf_size as u32)
                })
            },
        )
        .map_err(|e| link_err("args_sizes_get", e))?;

    linker
        .func_wrap(WASI, "environ_get", |caller: Ctx<'_, G, A>, _env: i32, _buf: i32| -> i32 {
            caller.data().wasi.environ_get()
        })
        .map_err(|e| link_err("environ_get", e))?;

    linker
        .func_wrap(
            WASI,
            "environ_sizes_get",
            |mut caller: Ctx<'_, G, A>, count: i32, buf_size: i32| -> i32 {
                with_memory(&mut caller, "environ_sizes_get", errno::INVAL, |mem, s| {
                    s.wasi.environ_sizes_get(mem, count as u32, buf_size as u32)
                })
            },
        )
        .map_err(|e| link_err("environ_sizes_get", e))?;

    linker
        .func_wrap(
            WASI,
            "clock_time_get",
            |mut caller: Ctx<'_, G, A>, id: i32, precision: i64, time_out: i32| -> i32 {
                with_memory(&mut caller, "clock_time_get", errno::INVAL, |mem, s| {
                    s.wasi
                        .clock_time_get(mem, id as u32, precision as u64, time_out as u32)
                })
            },
        )
        .map_err(|e| link_err("clock_time_get", e))?;

    linker
        .func_wrap(
            WASI,
            "fd_write",
            |mut caller: Ctx<'_, G, A>, fd: i32, iovs: i32, iovs_len: i32, nwritten: i32| -> i32 {
                with_memory(&mut caller, "fd_write", errno::INVAL, |mem, s| {
                    s.wasi
                        .fd_write(mem, fd as u32, iovs as u32, iovs_len as u32, nwritten as u32)
                })
            },
        )
        .map_err(|e| link_err("fd_write", e))?;

    linker
        .func_wrap(
            WASI,
            "fd_read",
            |mut caller: Ctx<'_, G, A>, fd: i32, iovs: i32, iovs_len: i32, nread: i32| -> i32 {
                with_memory(&mut caller, "fd_read", errno::INVAL, |mem, s| {
                    s.wasi
                        .fd_read(mem, fd as u32, iovs as u32, iovs_len as u32, nread as u32)
                })
            },
        )
        .map_err(|e| link_err("fd_read", e))?;

    linker
        .func_wrap(WASI, "fd_close", |caller: Ctx<'_, G, A>, fd: i32| -> i32 {
            caller.data().wasi.fd_close(fd as u32)
        })
        .map_err(|e| link_err("fd_close", e))?;

    linker
        .func_wrap(
            WASI,
            "fd_fdstat_get",
            |mut caller: Ctx<'_, G, A>, fd: i32, stat: i32| -> i32 {
                with_memory(&mut caller, "fd_fdstat_get", errno::INVAL, |mem, s| {
                    s.wasi.fd_fdstat_get(mem, fd as u32, stat as u32)
                })
            },
        )
        .map_err(|e| link_err("fd_fdstat_get", e))?;

    linker
        .func_wrap(
            WASI,
            "fd_fdstat_set_flags",
            |caller: Ctx<'_, G, A>, fd: i32, flags: i32| -> i32 {
                caller.data().wasi.fd_fdstat_set_flags(fd as u32, flags as u32)
            },
        )
        .map_err(|e| link_err("fd_fdstat_set_flags", e))?;

    linker
        .func_wrap(WASI, "fd_prestat_get", |caller: Ctx<'_, G, A>, fd: i32, buf: i32| -> i32 {
            caller.data().wasi.fd_prestat_get(fd as u32, buf as u32)
        })
        .map_err(|e| link_err("fd_prestat_get", e))?;

    linker
        .func_wrap(
            WASI,
            "fd_prestat_dir_name",
            |caller: Ctx<'_, G, A>, fd: i32, path: i32, len: i32| -> i32 {
                caller
                    .data()
                    .wasi
                    .fd_prestat_dir_name(fd as u32, path as u32, len as u32)
            },
        )
        .map_err(|e| link_err("fd_prestat_dir_name", e))?;

    linker
        .func_wrap(
            WASI,
            "fd_seek",
            |mut caller: Ctx<'_, G, A>, fd: i32, offset: i64, whence: i32, newoffset: i32| -> i32 {
                with_memory(&mut caller, "fd_seek", errno::INVAL, |mem, s| {
                    s.wasi
                        .fd_seek(mem, fd as u32, offset, whence as u32, newoffset as u32)
                })
            },
        )
        .map_err(|e| link_err("fd_seek", e))?;

    linker
        .func_wrap(
            WASI,
            "fd_readdir",
            |caller: Ctx<'_, G, A>, _fd: i32, _buf: i32, _len: i32, _cookie: i64, _used: i32| -> i32 {
                caller.data().wasi.unsupported("fd_readdir")
            },
        )
        .map_err(|e| link_err("fd_readdir", e))?;

    linker
        .func_wrap(
            WASI,
            "path_create_directory",
            |caller: Ctx<'_, G, A>, _fd: i32, _path: i32, _len: i32| -> i32 {
                caller.data().wasi.unsupported("path_create_directory")
            },
        )
        .map_err(|e| link_err("path_create_directory", e))?;

    linker
        .func_wrap(
            WASI,
            "path_open",
            |caller: Ctx<'_, G, A>,
             _fd: i32,
             _dirflags: i32,
             _path: i32,
             _len: i32,
             _oflags: i32,
             _rights_base: i64,
             _rights_inherit: i64,
             _fdflags: i32,
             _opened_fd: i32|
             -> i32 { caller.data().wasi.unsupported("path_open") },
        )
        .map_err(|e| link_err("path_open", e))?;

    linker
        .func_wrap(
            WASI,
            "path_readlink",
            |caller: Ctx<'_, G, A>,
             _fd: i32,
             _path: i32,
             _len: i32,
             _buf: i32,
             _buf_len: i32,
             _used: i32|
             -> i32 { caller.data().wasi.unsupported("path_readlink") },
        )
        .map_err(|e| link_err("path_readlink", e))?;

    linker
        .func_wrap(
            WASI,
            "poll_oneoff",
            |mut caller: Ctx<'_, G, A>, subs: i32, events: i32, nsubs: i32, nevents: i32| -> i32 {
                with_memory(&mut caller, "poll_oneoff", errno::INVAL, |mem, s| {
                    s.wasi.poll_oneoff(
                        mem,
                        subs as u32,
                        events as u32,
                        nsubs as u32,
                        nevents as u32,
                    )
                })
            },
        )
        .map_err(|e| link_err("poll_oneoff", e))?;

    linker
        .func_wrap(WASI, "random_get", |mut caller: Ctx<'_, G, A>, buf: i32, len: i32| -> i32 {
            with_memory(&mut caller, "random_get", errno::INVAL, |mem, s| {
                s.wasi.random_get(mem, buf as u32, len as u32)
            })
        })
        .map_err(|e| link_err("random_get", e))?;

    linker
        .func_wrap(
            WASI,
            "proc_exit",
            |caller: Ctx<'_, G, A>, code: i32| -> wasmtime::Result<()> {
                Err(wasmtime::Error::new(caller.data().wasi.proc_exit(code)))
            },
        )
        .map_err(|e| link_err("proc_exit", e))?;

    Ok(())
}
