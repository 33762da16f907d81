//! Engine, module and instance lifecycle.

use std::collections::HashSet;
use std::path::Path;

use wasmtime::*;

use super::host_functions;
use crate::audio::{AudioHost, AudioScheduler, NullAudio};
use crate::config::BridgeConfig;
use crate::console::{Console, StdConsole};
use crate::error::{BridgeError, Result};
use crate::gl::{GlShim, GraphicsContext, HeadlessGl};
use crate::memory::{GuestPtr, MemoryView};
use crate::syscall::{ProcExit, SyscallShim};
use crate::web::{FrameCallback, HeadlessWindow, InputEvent, RunLoopHandoff, WebShim, WindowHost};

/// Per-instance host context: everything the imports touch.
pub struct HostState<G: GraphicsContext, A: AudioHost> {
    /// Graphics shim and its handle table
    pub gl: GlShim<G>,
    /// Audio session
    pub audio: AudioScheduler<A>,
    /// Window, input callbacks and run-loop registration
    pub web: WebShim,
    /// WASI subset
    pub wasi: SyscallShim,
    limits: StoreLimits,
}

impl<G: GraphicsContext, A: AudioHost> HostState<G, A> {
    /// Build host state with a headless window and the process console.
    pub fn new(config: &BridgeConfig, gl: G, audio: A) -> Self {
        Self {
            gl: GlShim::new(gl),
            audio: AudioScheduler::new(audio, config.audio.clone()),
            web: WebShim::new(HeadlessWindow::new(&config.window)),
            wasi: SyscallShim::new(StdConsole),
            limits: StoreLimitsBuilder::new()
                .memory_size(config.runtime.max_memory)
                .build(),
        }
    }

    /// Replace the window.
    pub fn with_window(mut self, window: impl WindowHost + 'static) -> Self {
        self.web = WebShim::new(window);
        self
    }

    /// Replace the console sink.
    pub fn with_console(mut self, console: impl Console + 'static) -> Self {
        self.wasi = SyscallShim::new(console);
        self
    }
}

/// How `_start` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Returned normally
    Completed,
    /// Called `proc_exit`
    Exited(i32),
    /// Called `web_raf`; the host now drives frames
    RunLoop(FrameCallback),
}

/// What the guest asked for at the end of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Keep calling
    Continue,
    /// The frame function returned false and the bridge is configured to
    /// stop on it
    Stop,
    /// Called `proc_exit`
    Exited(i32),
}

/// One import declared by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInfo {
    /// Import namespace
    pub module: String,
    /// Import name
    pub name: String,
    /// Whether the bridge defines it
    pub provided: bool,
}

/// Compiles modules and creates instances wired to the call table.
pub struct Bridge {
    engine: Engine,
    config: BridgeConfig,
}

/// A compiled guest module.
pub struct BridgeModule {
    module: Module,
    name: String,
}

/// An instantiated guest.
pub struct BridgeInstance<G: GraphicsContext + 'static, A: AudioHost + 'static> {
    store: Store<HostState<G, A>>,
    instance: Instance,
    stop_on_false_frame: bool,
}

/// A one-way transfer raised by an import.
enum Interrupt {
    Handoff(FrameCallback),
    Exit(i32),
}

fn classify(err: wasmtime::Error) -> Result<Interrupt> {
    if let Some(handoff) = err.downcast_ref::<RunLoopHandoff>() {
        return Ok(Interrupt::Handoff(handoff.0));
    }
    if let Some(ProcExit(code)) = err.downcast_ref::<ProcExit>() {
        return Ok(Interrupt::Exit(*code));
    }
    Err(BridgeError::GuestCall(format!("{:?}", err)))
}

impl Bridge {
    /// Create a bridge with the given configuration.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let mut engine_config = Config::new();

        // Configure optimization
        engine_config.cranelift_opt_level(match config.runtime.optimization_level {
            0 => OptLevel::None,
            1 | 2 => OptLevel::Speed,
            _ => OptLevel::SpeedAndSize,
        });

        engine_config.wasm_simd(config.runtime.enable_simd);

        if config.runtime.fuel_limit.is_some() {
            engine_config.consume_fuel(true);
        }

        // Configure caching if path provided
        if let Some(ref cache_path) = config.runtime.cache_path {
            if let Err(e) = engine_config.cache_config_load(cache_path) {
                tracing::warn!("Failed to load cache config: {}", e);
            }
        }

        let engine = Engine::new(&engine_config)
            .map_err(|e| BridgeError::Wasm(format!("engine creation failed: {}", e)))?;

        Ok(Self { engine, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Load a module from a `.wasm` (or `.wat`) file.
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<BridgeModule> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let module = Module::from_file(&self.engine, path)
            .map_err(|e| BridgeError::Wasm(format!("module load failed: {}", e)))?;

        tracing::debug!(%name, "module loaded");
        Ok(BridgeModule { module, name })
    }

    /// Load a module from binary or text bytes.
    pub fn load_module_bytes(&self, name: &str, bytes: impl AsRef<[u8]>) -> Result<BridgeModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| BridgeError::Wasm(format!("module creation failed: {}", e)))?;

        Ok(BridgeModule {
            module,
            name: name.to_string(),
        })
    }

    /// Instantiate `module` with `host` as its host context.
    pub fn instantiate<G, A>(
        &self,
        module: &BridgeModule,
        host: HostState<G, A>,
    ) -> Result<BridgeInstance<G, A>>
    where
        G: GraphicsContext + 'static,
        A: AudioHost + 'static,
    {
        let mut store = Store::new(&self.engine, host);

        // Configure resource limits via the stored limiter
        store.limiter(|state| &mut state.limits);

        if let Some(fuel) = self.config.runtime.fuel_limit {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::Wasm(format!("fuel setup failed: {}", e)))?;
        }

        let mut linker: Linker<HostState<G, A>> = Linker::new(&self.engine);
        host_functions::register_all(&mut linker)?;

        if self.config.runtime.trap_unknown_imports {
            linker
                .define_unknown_imports_as_traps(&module.module)
                .map_err(|e| BridgeError::Wasm(format!("failed to stub imports: {}", e)))?;
        }

        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| BridgeError::Wasm(format!("instantiation failed: {}", e)))?;

        tracing::debug!(module = %module.name, "instantiated");
        Ok(BridgeInstance {
            store,
            instance,
            stop_on_false_frame: self.config.runtime.stop_on_false_frame,
        })
    }

    /// Every import of `module`, marked with whether the bridge provides it.
    pub fn imports(&self, module: &BridgeModule) -> Result<Vec<ImportInfo>> {
        let provided = self.provided_imports()?;
        Ok(module
            .module
            .imports()
            .map(|import| ImportInfo {
                module: import.module().to_string(),
                name: import.name().to_string(),
                provided: provided.contains(&(import.module().to_string(), import.name().to_string())),
            })
            .collect())
    }

    /// Imports of `module` the bridge does not provide.
    pub fn missing_imports(&self, module: &BridgeModule) -> Result<Vec<ImportInfo>> {
        Ok(self
            .imports(module)?
            .into_iter()
            .filter(|i| !i.provided)
            .collect())
    }

    fn provided_imports(&self) -> Result<HashSet<(String, String)>> {
        let host = HostState::new(&self.config, HeadlessGl::new(1, 1), NullAudio::new());
        let mut store = Store::new(&self.engine, host);
        let mut linker: Linker<HostState<HeadlessGl, NullAudio>> = Linker::new(&self.engine);
        host_functions::register_all(&mut linker)?;
        let names = linker
            .iter(&mut store)
            .map(|(module, name, _)| (module.to_string(), name.to_string()))
            .collect();
        Ok(names)
    }
}

impl BridgeModule {
    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get exported function names.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.module.exports().filter_map(|e| {
            if matches!(e.ty(), ExternType::Func(_)) {
                Some(e.name())
            } else {
                None
            }
        })
    }
}

impl<G: GraphicsContext + 'static, A: AudioHost + 'static> BridgeInstance<G, A> {
    /// The host context.
    pub fn host(&self) -> &HostState<G, A> {
        self.store.data()
    }

    /// The host context, mutably.
    pub fn host_mut(&mut self) -> &mut HostState<G, A> {
        self.store.data_mut()
    }

    /// Get remaining fuel (if fuel metering enabled).
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    /// Run the guest entry point (`_start`, or `main` when there is none).
    pub fn start(&mut self) -> Result<StartOutcome> {
        let func = ["_start", "main"]
            .iter()
            .find_map(|name| self.instance.get_func(&mut self.store, name))
            .ok_or_else(|| BridgeError::MissingExport("_start".to_string()))?;

        match call_dynamic(&mut self.store, func, &[]) {
            Ok(_) => Ok(StartOutcome::Completed),
            Err(e) => match classify(e)? {
                Interrupt::Handoff(callback) => {
                    tracing::debug!(func = callback.func, "guest handed off to run loop");
                    Ok(StartOutcome::RunLoop(callback))
                }
                Interrupt::Exit(code) => Ok(StartOutcome::Exited(code)),
            },
        }
    }

    /// Invoke the frame function once.
    ///
    /// The frame function's return value is ignored unless
    /// `stop_on_false_frame` is set. A frame function that registers itself
    /// again with `web_raf` simply continues; the new registration is picked
    /// up from the host state.
    pub fn call_frame(&mut self, callback: FrameCallback) -> Result<FrameStatus> {
        let func = self.table_func(callback.func)?;
        match call_dynamic(&mut self.store, func, &[Val::I32(callback.opaque as i32)]) {
            Ok(results) => match results.first() {
                Some(Val::I32(0)) if self.stop_on_false_frame => Ok(FrameStatus::Stop),
                _ => Ok(FrameStatus::Continue),
            },
            Err(e) => match classify(e)? {
                Interrupt::Handoff(_) => Ok(FrameStatus::Continue),
                Interrupt::Exit(code) => Ok(FrameStatus::Exited(code)),
            },
        }
    }

    /// Deliver an input event to the callbacks registered by the guest.
    ///
    /// Without registered callbacks this does nothing.
    pub fn dispatch_input(&mut self, event: InputEvent) -> Result<()> {
        let Some(b) = self.host().web.bindings() else {
            tracing::trace!(?event, "no input callbacks registered");
            return Ok(());
        };
        let window = b.window as i32;

        match event {
            InputEvent::MouseMotion { x, y } => {
                self.call_indirect::<(i32, i32, i32), ()>(b.mouse_motion, (window, x, y))
            }
            InputEvent::MouseButton { pressed, button } => self
                .call_indirect::<(i32, i32, i32), ()>(
                    b.mouse_button,
                    (window, i32::from(pressed), button),
                ),
            InputEvent::MouseWheel { x, y } => {
                self.call_indirect::<(i32, i32, i32), ()>(b.mouse_wheel, (window, x, y))
            }
            InputEvent::Key { pressed, code } => {
                if b.scratch == 0 {
                    tracing::warn!("no scratch buffer for key event");
                    return Ok(());
                }
                self.with_memory(|mem| {
                    mem.write_cstr(b.scratch, &code);
                    Ok(())
                })?;
                self.call_indirect::<(i32, i32, i32), ()>(
                    b.keyboard,
                    (window, i32::from(pressed), b.scratch as i32),
                )
            }
            InputEvent::Drop { name, data } => {
                if b.scratch == 0 {
                    tracing::warn!(%name, "no scratch buffer for dropped file");
                    return Ok(());
                }
                let len = i32::try_from(data.len())
                    .map_err(|_| BridgeError::GuestCall("dropped file too large".to_string()))?;
                let ptr = self.call_indirect::<i32, i32>(b.malloc, len)? as GuestPtr;
                if ptr == 0 {
                    return Err(BridgeError::GuestCall("guest malloc returned NULL".to_string()));
                }
                let delivered = self
                    .with_memory(|mem| {
                        mem.copy_in(ptr, &data)?;
                        mem.write_cstr(b.scratch, &name);
                        Ok(())
                    })
                    .and_then(|()| {
                        self.call_indirect::<(i32, i32, i32, i32), ()>(
                            b.drop,
                            (window, b.scratch as i32, ptr as i32, len),
                        )
                    });
                // Freed whether or not delivery succeeded
                self.call_indirect::<i32, ()>(b.free, ptr as i32)?;
                delivered
            }
        }
    }

    /// Run `f` over the guest's current memory.
    pub fn with_memory<R>(&mut self, f: impl FnOnce(&mut MemoryView<'_>) -> Result<R>) -> Result<R> {
        let memory = self
            .instance
            .get_memory(&mut self.store, "memory")
            .ok_or_else(|| BridgeError::MissingExport("memory".to_string()))?;
        let mut view = MemoryView::new(memory.data_mut(&mut self.store));
        f(&mut view)
    }

    /// Call a function through the guest's function table.
    pub fn call_indirect<P, R>(&mut self, index: u32, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self.table_func(index)?;
        func.typed::<P, R>(&self.store)
            .and_then(|f| f.call(&mut self.store, params))
            .map_err(|e| BridgeError::GuestCall(format!("table index {}: {:?}", index, e)))
    }

    fn table_func(&mut self, index: u32) -> Result<Func> {
        let table = self
            .instance
            .get_table(&mut self.store, host_functions::FUNCTION_TABLE)
            .ok_or_else(|| BridgeError::MissingExport(host_functions::FUNCTION_TABLE.to_string()))?;
        host_functions::table_entry(&mut self.store, &table, index)
    }
}

/// Call `func`, zero-filling any parameters beyond `args`.
fn call_dynamic<T>(store: &mut Store<T>, func: Func, args: &[Val]) -> wasmtime::Result<Vec<Val>> {
    let ty = func.ty(&*store);
    let params = ty
        .params()
        .enumerate()
        .map(|(i, p)| match args.get(i) {
            Some(arg) => Ok(arg.clone()),
            None => zero(&p),
        })
        .collect::<wasmtime::Result<Vec<Val>>>()?;
    let mut results = ty.results().map(|r| zero(&r)).collect::<wasmtime::Result<Vec<Val>>>()?;
    func.call(&mut *store, &params, &mut results)?;
    Ok(results)
}

/// The zero value of `ty`; nullable references are null.
fn zero(ty: &ValType) -> wasmtime::Result<Val> {
    Ok(match ty {
        ValType::I32 => Val::I32(0),
        ValType::I64 => Val::I64(0),
        ValType::F32 => Val::F32(0),
        ValType::F64 => Val::F64(0),
        ValType::V128 => Val::V128(V128::from(0u128)),
        ValType::Ref(r) if r.is_nullable() => Val::null_ref(r.heap_type()),
        ValType::Ref(r) => {
            return Err(wasmtime::Error::msg(format!(
                "cannot zero-fill non-nullable {} value",
                r
            )))
        }
    })
}
