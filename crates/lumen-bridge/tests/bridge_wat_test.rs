//! End-to-end tests: small guests written in WAT exercising each import group
//! through a real wasmtime instance.

#![cfg(feature = "runtime")]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use lumen_bridge::{
    Bridge, BridgeConfig, BridgeInstance, CancelToken, FrameCallback, FrameLoop, HeadlessGl,
    HostState, InputEvent, LoopExit, MemoryConsole, NullAudio, StartOutcome, WindowHost,
};

struct Guest {
    instance: BridgeInstance<HeadlessGl, NullAudio>,
    console: MemoryConsole,
    audio: NullAudio,
}

fn load(wat: &str) -> Guest {
    load_with(BridgeConfig::headless(), wat)
}

fn load_with(config: BridgeConfig, wat: &str) -> Guest {
    let bridge = Bridge::new(config.clone()).expect("failed to create bridge");
    let module = bridge.load_module_bytes("guest", wat).expect("failed to compile");
    let console = MemoryConsole::new();
    let audio = NullAudio::new();
    let host = HostState::new(&config, HeadlessGl::new(640, 480), audio.clone())
        .with_console(console.clone());
    let instance = bridge.instantiate(&module, host).expect("failed to instantiate");
    Guest {
        instance,
        console,
        audio,
    }
}

fn read_i32(instance: &mut BridgeInstance<HeadlessGl, NullAudio>, ptr: u32) -> i32 {
    instance.with_memory(|mem| mem.read_i32(ptr)).unwrap()
}

#[test]
fn test_fd_write_reaches_console() {
    let mut guest = load(
        r#"(module
            (import "wasi_snapshot_preview1" "fd_write"
              (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 100) "Hello, world\n")
            (data (i32.const 200) "warn")
            (func (export "_start")
              (i32.store (i32.const 0) (i32.const 100))
              (i32.store (i32.const 4) (i32.const 13))
              (i32.store (i32.const 20) (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16)))
              (i32.store (i32.const 8) (i32.const 200))
              (i32.store (i32.const 12) (i32.const 4))
              (drop (call $fd_write (i32.const 2) (i32.const 8) (i32.const 1) (i32.const 24)))
              (drop (call $fd_write (i32.const 5) (i32.const 8) (i32.const 1) (i32.const 28)))))"#,
    );

    assert_eq!(guest.instance.start().unwrap(), StartOutcome::Completed);
    assert_eq!(guest.console.stdout(), "Hello, world\n");
    assert_eq!(guest.console.stderr(), "warn");
    assert_eq!(read_i32(&mut guest.instance, 16), 13);
    assert_eq!(read_i32(&mut guest.instance, 20), 0);
    assert_eq!(read_i32(&mut guest.instance, 28), 4);
}

#[test]
fn test_wasi_fixed_answers() {
    let mut guest = load(
        r#"(module
            (import "wasi_snapshot_preview1" "fd_prestat_get" (func $prestat (param i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "path_open"
              (func $open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "clock_time_get" (func $clock (param i32 i64 i32) (result i32)))
            (import "wasi_snapshot_preview1" "args_sizes_get" (func $args (param i32 i32) (result i32)))
            (import "wasi_snapshot_preview1" "fd_fdstat_get" (func $fdstat (param i32 i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "_start")
              (i32.store (i32.const 0) (call $prestat (i32.const 3) (i32.const 100)))
              (i32.store (i32.const 4)
                (call $open (i32.const 3) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0)
                            (i64.const 0) (i64.const 0) (i32.const 0) (i32.const 100)))
              (i32.store (i32.const 8) (call $clock (i32.const 1) (i64.const 1000) (i32.const 64)))
              (i32.store (i32.const 32) (i32.const -1))
              (i32.store (i32.const 36) (i32.const -1))
              (i32.store (i32.const 12) (call $args (i32.const 32) (i32.const 36)))
              (i32.store (i32.const 16) (call $fdstat (i32.const 1) (i32.const 128)))
              (i32.store (i32.const 20) (call $fdstat (i32.const 9) (i32.const 128)))))"#,
    );

    guest.instance.start().unwrap();
    let i = &mut guest.instance;
    assert_eq!(read_i32(i, 0), 8);
    assert_eq!(read_i32(i, 4), 52);
    assert_eq!(read_i32(i, 8), 0);
    assert_eq!(read_i32(i, 12), 0);
    assert_eq!(read_i32(i, 32), 0);
    assert_eq!(read_i32(i, 36), 0);
    assert_eq!(read_i32(i, 16), 0);
    assert_eq!(read_i32(i, 20), 8);
    // character device
    assert_eq!(i.with_memory(|mem| Ok(mem.slice(128, 1)?[0])).unwrap(), 2);
}

#[test]
fn test_clear_color_round_trips_through_guest_memory() {
    let mut guest = load(
        r#"(module
            (import "env" "glClearColor" (func $clear_color (param f32 f32 f32 f32)))
            (import "env" "glClear" (func $clear (param i32)))
            (import "env" "glGetFloatv" (func $get_floatv (param i32 i32)))
            (memory (export "memory") 1)
            (func (export "_start")
              (call $clear_color (f32.const 0.2) (f32.const 0.4) (f32.const 0.6) (f32.const 1.0))
              (call $clear (i32.const 0x4000))
              (call $get_floatv (i32.const 0x0C22) (i32.const 64))))"#,
    );

    guest.instance.start().unwrap();
    let color: Vec<f32> = guest
        .instance
        .with_memory(|mem| (0..4).map(|i| mem.read_f32(64 + 4 * i)).collect())
        .unwrap();
    assert_eq!(color, vec![0.2, 0.4, 0.6, 1.0]);
    assert_eq!(guest.instance.host().gl.context().counters().clears, 1);
}

#[test]
fn test_texture_metadata_query() {
    let mut guest = load(
        r#"(module
            (import "env" "glGenTextures" (func $gen (param i32 i32)))
            (import "env" "glBindTexture" (func $bind (param i32 i32)))
            (import "env" "glTexImage2D" (func $image (param i32 i32 i32 i32 i32 i32 i32 i32 i32)))
            (import "env" "glGetTexLevelParameteriv" (func $level (param i32 i32 i32 i32)))
            (import "env" "glGetError" (func $error (result i32)))
            (memory (export "memory") 1)
            (func (export "_start")
              (call $gen (i32.const 1) (i32.const 0))
              (call $bind (i32.const 0x0DE1) (i32.load (i32.const 0)))
              (call $image (i32.const 0x0DE1) (i32.const 0) (i32.const 0x1908)
                           (i32.const 256) (i32.const 128) (i32.const 0)
                           (i32.const 0x1908) (i32.const 0x1401) (i32.const 0))
              (call $level (i32.const 0x0DE1) (i32.const 0) (i32.const 0x1000) (i32.const 8))
              (call $level (i32.const 0x0DE1) (i32.const 0) (i32.const 0x1001) (i32.const 12))
              (i32.store (i32.const 16) (call $error))))"#,
    );

    guest.instance.start().unwrap();
    let i = &mut guest.instance;
    assert_eq!(read_i32(i, 0), 1);
    assert_eq!(read_i32(i, 8), 256);
    assert_eq!(read_i32(i, 12), 128);
    assert_eq!(read_i32(i, 16), 0);
    assert_eq!(i.host().gl.objects().len(), 1);
}

#[test]
fn test_out_of_bounds_graphics_call_does_not_trap() {
    let mut guest = load(
        r#"(module
            (import "env" "glGenBuffers" (func $gen (param i32 i32)))
            (import "env" "glBufferData" (func $data (param i32 i32 i32 i32)))
            (memory (export "memory") 1)
            (func (export "_start")
              (call $gen (i32.const 1) (i32.const 0xFFFFFFF0))
              (call $data (i32.const 0x8892) (i32.const 4096) (i32.const 65000) (i32.const 0x88E4))))"#,
    );
    assert_eq!(guest.instance.start().unwrap(), StartOutcome::Completed);
}

#[test]
fn test_audio_session_from_guest() {
    let mut guest = load(
        r#"(module
            (import "env" "MTY_AudioCreate" (func $create (param i32 i32) (result i32)))
            (import "env" "MTY_AudioQueue" (func $queue (param i32 i32 i32)))
            (import "env" "MTY_AudioPlay" (func $play (param i32)))
            (import "env" "MTY_AudioIsPlaying" (func $playing (param i32) (result i32)))
            (import "env" "MTY_AudioGetQueuedFrames" (func $queued (param i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "_start")
              (i32.store (i32.const 4) (call $create (i32.const 200) (i32.const 48000)))
              (call $play (i32.load (i32.const 200)))
              (call $queue (i32.load (i32.const 200)) (i32.const 1024) (i32.const 480))
              (call $queue (i32.load (i32.const 200)) (i32.const 1024) (i32.const 480))
              ;; runs off the end of memory
              (call $queue (i32.load (i32.const 200)) (i32.const 65000) (i32.const 480))
              (i32.store (i32.const 8) (call $playing (i32.const 1)))
              (i32.store (i32.const 12) (call $queued (i32.const 1)))))"#,
    );

    guest.instance.start().unwrap();
    let i = &mut guest.instance;
    assert_eq!(read_i32(i, 200), 1);
    assert_eq!(read_i32(i, 4), 1);
    assert_eq!(read_i32(i, 8), 1);
    // 20 ms scheduled, a little already played
    let queued = read_i32(i, 12);
    assert!(queued > 0 && queued <= 960, "queued = {}", queued);
    assert_eq!(guest.audio.units(), 2);
    assert_eq!(guest.audio.frames(), 960);
}

const FRAME_WAT: &str = r#"(module
    (import "env" "web_raf" (func $raf (param i32 i32)))
    (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
    (memory (export "memory") 1)
    (table (export "__indirect_function_table") 5 funcref)
    (elem (i32.const 1) $count $stop_after_two $exit_now $switch)
    (func $bump (i32.store (i32.const 0) (i32.add (i32.load (i32.const 0)) (i32.const 1))))
    ;; counts frames, remembers its argument
    (func $count (param $opaque i32) (result i32)
      (call $bump)
      (i32.store (i32.const 4) (local.get $opaque))
      (i32.const 1))
    (func $stop_after_two (param i32) (result i32)
      (call $bump)
      (i32.lt_u (i32.load (i32.const 0)) (i32.const 2)))
    (func $exit_now (param i32) (result i32)
      (call $exit (i32.const 7))
      (i32.const 1))
    ;; hands over to $stop_after_two
    (func $switch (param i32) (result i32)
      (call $bump)
      (call $raf (i32.const 2) (i32.const 0))
      (i32.const 1))
    (func (export "_start")
      (call $raf (i32.load (i32.const 100)) (i32.const 42))
      unreachable))"#;

fn start_frame_guest(func: u32) -> (Guest, FrameCallback) {
    start_frame_guest_with(BridgeConfig::headless(), func)
}

fn start_frame_guest_with(config: BridgeConfig, func: u32) -> (Guest, FrameCallback) {
    let mut guest = load_with(config, FRAME_WAT);
    guest
        .instance
        .with_memory(|mem| mem.write_u32(100, func))
        .unwrap();
    match guest.instance.start().unwrap() {
        StartOutcome::RunLoop(callback) => (guest, callback),
        other => panic!("expected run-loop handoff, got {:?}", other),
    }
}

fn fast_loop() -> FrameLoop {
    FrameLoop::new(Duration::from_millis(1))
}

#[tokio::test]
async fn test_raf_hands_off_to_frame_loop() {
    let (mut guest, callback) = start_frame_guest(1);
    assert_eq!(callback, FrameCallback { func: 1, opaque: 42 });
    assert_eq!(guest.instance.host().web.frame_callback(), Some(callback));

    let (exit, stats) = fast_loop()
        .with_max_frames(3)
        .run(&mut guest.instance, callback)
        .await
        .unwrap();
    assert_eq!(exit, LoopExit::FrameLimit);
    assert_eq!(stats.count(), 3);
    assert_eq!(read_i32(&mut guest.instance, 0), 3);
    assert_eq!(read_i32(&mut guest.instance, 4), 42);
}

#[tokio::test]
async fn test_frame_returning_false_keeps_running() {
    let (mut guest, callback) = start_frame_guest(2);
    let (exit, stats) = fast_loop()
        .with_max_frames(5)
        .run(&mut guest.instance, callback)
        .await
        .unwrap();
    assert_eq!(exit, LoopExit::FrameLimit);
    assert_eq!(stats.count(), 5);
    assert_eq!(read_i32(&mut guest.instance, 0), 5);
}

#[tokio::test]
async fn test_frame_returning_false_stops_loop_when_enabled() {
    let config = BridgeConfig::headless().stop_on_false_frame(true);
    let (mut guest, callback) = start_frame_guest_with(config, 2);
    let (exit, stats) = fast_loop()
        .with_max_frames(100)
        .run(&mut guest.instance, callback)
        .await
        .unwrap();
    assert_eq!(exit, LoopExit::GuestStopped);
    assert_eq!(stats.count(), 2);
}

#[tokio::test]
async fn test_proc_exit_inside_frame() {
    let (mut guest, callback) = start_frame_guest(3);
    let (exit, _) = fast_loop()
        .with_max_frames(100)
        .run(&mut guest.instance, callback)
        .await
        .unwrap();
    assert_eq!(exit, LoopExit::Exited(7));
}

#[tokio::test]
async fn test_reregistration_replaces_frame_function() {
    let config = BridgeConfig::headless().stop_on_false_frame(true);
    let (mut guest, callback) = start_frame_guest_with(config, 4);
    let (exit, stats) = fast_loop()
        .with_max_frames(100)
        .run(&mut guest.instance, callback)
        .await
        .unwrap();
    // $switch once, then $stop_after_two sees the counter at 2
    assert_eq!(exit, LoopExit::GuestStopped);
    assert_eq!(stats.count(), 2);
    assert_eq!(
        guest.instance.host().web.frame_callback(),
        Some(FrameCallback { func: 2, opaque: 0 })
    );
}

#[tokio::test]
async fn test_cancelled_loop_runs_no_frames() {
    let (mut guest, callback) = start_frame_guest(1);
    let token = CancelToken::new();
    token.cancel();
    let (exit, stats) = fast_loop()
        .with_cancel_token(token)
        .run(&mut guest.instance, callback)
        .await
        .unwrap();
    assert_eq!(exit, LoopExit::Cancelled);
    assert_eq!(stats.count(), 0);
    assert_eq!(read_i32(&mut guest.instance, 0), 0);
}

#[test]
fn test_proc_exit_from_start() {
    let mut guest = load(
        r#"(module
            (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
            (import "wasi_snapshot_preview1" "fd_write"
              (func $fd_write (param i32 i32 i32 i32) (result i32)))
            (memory (export "memory") 1)
            (data (i32.const 100) "bye\n")
            (func (export "_start")
              (i32.store (i32.const 0) (i32.const 100))
              (i32.store (i32.const 4) (i32.const 4))
              (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
              (call $exit (i32.const 0))
              (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))))"#,
    );
    assert_eq!(guest.instance.start().unwrap(), StartOutcome::Exited(0));
    assert_eq!(guest.console.stdout(), "bye\n");
}

const INPUT_WAT: &str = r#"(module
    (import "env" "web_attach_events" (func $attach (param i32 i32 i32 i32 i32 i32 i32 i32)))
    (memory (export "memory") 1)
    (global $heap (mut i32) (i32.const 4096))
    (table (export "__indirect_function_table") 8 funcref)
    (elem (i32.const 1) $malloc $free $motion $button $wheel $key $drop)
    (func $malloc (param $size i32) (result i32)
      (local $ptr i32)
      (local.set $ptr (global.get $heap))
      (global.set $heap (i32.add (global.get $heap) (local.get $size)))
      (local.get $ptr))
    (func $free (param i32)
      (i32.store (i32.const 8) (i32.add (i32.load (i32.const 8)) (i32.const 1))))
    (func $motion (param i32 i32 i32)
      (i32.store (i32.const 24) (local.get 0))
      (i32.store (i32.const 16) (local.get 1))
      (i32.store (i32.const 20) (local.get 2)))
    (func $button (param i32 i32 i32)
      (i32.store (i32.const 28) (local.get 1))
      (i32.store (i32.const 32) (local.get 2)))
    (func $wheel (param i32 i32 i32)
      (i32.store (i32.const 36) (local.get 1))
      (i32.store (i32.const 40) (local.get 2)))
    (func $key (param i32 i32 i32)
      (i32.store (i32.const 44) (local.get 1))
      (i32.store (i32.const 48) (local.get 2)))
    (func $drop (param i32 i32 i32 i32)
      (i32.store (i32.const 52) (local.get 1))
      (i32.store (i32.const 56) (local.get 2))
      (i32.store (i32.const 60) (local.get 3)))
    (func (export "_start")
      (call $attach (i32.const 100) (i32.const 1) (i32.const 2) (i32.const 3)
                    (i32.const 4) (i32.const 5) (i32.const 6) (i32.const 7))))"#;

#[test]
fn test_input_dispatch_reaches_guest_callbacks() {
    let mut guest = load(INPUT_WAT);
    let i = &mut guest.instance;

    // Before registration events go nowhere
    i.dispatch_input(InputEvent::MouseMotion { x: 1, y: 1 }).unwrap();
    assert_eq!(read_i32(i, 16), 0);

    assert_eq!(i.start().unwrap(), StartOutcome::Completed);
    let bindings = i.host().web.bindings().unwrap();
    assert_eq!(bindings.window, 100);
    assert_eq!(bindings.scratch, 4096);

    i.dispatch_input(InputEvent::MouseMotion { x: 12, y: -7 }).unwrap();
    assert_eq!((read_i32(i, 16), read_i32(i, 20), read_i32(i, 24)), (12, -7, 100));

    i.dispatch_input(InputEvent::MouseButton { pressed: true, button: 3 }).unwrap();
    assert_eq!((read_i32(i, 28), read_i32(i, 32)), (1, 3));

    i.dispatch_input(InputEvent::MouseWheel { x: 0, y: -120 }).unwrap();
    assert_eq!((read_i32(i, 36), read_i32(i, 40)), (0, -120));

    i.dispatch_input(InputEvent::Key {
        pressed: false,
        code: "KeyA".to_string(),
    })
    .unwrap();
    assert_eq!((read_i32(i, 44), read_i32(i, 48)), (0, 4096));
    assert_eq!(i.with_memory(|mem| mem.read_cstr(4096)).unwrap(), "KeyA");

    i.dispatch_input(InputEvent::Drop {
        name: "level.dat".to_string(),
        data: vec![1, 2, 3, 4, 5],
    })
    .unwrap();
    // malloc'd right after the scratch buffer
    assert_eq!(read_i32(i, 52), 4096);
    assert_eq!(read_i32(i, 56), 4096 + 1024);
    assert_eq!(read_i32(i, 60), 5);
    assert_eq!(i.with_memory(|mem| mem.read_cstr(4096)).unwrap(), "level.dat");
    assert_eq!(
        i.with_memory(|mem| Ok(mem.slice(5120, 5)?.to_vec())).unwrap(),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(read_i32(i, 8), 1);
}

/// `malloc` hands out whatever address the host left at offset 64.
const FIXED_MALLOC_WAT: &str = r#"(module
    (import "env" "web_attach_events" (func $attach (param i32 i32 i32 i32 i32 i32 i32 i32)))
    (memory (export "memory") 1)
    (data (i32.const 0) "GUEST_DATA")
    (table (export "__indirect_function_table") 8 funcref)
    (elem (i32.const 1) $malloc $free $ignore $ignore $ignore $ignore $drop)
    (func $malloc (param i32) (result i32)
      (i32.load (i32.const 64)))
    (func $free (param i32)
      (i32.store (i32.const 200) (i32.add (i32.load (i32.const 200)) (i32.const 1))))
    (func $ignore (param i32 i32 i32))
    (func $drop (param i32 i32 i32 i32)
      (i32.store (i32.const 204) (local.get 2)))
    (func (export "_start")
      (call $attach (i32.const 100) (i32.const 1) (i32.const 2) (i32.const 3)
                    (i32.const 4) (i32.const 5) (i32.const 6) (i32.const 7))))"#;

fn set_malloc_result(instance: &mut BridgeInstance<HeadlessGl, NullAudio>, ptr: i32) {
    instance.with_memory(|mem| mem.write_i32(64, ptr)).unwrap();
}

#[test]
fn test_input_without_scratch_leaves_guest_memory_alone() {
    let mut guest = load(FIXED_MALLOC_WAT);
    let i = &mut guest.instance;

    set_malloc_result(i, 0);
    assert_eq!(i.start().unwrap(), StartOutcome::Completed);
    assert_eq!(i.host().web.bindings().unwrap().scratch, 0);

    set_malloc_result(i, 4096);
    i.dispatch_input(InputEvent::Key {
        pressed: true,
        code: "KeyZ".to_string(),
    })
    .unwrap();
    i.dispatch_input(InputEvent::Drop {
        name: "save.bin".to_string(),
        data: vec![9, 9, 9],
    })
    .unwrap();

    assert_eq!(i.with_memory(|mem| mem.read_cstr(0)).unwrap(), "GUEST_DATA");
    assert_eq!(read_i32(i, 204), 0);
    assert_eq!(read_i32(i, 200), 0);
}

#[test]
fn test_drop_frees_buffer_when_copy_fails() {
    let mut guest = load(FIXED_MALLOC_WAT);
    let i = &mut guest.instance;

    set_malloc_result(i, 4096);
    assert_eq!(i.start().unwrap(), StartOutcome::Completed);
    assert_eq!(i.host().web.bindings().unwrap().scratch, 4096);

    // Two bytes short of the end of the single page
    set_malloc_result(i, 65534);
    let result = i.dispatch_input(InputEvent::Drop {
        name: "big.bin".to_string(),
        data: vec![0; 8],
    });

    assert!(result.is_err());
    assert_eq!(read_i32(i, 204), 0);
    assert_eq!(read_i32(i, 200), 1);
}

#[derive(Clone, Default)]
struct RecordingWindow {
    title: Rc<RefCell<String>>,
    surfaces: Rc<RefCell<u32>>,
}

impl WindowHost for RecordingWindow {
    fn drawable_size(&self) -> (u32, u32) {
        (800, 600)
    }

    fn resize_to_window(&mut self) {}

    fn set_title(&mut self, title: &str) {
        *self.title.borrow_mut() = title.to_string();
    }

    fn pixel_ratio(&self) -> f32 {
        1.5
    }

    fn create_surface(&mut self) {
        *self.surfaces.borrow_mut() += 1;
    }
}

#[test]
fn test_window_imports_use_window_host() {
    let config = BridgeConfig::headless();
    let bridge = Bridge::new(config.clone()).unwrap();
    let module = bridge
        .load_module_bytes(
            "window",
            r#"(module
                (import "env" "web_create_canvas" (func $canvas))
                (import "env" "web_resize_canvas" (func $resize))
                (import "env" "web_set_title" (func $title (param i32)))
                (import "env" "web_get_size" (func $size (param i32 i32)))
                (import "env" "web_get_pixel_ratio" (func $ratio (result f32)))
                (memory (export "memory") 1)
                (data (i32.const 100) "Caf\c3\a9\00")
                (func (export "_start")
                  (call $canvas)
                  (call $resize)
                  (call $title (i32.const 100))
                  (call $size (i32.const 0) (i32.const 4))
                  (f32.store (i32.const 8) (call $ratio))))"#,
        )
        .unwrap();

    let window = RecordingWindow::default();
    let host = HostState::new(&config, HeadlessGl::new(1, 1), NullAudio::new())
        .with_window(window.clone())
        .with_console(MemoryConsole::new());
    let mut instance = bridge.instantiate(&module, host).unwrap();
    instance.start().unwrap();

    assert_eq!(*window.surfaces.borrow(), 1);
    // Latin-1 decoding, byte per char
    assert_eq!(*window.title.borrow(), "Caf\u{c3}\u{a9}");
    let (w, h, ratio) = instance
        .with_memory(|mem| Ok((mem.read_u32(0)?, mem.read_u32(4)?, mem.read_f32(8)?)))
        .unwrap();
    assert_eq!((w, h, ratio), (800, 600, 1.5));
}
