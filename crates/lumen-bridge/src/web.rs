//! Window, input and run-loop imports (`web_*`).
//!
//! These are the host-utility calls a guest makes while creating its window:
//! surface creation, size and title, registering its input callbacks, and
//! finally handing its frame function to the host with `web_raf`.

use crate::config::WindowConfig;
use crate::error::Result;
use crate::memory::{GuestPtr, MemoryView};

/// Bytes the bridge allocates in the guest for passing strings to callbacks.
pub const SCRATCH_SIZE: u32 = 1024;

/// The host window the guest draws into.
pub trait WindowHost {
    /// Drawable size in pixels.
    fn drawable_size(&self) -> (u32, u32);

    /// Resize the drawable to fill the window.
    fn resize_to_window(&mut self);

    /// Set the window title.
    fn set_title(&mut self, title: &str);

    /// Physical pixels per logical pixel.
    fn pixel_ratio(&self) -> f32;

    /// Create the rendering surface.
    fn create_surface(&mut self);
}

/// A window with no display behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessWindow {
    width: u32,
    height: u32,
    pixel_ratio: f32,
    title: String,
    surface: bool,
}

impl HeadlessWindow {
    /// A window sized and titled from `config`.
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            pixel_ratio: config.pixel_ratio,
            title: config.title.clone(),
            surface: false,
        }
    }

    /// Current title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether the guest created its surface.
    pub fn has_surface(&self) -> bool {
        self.surface
    }
}

impl WindowHost for HeadlessWindow {
    fn drawable_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize_to_window(&mut self) {}

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn create_surface(&mut self) {
        self.surface = true;
    }
}

/// Guest function table indices registered by `web_attach_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBindings {
    /// Opaque window pointer passed back as the first argument
    pub window: u32,
    /// `void *malloc(size_t)`
    pub malloc: u32,
    /// `void free(void *)`
    pub free: u32,
    /// `(window, x, y)`
    pub mouse_motion: u32,
    /// `(window, pressed, button)`
    pub mouse_button: u32,
    /// `(window, x, y)`
    pub mouse_wheel: u32,
    /// `(window, pressed, code)`
    pub keyboard: u32,
    /// `(window, name, data, size)`
    pub drop: u32,
    /// Guest buffer of [`SCRATCH_SIZE`] bytes for strings
    pub scratch: GuestPtr,
}

/// An input event to deliver to the guest.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Pointer moved to (x, y)
    MouseMotion {
        /// Client x
        x: i32,
        /// Client y
        y: i32,
    },
    /// Button pressed or released; 1 = left, 2 = middle, 3 = right
    MouseButton {
        /// Down or up
        pressed: bool,
        /// Button number
        button: i32,
    },
    /// Wheel delta
    MouseWheel {
        /// Horizontal delta
        x: i32,
        /// Vertical delta
        y: i32,
    },
    /// Key pressed or released, by physical key code (`"KeyA"`, `"Escape"`)
    Key {
        /// Down or up
        pressed: bool,
        /// Key code
        code: String,
    },
    /// A file dropped on the window
    Drop {
        /// File name
        name: String,
        /// File contents
        data: Vec<u8>,
    },
}

/// The guest's frame function registered with `web_raf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCallback {
    /// Function table index
    pub func: u32,
    /// Argument passed on every call
    pub opaque: u32,
}

/// The guest handed its frame function to the host.
///
/// Raised as the trap payload of `web_raf`: the guest's call stack is
/// abandoned and the runtime continues by driving the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("guest handed control to the host run loop")]
pub struct RunLoopHandoff(pub FrameCallback);

/// Host side of the `web_*` imports.
pub struct WebShim {
    window: Box<dyn WindowHost>,
    bindings: Option<EventBindings>,
    frame: Option<FrameCallback>,
}

impl WebShim {
    /// Wrap a window.
    pub fn new(window: impl WindowHost + 'static) -> Self {
        Self {
            window: Box::new(window),
            bindings: None,
            frame: None,
        }
    }

    /// The window.
    pub fn window(&self) -> &dyn WindowHost {
        self.window.as_ref()
    }

    /// The window, mutably.
    pub fn window_mut(&mut self) -> &mut dyn WindowHost {
        self.window.as_mut()
    }

    /// Callbacks registered by the guest, if any.
    pub fn bindings(&self) -> Option<EventBindings> {
        self.bindings
    }

    /// The most recent `web_raf` registration.
    pub fn frame_callback(&self) -> Option<FrameCallback> {
        self.frame
    }

    /// `web_get_size`
    pub fn get_size(
        &self,
        mem: &mut MemoryView<'_>,
        width_out: GuestPtr,
        height_out: GuestPtr,
    ) -> Result<()> {
        let (width, height) = self.window.drawable_size();
        mem.write_u32(width_out, width)?;
        mem.write_u32(height_out, height)?;
        Ok(())
    }

    /// `web_resize_canvas`
    pub fn resize_canvas(&mut self) {
        self.window.resize_to_window();
    }

    /// `web_set_title`
    pub fn set_title(&mut self, mem: &mut MemoryView<'_>, title: GuestPtr) -> Result<()> {
        let title = mem.read_cstr(title)?;
        tracing::debug!(%title, "window title");
        self.window.set_title(&title);
        Ok(())
    }

    /// `web_get_pixel_ratio`
    pub fn pixel_ratio(&self) -> f32 {
        self.window.pixel_ratio()
    }

    /// `web_create_canvas`
    pub fn create_canvas(&mut self) {
        tracing::debug!("creating surface");
        self.window.create_surface();
    }

    /// Record the callbacks from `web_attach_events`.
    ///
    /// The caller allocates the scratch buffer through the guest's `malloc`
    /// before handing the bindings over.
    pub fn attach_events(&mut self, bindings: EventBindings) {
        tracing::debug!(?bindings, "input callbacks attached");
        self.bindings = Some(bindings);
    }

    /// `web_raf`: store the frame function and produce the handoff.
    ///
    /// A later registration replaces an earlier one.
    pub fn request_frame(&mut self, func: u32, opaque: u32) -> RunLoopHandoff {
        let callback = FrameCallback { func, opaque };
        if self.frame.replace(callback).is_some() {
            tracing::debug!(func, "frame callback replaced");
        }
        RunLoopHandoff(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_window_from_config() {
        let config = WindowConfig {
            width: 320,
            height: 200,
            pixel_ratio: 2.0,
            ..Default::default()
        };
        let mut web = WebShim::new(HeadlessWindow::new(&config));
        let mut buf = vec![0u8; 64];
        let mut mem = MemoryView::new(&mut buf);

        web.create_canvas();
        web.resize_canvas();
        web.get_size(&mut mem, 0, 4).unwrap();
        assert_eq!(mem.read_u32(0).unwrap(), 320);
        assert_eq!(mem.read_u32(4).unwrap(), 200);
        assert_eq!(web.pixel_ratio(), 2.0);
    }

    #[test]
    fn test_set_title_reads_guest_string() {
        let mut window = HeadlessWindow::new(&WindowConfig::default());
        assert_eq!(window.title(), "lumen");
        window.set_title("x");
        assert_eq!(window.title(), "x");

        let mut web = WebShim::new(window);
        let mut buf = vec![0u8; 64];
        let mut mem = MemoryView::new(&mut buf);
        mem.write_cstr(10, "Caf\u{e9}");
        web.set_title(&mut mem, 10).unwrap();
        assert!(web.set_title(&mut mem, 65).is_err());
    }

    #[test]
    fn test_request_frame_replaces_registration() {
        let mut web = WebShim::new(HeadlessWindow::new(&WindowConfig::default()));
        assert_eq!(web.frame_callback(), None);

        let handoff = web.request_frame(4, 100);
        assert_eq!(handoff.0, FrameCallback { func: 4, opaque: 100 });

        web.request_frame(5, 200);
        assert_eq!(web.frame_callback(), Some(FrameCallback { func: 5, opaque: 200 }));
    }

    #[test]
    fn test_attach_events_records_bindings() {
        let mut web = WebShim::new(HeadlessWindow::new(&WindowConfig::default()));
        assert!(web.bindings().is_none());
        let bindings = EventBindings {
            window: 8,
            malloc: 1,
            free: 2,
            mouse_motion: 3,
            mouse_button: 4,
            mouse_wheel: 5,
            keyboard: 6,
            drop: 7,
            scratch: 4096,
        };
        web.attach_events(bindings);
        assert_eq!(web.bindings(), Some(bindings));
    }
}
