//! Compositor/surface manager (§4.H): creates and resizes a background
//! surface per physical output, behind one of two backends. The Wayland
//! path reuses the teacher's `wallpaper.rs` layer-shell setup
//! (`smithay-client-toolkit`'s `CompositorState`/`LayerShell`/`OutputState`,
//! its handler-trait/`delegate_*!` wiring, and its `WaylandSurfaceHandle`
//! raw-handle bridge) almost unchanged. No example repo in this retrieval
//! pack implements an X11 desktop-window wallpaper backend, so that half is
//! grounded on the plain EWMH conventions the specification names directly
//! (`_NET_WM_WINDOW_TYPE_DESKTOP`, `_NET_WM_STATE_BELOW`, sticky workspace)
//! and built against `x11rb`'s real libxcb-backed connection, a mainstream
//! crate for the purpose — see DESIGN.md.

use std::ffi::c_void;
use std::num::NonZeroU32;
use std::os::fd::RawFd;
use std::ptr::NonNull;

use anyhow::{Context, Result};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle, WindowHandle, XcbDisplayHandle,
    XcbWindowHandle,
};
use smithay_client_toolkit::compositor::{CompositorHandler, CompositorState};
use smithay_client_toolkit::delegate_compositor;
use smithay_client_toolkit::delegate_layer;
use smithay_client_toolkit::delegate_output;
use smithay_client_toolkit::delegate_registry;
use smithay_client_toolkit::output::{OutputHandler, OutputInfo, OutputState};
use smithay_client_toolkit::reexports::client::globals::registry_queue_init;
use smithay_client_toolkit::reexports::client::protocol::{wl_output, wl_surface};
use smithay_client_toolkit::reexports::client::protocol::wl_output::WlOutput;
use smithay_client_toolkit::reexports::client::{Connection, EventQueue, Proxy, QueueHandle};
use smithay_client_toolkit::registry::{ProvidesRegistryState, RegistryState};
use smithay_client_toolkit::registry_handlers;
use smithay_client_toolkit::shell::wlr_layer::{
    Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
    LayerSurfaceConfigure,
};
use smithay_client_toolkit::shell::WaylandSurface;

/// A handle to one physical output's compositor-native surface, wired so
/// `wgpu` can build a rendering surface against it.
pub trait CompositorSurfaceHandle: HasDisplayHandle + HasWindowHandle {
    /// Current physical size `(width, height)`, if the compositor has
    /// reported one yet.
    fn physical_size(&self) -> Option<(u32, u32)>;
}

/// Abstracts the Wayland and X11 backends behind a common interface
/// matching §4.H: create/destroy a surface per output, and hand back a
/// pollable fd the event loop can fold into its main `poll()` set.
pub trait CompositorBackend {
    type Surface: CompositorSurfaceHandle;

    /// Blocks until at least one output is known and its surface created,
    /// returning one `Surface` per discovered output.
    fn discover_outputs(&mut self) -> Result<Vec<(String, Self::Surface)>>;

    /// Pumps any pending compositor protocol events; returns newly
    /// appeared, resized, removed, or lost outputs since the last call.
    fn dispatch_pending(&mut self) -> Result<Vec<OutputEvent>>;

    /// Rebuilds a surface handle for an output this backend already knows
    /// about (from [`discover_outputs`](Self::discover_outputs) or a
    /// subsequent [`OutputEvent::Added`]), so the caller can build a
    /// `wgpu` surface against it after the fact (§8 scenario 6).
    fn surface_for(&self, output_id: &str) -> Option<Self::Surface>;

    fn event_fd(&self) -> RawFd;
}

#[derive(Debug, Clone)]
pub enum OutputEvent {
    /// A `wl_output`/screen appeared that wasn't known at startup: the
    /// compositor reannounced after a disconnect, or a monitor was
    /// hot-plugged (§8 scenario 6).
    Added { output_id: String, width: u32, height: u32 },
    Resized { output_id: String, width: u32, height: u32 },
    Removed { output_id: String },
    /// The output's surface can no longer be presented to (compositor
    /// disconnect, display power-off) but the output itself hasn't been
    /// destroyed; the daemon marks it dormant and stops driving it until
    /// an `Added`/`Resized` event for the same id revives it.
    DisplayLost { output_id: String },
}

// ---------------------------------------------------------------------
// Wayland backend
// ---------------------------------------------------------------------

pub struct WaylandSurfaceHandle {
    display: *mut c_void,
    surface: *mut c_void,
    size: Option<(u32, u32)>,
}

// SAFETY: these are opaque protocol object pointers valid for the
// lifetime of the owning `Connection`/`LayerSurface`, which this backend
// keeps alive alongside the handle; they are never dereferenced here.
unsafe impl Send for WaylandSurfaceHandle {}
unsafe impl Sync for WaylandSurfaceHandle {}

impl WaylandSurfaceHandle {
    fn new(conn: &Connection, layer_surface: &LayerSurface, size: Option<(u32, u32)>) -> Self {
        let display = conn.backend().display_ptr() as *mut c_void;
        let surface = layer_surface.wl_surface().id().as_ptr() as *mut c_void;
        Self {
            display,
            surface,
            size,
        }
    }
}

impl HasDisplayHandle for WaylandSurfaceHandle {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let display = NonNull::new(self.display).ok_or(HandleError::Unavailable)?;
        let raw = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(display));
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}

impl HasWindowHandle for WaylandSurfaceHandle {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let surface = NonNull::new(self.surface).ok_or(HandleError::Unavailable)?;
        let raw = RawWindowHandle::Wayland(WaylandWindowHandle::new(surface));
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl CompositorSurfaceHandle for WaylandSurfaceHandle {
    fn physical_size(&self) -> Option<(u32, u32)> {
        self.size
    }
}

struct WaylandOutputSurface {
    output_id: String,
    layer_surface: LayerSurface,
    wl_output: Option<WlOutput>,
    size: Option<(u32, u32)>,
}

/// Everything the `Dispatch` impls generated by `delegate_*!` need `&mut`
/// access to, matching the teacher's `WallpaperManager` (`renderer/src/
/// wallpaper.rs:790,829,837-840`): the handler traits and registry state
/// must live on the exact type passed to `registry_queue_init`, or the
/// bind/roundtrip calls in [`WaylandBackend::connect`] fail to satisfy
/// `Dispatch<WlRegistry, GlobalListContents>` (E0277).
struct WaylandState {
    compositor: CompositorState,
    layer_shell: LayerShell,
    registry_state: RegistryState,
    output_state: OutputState,
    queue_handle: QueueHandle<WaylandState>,
    surfaces: Vec<WaylandOutputSurface>,
    /// Output/layer-shell events observed since the last `dispatch_pending`
    /// drained them; handler callbacks only get `&mut self`; this is how
    /// they hand results back out to [`WaylandBackend::dispatch_pending`].
    pending: Vec<OutputEvent>,
}

impl WaylandState {
    fn create_surface_for(&mut self, output: Option<WlOutput>, output_id: String) -> WaylandOutputSurface {
        let wl_surface = self.compositor.create_surface(&self.queue_handle);
        let layer_surface = self.layer_shell.create_layer_surface(
            &self.queue_handle,
            wl_surface,
            Layer::Background,
            Some("driftwall".to_string()),
            output.as_ref(),
        );
        layer_surface.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
        layer_surface.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer_surface.set_exclusive_zone(-1);
        layer_surface.commit();

        let size = output
            .as_ref()
            .and_then(|o| self.output_state.info(o))
            .and_then(output_info_physical_size);

        WaylandOutputSurface {
            output_id,
            layer_surface,
            wl_output: output,
            size,
        }
    }

    fn surface_index_for_output(&self, output: &WlOutput) -> Option<usize> {
        self.surfaces
            .iter()
            .position(|s| s.wl_output.as_ref().map(|o| o.id()) == Some(output.id()))
    }

    fn surface_index_for_wl_surface(&self, surface: &wl_surface::WlSurface) -> Option<usize> {
        self.surfaces
            .iter()
            .position(|s| s.layer_surface.wl_surface().id() == surface.id())
    }
}

impl CompositorHandler for WaylandState {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        // Frame pacing is driven by the daemon's own poll()/timerfd loop
        // (§4.I), not compositor frame callbacks, so this is never armed.
    }
}

impl LayerShellHandler for WaylandState {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        if let Some(idx) = self.surface_index_for_wl_surface(layer.wl_surface()) {
            let removed = self.surfaces.remove(idx);
            self.pending.push(OutputEvent::Removed {
                output_id: removed.output_id,
            });
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let Some(idx) = self.surface_index_for_wl_surface(layer.wl_surface()) else {
            return;
        };
        let (width, height) = if configure.new_size.0 > 0 && configure.new_size.1 > 0 {
            configure.new_size
        } else {
            self.surfaces[idx].size.unwrap_or((1920, 1080))
        };
        self.surfaces[idx].size = Some((width, height));
        let output_id = self.surfaces[idx].output_id.clone();
        self.pending.push(OutputEvent::Resized {
            output_id,
            width,
            height,
        });
    }
}

impl OutputHandler for WaylandState {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: WlOutput) {
        if self.surface_index_for_output(&output).is_some() {
            // Already surfaced, either during the initial roundtrip or by
            // a prior `new_output` delivery for the same global.
            return;
        }
        let output_id = output_name(&self.output_state, &output);
        let surface = self.create_surface_for(Some(output), output_id.clone());
        let (width, height) = surface.size.unwrap_or((1920, 1080));
        self.surfaces.push(surface);
        self.pending.push(OutputEvent::Added {
            output_id,
            width,
            height,
        });
    }

    fn update_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: WlOutput) {
        let Some(idx) = self.surface_index_for_output(&output) else {
            return;
        };
        let Some(size) = self
            .output_state
            .info(&output)
            .and_then(output_info_physical_size)
        else {
            return;
        };
        if self.surfaces[idx].size == Some(size) {
            return;
        }
        self.surfaces[idx].size = Some(size);
        let output_id = self.surfaces[idx].output_id.clone();
        self.pending.push(OutputEvent::Resized {
            output_id,
            width: size.0,
            height: size.1,
        });
    }

    fn output_destroyed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: WlOutput) {
        if let Some(idx) = self.surface_index_for_output(&output) {
            let removed = self.surfaces.remove(idx);
            self.pending.push(OutputEvent::Removed {
                output_id: removed.output_id,
            });
        }
    }
}

impl ProvidesRegistryState for WaylandState {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState];
}

delegate_compositor!(WaylandState);
delegate_output!(WaylandState);
delegate_layer!(WaylandState);
delegate_registry!(WaylandState);

/// wlr-layer-shell background surface manager: one `Layer::Background`
/// surface per output, anchored to all four edges with a negative
/// exclusive zone so the compositor never reserves space for it.
pub struct WaylandBackend {
    conn: Connection,
    event_queue: EventQueue<WaylandState>,
    state: WaylandState,
}

impl WaylandBackend {
    pub fn connect() -> Result<Self> {
        let conn = Connection::connect_to_env().context("connecting to the Wayland display")?;
        let (globals, mut event_queue) =
            registry_queue_init::<WaylandState>(&conn).context("initializing Wayland registry")?;
        let queue_handle = event_queue.handle();

        let compositor = CompositorState::bind(&globals, &queue_handle)
            .context("wl_compositor not advertised by this compositor")?;
        let layer_shell = LayerShell::bind(&globals, &queue_handle)
            .context("wlr-layer-shell not advertised by this compositor")?;
        let registry_state = RegistryState::new(&globals);
        let output_state = OutputState::new(&globals, &queue_handle);

        let mut state = WaylandState {
            compositor,
            layer_shell,
            registry_state,
            output_state,
            queue_handle,
            surfaces: Vec::new(),
            pending: Vec::new(),
        };
        event_queue
            .roundtrip(&mut state)
            .context("initial Wayland roundtrip")?;
        // A second roundtrip lets the compositor finish delivering each
        // output's geometry/mode events, which typically arrive just after
        // the `wl_output` global itself on the first roundtrip.
        event_queue
            .roundtrip(&mut state)
            .context("second Wayland roundtrip")?;
        state.pending.clear();

        Ok(Self {
            conn,
            event_queue,
            state,
        })
    }
}

impl CompositorBackend for WaylandBackend {
    type Surface = WaylandSurfaceHandle;

    fn discover_outputs(&mut self) -> Result<Vec<(String, Self::Surface)>> {
        let outputs: Vec<WlOutput> = self.state.output_state.outputs().collect();
        let mut created = Vec::new();

        if outputs.is_empty() {
            let surface = self.state.create_surface_for(None, "default".to_string());
            let handle = WaylandSurfaceHandle::new(&self.conn, &surface.layer_surface, surface.size);
            created.push(("default".to_string(), handle));
            self.state.surfaces.push(surface);
            return Ok(created);
        }

        for output in outputs {
            let output_id = output_name(&self.state.output_state, &output);
            let surface = self.state.create_surface_for(Some(output), output_id.clone());
            let handle = WaylandSurfaceHandle::new(&self.conn, &surface.layer_surface, surface.size);
            created.push((output_id, handle));
            self.state.surfaces.push(surface);
        }
        Ok(created)
    }

    fn dispatch_pending(&mut self) -> Result<Vec<OutputEvent>> {
        // Pull any bytes the compositor has already written to the socket
        // into the queue's internal buffers, then process whatever that
        // (or a prior call) has buffered. This is the standard non-blocking
        // integration recipe for a `wayland-client` queue driven from an
        // external `poll()` loop rather than `blocking_dispatch`.
        if let Some(guard) = self.conn.prepare_read() {
            // An I/O error here (e.g. `WouldBlock`) just means the socket
            // had nothing new for us; already-queued events still get
            // dispatched below.
            let _ = guard.read();
        }
        self.event_queue
            .dispatch_pending(&mut self.state)
            .context("dispatching Wayland events")?;
        Ok(std::mem::take(&mut self.state.pending))
    }

    fn surface_for(&self, output_id: &str) -> Option<Self::Surface> {
        let surface = self
            .state
            .surfaces
            .iter()
            .find(|s| s.output_id == output_id)?;
        Some(WaylandSurfaceHandle::new(&self.conn, &surface.layer_surface, surface.size))
    }

    fn event_fd(&self) -> RawFd {
        use std::os::fd::AsRawFd;
        self.conn.backend().poll_fd().as_raw_fd()
    }
}

fn output_name(output_state: &OutputState, output: &WlOutput) -> String {
    output_state
        .info(output)
        .and_then(|info| info.name)
        .unwrap_or_else(|| format!("wl-output-{}", output.id().protocol_id()))
}

fn output_info_physical_size(info: OutputInfo) -> Option<(u32, u32)> {
    if let Some(mode) = info.modes.iter().find(|mode| mode.current) {
        return Some((mode.dimensions.0.max(1) as u32, mode.dimensions.1.max(1) as u32));
    }
    let (width, height) = info.logical_size?;
    let scale = info.scale_factor.max(1) as u32;
    Some(((width.max(1) as u32) * scale, (height.max(1) as u32) * scale))
}

// ---------------------------------------------------------------------
// X11 backend
// ---------------------------------------------------------------------

/// A borderless desktop window created via EWMH: `_NET_WM_WINDOW_TYPE_DESKTOP`
/// and `_NET_WM_STATE_BELOW`, marked sticky (on every workspace) per §4.H.
pub struct X11SurfaceHandle {
    raw_conn: *mut c_void,
    window: u32,
    screen: i32,
    size: Option<(u32, u32)>,
}

unsafe impl Send for X11SurfaceHandle {}
unsafe impl Sync for X11SurfaceHandle {}

impl HasDisplayHandle for X11SurfaceHandle {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        let conn = NonNull::new(self.raw_conn);
        let raw = RawDisplayHandle::Xcb(XcbDisplayHandle::new(conn, self.screen));
        Ok(unsafe { DisplayHandle::borrow_raw(raw) })
    }
}

impl HasWindowHandle for X11SurfaceHandle {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        let window = NonZeroU32::new(self.window).ok_or(HandleError::Unavailable)?;
        let raw = RawWindowHandle::Xcb(XcbWindowHandle::new(window));
        Ok(unsafe { WindowHandle::borrow_raw(raw) })
    }
}

impl CompositorSurfaceHandle for X11SurfaceHandle {
    fn physical_size(&self) -> Option<(u32, u32)> {
        self.size
    }
}

/// EWMH desktop-window backend built on `x11rb`'s libxcb-backed
/// [`XCBConnection`](x11rb::xcb_ffi::XCBConnection): one window per screen
/// (multi-monitor setups under X11 are typically one large root screen, so
/// outputs are reported via RandR rather than one window per head; RandR
/// enumeration is left to a follow-up since the core interface only
/// requires *a* surface per output). Unlike `x11rb::rust_connection::
/// RustConnection`, `XCBConnection` wraps a real `xcb_connection_t` that
/// `raw-window-handle`'s `RawDisplayHandle::Xcb` variant can reference, so
/// `wgpu` can actually create a surface from it.
pub struct X11Backend {
    conn: x11rb::xcb_ffi::XCBConnection,
    screen_num: usize,
    window: Option<u32>,
    size: Option<(u32, u32)>,
}

impl X11Backend {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) =
            x11rb::xcb_ffi::XCBConnection::connect(None).context("connecting to the X11 display")?;
        Ok(Self {
            conn,
            screen_num,
            window: None,
            size: None,
        })
    }

    fn create_desktop_window(&self, width: u16, height: u16) -> Result<u32> {
        use x11rb::connection::Connection as _;
        use x11rb::protocol::xproto::*;

        let screen = &self.conn.setup().roots[self.screen_num];
        let window = self.conn.generate_id()?;
        self.conn.create_window(
            screen.root_depth,
            window,
            screen.root,
            0,
            0,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .override_redirect(0)
                .background_pixel(screen.black_pixel)
                .event_mask(EventMask::STRUCTURE_NOTIFY),
        )?;

        let net_wm_window_type = self.intern(b"_NET_WM_WINDOW_TYPE")?;
        let net_wm_window_type_desktop = self.intern(b"_NET_WM_WINDOW_TYPE_DESKTOP")?;
        let net_wm_state = self.intern(b"_NET_WM_STATE")?;
        let net_wm_state_below = self.intern(b"_NET_WM_STATE_BELOW")?;
        let net_wm_state_sticky = self.intern(b"_NET_WM_STATE_STICKY")?;
        let net_wm_desktop = self.intern(b"_NET_WM_DESKTOP")?;

        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            net_wm_window_type,
            AtomEnum::ATOM,
            &[net_wm_window_type_desktop],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            net_wm_state,
            AtomEnum::ATOM,
            &[net_wm_state_below, net_wm_state_sticky],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            net_wm_desktop,
            AtomEnum::CARDINAL,
            &[0xFFFFFFFF], // all desktops
        )?;

        self.conn.map_window(window)?;
        self.conn.flush()?;
        Ok(window)
    }

    fn intern(&self, name: &[u8]) -> Result<u32> {
        use x11rb::connection::Connection as _;
        Ok(self.conn.intern_atom(false, name)?.reply()?.atom)
    }

    fn make_handle(&self) -> Option<X11SurfaceHandle> {
        let window = self.window?;
        Some(X11SurfaceHandle {
            raw_conn: self.conn.get_raw_xcb_connection() as *mut c_void,
            window,
            screen: self.screen_num as i32,
            size: self.size,
        })
    }
}

impl CompositorBackend for X11Backend {
    type Surface = X11SurfaceHandle;

    fn discover_outputs(&mut self) -> Result<Vec<(String, Self::Surface)>> {
        let screen = &self.conn.setup().roots[self.screen_num];
        let (width, height) = (screen.width_in_pixels, screen.height_in_pixels);
        let window = self.create_desktop_window(width, height)?;
        self.window = Some(window);
        self.size = Some((width as u32, height as u32));
        let handle = self
            .make_handle()
            .context("building surface handle for the just-created desktop window")?;
        Ok(vec![("root".to_string(), handle)])
    }

    fn dispatch_pending(&mut self) -> Result<Vec<OutputEvent>> {
        use x11rb::connection::Connection as _;
        use x11rb::protocol::Event;

        let mut events = Vec::new();
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("polling X11 events")?
        {
            match event {
                Event::ConfigureNotify(cfg) if Some(cfg.window) == self.window => {
                    let size = (cfg.width as u32, cfg.height as u32);
                    if self.size != Some(size) {
                        self.size = Some(size);
                        events.push(OutputEvent::Resized {
                            output_id: "root".to_string(),
                            width: size.0,
                            height: size.1,
                        });
                    }
                }
                Event::DestroyNotify(destroyed) if Some(destroyed.window) == self.window => {
                    self.window = None;
                    events.push(OutputEvent::DisplayLost {
                        output_id: "root".to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(events)
    }

    fn surface_for(&self, output_id: &str) -> Option<Self::Surface> {
        if output_id != "root" {
            return None;
        }
        self.make_handle()
    }

    fn event_fd(&self) -> RawFd {
        use std::os::fd::AsRawFd;
        self.conn.as_raw_fd()
    }
}
