use std::collections::HashMap;

use log::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::cursor::Handle as CursorHandle;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::Config;
use crate::bar::{Bar, BarClick, BarDrawInput};
use crate::client::{Client, TagMask};
use crate::draw::Font;
use crate::errors::{WmError, X11Error};
use crate::icon;
use crate::keyboard::handlers::{
    ClickContext, matching_button_actions, matching_key_actions, modifiers_to_mask,
};
use crate::keyboard::{self, Arg, KeyAction};
use crate::layout::LayoutKind;
use crate::monitor::{Monitor, detect_monitor_geometries};
use crate::signal;
use crate::status::{self, StatusSegment, StatusText};

type WmResult<T> = Result<T, WmError>;

const NORMAL_STATE: u32 = 1;
const WITHDRAWN_STATE: u32 = 0;

/// At most one interactive geometry update per tick.
const MOTION_INTERVAL_MS: u32 = 16;

/// Bounded spin while another grab is still in flight at alt-tab start.
const KEYBOARD_GRAB_RETRIES: u32 = 100;

const DIRECTION_WEIGHT: i64 = 20;

// Request opcodes whitelisted in the protocol error filter.
const X_CONFIGURE_WINDOW: u8 = 12;
const X_GRAB_BUTTON: u8 = 28;
const X_GRAB_KEY: u8 = 33;
const X_SET_INPUT_FOCUS: u8 = 42;
const X_COPY_AREA: u8 = 62;

pub fn tag_mask(tag_index: usize) -> TagMask {
    1 << tag_index
}

enum Control {
    Continue,
    Quit,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Quit,
    Restart,
}

struct MoveState {
    window: Window,
    start_root_x: i32,
    start_root_y: i32,
    original_x: i32,
    original_y: i32,
    last_motion_time: u32,
}

struct ResizeState {
    window: Window,
    original_x: i32,
    original_y: i32,
    last_motion_time: u32,
}

struct AltTabState {
    saved_views: Vec<TagMask>,
    direction: i32,
}

/// A short-lived sub-state machine owned by the dispatcher. While one is
/// active only configure-request, expose and map-request events reach the
/// normal handlers; pointer and key events feed the modal state instead.
enum ModalInteraction {
    Move(MoveState),
    Resize(ResizeState),
    AltTab(AltTabState),
}

struct AtomCache {
    net_supported: Atom,
    net_supporting_wm_check: Atom,
    net_current_desktop: Atom,
    net_client_info: Atom,
    net_client_list: Atom,
    net_active_window: Atom,
    net_wm_name: Atom,
    net_wm_state: Atom,
    net_wm_state_fullscreen: Atom,
    net_wm_window_type: Atom,
    net_wm_window_type_dialog: Atom,
    net_wm_icon: Atom,
    utf8_string: Atom,
    wm_name: Atom,
    wm_state: Atom,
    wm_protocols: Atom,
    wm_delete_window: Atom,
    wm_take_focus: Atom,
}

impl AtomCache {
    fn new(connection: &RustConnection) -> WmResult<Self> {
        let intern = |name: &[u8]| -> WmResult<Atom> {
            Ok(connection.intern_atom(false, name)?.reply()?.atom)
        };

        Ok(Self {
            net_supported: intern(b"_NET_SUPPORTED")?,
            net_supporting_wm_check: intern(b"_NET_SUPPORTING_WM_CHECK")?,
            net_current_desktop: intern(b"_NET_CURRENT_DESKTOP")?,
            net_client_info: intern(b"_NET_CLIENT_INFO")?,
            net_client_list: intern(b"_NET_CLIENT_LIST")?,
            net_active_window: intern(b"_NET_ACTIVE_WINDOW")?,
            net_wm_name: intern(b"_NET_WM_NAME")?,
            net_wm_state: intern(b"_NET_WM_STATE")?,
            net_wm_state_fullscreen: intern(b"_NET_WM_STATE_FULLSCREEN")?,
            net_wm_window_type: intern(b"_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_dialog: intern(b"_NET_WM_WINDOW_TYPE_DIALOG")?,
            net_wm_icon: intern(b"_NET_WM_ICON")?,
            utf8_string: intern(b"UTF8_STRING")?,
            wm_name: AtomEnum::WM_NAME.into(),
            wm_state: intern(b"WM_STATE")?,
            wm_protocols: intern(b"WM_PROTOCOLS")?,
            wm_delete_window: intern(b"WM_DELETE_WINDOW")?,
            wm_take_focus: intern(b"WM_TAKE_FOCUS")?,
        })
    }
}

/// Encodes the persisted `[tag mask, monitor index]` pair for the
/// `_NET_CLIENT_INFO` cardinal property.
pub fn encode_client_info(tags: TagMask, monitor_index: usize) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&tags.to_ne_bytes());
    bytes[4..].copy_from_slice(&(monitor_index as u32).to_ne_bytes());
    bytes
}

pub fn decode_client_info(data: &[u8]) -> Option<(TagMask, u32)> {
    if data.len() < 8 {
        return None;
    }
    let tags = TagMask::from_ne_bytes([data[0], data[1], data[2], data[3]]);
    let monitor = u32::from_ne_bytes([data[4], data[5], data[6], data[7]]);
    Some((tags, monitor))
}

/// Weighted distance toward `direction` (0 left, 1 right, 2 up, 3 down),
/// compared against the wrap-around distance across the monitor.
fn direction_score(
    direction: i32,
    source: (i32, i32, i32, i32),
    candidate: (i32, i32, i32, i32),
    wrap_extent: i32,
) -> i64 {
    let (sx, sy, sw, sh) = source;
    let (cx, cy, cw, ch) = candidate;

    let (distance, secondary) = match direction {
        0 => (sx - cx - cw, (sy - cy).abs()),
        1 => (cx - sx - sw, (cy - sy).abs()),
        2 => (sy - cy - ch, (sx - cx).abs()),
        _ => (cy - sy - sh, (cx - sx).abs()),
    };

    DIRECTION_WEIGHT * distance.abs().min((distance + wrap_extent).abs()) as i64 + secondary as i64
}

/// Left and up accept ties so a later candidate at equal distance wins;
/// right and down require strict improvement.
fn direction_prefers(direction: i32, candidate_score: i64, best_score: i64) -> bool {
    if direction == 0 || direction == 2 {
        candidate_score <= best_score
    } else {
        candidate_score < best_score
    }
}

fn is_expected_race(error: &x11rb::x11_utils::X11Error) -> bool {
    use x11rb::protocol::ErrorKind;

    matches!(error.error_kind, ErrorKind::Window | ErrorKind::Drawable)
        || (matches!(error.error_kind, ErrorKind::Match)
            && matches!(error.major_opcode, X_SET_INPUT_FOCUS | X_CONFIGURE_WINDOW))
        || (matches!(error.error_kind, ErrorKind::Access)
            && matches!(error.major_opcode, X_GRAB_BUTTON | X_GRAB_KEY))
        || (matches!(error.error_kind, ErrorKind::Drawable)
            && error.major_opcode == X_COPY_AREA)
}

pub struct WindowManager {
    config: Config,
    connection: RustConnection,
    screen_number: usize,
    root: Window,
    _wm_check_window: Window,
    screen: Screen,
    atoms: AtomCache,
    display: *mut x11::xlib::Display,
    font: Font,
    bar_height: i32,
    bars: Vec<Bar>,
    windows: Vec<Window>,
    clients: HashMap<Window, Client>,
    monitors: Vec<Monitor>,
    selected_monitor: usize,
    status: StatusText,
    keyboard_mapping: Option<keyboard::KeyboardMapping>,
    modal: Option<ModalInteraction>,
}

impl WindowManager {
    pub fn new(config: Config) -> WmResult<Self> {
        let (connection, screen_number) = x11rb::connect(None)?;
        let root = connection.setup().roots[screen_number].root;
        let screen = connection.setup().roots[screen_number].clone();

        // Selecting substructure redirection is exclusive; a BadAccess here
        // means another window manager owns the root.
        let select_result = connection
            .change_window_attributes(
                root,
                &ChangeWindowAttributesAux::new().event_mask(
                    EventMask::SUBSTRUCTURE_REDIRECT
                        | EventMask::SUBSTRUCTURE_NOTIFY
                        | EventMask::STRUCTURE_NOTIFY
                        | EventMask::PROPERTY_CHANGE
                        | EventMask::BUTTON_PRESS
                        | EventMask::POINTER_MOTION
                        | EventMask::ENTER_WINDOW
                        | EventMask::LEAVE_WINDOW,
                ),
            )?
            .check();
        if let Err(error) = select_result {
            if let x11rb::errors::ReplyError::X11Error(ref protocol_error) = error
                && matches!(protocol_error.error_kind, x11rb::protocol::ErrorKind::Access)
            {
                return Err(WmError::AnotherWmRunning);
            }
            return Err(error.into());
        }

        let normal_cursor = CursorHandle::new(
            &connection,
            screen_number,
            &x11rb::resource_manager::new_from_default(&connection)?,
        )?
        .reply()?
        .load_cursor(&connection, "left_ptr")?;
        connection
            .change_window_attributes(root, &ChangeWindowAttributesAux::new().cursor(normal_cursor))?;

        signal::ignore_child_signals();

        let atoms = AtomCache::new(&connection)?;

        let display = unsafe { x11::xlib::XOpenDisplay(std::ptr::null()) };
        if display.is_null() {
            return Err(WmError::X11(X11Error::DisplayOpenFailed));
        }
        let font = Font::new(display, screen_number as i32, &config.font)?;
        let bar_height = (font.height() as f32 * 1.4) as i32;

        let geometries = detect_monitor_geometries(&connection, &screen)?;
        let mut monitors = Vec::new();
        for (index, geometry) in geometries.iter().enumerate() {
            let mut monitor = Monitor::new(
                index,
                *geometry,
                config.layouts,
                config.master_factor,
                config.num_master,
                config.show_bar,
                config.top_bar,
                config.tags.len(),
            );
            monitor.update_bar_position(bar_height, config.extra_bar);
            monitors.push(monitor);
        }

        let mut bars = Vec::new();
        for monitor in &monitors {
            let bar = Bar::new(
                &connection,
                &screen,
                screen_number,
                &config,
                display,
                &font,
                monitor.screen_x as i16,
                monitor.bar_y as i16,
                monitor.extra_bar_y as i16,
                monitor.screen_width as u16,
            )?;
            bars.push(bar);
        }

        let supported_atoms = [
            atoms.net_supported,
            atoms.net_supporting_wm_check,
            atoms.net_active_window,
            atoms.net_client_list,
            atoms.net_current_desktop,
            atoms.net_wm_name,
            atoms.net_wm_state,
            atoms.net_wm_state_fullscreen,
            atoms.net_wm_window_type,
            atoms.net_wm_window_type_dialog,
            atoms.net_wm_icon,
        ];
        let supported_bytes: Vec<u8> = supported_atoms
            .iter()
            .flat_map(|atom| atom.to_ne_bytes())
            .collect();
        connection.change_property(
            PropMode::REPLACE,
            root,
            atoms.net_supported,
            AtomEnum::ATOM,
            32,
            supported_atoms.len() as u32,
            &supported_bytes,
        )?;

        let wm_check_window = connection.generate_id()?;
        connection.create_window(
            screen.root_depth,
            wm_check_window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new(),
        )?;
        connection.change_property(
            PropMode::REPLACE,
            wm_check_window,
            atoms.net_supporting_wm_check,
            AtomEnum::WINDOW,
            32,
            1,
            &wm_check_window.to_ne_bytes(),
        )?;
        connection.change_property(
            PropMode::REPLACE,
            wm_check_window,
            atoms.net_wm_name,
            atoms.utf8_string,
            8,
            6,
            b"tatami",
        )?;
        connection.change_property(
            PropMode::REPLACE,
            root,
            atoms.net_supporting_wm_check,
            AtomEnum::WINDOW,
            32,
            1,
            &wm_check_window.to_ne_bytes(),
        )?;
        connection.delete_property(root, atoms.net_client_list)?;

        let mut window_manager = Self {
            config,
            connection,
            screen_number,
            root,
            _wm_check_window: wm_check_window,
            screen,
            atoms,
            display,
            font,
            bar_height,
            bars,
            windows: Vec::new(),
            clients: HashMap::new(),
            monitors,
            selected_monitor: 0,
            status: StatusText::default(),
            keyboard_mapping: None,
            modal: None,
        };

        window_manager.update_status()?;
        window_manager.scan_existing_windows()?;
        window_manager.focus(None)?;
        window_manager.arrange(None)?;

        Ok(window_manager)
    }

    pub fn run(&mut self) -> WmResult<RunOutcome> {
        info!("tatami started on screen {}", self.screen_number);

        self.keyboard_mapping = Some(keyboard::grab_keys(
            &self.connection,
            self.root,
            &self.config.keybindings,
        )?);

        loop {
            self.connection.flush()?;
            let event = self.connection.wait_for_event()?;
            let control = if self.modal.is_some() {
                self.dispatch_modal(event)?
            } else {
                self.handle_event(event)?
            };
            match control {
                Control::Continue => {}
                Control::Quit => return Ok(RunOutcome::Quit),
                Control::Restart => return Ok(RunOutcome::Restart),
            }
        }
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    fn handle_event(&mut self, event: Event) -> WmResult<Control> {
        match event {
            Event::Error(error) => {
                if is_expected_race(&error) {
                    debug!("ignoring protocol error from a vanished window: {error:?}");
                    return Ok(Control::Continue);
                }
                return Err(WmError::FatalProtocolError(format!("{error:?}")));
            }
            Event::KeyPress(event) => return self.on_key_press(event),
            Event::ButtonPress(event) => return self.on_button_press(event),
            Event::MapRequest(event) => self.on_map_request(event)?,
            Event::UnmapNotify(event) => self.on_unmap_notify(event)?,
            Event::DestroyNotify(event) => self.on_destroy_notify(event)?,
            Event::ConfigureRequest(event) => self.on_configure_request(event)?,
            Event::ConfigureNotify(event) => self.on_configure_notify(event)?,
            Event::PropertyNotify(event) => self.on_property_notify(event)?,
            Event::ClientMessage(event) => self.on_client_message(event)?,
            Event::EnterNotify(event) => self.on_enter_notify(event)?,
            Event::MotionNotify(event) => self.on_motion_notify(event)?,
            Event::FocusIn(event) => self.on_focus_in(event)?,
            Event::MappingNotify(event) => self.on_mapping_notify(event)?,
            Event::Expose(event) => self.on_expose(event)?,
            _ => {}
        }
        Ok(Control::Continue)
    }

    /// Event routing while a modal interaction holds a grab. A limited set
    /// of events still reaches the normal handlers so other clients stay
    /// responsive; pointer and key traffic drives the modal state.
    fn dispatch_modal(&mut self, event: Event) -> WmResult<Control> {
        match event {
            Event::ConfigureRequest(_) | Event::Expose(_) | Event::MapRequest(_) | Event::Error(_) => {
                return self.handle_event(event);
            }
            _ => {}
        }

        let Some(modal) = self.modal.take() else {
            return Ok(Control::Continue);
        };

        match modal {
            ModalInteraction::Move(state) => self.handle_move_event(state, event)?,
            ModalInteraction::Resize(state) => self.handle_resize_event(state, event)?,
            ModalInteraction::AltTab(state) => self.handle_alt_tab_event(state, event)?,
        }

        Ok(Control::Continue)
    }

    fn on_key_press(&mut self, event: KeyPressEvent) -> WmResult<Control> {
        let Some(mapping) = &self.keyboard_mapping else {
            return Ok(Control::Continue);
        };

        // Every matching table entry fires, in table order.
        let actions = matching_key_actions(&event, &self.config.keybindings, mapping);
        for (action, arg) in actions {
            match self.run_action(action, &arg)? {
                Control::Continue => {}
                control => return Ok(control),
            }
        }
        Ok(Control::Continue)
    }

    fn on_button_press(&mut self, event: ButtonPressEvent) -> WmResult<Control> {
        let mut click = ClickContext::RootWindow;
        let mut tag_argument: Option<Arg> = None;
        let mut status_signal: Option<u8> = None;
        let mut target_window: Option<Window> = None;

        let bar_hit = self
            .bars
            .iter()
            .enumerate()
            .find(|(_, bar)| bar.window() == event.event)
            .map(|(monitor_index, bar)| (monitor_index, bar.resolve_click(event.event_x)));

        if let Some((monitor_index, bar_click)) = bar_hit {
            if monitor_index != self.selected_monitor {
                if let Some(old_selected) = self.focused_window() {
                    self.unfocus(old_selected, true)?;
                }
                self.selected_monitor = monitor_index;
                self.focus(None)?;
            }
            match bar_click {
                BarClick::Tag(tag_index) => {
                    click = ClickContext::TagBar;
                    tag_argument = Some(Arg::Int(tag_index as i32));
                }
                BarClick::LayoutSymbol => click = ClickContext::LayoutSymbol,
                BarClick::WindowTitle => click = ClickContext::WindowTitle,
                BarClick::Status(signal_offset) => {
                    click = ClickContext::StatusText;
                    status_signal = signal_offset;
                }
            }
        } else if self.clients.contains_key(&event.event) {
            self.focus(Some(event.event))?;
            self.restack()?;
            self.connection
                .allow_events(Allow::REPLAY_POINTER, event.time)?;
            click = ClickContext::ClientWindow;
            target_window = Some(event.event);
        }

        let actions = matching_button_actions(&event, click, &self.config.buttons);
        for (action, arg) in actions {
            let arg = match (&arg, click) {
                (Arg::None, ClickContext::TagBar) => {
                    tag_argument.clone().unwrap_or(Arg::None)
                }
                _ => arg,
            };
            match action {
                KeyAction::MoveMouse => {
                    if let Some(window) = target_window.or(self.focused_window()) {
                        self.begin_move(window)?;
                    }
                }
                KeyAction::ResizeMouse => {
                    if let Some(window) = target_window.or(self.focused_window()) {
                        self.begin_resize(window)?;
                    }
                }
                KeyAction::SignalStatusBar => {
                    if let Some(signal_offset) = status_signal
                        && !status::signal_status_bar(&self.config.status_bar_process, signal_offset)
                    {
                        debug!("no status bar process to signal");
                    }
                }
                _ => match self.run_action(action, &arg)? {
                    Control::Continue => {}
                    control => return Ok(control),
                },
            }
        }
        Ok(Control::Continue)
    }

    fn on_map_request(&mut self, event: MapRequestEvent) -> WmResult<()> {
        let Ok(attributes) = self.connection.get_window_attributes(event.window)?.reply() else {
            return Ok(());
        };
        if attributes.override_redirect {
            return Ok(());
        }
        if !self.clients.contains_key(&event.window) {
            self.manage_window(event.window)?;
        }
        Ok(())
    }

    fn on_unmap_notify(&mut self, event: UnmapNotifyEvent) -> WmResult<()> {
        if !self.clients.contains_key(&event.window) {
            return Ok(());
        }
        // A synthetic unmap is the ICCCM withdrawal handshake, not a real
        // disappearance.
        if event.response_type & 0x80 != 0 {
            self.set_wm_state(event.window, WITHDRAWN_STATE)?;
        } else {
            self.unmanage_window(event.window, false)?;
        }
        Ok(())
    }

    fn on_destroy_notify(&mut self, event: DestroyNotifyEvent) -> WmResult<()> {
        if self.clients.contains_key(&event.window) {
            self.unmanage_window(event.window, true)?;
        }
        Ok(())
    }

    fn on_configure_request(&mut self, event: ConfigureRequestEvent) -> WmResult<()> {
        if let Some(client) = self.clients.get(&event.window) {
            let monitor = &self.monitors[client.monitor_index];
            let is_floating = client.is_floating;
            let has_arrange = monitor.current_layout().has_arrange();

            if event.value_mask.contains(ConfigWindow::BORDER_WIDTH) {
                if let Some(client) = self.clients.get_mut(&event.window) {
                    client.border_width = event.border_width as i32;
                }
            } else if is_floating || !has_arrange {
                let monitor_x = monitor.screen_x;
                let monitor_y = monitor.screen_y;
                let monitor_width = monitor.screen_width;
                let monitor_height = monitor.screen_height;

                let (mut x, mut y, mut width, mut height) =
                    (client.x, client.y, client.width, client.height);
                if event.value_mask.contains(ConfigWindow::X) {
                    x = monitor_x + event.x as i32;
                }
                if event.value_mask.contains(ConfigWindow::Y) {
                    y = monitor_y + event.y as i32;
                }
                if event.value_mask.contains(ConfigWindow::WIDTH) {
                    width = event.width as i32;
                }
                if event.value_mask.contains(ConfigWindow::HEIGHT) {
                    height = event.height as i32;
                }

                let border = client.border_width;
                if x + width > monitor_x + monitor_width && is_floating {
                    x = monitor_x + (monitor_width / 2 - (width + 2 * border) / 2);
                }
                if y + height > monitor_y + monitor_height && is_floating {
                    y = monitor_y + (monitor_height / 2 - (height + 2 * border) / 2);
                }

                if let Some(client) = self.clients.get_mut(&event.window) {
                    client.old_x = client.x;
                    client.old_y = client.y;
                    client.old_width = client.width;
                    client.old_height = client.height;
                    client.x = x;
                    client.y = y;
                    client.width = width;
                    client.height = height;
                }

                let moved_only = event
                    .value_mask
                    .intersects(ConfigWindow::X | ConfigWindow::Y)
                    && !event
                        .value_mask
                        .intersects(ConfigWindow::WIDTH | ConfigWindow::HEIGHT);
                if moved_only {
                    self.send_configure_notify(event.window)?;
                }
                if self.is_visible(event.window) {
                    self.connection.configure_window(
                        event.window,
                        &ConfigureWindowAux::new()
                            .x(x)
                            .y(y)
                            .width(width as u32)
                            .height(height as u32),
                    )?;
                }
            } else {
                // Tiling overrides the request; acknowledge with a synthetic
                // notification so the client stops waiting.
                self.send_configure_notify(event.window)?;
            }
        } else {
            let mut aux = ConfigureWindowAux::new();
            if event.value_mask.contains(ConfigWindow::X) {
                aux = aux.x(event.x as i32);
            }
            if event.value_mask.contains(ConfigWindow::Y) {
                aux = aux.y(event.y as i32);
            }
            if event.value_mask.contains(ConfigWindow::WIDTH) {
                aux = aux.width(event.width as u32);
            }
            if event.value_mask.contains(ConfigWindow::HEIGHT) {
                aux = aux.height(event.height as u32);
            }
            if event.value_mask.contains(ConfigWindow::BORDER_WIDTH) {
                aux = aux.border_width(event.border_width as u32);
            }
            if event.value_mask.contains(ConfigWindow::SIBLING) {
                aux = aux.sibling(event.sibling);
            }
            if event.value_mask.contains(ConfigWindow::STACK_MODE) {
                aux = aux.stack_mode(event.stack_mode);
            }
            self.connection.configure_window(event.window, &aux)?;
        }
        self.connection.flush()?;
        Ok(())
    }

    fn on_configure_notify(&mut self, event: ConfigureNotifyEvent) -> WmResult<()> {
        if event.window != self.root {
            return Ok(());
        }

        let size_changed = event.width != self.screen.width_in_pixels
            || event.height != self.screen.height_in_pixels;
        if size_changed {
            self.screen.width_in_pixels = event.width;
            self.screen.height_in_pixels = event.height;
        }

        if self.update_monitor_geometry()? || size_changed {
            for monitor_index in 0..self.monitors.len() {
                let monitor_rect = self.monitors[monitor_index].screen_rect();
                let view = self.monitors[monitor_index].selected_tags();
                let fullscreen_windows: Vec<Window> = self.monitors[monitor_index]
                    .clients
                    .iter()
                    .copied()
                    .filter(|window| {
                        self.clients.get(window).is_some_and(|client| {
                            client.is_fullscreen
                                && !client.is_fake_fullscreen
                                && client.is_visible_on(view)
                        })
                    })
                    .collect();
                for window in fullscreen_windows {
                    self.resize_client(
                        window,
                        monitor_rect.x,
                        monitor_rect.y,
                        monitor_rect.width,
                        monitor_rect.height,
                    )?;
                }
            }
            self.focus(None)?;
            self.arrange(None)?;
        }
        Ok(())
    }

    fn on_property_notify(&mut self, event: PropertyNotifyEvent) -> WmResult<()> {
        if event.window == self.root && event.atom == self.atoms.wm_name {
            self.update_status()?;
            return Ok(());
        }
        if event.state == Property::DELETE || !self.clients.contains_key(&event.window) {
            return Ok(());
        }

        if event.atom == AtomEnum::WM_TRANSIENT_FOR.into() {
            let is_floating = self
                .clients
                .get(&event.window)
                .map(|client| client.is_floating)
                .unwrap_or(false);
            if !is_floating
                && let Some(parent) = self.get_transient_parent(event.window)
                && self.clients.contains_key(&parent)
            {
                let mut owner = self.selected_monitor;
                if let Some(client) = self.clients.get_mut(&event.window) {
                    client.is_floating = true;
                    owner = client.monitor_index;
                }
                self.arrange(Some(owner))?;
            }
        } else if event.atom == AtomEnum::WM_NORMAL_HINTS.into() {
            if let Some(client) = self.clients.get_mut(&event.window) {
                client.hints_valid = false;
            }
        } else if event.atom == AtomEnum::WM_HINTS.into() {
            self.update_wm_hints(event.window)?;
            self.draw_bars()?;
        }

        if event.atom == self.atoms.wm_name || event.atom == self.atoms.net_wm_name {
            self.update_window_title(event.window)?;
            if self.focused_window() == Some(event.window) {
                self.draw_bars()?;
            }
        }
        if event.atom == self.atoms.net_wm_window_type {
            self.update_window_type(event.window)?;
        }
        if event.atom == self.atoms.net_wm_icon {
            self.update_window_icon(event.window)?;
            if self.focused_window() == Some(event.window) {
                self.draw_bars()?;
            }
        }
        Ok(())
    }

    fn on_client_message(&mut self, event: ClientMessageEvent) -> WmResult<()> {
        if !self.clients.contains_key(&event.window) {
            return Ok(());
        }

        if event.type_ == self.atoms.net_wm_state {
            let data = event.data.as_data32();
            if data[1] == self.atoms.net_wm_state_fullscreen
                || data[2] == self.atoms.net_wm_state_fullscreen
            {
                let currently = self
                    .clients
                    .get(&event.window)
                    .map(|client| client.is_fullscreen)
                    .unwrap_or(false);
                let fullscreen = match data[0] {
                    1 => true,
                    0 => false,
                    2 => !currently,
                    _ => return Ok(()),
                };
                self.set_fullscreen(event.window, fullscreen)?;
                self.restack()?;
            }
        } else if event.type_ == self.atoms.net_active_window {
            // Activation never steals focus; it only flags urgency.
            let is_urgent = self
                .clients
                .get(&event.window)
                .map(|client| client.is_urgent)
                .unwrap_or(false);
            if self.focused_window() != Some(event.window) && !is_urgent {
                self.set_urgent(event.window, true)?;
                self.draw_bars()?;
            }
        }
        Ok(())
    }

    fn on_enter_notify(&mut self, event: EnterNotifyEvent) -> WmResult<()> {
        if (event.mode != NotifyMode::NORMAL || event.detail == NotifyDetail::INFERIOR)
            && event.event != self.root
        {
            return Ok(());
        }

        let client_monitor = self
            .clients
            .get(&event.event)
            .map(|client| client.monitor_index);
        let monitor_index = client_monitor
            .or_else(|| self.monitor_at_point(event.root_x as i32, event.root_y as i32))
            .unwrap_or(self.selected_monitor);

        if monitor_index != self.selected_monitor {
            if let Some(old_selected) = self.focused_window() {
                self.unfocus(old_selected, true)?;
            }
            self.selected_monitor = monitor_index;
        } else if client_monitor.is_none() || Some(event.event) == self.focused_window() {
            return Ok(());
        }

        self.focus(self.clients.contains_key(&event.event).then_some(event.event))?;
        Ok(())
    }

    fn on_motion_notify(&mut self, event: MotionNotifyEvent) -> WmResult<()> {
        if event.event != self.root {
            return Ok(());
        }
        if let Some(monitor_index) =
            self.monitor_at_point(event.root_x as i32, event.root_y as i32)
            && monitor_index != self.selected_monitor
        {
            if let Some(old_selected) = self.focused_window() {
                self.unfocus(old_selected, true)?;
            }
            self.selected_monitor = monitor_index;
            self.focus(None)?;
        }
        Ok(())
    }

    fn on_focus_in(&mut self, event: FocusInEvent) -> WmResult<()> {
        // Push focus back onto the selected client when something grabs it
        // behind our back.
        if let Some(selected) = self.focused_window()
            && event.event != selected
        {
            self.set_input_focus(selected)?;
        }
        Ok(())
    }

    fn on_mapping_notify(&mut self, event: MappingNotifyEvent) -> WmResult<()> {
        if event.request == Mapping::KEYBOARD {
            self.keyboard_mapping = Some(keyboard::grab_keys(
                &self.connection,
                self.root,
                &self.config.keybindings,
            )?);
        }
        Ok(())
    }

    fn on_expose(&mut self, event: ExposeEvent) -> WmResult<()> {
        if self.bars.iter().any(|bar| bar.owns_window(event.window)) {
            self.draw_bars()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command layer
    // ------------------------------------------------------------------

    fn run_action(&mut self, action: KeyAction, arg: &Arg) -> WmResult<Control> {
        match action {
            KeyAction::Spawn => match arg {
                Arg::Array(command) => signal::spawn_detached(command),
                Arg::Str(command) => signal::spawn_detached(&[
                    "sh".to_string(),
                    "-c".to_string(),
                    command.clone(),
                ]),
                _ => {}
            },
            KeyAction::SpawnTerminal => {
                let terminal = self.config.terminal.clone();
                signal::spawn_detached(&terminal);
            }
            KeyAction::KillClient => self.kill_focused()?,
            KeyAction::FocusStack => {
                if let Arg::Int(direction) = arg {
                    self.focus_stack(*direction)?;
                }
            }
            KeyAction::FocusDirection => {
                if let Arg::Int(direction) = arg {
                    self.focus_direction(*direction)?;
                }
            }
            KeyAction::AltTab => {
                if let Arg::Int(direction) = arg {
                    self.begin_alt_tab(*direction)?;
                }
            }
            KeyAction::IncNumMaster => {
                if let Arg::Int(delta) = arg {
                    self.monitors[self.selected_monitor].adjust_num_master(*delta);
                    self.arrange(Some(self.selected_monitor))?;
                }
            }
            KeyAction::SetMasterFactor => {
                if let Arg::Int(delta) = arg {
                    let monitor = &mut self.monitors[self.selected_monitor];
                    let factor =
                        (monitor.master_factor + *delta as f32 / 100.0).clamp(0.05, 0.95);
                    monitor.set_master_factor(factor);
                    self.arrange(Some(self.selected_monitor))?;
                }
            }
            KeyAction::Zoom => self.zoom()?,
            KeyAction::ToggleBar => self.toggle_bar()?,
            KeyAction::ViewTag => {
                if let Arg::Int(tag_index) = arg
                    && (*tag_index as usize) < self.config.tags.len()
                {
                    self.view(tag_mask(*tag_index as usize))?;
                }
            }
            KeyAction::ViewAll => self.view(self.config.all_tags_mask())?,
            KeyAction::ToggleView => {
                if let Arg::Int(tag_index) = arg
                    && (*tag_index as usize) < self.config.tags.len()
                {
                    self.toggle_view(tag_mask(*tag_index as usize))?;
                }
            }
            KeyAction::MoveToTag => {
                if let Arg::Int(tag_index) = arg
                    && (*tag_index as usize) < self.config.tags.len()
                {
                    self.tag_focused(tag_mask(*tag_index as usize))?;
                }
            }
            KeyAction::TagAll => self.tag_focused(self.config.all_tags_mask())?,
            KeyAction::ToggleTag => {
                if let Arg::Int(tag_index) = arg
                    && (*tag_index as usize) < self.config.tags.len()
                {
                    self.toggle_tag_focused(tag_mask(*tag_index as usize))?;
                }
            }
            KeyAction::ToggleScratch => {
                if let Arg::Int(index) = arg
                    && (*index as usize) < self.config.scratchpads.len()
                {
                    self.toggle_scratch(*index as usize)?;
                }
            }
            KeyAction::SetLayout => {
                let layout = match arg {
                    Arg::Str(name) => match name.parse::<LayoutKind>() {
                        Ok(kind) => Some(kind),
                        Err(error) => {
                            warn!("{error}");
                            return Ok(Control::Continue);
                        }
                    },
                    _ => None,
                };
                self.set_layout(layout)?;
            }
            KeyAction::ToggleFloating => self.toggle_floating()?,
            KeyAction::ToggleFullScreen => {
                if let Some(window) = self.focused_window() {
                    let fullscreen = self
                        .clients
                        .get(&window)
                        .map(|client| client.is_fullscreen)
                        .unwrap_or(false);
                    self.set_fullscreen(window, !fullscreen)?;
                    self.restack()?;
                }
            }
            KeyAction::ToggleFakeFullScreen => self.toggle_fake_fullscreen()?,
            KeyAction::FocusMonitor => {
                if let Arg::Int(direction) = arg {
                    self.focus_monitor(*direction)?;
                }
            }
            KeyAction::TagMonitor => {
                if let Arg::Int(direction) = arg {
                    self.tag_monitor(*direction)?;
                }
            }
            KeyAction::SignalStatusBar => {
                if let Arg::Int(signal_offset) = arg {
                    status::signal_status_bar(
                        &self.config.status_bar_process,
                        *signal_offset as u8,
                    );
                }
            }
            KeyAction::MoveMouse | KeyAction::ResizeMouse => {}
            KeyAction::Quit => return Ok(Control::Quit),
            KeyAction::Restart => {
                signal::notify("tatami", "restarting");
                return Ok(Control::Restart);
            }
            KeyAction::None => {}
        }
        Ok(Control::Continue)
    }

    fn kill_focused(&mut self) -> WmResult<()> {
        let Some(window) = self.focused_window() else {
            return Ok(());
        };
        if !self.send_protocol_event(window, self.atoms.wm_delete_window)? {
            // The polite protocol is unsupported; escalate. The window may
            // already be gone, so the reply error is ignored.
            if let Err(error) = self.connection.kill_client(window)?.check() {
                debug!("kill_client raced with destruction: {error}");
            }
        }
        self.connection.flush()?;
        Ok(())
    }

    fn focus_stack(&mut self, direction: i32) -> WmResult<()> {
        let monitor = &self.monitors[self.selected_monitor];
        let Some(selected) = monitor.selected_client else {
            return Ok(());
        };
        let selected_fullscreen = self
            .clients
            .get(&selected)
            .map(|client| client.is_fullscreen && !client.is_fake_fullscreen)
            .unwrap_or(false);
        if selected_fullscreen {
            return Ok(());
        }

        let visible = self.visible_windows_on(self.selected_monitor);
        if visible.is_empty() {
            return Ok(());
        }
        let Some(current_index) = visible.iter().position(|&window| window == selected) else {
            return Ok(());
        };

        let next_index = if direction > 0 {
            (current_index + 1) % visible.len()
        } else {
            (current_index + visible.len() - 1) % visible.len()
        };
        self.focus(Some(visible[next_index]))?;
        self.restack()?;
        Ok(())
    }

    fn focus_direction(&mut self, direction: i32) -> WmResult<()> {
        let monitor = &self.monitors[self.selected_monitor];
        let Some(selected) = monitor.selected_client else {
            return Ok(());
        };
        let Some(selected_client) = self.clients.get(&selected) else {
            return Ok(());
        };

        let source = (
            selected_client.x,
            selected_client.y,
            selected_client.width_with_border(),
            selected_client.height_with_border(),
        );
        let selected_floating = selected_client.is_floating;
        let wrap_extent = if direction < 2 {
            monitor.screen_width
        } else {
            monitor.screen_height
        };
        let view = monitor.selected_tags();

        // Candidates iterate in list order starting just past the selected
        // client, which is what makes the tie-breaks deterministic.
        let clients_in_order = monitor.clients.clone();
        let start = clients_in_order
            .iter()
            .position(|&window| window == selected)
            .map(|index| index + 1)
            .unwrap_or(0);

        let mut best: Option<Window> = None;
        let mut best_score = i64::MAX;
        for offset in 0..clients_in_order.len() {
            let window = clients_in_order[(start + offset) % clients_in_order.len()];
            if window == selected {
                continue;
            }
            let Some(client) = self.clients.get(&window) else {
                continue;
            };
            if !client.is_visible_on(view) || client.is_floating != selected_floating {
                continue;
            }
            let candidate = (
                client.x,
                client.y,
                client.width_with_border(),
                client.height_with_border(),
            );
            let score = direction_score(direction, source, candidate, wrap_extent);
            if direction_prefers(direction, score, best_score) {
                best_score = score;
                best = Some(window);
            }
        }

        if let Some(window) = best
            && Some(window) != self.focused_window()
        {
            self.focus(Some(window))?;
            self.restack()?;
        }
        Ok(())
    }

    /// Global next/previous over the flat all-clients list, blind to tag
    /// visibility; the alt-tab interaction drives this.
    fn focus_next(&mut self, direction: i32) -> WmResult<()> {
        if self.windows.is_empty() {
            return Ok(());
        }
        let next_index = match self
            .focused_window()
            .and_then(|window| self.windows.iter().position(|&w| w == window))
        {
            Some(index) => {
                if direction > 0 {
                    (index + 1) % self.windows.len()
                } else {
                    (index + self.windows.len() - 1) % self.windows.len()
                }
            }
            None => 0,
        };
        self.focus(Some(self.windows[next_index]))?;
        self.restack()?;
        Ok(())
    }

    fn zoom(&mut self) -> WmResult<()> {
        let monitor = &self.monitors[self.selected_monitor];
        if !monitor.current_layout().has_arrange() {
            return Ok(());
        }
        let Some(selected) = monitor.selected_client else {
            return Ok(());
        };
        if self
            .clients
            .get(&selected)
            .map(|client| client.is_floating)
            .unwrap_or(true)
        {
            return Ok(());
        }

        let tiled = self.visible_tiled_windows(self.selected_monitor);
        let target = if tiled.first() == Some(&selected) {
            match tiled.get(1) {
                Some(&window) => window,
                None => return Ok(()),
            }
        } else {
            selected
        };

        let monitor = &mut self.monitors[self.selected_monitor];
        monitor.detach(target);
        monitor.attach(target);
        self.focus(Some(target))?;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn toggle_bar(&mut self) -> WmResult<()> {
        let monitor = &mut self.monitors[self.selected_monitor];
        let show = !monitor.show_bar;
        monitor.set_show_bar(show);
        self.apply_bar_geometry(self.selected_monitor)?;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn apply_bar_geometry(&mut self, monitor_index: usize) -> WmResult<()> {
        let extra_bar = self.config.extra_bar;
        let bar_height = self.bar_height;
        let monitor = &mut self.monitors[monitor_index];
        monitor.update_bar_position(bar_height, extra_bar);
        let (x, bar_y, extra_bar_y, width) = (
            monitor.screen_x as i16,
            monitor.bar_y as i16,
            monitor.extra_bar_y as i16,
            monitor.screen_width as u16,
        );
        if let Some(bar) = self.bars.get_mut(monitor_index) {
            bar.reposition(&self.connection, x, bar_y, extra_bar_y, width)?;
        }
        Ok(())
    }

    fn view(&mut self, mask: TagMask) -> WmResult<()> {
        let all_tags = self.config.all_tags_mask();
        if !self.monitors[self.selected_monitor].apply_view(mask, all_tags) {
            return Ok(());
        }
        self.after_view_change()
    }

    fn toggle_view(&mut self, mask: TagMask) -> WmResult<()> {
        let all_tags = self.config.all_tags_mask();
        if !self.monitors[self.selected_monitor].apply_toggle_view(mask, all_tags) {
            return Ok(());
        }
        self.after_view_change()
    }

    fn after_view_change(&mut self) -> WmResult<()> {
        let monitor = &self.monitors[self.selected_monitor];
        if monitor.pertag_wants_bar() != monitor.show_bar {
            let wanted = monitor.pertag_wants_bar();
            self.monitors[self.selected_monitor].show_bar = wanted;
            self.apply_bar_geometry(self.selected_monitor)?;
        }
        self.save_current_desktop()?;
        self.focus(None)?;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn tag_focused(&mut self, mask: TagMask) -> WmResult<()> {
        let Some(window) = self.focused_window() else {
            return Ok(());
        };
        let masked = mask & self.config.all_tags_mask();
        if masked == 0 {
            return Ok(());
        }
        if let Some(client) = self.clients.get_mut(&window) {
            client.tags = masked;
        }
        self.save_client_info(window)?;
        self.focus(None)?;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn toggle_tag_focused(&mut self, mask: TagMask) -> WmResult<()> {
        let Some(window) = self.focused_window() else {
            return Ok(());
        };
        let current = self.clients.get(&window).map(|c| c.tags).unwrap_or(0);
        let new_tags = current ^ (mask & self.config.all_tags_mask());
        // a client must keep at least one tag
        if new_tags == 0 {
            return Ok(());
        }
        if let Some(client) = self.clients.get_mut(&window) {
            client.tags = new_tags;
        }
        self.save_client_info(window)?;
        self.focus(None)?;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    /// Reveals or hides the scratchpad client; spawns it when none exists
    /// yet, leaving its pseudo-tag marked visible for the upcoming map.
    fn toggle_scratch(&mut self, index: usize) -> WmResult<()> {
        let mask = self.config.scratch_mask(index);

        let found = self.windows.iter().copied().find(|window| {
            self.clients
                .get(window)
                .is_some_and(|client| client.tags & mask != 0)
        });

        let Some(window) = found else {
            let monitor = &mut self.monitors[self.selected_monitor];
            monitor.tagset[monitor.selected_tags_index] |= mask;
            let command = self.config.scratchpads[index].command.clone();
            signal::spawn_detached(&command);
            return Ok(());
        };

        // A scratchpad living on another monitor follows the focus.
        let owner = self
            .clients
            .get(&window)
            .map(|client| client.monitor_index)
            .unwrap_or(self.selected_monitor);
        if owner != self.selected_monitor {
            self.monitors[owner].detach(window);
            self.monitors[owner].detach_stack(window);
            if self.monitors[owner].selected_client == Some(window) {
                self.monitors[owner].selected_client = None;
            }
            if let Some(client) = self.clients.get_mut(&window) {
                client.monitor_index = self.selected_monitor;
            }
            self.monitors[self.selected_monitor].attach(window);
            self.monitors[self.selected_monitor].attach_stack(window);
        }

        let monitor = &mut self.monitors[self.selected_monitor];
        let new_tagset = monitor.selected_tags() ^ mask;
        if new_tagset != 0 {
            monitor.tagset[monitor.selected_tags_index] = new_tagset;
        }
        self.focus(None)?;
        self.arrange(Some(self.selected_monitor))?;
        if self.is_visible(window) {
            self.focus(Some(window))?;
            self.restack()?;
        }
        Ok(())
    }

    fn set_layout(&mut self, layout: Option<LayoutKind>) -> WmResult<()> {
        let monitor = &mut self.monitors[self.selected_monitor];
        monitor.set_layout(layout);
        monitor.layout_symbol = monitor.current_layout().symbol().to_string();
        if monitor.selected_client.is_some() {
            self.arrange(Some(self.selected_monitor))?;
        } else {
            self.draw_bars()?;
        }
        Ok(())
    }

    fn toggle_floating(&mut self) -> WmResult<()> {
        let Some(window) = self.focused_window() else {
            return Ok(());
        };
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        if client.is_fullscreen && !client.is_fake_fullscreen {
            return Ok(());
        }

        let now_floating = !client.is_floating || client.is_fixed;
        let restore = (
            client.float_x,
            client.float_y,
            client.float_width,
            client.float_height,
        );

        if let Some(client) = self.clients.get_mut(&window) {
            client.is_floating = now_floating;
            if !now_floating {
                client.store_float_geometry();
            }
        }
        if now_floating {
            self.resize(window, restore.0, restore.1, restore.2, restore.3, false)?;
        }
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn toggle_fake_fullscreen(&mut self) -> WmResult<()> {
        let Some(window) = self.focused_window() else {
            return Ok(());
        };
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.is_fake_fullscreen = !client.is_fake_fullscreen;
        let fake = client.is_fake_fullscreen;
        let fullscreen = client.is_fullscreen;

        if fullscreen {
            if fake {
                // fall back into normal tiling geometry while the state
                // property stays set
                let (floating, border, x, y, width, height) = (
                    client.old_floating_state,
                    client.old_border_width,
                    client.old_x,
                    client.old_y,
                    client.old_width,
                    client.old_height,
                );
                client.is_floating = floating;
                client.border_width = border;
                self.resize_client(window, x, y, width, height)?;
                self.arrange(Some(self.selected_monitor))?;
            } else {
                client.old_floating_state = client.is_floating;
                client.old_border_width = client.border_width;
                client.border_width = 0;
                client.is_floating = true;
                let monitor_rect =
                    self.monitors[self.clients[&window].monitor_index].screen_rect();
                self.resize_client(
                    window,
                    monitor_rect.x,
                    monitor_rect.y,
                    monitor_rect.width,
                    monitor_rect.height,
                )?;
                self.connection.configure_window(
                    window,
                    &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
                )?;
            }
        }
        Ok(())
    }

    fn focus_monitor(&mut self, direction: i32) -> WmResult<()> {
        let Some(target) = self.adjacent_monitor(direction) else {
            return Ok(());
        };
        if let Some(selected) = self.focused_window() {
            self.unfocus(selected, false)?;
        }
        self.selected_monitor = target;
        self.focus(None)?;
        Ok(())
    }

    fn tag_monitor(&mut self, direction: i32) -> WmResult<()> {
        let Some(window) = self.focused_window() else {
            return Ok(());
        };
        let Some(target) = self.adjacent_monitor(direction) else {
            return Ok(());
        };
        self.send_to_monitor(window, target)?;
        Ok(())
    }

    fn adjacent_monitor(&self, direction: i32) -> Option<usize> {
        if self.monitors.len() <= 1 {
            return None;
        }
        let count = self.monitors.len();
        Some(if direction > 0 {
            (self.selected_monitor + 1) % count
        } else {
            (self.selected_monitor + count - 1) % count
        })
    }

    /// Moves a client onto another monitor, adopting that monitor's view.
    fn send_to_monitor(&mut self, window: Window, target: usize) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        if client.monitor_index == target {
            return Ok(());
        }

        self.unfocus(window, true)?;
        let source = self.clients[&window].monitor_index;
        self.monitors[source].detach(window);
        self.monitors[source].detach_stack(window);
        if self.monitors[source].selected_client == Some(window) {
            self.monitors[source].selected_client = None;
        }

        let target_tags = self.monitors[target].selected_tags();
        if let Some(client) = self.clients.get_mut(&window) {
            client.monitor_index = target;
            client.tags = target_tags;
        }
        self.monitors[target].attach(window);
        self.monitors[target].attach_stack(window);
        self.save_client_info(window)?;
        self.focus(None)?;
        self.arrange(None)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Focus & stacking
    // ------------------------------------------------------------------

    fn focused_window(&self) -> Option<Window> {
        self.monitors
            .get(self.selected_monitor)
            .and_then(|monitor| monitor.selected_client)
    }

    fn is_visible(&self, window: Window) -> bool {
        let Some(client) = self.clients.get(&window) else {
            return false;
        };
        let Some(monitor) = self.monitors.get(client.monitor_index) else {
            return false;
        };
        client.is_visible_on(monitor.selected_tags())
    }

    fn visible_windows_on(&self, monitor_index: usize) -> Vec<Window> {
        let Some(monitor) = self.monitors.get(monitor_index) else {
            return Vec::new();
        };
        let view = monitor.selected_tags();
        monitor
            .clients
            .iter()
            .copied()
            .filter(|window| {
                self.clients
                    .get(window)
                    .is_some_and(|client| client.is_visible_on(view))
            })
            .collect()
    }

    fn visible_tiled_windows(&self, monitor_index: usize) -> Vec<Window> {
        let Some(monitor) = self.monitors.get(monitor_index) else {
            return Vec::new();
        };
        let view = monitor.selected_tags();
        monitor
            .clients
            .iter()
            .copied()
            .filter(|window| {
                self.clients
                    .get(window)
                    .is_some_and(|client| client.is_visible_on(view) && !client.is_floating)
            })
            .collect()
    }

    fn monitor_at_point(&self, x: i32, y: i32) -> Option<usize> {
        self.monitors
            .iter()
            .position(|monitor| monitor.contains_point(x, y))
    }

    fn focus(&mut self, window: Option<Window>) -> WmResult<()> {
        let mut target = window.filter(|&w| self.is_visible(w));
        if target.is_none() {
            let monitor = &self.monitors[self.selected_monitor];
            target = monitor
                .stack
                .iter()
                .copied()
                .find(|&w| self.is_visible(w));
        }

        let previous = self.focused_window();
        if let Some(previous_window) = previous
            && previous != target
        {
            self.unfocus(previous_window, false)?;
        }

        if let Some(focus_window) = target {
            let monitor_index = self
                .clients
                .get(&focus_window)
                .map(|client| client.monitor_index)
                .unwrap_or(self.selected_monitor);
            if monitor_index != self.selected_monitor {
                self.selected_monitor = monitor_index;
            }

            if self
                .clients
                .get(&focus_window)
                .is_some_and(|client| client.is_urgent)
            {
                self.set_urgent(focus_window, false)?;
            }

            self.monitors[monitor_index].promote_in_stack(focus_window);
            self.grab_buttons(focus_window, true)?;
            self.connection.change_window_attributes(
                focus_window,
                &ChangeWindowAttributesAux::new()
                    .border_pixel(self.config.scheme_selected.border),
            )?;
            self.set_input_focus(focus_window)?;
            self.monitors[self.selected_monitor].selected_client = Some(focus_window);
        } else {
            // Nothing focusable: park the input focus on the bar.
            let bar_window = self
                .bars
                .get(self.selected_monitor)
                .map(|bar| bar.window())
                .unwrap_or(self.root);
            self.connection.set_input_focus(
                InputFocus::POINTER_ROOT,
                bar_window,
                x11rb::CURRENT_TIME,
            )?;
            self.connection
                .delete_property(self.root, self.atoms.net_active_window)?;
            self.monitors[self.selected_monitor].selected_client = None;
        }

        self.draw_bars()?;
        self.connection.flush()?;
        Ok(())
    }

    fn unfocus(&mut self, window: Window, reset_input_focus: bool) -> WmResult<()> {
        if !self.clients.contains_key(&window) {
            return Ok(());
        }
        self.grab_buttons(window, false)?;
        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(self.config.scheme_normal.border),
        )?;
        if reset_input_focus {
            self.connection.set_input_focus(
                InputFocus::POINTER_ROOT,
                self.root,
                x11rb::CURRENT_TIME,
            )?;
            self.connection
                .delete_property(self.root, self.atoms.net_active_window)?;
        }
        Ok(())
    }

    fn set_input_focus(&self, window: Window) -> WmResult<()> {
        let never_focus = self
            .clients
            .get(&window)
            .map(|client| client.never_focus)
            .unwrap_or(false);
        if !never_focus {
            self.connection
                .set_input_focus(InputFocus::POINTER_ROOT, window, x11rb::CURRENT_TIME)?;
            self.connection.change_property(
                PropMode::REPLACE,
                self.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                32,
                1,
                &window.to_ne_bytes(),
            )?;
        }
        let _ = self.send_protocol_event(window, self.atoms.wm_take_focus);
        Ok(())
    }

    fn restack(&mut self) -> WmResult<()> {
        self.restack_monitor(self.selected_monitor)
    }

    /// Raises the selected client when it floats (or nothing is arranged),
    /// otherwise re-stacks the visible tiled clients directly below the bar
    /// in focus-history order.
    fn restack_monitor(&mut self, monitor_index: usize) -> WmResult<()> {
        self.draw_bars()?;

        let monitor = &self.monitors[monitor_index];
        let Some(selected) = monitor.selected_client else {
            return Ok(());
        };
        let layout_has_arrange = monitor.current_layout().has_arrange();
        let selected_floating = self
            .clients
            .get(&selected)
            .map(|client| client.is_floating)
            .unwrap_or(false);

        if selected_floating || !layout_has_arrange {
            self.connection.configure_window(
                selected,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
        }

        if layout_has_arrange {
            let view = monitor.selected_tags();
            let stack = monitor.stack.clone();
            let mut sibling = self.bars.get(monitor_index).map(|bar| bar.window());
            for window in stack {
                let Some(client) = self.clients.get(&window) else {
                    continue;
                };
                if client.is_floating || !client.is_visible_on(view) {
                    continue;
                }
                let mut aux = ConfigureWindowAux::new().stack_mode(StackMode::BELOW);
                if let Some(above) = sibling {
                    aux = aux.sibling(above);
                }
                self.connection.configure_window(window, &aux)?;
                sibling = Some(window);
            }
        }
        self.connection.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Geometry & layout application
    // ------------------------------------------------------------------

    fn arrange(&mut self, monitor: Option<usize>) -> WmResult<()> {
        match monitor {
            Some(monitor_index) => {
                self.show_hide(monitor_index)?;
                self.arrange_monitor(monitor_index)?;
                self.restack_monitor(monitor_index)?;
            }
            None => {
                for monitor_index in 0..self.monitors.len() {
                    self.show_hide(monitor_index)?;
                }
                for monitor_index in 0..self.monitors.len() {
                    self.arrange_monitor(monitor_index)?;
                }
                self.draw_bars()?;
            }
        }
        self.connection.flush()?;
        Ok(())
    }

    /// Visible clients slide into place top of stack first; hidden ones are
    /// parked off-screen bottom-up so they never flash over visible ones.
    fn show_hide(&mut self, monitor_index: usize) -> WmResult<()> {
        let stack = self.monitors[monitor_index].stack.clone();
        let view = self.monitors[monitor_index].selected_tags();
        let layout_floating = !self.monitors[monitor_index].current_layout().has_arrange();

        for &window in &stack {
            let Some(client) = self.clients.get(&window) else {
                continue;
            };
            if !client.is_visible_on(view) {
                continue;
            }
            self.connection.configure_window(
                window,
                &ConfigureWindowAux::new().x(client.x).y(client.y),
            )?;
            let (x, y, width, height) = (client.x, client.y, client.width, client.height);
            if (layout_floating || client.is_floating) && !client.is_fullscreen {
                self.resize(window, x, y, width, height, false)?;
            }
        }

        for &window in stack.iter().rev() {
            let Some(client) = self.clients.get(&window) else {
                continue;
            };
            if client.is_visible_on(view) {
                continue;
            }
            self.connection.configure_window(
                window,
                &ConfigureWindowAux::new()
                    .x(client.width_with_border() * -2)
                    .y(client.y),
            )?;
        }
        Ok(())
    }

    fn arrange_monitor(&mut self, monitor_index: usize) -> WmResult<()> {
        let visible_count = self.visible_windows_on(monitor_index).len();
        let tiled = self.visible_tiled_windows(monitor_index);

        let monitor = &mut self.monitors[monitor_index];
        let layout = monitor.current_layout();
        monitor.layout_symbol = layout.symbol_for_count(visible_count);

        let area = monitor.window_area();
        let num_master = monitor.num_master;
        let master_factor = monitor.master_factor;

        let Some(rects) = layout.arrange(area, tiled.len(), num_master, master_factor) else {
            return Ok(());
        };

        for (window, rect) in tiled.iter().zip(rects) {
            let border = self
                .clients
                .get(window)
                .map(|client| client.border_width)
                .unwrap_or(0);
            self.resize(
                *window,
                rect.x,
                rect.y,
                rect.width - 2 * border,
                rect.height - 2 * border,
                false,
            )?;
        }
        Ok(())
    }

    fn resize(
        &mut self,
        window: Window,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        interact: bool,
    ) -> WmResult<()> {
        let (x, y, width, height, changed) =
            self.apply_size_hints(window, x, y, width, height, interact)?;
        if changed {
            self.resize_client(window, x, y, width, height)?;
        }
        Ok(())
    }

    /// Clamps a proposed geometry: on-screen position first (against the
    /// whole screen when interactive, the usable area otherwise), then the
    /// bar-height minimum, then the WM_NORMAL_HINTS pipeline for floating or
    /// unarranged clients, or globally when configured.
    fn apply_size_hints(
        &mut self,
        window: Window,
        mut x: i32,
        mut y: i32,
        mut width: i32,
        mut height: i32,
        interact: bool,
    ) -> WmResult<(i32, i32, i32, i32, bool)> {
        let Some(client) = self.clients.get(&window) else {
            return Ok((x, y, width, height, false));
        };

        width = width.max(1);
        height = height.max(1);

        let border = client.border_width;
        let outer_width = client.width_with_border();
        let outer_height = client.height_with_border();

        if interact {
            let screen_width = self.screen.width_in_pixels as i32;
            let screen_height = self.screen.height_in_pixels as i32;
            if x > screen_width {
                x = screen_width - outer_width;
            }
            if y > screen_height {
                y = screen_height - outer_height;
            }
            if x + width + 2 * border < 0 {
                x = 0;
            }
            if y + height + 2 * border < 0 {
                y = 0;
            }
        } else {
            let area = self.monitors[client.monitor_index].window_area();
            if x >= area.x + area.width {
                x = area.x + area.width - outer_width;
            }
            if y >= area.y + area.height {
                y = area.y + area.height - outer_height;
            }
            if x + width + 2 * border <= area.x {
                x = area.x;
            }
            if y + height + 2 * border <= area.y {
                y = area.y;
            }
        }

        if height < self.bar_height {
            height = self.bar_height;
        }
        if width < self.bar_height {
            width = self.bar_height;
        }

        let monitor_layout = self.monitors[client.monitor_index].current_layout();
        let needs_hints = self.config.respect_resize_hints
            || client.is_floating
            || !monitor_layout.has_arrange();

        if needs_hints {
            if !self.clients[&window].hints_valid {
                self.update_size_hints(window)?;
            }
            let client = &self.clients[&window];
            if client.hints_valid {
                let (hinted_width, hinted_height) = client.clamp_to_hints(width, height);
                width = hinted_width;
                height = hinted_height;
            }
        }

        let client = &self.clients[&window];
        let changed =
            x != client.x || y != client.y || width != client.width || height != client.height;
        Ok((x, y, width, height, changed))
    }

    fn resize_client(
        &mut self,
        window: Window,
        x: i32,
        y: i32,
        mut width: i32,
        mut height: i32,
    ) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let monitor_index = client.monitor_index;
        let layout = self.monitors[monitor_index].current_layout();

        // The lone tiled client and every monocle cell fill the full
        // rectangle with the border suppressed.
        let suppress_border = !client.is_floating
            && !client.is_fullscreen
            && layout.has_arrange()
            && (layout == LayoutKind::Monocle
                || self.visible_tiled_windows(monitor_index).len() == 1);

        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        let mut border_width = client.border_width;
        if suppress_border {
            width += 2 * client.border_width;
            height += 2 * client.border_width;
            border_width = 0;
        }

        client.old_x = client.x;
        client.old_y = client.y;
        client.old_width = client.width;
        client.old_height = client.height;
        client.x = x;
        client.y = y;
        client.width = width;
        client.height = height;

        self.connection.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(x)
                .y(y)
                .width(width as u32)
                .height(height as u32)
                .border_width(border_width as u32),
        )?;
        self.send_configure_notify(window)?;
        self.connection.flush()?;
        Ok(())
    }

    fn set_fullscreen(&mut self, window: Window, fullscreen: bool) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let monitor_index = client.monitor_index;

        if fullscreen && !client.is_fullscreen {
            self.connection.change_property(
                PropMode::REPLACE,
                window,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                32,
                1,
                &self.atoms.net_wm_state_fullscreen.to_ne_bytes(),
            )?;
            let Some(client) = self.clients.get_mut(&window) else {
                return Ok(());
            };
            client.is_fullscreen = true;
            if client.is_fake_fullscreen {
                // stays inside the tiling geometry; just resync
                let (x, y, width, height) = (client.x, client.y, client.width, client.height);
                self.resize_client(window, x, y, width, height)?;
                return Ok(());
            }
            client.old_floating_state = client.is_floating;
            client.old_border_width = client.border_width;
            client.border_width = 0;
            client.is_floating = true;
            let monitor_rect = self.monitors[monitor_index].screen_rect();
            self.resize_client(
                window,
                monitor_rect.x,
                monitor_rect.y,
                monitor_rect.width,
                monitor_rect.height,
            )?;
            self.connection.configure_window(
                window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
        } else if !fullscreen && client.is_fullscreen {
            self.connection.change_property(
                PropMode::REPLACE,
                window,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                32,
                0,
                &[],
            )?;
            let Some(client) = self.clients.get_mut(&window) else {
                return Ok(());
            };
            client.is_fullscreen = false;
            if client.is_fake_fullscreen {
                self.arrange(Some(monitor_index))?;
                return Ok(());
            }
            client.is_floating = client.old_floating_state;
            client.border_width = client.old_border_width;
            let (x, y, width, height) = (
                client.old_x,
                client.old_y,
                client.old_width,
                client.old_height,
            );
            self.resize_client(window, x, y, width, height)?;
            self.arrange(Some(monitor_index))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Client lifecycle
    // ------------------------------------------------------------------

    fn scan_existing_windows(&mut self) -> WmResult<()> {
        let tree = self.connection.query_tree(self.root)?.reply()?;
        let mut transients = Vec::new();

        for &window in &tree.children {
            if self.bars.iter().any(|bar| bar.owns_window(window)) {
                continue;
            }
            let Ok(attributes) = self.connection.get_window_attributes(window)?.reply() else {
                continue;
            };
            if attributes.override_redirect {
                continue;
            }
            if self.get_transient_parent(window).is_some() {
                transients.push(window);
                continue;
            }
            if attributes.map_state == MapState::VIEWABLE || self.is_iconic(window)? {
                self.manage_window(window)?;
            }
        }

        // Transients manage after their parents so tag inheritance works.
        for window in transients {
            let Ok(attributes) = self.connection.get_window_attributes(window)?.reply() else {
                continue;
            };
            if attributes.map_state == MapState::VIEWABLE || self.is_iconic(window)? {
                self.manage_window(window)?;
            }
        }
        Ok(())
    }

    fn is_iconic(&self, window: Window) -> WmResult<bool> {
        let reply = self
            .connection
            .get_property(false, window, self.atoms.wm_state, AtomEnum::ANY, 0, 2)?
            .reply();
        Ok(reply.is_ok_and(|prop| {
            prop.value
                .get(..4)
                .map(|bytes| u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == 3)
                .unwrap_or(false)
        }))
    }

    fn manage_window(&mut self, window: Window) -> WmResult<()> {
        let geometry = self.connection.get_geometry(window)?.reply()?;

        let transient_parent = self.get_transient_parent(window);
        let is_transient = transient_parent.is_some();

        let (mut monitor_index, mut tags) = match transient_parent
            .and_then(|parent| self.clients.get(&parent))
        {
            Some(parent_client) => (parent_client.monitor_index, parent_client.tags),
            None => (
                self.selected_monitor,
                self.monitors[self.selected_monitor].selected_tags(),
            ),
        };

        let mut client = Client::new(window, monitor_index, tags);
        client.x = geometry.x as i32;
        client.y = geometry.y as i32;
        client.width = geometry.width as i32;
        client.height = geometry.height as i32;
        client.old_x = client.x;
        client.old_y = client.y;
        client.old_width = client.width;
        client.old_height = client.height;
        client.old_border_width = geometry.border_width as i32;
        client.border_width = self.config.border_width as i32;
        client.store_float_geometry();
        self.clients.insert(window, client);

        self.update_window_title(window)?;
        let (instance, class) = self.get_window_class_instance(window);
        let title = self.clients[&window].name.clone();

        if !is_transient {
            let outcome =
                crate::resolve_rules(&self.config.window_rules, &class, &instance, &title);
            if outcome.tags != 0 {
                tags = outcome.tags & self.config.all_tags_mask();
            }
            if let Some(rule_monitor) = outcome.monitor
                && rule_monitor < self.monitors.len()
            {
                monitor_index = rule_monitor;
            }
            if let Some(client) = self.clients.get_mut(&window) {
                client.is_floating = outcome.is_floating;
                client.is_fake_fullscreen = outcome.is_fake_fullscreen;
            }
        }

        // A restarted manager re-adopts the previous tags and monitor.
        if let Some((saved_tags, saved_monitor)) = self.read_saved_client_info(window)? {
            tags = saved_tags;
            if (saved_monitor as usize) < self.monitors.len() {
                monitor_index = saved_monitor as usize;
            }
        }

        // Scratchpad windows claim their reserved pseudo-tag and float
        // centered on the monitor.
        if let Some(scratch_index) = self.config.scratchpad_for_window(&instance, &title) {
            let mask = self.config.scratch_mask(scratch_index);
            tags = mask;
            let monitor = &mut self.monitors[monitor_index];
            monitor.tagset[monitor.selected_tags_index] |= mask;
            let area = monitor.window_area();
            if let Some(client) = self.clients.get_mut(&window) {
                client.is_floating = true;
                client.x = area.x + (area.width - client.width_with_border()) / 2;
                client.y = area.y + (area.height - client.height_with_border()) / 2;
            }
        }

        let valid_mask = self.config.all_tags_mask() | self.config.scratch_tags_mask();
        if tags & valid_mask == 0 {
            tags = self.monitors[monitor_index].selected_tags();
        }
        if let Some(client) = self.clients.get_mut(&window) {
            client.tags = tags & valid_mask;
            client.monitor_index = monitor_index;
        }

        // Keep the initial geometry inside the usable area.
        let area = self.monitors[monitor_index].window_area();
        if let Some(client) = self.clients.get_mut(&window) {
            if client.x + client.width_with_border() > area.x + area.width {
                client.x = area.x + area.width - client.width_with_border();
            }
            if client.y + client.height_with_border() > area.y + area.height {
                client.y = area.y + area.height - client.height_with_border();
            }
            client.x = client.x.max(area.x);
            client.y = client.y.max(area.y);
            client.store_float_geometry();
        }

        self.connection.configure_window(
            window,
            &ConfigureWindowAux::new().border_width(self.config.border_width),
        )?;
        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(self.config.scheme_normal.border),
        )?;
        self.send_configure_notify(window)?;

        self.update_window_type(window)?;
        self.update_size_hints(window)?;
        self.update_wm_hints(window)?;
        self.update_window_icon(window)?;

        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::ENTER_WINDOW
                    | EventMask::FOCUS_CHANGE
                    | EventMask::PROPERTY_CHANGE
                    | EventMask::STRUCTURE_NOTIFY,
            ),
        )?;
        self.grab_buttons(window, false)?;

        let is_fixed = self.clients[&window].is_fixed;
        if let Some(client) = self.clients.get_mut(&window)
            && !client.is_floating
        {
            client.is_floating = is_transient || is_fixed;
            client.old_floating_state = client.is_floating;
        }
        if self.clients[&window].is_floating {
            self.connection.configure_window(
                window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
        }

        self.monitors[monitor_index].attach(window);
        self.monitors[monitor_index].attach_stack(window);
        self.windows.push(window);
        self.update_client_list()?;

        // Map far off-screen first; arrange slides it into place without a
        // visible jump.
        let (x, y, width, height) = {
            let client = &self.clients[&window];
            (client.x, client.y, client.width, client.height)
        };
        self.connection.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(x + 2 * self.screen.width_in_pixels as i32)
                .y(y)
                .width(width as u32)
                .height(height as u32),
        )?;
        self.set_wm_state(window, NORMAL_STATE)?;
        self.save_client_info(window)?;

        if monitor_index == self.selected_monitor
            && let Some(previous) = self.focused_window()
        {
            self.unfocus(previous, false)?;
        }
        self.monitors[monitor_index].selected_client = Some(window);
        self.arrange(Some(monitor_index))?;
        self.connection.map_window(window)?;
        self.focus(None)?;
        Ok(())
    }

    fn unmanage_window(&mut self, window: Window, destroyed: bool) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let monitor_index = client.monitor_index;
        let old_border_width = client.old_border_width;

        self.monitors[monitor_index].detach(window);
        self.monitors[monitor_index].detach_stack(window);
        if self.monitors[monitor_index].selected_client == Some(window) {
            self.monitors[monitor_index].selected_client = None;
        }

        if !destroyed {
            // Everything in this scope races with the window's destruction;
            // reply errors are expected and swallowed.
            if let Ok(cookie) = self.connection.configure_window(
                window,
                &ConfigureWindowAux::new().border_width(old_border_width as u32),
            ) && let Err(error) = cookie.check()
            {
                debug!("unmanage raced with destruction: {error}");
            }
            let _ = self
                .connection
                .ungrab_button(ButtonIndex::ANY, window, ModMask::ANY);
            let _ = self.set_wm_state(window, WITHDRAWN_STATE);
        }

        self.clients.remove(&window);
        self.windows.retain(|&w| w != window);
        self.update_client_list()?;
        self.focus(None)?;
        self.arrange(Some(monitor_index))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Modal interactions
    // ------------------------------------------------------------------

    fn begin_move(&mut self, window: Window) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        if client.is_fullscreen && !client.is_fake_fullscreen {
            return Ok(());
        }
        let original_x = client.x;
        let original_y = client.y;

        self.restack()?;
        let grab = self
            .connection
            .grab_pointer(
                false,
                self.root,
                EventMask::POINTER_MOTION | EventMask::BUTTON_RELEASE | EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        if grab.status != GrabStatus::SUCCESS {
            return Ok(());
        }

        let pointer = self.connection.query_pointer(self.root)?.reply()?;
        self.modal = Some(ModalInteraction::Move(MoveState {
            window,
            start_root_x: pointer.root_x as i32,
            start_root_y: pointer.root_y as i32,
            original_x,
            original_y,
            last_motion_time: 0,
        }));
        Ok(())
    }

    fn handle_move_event(&mut self, mut state: MoveState, event: Event) -> WmResult<()> {
        match event {
            Event::MotionNotify(motion) => {
                if motion.time.wrapping_sub(state.last_motion_time) <= MOTION_INTERVAL_MS {
                    self.modal = Some(ModalInteraction::Move(state));
                    return Ok(());
                }
                state.last_motion_time = motion.time;

                let Some(client) = self.clients.get(&state.window) else {
                    self.finish_pointer_grab()?;
                    return Ok(());
                };
                let monitor = &self.monitors[client.monitor_index];
                let area = monitor.window_area();
                let snap = self.config.snap;
                let outer_width = client.width_with_border();
                let outer_height = client.height_with_border();
                let (width, height) = (client.width, client.height);
                let was_floating = client.is_floating;
                let layout_has_arrange = monitor.current_layout().has_arrange();

                let mut new_x = state.original_x + (motion.root_x as i32 - state.start_root_x);
                let mut new_y = state.original_y + (motion.root_y as i32 - state.start_root_y);

                if (area.x - new_x).abs() < snap {
                    new_x = area.x;
                } else if ((area.x + area.width) - (new_x + outer_width)).abs() < snap {
                    new_x = area.x + area.width - outer_width;
                }
                if (area.y - new_y).abs() < snap {
                    new_y = area.y;
                } else if ((area.y + area.height) - (new_y + outer_height)).abs() < snap {
                    new_y = area.y + area.height - outer_height;
                }

                // Dragging a tiled window past the snap threshold promotes
                // it to floating.
                if !was_floating
                    && layout_has_arrange
                    && ((new_x - state.original_x).abs() > snap
                        || (new_y - state.original_y).abs() > snap)
                {
                    self.toggle_floating()?;
                }

                let now_floating = self
                    .clients
                    .get(&state.window)
                    .map(|client| client.is_floating)
                    .unwrap_or(false);
                if now_floating || !layout_has_arrange {
                    self.resize(state.window, new_x, new_y, width, height, true)?;
                }
                self.modal = Some(ModalInteraction::Move(state));
            }
            Event::ButtonRelease(_) => {
                self.finish_pointer_grab()?;
                self.migrate_after_drag(state.window)?;
            }
            _ => {
                self.modal = Some(ModalInteraction::Move(state));
            }
        }
        Ok(())
    }

    fn begin_resize(&mut self, window: Window) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        if client.is_fullscreen && !client.is_fake_fullscreen {
            return Ok(());
        }
        let original_x = client.x;
        let original_y = client.y;
        let warp_x = (client.width + client.border_width - 1) as i16;
        let warp_y = (client.height + client.border_width - 1) as i16;

        self.restack()?;
        let grab = self
            .connection
            .grab_pointer(
                false,
                self.root,
                EventMask::POINTER_MOTION | EventMask::BUTTON_RELEASE | EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        if grab.status != GrabStatus::SUCCESS {
            return Ok(());
        }
        self.connection
            .warp_pointer(x11rb::NONE, window, 0, 0, 0, 0, warp_x, warp_y)?;

        self.modal = Some(ModalInteraction::Resize(ResizeState {
            window,
            original_x,
            original_y,
            last_motion_time: 0,
        }));
        Ok(())
    }

    fn handle_resize_event(&mut self, mut state: ResizeState, event: Event) -> WmResult<()> {
        match event {
            Event::MotionNotify(motion) => {
                if motion.time.wrapping_sub(state.last_motion_time) <= MOTION_INTERVAL_MS {
                    self.modal = Some(ModalInteraction::Resize(state));
                    return Ok(());
                }
                state.last_motion_time = motion.time;

                let Some(client) = self.clients.get(&state.window) else {
                    self.finish_pointer_grab()?;
                    return Ok(());
                };
                let border = client.border_width;
                let snap = self.config.snap;
                let was_floating = client.is_floating;
                let (old_width, old_height) = (client.width, client.height);
                let layout_has_arrange = self.monitors[client.monitor_index]
                    .current_layout()
                    .has_arrange();

                let new_width =
                    (motion.root_x as i32 - state.original_x - 2 * border + 1).max(1);
                let new_height =
                    (motion.root_y as i32 - state.original_y - 2 * border + 1).max(1);

                if !was_floating
                    && layout_has_arrange
                    && ((new_width - old_width).abs() > snap
                        || (new_height - old_height).abs() > snap)
                {
                    self.toggle_floating()?;
                }

                let now_floating = self
                    .clients
                    .get(&state.window)
                    .map(|client| client.is_floating)
                    .unwrap_or(false);
                if now_floating || !layout_has_arrange {
                    self.resize(
                        state.window,
                        state.original_x,
                        state.original_y,
                        new_width,
                        new_height,
                        true,
                    )?;
                }
                self.modal = Some(ModalInteraction::Resize(state));
            }
            Event::ButtonRelease(_) => {
                self.finish_pointer_grab()?;
                self.migrate_after_drag(state.window)?;
            }
            _ => {
                self.modal = Some(ModalInteraction::Resize(state));
            }
        }
        Ok(())
    }

    fn finish_pointer_grab(&mut self) -> WmResult<()> {
        self.connection.ungrab_pointer(x11rb::CURRENT_TIME)?;
        self.connection.flush()?;
        Ok(())
    }

    /// After a drag the window belongs to whichever monitor its centroid
    /// landed on.
    fn migrate_after_drag(&mut self, window: Window) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let center_x = client.x + client.width_with_border() / 2;
        let center_y = client.y + client.height_with_border() / 2;
        let current = client.monitor_index;

        if let Some(target) = self.monitor_at_point(center_x, center_y)
            && target != current
        {
            self.send_to_monitor(window, target)?;
            self.selected_monitor = target;
            self.focus(Some(window))?;
        }
        Ok(())
    }

    fn begin_alt_tab(&mut self, direction: i32) -> WmResult<()> {
        if self.windows.is_empty() {
            return Ok(());
        }

        // Reveal everything everywhere while the switcher is held open.
        let all_tags = self.config.all_tags_mask();
        let mut saved_views = Vec::with_capacity(self.monitors.len());
        for monitor in &mut self.monitors {
            saved_views.push(monitor.selected_tags());
            monitor.tagset[monitor.selected_tags_index] = all_tags;
        }
        self.arrange(None)?;
        self.focus_next(direction)?;

        let mut keyboard_grabbed = false;
        for _ in 0..KEYBOARD_GRAB_RETRIES {
            let reply = self
                .connection
                .grab_keyboard(
                    true,
                    self.root,
                    x11rb::CURRENT_TIME,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )?
                .reply()?;
            if reply.status == GrabStatus::SUCCESS {
                keyboard_grabbed = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        if !keyboard_grabbed {
            warn!("could not grab the keyboard for alt-tab");
            self.end_alt_tab(AltTabState {
                saved_views,
                direction,
            })?;
            return Ok(());
        }
        let _ = self
            .connection
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )?
            .reply();

        self.modal = Some(ModalInteraction::AltTab(AltTabState {
            saved_views,
            direction,
        }));
        Ok(())
    }

    fn handle_alt_tab_event(&mut self, state: AltTabState, event: Event) -> WmResult<()> {
        let keysym_of = |mapping: &Option<keyboard::KeyboardMapping>, detail: u8| {
            mapping
                .as_ref()
                .map(|m| m.keycode_to_keysym(detail))
                .unwrap_or(0)
        };

        match event {
            Event::KeyPress(key_event) => {
                let keysym = keysym_of(&self.keyboard_mapping, key_event.detail);
                match keysym {
                    keyboard::keysyms::XK_TAB => self.focus_next(state.direction)?,
                    keyboard::keysyms::XK_LEFT => self.focus_direction(0)?,
                    keyboard::keysyms::XK_RIGHT => self.focus_direction(1)?,
                    keyboard::keysyms::XK_UP => self.focus_direction(2)?,
                    keyboard::keysyms::XK_DOWN => self.focus_direction(3)?,
                    _ => {}
                }
                self.modal = Some(ModalInteraction::AltTab(state));
            }
            Event::KeyRelease(key_event) => {
                let keysym = keysym_of(&self.keyboard_mapping, key_event.detail);
                if keysym == self.config.alt_tab_modifier {
                    self.end_alt_tab(state)?;
                } else {
                    self.modal = Some(ModalInteraction::AltTab(state));
                }
            }
            _ => {
                self.modal = Some(ModalInteraction::AltTab(state));
            }
        }
        Ok(())
    }

    fn end_alt_tab(&mut self, state: AltTabState) -> WmResult<()> {
        self.connection.ungrab_keyboard(x11rb::CURRENT_TIME)?;
        self.connection.ungrab_pointer(x11rb::CURRENT_TIME)?;

        let kept = self.focused_window();
        for (monitor, saved) in self.monitors.iter_mut().zip(state.saved_views) {
            monitor.tagset[monitor.selected_tags_index] = saved;
        }
        self.arrange(None)?;
        // falls back to the view's own stack when the choice is hidden again
        self.focus(kept)?;
        self.restack()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Monitors
    // ------------------------------------------------------------------

    /// Re-reads the output topology. Clients of removed monitors migrate to
    /// the first monitor; they are never dropped.
    fn update_monitor_geometry(&mut self) -> WmResult<bool> {
        let geometries = detect_monitor_geometries(&self.connection, &self.screen)?;
        let mut dirty = geometries.len() != self.monitors.len();

        while self.monitors.len() < geometries.len() {
            let index = self.monitors.len();
            let mut monitor = Monitor::new(
                index,
                geometries[index],
                self.config.layouts,
                self.config.master_factor,
                self.config.num_master,
                self.config.show_bar,
                self.config.top_bar,
                self.config.tags.len(),
            );
            monitor.update_bar_position(self.bar_height, self.config.extra_bar);
            let bar = Bar::new(
                &self.connection,
                &self.screen,
                self.screen_number,
                &self.config,
                self.display,
                &self.font,
                monitor.screen_x as i16,
                monitor.bar_y as i16,
                monitor.extra_bar_y as i16,
                monitor.screen_width as u16,
            )?;
            self.monitors.push(monitor);
            self.bars.push(bar);
        }

        if geometries.len() < self.monitors.len() {
            for dead_index in geometries.len()..self.monitors.len() {
                let orphans = self.monitors[dead_index].clients.clone();
                for window in orphans {
                    self.monitors[dead_index].detach(window);
                    self.monitors[dead_index].detach_stack(window);
                    if let Some(client) = self.clients.get_mut(&window) {
                        client.monitor_index = 0;
                    }
                    self.monitors[0].attach(window);
                    self.monitors[0].attach_stack(window);
                }
            }
            for bar in self.bars.drain(geometries.len()..) {
                self.connection.destroy_window(bar.window())?;
                if let Some(extra) = bar.extra_window() {
                    self.connection.destroy_window(extra)?;
                }
            }
            self.monitors.truncate(geometries.len());
            if self.selected_monitor >= self.monitors.len() {
                self.selected_monitor = 0;
            }
        }

        for (index, geometry) in geometries.iter().enumerate() {
            if self.monitors[index].screen_rect() != *geometry {
                dirty = true;
                self.monitors[index].set_geometry(*geometry);
            }
            self.apply_bar_geometry(index)?;
        }

        Ok(dirty)
    }

    // ------------------------------------------------------------------
    // Properties & EWMH
    // ------------------------------------------------------------------

    fn update_status(&mut self) -> WmResult<()> {
        let reply = self
            .connection
            .get_property(false, self.root, self.atoms.wm_name, AtomEnum::ANY, 0, 1024)?
            .reply();

        self.status = match reply {
            Ok(prop) if !prop.value.is_empty() => status::parse_status(&prop.value),
            _ => StatusText {
                segments: vec![StatusSegment {
                    text: concat!("tatami-", env!("CARGO_PKG_VERSION")).to_string(),
                    signal: None,
                }],
                extra: String::new(),
            },
        };
        self.draw_bars()?;
        Ok(())
    }

    fn update_window_title(&mut self, window: Window) -> WmResult<()> {
        let net_name = self
            .connection
            .get_property(
                false,
                window,
                self.atoms.net_wm_name,
                self.atoms.utf8_string,
                0,
                256,
            )
            .ok()
            .and_then(|cookie| cookie.reply().ok());

        if let Some(name) = net_name
            && !name.value.is_empty()
            && let Ok(title) = String::from_utf8(name.value.clone())
            && let Some(client) = self.clients.get_mut(&window)
        {
            client.name = title;
            return Ok(());
        }

        let wm_name = self
            .connection
            .get_property(false, window, self.atoms.wm_name, AtomEnum::STRING, 0, 256)?
            .reply();

        if let Ok(name) = wm_name
            && !name.value.is_empty()
            && let Ok(title) = String::from_utf8(name.value.clone())
            && let Some(client) = self.clients.get_mut(&window)
        {
            client.name = title;
        }
        Ok(())
    }

    fn update_window_icon(&mut self, window: Window) -> WmResult<()> {
        let reply = self
            .connection
            .get_property(
                false,
                window,
                self.atoms.net_wm_icon,
                AtomEnum::CARDINAL,
                0,
                1 << 22,
            )?
            .reply();

        let icon = match reply {
            Ok(prop) if prop.format == 32 && !prop.value.is_empty() => {
                let cardinals: Vec<u32> = prop
                    .value
                    .chunks_exact(4)
                    .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect();
                icon::extract_icon(&cardinals, self.config.icon_size)
            }
            _ => None,
        };

        if let Some(client) = self.clients.get_mut(&window) {
            client.icon = icon;
        }
        Ok(())
    }

    fn update_window_type(&mut self, window: Window) -> WmResult<()> {
        if let Some(state_atom) = self.get_atom_property(window, self.atoms.net_wm_state)?
            && state_atom == self.atoms.net_wm_state_fullscreen
        {
            self.set_fullscreen(window, true)?;
        }
        if let Some(type_atom) = self.get_atom_property(window, self.atoms.net_wm_window_type)?
            && type_atom == self.atoms.net_wm_window_type_dialog
            && let Some(client) = self.clients.get_mut(&window)
        {
            client.is_floating = true;
        }
        Ok(())
    }

    fn update_wm_hints(&mut self, window: Window) -> WmResult<()> {
        const URGENCY_HINT: u32 = 1 << 8;
        const INPUT_HINT: u32 = 1;

        let hints_reply = self
            .connection
            .get_property(false, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 0, 9)?
            .reply();

        let Ok(hints) = hints_reply else {
            return Ok(());
        };
        if hints.value.len() < 4 {
            return Ok(());
        }

        let flags = u32::from_ne_bytes([
            hints.value[0],
            hints.value[1],
            hints.value[2],
            hints.value[3],
        ]);

        if Some(window) == self.focused_window() && flags & URGENCY_HINT != 0 {
            // The focused client is never urgent; clear the hint at the
            // source.
            let mut new_hints = hints.value.clone();
            new_hints[0..4].copy_from_slice(&(flags & !URGENCY_HINT).to_ne_bytes());
            self.connection.change_property(
                PropMode::REPLACE,
                window,
                AtomEnum::WM_HINTS,
                AtomEnum::WM_HINTS,
                32,
                new_hints.len() as u32 / 4,
                &new_hints,
            )?;
        } else if let Some(client) = self.clients.get_mut(&window) {
            client.is_urgent = flags & URGENCY_HINT != 0;
            if client.is_urgent {
                self.connection.change_window_attributes(
                    window,
                    &ChangeWindowAttributesAux::new()
                        .border_pixel(self.config.scheme_urgent.border),
                )?;
            }
        }

        if hints.value.len() >= 8 && flags & INPUT_HINT != 0 {
            let input = i32::from_ne_bytes([
                hints.value[4],
                hints.value[5],
                hints.value[6],
                hints.value[7],
            ]);
            if let Some(client) = self.clients.get_mut(&window) {
                client.never_focus = input == 0;
            }
        } else if let Some(client) = self.clients.get_mut(&window) {
            client.never_focus = false;
        }
        Ok(())
    }

    fn update_size_hints(&mut self, window: Window) -> WmResult<()> {
        const P_MIN_SIZE: u32 = 1 << 4;
        const P_MAX_SIZE: u32 = 1 << 5;
        const P_RESIZE_INC: u32 = 1 << 6;
        const P_ASPECT: u32 = 1 << 7;
        const P_BASE_SIZE: u32 = 1 << 8;

        // XSizeHints word offsets
        const MIN_WIDTH: usize = 5;
        const MIN_HEIGHT: usize = 6;
        const MAX_WIDTH: usize = 7;
        const MAX_HEIGHT: usize = 8;
        const WIDTH_INC: usize = 9;
        const HEIGHT_INC: usize = 10;
        const MIN_ASPECT_X: usize = 11;
        const MIN_ASPECT_Y: usize = 12;
        const MAX_ASPECT_X: usize = 13;
        const MAX_ASPECT_Y: usize = 14;
        const BASE_WIDTH: usize = 15;
        const BASE_HEIGHT: usize = 16;

        let size_hints = self
            .connection
            .get_property(
                false,
                window,
                AtomEnum::WM_NORMAL_HINTS,
                AtomEnum::WM_SIZE_HINTS,
                0,
                18,
            )?
            .reply();

        let Ok(size_hints) = size_hints else {
            return Ok(());
        };
        if size_hints.value.len() < 18 * 4 {
            if let Some(client) = self.clients.get_mut(&window) {
                client.hints_valid = false;
            }
            return Ok(());
        }

        let read_u32 = |offset: usize| -> u32 {
            let bytes = &size_hints.value[offset * 4..(offset + 1) * 4];
            u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        };

        let flags = read_u32(0);

        if let Some(client) = self.clients.get_mut(&window) {
            if flags & P_BASE_SIZE != 0 {
                client.base_width = read_u32(BASE_WIDTH) as i32;
                client.base_height = read_u32(BASE_HEIGHT) as i32;
            } else if flags & P_MIN_SIZE != 0 {
                client.base_width = read_u32(MIN_WIDTH) as i32;
                client.base_height = read_u32(MIN_HEIGHT) as i32;
            } else {
                client.base_width = 0;
                client.base_height = 0;
            }

            if flags & P_RESIZE_INC != 0 {
                client.increment_width = read_u32(WIDTH_INC) as i32;
                client.increment_height = read_u32(HEIGHT_INC) as i32;
            } else {
                client.increment_width = 0;
                client.increment_height = 0;
            }

            if flags & P_MAX_SIZE != 0 {
                client.max_width = read_u32(MAX_WIDTH) as i32;
                client.max_height = read_u32(MAX_HEIGHT) as i32;
            } else {
                client.max_width = 0;
                client.max_height = 0;
            }

            if flags & P_MIN_SIZE != 0 {
                client.min_width = read_u32(MIN_WIDTH) as i32;
                client.min_height = read_u32(MIN_HEIGHT) as i32;
            } else if flags & P_BASE_SIZE != 0 {
                client.min_width = read_u32(BASE_WIDTH) as i32;
                client.min_height = read_u32(BASE_HEIGHT) as i32;
            } else {
                client.min_width = 0;
                client.min_height = 0;
            }

            if flags & P_ASPECT != 0 {
                client.min_aspect =
                    read_u32(MIN_ASPECT_Y) as f32 / (read_u32(MIN_ASPECT_X) as f32).max(1.0);
                client.max_aspect =
                    read_u32(MAX_ASPECT_X) as f32 / (read_u32(MAX_ASPECT_Y) as f32).max(1.0);
            } else {
                client.min_aspect = 0.0;
                client.max_aspect = 0.0;
            }

            client.is_fixed = client.max_width > 0
                && client.max_height > 0
                && client.max_width == client.min_width
                && client.max_height == client.min_height;
            client.hints_valid = true;
        }
        Ok(())
    }

    fn get_atom_property(&self, window: Window, property: Atom) -> WmResult<Option<Atom>> {
        let reply = self
            .connection
            .get_property(false, window, property, AtomEnum::ATOM, 0, 1)?
            .reply();

        Ok(match reply {
            Ok(prop) if prop.value.len() >= 4 => Some(u32::from_ne_bytes([
                prop.value[0],
                prop.value[1],
                prop.value[2],
                prop.value[3],
            ])),
            _ => None,
        })
    }

    fn get_transient_parent(&self, window: Window) -> Option<Window> {
        self.connection
            .get_property(
                false,
                window,
                AtomEnum::WM_TRANSIENT_FOR,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .filter(|reply| reply.value.len() >= 4)
            .map(|reply| {
                u32::from_ne_bytes([
                    reply.value[0],
                    reply.value[1],
                    reply.value[2],
                    reply.value[3],
                ])
            })
            .filter(|&parent| parent != 0)
    }

    fn get_window_class_instance(&self, window: Window) -> (String, String) {
        let reply = self
            .connection
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
            .ok()
            .and_then(|cookie| cookie.reply().ok());

        if let Some(reply) = reply
            && !reply.value.is_empty()
            && let Ok(text) = std::str::from_utf8(&reply.value)
        {
            let mut parts = text.split('\0');
            let instance = parts.next().unwrap_or("").to_string();
            let class = parts.next().unwrap_or("").to_string();
            return (instance, class);
        }
        (String::new(), String::new())
    }

    fn set_urgent(&mut self, window: Window, urgent: bool) -> WmResult<()> {
        const URGENCY_HINT: u32 = 1 << 8;

        if let Some(client) = self.clients.get_mut(&window) {
            client.is_urgent = urgent;
        }
        if urgent {
            self.connection.change_window_attributes(
                window,
                &ChangeWindowAttributesAux::new().border_pixel(self.config.scheme_urgent.border),
            )?;
        }

        let hints_reply = self
            .connection
            .get_property(false, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 0, 9)?
            .reply();

        if let Ok(hints) = hints_reply
            && hints.value.len() >= 4
        {
            let mut flags = u32::from_ne_bytes([
                hints.value[0],
                hints.value[1],
                hints.value[2],
                hints.value[3],
            ]);
            if urgent {
                flags |= URGENCY_HINT;
            } else {
                flags &= !URGENCY_HINT;
            }
            let mut new_hints = hints.value.clone();
            new_hints[0..4].copy_from_slice(&flags.to_ne_bytes());
            self.connection.change_property(
                PropMode::REPLACE,
                window,
                AtomEnum::WM_HINTS,
                AtomEnum::WM_HINTS,
                32,
                new_hints.len() as u32 / 4,
                &new_hints,
            )?;
        }
        Ok(())
    }

    fn set_wm_state(&self, window: Window, state: u32) -> WmResult<()> {
        let data = [state, 0u32];
        let bytes: Vec<u8> = data.iter().flat_map(|value| value.to_ne_bytes()).collect();
        self.connection.change_property(
            PropMode::REPLACE,
            window,
            self.atoms.wm_state,
            self.atoms.wm_state,
            32,
            2,
            &bytes,
        )?;
        Ok(())
    }

    fn save_client_info(&self, window: Window) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let bytes = encode_client_info(client.tags, client.monitor_index);
        self.connection.change_property(
            PropMode::REPLACE,
            window,
            self.atoms.net_client_info,
            AtomEnum::CARDINAL,
            32,
            2,
            &bytes,
        )?;
        Ok(())
    }

    fn read_saved_client_info(&self, window: Window) -> WmResult<Option<(TagMask, u32)>> {
        let reply = self
            .connection
            .get_property(
                false,
                window,
                self.atoms.net_client_info,
                AtomEnum::CARDINAL,
                0,
                2,
            )?
            .reply();

        let Ok(prop) = reply else {
            return Ok(None);
        };
        let Some((tags, monitor)) = decode_client_info(&prop.value) else {
            return Ok(None);
        };
        let valid_mask = self.config.all_tags_mask() | self.config.scratch_tags_mask();
        if tags == 0 || tags & !valid_mask != 0 {
            return Ok(None);
        }
        Ok(Some((tags, monitor)))
    }

    fn save_current_desktop(&self) -> WmResult<()> {
        let selected_tags = self.monitors[self.selected_monitor].selected_tags();
        let desktop = selected_tags.trailing_zeros();
        self.connection.change_property(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_current_desktop,
            AtomEnum::CARDINAL,
            32,
            1,
            &desktop.to_ne_bytes(),
        )?;
        Ok(())
    }

    fn update_client_list(&self) -> WmResult<()> {
        let bytes: Vec<u8> = self
            .windows
            .iter()
            .flat_map(|window| window.to_ne_bytes())
            .collect();
        self.connection.change_property(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            32,
            self.windows.len() as u32,
            &bytes,
        )?;
        Ok(())
    }

    fn send_protocol_event(&self, window: Window, protocol: Atom) -> WmResult<bool> {
        let protocols_reply = self
            .connection
            .get_property(
                false,
                window,
                self.atoms.wm_protocols,
                AtomEnum::ATOM,
                0,
                100,
            )?
            .reply();

        let Ok(protocols_reply) = protocols_reply else {
            return Ok(false);
        };
        let supported = protocols_reply
            .value
            .chunks_exact(4)
            .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .any(|advertised| advertised == protocol);
        if !supported {
            return Ok(false);
        }

        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_: self.atoms.wm_protocols,
            data: ClientMessageData::from([protocol, x11rb::CURRENT_TIME, 0, 0, 0]),
        };
        self.connection
            .send_event(false, window, EventMask::NO_EVENT, event)?;
        Ok(true)
    }

    fn send_configure_notify(&self, window: Window) -> WmResult<()> {
        let (x, y, width, height, border_width) = match self.clients.get(&window) {
            Some(client) => (
                client.x,
                client.y,
                client.width,
                client.height,
                client.border_width,
            ),
            None => {
                let geometry = self.connection.get_geometry(window)?.reply()?;
                (
                    geometry.x as i32,
                    geometry.y as i32,
                    geometry.width as i32,
                    geometry.height as i32,
                    geometry.border_width as i32,
                )
            }
        };

        let event = ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: window,
            window,
            above_sibling: x11rb::NONE,
            x: x as i16,
            y: y as i16,
            width: width as u16,
            height: height as u16,
            border_width: border_width as u16,
            override_redirect: false,
        };
        self.connection
            .send_event(false, window, EventMask::STRUCTURE_NOTIFY, event)?;
        Ok(())
    }

    fn grab_buttons(&self, window: Window, focused: bool) -> WmResult<()> {
        self.connection
            .ungrab_button(ButtonIndex::ANY, window, ModMask::ANY)?;

        if !focused {
            self.connection.grab_button(
                false,
                window,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                GrabMode::SYNC,
                GrabMode::SYNC,
                x11rb::NONE,
                x11rb::NONE,
                ButtonIndex::ANY,
                ModMask::ANY,
            )?;
        }

        let ignore_masks = [
            0u16,
            u16::from(ModMask::LOCK),
            u16::from(ModMask::M2),
            u16::from(ModMask::LOCK | ModMask::M2),
        ];
        for binding in &self.config.buttons {
            if binding.click != ClickContext::ClientWindow {
                continue;
            }
            let modifier_mask = modifiers_to_mask(&binding.modifiers);
            for &ignore_mask in &ignore_masks {
                self.connection.grab_button(
                    false,
                    window,
                    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                    GrabMode::ASYNC,
                    GrabMode::SYNC,
                    x11rb::NONE,
                    x11rb::NONE,
                    ButtonIndex::from(binding.button),
                    (modifier_mask | ignore_mask).into(),
                )?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bars
    // ------------------------------------------------------------------

    fn draw_bars(&mut self) -> WmResult<()> {
        for monitor_index in 0..self.monitors.len() {
            self.draw_bar(monitor_index)?;
        }
        Ok(())
    }

    fn draw_bar(&mut self, monitor_index: usize) -> WmResult<()> {
        let monitor = &self.monitors[monitor_index];
        if !monitor.show_bar {
            return Ok(());
        }

        let mut occupied_tags: TagMask = 0;
        let mut urgent_tags: TagMask = 0;
        for window in &monitor.clients {
            if let Some(client) = self.clients.get(window) {
                occupied_tags |= client.tags;
                if client.is_urgent {
                    urgent_tags |= client.tags;
                }
            }
        }

        let selected = monitor.selected_client;
        let (title, icon) = match selected.and_then(|window| self.clients.get(&window)) {
            Some(client) => (client.name.clone(), client.icon.clone()),
            None => (String::new(), None),
        };
        let layout_symbol = monitor.layout_symbol.clone();

        let input = BarDrawInput {
            selected_tags: monitor.selected_tags(),
            occupied_tags,
            urgent_tags,
            layout_symbol: &layout_symbol,
            title: &title,
            icon: icon.as_ref(),
            title_selected: monitor_index == self.selected_monitor,
            draw_status: monitor_index == self.selected_monitor,
            status: &self.status,
        };

        if let Some(bar) = self.bars.get_mut(monitor_index) {
            bar.draw(&self.font, &input);
            if monitor_index == self.selected_monitor {
                bar.draw_extra(&self.font, &self.status);
            } else {
                bar.draw_extra(&self.font, &StatusText::default());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_info_round_trips() {
        let bytes = encode_client_info(0b1010_0001, 2);
        assert_eq!(decode_client_info(&bytes), Some((0b1010_0001, 2)));
    }

    #[test]
    fn client_info_rejects_short_data() {
        assert_eq!(decode_client_info(&[1, 2, 3]), None);
    }

    #[test]
    fn direction_score_prefers_the_nearer_window() {
        let source = (960, 0, 960, 540);
        let near = (0, 0, 960, 540);
        let far = (0, 540, 960, 540);
        let near_score = direction_score(0, source, near, 1920);
        let far_score = direction_score(0, source, far, 1920);
        assert!(near_score < far_score);
    }

    #[test]
    fn direction_score_wraps_around_the_monitor() {
        // Looking right from the rightmost window reaches the leftmost one
        // through the wrap distance.
        let source = (1440, 0, 480, 540);
        let leftmost = (0, 0, 480, 540);
        let score = direction_score(1, source, leftmost, 1920);
        assert_eq!(score, 0);
    }

    #[test]
    fn tie_break_is_asymmetric() {
        // left and up accept an equal score, right and down do not
        assert!(direction_prefers(0, 5, 5));
        assert!(direction_prefers(2, 5, 5));
        assert!(!direction_prefers(1, 5, 5));
        assert!(!direction_prefers(3, 5, 5));
        assert!(direction_prefers(1, 4, 5));
    }
}
