//! Per-frame input/output exchanged between backends and the library.
//! Platform backends queue InputEvents and push display metrics; the library
//! drains the queue each frame and writes back the want_* flags and the
//! cursor request that backends apply.

use bitflags::bitflags;

bitflags! {
    /// Capabilities a backend declares once at init.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BackendFlags: u32 {
        /// Platform backend can change the OS mouse cursor shape.
        const HAS_MOUSE_CURSORS = 1 << 0;
        /// Platform backend can warp the OS mouse position (honors want_set_mouse_pos).
        const HAS_SET_MOUSE_POS = 1 << 1;
        /// Platform backend feeds gamepad input.
        const HAS_GAMEPAD = 1 << 2;
        /// Platform backend implements PlatformViewportBackend.
        const PLATFORM_HAS_VIEWPORTS = 1 << 3;
        /// Renderer honors DrawCmd::vtx_offset (large meshes in 16-bit indices).
        const RENDERER_HAS_VTX_OFFSET = 1 << 4;
        /// Renderer implements RendererViewportBackend.
        const RENDERER_HAS_VIEWPORTS = 1 << 5;
    }
}

bitflags! {
    /// Host configuration read by backends.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigFlags: u32 {
        /// Backends must not change the OS cursor shape or visibility.
        const NO_MOUSE_CURSOR_CHANGE = 1 << 0;
        /// Multi-viewport protocol is active; mouse positions are in screen space.
        const VIEWPORTS_ENABLE = 1 << 1;
    }
}

/// Keyboard keys in the library's input model. Platform backends map native
/// keycodes onto these; unmapped native keys are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Tab,
    LeftArrow,
    RightArrow,
    UpArrow,
    DownArrow,
    PageUp,
    PageDown,
    Home,
    End,
    Insert,
    Delete,
    Backspace,
    Space,
    Enter,
    Escape,
    LeftCtrl,
    LeftShift,
    LeftAlt,
    LeftSuper,
    RightCtrl,
    RightShift,
    RightAlt,
    RightSuper,
    Menu,
    Alpha0,
    Alpha1,
    Alpha2,
    Alpha3,
    Alpha4,
    Alpha5,
    Alpha6,
    Alpha7,
    Alpha8,
    Alpha9,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Apostrophe,
    Comma,
    Minus,
    Period,
    Slash,
    Semicolon,
    Equal,
    LeftBracket,
    Backslash,
    RightBracket,
    GraveAccent,
    CapsLock,
    ScrollLock,
    NumLock,
    PrintScreen,
    Pause,
    Keypad0,
    Keypad1,
    Keypad2,
    Keypad3,
    Keypad4,
    Keypad5,
    Keypad6,
    Keypad7,
    Keypad8,
    Keypad9,
    KeypadDecimal,
    KeypadDivide,
    KeypadMultiply,
    KeypadSubtract,
    KeypadAdd,
    KeypadEnter,
    KeypadEqual,
}

/// Mouse buttons in the library's input model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Extra1,
    Extra2,
}

/// Cursor shapes the library can request. Backends map these to native
/// cursors; shapes missing on a platform fall back to the default arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseCursor {
    Arrow,
    TextInput,
    ResizeAll,
    ResizeNs,
    ResizeEw,
    ResizeNesw,
    ResizeNwse,
    Hand,
    NotAllowed,
}

/// One queued input event. Mouse positions are in logical units relative to
/// the main viewport, or in screen space when ConfigFlags::VIEWPORTS_ENABLE.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Key { key: Key, down: bool },
    Char(char),
    MousePos([f32; 2]),
    MouseButton { button: MouseButton, down: bool },
    /// Wheel delta in lines (x = horizontal, y = vertical, +y scrolls up).
    MouseWheel([f32; 2]),
    Focus(bool),
}

/// Per-frame exchange block. Platform backends fill the top section before
/// the library's frame; the library fills the bottom section during it.
#[derive(Debug, Default)]
pub struct Io {
    pub config_flags: ConfigFlags,
    pub backend_flags: BackendFlags,
    /// Main viewport size in logical units.
    pub display_size: [f32; 2],
    /// Framebuffer pixels per logical unit (DPI scale).
    pub display_framebuffer_scale: [f32; 2],
    /// Seconds since the previous frame.
    pub delta_time: f32,

    events: Vec<InputEvent>,
    key_ctrl: bool,
    key_shift: bool,
    key_alt: bool,
    key_super: bool,

    // Written back by the library each frame.
    pub want_capture_mouse: bool,
    pub want_capture_keyboard: bool,
    pub want_text_input: bool,
    /// When set, the backend warps the OS cursor to mouse_pos_request.
    pub want_set_mouse_pos: bool,
    pub mouse_pos_request: [f32; 2],
    /// Requested cursor shape; None hides the cursor.
    pub mouse_cursor: Option<MouseCursor>,
    /// Library draws the cursor itself; backends hide the OS cursor.
    pub mouse_draw_cursor: bool,
}

impl Io {
    pub fn new() -> Self {
        Self {
            display_framebuffer_scale: [1.0, 1.0],
            mouse_cursor: Some(MouseCursor::Arrow),
            ..Default::default()
        }
    }

    pub fn add_key_event(&mut self, key: Key, down: bool) {
        match key {
            Key::LeftCtrl | Key::RightCtrl => self.key_ctrl = down,
            Key::LeftShift | Key::RightShift => self.key_shift = down,
            Key::LeftAlt | Key::RightAlt => self.key_alt = down,
            Key::LeftSuper | Key::RightSuper => self.key_super = down,
            _ => {}
        }
        self.events.push(InputEvent::Key { key, down });
    }

    pub fn add_input_character(&mut self, c: char) {
        // Control characters never reach the text input path.
        if !c.is_control() {
            self.events.push(InputEvent::Char(c));
        }
    }

    pub fn add_mouse_pos_event(&mut self, pos: [f32; 2]) {
        self.events.push(InputEvent::MousePos(pos));
    }

    pub fn add_mouse_button_event(&mut self, button: MouseButton, down: bool) {
        self.events.push(InputEvent::MouseButton { button, down });
    }

    pub fn add_mouse_wheel_event(&mut self, delta: [f32; 2]) {
        self.events.push(InputEvent::MouseWheel(delta));
    }

    pub fn add_focus_event(&mut self, focused: bool) {
        self.events.push(InputEvent::Focus(focused));
    }

    pub fn key_ctrl(&self) -> bool {
        self.key_ctrl
    }
    pub fn key_shift(&self) -> bool {
        self.key_shift
    }
    pub fn key_alt(&self) -> bool {
        self.key_alt
    }
    pub fn key_super(&self) -> bool {
        self.key_super
    }

    /// Queued events since the last drain, in arrival order.
    pub fn events(&self) -> &[InputEvent] {
        &self.events
    }

    /// Consume the queue; called by the library once per frame.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, InputEvent> {
        self.events.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_state_follows_key_events() {
        let mut io = Io::new();
        io.add_key_event(Key::LeftCtrl, true);
        io.add_key_event(Key::A, true);
        assert!(io.key_ctrl());
        io.add_key_event(Key::LeftCtrl, false);
        assert!(!io.key_ctrl());
        assert_eq!(io.events().len(), 3);
    }

    #[test]
    fn control_characters_are_filtered() {
        let mut io = Io::new();
        io.add_input_character('\u{7f}');
        io.add_input_character('a');
        assert_eq!(io.events(), &[InputEvent::Char('a')]);
    }

    #[test]
    fn drain_empties_queue() {
        let mut io = Io::new();
        io.add_mouse_pos_event([10.0, 20.0]);
        io.add_mouse_wheel_event([0.0, 1.0]);
        assert_eq!(io.drain_events().count(), 2);
        assert!(io.events().is_empty());
    }
}
