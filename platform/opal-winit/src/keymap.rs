//! Translation tables from winit's input model to the library's.

use opal_api::{Key, MouseButton, MouseCursor};
use winit::keyboard::KeyCode;
use winit::window::CursorIcon;

/// Map a physical key to the library's key. Keys the library has no concept
/// of (media keys, IME keys, ...) return None and are dropped.
pub fn translate_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::Tab => Key::Tab,
        KeyCode::ArrowLeft => Key::LeftArrow,
        KeyCode::ArrowRight => Key::RightArrow,
        KeyCode::ArrowUp => Key::UpArrow,
        KeyCode::ArrowDown => Key::DownArrow,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::Insert => Key::Insert,
        KeyCode::Delete => Key::Delete,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Space => Key::Space,
        KeyCode::Enter => Key::Enter,
        KeyCode::Escape => Key::Escape,
        KeyCode::ControlLeft => Key::LeftCtrl,
        KeyCode::ShiftLeft => Key::LeftShift,
        KeyCode::AltLeft => Key::LeftAlt,
        KeyCode::SuperLeft => Key::LeftSuper,
        KeyCode::ControlRight => Key::RightCtrl,
        KeyCode::ShiftRight => Key::RightShift,
        KeyCode::AltRight => Key::RightAlt,
        KeyCode::SuperRight => Key::RightSuper,
        KeyCode::ContextMenu => Key::Menu,
        KeyCode::Digit0 => Key::Alpha0,
        KeyCode::Digit1 => Key::Alpha1,
        KeyCode::Digit2 => Key::Alpha2,
        KeyCode::Digit3 => Key::Alpha3,
        KeyCode::Digit4 => Key::Alpha4,
        KeyCode::Digit5 => Key::Alpha5,
        KeyCode::Digit6 => Key::Alpha6,
        KeyCode::Digit7 => Key::Alpha7,
        KeyCode::Digit8 => Key::Alpha8,
        KeyCode::Digit9 => Key::Alpha9,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        KeyCode::F6 => Key::F6,
        KeyCode::F7 => Key::F7,
        KeyCode::F8 => Key::F8,
        KeyCode::F9 => Key::F9,
        KeyCode::F10 => Key::F10,
        KeyCode::F11 => Key::F11,
        KeyCode::F12 => Key::F12,
        KeyCode::Quote => Key::Apostrophe,
        KeyCode::Comma => Key::Comma,
        KeyCode::Minus => Key::Minus,
        KeyCode::Period => Key::Period,
        KeyCode::Slash => Key::Slash,
        KeyCode::Semicolon => Key::Semicolon,
        KeyCode::Equal => Key::Equal,
        KeyCode::BracketLeft => Key::LeftBracket,
        KeyCode::Backslash => Key::Backslash,
        KeyCode::BracketRight => Key::RightBracket,
        KeyCode::Backquote => Key::GraveAccent,
        KeyCode::CapsLock => Key::CapsLock,
        KeyCode::ScrollLock => Key::ScrollLock,
        KeyCode::NumLock => Key::NumLock,
        KeyCode::PrintScreen => Key::PrintScreen,
        KeyCode::Pause => Key::Pause,
        KeyCode::Numpad0 => Key::Keypad0,
        KeyCode::Numpad1 => Key::Keypad1,
        KeyCode::Numpad2 => Key::Keypad2,
        KeyCode::Numpad3 => Key::Keypad3,
        KeyCode::Numpad4 => Key::Keypad4,
        KeyCode::Numpad5 => Key::Keypad5,
        KeyCode::Numpad6 => Key::Keypad6,
        KeyCode::Numpad7 => Key::Keypad7,
        KeyCode::Numpad8 => Key::Keypad8,
        KeyCode::Numpad9 => Key::Keypad9,
        KeyCode::NumpadDecimal => Key::KeypadDecimal,
        KeyCode::NumpadDivide => Key::KeypadDivide,
        KeyCode::NumpadMultiply => Key::KeypadMultiply,
        KeyCode::NumpadSubtract => Key::KeypadSubtract,
        KeyCode::NumpadAdd => Key::KeypadAdd,
        KeyCode::NumpadEnter => Key::KeypadEnter,
        KeyCode::NumpadEqual => Key::KeypadEqual,
        _ => return None,
    })
}

pub fn translate_mouse_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    Some(match button {
        winit::event::MouseButton::Left => MouseButton::Left,
        winit::event::MouseButton::Right => MouseButton::Right,
        winit::event::MouseButton::Middle => MouseButton::Middle,
        winit::event::MouseButton::Back => MouseButton::Extra1,
        winit::event::MouseButton::Forward => MouseButton::Extra2,
        winit::event::MouseButton::Other(_) => return None,
    })
}

pub fn cursor_icon(cursor: MouseCursor) -> CursorIcon {
    match cursor {
        MouseCursor::Arrow => CursorIcon::Default,
        MouseCursor::TextInput => CursorIcon::Text,
        MouseCursor::ResizeAll => CursorIcon::Move,
        MouseCursor::ResizeNs => CursorIcon::NsResize,
        MouseCursor::ResizeEw => CursorIcon::EwResize,
        MouseCursor::ResizeNesw => CursorIcon::NeswResize,
        MouseCursor::ResizeNwse => CursorIcon::NwseResize,
        MouseCursor::Hand => CursorIcon::Pointer,
        MouseCursor::NotAllowed => CursorIcon::NotAllowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_digits_and_keypad_map() {
        assert_eq!(translate_key(KeyCode::KeyA), Some(Key::A));
        assert_eq!(translate_key(KeyCode::Digit0), Some(Key::Alpha0));
        assert_eq!(translate_key(KeyCode::Numpad7), Some(Key::Keypad7));
        assert_eq!(translate_key(KeyCode::NumpadEnter), Some(Key::KeypadEnter));
    }

    #[test]
    fn unmapped_keys_are_dropped() {
        assert_eq!(translate_key(KeyCode::MediaPlayPause), None);
        assert_eq!(translate_key(KeyCode::LaunchMail), None);
    }

    #[test]
    fn extra_mouse_buttons() {
        use winit::event::MouseButton as Wb;
        assert_eq!(translate_mouse_button(Wb::Back), Some(MouseButton::Extra1));
        assert_eq!(translate_mouse_button(Wb::Other(9)), None);
    }

    #[test]
    fn every_cursor_shape_has_an_icon() {
        // The winit cursor set is a superset of the library's; the arrow
        // fallback of other platforms never triggers here.
        let shapes = [
            MouseCursor::Arrow,
            MouseCursor::TextInput,
            MouseCursor::ResizeAll,
            MouseCursor::ResizeNs,
            MouseCursor::ResizeEw,
            MouseCursor::ResizeNesw,
            MouseCursor::ResizeNwse,
            MouseCursor::Hand,
            MouseCursor::NotAllowed,
        ];
        let icons: Vec<CursorIcon> = shapes.iter().map(|s| cursor_icon(*s)).collect();
        assert_eq!(icons.len(), shapes.len());
    }
}
