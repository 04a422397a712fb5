//! Translation tables from SDL2's input model to the library's.

use opal_api::{Key, MouseButton, MouseCursor};
use sdl2::keyboard::{Keycode, Mod};
use sdl2::mouse::SystemCursor;

/// Map an SDL keycode to the library's key. Unmapped keycodes are dropped.
pub fn translate_key(keycode: Keycode) -> Option<Key> {
    Some(match keycode {
        Keycode::Tab => Key::Tab,
        Keycode::Left => Key::LeftArrow,
        Keycode::Right => Key::RightArrow,
        Keycode::Up => Key::UpArrow,
        Keycode::Down => Key::DownArrow,
        Keycode::PageUp => Key::PageUp,
        Keycode::PageDown => Key::PageDown,
        Keycode::Home => Key::Home,
        Keycode::End => Key::End,
        Keycode::Insert => Key::Insert,
        Keycode::Delete => Key::Delete,
        Keycode::Backspace => Key::Backspace,
        Keycode::Space => Key::Space,
        Keycode::Return => Key::Enter,
        Keycode::Escape => Key::Escape,
        Keycode::LCtrl => Key::LeftCtrl,
        Keycode::LShift => Key::LeftShift,
        Keycode::LAlt => Key::LeftAlt,
        Keycode::LGui => Key::LeftSuper,
        Keycode::RCtrl => Key::RightCtrl,
        Keycode::RShift => Key::RightShift,
        Keycode::RAlt => Key::RightAlt,
        Keycode::RGui => Key::RightSuper,
        Keycode::Application => Key::Menu,
        Keycode::Num0 => Key::Alpha0,
        Keycode::Num1 => Key::Alpha1,
        Keycode::Num2 => Key::Alpha2,
        Keycode::Num3 => Key::Alpha3,
        Keycode::Num4 => Key::Alpha4,
        Keycode::Num5 => Key::Alpha5,
        Keycode::Num6 => Key::Alpha6,
        Keycode::Num7 => Key::Alpha7,
        Keycode::Num8 => Key::Alpha8,
        Keycode::Num9 => Key::Alpha9,
        Keycode::A => Key::A,
        Keycode::B => Key::B,
        Keycode::C => Key::C,
        Keycode::D => Key::D,
        Keycode::E => Key::E,
        Keycode::F => Key::F,
        Keycode::G => Key::G,
        Keycode::H => Key::H,
        Keycode::I => Key::I,
        Keycode::J => Key::J,
        Keycode::K => Key::K,
        Keycode::L => Key::L,
        Keycode::M => Key::M,
        Keycode::N => Key::N,
        Keycode::O => Key::O,
        Keycode::P => Key::P,
        Keycode::Q => Key::Q,
        Keycode::R => Key::R,
        Keycode::S => Key::S,
        Keycode::T => Key::T,
        Keycode::U => Key::U,
        Keycode::V => Key::V,
        Keycode::W => Key::W,
        Keycode::X => Key::X,
        Keycode::Y => Key::Y,
        Keycode::Z => Key::Z,
        Keycode::F1 => Key::F1,
        Keycode::F2 => Key::F2,
        Keycode::F3 => Key::F3,
        Keycode::F4 => Key::F4,
        Keycode::F5 => Key::F5,
        Keycode::F6 => Key::F6,
        Keycode::F7 => Key::F7,
        Keycode::F8 => Key::F8,
        Keycode::F9 => Key::F9,
        Keycode::F10 => Key::F10,
        Keycode::F11 => Key::F11,
        Keycode::F12 => Key::F12,
        Keycode::Quote => Key::Apostrophe,
        Keycode::Comma => Key::Comma,
        Keycode::Minus => Key::Minus,
        Keycode::Period => Key::Period,
        Keycode::Slash => Key::Slash,
        Keycode::Semicolon => Key::Semicolon,
        Keycode::Equals => Key::Equal,
        Keycode::LeftBracket => Key::LeftBracket,
        Keycode::Backslash => Key::Backslash,
        Keycode::RightBracket => Key::RightBracket,
        Keycode::Backquote => Key::GraveAccent,
        Keycode::CapsLock => Key::CapsLock,
        Keycode::ScrollLock => Key::ScrollLock,
        Keycode::NumLockClear => Key::NumLock,
        Keycode::PrintScreen => Key::PrintScreen,
        Keycode::Pause => Key::Pause,
        Keycode::Kp0 => Key::Keypad0,
        Keycode::Kp1 => Key::Keypad1,
        Keycode::Kp2 => Key::Keypad2,
        Keycode::Kp3 => Key::Keypad3,
        Keycode::Kp4 => Key::Keypad4,
        Keycode::Kp5 => Key::Keypad5,
        Keycode::Kp6 => Key::Keypad6,
        Keycode::Kp7 => Key::Keypad7,
        Keycode::Kp8 => Key::Keypad8,
        Keycode::Kp9 => Key::Keypad9,
        Keycode::KpPeriod => Key::KeypadDecimal,
        Keycode::KpDivide => Key::KeypadDivide,
        Keycode::KpMultiply => Key::KeypadMultiply,
        Keycode::KpMinus => Key::KeypadSubtract,
        Keycode::KpPlus => Key::KeypadAdd,
        Keycode::KpEnter => Key::KeypadEnter,
        Keycode::KpEquals => Key::KeypadEqual,
        _ => return None,
    })
}

pub fn translate_mouse_button(button: sdl2::mouse::MouseButton) -> Option<MouseButton> {
    Some(match button {
        sdl2::mouse::MouseButton::Left => MouseButton::Left,
        sdl2::mouse::MouseButton::Right => MouseButton::Right,
        sdl2::mouse::MouseButton::Middle => MouseButton::Middle,
        sdl2::mouse::MouseButton::X1 => MouseButton::Extra1,
        sdl2::mouse::MouseButton::X2 => MouseButton::Extra2,
        sdl2::mouse::MouseButton::Unknown => return None,
    })
}

pub fn system_cursor(cursor: MouseCursor) -> SystemCursor {
    match cursor {
        MouseCursor::Arrow => SystemCursor::Arrow,
        MouseCursor::TextInput => SystemCursor::IBeam,
        MouseCursor::ResizeAll => SystemCursor::SizeAll,
        MouseCursor::ResizeNs => SystemCursor::SizeNS,
        MouseCursor::ResizeEw => SystemCursor::SizeWE,
        MouseCursor::ResizeNesw => SystemCursor::SizeNESW,
        MouseCursor::ResizeNwse => SystemCursor::SizeNWSE,
        MouseCursor::Hand => SystemCursor::Hand,
        MouseCursor::NotAllowed => SystemCursor::No,
    }
}

/// Decode SDL's combined modifier mask into (ctrl, shift, alt, super).
pub fn decode_mods(keymod: Mod) -> (bool, bool, bool, bool) {
    (
        keymod.intersects(Mod::LCTRLMOD | Mod::RCTRLMOD),
        keymod.intersects(Mod::LSHIFTMOD | Mod::RSHIFTMOD),
        keymod.intersects(Mod::LALTMOD | Mod::RALTMOD),
        keymod.intersects(Mod::LGUIMOD | Mod::RGUIMOD),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_keys_map() {
        assert_eq!(translate_key(Keycode::A), Some(Key::A));
        assert_eq!(translate_key(Keycode::Num0), Some(Key::Alpha0));
        assert_eq!(translate_key(Keycode::Kp5), Some(Key::Keypad5));
        assert_eq!(translate_key(Keycode::Return), Some(Key::Enter));
        assert_eq!(translate_key(Keycode::NumLockClear), Some(Key::NumLock));
    }

    #[test]
    fn unmapped_keys_are_dropped() {
        assert_eq!(translate_key(Keycode::Mute), None);
        assert_eq!(translate_key(Keycode::AcBack), None);
    }

    #[test]
    fn modifier_mask_decodes_both_sides() {
        let (ctrl, shift, alt, gui) = decode_mods(Mod::RCTRLMOD | Mod::LSHIFTMOD);
        assert!(ctrl && shift && !alt && !gui);
    }

    #[test]
    fn x_buttons_map_to_extras() {
        assert_eq!(
            translate_mouse_button(sdl2::mouse::MouseButton::X1),
            Some(MouseButton::Extra1)
        );
        assert_eq!(
            translate_mouse_button(sdl2::mouse::MouseButton::Unknown),
            None
        );
    }
}
