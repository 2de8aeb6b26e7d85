pub type Keysym = u32;

// Latin-1 keysyms match their codepoints; letters bind through the
// lowercase form, which is what an unshifted keycode resolves to.
pub const XK_SPACE: Keysym = 0x0020;
pub const XK_APOSTROPHE: Keysym = 0x0027;
pub const XK_COMMA: Keysym = 0x002c;
pub const XK_MINUS: Keysym = 0x002d;
pub const XK_PERIOD: Keysym = 0x002e;
pub const XK_SLASH: Keysym = 0x002f;
pub const XK_0: Keysym = 0x0030;
pub const XK_1: Keysym = 0x0031;
pub const XK_2: Keysym = 0x0032;
pub const XK_3: Keysym = 0x0033;
pub const XK_4: Keysym = 0x0034;
pub const XK_5: Keysym = 0x0035;
pub const XK_6: Keysym = 0x0036;
pub const XK_7: Keysym = 0x0037;
pub const XK_8: Keysym = 0x0038;
pub const XK_9: Keysym = 0x0039;
pub const XK_SEMICOLON: Keysym = 0x003b;
pub const XK_EQUAL: Keysym = 0x003d;
pub const XK_BRACKETLEFT: Keysym = 0x005b;
pub const XK_BACKSLASH: Keysym = 0x005c;
pub const XK_BRACKETRIGHT: Keysym = 0x005d;
pub const XK_GRAVE: Keysym = 0x0060;
pub const XK_A: Keysym = 0x0061;
pub const XK_B: Keysym = 0x0062;
pub const XK_C: Keysym = 0x0063;
pub const XK_D: Keysym = 0x0064;
pub const XK_E: Keysym = 0x0065;
pub const XK_F: Keysym = 0x0066;
pub const XK_G: Keysym = 0x0067;
pub const XK_H: Keysym = 0x0068;
pub const XK_I: Keysym = 0x0069;
pub const XK_J: Keysym = 0x006a;
pub const XK_K: Keysym = 0x006b;
pub const XK_L: Keysym = 0x006c;
pub const XK_M: Keysym = 0x006d;
pub const XK_N: Keysym = 0x006e;
pub const XK_O: Keysym = 0x006f;
pub const XK_P: Keysym = 0x0070;
pub const XK_Q: Keysym = 0x0071;
pub const XK_R: Keysym = 0x0072;
pub const XK_S: Keysym = 0x0073;
pub const XK_T: Keysym = 0x0074;
pub const XK_U: Keysym = 0x0075;
pub const XK_V: Keysym = 0x0076;
pub const XK_W: Keysym = 0x0077;
pub const XK_X: Keysym = 0x0078;
pub const XK_Y: Keysym = 0x0079;
pub const XK_Z: Keysym = 0x007a;

pub const XK_RETURN: Keysym = 0xff0d;
pub const XK_TAB: Keysym = 0xff09;
pub const XK_ESCAPE: Keysym = 0xff1b;
pub const XK_PRINT: Keysym = 0xff61;
pub const XK_LEFT: Keysym = 0xff51;
pub const XK_UP: Keysym = 0xff52;
pub const XK_RIGHT: Keysym = 0xff53;
pub const XK_DOWN: Keysym = 0xff54;
pub const XK_F1: Keysym = 0xffbe;
pub const XK_F2: Keysym = 0xffbf;
pub const XK_F3: Keysym = 0xffc0;
pub const XK_F4: Keysym = 0xffc1;
pub const XK_F5: Keysym = 0xffc2;
pub const XK_F6: Keysym = 0xffc3;
pub const XK_F7: Keysym = 0xffc4;
pub const XK_F8: Keysym = 0xffc5;
pub const XK_F9: Keysym = 0xffc6;
pub const XK_F10: Keysym = 0xffc7;
pub const XK_F11: Keysym = 0xffc8;
pub const XK_F12: Keysym = 0xffc9;
pub const XK_ALT_L: Keysym = 0xffe9;
pub const XK_ALT_R: Keysym = 0xffea;
pub const XK_SUPER_L: Keysym = 0xffeb;
pub const XK_SUPER_R: Keysym = 0xffec;

/// Resolves a config-file key name. Single printable characters name
/// themselves; everything else uses the conventional keysym name.
pub fn keysym_from_name(name: &str) -> Option<Keysym> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next())
        && c.is_ascii_graphic()
    {
        return Some(c.to_ascii_lowercase() as Keysym);
    }

    match name {
        "Return" | "Enter" => Some(XK_RETURN),
        "space" | "Space" => Some(XK_SPACE),
        "Tab" => Some(XK_TAB),
        "Escape" => Some(XK_ESCAPE),
        "Print" => Some(XK_PRINT),
        "Left" => Some(XK_LEFT),
        "Right" => Some(XK_RIGHT),
        "Up" => Some(XK_UP),
        "Down" => Some(XK_DOWN),
        "comma" => Some(XK_COMMA),
        "period" => Some(XK_PERIOD),
        "grave" => Some(XK_GRAVE),
        "minus" => Some(XK_MINUS),
        "equal" => Some(XK_EQUAL),
        "semicolon" => Some(XK_SEMICOLON),
        "slash" => Some(XK_SLASH),
        "backslash" => Some(XK_BACKSLASH),
        "apostrophe" => Some(XK_APOSTROPHE),
        "bracketleft" => Some(XK_BRACKETLEFT),
        "bracketright" => Some(XK_BRACKETRIGHT),
        "Alt_L" => Some(XK_ALT_L),
        "Alt_R" => Some(XK_ALT_R),
        "Super_L" => Some(XK_SUPER_L),
        "Super_R" => Some(XK_SUPER_R),
        "F1" => Some(XK_F1),
        "F2" => Some(XK_F2),
        "F3" => Some(XK_F3),
        "F4" => Some(XK_F4),
        "F5" => Some(XK_F5),
        "F6" => Some(XK_F6),
        "F7" => Some(XK_F7),
        "F8" => Some(XK_F8),
        "F9" => Some(XK_F9),
        "F10" => Some(XK_F10),
        "F11" => Some(XK_F11),
        "F12" => Some(XK_F12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_characters_name_themselves() {
        assert_eq!(keysym_from_name("j"), Some(XK_J));
        assert_eq!(keysym_from_name("J"), Some(XK_J));
        assert_eq!(keysym_from_name("4"), Some(XK_4));
    }

    #[test]
    fn named_keys_resolve() {
        assert_eq!(keysym_from_name("Return"), Some(XK_RETURN));
        assert_eq!(keysym_from_name("F10"), Some(XK_F10));
        assert_eq!(keysym_from_name("NoSuchKey"), None);
    }
}
