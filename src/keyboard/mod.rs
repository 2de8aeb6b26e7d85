use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;

use crate::errors::X11Error;

pub mod handlers;
pub mod keysyms;

pub use handlers::{Arg, KeyAction};

use handlers::{KeyBinding, modifiers_to_mask};
use keysyms::Keysym;

pub struct KeyboardMapping {
    pub syms: Vec<Keysym>,
    pub keysyms_per_keycode: u8,
    pub min_keycode: Keycode,
}

impl KeyboardMapping {
    pub fn keycode_to_keysym(&self, keycode: Keycode) -> Keysym {
        if keycode < self.min_keycode {
            return 0;
        }
        let index = (keycode - self.min_keycode) as usize * self.keysyms_per_keycode as usize;
        self.syms.get(index).copied().unwrap_or(0)
    }

    pub fn find_keycode(&self, keysym: Keysym) -> Option<Keycode> {
        let per_keycode = self.keysyms_per_keycode.max(1) as usize;
        self.syms
            .chunks(per_keycode)
            .position(|chunk| chunk.first() == Some(&keysym))
            .map(|offset| self.min_keycode + offset as Keycode)
    }
}

pub fn get_keyboard_mapping(
    connection: &impl Connection,
) -> std::result::Result<KeyboardMapping, X11Error> {
    let setup = connection.setup();
    let min_keycode = setup.min_keycode;
    let max_keycode = setup.max_keycode;

    let mapping = connection
        .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
        .reply()?;

    Ok(KeyboardMapping {
        syms: mapping.keysyms,
        keysyms_per_keycode: mapping.keysyms_per_keycode,
        min_keycode,
    })
}

/// Grabs every bound key on the root window, once per combination of the
/// ignorable lock and numlock bits.
pub fn grab_keys(
    connection: &impl Connection,
    root: Window,
    keybindings: &[KeyBinding],
) -> std::result::Result<KeyboardMapping, X11Error> {
    let setup = connection.setup();
    let min_keycode = setup.min_keycode;
    let max_keycode = setup.max_keycode;

    let mapping = get_keyboard_mapping(connection)?;

    connection.ungrab_key(Grab::ANY, root, ModMask::ANY)?;

    let ignore_masks = [
        0u16,
        u16::from(ModMask::LOCK),
        u16::from(ModMask::M2),
        u16::from(ModMask::LOCK | ModMask::M2),
    ];

    for keycode in min_keycode..=max_keycode {
        for keybinding in keybindings {
            if keybinding.keysym != mapping.keycode_to_keysym(keycode) {
                continue;
            }
            let modifier_mask = modifiers_to_mask(&keybinding.modifiers);
            for &ignore_mask in &ignore_masks {
                connection.grab_key(
                    true,
                    root,
                    (modifier_mask | ignore_mask).into(),
                    keycode,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                )?;
            }
        }
    }

    connection.flush()?;
    Ok(mapping)
}
