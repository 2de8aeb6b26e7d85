use serde::Deserialize;
use x11rb::protocol::xproto::{ButtonPressEvent, KeyButMask, KeyPressEvent, ModMask};

use crate::keyboard::KeyboardMapping;
use crate::keyboard::keysyms::Keysym;

#[derive(Debug, Copy, Clone, Deserialize, PartialEq, Eq)]
pub enum KeyAction {
    Spawn,
    SpawnTerminal,
    KillClient,
    FocusStack,
    FocusDirection,
    AltTab,
    IncNumMaster,
    SetMasterFactor,
    Zoom,
    ToggleBar,
    ViewTag,
    ViewAll,
    ToggleView,
    MoveToTag,
    TagAll,
    ToggleTag,
    ToggleScratch,
    SetLayout,
    ToggleFloating,
    ToggleFullScreen,
    ToggleFakeFullScreen,
    FocusMonitor,
    TagMonitor,
    MoveMouse,
    ResizeMouse,
    SignalStatusBar,
    Quit,
    Restart,
    None,
}

#[derive(Debug, Clone)]
pub enum Arg {
    None,
    Int(i32),
    Str(String),
    Array(Vec<String>),
}

impl Arg {
    pub const fn none() -> Self {
        Arg::None
    }
}

#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub modifiers: Vec<KeyButMask>,
    pub keysym: Keysym,
    pub action: KeyAction,
    pub arg: Arg,
}

impl KeyBinding {
    pub fn new(modifiers: Vec<KeyButMask>, keysym: Keysym, action: KeyAction, arg: Arg) -> Self {
        Self {
            modifiers,
            keysym,
            action,
            arg,
        }
    }
}

/// Where on screen a pointer binding applies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub enum ClickContext {
    TagBar,
    LayoutSymbol,
    WindowTitle,
    StatusText,
    ClientWindow,
    RootWindow,
}

#[derive(Debug, Clone)]
pub struct ButtonBinding {
    pub click: ClickContext,
    pub modifiers: Vec<KeyButMask>,
    pub button: u8,
    pub action: KeyAction,
    pub arg: Arg,
}

impl ButtonBinding {
    pub fn new(
        click: ClickContext,
        modifiers: Vec<KeyButMask>,
        button: u8,
        action: KeyAction,
        arg: Arg,
    ) -> Self {
        Self {
            click,
            modifiers,
            button,
            action,
            arg,
        }
    }
}

pub fn modifiers_to_mask(modifiers: &[KeyButMask]) -> u16 {
    modifiers
        .iter()
        .fold(0u16, |acc, &modifier| acc | u16::from(modifier))
}

/// Strips the lock and numlock bits, which never distinguish bindings.
pub fn clean_mask(state: u16) -> u16 {
    state & !(u16::from(ModMask::LOCK) | u16::from(ModMask::M2))
}

/// Every binding whose keysym and cleaned modifier mask match, in table
/// order. Entries that differ only in the stripped bits all fire.
pub fn matching_key_actions(
    event: &KeyPressEvent,
    keybindings: &[KeyBinding],
    mapping: &KeyboardMapping,
) -> Vec<(KeyAction, Arg)> {
    let event_keysym = mapping.keycode_to_keysym(event.detail);
    let event_mask = clean_mask(event.state.into());

    keybindings
        .iter()
        .filter(|binding| {
            binding.keysym == event_keysym
                && clean_mask(modifiers_to_mask(&binding.modifiers)) == event_mask
        })
        .map(|binding| (binding.action, binding.arg.clone()))
        .collect()
}

/// Same table-order all-matches rule for pointer bindings, pre-filtered by
/// the click context the press resolved to.
pub fn matching_button_actions(
    event: &ButtonPressEvent,
    click: ClickContext,
    buttons: &[ButtonBinding],
) -> Vec<(KeyAction, Arg)> {
    let event_mask = clean_mask(event.state.into());

    buttons
        .iter()
        .filter(|binding| {
            binding.click == click
                && binding.button == event.detail
                && clean_mask(modifiers_to_mask(&binding.modifiers)) == event_mask
        })
        .map(|binding| (binding.action, binding.arg.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::keysyms;

    fn mapping_with_single_key(keycode: u8, keysym: Keysym) -> KeyboardMapping {
        let mut syms = vec![0; 256];
        syms[(keycode - 8) as usize] = keysym;
        KeyboardMapping {
            syms,
            keysyms_per_keycode: 1,
            min_keycode: 8,
        }
    }

    fn key_event(keycode: u8, state: u16) -> KeyPressEvent {
        KeyPressEvent {
            response_type: 2,
            detail: keycode,
            sequence: 0,
            time: 0,
            root: 0,
            event: 0,
            child: 0,
            root_x: 0,
            root_y: 0,
            event_x: 0,
            event_y: 0,
            state: state.into(),
            same_screen: true,
        }
    }

    #[test]
    fn all_matching_bindings_fire_in_table_order() {
        let mapping = mapping_with_single_key(44, keysyms::XK_J);
        let bindings = vec![
            KeyBinding::new(
                vec![KeyButMask::MOD4],
                keysyms::XK_J,
                KeyAction::FocusStack,
                Arg::Int(1),
            ),
            KeyBinding::new(
                vec![KeyButMask::MOD4, KeyButMask::LOCK],
                keysyms::XK_J,
                KeyAction::Zoom,
                Arg::None,
            ),
            KeyBinding::new(
                vec![KeyButMask::MOD4, KeyButMask::SHIFT],
                keysyms::XK_J,
                KeyAction::KillClient,
                Arg::None,
            ),
        ];

        let event = key_event(44, u16::from(ModMask::M4) | u16::from(ModMask::LOCK));
        let actions = matching_key_actions(&event, &bindings, &mapping);
        let kinds: Vec<KeyAction> = actions.iter().map(|(action, _)| *action).collect();
        assert_eq!(kinds, vec![KeyAction::FocusStack, KeyAction::Zoom]);
    }

    #[test]
    fn numlock_state_does_not_block_a_match() {
        let mapping = mapping_with_single_key(44, keysyms::XK_J);
        let bindings = vec![KeyBinding::new(
            vec![KeyButMask::MOD4],
            keysyms::XK_J,
            KeyAction::FocusStack,
            Arg::Int(1),
        )];

        let event = key_event(44, u16::from(ModMask::M4) | u16::from(ModMask::M2));
        assert_eq!(matching_key_actions(&event, &bindings, &mapping).len(), 1);
    }

    #[test]
    fn differing_real_modifiers_do_not_match() {
        let mapping = mapping_with_single_key(44, keysyms::XK_J);
        let bindings = vec![KeyBinding::new(
            vec![KeyButMask::MOD4],
            keysyms::XK_J,
            KeyAction::FocusStack,
            Arg::Int(1),
        )];

        let event = key_event(44, u16::from(ModMask::M4) | u16::from(ModMask::SHIFT));
        assert!(matching_key_actions(&event, &bindings, &mapping).is_empty());
    }
}
