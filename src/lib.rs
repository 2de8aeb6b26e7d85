use serde::Deserialize;

pub mod bar;
pub mod client;
pub mod config;
pub mod draw;
pub mod errors;
pub mod icon;
pub mod keyboard;
pub mod layout;
pub mod monitor;
pub mod signal;
pub mod status;
pub mod window_manager;

pub mod prelude {
    pub use crate::ColorScheme;
    pub use crate::Scratchpad;
    pub use crate::WindowRule;
    pub use crate::keyboard::handlers::{ButtonBinding, ClickContext, KeyBinding};
    pub use crate::keyboard::{Arg, KeyAction, keysyms};
    pub use crate::layout::LayoutKind;
    pub use x11rb::protocol::xproto::KeyButMask;
}

use crate::client::TagMask;
use crate::keyboard::handlers::{ButtonBinding, ClickContext, KeyBinding};
use crate::keyboard::{Arg, KeyAction, keysyms};
use crate::layout::LayoutKind;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowRule {
    pub class: Option<String>,
    pub instance: Option<String>,
    pub title: Option<String>,
    pub tags: Option<TagMask>,
    pub is_floating: Option<bool>,
    pub is_fake_fullscreen: Option<bool>,
    pub monitor: Option<usize>,
}

impl WindowRule {
    pub fn matches(&self, class: &str, instance: &str, title: &str) -> bool {
        let class_matches = self
            .class
            .as_ref()
            .is_none_or(|c| class.contains(c.as_str()));
        let instance_matches = self
            .instance
            .as_ref()
            .is_none_or(|i| instance.contains(i.as_str()));
        let title_matches = self
            .title
            .as_ref()
            .is_none_or(|t| title.contains(t.as_str()));
        class_matches && instance_matches && title_matches
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleOutcome {
    pub tags: TagMask,
    pub is_floating: bool,
    pub is_fake_fullscreen: bool,
    pub monitor: Option<usize>,
}

/// Tags accumulate across every matching rule; the scalar fields keep the
/// value of the last matching rule that sets them.
pub fn resolve_rules(
    rules: &[WindowRule],
    class: &str,
    instance: &str,
    title: &str,
) -> RuleOutcome {
    let mut outcome = RuleOutcome::default();

    for rule in rules {
        if !rule.matches(class, instance, title) {
            continue;
        }
        if let Some(tags) = rule.tags {
            outcome.tags |= tags;
        }
        if let Some(is_floating) = rule.is_floating {
            outcome.is_floating = is_floating;
        }
        if let Some(is_fake_fullscreen) = rule.is_fake_fullscreen {
            outcome.is_fake_fullscreen = is_fake_fullscreen;
        }
        if let Some(monitor) = rule.monitor {
            outcome.monitor = Some(monitor);
        }
    }

    outcome
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scratchpad {
    pub name: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorScheme {
    pub foreground: u32,
    pub background: u32,
    pub border: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Appearance
    pub border_width: u32,
    pub font: String,
    pub icon_size: u32,

    // Bar color schemes
    pub scheme_normal: ColorScheme,
    pub scheme_selected: ColorScheme,
    pub scheme_urgent: ColorScheme,

    // Bars
    pub show_bar: bool,
    pub top_bar: bool,
    pub extra_bar: bool,
    pub status_bar_process: String,

    // Behavior
    pub snap: i32,
    pub respect_resize_hints: bool,
    pub terminal: Vec<String>,
    pub modkey: x11rb::protocol::xproto::KeyButMask,
    pub alt_tab_modifier: keysyms::Keysym,

    // Tags
    pub tags: Vec<String>,
    pub scratchpads: Vec<Scratchpad>,

    // Layout slots at startup; set_layout with no argument toggles between
    // the current and the previously selected slot
    pub layouts: [LayoutKind; 2],
    pub master_factor: f32,
    pub num_master: i32,

    // Bindings
    pub keybindings: Vec<KeyBinding>,
    pub buttons: Vec<ButtonBinding>,

    // Window rules
    pub window_rules: Vec<WindowRule>,
}

impl Config {
    /// Bitmask covering the configured (non-scratchpad) tags.
    pub fn all_tags_mask(&self) -> TagMask {
        (1 << self.tags.len()) - 1
    }

    /// The reserved pseudo-tag bit for scratchpad `index`.
    pub fn scratch_mask(&self, index: usize) -> TagMask {
        1 << (self.tags.len() + index)
    }

    /// Bitmask covering every scratchpad pseudo-tag.
    pub fn scratch_tags_mask(&self) -> TagMask {
        let mut mask = 0;
        for index in 0..self.scratchpads.len() {
            mask |= self.scratch_mask(index);
        }
        mask
    }

    pub fn scratchpad_for_window(&self, instance: &str, title: &str) -> Option<usize> {
        self.scratchpads
            .iter()
            .position(|pad| pad.name == instance || pad.name == title)
    }
}

impl Default for Config {
    fn default() -> Self {
        use x11rb::protocol::xproto::KeyButMask;

        const MODKEY: KeyButMask = KeyButMask::MOD4;
        const SHIFT: KeyButMask = KeyButMask::SHIFT;
        const CONTROL: KeyButMask = KeyButMask::CONTROL;

        let mut keybindings = vec![
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_P,
                KeyAction::Spawn,
                Arg::Array(vec!["dmenu_run".to_string()]),
            ),
            KeyBinding::new(
                vec![MODKEY, SHIFT],
                keysyms::XK_RETURN,
                KeyAction::SpawnTerminal,
                Arg::None,
            ),
            KeyBinding::new(vec![MODKEY], keysyms::XK_B, KeyAction::ToggleBar, Arg::None),
            KeyBinding::new(vec![MODKEY], keysyms::XK_J, KeyAction::FocusStack, Arg::Int(1)),
            KeyBinding::new(vec![MODKEY], keysyms::XK_K, KeyAction::FocusStack, Arg::Int(-1)),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_LEFT,
                KeyAction::FocusDirection,
                Arg::Int(0),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_RIGHT,
                KeyAction::FocusDirection,
                Arg::Int(1),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_UP,
                KeyAction::FocusDirection,
                Arg::Int(2),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_DOWN,
                KeyAction::FocusDirection,
                Arg::Int(3),
            ),
            KeyBinding::new(vec![MODKEY], keysyms::XK_I, KeyAction::IncNumMaster, Arg::Int(1)),
            KeyBinding::new(vec![MODKEY], keysyms::XK_D, KeyAction::IncNumMaster, Arg::Int(-1)),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_H,
                KeyAction::SetMasterFactor,
                Arg::Int(-5),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_L,
                KeyAction::SetMasterFactor,
                Arg::Int(5),
            ),
            KeyBinding::new(vec![MODKEY], keysyms::XK_RETURN, KeyAction::Zoom, Arg::None),
            KeyBinding::new(vec![MODKEY, SHIFT], keysyms::XK_C, KeyAction::KillClient, Arg::None),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_T,
                KeyAction::SetLayout,
                Arg::Str("tile".to_string()),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_F,
                KeyAction::SetLayout,
                Arg::Str("floating".to_string()),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_M,
                KeyAction::SetLayout,
                Arg::Str("monocle".to_string()),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_G,
                KeyAction::SetLayout,
                Arg::Str("grid".to_string()),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_O,
                KeyAction::SetLayout,
                Arg::Str("columns".to_string()),
            ),
            KeyBinding::new(vec![MODKEY], keysyms::XK_SPACE, KeyAction::SetLayout, Arg::None),
            KeyBinding::new(
                vec![MODKEY, SHIFT],
                keysyms::XK_SPACE,
                KeyAction::ToggleFloating,
                Arg::None,
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_E,
                KeyAction::ToggleFullScreen,
                Arg::None,
            ),
            KeyBinding::new(
                vec![MODKEY, SHIFT],
                keysyms::XK_E,
                KeyAction::ToggleFakeFullScreen,
                Arg::None,
            ),
            KeyBinding::new(vec![MODKEY], keysyms::XK_0, KeyAction::ViewAll, Arg::None),
            KeyBinding::new(vec![MODKEY, SHIFT], keysyms::XK_0, KeyAction::TagAll, Arg::None),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_COMMA,
                KeyAction::FocusMonitor,
                Arg::Int(-1),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_PERIOD,
                KeyAction::FocusMonitor,
                Arg::Int(1),
            ),
            KeyBinding::new(
                vec![MODKEY, SHIFT],
                keysyms::XK_COMMA,
                KeyAction::TagMonitor,
                Arg::Int(-1),
            ),
            KeyBinding::new(
                vec![MODKEY, SHIFT],
                keysyms::XK_PERIOD,
                KeyAction::TagMonitor,
                Arg::Int(1),
            ),
            KeyBinding::new(
                vec![MODKEY],
                keysyms::XK_GRAVE,
                KeyAction::ToggleScratch,
                Arg::Int(0),
            ),
            KeyBinding::new(
                vec![KeyButMask::MOD1],
                keysyms::XK_TAB,
                KeyAction::AltTab,
                Arg::Int(1),
            ),
            KeyBinding::new(
                vec![KeyButMask::MOD1, SHIFT],
                keysyms::XK_TAB,
                KeyAction::AltTab,
                Arg::Int(-1),
            ),
            KeyBinding::new(vec![MODKEY, SHIFT], keysyms::XK_Q, KeyAction::Quit, Arg::None),
            KeyBinding::new(
                vec![MODKEY, CONTROL, SHIFT],
                keysyms::XK_Q,
                KeyAction::Restart,
                Arg::None,
            ),
        ];

        let digit_keysyms = [
            keysyms::XK_1,
            keysyms::XK_2,
            keysyms::XK_3,
            keysyms::XK_4,
            keysyms::XK_5,
            keysyms::XK_6,
            keysyms::XK_7,
            keysyms::XK_8,
            keysyms::XK_9,
        ];
        for (tag_index, &keysym) in digit_keysyms.iter().enumerate() {
            let arg = Arg::Int(tag_index as i32);
            keybindings.push(KeyBinding::new(
                vec![MODKEY],
                keysym,
                KeyAction::ViewTag,
                arg.clone(),
            ));
            keybindings.push(KeyBinding::new(
                vec![MODKEY, CONTROL],
                keysym,
                KeyAction::ToggleView,
                arg.clone(),
            ));
            keybindings.push(KeyBinding::new(
                vec![MODKEY, SHIFT],
                keysym,
                KeyAction::MoveToTag,
                arg.clone(),
            ));
            keybindings.push(KeyBinding::new(
                vec![MODKEY, CONTROL, SHIFT],
                keysym,
                KeyAction::ToggleTag,
                arg,
            ));
        }

        let buttons = vec![
            ButtonBinding::new(
                ClickContext::LayoutSymbol,
                vec![],
                1,
                KeyAction::SetLayout,
                Arg::None,
            ),
            ButtonBinding::new(
                ClickContext::LayoutSymbol,
                vec![],
                3,
                KeyAction::SetLayout,
                Arg::Str("monocle".to_string()),
            ),
            ButtonBinding::new(ClickContext::WindowTitle, vec![], 2, KeyAction::Zoom, Arg::None),
            ButtonBinding::new(
                ClickContext::StatusText,
                vec![],
                1,
                KeyAction::SignalStatusBar,
                Arg::None,
            ),
            ButtonBinding::new(
                ClickContext::StatusText,
                vec![],
                2,
                KeyAction::SignalStatusBar,
                Arg::None,
            ),
            ButtonBinding::new(
                ClickContext::StatusText,
                vec![],
                3,
                KeyAction::SignalStatusBar,
                Arg::None,
            ),
            ButtonBinding::new(
                ClickContext::ClientWindow,
                vec![MODKEY],
                1,
                KeyAction::MoveMouse,
                Arg::None,
            ),
            ButtonBinding::new(
                ClickContext::ClientWindow,
                vec![MODKEY],
                2,
                KeyAction::ToggleFloating,
                Arg::None,
            ),
            ButtonBinding::new(
                ClickContext::ClientWindow,
                vec![MODKEY],
                3,
                KeyAction::ResizeMouse,
                Arg::None,
            ),
            ButtonBinding::new(ClickContext::TagBar, vec![], 1, KeyAction::ViewTag, Arg::None),
            ButtonBinding::new(ClickContext::TagBar, vec![], 3, KeyAction::ToggleView, Arg::None),
            ButtonBinding::new(
                ClickContext::TagBar,
                vec![MODKEY],
                1,
                KeyAction::MoveToTag,
                Arg::None,
            ),
            ButtonBinding::new(
                ClickContext::TagBar,
                vec![MODKEY],
                3,
                KeyAction::ToggleTag,
                Arg::None,
            ),
        ];

        Self {
            border_width: 2,
            font: "monospace:size=10".to_string(),
            icon_size: 16,
            scheme_normal: ColorScheme {
                foreground: 0xbbbbbb,
                background: 0x222222,
                border: 0x444444,
            },
            scheme_selected: ColorScheme {
                foreground: 0xeeeeee,
                background: 0x005577,
                border: 0x005577,
            },
            scheme_urgent: ColorScheme {
                foreground: 0xeeeeee,
                background: 0x772222,
                border: 0xff0000,
            },
            show_bar: true,
            top_bar: true,
            extra_bar: true,
            status_bar_process: "tatami-status".to_string(),
            snap: 32,
            respect_resize_hints: false,
            terminal: vec!["st".to_string()],
            modkey: MODKEY,
            alt_tab_modifier: keysyms::XK_ALT_L,
            tags: vec!["1", "2", "3", "4", "5", "6", "7", "8", "9"]
                .into_iter()
                .map(String::from)
                .collect(),
            scratchpads: vec![Scratchpad {
                name: "scratchpad".to_string(),
                command: vec![
                    "st".to_string(),
                    "-t".to_string(),
                    "scratchpad".to_string(),
                    "-g".to_string(),
                    "120x34".to_string(),
                ],
            }],
            layouts: [LayoutKind::Tile, LayoutKind::Floating],
            master_factor: 0.55,
            num_master: 1,
            keybindings,
            buttons,
            window_rules: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(
        class: Option<&str>,
        tags: Option<TagMask>,
        is_floating: Option<bool>,
        monitor: Option<usize>,
    ) -> WindowRule {
        WindowRule {
            class: class.map(String::from),
            instance: None,
            title: None,
            tags,
            is_floating,
            is_fake_fullscreen: None,
            monitor,
        }
    }

    #[test]
    fn rules_accumulate_tags_across_matches() {
        let rules = vec![
            rule(Some("Gimp"), Some(1 << 3), None, None),
            rule(Some("Gimp"), Some(1 << 5), None, None),
        ];
        let outcome = resolve_rules(&rules, "Gimp", "gimp", "GNU Image Manipulation Program");
        assert_eq!(outcome.tags, (1 << 3) | (1 << 5));
    }

    #[test]
    fn rules_last_match_wins_for_scalars() {
        let rules = vec![
            rule(Some("Firefox"), None, Some(true), Some(0)),
            rule(Some("Firefox"), None, Some(false), Some(1)),
        ];
        let outcome = resolve_rules(&rules, "Firefox", "Navigator", "Mozilla Firefox");
        assert!(!outcome.is_floating);
        assert_eq!(outcome.monitor, Some(1));
    }

    #[test]
    fn rules_only_apply_when_every_predicate_matches() {
        let rules = vec![WindowRule {
            class: Some("Term".to_string()),
            instance: Some("term".to_string()),
            title: Some("weechat".to_string()),
            tags: Some(1 << 8),
            is_floating: None,
            is_fake_fullscreen: None,
            monitor: None,
        }];
        let matched = resolve_rules(&rules, "Term", "term", "weechat 4.0");
        assert_eq!(matched.tags, 1 << 8);
        let unmatched = resolve_rules(&rules, "Term", "term", "shell");
        assert_eq!(unmatched.tags, 0);
    }

    #[test]
    fn scratch_masks_sit_above_the_tag_bits() {
        let config = Config::default();
        assert_eq!(config.all_tags_mask(), 0x1ff);
        assert_eq!(config.scratch_mask(0), 1 << 9);
        assert_eq!(config.all_tags_mask() & config.scratch_tags_mask(), 0);
    }
}
