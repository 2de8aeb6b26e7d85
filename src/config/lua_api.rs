//! Loads the Lua configuration file. The file is evaluated once and must
//! return a table; absent fields keep their built-in defaults.

use std::path::Path;
use std::str::FromStr;

use mlua::{Lua, Table, Value};
use x11rb::protocol::xproto::KeyButMask;

use crate::errors::ConfigError;
use crate::keyboard::handlers::{ButtonBinding, ClickContext, KeyBinding};
use crate::keyboard::{Arg, KeyAction, keysyms};
use crate::layout::LayoutKind;
use crate::{ColorScheme, Config, Scratchpad, WindowRule};

pub fn parse_lua_config(
    source: &str,
    config_directory: Option<&Path>,
) -> Result<Config, ConfigError> {
    let lua = Lua::new();

    if let Some(directory) = config_directory {
        let package: Table = lua.globals().get("package")?;
        let path: String = package.get("path")?;
        package.set(
            "path",
            format!("{}/?.lua;{}", directory.display(), path),
        )?;
    }

    let value: Value = lua.load(source).set_name("config.lua").eval()?;
    let Value::Table(root) = value else {
        return Err(ConfigError::NotATable);
    };

    let mut config = Config::default();

    if let Some(value) = root.get::<Option<u32>>("border_width")? {
        config.border_width = value;
    }
    if let Some(value) = root.get::<Option<String>>("font")? {
        config.font = value;
    }
    if let Some(value) = root.get::<Option<u32>>("icon_size")? {
        config.icon_size = value;
    }
    if let Some(value) = root.get::<Option<bool>>("show_bar")? {
        config.show_bar = value;
    }
    if let Some(value) = root.get::<Option<bool>>("top_bar")? {
        config.top_bar = value;
    }
    if let Some(value) = root.get::<Option<bool>>("extra_bar")? {
        config.extra_bar = value;
    }
    if let Some(value) = root.get::<Option<String>>("status_bar_process")? {
        config.status_bar_process = value;
    }
    if let Some(value) = root.get::<Option<i32>>("snap")? {
        config.snap = value;
    }
    if let Some(value) = root.get::<Option<bool>>("respect_resize_hints")? {
        config.respect_resize_hints = value;
    }
    if let Some(value) = root.get::<Option<Vec<String>>>("terminal")? {
        config.terminal = value;
    }
    if let Some(value) = root.get::<Option<f32>>("master_factor")? {
        config.master_factor = value.clamp(0.05, 0.95);
    }
    if let Some(value) = root.get::<Option<i32>>("num_master")? {
        config.num_master = value.max(0);
    }
    if let Some(name) = root.get::<Option<String>>("modkey")? {
        config.modkey = modifier_from_name(&name)?;
    }
    if let Some(name) = root.get::<Option<String>>("alt_tab_modifier")? {
        config.alt_tab_modifier =
            keysyms::keysym_from_name(&name).ok_or(ConfigError::UnknownKey(name))?;
    }

    if let Some(table) = root.get::<Option<Table>>("scheme_normal")? {
        config.scheme_normal = parse_scheme(&table, config.scheme_normal)?;
    }
    if let Some(table) = root.get::<Option<Table>>("scheme_selected")? {
        config.scheme_selected = parse_scheme(&table, config.scheme_selected)?;
    }
    if let Some(table) = root.get::<Option<Table>>("scheme_urgent")? {
        config.scheme_urgent = parse_scheme(&table, config.scheme_urgent)?;
    }

    if let Some(tags) = root.get::<Option<Vec<String>>>("tags")? {
        config.tags = tags;
    }

    if let Some(layouts) = root.get::<Option<Vec<String>>>("layouts")? {
        let mut parsed = [config.layouts[0], config.layouts[1]];
        for (slot, name) in layouts.iter().take(2).enumerate() {
            parsed[slot] = LayoutKind::from_str(name)
                .map_err(|_| ConfigError::UnknownLayout(name.clone()))?;
        }
        config.layouts = parsed;
    }

    if let Some(table) = root.get::<Option<Table>>("scratchpads")? {
        config.scratchpads = parse_scratchpads(&table)?;
    }

    if let Some(table) = root.get::<Option<Table>>("rules")? {
        config.window_rules = parse_rules(&table)?;
    }

    if let Some(table) = root.get::<Option<Table>>("keys")? {
        config.keybindings = parse_keys(&table)?;
    }

    if let Some(table) = root.get::<Option<Table>>("buttons")? {
        config.buttons = parse_buttons(&table)?;
    }

    if config.tags.is_empty() {
        return Err(ConfigError::NoTags);
    }
    let bits_needed = config.tags.len() + config.scratchpads.len();
    if bits_needed > 31 {
        return Err(ConfigError::TooManyTags(bits_needed));
    }

    Ok(config)
}

fn parse_scheme(table: &Table, defaults: ColorScheme) -> Result<ColorScheme, ConfigError> {
    Ok(ColorScheme {
        foreground: table
            .get::<Option<u32>>("foreground")?
            .unwrap_or(defaults.foreground),
        background: table
            .get::<Option<u32>>("background")?
            .unwrap_or(defaults.background),
        border: table.get::<Option<u32>>("border")?.unwrap_or(defaults.border),
    })
}

fn parse_scratchpads(table: &Table) -> Result<Vec<Scratchpad>, ConfigError> {
    let mut scratchpads = Vec::new();
    for entry in table.sequence_values::<Table>() {
        let entry = entry?;
        scratchpads.push(Scratchpad {
            name: entry.get("name")?,
            command: entry.get("command")?,
        });
    }
    Ok(scratchpads)
}

fn parse_rules(table: &Table) -> Result<Vec<WindowRule>, ConfigError> {
    let mut rules = Vec::new();
    for entry in table.sequence_values::<Table>() {
        let entry = entry?;
        rules.push(WindowRule {
            class: entry.get("class")?,
            instance: entry.get("instance")?,
            title: entry.get("title")?,
            tags: entry.get("tags")?,
            is_floating: entry.get("is_floating")?,
            is_fake_fullscreen: entry.get("is_fake_fullscreen")?,
            monitor: entry.get("monitor")?,
        });
    }
    Ok(rules)
}

fn parse_keys(table: &Table) -> Result<Vec<KeyBinding>, ConfigError> {
    let mut keybindings = Vec::new();
    for entry in table.sequence_values::<Table>() {
        let entry = entry?;
        let modifiers = parse_modifiers(&entry)?;
        let key_name: String = entry.get("key")?;
        let keysym = keysyms::keysym_from_name(&key_name)
            .ok_or(ConfigError::UnknownKey(key_name))?;
        let action_name: String = entry.get("action")?;
        let action = action_from_name(&action_name)?;
        let arg = parse_arg(entry.get("arg")?)?;
        keybindings.push(KeyBinding::new(modifiers, keysym, action, arg));
    }
    Ok(keybindings)
}

fn parse_buttons(table: &Table) -> Result<Vec<ButtonBinding>, ConfigError> {
    let mut buttons = Vec::new();
    for entry in table.sequence_values::<Table>() {
        let entry = entry?;
        let click_name: String = entry.get("click")?;
        let click = click_context_from_name(&click_name)?;
        let modifiers = parse_modifiers(&entry)?;
        let button: u8 = entry.get("button")?;
        let action_name: String = entry.get("action")?;
        let action = action_from_name(&action_name)?;
        let arg = parse_arg(entry.get("arg")?)?;
        buttons.push(ButtonBinding::new(click, modifiers, button, action, arg));
    }
    Ok(buttons)
}

fn parse_modifiers(entry: &Table) -> Result<Vec<KeyButMask>, ConfigError> {
    let names: Option<Vec<String>> = entry.get("mods")?;
    let mut modifiers = Vec::new();
    for name in names.unwrap_or_default() {
        modifiers.push(modifier_from_name(&name)?);
    }
    Ok(modifiers)
}

fn parse_arg(value: Option<Value>) -> Result<Arg, ConfigError> {
    Ok(match value {
        None | Some(Value::Nil) => Arg::None,
        Some(Value::Integer(number)) => Arg::Int(number as i32),
        Some(Value::Number(number)) => Arg::Int(number as i32),
        Some(Value::String(text)) => Arg::Str(text.to_string_lossy().to_string()),
        Some(Value::Table(table)) => {
            let mut parts = Vec::new();
            for part in table.sequence_values::<String>() {
                parts.push(part?);
            }
            Arg::Array(parts)
        }
        Some(other) => {
            return Err(ConfigError::Lua(mlua::Error::FromLuaConversionError {
                from: other.type_name(),
                to: "binding argument".to_string(),
                message: None,
            }));
        }
    })
}

fn modifier_from_name(name: &str) -> Result<KeyButMask, ConfigError> {
    match name {
        "Shift" => Ok(KeyButMask::SHIFT),
        "Control" | "Ctrl" => Ok(KeyButMask::CONTROL),
        "Mod1" | "Alt" => Ok(KeyButMask::MOD1),
        "Mod2" => Ok(KeyButMask::MOD2),
        "Mod3" => Ok(KeyButMask::MOD3),
        "Mod4" | "Super" => Ok(KeyButMask::MOD4),
        "Mod5" => Ok(KeyButMask::MOD5),
        _ => Err(ConfigError::UnknownModifier(name.to_string())),
    }
}

fn action_from_name(name: &str) -> Result<KeyAction, ConfigError> {
    match name {
        "spawn" => Ok(KeyAction::Spawn),
        "spawn_terminal" => Ok(KeyAction::SpawnTerminal),
        "kill_client" => Ok(KeyAction::KillClient),
        "focus_stack" => Ok(KeyAction::FocusStack),
        "focus_direction" => Ok(KeyAction::FocusDirection),
        "alt_tab" => Ok(KeyAction::AltTab),
        "inc_num_master" => Ok(KeyAction::IncNumMaster),
        "set_master_factor" => Ok(KeyAction::SetMasterFactor),
        "zoom" => Ok(KeyAction::Zoom),
        "toggle_bar" => Ok(KeyAction::ToggleBar),
        "view_tag" => Ok(KeyAction::ViewTag),
        "view_all" => Ok(KeyAction::ViewAll),
        "toggle_view" => Ok(KeyAction::ToggleView),
        "move_to_tag" => Ok(KeyAction::MoveToTag),
        "tag_all" => Ok(KeyAction::TagAll),
        "toggle_tag" => Ok(KeyAction::ToggleTag),
        "toggle_scratch" => Ok(KeyAction::ToggleScratch),
        "set_layout" => Ok(KeyAction::SetLayout),
        "toggle_floating" => Ok(KeyAction::ToggleFloating),
        "toggle_fullscreen" => Ok(KeyAction::ToggleFullScreen),
        "toggle_fake_fullscreen" => Ok(KeyAction::ToggleFakeFullScreen),
        "focus_monitor" => Ok(KeyAction::FocusMonitor),
        "tag_monitor" => Ok(KeyAction::TagMonitor),
        "move_mouse" => Ok(KeyAction::MoveMouse),
        "resize_mouse" => Ok(KeyAction::ResizeMouse),
        "signal_status_bar" => Ok(KeyAction::SignalStatusBar),
        "quit" => Ok(KeyAction::Quit),
        "restart" => Ok(KeyAction::Restart),
        "none" => Ok(KeyAction::None),
        _ => Err(ConfigError::UnknownAction(name.to_string())),
    }
}

fn click_context_from_name(name: &str) -> Result<ClickContext, ConfigError> {
    match name {
        "tag_bar" => Ok(ClickContext::TagBar),
        "layout_symbol" => Ok(ClickContext::LayoutSymbol),
        "window_title" => Ok(ClickContext::WindowTitle),
        "status_text" => Ok(ClickContext::StatusText),
        "client_window" => Ok(ClickContext::ClientWindow),
        "root_window" => Ok(ClickContext::RootWindow),
        _ => Err(ConfigError::UnknownClickContext(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_empty_table_keeps_the_defaults() {
        let config = parse_lua_config("return {}", None).expect("config");
        let defaults = Config::default();
        assert_eq!(config.tags, defaults.tags);
        assert_eq!(config.border_width, defaults.border_width);
        assert_eq!(config.keybindings.len(), defaults.keybindings.len());
    }

    #[test]
    fn fields_override_the_defaults() {
        let source = r#"
            return {
                border_width = 4,
                font = "JetBrains Mono:size=11",
                tags = { "web", "code", "chat" },
                master_factor = 0.6,
                modkey = "Alt",
                rules = {
                    { class = "Gimp", is_floating = true, tags = 4 },
                },
                keys = {
                    { mods = { "Alt" }, key = "Return", action = "spawn_terminal" },
                    { mods = { "Alt", "Shift" }, key = "q", action = "quit" },
                },
            }
        "#;
        let config = parse_lua_config(source, None).expect("config");
        assert_eq!(config.border_width, 4);
        assert_eq!(config.tags.len(), 3);
        assert_eq!(config.modkey, KeyButMask::MOD1);
        assert_eq!(config.window_rules.len(), 1);
        assert_eq!(config.window_rules[0].tags, Some(4));
        assert_eq!(config.keybindings.len(), 2);
        assert_eq!(config.keybindings[0].action, KeyAction::SpawnTerminal);
    }

    #[test]
    fn a_non_table_return_is_rejected() {
        assert!(matches!(
            parse_lua_config("return 7", None),
            Err(ConfigError::NotATable)
        ));
    }

    #[test]
    fn unknown_action_names_are_rejected() {
        let source = r#"
            return { keys = { { mods = {}, key = "x", action = "frobnicate" } } }
        "#;
        assert!(matches!(
            parse_lua_config(source, None),
            Err(ConfigError::UnknownAction(_))
        ));
    }

    #[test]
    fn tag_overflow_is_rejected() {
        let tags: Vec<String> = (0..32).map(|i| format!("\"{i}\"")).collect();
        let source = format!("return {{ tags = {{ {} }} }}", tags.join(", "));
        assert!(matches!(
            parse_lua_config(&source, None),
            Err(ConfigError::TooManyTags(_))
        ));
    }
}
