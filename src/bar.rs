use x11rb::COPY_DEPTH_FROM_PARENT;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::client::TagMask;
use crate::draw::{DrawSurface, Font};
use crate::errors::X11Error;
use crate::icon::ClientIcon;
use crate::status::StatusText;
use crate::{ColorScheme, Config};

/// What a press on the primary bar resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarClick {
    Tag(usize),
    LayoutSymbol,
    WindowTitle,
    Status(Option<u8>),
}

pub struct BarDrawInput<'a> {
    pub selected_tags: TagMask,
    pub occupied_tags: TagMask,
    pub urgent_tags: TagMask,
    pub layout_symbol: &'a str,
    pub title: &'a str,
    pub icon: Option<&'a ClientIcon>,
    pub title_selected: bool,
    pub draw_status: bool,
    pub status: &'a StatusText,
}

/// One monitor's bar pair: the primary bar showing tags, layout symbol,
/// title and the main status, and an optional extra bar carrying the extra
/// status line.
pub struct Bar {
    window: Window,
    extra_window: Option<Window>,
    surface: DrawSurface,
    extra_surface: Option<DrawSurface>,
    width: u16,
    height: u16,

    tags: Vec<String>,
    tag_widths: Vec<u16>,
    layout_symbol_width: u16,
    status_width: u16,
    status_segment_widths: Vec<(u16, Option<u8>)>,
    text_padding: u16,

    scheme_normal: ColorScheme,
    scheme_selected: ColorScheme,
    scheme_urgent: ColorScheme,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection: &RustConnection,
        screen: &Screen,
        screen_number: usize,
        config: &Config,
        display: *mut x11::xlib::Display,
        font: &Font,
        x: i16,
        y: i16,
        extra_y: i16,
        width: u16,
    ) -> Result<Self, X11Error> {
        let height = (font.height() as f32 * 1.4) as u16;
        let text_padding = (font.height() as f32 * 0.4) as u16;

        let window = Self::create_bar_window(connection, screen, config, x, y, width, height)?;
        let surface = DrawSurface::new(
            display,
            screen_number as i32,
            window as x11::xlib::Drawable,
            width as u32,
            height as u32,
        )?;

        let (extra_window, extra_surface) = if config.extra_bar {
            let extra =
                Self::create_bar_window(connection, screen, config, x, extra_y, width, height)?;
            let extra_surface = DrawSurface::new(
                display,
                screen_number as i32,
                extra as x11::xlib::Drawable,
                width as u32,
                height as u32,
            )?;
            (Some(extra), Some(extra_surface))
        } else {
            (None, None)
        };

        connection.flush()?;

        let tag_widths = config
            .tags
            .iter()
            .map(|tag| font.text_width(tag) + 2 * text_padding)
            .collect();

        Ok(Bar {
            window,
            extra_window,
            surface,
            extra_surface,
            width,
            height,
            tags: config.tags.clone(),
            tag_widths,
            layout_symbol_width: 0,
            status_width: 0,
            status_segment_widths: Vec::new(),
            text_padding,
            scheme_normal: config.scheme_normal,
            scheme_selected: config.scheme_selected,
            scheme_urgent: config.scheme_urgent,
        })
    }

    fn create_bar_window(
        connection: &RustConnection,
        screen: &Screen,
        config: &Config,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    ) -> Result<Window, X11Error> {
        let window = connection.generate_id()?;
        connection.create_window(
            COPY_DEPTH_FROM_PARENT,
            window,
            screen.root,
            x,
            y,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .background_pixel(config.scheme_normal.background)
                .event_mask(EventMask::EXPOSURE | EventMask::BUTTON_PRESS)
                .override_redirect(1),
        )?;
        connection.map_window(window)?;
        Ok(window)
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn extra_window(&self) -> Option<Window> {
        self.extra_window
    }

    pub fn owns_window(&self, window: Window) -> bool {
        self.window == window || self.extra_window == Some(window)
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Moves the bars to their monitor edges; a hidden bar parks at a
    /// negative y.
    pub fn reposition(
        &mut self,
        connection: &RustConnection,
        x: i16,
        y: i16,
        extra_y: i16,
        width: u16,
    ) -> Result<(), X11Error> {
        connection.configure_window(
            self.window,
            &ConfigureWindowAux::new()
                .x(x as i32)
                .y(y as i32)
                .width(width as u32),
        )?;
        self.surface
            .resize(self.window as x11::xlib::Drawable, width as u32, self.height as u32)?;

        if let Some(extra_window) = self.extra_window {
            connection.configure_window(
                extra_window,
                &ConfigureWindowAux::new()
                    .x(x as i32)
                    .y(extra_y as i32)
                    .width(width as u32),
            )?;
            if let Some(extra_surface) = &mut self.extra_surface {
                extra_surface.resize(
                    extra_window as x11::xlib::Drawable,
                    width as u32,
                    self.height as u32,
                )?;
            }
        }

        self.width = width;
        Ok(())
    }

    pub fn draw(&mut self, font: &Font, input: &BarDrawInput<'_>) {
        let normal = self.scheme_normal;
        self.surface
            .fill_rect(normal.background, 0, 0, self.width as u32, self.height as u32);

        let text_y = ((self.height - font.height()) / 2) as i16 + font.ascent();
        let mut x: u16 = 0;

        for (tag_index, tag) in self.tags.iter().enumerate() {
            let mask = 1 << tag_index;
            let is_selected = input.selected_tags & mask != 0;
            let is_urgent = input.urgent_tags & mask != 0;
            let is_occupied = input.occupied_tags & mask != 0;

            let scheme = if is_urgent {
                self.scheme_urgent
            } else if is_selected {
                self.scheme_selected
            } else {
                self.scheme_normal
            };

            let tag_width = self.tag_widths[tag_index];
            if is_selected || is_urgent {
                self.surface
                    .fill_rect(scheme.background, x as i32, 0, tag_width as u32, self.height as u32);
            }
            self.surface.draw_text(
                font,
                scheme.foreground,
                (x + self.text_padding) as i16,
                text_y,
                tag,
            );
            if is_occupied {
                let box_size = (font.height() / 4).max(2) as u32;
                self.surface
                    .fill_rect(scheme.foreground, x as i32 + 1, 1, box_size, box_size);
            }

            x += tag_width;
        }

        self.layout_symbol_width =
            font.text_width(input.layout_symbol) + 2 * self.text_padding;
        self.surface.draw_text(
            font,
            normal.foreground,
            (x + self.text_padding) as i16,
            text_y,
            input.layout_symbol,
        );
        x += self.layout_symbol_width;

        // Main status, right-aligned, with per-segment widths kept for
        // click-to-signal mapping.
        self.status_segment_widths.clear();
        self.status_width = 0;
        if input.draw_status {
            for segment in &input.status.segments {
                let segment_width = font.text_width(&segment.text);
                self.status_segment_widths.push((segment_width, segment.signal));
                self.status_width += segment_width;
            }
            let mut status_x = self.width.saturating_sub(self.status_width);
            for segment in &input.status.segments {
                self.surface.draw_text(
                    font,
                    normal.foreground,
                    status_x as i16,
                    text_y,
                    &segment.text,
                );
                status_x += font.text_width(&segment.text);
            }
        }

        // Whatever is left in the middle belongs to the focused client.
        let title_area_width = self.width.saturating_sub(x + self.status_width);
        if title_area_width > 0 {
            let scheme = if input.title_selected {
                self.scheme_selected
            } else {
                self.scheme_normal
            };
            if !input.title.is_empty() {
                self.surface.fill_rect(
                    scheme.background,
                    x as i32,
                    0,
                    title_area_width as u32,
                    self.height as u32,
                );
                let mut title_x = x + self.text_padding;
                if let Some(icon) = input.icon {
                    let icon_y = (self.height as i32 - icon.height as i32) / 2;
                    self.surface
                        .draw_icon(icon, title_x as i32, icon_y.max(0), scheme.background);
                    title_x += icon.width as u16 + self.text_padding;
                }
                self.surface
                    .draw_text(font, scheme.foreground, title_x as i16, text_y, input.title);
            }
        }

        self.surface.copy_to_window(self.window as x11::xlib::Drawable);
    }

    pub fn draw_extra(&mut self, font: &Font, status: &StatusText) {
        let (Some(extra_window), Some(extra_surface)) =
            (self.extra_window, self.extra_surface.as_ref())
        else {
            return;
        };

        let normal = self.scheme_normal;
        extra_surface.fill_rect(normal.background, 0, 0, self.width as u32, self.height as u32);

        if !status.extra.is_empty() {
            let text_y = ((self.height - font.height()) / 2) as i16 + font.ascent();
            let text_width = font.text_width(&status.extra);
            let text_x = self.width.saturating_sub(text_width + self.text_padding);
            extra_surface.draw_text(font, normal.foreground, text_x as i16, text_y, &status.extra);
        }

        extra_surface.copy_to_window(extra_window as x11::xlib::Drawable);
    }

    /// Resolves a press on the primary bar from its x coordinate, using the
    /// widths recorded by the last draw.
    pub fn resolve_click(&self, click_x: i16) -> BarClick {
        let click_x = click_x.max(0) as u16;
        let mut x = 0u16;

        for (tag_index, &tag_width) in self.tag_widths.iter().enumerate() {
            if click_x < x + tag_width {
                return BarClick::Tag(tag_index);
            }
            x += tag_width;
        }

        if click_x < x + self.layout_symbol_width {
            return BarClick::LayoutSymbol;
        }

        let status_start = self.width.saturating_sub(self.status_width);
        if self.status_width > 0 && click_x >= status_start {
            let offset = click_x - status_start;
            return BarClick::Status(StatusText::signal_at(&self.status_segment_widths, offset));
        }

        BarClick::WindowTitle
    }
}
