//! The opaque draw surface the bar renders through: an offscreen pixmap with
//! Xft text on top, copied to the bar window once a frame is complete. This
//! is the only module that talks to Xlib directly.

use std::ffi::CString;

use x11::xft::{XftColor, XftDraw, XftDrawStringUtf8, XftFont, XftFontOpenName};
use x11::xlib::{Display, Drawable};
use x11::xrender::XRenderColor;

use crate::errors::X11Error;
use crate::icon::ClientIcon;

pub struct Font {
    xft_font: *mut XftFont,
    display: *mut Display,
}

impl Font {
    pub fn new(display: *mut Display, screen: i32, font_name: &str) -> Result<Self, X11Error> {
        let font_name_cstr =
            CString::new(font_name).map_err(|_| X11Error::FontLoadFailed(font_name.to_string()))?;

        let xft_font = unsafe { XftFontOpenName(display, screen, font_name_cstr.as_ptr()) };

        if xft_font.is_null() {
            return Err(X11Error::FontLoadFailed(font_name.to_string()));
        }

        Ok(Font { xft_font, display })
    }

    pub fn height(&self) -> u16 {
        unsafe { (*self.xft_font).height as u16 }
    }

    pub fn ascent(&self) -> i16 {
        unsafe { (*self.xft_font).ascent as i16 }
    }

    pub fn text_width(&self, text: &str) -> u16 {
        unsafe {
            let mut extents = std::mem::zeroed();
            x11::xft::XftTextExtentsUtf8(
                self.display,
                self.xft_font,
                text.as_ptr(),
                text.len() as i32,
                &mut extents,
            );
            extents.width
        }
    }
}

impl Drop for Font {
    fn drop(&mut self) {
        unsafe {
            if !self.xft_font.is_null() {
                x11::xft::XftFontClose(self.display, self.xft_font);
            }
        }
    }
}

pub struct DrawSurface {
    display: *mut Display,
    screen_number: i32,
    pixmap: x11::xlib::Pixmap,
    xft_draw: *mut XftDraw,
    width: u32,
    height: u32,
}

impl DrawSurface {
    pub fn new(
        display: *mut Display,
        screen_number: i32,
        window: Drawable,
        width: u32,
        height: u32,
    ) -> Result<Self, X11Error> {
        let (pixmap, xft_draw) =
            Self::create_backing(display, screen_number, window, width, height)?;

        Ok(Self {
            display,
            screen_number,
            pixmap,
            xft_draw,
            width,
            height,
        })
    }

    fn create_backing(
        display: *mut Display,
        screen_number: i32,
        window: Drawable,
        width: u32,
        height: u32,
    ) -> Result<(x11::xlib::Pixmap, *mut XftDraw), X11Error> {
        unsafe {
            let depth = x11::xlib::XDefaultDepth(display, screen_number);
            let pixmap = x11::xlib::XCreatePixmap(display, window, width, height, depth as u32);
            let visual = x11::xlib::XDefaultVisual(display, screen_number);
            let colormap = x11::xlib::XDefaultColormap(display, screen_number);

            let xft_draw = x11::xft::XftDrawCreate(display, pixmap, visual, colormap);
            if xft_draw.is_null() {
                x11::xlib::XFreePixmap(display, pixmap);
                return Err(X11Error::DrawCreateFailed);
            }
            Ok((pixmap, xft_draw))
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn resize(&mut self, window: Drawable, width: u32, height: u32) -> Result<(), X11Error> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        let (pixmap, xft_draw) =
            Self::create_backing(self.display, self.screen_number, window, width, height)?;
        unsafe {
            x11::xft::XftDrawDestroy(self.xft_draw);
            x11::xlib::XFreePixmap(self.display, self.pixmap);
        }
        self.pixmap = pixmap;
        self.xft_draw = xft_draw;
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn fill_rect(&self, color: u32, x: i32, y: i32, width: u32, height: u32) {
        unsafe {
            let gc = x11::xlib::XCreateGC(self.display, self.pixmap, 0, std::ptr::null_mut());
            x11::xlib::XSetForeground(self.display, gc, color as u64);
            x11::xlib::XFillRectangle(self.display, self.pixmap, gc, x, y, width, height);
            x11::xlib::XFreeGC(self.display, gc);
        }
    }

    pub fn draw_text(&self, font: &Font, color: u32, x: i16, y: i16, text: &str) {
        let red = ((color >> 16) & 0xff) as u16;
        let green = ((color >> 8) & 0xff) as u16;
        let blue = (color & 0xff) as u16;

        let render_color = XRenderColor {
            red: red << 8 | red,
            green: green << 8 | green,
            blue: blue << 8 | blue,
            alpha: 0xffff,
        };

        let mut xft_color: XftColor = unsafe { std::mem::zeroed() };

        unsafe {
            x11::xft::XftColorAllocValue(
                x11::xft::XftDrawDisplay(self.xft_draw),
                x11::xft::XftDrawVisual(self.xft_draw),
                x11::xft::XftDrawColormap(self.xft_draw),
                &render_color,
                &mut xft_color,
            );

            XftDrawStringUtf8(
                self.xft_draw,
                &xft_color,
                font.xft_font,
                x as i32,
                y as i32,
                text.as_ptr(),
                text.len() as i32,
            );

            x11::xft::XftColorFree(
                x11::xft::XftDrawDisplay(self.xft_draw),
                x11::xft::XftDrawVisual(self.xft_draw),
                x11::xft::XftDrawColormap(self.xft_draw),
                &mut xft_color,
            );
        }
    }

    /// Blends the ARGB icon over `background` in software and pushes the
    /// result to the pixmap; the default visuals here carry no alpha.
    pub fn draw_icon(&self, icon: &ClientIcon, x: i32, y: i32, background: u32) {
        let width = icon.width as usize;
        let height = icon.height as usize;
        if width == 0 || height == 0 {
            return;
        }

        unsafe {
            let byte_count = width * height * 4;
            let data = libc::malloc(byte_count) as *mut u8;
            if data.is_null() {
                return;
            }

            for (index, &pixel) in icon.pixels.iter().enumerate() {
                let alpha = (pixel >> 24) & 0xff;
                let blend = |channel_shift: u32| -> u32 {
                    let fg = (pixel >> channel_shift) & 0xff;
                    let bg = (background >> channel_shift) & 0xff;
                    (fg * alpha + bg * (255 - alpha)) / 255
                };
                let composited = blend(16) << 16 | blend(8) << 8 | blend(0);
                std::ptr::copy_nonoverlapping(
                    composited.to_ne_bytes().as_ptr(),
                    data.add(index * 4),
                    4,
                );
            }

            let visual = x11::xlib::XDefaultVisual(self.display, self.screen_number);
            let depth = x11::xlib::XDefaultDepth(self.display, self.screen_number);
            let image = x11::xlib::XCreateImage(
                self.display,
                visual,
                depth as u32,
                x11::xlib::ZPixmap,
                0,
                data as *mut libc::c_char,
                width as u32,
                height as u32,
                32,
                0,
            );
            if image.is_null() {
                libc::free(data as *mut libc::c_void);
                return;
            }

            let gc = x11::xlib::XCreateGC(self.display, self.pixmap, 0, std::ptr::null_mut());
            x11::xlib::XPutImage(
                self.display,
                self.pixmap,
                gc,
                image,
                0,
                0,
                x,
                y,
                width as u32,
                height as u32,
            );
            x11::xlib::XFreeGC(self.display, gc);
            // XPutImage copies the data out, so the image struct and its
            // buffer can be released by hand (XDestroyImage is a macro the
            // bindings do not carry).
            libc::free(data as *mut libc::c_void);
            libc::free(image as *mut libc::c_void);
        }
    }

    pub fn copy_to_window(&self, window: Drawable) {
        unsafe {
            let gc = x11::xlib::XCreateGC(self.display, window, 0, std::ptr::null_mut());
            x11::xlib::XCopyArea(
                self.display,
                self.pixmap,
                window,
                gc,
                0,
                0,
                self.width,
                self.height,
                0,
                0,
            );
            x11::xlib::XFreeGC(self.display, gc);
            x11::xlib::XSync(self.display, 0);
        }
    }
}

impl Drop for DrawSurface {
    fn drop(&mut self) {
        unsafe {
            if !self.xft_draw.is_null() {
                x11::xft::XftDrawDestroy(self.xft_draw);
            }
            x11::xlib::XFreePixmap(self.display, self.pixmap);
        }
    }
}
