use x11rb::protocol::xproto::Window;

use crate::icon::ClientIcon;

pub type TagMask = u32;

#[derive(Debug, Clone)]
pub struct Client {
    pub window: Window,
    pub name: String,
    pub icon: Option<ClientIcon>,
    pub monitor_index: usize,
    pub tags: TagMask,

    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,

    // Geometry before the fullscreen/placement override, for restore
    pub old_x: i32,
    pub old_y: i32,
    pub old_width: i32,
    pub old_height: i32,

    // Last user-set floating geometry, untouched while the client is tiled
    pub float_x: i32,
    pub float_y: i32,
    pub float_width: i32,
    pub float_height: i32,

    pub border_width: i32,
    pub old_border_width: i32,

    pub base_width: i32,
    pub base_height: i32,
    pub increment_width: i32,
    pub increment_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub min_width: i32,
    pub min_height: i32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub hints_valid: bool,

    pub is_fixed: bool,
    pub is_floating: bool,
    pub is_urgent: bool,
    pub never_focus: bool,
    pub old_floating_state: bool,
    pub is_fullscreen: bool,
    pub is_fake_fullscreen: bool,
}

impl Client {
    pub fn new(window: Window, monitor_index: usize, tags: TagMask) -> Self {
        Self {
            window,
            name: String::new(),
            icon: None,
            monitor_index,
            tags,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            old_x: 0,
            old_y: 0,
            old_width: 0,
            old_height: 0,
            float_x: 0,
            float_y: 0,
            float_width: 0,
            float_height: 0,
            border_width: 0,
            old_border_width: 0,
            base_width: 0,
            base_height: 0,
            increment_width: 0,
            increment_height: 0,
            max_width: 0,
            max_height: 0,
            min_width: 0,
            min_height: 0,
            min_aspect: 0.0,
            max_aspect: 0.0,
            hints_valid: false,
            is_fixed: false,
            is_floating: false,
            is_urgent: false,
            never_focus: false,
            old_floating_state: false,
            is_fullscreen: false,
            is_fake_fullscreen: false,
        }
    }

    pub fn width_with_border(&self) -> i32 {
        self.width + 2 * self.border_width
    }

    pub fn height_with_border(&self) -> i32 {
        self.height + 2 * self.border_width
    }

    pub fn is_visible_on(&self, view_mask: TagMask) -> bool {
        (self.tags & view_mask) != 0
    }

    pub fn contains_point(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && px < self.x + self.width_with_border()
            && py >= self.y
            && py < self.y + self.height_with_border()
    }

    pub fn store_geometry(&mut self) {
        self.old_x = self.x;
        self.old_y = self.y;
        self.old_width = self.width;
        self.old_height = self.height;
    }

    pub fn store_float_geometry(&mut self) {
        self.float_x = self.x;
        self.float_y = self.y;
        self.float_width = self.width;
        self.float_height = self.height;
    }

    /// Applies the WM_NORMAL_HINTS constraints to a proposed size. The order
    /// is significant: base size is subtracted before the aspect clamp unless
    /// the base size doubles as the minimum size, then the size is reduced to
    /// the increment grid, the base restored, and the result clamped to the
    /// absolute minimum and maximum.
    pub fn clamp_to_hints(&self, width: i32, height: i32) -> (i32, i32) {
        let mut w = width;
        let mut h = height;

        let base_is_min =
            self.base_width == self.min_width && self.base_height == self.min_height;

        if !base_is_min {
            w -= self.base_width;
            h -= self.base_height;
        }

        if self.min_aspect > 0.0 && self.max_aspect > 0.0 {
            if self.max_aspect < w as f32 / h as f32 {
                w = (h as f32 * self.max_aspect + 0.5) as i32;
            } else if self.min_aspect < h as f32 / w as f32 {
                h = (w as f32 * self.min_aspect + 0.5) as i32;
            }
        }

        if base_is_min {
            w -= self.base_width;
            h -= self.base_height;
        }

        if self.increment_width > 0 {
            w -= w % self.increment_width;
        }
        if self.increment_height > 0 {
            h -= h % self.increment_height;
        }

        w = (w + self.base_width).max(self.min_width);
        h = (h + self.base_height).max(self.min_height);

        if self.max_width > 0 {
            w = w.min(self.max_width);
        }
        if self.max_height > 0 {
            h = h.min(self.max_height);
        }

        (w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hinted_client() -> Client {
        let mut client = Client::new(1, 0, 1);
        client.hints_valid = true;
        client
    }

    #[test]
    fn increments_snap_down_to_the_grid() {
        let mut client = hinted_client();
        client.base_width = 4;
        client.base_height = 8;
        client.increment_width = 10;
        client.increment_height = 20;
        let (w, h) = client.clamp_to_hints(127, 233);
        // 127 - 4 = 123 -> 120, +4; 233 - 8 = 225 -> 220, +8
        assert_eq!((w, h), (124, 228));
    }

    #[test]
    fn minimum_size_wins_over_increments() {
        let mut client = hinted_client();
        client.min_width = 50;
        client.min_height = 60;
        client.increment_width = 7;
        let (w, h) = client.clamp_to_hints(10, 10);
        assert_eq!((w, h), (50, 60));
    }

    #[test]
    fn maximum_size_caps_the_result() {
        let mut client = hinted_client();
        client.max_width = 300;
        client.max_height = 200;
        let (w, h) = client.clamp_to_hints(1000, 1000);
        assert_eq!((w, h), (300, 200));
    }

    #[test]
    fn aspect_ratio_narrows_a_wide_proposal() {
        let mut client = hinted_client();
        client.min_aspect = 0.5;
        client.max_aspect = 2.0;
        let (w, h) = client.clamp_to_hints(1000, 100);
        assert_eq!(w, 200);
        assert_eq!(h, 100);
    }

    #[test]
    fn float_geometry_survives_a_store_cycle() {
        let mut client = Client::new(7, 0, 1);
        client.x = 12;
        client.y = 34;
        client.width = 400;
        client.height = 300;
        client.store_float_geometry();
        client.x = 0;
        client.y = 0;
        client.width = 960;
        client.height = 1080;
        assert_eq!(
            (client.float_x, client.float_y, client.float_width, client.float_height),
            (12, 34, 400, 300)
        );
    }
}
