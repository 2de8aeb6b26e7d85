use x11rb::protocol::xinerama::ConnectionExt as _;
use x11rb::protocol::xproto::{Screen, Window};
use x11rb::rust_connection::RustConnection;

use crate::client::TagMask;
use crate::errors::WmError;
use crate::layout::{LayoutKind, Rect};

type WmResult<T> = Result<T, WmError>;

/// Per-tag layout memory. Slot 0 belongs to the all-tags view, slot `i + 1`
/// to tag `i`; switching views restores the slot's settings.
#[derive(Debug, Clone)]
pub struct Pertag {
    pub current_tag: usize,
    pub previous_tag: usize,
    pub num_masters: Vec<i32>,
    pub master_factors: Vec<f32>,
    pub selected_layouts: Vec<usize>,
    pub layouts: Vec<[LayoutKind; 2]>,
    pub show_bars: Vec<bool>,
}

impl Pertag {
    pub fn new(
        tag_count: usize,
        num_master: i32,
        master_factor: f32,
        layouts: [LayoutKind; 2],
        show_bar: bool,
    ) -> Self {
        let slots = tag_count + 1;
        Self {
            current_tag: 1,
            previous_tag: 1,
            num_masters: vec![num_master; slots],
            master_factors: vec![master_factor; slots],
            selected_layouts: vec![0; slots],
            layouts: vec![layouts; slots],
            show_bars: vec![show_bar; slots],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Monitor {
    pub layout_symbol: String,
    pub master_factor: f32,
    pub num_master: i32,
    pub monitor_number: usize,
    pub bar_y: i32,
    pub extra_bar_y: i32,
    pub screen_x: i32,
    pub screen_y: i32,
    pub screen_width: i32,
    pub screen_height: i32,
    pub window_area_x: i32,
    pub window_area_y: i32,
    pub window_area_width: i32,
    pub window_area_height: i32,
    pub selected_tags_index: usize,
    pub selected_layout_index: usize,
    pub tagset: [TagMask; 2],
    pub show_bar: bool,
    pub top_bar: bool,
    pub clients: Vec<Window>,
    pub stack: Vec<Window>,
    pub selected_client: Option<Window>,
    pub layouts: [LayoutKind; 2],
    pub pertag: Pertag,
}

impl Monitor {
    pub fn new(
        monitor_number: usize,
        geometry: Rect,
        layouts: [LayoutKind; 2],
        master_factor: f32,
        num_master: i32,
        show_bar: bool,
        top_bar: bool,
        tag_count: usize,
    ) -> Self {
        Self {
            layout_symbol: layouts[0].symbol().to_string(),
            master_factor,
            num_master,
            monitor_number,
            bar_y: 0,
            extra_bar_y: 0,
            screen_x: geometry.x,
            screen_y: geometry.y,
            screen_width: geometry.width,
            screen_height: geometry.height,
            window_area_x: geometry.x,
            window_area_y: geometry.y,
            window_area_width: geometry.width,
            window_area_height: geometry.height,
            selected_tags_index: 0,
            selected_layout_index: 0,
            tagset: [1, 1],
            show_bar,
            top_bar,
            clients: Vec::new(),
            stack: Vec::new(),
            selected_client: None,
            layouts,
            pertag: Pertag::new(tag_count, num_master, master_factor, layouts, show_bar),
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.screen_x
            && x < self.screen_x + self.screen_width
            && y >= self.screen_y
            && y < self.screen_y + self.screen_height
    }

    pub fn selected_tags(&self) -> TagMask {
        self.tagset[self.selected_tags_index]
    }

    pub fn current_layout(&self) -> LayoutKind {
        self.layouts[self.selected_layout_index]
    }

    pub fn screen_rect(&self) -> Rect {
        Rect {
            x: self.screen_x,
            y: self.screen_y,
            width: self.screen_width,
            height: self.screen_height,
        }
    }

    pub fn window_area(&self) -> Rect {
        Rect {
            x: self.window_area_x,
            y: self.window_area_y,
            width: self.window_area_width,
            height: self.window_area_height,
        }
    }

    pub fn set_geometry(&mut self, geometry: Rect) {
        self.screen_x = geometry.x;
        self.screen_y = geometry.y;
        self.screen_width = geometry.width;
        self.screen_height = geometry.height;
    }

    /// Recomputes the usable area and the bar positions. The primary bar sits
    /// at the configured edge, the extra bar at the opposite one; hidden bars
    /// park offscreen at a negative y.
    pub fn update_bar_position(&mut self, bar_height: i32, extra_bar: bool) {
        self.window_area_x = self.screen_x;
        self.window_area_width = self.screen_width;
        self.window_area_y = self.screen_y;
        self.window_area_height = self.screen_height;

        if self.show_bar {
            self.window_area_height -= bar_height;
            if self.top_bar {
                self.bar_y = self.screen_y;
                self.window_area_y += bar_height;
            } else {
                self.bar_y = self.screen_y + self.window_area_height;
            }
            if extra_bar {
                self.window_area_height -= bar_height;
                if self.top_bar {
                    self.extra_bar_y = self.screen_y + self.screen_height - bar_height;
                } else {
                    self.extra_bar_y = self.screen_y;
                    self.window_area_y += bar_height;
                }
            } else {
                self.extra_bar_y = -bar_height;
            }
        } else {
            self.bar_y = -bar_height;
            self.extra_bar_y = -bar_height;
        }
    }

    // List and stack membership. The tiling order prepends so a new client
    // becomes the master; the stack prepends so its head is the most
    // recently focused client.

    pub fn attach(&mut self, window: Window) {
        self.clients.insert(0, window);
    }

    pub fn detach(&mut self, window: Window) {
        self.clients.retain(|&w| w != window);
    }

    pub fn attach_stack(&mut self, window: Window) {
        self.stack.insert(0, window);
    }

    pub fn detach_stack(&mut self, window: Window) {
        self.stack.retain(|&w| w != window);
    }

    pub fn promote_in_stack(&mut self, window: Window) {
        self.detach_stack(window);
        self.attach_stack(window);
    }

    /// Switches the view to `mask` (0 means "back to the previous view") and
    /// restores that tag's pertag settings. Returns false when the requested
    /// view is already active.
    pub fn apply_view(&mut self, mask: TagMask, all_tags: TagMask) -> bool {
        if (mask & all_tags) == self.selected_tags() && mask != 0 {
            return false;
        }

        self.selected_tags_index ^= 1;

        if mask != 0 {
            self.tagset[self.selected_tags_index] = mask & all_tags;
            if mask == all_tags {
                self.pertag.previous_tag = self.pertag.current_tag;
                self.pertag.current_tag = 0;
            } else if mask.is_power_of_two() {
                self.pertag.previous_tag = self.pertag.current_tag;
                self.pertag.current_tag = mask.trailing_zeros() as usize + 1;
            }
            // multi-tag views keep the existing pertag bookkeeping
        } else {
            std::mem::swap(&mut self.pertag.current_tag, &mut self.pertag.previous_tag);
        }

        self.restore_pertag();
        true
    }

    /// Exclusive-ors `mask` into the view, refusing to empty it. The pertag
    /// slot only moves when the current tag drops out of the view; the
    /// replacement is whichever remaining bit is lowest.
    pub fn apply_toggle_view(&mut self, mask: TagMask, all_tags: TagMask) -> bool {
        let new_tagset = self.selected_tags() ^ mask;
        if new_tagset == 0 {
            return false;
        }

        self.tagset[self.selected_tags_index] = new_tagset;

        if new_tagset == all_tags {
            self.pertag.previous_tag = self.pertag.current_tag;
            self.pertag.current_tag = 0;
        }
        if self.pertag.current_tag > 0
            && new_tagset & (1 << (self.pertag.current_tag - 1)) == 0
        {
            self.pertag.previous_tag = self.pertag.current_tag;
            self.pertag.current_tag = new_tagset.trailing_zeros() as usize + 1;
        }

        self.restore_pertag();
        true
    }

    fn restore_pertag(&mut self) {
        let slot = self.pertag.current_tag;
        self.num_master = self.pertag.num_masters[slot];
        self.master_factor = self.pertag.master_factors[slot];
        self.selected_layout_index = self.pertag.selected_layouts[slot];
        self.layouts = self.pertag.layouts[slot];
    }

    pub fn pertag_wants_bar(&self) -> bool {
        self.pertag.show_bars[self.pertag.current_tag]
    }

    // Mutations below write through to the current pertag slot so the value
    // survives a view round trip.

    pub fn adjust_num_master(&mut self, delta: i32) {
        self.num_master = (self.num_master + delta).max(0);
        self.pertag.num_masters[self.pertag.current_tag] = self.num_master;
    }

    pub fn set_master_factor(&mut self, factor: f32) {
        self.master_factor = factor;
        self.pertag.master_factors[self.pertag.current_tag] = self.master_factor;
    }

    pub fn set_show_bar(&mut self, show: bool) {
        self.show_bar = show;
        self.pertag.show_bars[self.pertag.current_tag] = show;
    }

    /// With a layout, selects it in the alternate slot; without one, flips
    /// back to the previously selected slot.
    pub fn set_layout(&mut self, layout: Option<LayoutKind>) {
        let slot = self.pertag.current_tag;
        if layout.is_none() || layout != Some(self.current_layout()) {
            self.selected_layout_index ^= 1;
            self.pertag.selected_layouts[slot] = self.selected_layout_index;
        }
        if let Some(kind) = layout {
            self.layouts[self.selected_layout_index] = kind;
            self.pertag.layouts[slot] = self.layouts;
        }
    }
}

/// Queries the xinerama extension for the output topology, deduplicated and
/// sorted top-to-bottom then left-to-right. Falls back to one monitor
/// covering the whole screen.
pub fn detect_monitor_geometries(
    connection: &RustConnection,
    screen: &Screen,
) -> WmResult<Vec<Rect>> {
    let fallback = || {
        vec![Rect {
            x: 0,
            y: 0,
            width: screen.width_in_pixels as i32,
            height: screen.height_in_pixels as i32,
        }]
    };

    let xinerama_active = connection
        .xinerama_is_active()
        .ok()
        .and_then(|cookie| cookie.reply().ok())
        .is_some_and(|reply| reply.state != 0);

    let mut geometries = Vec::<Rect>::new();

    if xinerama_active {
        let Ok(query_cookie) = connection.xinerama_query_screens() else {
            return Ok(fallback());
        };
        let Ok(query_reply) = query_cookie.reply() else {
            return Ok(fallback());
        };

        for screen_info in &query_reply.screen_info {
            if screen_info.width == 0 || screen_info.height == 0 {
                continue;
            }

            let candidate = Rect {
                x: screen_info.x_org as i32,
                y: screen_info.y_org as i32,
                width: screen_info.width as i32,
                height: screen_info.height as i32,
            };

            if !geometries.contains(&candidate) {
                geometries.push(candidate);
            }
        }
    }

    if geometries.is_empty() {
        geometries = fallback();
    }

    geometries.sort_by(|a, b| match a.y.cmp(&b.y) {
        std::cmp::Ordering::Equal => a.x.cmp(&b.x),
        other => other,
    });

    Ok(geometries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_monitor() -> Monitor {
        Monitor::new(
            0,
            Rect {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
            [LayoutKind::Tile, LayoutKind::Floating],
            0.55,
            1,
            true,
            true,
            9,
        )
    }

    #[test]
    fn attach_and_detach_keep_single_membership() {
        let mut monitor = test_monitor();
        monitor.attach(10);
        monitor.attach(11);
        monitor.attach_stack(10);
        monitor.attach_stack(11);

        assert_eq!(monitor.clients, vec![11, 10]);
        assert_eq!(monitor.clients.iter().filter(|&&w| w == 10).count(), 1);

        monitor.detach(10);
        monitor.detach_stack(10);
        assert_eq!(monitor.clients, vec![11]);
        assert_eq!(monitor.stack, vec![11]);
    }

    #[test]
    fn stack_promotion_moves_a_window_to_the_front() {
        let mut monitor = test_monitor();
        monitor.attach_stack(1);
        monitor.attach_stack(2);
        monitor.attach_stack(3);
        monitor.promote_in_stack(1);
        assert_eq!(monitor.stack, vec![1, 3, 2]);
    }

    #[test]
    fn view_round_trip_restores_pertag_settings() {
        let mut monitor = test_monitor();
        let all_tags = 0x1ff;

        // On tag 1: three masters at 0.7, monocle layout.
        monitor.adjust_num_master(2);
        monitor.set_master_factor(0.7);
        monitor.set_layout(Some(LayoutKind::Monocle));

        assert!(monitor.apply_view(1 << 1, all_tags));
        assert_eq!(monitor.num_master, 1);
        assert!((monitor.master_factor - 0.55).abs() < f32::EPSILON);
        assert_eq!(monitor.current_layout(), LayoutKind::Tile);

        assert!(monitor.apply_view(1 << 0, all_tags));
        assert_eq!(monitor.num_master, 3);
        assert!((monitor.master_factor - 0.7).abs() < f32::EPSILON);
        assert_eq!(monitor.current_layout(), LayoutKind::Monocle);
        assert_eq!(monitor.layouts, monitor.pertag.layouts[1]);
    }

    #[test]
    fn view_zero_toggles_back_to_the_previous_view() {
        let mut monitor = test_monitor();
        let all_tags = 0x1ff;
        monitor.apply_view(1 << 4, all_tags);
        monitor.apply_view(0, all_tags);
        assert_eq!(monitor.selected_tags(), 1 << 0);
        monitor.apply_view(0, all_tags);
        assert_eq!(monitor.selected_tags(), 1 << 4);
    }

    #[test]
    fn view_of_the_active_tag_is_a_no_op() {
        let mut monitor = test_monitor();
        assert!(!monitor.apply_view(1 << 0, 0x1ff));
        assert_eq!(monitor.selected_tags(), 1 << 0);
    }

    #[test]
    fn toggle_view_refuses_to_empty_the_view() {
        let mut monitor = test_monitor();
        assert!(!monitor.apply_toggle_view(1 << 0, 0x1ff));
        assert_eq!(monitor.selected_tags(), 1 << 0);
    }

    #[test]
    fn toggle_view_keeps_current_tag_while_it_stays_visible() {
        let mut monitor = test_monitor();
        let all_tags = 0x1ff;
        assert!(monitor.apply_toggle_view(1 << 3, all_tags));
        assert_eq!(monitor.pertag.current_tag, 1);

        // Dropping tag 1 moves the slot to the lowest remaining bit.
        assert!(monitor.apply_toggle_view(1 << 0, all_tags));
        assert_eq!(monitor.pertag.current_tag, 4);
    }

    #[test]
    fn bar_position_reserves_space_for_both_bars() {
        let mut monitor = test_monitor();
        monitor.update_bar_position(20, true);
        assert_eq!(monitor.bar_y, 0);
        assert_eq!(monitor.extra_bar_y, 1060);
        assert_eq!(monitor.window_area_y, 20);
        assert_eq!(monitor.window_area_height, 1040);

        monitor.show_bar = false;
        monitor.update_bar_position(20, true);
        assert_eq!(monitor.bar_y, -20);
        assert_eq!(monitor.window_area_height, 1080);
    }

    #[test]
    fn set_layout_without_an_argument_toggles_the_slot() {
        let mut monitor = test_monitor();
        assert_eq!(monitor.current_layout(), LayoutKind::Tile);
        monitor.set_layout(None);
        assert_eq!(monitor.current_layout(), LayoutKind::Floating);
        monitor.set_layout(None);
        assert_eq!(monitor.current_layout(), LayoutKind::Tile);

        monitor.set_layout(Some(LayoutKind::GaplessGrid));
        assert_eq!(monitor.current_layout(), LayoutKind::GaplessGrid);
        monitor.set_layout(None);
        assert_eq!(monitor.current_layout(), LayoutKind::Tile);
    }
}
