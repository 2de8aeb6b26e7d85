use serde::Deserialize;
use std::str::FromStr;

/// A screen-space rectangle in pixels, border not included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LayoutKind {
    Tile,
    Columns,
    Monocle,
    GaplessGrid,
    Floating,
}

impl LayoutKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Tile => "[]=",
            Self::Columns => "|||",
            Self::Monocle => "[M]",
            Self::GaplessGrid => "###",
            Self::Floating => "><>",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tile => "tile",
            Self::Columns => "columns",
            Self::Monocle => "monocle",
            Self::GaplessGrid => "grid",
            Self::Floating => "floating",
        }
    }

    /// The symbol shown in the bar; monocle reports how many clients it is
    /// stacking, e.g. "[3]".
    pub fn symbol_for_count(&self, visible_count: usize) -> String {
        match self {
            Self::Monocle if visible_count > 0 => format!("[{visible_count}]"),
            _ => self.symbol().to_string(),
        }
    }

    pub fn has_arrange(&self) -> bool {
        !matches!(self, Self::Floating)
    }

    /// Computes a rectangle for every tiled client. Returns `None` for the
    /// floating layout, which never places windows.
    pub fn arrange(
        &self,
        area: Rect,
        count: usize,
        num_master: i32,
        master_factor: f32,
    ) -> Option<Vec<Rect>> {
        match self {
            Self::Tile => Some(tile(area, count, num_master, master_factor)),
            Self::Columns => Some(columns(area, count, num_master, master_factor)),
            Self::Monocle => Some(monocle(area, count)),
            Self::GaplessGrid => Some(gapless_grid(area, count)),
            Self::Floating => None,
        }
    }
}

impl FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "tile" | "tiling" => Ok(Self::Tile),
            "columns" | "col" => Ok(Self::Columns),
            "monocle" => Ok(Self::Monocle),
            "grid" | "gaplessgrid" => Ok(Self::GaplessGrid),
            "floating" => Ok(Self::Floating),
            _ => Err(format!("invalid layout name: {}", s)),
        }
    }
}

/// Master column on the left, remaining clients stacked in the right column.
/// Row heights divide the remaining space at each step so the column fills
/// the area exactly; the last window in a column receives whatever is left.
pub fn tile(area: Rect, count: usize, num_master: i32, master_factor: f32) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }

    let num_master = num_master.max(0) as usize;
    let master_width = if count > num_master {
        if num_master > 0 {
            (area.width as f32 * master_factor) as i32
        } else {
            0
        }
    } else {
        area.width
    };

    let mut geometries = Vec::with_capacity(count);
    let mut master_y = 0;
    let mut stack_y = 0;

    for index in 0..count {
        if index < num_master {
            let remaining = count.min(num_master) - index;
            let height = (area.height - master_y) / remaining as i32;
            geometries.push(Rect {
                x: area.x,
                y: area.y + master_y,
                width: master_width,
                height,
            });
            if master_y + height < area.height {
                master_y += height;
            }
        } else {
            let remaining = count - index;
            let height = (area.height - stack_y) / remaining as i32;
            geometries.push(Rect {
                x: area.x + master_width,
                y: area.y + stack_y,
                width: area.width - master_width,
                height,
            });
            if stack_y + height < area.height {
                stack_y += height;
            }
        }
    }

    geometries
}

/// Masters side by side across the master area; the remaining clients form a
/// single column occupying the full leftover width.
pub fn columns(area: Rect, count: usize, num_master: i32, master_factor: f32) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }

    let num_master = num_master.max(0) as usize;
    let master_width = if count > num_master {
        if num_master > 0 {
            (area.width as f32 * master_factor) as i32
        } else {
            0
        }
    } else {
        area.width
    };

    let mut geometries = Vec::with_capacity(count);
    let mut master_x = 0;
    let mut stack_y = 0;

    for index in 0..count {
        if index < num_master {
            let remaining = count.min(num_master) - index;
            let width = (master_width - master_x) / remaining as i32;
            geometries.push(Rect {
                x: area.x + master_x,
                y: area.y,
                width,
                height: area.height,
            });
            master_x += width;
        } else {
            let remaining = count - index;
            let height = (area.height - stack_y) / remaining as i32;
            geometries.push(Rect {
                x: area.x + master_x,
                y: area.y + stack_y,
                width: area.width - master_x,
                height,
            });
            if stack_y + height < area.height {
                stack_y += height;
            }
        }
    }

    geometries
}

pub fn monocle(area: Rect, count: usize) -> Vec<Rect> {
    vec![area; count]
}

/// Columns grow as the square root of the client count, except that five
/// clients split 2:3 rather than 1:2:2. The last columns absorb the
/// remainder row.
pub fn gapless_grid(area: Rect, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }

    let mut cols = 0usize;
    while cols <= count / 2 {
        if cols * cols >= count {
            break;
        }
        cols += 1;
    }
    if count == 5 {
        cols = 2;
    }
    let cols = cols.max(1);

    let mut rows = count / cols;
    let cell_width = area.width / cols as i32;

    let mut geometries = Vec::with_capacity(count);
    let mut column_number = 0usize;
    let mut row_number = 0usize;

    for index in 0..count {
        if index / rows + 1 > cols - count % cols {
            rows = count / cols + 1;
        }
        let cell_height = if rows > 0 {
            area.height / rows as i32
        } else {
            area.height
        };
        geometries.push(Rect {
            x: area.x + column_number as i32 * cell_width,
            y: area.y + row_number as i32 * cell_height,
            width: cell_width,
            height: cell_height,
        });
        row_number += 1;
        if row_number >= rows {
            row_number = 0;
            column_number += 1;
        }
    }

    geometries
}

#[cfg(test)]
mod tests {
    use super::*;

    const AREA: Rect = Rect {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    };

    #[test]
    fn tile_splits_master_and_stack_at_the_factor() {
        let rects = tile(AREA, 3, 1, 0.5);
        assert_eq!(
            rects[0],
            Rect {
                x: 0,
                y: 0,
                width: 960,
                height: 1080
            }
        );
        assert_eq!(
            rects[1],
            Rect {
                x: 960,
                y: 0,
                width: 960,
                height: 540
            }
        );
        assert_eq!(
            rects[2],
            Rect {
                x: 960,
                y: 540,
                width: 960,
                height: 540
            }
        );
    }

    #[test]
    fn tile_column_heights_sum_to_the_usable_height_exactly() {
        let area = Rect {
            x: 0,
            y: 0,
            width: 800,
            height: 1000,
        };
        let rects = tile(area, 3, 3, 0.5);
        let total: i32 = rects.iter().map(|r| r.height).sum();
        assert_eq!(total, 1000);
        assert_eq!(rects[2].y + rects[2].height, 1000);
    }

    #[test]
    fn tile_with_no_stack_gives_masters_the_full_width() {
        let rects = tile(AREA, 2, 4, 0.5);
        assert!(rects.iter().all(|r| r.width == 1920));
    }

    #[test]
    fn tile_with_zero_masters_gives_the_stack_everything() {
        let rects = tile(AREA, 2, 0, 0.5);
        assert!(rects.iter().all(|r| r.x == 0 && r.width == 1920));
        assert_eq!(rects[0].height + rects[1].height, 1080);
    }

    #[test]
    fn columns_places_masters_side_by_side() {
        let rects = columns(AREA, 3, 2, 0.5);
        assert_eq!(rects[0].x, 0);
        assert_eq!(rects[0].width, 480);
        assert_eq!(rects[1].x, 480);
        assert_eq!(rects[1].width, 480);
        assert!(rects[..2].iter().all(|r| r.height == 1080));
        assert_eq!(rects[2].x, 960);
        assert_eq!(rects[2].width, 960);
    }

    #[test]
    fn monocle_stacks_every_client_over_the_full_area() {
        let rects = monocle(AREA, 3);
        assert_eq!(rects.len(), 3);
        assert!(rects.iter().all(|r| *r == AREA));
    }

    #[test]
    fn monocle_symbol_reports_the_visible_count() {
        assert_eq!(LayoutKind::Monocle.symbol_for_count(3), "[3]");
        assert_eq!(LayoutKind::Tile.symbol_for_count(3), "[]=");
    }

    #[test]
    fn grid_single_client_fills_the_area() {
        let rects = gapless_grid(AREA, 1);
        assert_eq!(rects, vec![AREA]);
    }

    #[test]
    fn grid_four_clients_use_two_columns() {
        let rects = gapless_grid(AREA, 4);
        let columns: std::collections::BTreeSet<i32> = rects.iter().map(|r| r.x).collect();
        assert_eq!(columns.len(), 2);
        assert!(rects.iter().all(|r| r.width == 960 && r.height == 540));
    }

    #[test]
    fn grid_five_clients_split_two_to_three() {
        let rects = gapless_grid(AREA, 5);
        let first_column: Vec<&Rect> = rects.iter().filter(|r| r.x == 0).collect();
        let second_column: Vec<&Rect> = rects.iter().filter(|r| r.x == 960).collect();
        assert_eq!(first_column.len(), 2);
        assert_eq!(second_column.len(), 3);
        assert!(first_column.iter().all(|r| r.height == 540));
        assert!(second_column.iter().all(|r| r.height == 360));
    }

    #[test]
    fn floating_has_no_arrange_function() {
        assert!(LayoutKind::Floating.arrange(AREA, 3, 1, 0.5).is_none());
        assert!(!LayoutKind::Floating.has_arrange());
    }
}
