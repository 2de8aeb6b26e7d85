/// Window icons arrive as a `_NET_WM_ICON` cardinal array holding any number
/// of `width, height, pixels...` entries in ARGB order. The best-fitting
/// resolution is picked and scaled to the configured icon height.

pub const ICON_DIMENSION_LIMIT: u32 = 16384;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIcon {
    pub width: u32,
    pub height: u32,
    /// Row-major ARGB pixels.
    pub pixels: Vec<u32>,
}

/// Extracts and scales an icon from raw `_NET_WM_ICON` data. Malformed data
/// (a dimension at or above the sanity ceiling, or an advertised pixel count
/// exceeding the buffer) abandons extraction entirely, leaving the client
/// iconless.
pub fn extract_icon(data: &[u32], target_size: u32) -> Option<ClientIcon> {
    let candidates = parse_icon_entries(data)?;
    let (width, height, pixels) = select_best_fit(&candidates, target_size)?;
    Some(scale_icon(width, height, pixels, target_size))
}

struct IconEntry<'a> {
    width: u32,
    height: u32,
    pixels: &'a [u32],
}

fn parse_icon_entries(data: &[u32]) -> Option<Vec<IconEntry<'_>>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset + 2 <= data.len() {
        let width = data[offset];
        let height = data[offset + 1];
        offset += 2;

        if width == 0 || height == 0 {
            return None;
        }
        if width >= ICON_DIMENSION_LIMIT || height >= ICON_DIMENSION_LIMIT {
            return None;
        }

        let pixel_count = (width as usize).checked_mul(height as usize)?;
        if pixel_count > data.len() - offset {
            return None;
        }

        entries.push(IconEntry {
            width,
            height,
            pixels: &data[offset..offset + pixel_count],
        });
        offset += pixel_count;
    }

    if entries.is_empty() { None } else { Some(entries) }
}

/// Picks the stored resolution closest to the target: the smallest entry
/// whose larger dimension is at least the target, or failing that the
/// largest entry below it.
fn select_best_fit<'a>(
    entries: &'a [IconEntry<'a>],
    target_size: u32,
) -> Option<(u32, u32, &'a [u32])> {
    let mut best: Option<&IconEntry> = None;

    for entry in entries {
        let extent = entry.width.max(entry.height);
        let better = match best {
            None => true,
            Some(current) => {
                let current_extent = current.width.max(current.height);
                if extent >= target_size {
                    current_extent < target_size || extent < current_extent
                } else {
                    current_extent < target_size && extent > current_extent
                }
            }
        };
        if better {
            best = Some(entry);
        }
    }

    best.map(|entry| (entry.width, entry.height, entry.pixels))
}

fn scale_icon(width: u32, height: u32, pixels: &[u32], target_size: u32) -> ClientIcon {
    let (scaled_width, scaled_height) = if width > height {
        (target_size, (height * target_size / width).max(1))
    } else {
        ((width * target_size / height).max(1), target_size)
    };

    if scaled_width == width && scaled_height == height {
        return ClientIcon {
            width,
            height,
            pixels: pixels.to_vec(),
        };
    }

    let mut scaled = Vec::with_capacity((scaled_width * scaled_height) as usize);
    for y in 0..scaled_height {
        let source_y = y * height / scaled_height;
        for x in 0..scaled_width {
            let source_x = x * width / scaled_width;
            scaled.push(pixels[(source_y * width + source_x) as usize]);
        }
    }

    ClientIcon {
        width: scaled_width,
        height: scaled_height,
        pixels: scaled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icon_entry(width: u32, height: u32, fill: u32) -> Vec<u32> {
        let mut data = vec![width, height];
        data.extend(std::iter::repeat_n(fill, (width * height) as usize));
        data
    }

    #[test]
    fn prefers_the_smallest_entry_at_or_above_the_target() {
        let mut data = icon_entry(64, 64, 1);
        data.extend(icon_entry(16, 16, 2));
        data.extend(icon_entry(32, 32, 3));

        let icon = extract_icon(&data, 24).expect("icon");
        assert_eq!((icon.width, icon.height), (24, 24));
        assert!(icon.pixels.iter().all(|&p| p == 3));
    }

    #[test]
    fn falls_back_to_the_largest_entry_below_the_target() {
        let mut data = icon_entry(8, 8, 1);
        data.extend(icon_entry(12, 12, 2));

        let icon = extract_icon(&data, 24).expect("icon");
        assert!(icon.pixels.iter().all(|&p| p == 2));
    }

    #[test]
    fn keeps_aspect_ratio_when_scaling() {
        let data = icon_entry(64, 32, 7);
        let icon = extract_icon(&data, 16).expect("icon");
        assert_eq!((icon.width, icon.height), (16, 8));
        assert_eq!(icon.pixels.len(), 128);
    }

    #[test]
    fn oversized_dimensions_abort_extraction() {
        let data = vec![ICON_DIMENSION_LIMIT, 2, 0, 0];
        assert_eq!(extract_icon(&data, 16), None);
    }

    #[test]
    fn truncated_pixel_data_aborts_extraction() {
        // Advertises 8x8 but carries a single pixel.
        let data = vec![8, 8, 0xffffffff];
        assert_eq!(extract_icon(&data, 16), None);
    }

    #[test]
    fn exact_match_is_returned_unscaled() {
        let data = icon_entry(16, 16, 9);
        let icon = extract_icon(&data, 16).expect("icon");
        assert_eq!((icon.width, icon.height), (16, 16));
        assert_eq!(icon.pixels.len(), 256);
    }
}
