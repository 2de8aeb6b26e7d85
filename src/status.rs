//! The status bar process reports through the root window title. The
//! property carries a small stable wire format:
//!
//! - byte `0x1E` (record separator) splits the text into the main status,
//!   drawn right-aligned on the primary bar, and the extra status, drawn on
//!   the extra bar;
//! - within the main status, any other byte below `0x20` starts a new click
//!   segment and its value is the realtime-signal offset for that segment.
//!
//! Clicking a segment sends `SIGRTMIN + offset` to the status process.

use std::path::Path;

pub const STATUS_SEPARATOR: u8 = 0x1e;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSegment {
    pub text: String,
    pub signal: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusText {
    pub segments: Vec<StatusSegment>,
    pub extra: String,
}

impl StatusText {
    pub fn main_text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.extra.is_empty()
    }
}

pub fn parse_status(raw: &[u8]) -> StatusText {
    let (main_bytes, extra_bytes) = match raw.iter().position(|&b| b == STATUS_SEPARATOR) {
        Some(index) => (&raw[..index], &raw[index + 1..]),
        None => (raw, &[][..]),
    };

    let mut segments = Vec::new();
    let mut current_text = Vec::new();
    let mut current_signal = None;

    let mut flush = |text: &mut Vec<u8>, signal: Option<u8>| {
        if !text.is_empty() {
            segments.push(StatusSegment {
                text: String::from_utf8_lossy(text).into_owned(),
                signal,
            });
            text.clear();
        }
    };

    for &byte in main_bytes {
        if byte < 0x20 {
            flush(&mut current_text, current_signal);
            current_signal = Some(byte);
        } else {
            current_text.push(byte);
        }
    }
    flush(&mut current_text, current_signal);

    let extra: String = String::from_utf8_lossy(extra_bytes)
        .chars()
        .filter(|c| *c >= ' ')
        .collect();

    StatusText { segments, extra }
}

impl StatusText {
    /// Maps a click offset (pixels from the right edge of the drawn status,
    /// as accumulated per-segment widths) to the segment's signal. The bar
    /// feeds in the segments paired with their rendered widths.
    pub fn signal_at(widths: &[(u16, Option<u8>)], offset_from_left: u16) -> Option<u8> {
        let mut x = 0u16;
        for &(width, signal) in widths {
            x += width;
            if offset_from_left < x {
                return signal;
            }
        }
        None
    }
}

/// Finds the status process by scanning `/proc/<pid>/cmdline` for a first
/// argument whose basename matches, falling back to the kernel's `comm`
/// (which truncates names to 15 bytes).
pub fn find_status_bar_pid(process_name: &str) -> Option<i32> {
    find_status_bar_pid_in(Path::new("/proc"), process_name)
}

fn find_status_bar_pid_in(proc_root: &Path, process_name: &str) -> Option<i32> {
    let entries = std::fs::read_dir(proc_root).ok()?;
    let mut by_comm = None;

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(pid) = file_name.to_str().and_then(|name| name.parse::<i32>().ok()) else {
            continue;
        };

        if let Ok(cmdline) = std::fs::read(entry.path().join("cmdline"))
            && let Some(first_argument) = cmdline.split(|&b| b == 0).next()
            && !first_argument.is_empty()
        {
            let argv0 = String::from_utf8_lossy(first_argument).into_owned();
            let basename = argv0.rsplit('/').next().unwrap_or(&argv0).to_string();
            if basename == process_name {
                return Some(pid);
            }
        }

        if by_comm.is_none()
            && let Ok(comm) = std::fs::read_to_string(entry.path().join("comm"))
        {
            let truncated: String = process_name.chars().take(15).collect();
            if comm.trim_end() == truncated {
                by_comm = Some(pid);
            }
        }
    }

    by_comm
}

/// Delivers `SIGRTMIN + offset` to the status process, if one is running.
pub fn signal_status_bar(process_name: &str, signal_offset: u8) -> bool {
    let Some(pid) = find_status_bar_pid(process_name) else {
        return false;
    };
    let signal_number = libc::SIGRTMIN() + signal_offset as i32;
    if signal_number > libc::SIGRTMAX() {
        return false;
    }
    unsafe { libc::kill(pid, signal_number) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_single_unsignalled_segment() {
        let status = parse_status(b"cpu 3% | 12:00");
        assert_eq!(status.segments.len(), 1);
        assert_eq!(status.segments[0].text, "cpu 3% | 12:00");
        assert_eq!(status.segments[0].signal, None);
        assert!(status.extra.is_empty());
    }

    #[test]
    fn control_bytes_delimit_signalled_segments() {
        let status = parse_status(b"\x01vol 40%\x02bat 80%");
        assert_eq!(
            status.segments,
            vec![
                StatusSegment {
                    text: "vol 40%".to_string(),
                    signal: Some(1)
                },
                StatusSegment {
                    text: "bat 80%".to_string(),
                    signal: Some(2)
                },
            ]
        );
    }

    #[test]
    fn leading_text_before_a_delimiter_keeps_no_signal() {
        let status = parse_status(b"up 3d\x05mem 2G");
        assert_eq!(status.segments[0].signal, None);
        assert_eq!(status.segments[1].signal, Some(5));
    }

    #[test]
    fn the_separator_splits_main_from_extra() {
        let status = parse_status(b"\x01main\x1eextra text");
        assert_eq!(status.main_text(), "main");
        assert_eq!(status.extra, "extra text");
    }

    #[test]
    fn control_bytes_in_the_extra_status_are_stripped() {
        let status = parse_status(b"main\x1ea\x02b");
        assert_eq!(status.extra, "ab");
    }

    #[test]
    fn round_trips_through_the_click_map() {
        let widths = vec![(40u16, None), (60u16, Some(1)), (30u16, Some(2))];
        assert_eq!(StatusText::signal_at(&widths, 10), None);
        assert_eq!(StatusText::signal_at(&widths, 50), Some(1));
        assert_eq!(StatusText::signal_at(&widths, 99), Some(1));
        assert_eq!(StatusText::signal_at(&widths, 100), Some(2));
        assert_eq!(StatusText::signal_at(&widths, 129), Some(2));
        assert_eq!(StatusText::signal_at(&widths, 130), None);
    }

    #[test]
    fn missing_proc_directory_finds_nothing() {
        assert_eq!(
            find_status_bar_pid_in(Path::new("/nonexistent-proc"), "statusbar"),
            None
        );
    }
}
