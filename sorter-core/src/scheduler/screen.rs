//! Texts shown on the 16x2 status display.

use core::fmt::Write as _;

use heapless::String;

use crate::devices::LCD_COLUMNS;

use super::{Bin, SortCounters};

/// One rendered display row.
pub type ScreenLine = String<LCD_COLUMNS>;

/// Everything the scheduler ever puts on the display.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Screen {
    ModeMenu,
    AutoBanner,
    ManualBanner,
    Detected(Bin),
    Counts(SortCounters),
}

impl Screen {
    /// Renders both rows.
    #[must_use]
    pub fn render(&self) -> [ScreenLine; 2] {
        match self {
            Screen::ModeMenu => [line("Select mode"), line("1:Auto 2:Manual")],
            Screen::AutoBanner => [line("Auto sort active"), line("Sorter ready")],
            Screen::ManualBanner => [line("Manual mode"), line("Sorter ready")],
            Screen::Detected(bin) => {
                let mut color = ScreenLine::new();
                let _ = write!(color, "      {}", bin.label());
                [line("Detected color:"), color]
            }
            Screen::Counts(counters) => [line("Sorted so far"), counts_line(counters)],
        }
    }
}

fn line(text: &str) -> ScreenLine {
    let mut out = ScreenLine::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// `A:tt R:rr B:bb G:gg` without separators, two digits each.
fn counts_line(counters: &SortCounters) -> ScreenLine {
    let mut out = ScreenLine::new();
    let _ = write!(
        out,
        "A:{:02}R:{:02}B:{:02}G:{:02}",
        counters.total % 100,
        counters.red % 100,
        counters.blue % 100,
        counters.green % 100,
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_render_two_digits_each() {
        let counters = SortCounters {
            total: 10,
            red: 5,
            green: 3,
            blue: 2,
        };
        let [title, counts] = Screen::Counts(counters).render();
        assert_eq!(title.as_str(), "Sorted so far");
        assert_eq!(counts.as_str(), "A:10R:05B:02G:03");
    }

    #[test]
    fn counts_wrap_at_one_hundred() {
        let counters = SortCounters {
            total: 205,
            red: 100,
            green: 99,
            blue: 6,
        };
        let [_, counts] = Screen::Counts(counters).render();
        assert_eq!(counts.as_str(), "A:05R:00B:06G:99");
    }

    #[test]
    fn every_screen_fits_the_display() {
        let screens = [
            Screen::ModeMenu,
            Screen::AutoBanner,
            Screen::ManualBanner,
            Screen::Detected(Bin::Green),
            Screen::Counts(SortCounters::default()),
        ];
        for screen in screens {
            for row in screen.render() {
                assert!(!row.is_empty());
                assert!(row.len() <= LCD_COLUMNS);
            }
        }
    }

    #[test]
    fn detected_color_is_indented() {
        let [_, color] = Screen::Detected(Bin::Blue).render();
        assert_eq!(color.as_str(), "      Blue");
    }
}
