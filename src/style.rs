//! ANSI color helpers for diagnostics rendering.

pub struct Style;

impl Style {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const BLUE: &'static str = "\x1b[34m";
    pub const CYAN: &'static str = "\x1b[36m";

    pub fn red(s: &str) -> String {
        format!("{}{}{}", Self::RED, s, Self::RESET)
    }

    pub fn blue(s: &str) -> String {
        format!("{}{}{}", Self::BLUE, s, Self::RESET)
    }

    pub fn cyan(s: &str) -> String {
        format!("{}{}{}", Self::CYAN, s, Self::RESET)
    }

    pub fn yellow(s: &str) -> String {
        format!("{}{}{}", Self::YELLOW, s, Self::RESET)
    }

    pub fn green(s: &str) -> String {
        format!("{}{}{}", Self::GREEN, s, Self::RESET)
    }

    pub fn bold(s: &str) -> String {
        format!("{}{}{}", Self::BOLD, s, Self::RESET)
    }

    pub fn bold_red(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::RED, s, Self::RESET)
    }
}

/// Render without any ANSI codes, used when `--no-color`/`NO_COLOR` is set.
pub struct Plain;

impl Plain {
    pub fn red(s: &str) -> String {
        s.to_string()
    }
    pub fn blue(s: &str) -> String {
        s.to_string()
    }
    pub fn cyan(s: &str) -> String {
        s.to_string()
    }
    pub fn yellow(s: &str) -> String {
        s.to_string()
    }
    pub fn green(s: &str) -> String {
        s.to_string()
    }
    pub fn bold(s: &str) -> String {
        s.to_string()
    }
    pub fn bold_red(s: &str) -> String {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_wraps_string() {
        let s = Style::red("error");
        assert!(s.starts_with(Style::RED));
        assert!(s.ends_with(Style::RESET));
        assert!(s.contains("error"));
    }

    #[test]
    fn bold_red_combines_codes() {
        let s = Style::bold_red("fatal");
        assert!(s.starts_with(Style::BOLD));
        assert!(s.contains(Style::RED));
        assert!(s.contains("fatal"));
    }

    #[test]
    fn plain_passes_text_through_unchanged() {
        assert_eq!(Plain::red("error"), "error");
        assert_eq!(Plain::bold_red("fatal"), "fatal");
    }
}
