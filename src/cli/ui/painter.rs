use owo_colors::{OwoColorize, Style as OwoStyle};

use crate::codec::BootState;

/// Applies colour and style to terminal text.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    /// Creates a painter with explicit colour control.
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().yellow())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    /// Highlights states where an update is in flight.
    pub(crate) fn boot_state(&self, state: BootState) -> String {
        match state {
            BootState::Idle => self.success(state.to_string()),
            BootState::UpdateMode | BootState::Receiving => self.warning(state.to_string()),
        }
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn apply(painter: &Painter, style: &str, text: &str) -> String {
        match style {
            "heading" => painter.heading(text),
            "success" => painter.success(text),
            "warning" => painter.warning(text),
            "muted" => painter.muted(text),
            "value" => painter.value(text),
            other => panic!("unknown style: {other}"),
        }
    }

    #[rstest]
    #[case::heading("heading", "Bootloader status")]
    #[case::success("success", "✓")]
    #[case::warning("warning", "receiving")]
    #[case::muted("muted", "version A")]
    #[case::value("value", "0x1234ABCD")]
    fn plain_returns_unstyled_text(#[case] style: &str, #[case] input: &str) {
        let painter = Painter::new(false);
        assert_eq!(input, apply(&painter, style, input));
    }

    #[rstest]
    #[case::heading("heading", "Bootloader status")]
    #[case::success("success", "✓")]
    #[case::warning("warning", "receiving")]
    #[case::muted("muted", "version A")]
    #[case::value("value", "0x1234ABCD")]
    fn coloured_returns_styled_text(#[case] style: &str, #[case] input: &str) {
        let painter = Painter::new(true);
        let styled = apply(&painter, style, input);
        assert_ne!(styled, input);
        assert!(styled.contains(input));
    }

    #[rstest]
    #[case::idle(BootState::Idle, "idle")]
    #[case::update_mode(BootState::UpdateMode, "update_mode")]
    #[case::receiving(BootState::Receiving, "receiving")]
    fn boot_state_uses_snake_case_names(#[case] state: BootState, #[case] expected: &str) {
        assert_eq!(expected, Painter::new(false).boot_state(state));
    }

    #[test]
    fn boot_state_colours_idle_differently_from_updates() {
        let painter = Painter::new(true);
        assert_eq!(painter.success("idle"), painter.boot_state(BootState::Idle));
        assert_eq!(
            painter.warning("receiving"),
            painter.boot_state(BootState::Receiving)
        );
    }
}
