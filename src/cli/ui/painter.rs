use owo_colors::{OwoColorize, Style as OwoStyle};

use crate::board::VersionClass;

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

    pub(crate) fn failure<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().red())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    /// Colours a firmware version by its classification.
    pub(crate) fn version<T: AsRef<str>>(&self, text: T, class: VersionClass) -> String {
        match class {
            VersionClass::Latest => self.success(text),
            VersionClass::Old => self.warning(text),
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
            "failure" => painter.failure(text),
            "muted" => painter.muted(text),
            "value" => painter.value(text),
            other => panic!("unknown style: {other}"),
        }
    }

    #[rstest]
    #[case::heading("heading", "Motor driver")]
    #[case::success("success", "v2.7.2")]
    #[case::warning("warning", "v2.5.5")]
    #[case::failure("failure", "Failed")]
    #[case::muted("muted", "md-odo")]
    #[case::value("value", "87%")]
    fn plain_returns_unstyled_text(#[case] style: &str, #[case] input: &str) {
        let painter = Painter::new(false);
        assert_eq!(input, apply(&painter, style, input));
    }

    #[rstest]
    #[case::heading("heading", "Motor driver")]
    #[case::success("success", "v2.7.2")]
    #[case::warning("warning", "v2.5.5")]
    #[case::failure("failure", "Failed")]
    #[case::muted("muted", "md-odo")]
    #[case::value("value", "87%")]
    fn coloured_returns_styled_text(#[case] style: &str, #[case] input: &str) {
        let painter = Painter::new(true);
        let styled = apply(&painter, style, input);
        assert_ne!(styled, input);
        assert!(styled.contains(input));
    }

    #[test]
    fn version_colour_follows_classification() {
        let painter = Painter::new(true);
        assert_eq!(
            painter.success("v2.7.2"),
            painter.version("v2.7.2", VersionClass::Latest)
        );
        assert_eq!(
            painter.warning("v2.5.5"),
            painter.version("v2.5.5", VersionClass::Old)
        );
    }
}
