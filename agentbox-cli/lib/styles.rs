//! Terminal styling for CLI output and help text.

use clap::builder::styling::{AnsiColor, Effects, Styles};
use console::{style, StyledObject};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The clap help styling used by all agentbox binaries.
pub fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
        .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
        .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .placeholder(AnsiColor::Cyan.on_default())
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Convenience styling methods for user-facing CLI strings.
pub trait AnsiStyles: Sized {
    /// Styles the value as a literal (command names, versions, addresses).
    fn literal(self) -> StyledObject<Self>;

    /// Styles the value as a success.
    fn success(self) -> StyledObject<Self>;

    /// Styles the value as a warning.
    fn warning(self) -> StyledObject<Self>;

    /// Styles the value as an error.
    fn error(self) -> StyledObject<Self>;
}

impl<T: std::fmt::Display> AnsiStyles for T {
    fn literal(self) -> StyledObject<Self> {
        style(self).cyan()
    }

    fn success(self) -> StyledObject<Self> {
        style(self).green()
    }

    fn warning(self) -> StyledObject<Self> {
        style(self).yellow()
    }

    fn error(self) -> StyledObject<Self> {
        style(self).red()
    }
}
