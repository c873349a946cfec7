//! ANSI styling for method body dumps.

/// Escape codes per listing role. Empty strings when styling is off.
///
/// Only standard 16-color codes are used, so listings read the same in light
/// and dark terminals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Colors {
    /// Resolved type, field and method names.
    pub symbol: &'static str,
    /// `L<n>` branch labels.
    pub label: &'static str,
    pub string: &'static str,
    /// Instruction positions and operand punctuation.
    pub muted: &'static str,
    pub reset: &'static str,
}

impl Default for Colors {
    fn default() -> Self {
        Self::OFF
    }
}

impl Colors {
    pub const ON: Self = Self {
        symbol: "\x1b[34m",
        label: "\x1b[36m",
        string: "\x1b[32m",
        muted: "\x1b[2m",
        reset: "\x1b[0m",
    };

    pub const OFF: Self = Self {
        symbol: "",
        label: "",
        string: "",
        muted: "",
        reset: "",
    };
}
