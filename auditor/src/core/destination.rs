//! Destination descriptors attached to answer options.

use std::fmt;

/// Sentinel values that end a respondent walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    Terminate,
    Submit,
    End,
    /// The literal string `"null"`, distinct from an absent destination.
    Null,
}

impl Terminal {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TERMINATE" => Some(Self::Terminate),
            "SUBMIT" => Some(Self::Submit),
            "End" => Some(Self::End),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terminate => "TERMINATE",
            Self::Submit => "SUBMIT",
            Self::End => "End",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of an option's `next_destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `NEXT`, or no destination at all: advance in global order.
    Next,
    Terminal(Terminal),
    Question(String),
}

impl Destination {
    /// Parse a raw destination. `None` and the empty string mean [`Destination::Next`].
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|value| !value.is_empty()) else {
            return Self::Next;
        };
        if raw == "NEXT" {
            return Self::Next;
        }
        match Terminal::parse(raw) {
            Some(terminal) => Self::Terminal(terminal),
            None => Self::Question(raw.to_string()),
        }
    }
}

/// Where an option leads once `NEXT` has been resolved against global order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Position of the destination question in the global order.
    Question(usize),
    /// Explicit id that no question carries.
    Dangling(String),
    Terminal(Terminal),
}

impl Resolved {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}
