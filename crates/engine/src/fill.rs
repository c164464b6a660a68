//! Deterministic synthetic input values

use std::collections::HashMap;

/// Input semantics derived from the element's tag and `type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Text,
    Email,
    Password,
    Number,
    Tel,
    Url,
    Search,
    Date,
    Time,
    Color,
    Textarea,
}

impl InputKind {
    /// Map an `<input type>` to a fillable kind; `None` for non-text types
    pub fn from_input_type(input_type: &str) -> Option<Self> {
        match input_type {
            "" | "text" => Some(InputKind::Text),
            "email" => Some(InputKind::Email),
            "password" => Some(InputKind::Password),
            "number" => Some(InputKind::Number),
            "tel" => Some(InputKind::Tel),
            "url" => Some(InputKind::Url),
            "search" => Some(InputKind::Search),
            "date" => Some(InputKind::Date),
            "time" => Some(InputKind::Time),
            "color" => Some(InputKind::Color),
            _ => None,
        }
    }

    fn pool(&self) -> &'static [&'static str] {
        match self {
            InputKind::Text => &["Test User", "John Doe", "Sample Text", "Hello World"],
            InputKind::Email => &["test@example.com", "john.doe@example.com", "user@test.org"],
            InputKind::Password => &["TestPassword123!", "SecurePass456#", "Sample789$"],
            InputKind::Number => &["42", "7", "100", "3"],
            InputKind::Tel => &["+1-555-0100", "555-123-4567", "+44 20 7946 0958"],
            InputKind::Url => &["https://example.com", "https://test.org", "https://sample.net"],
            InputKind::Search => &["test query", "hello", "sample search"],
            InputKind::Date => &["2024-01-15", "2023-06-30", "2025-12-01"],
            InputKind::Time => &["12:00", "09:30", "18:45"],
            InputKind::Color => &["#ff0000", "#00ff00", "#0000ff"],
            InputKind::Textarea => &[
                "This is a test message.",
                "Hello, this is sample content for testing.",
                "Lorem ipsum dolor sit amet.",
            ],
        }
    }
}

/// Hands out values per kind, cycling through a fixed pool.
///
/// One generator is created per page so repeated inputs on a page get
/// varied values while runs stay reproducible.
#[derive(Debug, Default)]
pub struct FillValues {
    cursors: HashMap<InputKind, usize>,
}

impl FillValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, kind: InputKind) -> &'static str {
        let pool = kind.pool();
        let cursor = self.cursors.entry(kind).or_insert(0);
        let value = pool[*cursor % pool.len()];
        *cursor += 1;
        value
    }
}
