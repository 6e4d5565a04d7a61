//! Single-slot caption template.
//!
//! Patterns use brace syntax: `{}` (or `{0}`) is replaced with the post
//! text, `{{` and `}}` are literal braces. A pattern may use the slot more
//! than once only with manual numbering (`{0} … {0}`); a second `{}` has no
//! value to consume and is rejected.

use crate::error::TemplateError;

/// Pattern used when nothing is configured: the text passes through unchanged.
pub const IDENTITY_PATTERN: &str = "{}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Brace(char),
    Slot,
}

/// A caption/text template with one substitution slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pattern: String,
}

impl Template {
    /// Wrap a raw pattern. An empty pattern means "no transformation".
    ///
    /// The pattern is not checked here; see [`Template::validate`].
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Self::identity();
        }
        Self { pattern }
    }

    /// The pass-through template.
    pub fn identity() -> Self {
        Self {
            pattern: IDENTITY_PATTERN.to_string(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_identity(&self) -> bool {
        self.pattern == IDENTITY_PATTERN
    }

    /// Check that the pattern can be rendered.
    pub fn validate(&self) -> Result<(), TemplateError> {
        parse(&self.pattern).map(|_| ())
    }

    /// Fill the slot with `text`.
    pub fn render(&self, text: &str) -> Result<String, TemplateError> {
        let segments = parse(&self.pattern)?;
        let mut out = String::with_capacity(self.pattern.len() + text.len());
        for segment in segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Brace(c) => out.push(c),
                Segment::Slot => out.push_str(text),
            }
        }
        Ok(out)
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Numbering {
    Unset,
    Automatic,
    Manual,
}

fn parse(pattern: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut numbering = Numbering::Unset;
    let mut literal_start = 0;
    let mut chars = pattern.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' | '}' => {
                if literal_start < pos {
                    segments.push(Segment::Literal(&pattern[literal_start..pos]));
                }

                if chars.peek().map(|&(_, next)| next) == Some(c) {
                    chars.next();
                    segments.push(Segment::Brace(c));
                } else if c == '}' {
                    return Err(TemplateError::UnbalancedBrace {
                        brace: '}',
                        position: pos,
                    });
                } else {
                    let field_start = pos + 1;
                    let field_end = pattern[field_start..]
                        .find(['{', '}'])
                        .map(|i| field_start + i)
                        .filter(|&end| pattern[end..].starts_with('}'))
                        .ok_or(TemplateError::UnbalancedBrace {
                            brace: '{',
                            position: pos,
                        })?;

                    let field = &pattern[field_start..field_end];
                    let kind = match field {
                        "" => Numbering::Automatic,
                        "0" => Numbering::Manual,
                        other => {
                            return Err(TemplateError::UnsupportedField {
                                field: other.to_string(),
                            });
                        }
                    };

                    numbering = match (numbering, kind) {
                        (Numbering::Unset, k) => k,
                        (Numbering::Manual, Numbering::Manual) => Numbering::Manual,
                        (Numbering::Automatic, Numbering::Automatic) => {
                            return Err(TemplateError::TooManySlots);
                        }
                        _ => return Err(TemplateError::MixedNumbering),
                    };

                    segments.push(Segment::Slot);
                    while chars.peek().is_some_and(|&(i, _)| i <= field_end) {
                        chars.next();
                    }
                }

                literal_start = chars.peek().map_or(pattern.len(), |&(i, _)| i);
            }
            _ => {}
        }
    }

    if literal_start < pattern.len() {
        segments.push(Segment::Literal(&pattern[literal_start..]));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_passes_text_through() {
        let t = Template::identity();
        assert_eq!(t.render("Hi").unwrap(), "Hi");
        assert_eq!(t.render("").unwrap(), "");
    }

    #[test]
    fn empty_pattern_is_identity() {
        let t = Template::new("");
        assert!(t.is_identity());
        assert_eq!(t.render("Hi").unwrap(), "Hi");
    }

    #[test]
    fn prefix_with_emoji() {
        let t = Template::new("📢 {}");
        assert_eq!(t.render("Hello").unwrap(), "📢 Hello");
    }

    #[test]
    fn multiline_footer() {
        let t = Template::new("{}\n\n— Subscribe: @news");
        assert_eq!(
            t.render("Breaking").unwrap(),
            "Breaking\n\n— Subscribe: @news"
        );
    }

    #[test]
    fn escaped_braces_are_literal() {
        let t = Template::new("{{tag}} {} {{}}");
        assert_eq!(t.render("x").unwrap(), "{tag} x {}");
    }

    #[test]
    fn pattern_without_slot_ignores_text() {
        let t = Template::new("static footer");
        assert_eq!(t.render("anything").unwrap(), "static footer");
    }

    #[test]
    fn manual_index_may_repeat() {
        let t = Template::new("{0} / {0}");
        assert_eq!(t.render("ab").unwrap(), "ab / ab");
    }

    #[test]
    fn slot_text_containing_braces_is_not_reparsed() {
        let t = Template::new("> {}");
        assert_eq!(t.render("{oops}").unwrap(), "> {oops}");
    }

    #[test]
    fn second_automatic_slot_rejected() {
        let err = Template::new("{} and {}").render("x").unwrap_err();
        assert!(matches!(err, TemplateError::TooManySlots));
    }

    #[test]
    fn mixed_numbering_rejected() {
        let err = Template::new("{0} {}").render("x").unwrap_err();
        assert!(matches!(err, TemplateError::MixedNumbering));
    }

    #[test]
    fn named_field_rejected() {
        let err = Template::new("Hi {name}").render("x").unwrap_err();
        assert!(matches!(err, TemplateError::UnsupportedField { ref field } if field == "name"));
    }

    #[test]
    fn unclosed_brace_rejected() {
        let err = Template::new("oops {").render("x").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnbalancedBrace { brace: '{', position: 5 }
        ));
    }

    #[test]
    fn nested_brace_rejected() {
        let err = Template::new("{{}").validate().unwrap_err();
        assert!(matches!(err, TemplateError::UnbalancedBrace { brace: '}', .. }));
        assert!(Template::new("{ { }").validate().is_err());
    }

    #[test]
    fn stray_closing_brace_rejected() {
        let err = Template::new("a } b").validate().unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnbalancedBrace { brace: '}', position: 2 }
        ));
    }

    #[test]
    fn render_is_repeatable() {
        let t = Template::new("[{}]");
        let first = t.render("same").unwrap();
        let second = t.render("same").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "[same]");
    }
}
