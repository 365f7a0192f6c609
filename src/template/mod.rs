//! Placeholder templates for message bodies and subjects.
//!
//! Syntax:
//! - `${name}` is replaced by the value of `name` in the render context
//! - `$$` is a literal `$`
//! - any other `$` is kept as-is
//!
//! Templates are parsed once and rendered per record. An unclosed `${` or an
//! invalid name is rejected at parse time; a name with no value in the
//! context is rejected at render time.

pub mod derive;

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::assets::Asset;
use crate::error::{ConfigError, Error, LoadError, TemplateError};
use crate::record::Record;

pub use derive::{html_to_text, text_to_html};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:\$|\{([^{}]*)\})").expect("placeholder regex is valid"));

/// Which template a piece of text belongs to (used in error messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Text,
    Html,
    Subject,
}

impl TemplateKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "HTML",
            Self::Subject => "subject",
        }
    }
}

/// Outcome of looking up a placeholder name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Found(&'a str),
    Missing,
    /// The name maps to more than one distinct value.
    Ambiguous,
}

/// Anything a template can be rendered against.
pub trait RenderContext {
    fn resolve(&self, name: &str) -> Resolved<'_>;
}

impl RenderContext for Record {
    fn resolve(&self, name: &str) -> Resolved<'_> {
        match self.get(name) {
            Some(value) => Resolved::Found(value),
            None => Resolved::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    kind: TemplateKind,
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template source.
    pub fn parse(kind: TemplateKind, source: &str) -> Result<Self, TemplateError> {
        let malformed = |offset: usize, reason: &str| TemplateError::Malformed {
            template: kind.label(),
            offset,
            reason: reason.to_string(),
        };
        let check_literal = |literal: &str, base: usize| match literal.find("${") {
            Some(idx) => Err(malformed(base + idx, "unclosed or nested placeholder")),
            None => Ok(()),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let before = &source[last..whole.start()];
            check_literal(before, last)?;
            literal.push_str(before);
            last = whole.end();

            let Some(name) = caps.get(1) else {
                // `$$`
                literal.push('$');
                continue;
            };
            let name = name.as_str();
            if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '$') {
                return Err(malformed(whole.start(), "invalid placeholder name"));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(name.to_string()));
        }

        let tail = &source[last..];
        check_literal(tail, last)?;
        literal.push_str(tail);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            kind,
            source: source.to_string(),
            segments,
        })
    }

    /// Read and parse a template file.
    pub fn from_file(kind: TemplateKind, path: &Path) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::TemplateFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(kind, &source)?)
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// The unparsed template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance (repeats included).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder from `ctx`.
    pub fn render<C: RenderContext + ?Sized>(&self, ctx: &C) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => match ctx.resolve(name) {
                    Resolved::Found(value) => out.push_str(value),
                    Resolved::Missing => {
                        return Err(TemplateError::Unresolved {
                            template: self.kind.label(),
                            placeholder: name.clone(),
                        });
                    }
                    Resolved::Ambiguous => {
                        return Err(TemplateError::Ambiguous {
                            template: self.kind.label(),
                            placeholder: name.clone(),
                        });
                    }
                },
            }
        }
        Ok(out)
    }
}

// ── Template pair ───────────────────────────────────────────────────

/// Where a template in a [`TemplatePair`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Loaded,
    Derived,
}

/// Text and HTML body templates, kept in sync.
#[derive(Debug, Clone)]
pub struct TemplatePair {
    text: Template,
    html: Template,
    text_origin: Origin,
    html_origin: Origin,
}

impl TemplatePair {
    /// Load templates from files, deriving whichever one is missing.
    ///
    /// `assets` is the base asset list; a derived HTML template references
    /// each of them with an `<img>` tag, in order.
    pub fn load(
        text_path: Option<&Path>,
        html_path: Option<&Path>,
        assets: &[Asset],
    ) -> Result<Self, Error> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| LoadError::TemplateFile {
                path: path.to_path_buf(),
                source,
            })
        };
        let text = text_path.map(read).transpose()?;
        let html = html_path.map(read).transpose()?;
        Self::from_sources(text.as_deref(), html.as_deref(), assets)
    }

    /// Build the pair from in-memory sources.
    pub fn from_sources(
        text: Option<&str>,
        html: Option<&str>,
        assets: &[Asset],
    ) -> Result<Self, Error> {
        let (text_src, text_origin, html_src, html_origin) = match (text, html) {
            (Some(text), Some(html)) => (text.to_string(), Origin::Loaded, html.to_string(), Origin::Loaded),
            (Some(text), None) => {
                let tags: Vec<&str> = assets.iter().map(Asset::tag).collect();
                (text.to_string(), Origin::Loaded, text_to_html(text, &tags), Origin::Derived)
            }
            (None, Some(html)) => (html_to_text(html), Origin::Derived, html.to_string(), Origin::Loaded),
            (None, None) => return Err(ConfigError::NoTemplate.into()),
        };

        Ok(Self {
            text: Template::parse(TemplateKind::Text, &text_src)?,
            html: Template::parse(TemplateKind::Html, &html_src)?,
            text_origin,
            html_origin,
        })
    }

    pub fn text(&self) -> &Template {
        &self.text
    }

    pub fn html(&self) -> &Template {
        &self.html
    }

    pub fn text_origin(&self) -> Origin {
        self.text_origin
    }

    pub fn html_origin(&self) -> Origin {
        self.html_origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(source: &str) -> Template {
        Template::parse(TemplateKind::Text, source).unwrap()
    }

    #[test]
    fn renders_placeholders_from_record() {
        let t = text("Hi ${name}, your seat is ${seat}.");
        let record = Record::new("d@x.com")
            .with_field("name", "Dana")
            .with_field("seat", "Row 4");
        assert_eq!(t.render(&record).unwrap(), "Hi Dana, your seat is Row 4.");
    }

    #[test]
    fn exact_placeholders_leave_no_residue() {
        let t = text("${a}-${b}-${a}\n${c}");
        let names: Vec<&str> = t.placeholders().collect();
        assert_eq!(names, ["a", "b", "a", "c"]);

        let record = Record::new("x@y.z")
            .with_field("a", "1")
            .with_field("b", "2")
            .with_field("c", "3");
        let out = t.render(&record).unwrap();
        assert_eq!(out, "1-2-1\n3");
        assert!(!out.contains("${"));
    }

    #[test]
    fn missing_field_is_an_error_not_a_blank() {
        let t = text("Hello ${name}");
        let err = t.render(&Record::new("x@y.z")).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Unresolved { ref placeholder, .. } if placeholder == "name"
        ));
    }

    #[test]
    fn dollar_escapes_and_bare_dollars() {
        let t = text("Cost: $$5 or $5, literal $${name}");
        assert_eq!(t.placeholders().count(), 0);
        assert_eq!(
            t.render(&Record::default()).unwrap(),
            "Cost: $5 or $5, literal ${name}"
        );
    }

    #[test]
    fn prefix_names_do_not_collide() {
        let t = text("${day}/${day_1}");
        let record = Record::new("x@y.z").with_field("day", "A");
        assert!(t.render(&record).is_err());

        let record = record.with_field("day_1", "B");
        assert_eq!(t.render(&record).unwrap(), "A/B");
    }

    #[test]
    fn malformed_placeholders_are_rejected_at_parse() {
        for bad in ["Hi ${name", "Hi ${}", "Hi ${first name}", "${a${b}}"] {
            let err = Template::parse(TemplateKind::Html, bad).unwrap_err();
            assert!(matches!(err, TemplateError::Malformed { .. }), "input {bad:?}");
        }
    }

    #[test]
    fn pair_requires_at_least_one_template() {
        let err = TemplatePair::from_sources(None, None, &[]).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NoTemplate)));
    }

    #[test]
    fn pair_derives_html_from_text() {
        let assets = vec![
            Asset::new("a", vec![1u8], ("image".into(), "png".into())),
            Asset::new("b", vec![2u8], ("image".into(), "png".into())),
        ];
        let pair = TemplatePair::from_sources(Some("Hi ${name}"), None, &assets).unwrap();

        assert_eq!(pair.text_origin(), Origin::Loaded);
        assert_eq!(pair.html_origin(), Origin::Derived);
        let html = pair.html().source();
        assert!(html.contains("Hi ${name}"));
        let a = html.find("cid:a").unwrap();
        let b = html.find("cid:b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn pair_derives_text_from_html() {
        let pair =
            TemplatePair::from_sources(None, Some("<p>Hi <b>${name}</b></p>"), &[]).unwrap();
        assert_eq!(pair.text_origin(), Origin::Derived);
        assert_eq!(pair.text().source(), "Hi ${name}");
    }

    #[test]
    fn pair_loads_files() {
        let dir = tempfile::tempdir().unwrap();
        let text_path = dir.path().join("body.txt");
        let html_path = dir.path().join("body.html");
        std::fs::write(&text_path, "Plain ${name}").unwrap();
        std::fs::write(&html_path, "<p>Rich ${name}</p>").unwrap();

        let pair =
            TemplatePair::load(Some(text_path.as_path()), Some(html_path.as_path()), &[]).unwrap();
        assert_eq!(pair.text().source(), "Plain ${name}");
        assert_eq!(pair.html_origin(), Origin::Loaded);

        let missing = dir.path().join("nope.txt");
        let err = TemplatePair::load(Some(missing.as_path()), None, &[]).unwrap_err();
        assert!(matches!(err, Error::Load(LoadError::TemplateFile { .. })));
    }
}
