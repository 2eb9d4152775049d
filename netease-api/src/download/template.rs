//! Output file naming.
//!
//! A template is plain text with `{placeholder}` fields. Supported fields:
//! `{title}`, `{artist}`, `{album}`, `{id}`, `{quality}`. The rendered name is
//! sanitized as a whole and never carries the extension.

use std::fmt;
use std::str::FromStr;

use crate::error::{NeteaseError, Result};
use crate::quality::QualityLevel;
use crate::types::Track;

/// Template used when none is given.
pub const DEFAULT_TEMPLATE: &str = "{artist} - {title}";

/// Longest file stem produced by [`sanitize_filename`], in characters.
pub const MAX_STEM_CHARS: usize = 200;

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Artist,
    Album,
    Id,
    Quality,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Self::Title),
            "artist" => Some(Self::Artist),
            "album" => Some(Self::Album),
            "id" => Some(Self::Id),
            "quality" => Some(Self::Quality),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed file name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl NameTemplate {
    /// Parse and validate `source`.
    ///
    /// Fails on unknown placeholders, unbalanced braces, and templates with
    /// no visible content.
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(NeteaseError::Template(format!(
                                    "unclosed placeholder in {source:?}"
                                )));
                            }
                            Some(ch) => name.push(ch),
                        }
                    }
                    let field = Field::parse(name.trim()).ok_or_else(|| {
                        NeteaseError::Template(format!("unknown placeholder {{{name}}}"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => {
                    return Err(NeteaseError::Template(format!(
                        "unmatched '}}' in {source:?}"
                    )));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let has_content = segments.iter().any(|s| match s {
            Segment::Field(_) => true,
            Segment::Literal(text) => text
                .chars()
                .any(|c| !RESERVED.contains(&c) && !c.is_control() && c != ' ' && c != '.'),
        });
        if !has_content {
            return Err(NeteaseError::Template(format!(
                "template {source:?} produces no file name"
            )));
        }

        Ok(Self {
            source: source.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render a sanitized file stem for `track` downloaded at `quality`.
    pub fn render(&self, track: &Track, quality: QualityLevel) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Title) => out.push_str(&track.name),
                Segment::Field(Field::Artist) => out.push_str(&track.artist_names()),
                Segment::Field(Field::Album) => out.push_str(&track.album.name),
                Segment::Field(Field::Id) => out.push_str(&track.id.to_string()),
                Segment::Field(Field::Quality) => out.push_str(quality.wire_name()),
            }
        }
        sanitize_filename(&out)
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_owned(),
            segments: vec![
                Segment::Field(Field::Artist),
                Segment::Literal(" - ".to_owned()),
                Segment::Field(Field::Title),
            ],
        }
    }
}

impl FromStr for NameTemplate {
    type Err = NeteaseError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Make `name` safe to use as a file stem on common filesystems.
///
/// Drops reserved and control characters, trims surrounding spaces and dots,
/// and caps the length at [`MAX_STEM_CHARS`]. An empty result becomes
/// `untitled`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !RESERVED.contains(c) && !c.is_control())
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == ' ' || c == '.');
    let capped: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    let capped = capped.trim_end_matches([' ', '.']);
    if capped.is_empty() {
        "untitled".to_owned()
    } else {
        capped.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Album, Artist};

    fn track() -> Track {
        Track {
            id: 1_859_245_776,
            name: "晴天".into(),
            artists: vec![
                Artist { id: 1, name: "周杰伦".into(), alias: vec![] },
                Artist { id: 2, name: "Guest".into(), alias: vec![] },
            ],
            album: Album { name: "叶惠美".into(), ..Album::default() },
            duration_ms: 269_000,
            fee: 8,
        }
    }

    #[test]
    fn default_template_renders_artist_and_title() {
        let name = NameTemplate::default().render(&track(), QualityLevel::Exhigh);
        assert_eq!(name, "周杰伦, Guest - 晴天");
        assert_eq!(NameTemplate::parse(DEFAULT_TEMPLATE).unwrap(), NameTemplate::default());
    }

    #[test]
    fn all_placeholders() {
        let t = NameTemplate::parse("{album}/{id}_{quality} {title}").unwrap();
        assert_eq!(t.render(&track(), QualityLevel::Lossless), "叶惠美1859245776_lossless 晴天");
    }

    #[test]
    fn rejects_bad_templates() {
        for bad in ["{nope}", "{title", "title}", "", "..", "{ti{tle}"] {
            let err = NameTemplate::parse(bad).unwrap_err();
            assert!(matches!(err, NeteaseError::Template(_)), "{bad}");
        }
    }

    #[test]
    fn sanitizes_reserved_characters() {
        assert_eq!(sanitize_filename("AC/DC: Back in Black?"), "ACDC Back in Black");
        assert_eq!(sanitize_filename("  ..hidden.. "), "hidden");
        assert_eq!(sanitize_filename("a\u{0}b\tc"), "abc");
        assert_eq!(sanitize_filename("???"), "untitled");
    }

    #[test]
    fn caps_length_on_char_boundary() {
        let long = "歌".repeat(300);
        let name = sanitize_filename(&long);
        assert_eq!(name.chars().count(), MAX_STEM_CHARS);
    }
}
