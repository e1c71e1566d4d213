//! Core-metadata header parsing (wheel `METADATA`, sdist `PKG-INFO`).
//!
//! Both files share the email-header format: `Key: Value` lines until the
//! first blank line, with repeatable keys for dependency declarations.

/// Parsed core-metadata headers relevant to resolution.
#[derive(Debug, Clone, Default)]
pub struct CoreMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    /// `Requires-Dist` lines: requirement text, possibly marker-gated.
    pub requires_dist: Vec<String>,
    /// `Provides-Extra` names.
    pub provides_extra: Vec<String>,
    /// `Requires-Python` constraint text.
    pub requires_python: Option<String>,
}

/// Parse the header block of a `METADATA`/`PKG-INFO` document.
pub fn parse_core_metadata(text: &str) -> CoreMetadata {
    let mut meta = CoreMetadata::default();

    for line in text.lines() {
        // The header block ends at the first blank line; everything after
        // is the long description.
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "Name" => meta.name = Some(value.to_string()),
            "Version" => meta.version = Some(value.to_string()),
            "Requires-Dist" => meta.requires_dist.push(value.to_string()),
            "Provides-Extra" => meta.provides_extra.push(value.to_string()),
            "Requires-Python" => meta.requires_python = Some(value.to_string()),
            _ => {}
        }
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relevant_headers() {
        let text = "\
Metadata-Version: 2.1
Name: requests
Version: 2.18.4
Summary: Python HTTP for Humans.
Requires-Python: >=2.6, !=3.0.*
Requires-Dist: chardet (>=3.0.2,<3.1.0)
Requires-Dist: idna (>=2.5,<2.7)
Requires-Dist: PySocks (>=1.5.6,!=1.5.7) ; extra == 'socks'
Provides-Extra: socks

Requests is an elegant HTTP library.
Requires-Dist: not-a-real-dep
";
        let meta = parse_core_metadata(text);
        assert_eq!(meta.name.as_deref(), Some("requests"));
        assert_eq!(meta.version.as_deref(), Some("2.18.4"));
        assert_eq!(meta.requires_dist.len(), 3);
        assert_eq!(meta.provides_extra, vec!["socks"]);
        assert_eq!(meta.requires_python.as_deref(), Some(">=2.6, !=3.0.*"));
    }

    #[test]
    fn empty_document() {
        let meta = parse_core_metadata("");
        assert!(meta.requires_dist.is_empty());
        assert!(meta.name.is_none());
    }

    #[test]
    fn description_after_blank_line_is_ignored() {
        let meta = parse_core_metadata("Name: demo\n\nRequires-Dist: sneaky\n");
        assert!(meta.requires_dist.is_empty());
    }
}
