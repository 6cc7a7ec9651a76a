//! HAProxy configuration document.
//!
//! # Responsibilities
//! - Parse a configuration file into ordered sections and directives
//! - Create labeled sections and add directives to them
//! - Render back to text deterministically
//!
//! Only the structure is interpreted. Directive arguments are kept verbatim
//! and validated by the data plane, not here.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::haproxy::{DocumentError, TemplateError};

/// Section keywords recognised at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Global,
    Defaults,
    Frontend,
    Backend,
    Listen,
    Resolvers,
    Userlist,
    Peers,
    Mailers,
    Program,
    HttpErrors,
    Ring,
    Cache,
}

impl SectionKind {
    pub fn keyword(self) -> &'static str {
        match self {
            SectionKind::Global => "global",
            SectionKind::Defaults => "defaults",
            SectionKind::Frontend => "frontend",
            SectionKind::Backend => "backend",
            SectionKind::Listen => "listen",
            SectionKind::Resolvers => "resolvers",
            SectionKind::Userlist => "userlist",
            SectionKind::Peers => "peers",
            SectionKind::Mailers => "mailers",
            SectionKind::Program => "program",
            SectionKind::HttpErrors => "http-errors",
            SectionKind::Ring => "ring",
            SectionKind::Cache => "cache",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let kind = match keyword {
            "global" => SectionKind::Global,
            "defaults" => SectionKind::Defaults,
            "frontend" => SectionKind::Frontend,
            "backend" => SectionKind::Backend,
            "listen" => SectionKind::Listen,
            "resolvers" => SectionKind::Resolvers,
            "userlist" => SectionKind::Userlist,
            "peers" => SectionKind::Peers,
            "mailers" => SectionKind::Mailers,
            "program" => SectionKind::Program,
            "http-errors" => SectionKind::HttpErrors,
            "ring" => SectionKind::Ring,
            "cache" => SectionKind::Cache,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A single `keyword args...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub keyword: String,
    pub args: String,
}

impl Directive {
    pub fn new(keyword: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            args: args.into(),
        }
    }

    fn parse(line: &str) -> Self {
        match line.split_once(char::is_whitespace) {
            Some((keyword, args)) => Self::new(keyword, args.trim()),
            None => Self::new(line, ""),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.keyword)
        } else {
            write!(f, "{} {}", self.keyword, self.args)
        }
    }
}

/// A line inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Comment(String),
    Directive(Directive),
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Comment(text) => f.write_str(text),
            Entry::Directive(d) => d.fmt(f),
        }
    }
}

/// A section header and its entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub label: Option<String>,
    /// Anything after the label on the header line, e.g. `from defaults-a`.
    pub trailer: Option<String>,
    pub entries: Vec<Entry>,
}

impl Section {
    fn new(kind: SectionKind, label: Option<String>, trailer: Option<String>) -> Self {
        Self {
            kind,
            label,
            trailer,
            entries: Vec::new(),
        }
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Directive(d) => Some(d),
            Entry::Comment(_) => None,
        })
    }

    /// Directives with the given keyword, in document order.
    pub fn find<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Directive> + 'a {
        self.directives().filter(move |d| d.keyword == keyword)
    }

    fn is(&self, kind: SectionKind, label: &str) -> bool {
        self.kind == kind && self.label.as_deref() == Some(label)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.keyword())?;
        if let Some(label) = &self.label {
            write!(f, " {label}")?;
        }
        if let Some(trailer) = &self.trailer {
            write!(f, " {trailer}")?;
        }
        writeln!(f)?;
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

/// An ordered HAProxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    /// Comment lines before the first section.
    preamble: Vec<String>,
    sections: Vec<Section>,
}

impl ConfigDocument {
    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let content = fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        content.parse().map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, kind: SectionKind, label: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.is(kind, label))
    }

    fn section_mut(&mut self, kind: SectionKind, label: &str) -> Result<&mut Section, DocumentError> {
        self.sections
            .iter_mut()
            .find(|s| s.is(kind, label))
            .ok_or_else(|| DocumentError::SectionMissing {
                kind,
                label: label.to_string(),
            })
    }

    /// Append a new, empty, labeled section.
    pub fn create_section(&mut self, kind: SectionKind, label: &str) -> Result<(), DocumentError> {
        if label.is_empty() || label.contains(char::is_whitespace) {
            return Err(DocumentError::InvalidLabel {
                kind,
                label: label.to_string(),
            });
        }
        if self.section(kind, label).is_some() {
            return Err(DocumentError::SectionExists {
                kind,
                label: label.to_string(),
            });
        }

        self.sections
            .push(Section::new(kind, Some(label.to_string()), None));
        Ok(())
    }

    /// Append a directive to a section.
    pub fn insert(&mut self, kind: SectionKind, label: &str, directive: Directive) -> Result<(), DocumentError> {
        if directive.keyword.is_empty() {
            return Err(DocumentError::EmptyDirective);
        }
        self.section_mut(kind, label)?
            .entries
            .push(Entry::Directive(directive));
        Ok(())
    }

    /// Replace the first directive with the same keyword, or append it.
    pub fn set(&mut self, kind: SectionKind, label: &str, directive: Directive) -> Result<(), DocumentError> {
        if directive.keyword.is_empty() {
            return Err(DocumentError::EmptyDirective);
        }
        let section = self.section_mut(kind, label)?;
        let existing = section.entries.iter_mut().find_map(|e| match e {
            Entry::Directive(d) if d.keyword == directive.keyword => Some(d),
            _ => None,
        });

        match existing {
            Some(d) => *d = directive,
            None => section.entries.push(Entry::Directive(directive)),
        }
        Ok(())
    }

    /// Add or replace a `server <name> <address>` line in a backend.
    pub fn set_server(&mut self, backend: &str, name: &str, address: &str) -> Result<(), DocumentError> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(DocumentError::InvalidServerName(name.to_string()));
        }

        let directive = Directive::new("server", format!("{name} {address}"));
        let section = self.section_mut(SectionKind::Backend, backend)?;
        let existing = section.entries.iter_mut().find_map(|e| match e {
            Entry::Directive(d) if d.keyword == "server" && server_name(&d.args) == Some(name) => Some(d),
            _ => None,
        });

        match existing {
            Some(d) => *d = directive,
            None => section.entries.push(Entry::Directive(directive)),
        }
        Ok(())
    }
}

fn server_name(args: &str) -> Option<&str> {
    args.split_whitespace().next()
}

impl FromStr for ConfigDocument {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut doc = ConfigDocument::default();

        for (idx, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('#') {
                match doc.sections.last_mut() {
                    Some(section) => section.entries.push(Entry::Comment(line.to_string())),
                    None => doc.preamble.push(line.to_string()),
                }
                continue;
            }

            let (first, rest) = match line.split_once(char::is_whitespace) {
                Some((first, rest)) => (first, rest.trim()),
                None => (line, ""),
            };

            if let Some(kind) = SectionKind::from_keyword(first) {
                let (label, trailer) = match rest.split_once(char::is_whitespace) {
                    Some((label, trailer)) => (Some(label), Some(trailer.trim())),
                    None if rest.is_empty() => (None, None),
                    None => (Some(rest), None),
                };
                doc.sections.push(Section::new(
                    kind,
                    label.map(str::to_string),
                    trailer.filter(|t| !t.is_empty()).map(str::to_string),
                ));
                continue;
            }

            match doc.sections.last_mut() {
                Some(section) => section.entries.push(Entry::Directive(Directive::parse(line))),
                None => {
                    return Err(DocumentError::Parse {
                        line: idx + 1,
                        reason: format!("directive {first:?} outside of a section"),
                    })
                }
            }
        }

        Ok(doc)
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.preamble {
            writeln!(f, "{line}")?;
        }
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            section.fmt(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = include_str!("../../testdata/haproxy.cfg");

    #[test]
    fn test_base_template_round_trips() {
        let doc: ConfigDocument = BASE.parse().unwrap();
        assert_eq!(doc.to_string().trim(), BASE.trim());
        assert_eq!(doc.sections().len(), 4);
        assert_eq!(doc.sections()[2].label.as_deref(), Some("dataplaneapi"));
    }

    #[test]
    fn test_parse_normalises_whitespace() {
        let doc: ConfigDocument = "global\n\tmaxconn   100\n\n\nfrontend  web   from defs\n    bind :80\n"
            .parse()
            .unwrap();

        assert_eq!(
            doc.to_string(),
            "global\n  maxconn 100\n\nfrontend web from defs\n  bind :80\n"
        );
        let web = doc.section(SectionKind::Frontend, "web").unwrap();
        assert_eq!(web.trailer.as_deref(), Some("from defs"));
    }

    #[test]
    fn test_directive_outside_section_is_rejected() {
        let err = "# comment\nmaxconn 10\nglobal\n".parse::<ConfigDocument>().unwrap_err();
        assert_eq!(
            err,
            DocumentError::Parse {
                line: 2,
                reason: "directive \"maxconn\" outside of a section".to_string()
            }
        );
    }

    #[test]
    fn test_create_section_rejects_duplicates() {
        let mut doc = ConfigDocument::default();
        doc.create_section(SectionKind::Frontend, "web").unwrap();
        doc.create_section(SectionKind::Backend, "web").unwrap();

        let err = doc.create_section(SectionKind::Frontend, "web").unwrap_err();
        assert!(matches!(err, DocumentError::SectionExists { .. }));

        let err = doc.create_section(SectionKind::Frontend, "").unwrap_err();
        assert!(matches!(err, DocumentError::InvalidLabel { .. }));
    }

    #[test]
    fn test_insert_and_set() {
        let mut doc = ConfigDocument::default();
        doc.create_section(SectionKind::Frontend, "web").unwrap();
        doc.insert(SectionKind::Frontend, "web", Directive::new("bind", ":80")).unwrap();
        doc.insert(SectionKind::Frontend, "web", Directive::new("bind", ":81")).unwrap();
        doc.set(SectionKind::Frontend, "web", Directive::new("use_backend", "a")).unwrap();
        doc.set(SectionKind::Frontend, "web", Directive::new("use_backend", "b")).unwrap();

        let web = doc.section(SectionKind::Frontend, "web").unwrap();
        assert_eq!(web.find("bind").count(), 2);
        let backends: Vec<_> = web.find("use_backend").map(|d| d.args.as_str()).collect();
        assert_eq!(backends, vec!["b"]);

        let err = doc
            .insert(SectionKind::Backend, "missing", Directive::new("server", "x"))
            .unwrap_err();
        assert!(matches!(err, DocumentError::SectionMissing { .. }));
    }

    #[test]
    fn test_set_server_replaces_by_name() {
        let mut doc = ConfigDocument::default();
        doc.create_section(SectionKind::Backend, "web").unwrap();
        doc.set_server("web", "a", "1.1.1.1:80").unwrap();
        doc.set_server("web", "b", "2.2.2.2:80").unwrap();
        doc.set_server("web", "a", "3.3.3.3:80").unwrap();

        assert_eq!(
            doc.to_string(),
            "backend web\n  server a 3.3.3.3:80\n  server b 2.2.2.2:80\n"
        );
        assert!(matches!(
            doc.set_server("web", "", "1.1.1.1:80"),
            Err(DocumentError::InvalidServerName(_))
        ));
    }
}
