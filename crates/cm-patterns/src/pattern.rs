//! Migration pattern types.
//!
//! A [`MigrationPattern`] pairs a pure [`Matcher`] (`content -> matches`) with
//! a pure [`Transform`] (`match -> replacement`). Both halves are side-effect
//! free, so a pattern can be exercised against its own example pairs without
//! touching the filesystem.

use std::fmt;

use cm_core::RiskLevel;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PatternError;

/// Fixed set of pattern categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    /// UI framework APIs (components, rendering).
    UiFramework,
    /// Type annotations.
    TypeSystem,
    /// Core language constructs.
    GeneralLanguage,
    /// Stylesheets.
    Styling,
    /// Build tooling configuration.
    Build,
    /// Test suites.
    Testing,
    /// Package manifests.
    Dependency,
}

impl PatternCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::UiFramework,
        Self::TypeSystem,
        Self::GeneralLanguage,
        Self::Styling,
        Self::Build,
        Self::Testing,
        Self::Dependency,
    ];

    /// Returns the kebab-case label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UiFramework => "ui-framework",
            Self::TypeSystem => "type-system",
            Self::GeneralLanguage => "general-language",
            Self::Styling => "styling",
            Self::Build => "build",
            Self::Testing => "testing",
            Self::Dependency => "dependency",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One occurrence of a pattern in some content.
///
/// Offsets are byte offsets into the content the match was found in.
/// `groups[0]` is the whole match; unmatched optional groups are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Start byte offset.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Capture groups, group 0 first.
    pub groups: Vec<Option<String>>,
}

impl PatternMatch {
    /// The matched text.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        self.group(0).unwrap_or_default()
    }

    /// The text of capture group `index`, if it participated.
    #[inline]
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }
}

/// Match predicate over file content.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Regular expression.
    Regex(Regex),
    /// Exact substring.
    Literal(String),
}

impl Matcher {
    /// Compiles a regex matcher.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidRegex`] if the expression does not compile.
    pub fn regex(source: &str) -> Result<Self, PatternError> {
        Regex::new(source)
            .map(Self::Regex)
            .map_err(|source_err| PatternError::InvalidRegex {
                pattern: source.to_owned(),
                source: source_err,
            })
    }

    /// Creates a literal matcher.
    #[must_use]
    pub fn literal(needle: impl Into<String>) -> Self {
        Self::Literal(needle.into())
    }

    /// The matcher's source text, used as a validation rule descriptor.
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::Regex(regex) => regex.as_str(),
            Self::Literal(needle) => needle,
        }
    }

    /// Returns `true` if the matcher accepts the empty string.
    #[must_use]
    pub fn matches_empty(&self) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(""),
            Self::Literal(needle) => needle.is_empty(),
        }
    }

    /// Returns `true` if `content` contains at least one match.
    #[must_use]
    pub fn is_match(&self, content: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(content),
            Self::Literal(needle) => !needle.is_empty() && content.contains(needle.as_str()),
        }
    }

    /// Returns all non-overlapping matches, in order.
    #[must_use]
    pub fn find(&self, content: &str) -> Vec<PatternMatch> {
        match self {
            Self::Regex(regex) => regex
                .captures_iter(content)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    Some(PatternMatch {
                        start: whole.start(),
                        end: whole.end(),
                        groups: caps
                            .iter()
                            .map(|g| g.map(|m| m.as_str().to_owned()))
                            .collect(),
                    })
                })
                .collect(),
            Self::Literal(needle) if needle.is_empty() => Vec::new(),
            Self::Literal(needle) => content
                .match_indices(needle.as_str())
                .map(|(start, text)| PatternMatch {
                    start,
                    end: start + text.len(),
                    groups: vec![Some(text.to_owned())],
                })
                .collect(),
        }
    }
}

/// Pure replacement function from a match to its new text.
#[derive(Clone)]
pub enum Transform {
    /// Template with `$N` / `${N}` group references and `$$` for a literal `$`.
    Template(String),
    /// Fixed replacement text.
    Replace(String),
    /// Arbitrary pure function.
    Function(fn(&PatternMatch) -> String),
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::Replace(r) => f.debug_tuple("Replace").field(r).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl Transform {
    /// Produces the replacement text for `m`.
    #[must_use]
    pub fn apply(&self, m: &PatternMatch) -> String {
        match self {
            Self::Template(template) => expand_template(template, m),
            Self::Replace(text) => text.clone(),
            Self::Function(f) => f(m),
        }
    }
}

/// Expands `$N`, `${N}` and `$$` in `template`. Only numeric groups are
/// supported; references to missing groups expand to nothing.
fn expand_template(template: &str, m: &PatternMatch) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                chars.next();
                let mut digits = String::new();
                let mut closed = false;
                for (_, d) in chars.by_ref() {
                    if d == '}' {
                        closed = true;
                        break;
                    }
                    digits.push(d);
                }
                match digits.parse::<usize>() {
                    Ok(index) if closed => out.push_str(m.group(index).unwrap_or_default()),
                    _ => {
                        out.push_str("${");
                        out.push_str(&digits);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            Some((_, d)) if d.is_ascii_digit() => {
                let mut index = 0usize;
                while let Some((_, d)) = chars.peek().copied() {
                    let Some(value) = d.to_digit(10) else { break };
                    index = index.saturating_mul(10).saturating_add(value as usize);
                    chars.next();
                }
                out.push_str(m.group(index).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    out
}

/// Illustrative input/output pair; used for self-test only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamplePair {
    /// Content before the pattern is applied.
    pub input: String,
    /// Content after every match is transformed.
    pub output: String,
}

/// A catalogued transformation.
///
/// # Examples
///
/// ```
/// use cm_core::RiskLevel;
/// use cm_patterns::{Matcher, MigrationPattern, PatternCategory, Transform};
///
/// let pattern = MigrationPattern::new(
///     "var-to-let",
///     "var to let",
///     PatternCategory::GeneralLanguage,
///     Matcher::regex(r"\bvar\s+")?,
///     Transform::Replace("let ".to_owned()),
/// )
/// .with_risk(RiskLevel::Low)
/// .with_example("var a = 1;", "let a = 1;");
///
/// assert!(pattern.self_test().is_ok());
/// let (out, count) = pattern.apply_all("var a; var b;");
/// assert_eq!(out, "let a; let b;");
/// assert_eq!(count, 2);
/// # Ok::<(), cm_patterns::PatternError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MigrationPattern {
    /// Unique id.
    pub id: String,
    /// Human name.
    pub name: String,
    /// What the pattern does. A description mentioning "breaking" marks
    /// produced steps as breaking changes.
    pub description: String,
    /// Category.
    pub category: PatternCategory,
    /// Match predicate.
    pub matcher: Matcher,
    /// Replacement function.
    pub transform: Transform,
    /// Risk of each produced step.
    pub risk_level: RiskLevel,
    /// Packages or tools the transformed code needs.
    pub dependencies: Vec<String>,
    /// Example pairs for self-test.
    pub examples: Vec<ExamplePair>,
    /// Feature the pattern removes.
    pub deprecates: Option<String>,
    /// Feature the pattern introduces.
    pub introduces: Option<String>,
}

impl MigrationPattern {
    /// Creates a low-risk pattern with no dependencies or examples.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: PatternCategory,
        matcher: Matcher,
        transform: Transform,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            matcher,
            transform,
            risk_level: RiskLevel::Low,
            dependencies: Vec::new(),
            examples: Vec::new(),
            deprecates: None,
            introduces: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the risk level.
    #[must_use]
    pub const fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    /// Adds declared dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies.extend(deps.iter().map(ToString::to_string));
        self
    }

    /// Adds an example pair.
    #[must_use]
    pub fn with_example(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.examples.push(ExamplePair {
            input: input.into(),
            output: output.into(),
        });
        self
    }

    /// Records the deprecated and introduced features.
    #[must_use]
    pub fn with_features(mut self, deprecates: &str, introduces: &str) -> Self {
        self.deprecates = Some(deprecates.to_owned());
        self.introduces = Some(introduces.to_owned());
        self
    }

    /// All matches in `content`.
    #[inline]
    #[must_use]
    pub fn find_matches(&self, content: &str) -> Vec<PatternMatch> {
        self.matcher.find(content)
    }

    /// Replacement text for one match.
    #[inline]
    #[must_use]
    pub fn transform(&self, m: &PatternMatch) -> String {
        self.transform.apply(m)
    }

    /// Replaces the single match `m` inside `content`.
    ///
    /// `m` must have been found in `content`; out-of-range matches leave the
    /// content unchanged.
    #[must_use]
    pub fn apply_match(&self, content: &str, m: &PatternMatch) -> String {
        let (Some(head), Some(tail)) = (content.get(..m.start), content.get(m.end..)) else {
            return content.to_owned();
        };
        let replacement = self.transform(m);
        let mut out = String::with_capacity(head.len() + replacement.len() + tail.len());
        out.push_str(head);
        out.push_str(&replacement);
        out.push_str(tail);
        out
    }

    /// Replaces every match in one pass; returns the new content and match count.
    #[must_use]
    pub fn apply_all(&self, content: &str) -> (String, usize) {
        let matches = self.find_matches(content);
        if matches.is_empty() {
            return (content.to_owned(), 0);
        }

        let mut out = String::with_capacity(content.len());
        let mut cursor = 0;
        for m in &matches {
            out.push_str(content.get(cursor..m.start).unwrap_or_default());
            out.push_str(&self.transform(m));
            cursor = m.end;
        }
        out.push_str(content.get(cursor..).unwrap_or_default());
        (out, matches.len())
    }

    /// Checks the matcher and every example pair.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::MatchesEmpty`] for a matcher that accepts the
    /// empty string and [`PatternError::ExampleMismatch`] for the first
    /// example whose output differs.
    pub fn self_test(&self) -> Result<(), PatternError> {
        if self.matcher.matches_empty() {
            return Err(PatternError::MatchesEmpty(self.id.clone()));
        }
        for example in &self.examples {
            let (actual, _) = self.apply_all(&example.input);
            if actual != example.output {
                return Err(PatternError::ExampleMismatch {
                    id: self.id.clone(),
                    input: example.input.clone(),
                    expected: example.output.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Serializable view of the pattern.
    #[must_use]
    pub fn summary(&self) -> PatternSummary {
        PatternSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category,
            risk_level: self.risk_level,
            source: self.matcher.source().to_owned(),
            dependencies: self.dependencies.clone(),
            examples: self.examples.clone(),
        }
    }
}

/// Serializable description of a registered pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSummary {
    /// Unique id.
    pub id: String,
    /// Human name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Category.
    pub category: PatternCategory,
    /// Risk level.
    pub risk_level: RiskLevel,
    /// Matcher source.
    pub source: String,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
    /// Example pairs.
    pub examples: Vec<ExamplePair>,
}
