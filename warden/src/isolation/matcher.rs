//! Protected-path matching.
//!
//! A candidate path is normalized lexically and, when it lives under the
//! project root, also considered in its project-relative form. Relative rule
//! patterns are matched against the relative form, absolute ones against the
//! absolute form.
//!
//! Two policies exist:
//!
//! - [`MatchPolicy::Legacy`] reproduces the historical behaviour: `**` is
//!   loosened to `*` and globs are matched right-anchored one component at a
//!   time, so a recursive pattern only reliably matches one level deep (a bare
//!   `README.md` does *not* match `**/*.md`). Plain patterns use string prefix
//!   containment, so `coordination/` also blocks `coordination_notes.txt`.
//! - [`MatchPolicy::Strict`] matches globs against the whole relative path with
//!   real recursive `**`, protects everything below a matching directory, and
//!   compares plain patterns on component boundaries.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::rules::ProtectedPathRule;
use super::scopes::normalize_path_lexically;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    Legacy,
    #[default]
    Strict,
}

const STRICT_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug)]
enum CompiledPattern {
    /// Right-anchored per-component globs.
    Components(Vec<Pattern>),
    /// Whole-path glob.
    Glob(Pattern),
    /// Plain path, compared textually (legacy) or by component (strict).
    Plain(PathBuf),
}

#[derive(Debug)]
struct CompiledRule {
    rule: ProtectedPathRule,
    absolute: bool,
    pattern: CompiledPattern,
}

/// Decides whether arbitrary paths fall under a protected rule. Side-effect free.
#[derive(Debug)]
pub struct ProtectedPathMatcher {
    project_root: PathBuf,
    policy: MatchPolicy,
    rules: Vec<CompiledRule>,
}

impl ProtectedPathMatcher {
    /// Compile `rules` for matching under `project_root`.
    ///
    /// `project_root` should be absolute; it is normalized lexically and never
    /// touched on disk.
    pub fn new(
        project_root: &Path,
        policy: MatchPolicy,
        rules: Vec<ProtectedPathRule>,
    ) -> Result<Self, PatternError> {
        let compiled = rules
            .into_iter()
            .map(|rule| compile(rule, policy))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            project_root: normalize_path_lexically(project_root),
            policy,
            rules: compiled,
        })
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn rules(&self) -> impl Iterator<Item = &ProtectedPathRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_protected(&self, path: &Path) -> bool {
        self.matching_rule(path).is_some()
    }

    /// The first rule that protects `path`, if any.
    pub fn matching_rule(&self, path: &Path) -> Option<&ProtectedPathRule> {
        let (relative, absolute) = self.candidate_forms(path);

        self.rules
            .iter()
            .find(|compiled| {
                let candidate = if compiled.absolute {
                    Some(absolute.as_path())
                } else {
                    relative.as_deref()
                };
                candidate.is_some_and(|c| self.matches(compiled, c))
            })
            .map(|compiled| &compiled.rule)
    }

    /// Resolve a caller-supplied path the same way the matcher sees it.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.candidate_forms(path).1
    }

    /// Project-relative form (absent when `path` lies outside the project) and
    /// absolute form of `path`.
    fn candidate_forms(&self, path: &Path) -> (Option<PathBuf>, PathBuf) {
        let absolute = normalize_path_lexically(&self.project_root.join(path));
        let relative = absolute
            .strip_prefix(&self.project_root)
            .ok()
            .map(Path::to_path_buf);
        (relative, absolute)
    }

    fn matches(&self, compiled: &CompiledRule, candidate: &Path) -> bool {
        match (&compiled.pattern, self.policy) {
            (CompiledPattern::Components(patterns), _) => {
                match_right_anchored(patterns, compiled.absolute, candidate)
            }
            (CompiledPattern::Glob(pattern), _) => candidate
                .ancestors()
                .filter(|p| !p.as_os_str().is_empty())
                .any(|p| pattern.matches_path_with(p, STRICT_OPTIONS)),
            (CompiledPattern::Plain(rule_path), MatchPolicy::Legacy) => {
                let candidate = candidate.to_string_lossy();
                let rule = rule_path.to_string_lossy();
                candidate == rule || candidate.starts_with(rule.as_ref())
            }
            (CompiledPattern::Plain(rule_path), MatchPolicy::Strict) => {
                candidate.starts_with(rule_path)
            }
        }
    }
}

fn compile(rule: ProtectedPathRule, policy: MatchPolicy) -> Result<CompiledRule, PatternError> {
    let absolute = Path::new(&rule.pattern).is_absolute();

    let pattern = if rule.is_glob() {
        match policy {
            MatchPolicy::Legacy => {
                let loosened = rule.pattern.replace("**", "*");
                let components = normal_components(Path::new(&loosened))
                    .map(|c| Pattern::new(&c.to_string_lossy()))
                    .collect::<Result<Vec<_>, _>>()?;
                CompiledPattern::Components(components)
            }
            MatchPolicy::Strict => {
                let trimmed = rule.pattern.trim_end_matches('/');
                CompiledPattern::Glob(Pattern::new(trimmed)?)
            }
        }
    } else {
        CompiledPattern::Plain(normalize_path_lexically(Path::new(&rule.pattern)))
    };

    let empty = match &pattern {
        CompiledPattern::Components(c) => c.is_empty(),
        CompiledPattern::Glob(p) => p.as_str().is_empty(),
        CompiledPattern::Plain(p) => p.as_os_str().is_empty(),
    };
    if empty {
        return Err(PatternError {
            pos: 0,
            msg: "pattern does not name any path",
        });
    }

    Ok(CompiledRule {
        rule,
        absolute,
        pattern,
    })
}

fn normal_components(path: &Path) -> impl Iterator<Item = &OsStr> {
    path.components().filter_map(|c| match c {
        Component::Normal(s) => Some(s),
        _ => None,
    })
}

/// Match per-component globs against the tail of `candidate`.
///
/// Absolute patterns must cover the whole candidate.
fn match_right_anchored(patterns: &[Pattern], anchored: bool, candidate: &Path) -> bool {
    let parts: Vec<&OsStr> = normal_components(candidate).collect();
    if parts.len() < patterns.len() || (anchored && parts.len() != patterns.len()) {
        return false;
    }

    let tail = &parts[parts.len() - patterns.len()..];
    patterns
        .iter()
        .zip(tail)
        .all(|(pattern, part)| pattern.matches(&part.to_string_lossy()))
}
