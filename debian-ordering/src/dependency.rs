// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package dependency syntax handling.

A dependency field value such as `libc6 (>= 2.4), libfoo [amd64] | libbar` is
parsed into a [Dependency]. A [Dependency] is a list of [Relation] (all of which
must hold), each of which is a list of [Possibility] (any of which satisfies it).

See <https://www.debian.org/doc/debian-policy/ch-relationships.html> for the
syntax definition.
 */

use {
    crate::{
        architecture::{Architecture, ArchitectureError, ArchitectureSet},
        package_version::{PackageVersion, VersionError},
    },
    once_cell::sync::Lazy,
    regex::Regex,
    serde::{Serialize, Serializer},
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        str::FromStr,
    },
    thiserror::Error,
};

/// Regular expression matching a substitution variable such as `${shlibs:Depends}`.
pub static RE_SUBSTVAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\{[^}]+\}$").unwrap());

/// Regular expression matching a package name, with an optional `:qualifier` suffix.
static RE_PACKAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9+.\-]*(:[a-z0-9]+)?$").unwrap());

/// Errors related to dependency handling.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DependencyError {
    #[error("unmatched `{0}` in dependency expression: {1}")]
    UnmatchedDelimiter(char, String),

    #[error("more than one version constraint: {0}")]
    DuplicateVersionConstraint(String),

    #[error("more than one architecture restriction: {0}")]
    DuplicateArchitectureRestriction(String),

    #[error("unknown version relationship operator: {0}")]
    BadOperator(String),

    #[error("architecture restriction mixes negated and plain entries: {0}")]
    InconsistentNegation(String),

    #[error("empty alternative in dependency relation: {0}")]
    EmptyPossibility(String),

    #[error("empty architecture restriction: {0}")]
    EmptyArchitectureRestriction(String),

    #[error("invalid package name: {0}")]
    InvalidPackageName(String),

    #[error("unexpected text in dependency expression: {0}")]
    UnexpectedText(String),

    #[error("version parsing error: {0}")]
    Version(#[from] VersionError),

    #[error("architecture parsing error: {0}")]
    Architecture(#[from] ArchitectureError),
}

/// Result type for dependency handling.
pub type Result<T> = std::result::Result<T, DependencyError>;

/// A version relationship operator.
///
/// `<` and `>` are deprecated spellings of `<=` and `>=`. They compare the same way
/// but are kept distinct so an expression renders as it was written.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    strum::AsRefStr,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
pub enum VersionRelationship {
    #[strum(serialize = "<<")]
    StrictlyEarlier,
    #[strum(serialize = "<=")]
    EarlierOrEqual,
    #[strum(serialize = "=")]
    ExactlyEqual,
    #[strum(serialize = ">=")]
    LaterOrEqual,
    #[strum(serialize = ">>")]
    StrictlyLater,
    #[strum(serialize = "<")]
    LegacyEarlierOrEqual,
    #[strum(serialize = ">")]
    LegacyLaterOrEqual,
}

impl Serialize for VersionRelationship {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl VersionRelationship {
    /// Whether the ordering of a candidate relative to a constraint version satisfies this operator.
    pub fn accepts(&self, ordering: Ordering) -> bool {
        matches!(
            (self, ordering),
            (Self::StrictlyEarlier, Ordering::Less)
                | (
                    Self::EarlierOrEqual | Self::LegacyEarlierOrEqual,
                    Ordering::Less | Ordering::Equal
                )
                | (Self::ExactlyEqual, Ordering::Equal)
                | (
                    Self::LaterOrEqual | Self::LegacyLaterOrEqual,
                    Ordering::Greater | Ordering::Equal
                )
                | (Self::StrictlyLater, Ordering::Greater)
        )
    }
}

/// Represents a version constraint on a given package.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct VersionConstraint {
    pub relationship: VersionRelationship,
    pub version: PackageVersion,
}

impl Display for VersionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.relationship, self.version)
    }
}

impl VersionConstraint {
    /// Whether a version satisfies this constraint.
    ///
    /// Comparison uses policy precedence, so `1.01` satisfies `(= 1.1)`.
    pub fn satisfied_by(&self, candidate: &PackageVersion) -> bool {
        self.relationship
            .accepts(candidate.compare_precedence(&self.version))
    }
}

/// A single alternative within a dependency relation.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Possibility {
    /// Package name, or a `${...}` substitution variable.
    pub name: String,
    pub version_constraint: Option<VersionConstraint>,
    pub architectures: ArchitectureSet,
}

impl Display for Possibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(constraint) = &self.version_constraint {
            write!(f, " ({})", constraint)?;
        }
        if !self.architectures.is_empty() {
            write!(f, " {}", self.architectures)?;
        }

        Ok(())
    }
}

impl FromStr for Possibility {
    type Err = DependencyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Possibility {
    /// Parse a single `name (op version) [arch ...]` expression.
    ///
    /// The version constraint and architecture restriction are both optional and may
    /// appear in either order.
    pub fn parse(s: &str) -> Result<Self> {
        let expr = s.trim();
        if expr.is_empty() {
            return Err(DependencyError::EmptyPossibility(s.to_string()));
        }

        let (name, mut rest) = split_name(expr)?;

        let mut version_constraint = None;
        let mut architectures = None;

        loop {
            rest = rest.trim_start();

            let c = match rest.chars().next() {
                Some(c) => c,
                None => break,
            };

            match c {
                '(' => {
                    if version_constraint.is_some() {
                        return Err(DependencyError::DuplicateVersionConstraint(
                            expr.to_string(),
                        ));
                    }
                    let close = rest
                        .find(')')
                        .ok_or_else(|| DependencyError::UnmatchedDelimiter('(', expr.to_string()))?;

                    version_constraint = Some(parse_version_constraint(&rest[1..close])?);
                    rest = &rest[close + 1..];
                }
                '[' => {
                    if architectures.is_some() {
                        return Err(DependencyError::DuplicateArchitectureRestriction(
                            expr.to_string(),
                        ));
                    }
                    let close = rest
                        .find(']')
                        .ok_or_else(|| DependencyError::UnmatchedDelimiter('[', expr.to_string()))?;

                    architectures = Some(parse_architecture_restriction(&rest[1..close])?);
                    rest = &rest[close + 1..];
                }
                ')' | ']' => {
                    return Err(DependencyError::UnmatchedDelimiter(c, expr.to_string()));
                }
                _ => {
                    return Err(DependencyError::UnexpectedText(rest.to_string()));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            version_constraint,
            architectures: architectures.unwrap_or_default(),
        })
    }

    /// Whether this names a substitution variable rather than a package.
    pub fn is_substvar(&self) -> bool {
        RE_SUBSTVAR.is_match(&self.name)
    }

    /// The package name without any `:arch` qualifier.
    pub fn package_name(&self) -> &str {
        if self.is_substvar() {
            &self.name
        } else {
            self.name
                .split_once(':')
                .map(|(name, _)| name)
                .unwrap_or(&self.name)
        }
    }

    /// Obtain a copy of this possibility naming a different package.
    pub fn with_name(&self, name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Whether a package with the given name and version satisfies this possibility.
    ///
    /// The architecture restriction is not consulted: it selects which possibilities
    /// apply, not which packages satisfy them.
    pub fn satisfied_by(&self, name: &str, version: &PackageVersion) -> bool {
        if self.package_name() != name {
            return false;
        }

        self.version_constraint
            .as_ref()
            .map(|constraint| constraint.satisfied_by(version))
            .unwrap_or(true)
    }
}

/// Split the leading package name (or substitution variable) from an expression.
fn split_name(expr: &str) -> Result<(&str, &str)> {
    let end = if expr.starts_with("${") {
        expr.find('}')
            .map(|i| i + 1)
            .ok_or_else(|| DependencyError::UnmatchedDelimiter('{', expr.to_string()))?
    } else {
        expr.find(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']'))
            .unwrap_or(expr.len())
    };

    let (name, rest) = expr.split_at(end);

    if RE_SUBSTVAR.is_match(name) || RE_PACKAGE_NAME.is_match(name) {
        Ok((name, rest))
    } else if name.is_empty() {
        Err(DependencyError::InvalidPackageName(expr.to_string()))
    } else {
        Err(DependencyError::InvalidPackageName(name.to_string()))
    }
}

fn parse_version_constraint(inner: &str) -> Result<VersionConstraint> {
    let inner = inner.trim();

    let split = inner
        .find(|c: char| !matches!(c, '<' | '>' | '='))
        .unwrap_or(inner.len());
    let (op, version) = inner.split_at(split);

    let relationship = VersionRelationship::from_str(op)
        .map_err(|_| DependencyError::BadOperator(inner.to_string()))?;
    let version = PackageVersion::parse(version.trim())?;

    Ok(VersionConstraint {
        relationship,
        version,
    })
}

fn parse_architecture_restriction(inner: &str) -> Result<ArchitectureSet> {
    let mut negated = None;
    let mut architectures = vec![];

    for token in inner.split_ascii_whitespace() {
        let (token_negated, name) = match token.strip_prefix('!') {
            Some(name) => (true, name),
            None => (false, token),
        };

        match negated {
            None => negated = Some(token_negated),
            Some(n) if n != token_negated => {
                return Err(DependencyError::InconsistentNegation(inner.trim().to_string()));
            }
            Some(_) => {}
        }

        architectures.push(Architecture::parse(name)?);
    }

    match negated {
        Some(negated) => Ok(ArchitectureSet::new(architectures, negated)),
        None => Err(DependencyError::EmptyArchitectureRestriction(
            inner.to_string(),
        )),
    }
}

/// A disjunction of [Possibility], written `a | b | c`.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Relation {
    possibilities: Vec<Possibility>,
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.possibilities
                .iter()
                .map(|x| format!("{}", x))
                .collect::<Vec<_>>()
                .join(" | ")
        )
    }
}

impl Relation {
    /// Parse a `|` delimited list of possibilities.
    pub fn parse(s: &str) -> Result<Self> {
        let possibilities = s
            .split('|')
            .map(|alt| {
                if alt.trim().is_empty() {
                    Err(DependencyError::EmptyPossibility(s.trim().to_string()))
                } else {
                    Possibility::parse(alt)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { possibilities })
    }

    pub fn possibilities(&self) -> impl Iterator<Item = &Possibility> {
        self.possibilities.iter()
    }

    /// The first possibility applicable to an architecture, if any.
    pub fn possibility_for(&self, arch: &Architecture) -> Option<&Possibility> {
        self.possibilities
            .iter()
            .find(|p| p.architectures.matches(arch))
    }
}

/// A conjunction of [Relation], written `a, b | c, d`.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Dependency {
    relations: Vec<Relation>,
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.relations
                .iter()
                .map(|x| format!("{}", x))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl FromStr for Dependency {
    type Err = DependencyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Dependency {
    /// Parse a dependency field value.
    ///
    /// Blank relations, such as those produced by a trailing comma, are skipped.
    pub fn parse(s: &str) -> Result<Self> {
        let relations = s
            .split(',')
            .filter(|el| !el.trim().is_empty())
            .map(Relation::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { relations })
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Resolve the possibilities that apply to a given architecture.
    ///
    /// Each relation contributes its first possibility whose architecture restriction
    /// matches `arch`. A relation with no matching possibility contributes nothing.
    pub fn get_possibilities(&self, arch: &Architecture) -> Vec<&Possibility> {
        self.relations
            .iter()
            .filter_map(|relation| relation.possibility_for(arch))
            .collect()
    }

    /// Every possibility naming a package, in textual order.
    pub fn get_all_possibilities(&self) -> Vec<&Possibility> {
        self.relations
            .iter()
            .flat_map(|relation| relation.possibilities())
            .filter(|p| !p.is_substvar())
            .collect()
    }

    /// Every substitution variable, in textual order.
    pub fn get_substvars(&self) -> Vec<&Possibility> {
        self.relations
            .iter()
            .flat_map(|relation| relation.possibilities())
            .filter(|p| p.is_substvar())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use {super::*, strum::IntoEnumIterator};

    fn names<'a>(possibilities: impl IntoIterator<Item = &'a Possibility>) -> Vec<&'a str> {
        possibilities.into_iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn parse_depends() -> Result<()> {
        let dep = Dependency::parse("libc6 (>= 2.4), libx11-6")?;
        assert_eq!(dep.relations.len(), 2);
        assert_eq!(dep.relations[0].possibilities.len(), 1);
        assert_eq!(dep.relations[1].possibilities.len(), 1);

        assert_eq!(
            dep.relations[0].possibilities[0],
            Possibility {
                name: "libc6".into(),
                version_constraint: Some(VersionConstraint {
                    relationship: VersionRelationship::LaterOrEqual,
                    version: PackageVersion::parse("2.4")?,
                }),
                architectures: ArchitectureSet::default(),
            }
        );
        assert_eq!(
            dep.relations[1].possibilities[0],
            Possibility {
                name: "libx11-6".into(),
                version_constraint: None,
                architectures: ArchitectureSet::default(),
            }
        );

        let dep = Dependency::parse("libc [amd64]")?;
        assert_eq!(
            dep.relations[0].possibilities[0].architectures,
            ArchitectureSet::new(vec![Architecture::parse("amd64")?], false)
        );

        let dep = Dependency::parse("libc [!amd64 !i386]")?;
        assert_eq!(
            dep.relations[0].possibilities[0].architectures,
            ArchitectureSet::new(
                vec![Architecture::parse("amd64")?, Architecture::parse("i386")?],
                true
            )
        );

        Ok(())
    }

    #[test]
    fn parse_layout() -> Result<()> {
        let p = Possibility::parse("  foo[amd64](<<1.0)  ")?;
        assert_eq!(p.name, "foo");
        assert_eq!(
            p.version_constraint.as_ref().map(|c| c.relationship),
            Some(VersionRelationship::StrictlyEarlier)
        );
        assert_eq!(p.architectures.iter().count(), 1);

        let p = Possibility::parse("foo:any ( >= 1:2.0-1 )")?;
        assert_eq!(p.name, "foo:any");
        assert_eq!(p.package_name(), "foo");

        let dep = Dependency::parse("foo, , bar,")?;
        assert_eq!(names(dep.get_all_possibilities()), vec!["foo", "bar"]);
        assert!(Dependency::parse("")?.is_empty());

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            Possibility::parse("foo (>= 1.0"),
            Err(DependencyError::UnmatchedDelimiter('(', _))
        ));
        assert!(matches!(
            Possibility::parse("foo [amd64"),
            Err(DependencyError::UnmatchedDelimiter('[', _))
        ));
        assert!(matches!(
            Possibility::parse("foo >= 1.0)"),
            Err(DependencyError::UnexpectedText(_))
        ));
        assert!(matches!(
            Possibility::parse("foo amd64]"),
            Err(DependencyError::UnexpectedText(_))
        ));
        assert!(matches!(
            Possibility::parse("foo ]"),
            Err(DependencyError::UnmatchedDelimiter(']', _))
        ));
        assert!(matches!(
            Possibility::parse("foo (>= 1.0) (<< 2.0)"),
            Err(DependencyError::DuplicateVersionConstraint(_))
        ));
        assert!(matches!(
            Possibility::parse("foo [amd64] [i386]"),
            Err(DependencyError::DuplicateArchitectureRestriction(_))
        ));
        assert!(matches!(
            Possibility::parse("foo (>= 1.0) (<< 2.0"),
            Err(DependencyError::DuplicateVersionConstraint(_))
        ));
        assert!(matches!(
            Possibility::parse("foo [amd64] [i386"),
            Err(DependencyError::DuplicateArchitectureRestriction(_))
        ));
        assert!(matches!(
            Possibility::parse("foo [amd64] (>= 1.0) [i386"),
            Err(DependencyError::DuplicateArchitectureRestriction(_))
        ));
        assert!(matches!(
            Possibility::parse("foo (=> 1.0)"),
            Err(DependencyError::BadOperator(_))
        ));
        assert!(matches!(
            Possibility::parse("foo (1.0)"),
            Err(DependencyError::BadOperator(_))
        ));
        assert!(matches!(
            Possibility::parse("foo [amd64 !i386]"),
            Err(DependencyError::InconsistentNegation(_))
        ));
        assert!(matches!(
            Possibility::parse("foo []"),
            Err(DependencyError::EmptyArchitectureRestriction(_))
        ));
        assert!(matches!(
            Possibility::parse("foo [AMD64]"),
            Err(DependencyError::Architecture(_))
        ));
        assert!(matches!(
            Possibility::parse("foo (>= 1.0 beta)"),
            Err(DependencyError::Version(VersionError::EmbeddedWhitespace(_)))
        ));
        assert!(matches!(
            Possibility::parse("(>= 1.0)"),
            Err(DependencyError::InvalidPackageName(_))
        ));
        assert!(matches!(
            Possibility::parse("${foo"),
            Err(DependencyError::UnmatchedDelimiter('{', _))
        ));
        assert!(matches!(
            Dependency::parse("foo | , bar"),
            Err(DependencyError::EmptyPossibility(_))
        ));
    }

    #[test]
    fn operators() -> Result<()> {
        for op in VersionRelationship::iter() {
            let p = Possibility::parse(&format!("foo ({} 1.0)", op))?;
            assert_eq!(p.version_constraint.map(|c| c.relationship), Some(op));
        }

        Ok(())
    }

    #[test]
    fn get_possibilities() -> Result<()> {
        let armhf = Architecture::parse("armhf")?;
        let amd64 = Architecture::parse("amd64")?;

        let dep = Dependency::parse("foo, bar [amd64] | baz")?;
        assert_eq!(names(dep.get_possibilities(&armhf)), vec!["foo", "baz"]);
        assert_eq!(names(dep.get_possibilities(&amd64)), vec!["foo", "bar"]);

        let dep = Dependency::parse("foo, bar [sparc] | baz")?;
        assert_eq!(names(dep.get_possibilities(&amd64)), vec!["foo", "baz"]);

        let dep = Dependency::parse("foo [amd64], bar [!sparc]")?;
        assert_eq!(
            names(dep.get_possibilities(&Architecture::parse("sparc")?)),
            Vec::<&str>::new()
        );
        assert_eq!(names(dep.get_possibilities(&amd64)), vec!["foo", "bar"]);
        assert_eq!(names(dep.get_possibilities(&armhf)), vec!["bar"]);

        let dep = Dependency::parse("foo [linux-any], bar [any-i386]")?;
        assert_eq!(names(dep.get_possibilities(&amd64)), vec!["foo"]);
        assert_eq!(
            names(dep.get_possibilities(&Architecture::parse("hurd-i386")?)),
            vec!["bar"]
        );

        Ok(())
    }

    #[test]
    fn substvars() -> Result<()> {
        let dep = Dependency::parse("${foo:Depends}, foo, bar | baz, ${bar:Depends}")?;

        assert_eq!(names(dep.get_all_possibilities()), vec!["foo", "bar", "baz"]);
        assert_eq!(
            names(dep.get_substvars()),
            vec!["${foo:Depends}", "${bar:Depends}"]
        );
        assert_eq!(dep.get_substvars()[0].package_name(), "${foo:Depends}");

        Ok(())
    }

    #[test]
    fn display() -> Result<()> {
        let dep = Dependency::parse(
            "libc6 (>=2.4),libfoo[!i386 !armel] | libbar (<< 1:2.0~rc1-1) [amd64], ${misc:Depends}",
        )?;
        let rendered = dep.to_string();
        assert_eq!(
            rendered,
            "libc6 (>= 2.4), libfoo [!i386 !armel] | libbar (<< 1:2.0~rc1-1) [amd64], ${misc:Depends}"
        );
        assert_eq!(Dependency::parse(&rendered)?, dep);

        let dep = Dependency::parse("foo (> 1.0)")?;
        assert_eq!(dep.to_string(), "foo (> 1.0)");

        Ok(())
    }

    #[test]
    fn satisfies_version_constraints() -> Result<()> {
        let check = |expr: &str, name: &str, version: &str| -> Result<bool> {
            Ok(Possibility::parse(expr)?.satisfied_by(name, &PackageVersion::parse(version)?))
        };

        assert!(check("libc (= 2.4)", "libc", "2.4")?);
        assert!(check("libc (= 2.4)", "libc", "2.04")?);
        assert!(!check("libc (= 2.4)", "libc", "2.3")?);
        assert!(!check("libc (= 2.4)", "other", "2.4")?);

        assert!(check("libc (<= 2.4)", "libc", "2.4")?);
        assert!(check("libc (< 2.4)", "libc", "2.4")?);
        assert!(!check("libc (<= 2.4)", "libc", "2.5")?);

        assert!(check("libc (>= 2.4)", "libc", "2.4")?);
        assert!(check("libc (> 2.4)", "libc", "2.4")?);
        assert!(!check("libc (>= 2.4)", "libc", "2.4~rc1")?);

        assert!(check("libc (<< 2.4)", "libc", "2.4~rc1")?);
        assert!(!check("libc (<< 2.4)", "libc", "2.4")?);

        assert!(check("libc (>> 2.4)", "libc", "1:1.0")?);
        assert!(!check("libc (>> 2.4)", "libc", "2.4")?);

        assert!(check("libc", "libc", "0.1")?);
        assert!(check("libc:amd64 (>= 1.0)", "libc", "1.0")?);

        Ok(())
    }

    #[test]
    fn serialize() -> Result<()> {
        let dep = Dependency::parse("foo (>= 1.0) [!i386] | bar")?;

        assert_eq!(
            serde_json::to_value(&dep).unwrap(),
            serde_json::json!([[
                {
                    "name": "foo",
                    "version_constraint": {"relationship": ">=", "version": "1.0"},
                    "architectures": {"architectures": ["i386"], "negated": true},
                },
                {
                    "name": "bar",
                    "version_constraint": null,
                    "architectures": {"architectures": [], "negated": false},
                },
            ]])
        );

        Ok(())
    }
}
