// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian architecture names and matching.

Debian identifies platforms by an `abi-libc-os-cpu` tuple. Architecture names
seen in control files (`amd64`, `armhf`, `linux-any`, `any-i386`) are short
aliases that expand to that tuple. See
<https://www.debian.org/doc/debian-policy/ch-customized-programs.html#architecture-specification-strings>
and dpkg's `tupletable`.
*/

use {
    serde::{de, Deserialize, Deserializer, Serialize, Serializer},
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ArchitectureError {
    #[error("architecture name is empty")]
    Empty,

    #[error("unrecognized architecture name: {0}")]
    UnknownAlias(String),

    #[error("`all` cannot be combined with other architecture components: {0}")]
    AllMixed(String),
}

pub type Result<T> = std::result::Result<T, ArchitectureError>;

const ALL: &str = "all";
const ANY: &str = "any";
const CPU_PLACEHOLDER: &str = "<cpu>";

/// Maps canonical `abi-libc-os-cpu` tuples to their short names.
///
/// Entries are matched in order, so more specific names precede the `<cpu>` patterns
/// they would otherwise match.
static TUPLE_TABLE: &[(&str, &str)] = &[
    ("eabi-uclibc-linux-arm", "uclibc-linux-armel"),
    ("base-uclibc-linux-<cpu>", "uclibc-linux-<cpu>"),
    ("eabihf-musl-linux-arm", "musl-linux-armhf"),
    ("base-musl-linux-<cpu>", "musl-linux-<cpu>"),
    ("eabihf-gnu-linux-arm", "armhf"),
    ("eabi-gnu-linux-arm", "armel"),
    ("abin32-gnu-linux-mips64r6el", "mipsn32r6el"),
    ("abin32-gnu-linux-mips64r6", "mipsn32r6"),
    ("abin32-gnu-linux-mips64el", "mipsn32el"),
    ("abin32-gnu-linux-mips64", "mipsn32"),
    ("abi64-gnu-linux-mips64r6el", "mips64r6el"),
    ("abi64-gnu-linux-mips64r6", "mips64r6"),
    ("abi64-gnu-linux-mips64el", "mips64el"),
    ("abi64-gnu-linux-mips64", "mips64"),
    ("spe-gnu-linux-powerpc", "powerpcspe"),
    ("x32-gnu-linux-amd64", "x32"),
    ("base-gnu-linux-<cpu>", "<cpu>"),
    ("base-gnu-kfreebsd-amd64", "kfreebsd-amd64"),
    ("base-gnu-kfreebsd-i386", "kfreebsd-i386"),
    ("base-gnu-kopensolaris-amd64", "kopensolaris-amd64"),
    ("base-gnu-kopensolaris-i386", "kopensolaris-i386"),
    ("base-gnu-hurd-amd64", "hurd-amd64"),
    ("base-gnu-hurd-i386", "hurd-i386"),
    ("base-bsd-dragonflybsd-amd64", "dragonflybsd-amd64"),
    ("base-bsd-freebsd-amd64", "freebsd-amd64"),
    ("base-bsd-freebsd-arm", "freebsd-arm"),
    ("base-bsd-freebsd-arm64", "freebsd-arm64"),
    ("base-bsd-freebsd-i386", "freebsd-i386"),
    ("base-bsd-freebsd-powerpc", "freebsd-powerpc"),
    ("base-bsd-freebsd-ppc64", "freebsd-ppc64"),
    ("base-bsd-freebsd-riscv", "freebsd-riscv"),
    ("base-bsd-openbsd-<cpu>", "openbsd-<cpu>"),
    ("base-bsd-netbsd-<cpu>", "netbsd-<cpu>"),
    ("base-bsd-darwin-amd64", "darwin-amd64"),
    ("base-bsd-darwin-arm", "darwin-arm"),
    ("base-bsd-darwin-arm64", "darwin-arm64"),
    ("base-bsd-darwin-i386", "darwin-i386"),
    ("base-bsd-darwin-powerpc", "darwin-powerpc"),
    ("base-bsd-darwin-ppc64", "darwin-ppc64"),
    ("base-sysv-aix-powerpc", "aix-powerpc"),
    ("base-sysv-aix-ppc64", "aix-ppc64"),
    ("base-sysv-solaris-amd64", "solaris-amd64"),
    ("base-sysv-solaris-i386", "solaris-i386"),
    ("base-sysv-solaris-sparc", "solaris-sparc"),
    ("base-sysv-solaris-sparc64", "solaris-sparc64"),
    ("base-tos-mint-m68k", "mint-m68k"),
];

/// Expand short name parts via [TUPLE_TABLE].
///
/// Returns [None] if no entry has the same number of parts and matches.
fn expand_alias(parts: &[&str]) -> Option<Vec<String>> {
    TUPLE_TABLE.iter().find_map(|(long, short)| {
        let pattern = short.split('-').collect::<Vec<_>>();
        if pattern.len() != parts.len() {
            return None;
        }

        let mut cpu = None;
        for (expected, actual) in pattern.iter().zip(parts) {
            if *expected == CPU_PLACEHOLDER {
                cpu = Some(*actual);
            } else if expected != actual {
                return None;
            }
        }

        let long = match cpu {
            Some(cpu) => long.replacen(CPU_PLACEHOLDER, cpu, 1),
            None => long.to_string(),
        };

        Some(long.split('-').map(|x| x.to_string()).collect())
    })
}

/// A Debian architecture, as an `abi-libc-os-cpu` tuple.
///
/// Each component is a concrete value or the wildcard `any`. The `all` architecture
/// (architecture independent) has every component set to `all`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Architecture {
    abi: String,
    libc: String,
    os: String,
    cpu: String,
}

impl Architecture {
    /// Construct an instance by parsing an architecture name.
    ///
    /// Accepts `all`, `any`, short aliases like `amd64` or `linux-any`, and full
    /// `abi-libc-os-cpu` tuples.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(ArchitectureError::Empty);
        }
        if s == ALL {
            return Ok(Self::all());
        }

        let mut parts = s.split('-').collect::<Vec<_>>();

        if parts.len() > 4
            || parts.iter().any(|p| {
                p.is_empty()
                    || !p
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            })
        {
            return Err(ArchitectureError::UnknownAlias(s.to_string()));
        }

        // `any-amd64` and friends are partial wildcards: pad on the left.
        if parts[0] == ANY {
            while parts.len() < 4 {
                parts.insert(0, ANY);
            }
        }

        let parts = expand_alias(&parts)
            .unwrap_or_else(|| parts.iter().map(|x| x.to_string()).collect());

        // Missing components default from the most specific end.
        let arch = match parts.as_slice() {
            [abi, libc, os, cpu] => Self::new(abi, libc, os, cpu),
            [libc, os, cpu] => Self::new("base", libc, os, cpu),
            [os, cpu] => Self::new("base", "gnu", os, cpu),
            [cpu] => Self::new("base", "gnu", "linux", cpu),
            _ => return Err(ArchitectureError::UnknownAlias(s.to_string())),
        };

        if arch.components().contains(&ALL) {
            return Err(ArchitectureError::AllMixed(s.to_string()));
        }

        Ok(arch)
    }

    fn new(abi: &str, libc: &str, os: &str, cpu: &str) -> Self {
        Self {
            abi: abi.to_string(),
            libc: libc.to_string(),
            os: os.to_string(),
            cpu: cpu.to_string(),
        }
    }

    /// The `all` architecture, for architecture independent packages.
    pub fn all() -> Self {
        Self::new(ALL, ALL, ALL, ALL)
    }

    /// The `any` architecture, matching every concrete architecture.
    pub fn any() -> Self {
        Self::new(ANY, ANY, ANY, ANY)
    }

    pub fn abi(&self) -> &str {
        &self.abi
    }

    pub fn libc(&self) -> &str {
        &self.libc
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn cpu(&self) -> &str {
        &self.cpu
    }

    fn components(&self) -> [&str; 4] {
        [&self.abi, &self.libc, &self.os, &self.cpu]
    }

    /// Whether this is the `all` architecture.
    pub fn is_all(&self) -> bool {
        self.cpu == ALL
    }

    /// Whether any component is the `any` wildcard.
    ///
    /// `all` is never a wildcard.
    pub fn is_wildcard(&self) -> bool {
        !self.is_all() && self.components().contains(&ANY)
    }

    /// Whether this architecture is equivalent to another.
    ///
    /// An `any` component on either side matches any value of the other. At least one
    /// side must be concrete: two wildcards never match each other. `all` only matches
    /// `all`.
    pub fn is(&self, other: &Self) -> bool {
        match (self.is_wildcard(), other.is_wildcard()) {
            (true, true) => false,
            (true, false) => other.is(self),
            _ => {
                self.components()
                    .iter()
                    .zip(other.components())
                    .all(|(ours, theirs)| *ours == theirs || (theirs == ANY && *ours != ALL))
            }
        }
    }

    /// Render the shortest name that parses back to this architecture.
    fn short_name(&self) -> String {
        if self.is_all() {
            return ALL.to_string();
        }
        if self.components() == [ANY; 4] {
            return ANY.to_string();
        }

        let components = self.components();

        let aliases = TUPLE_TABLE.iter().filter_map(|(long, short)| {
            let long = long.replacen(CPU_PLACEHOLDER, &self.cpu, 1);

            if long.split('-').eq(components.iter().copied()) {
                Some(short.replacen(CPU_PLACEHOLDER, &self.cpu, 1))
            } else {
                None
            }
        });
        // `cpu`, `os-cpu`, `libc-os-cpu`.
        let suffixes = (1..4).rev().map(|start| components[start..].join("-"));

        // Wildcard components can make an alias expand to something else.
        aliases
            .chain(suffixes)
            .find(|candidate| Self::parse(candidate).ok().as_ref() == Some(self))
            .unwrap_or_else(|| components.join("-"))
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.short_name())
    }
}

impl FromStr for Architecture {
    type Err = ArchitectureError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Architecture {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.short_name())
    }
}

impl<'de> Deserialize<'de> for Architecture {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        Self::parse(&s).map_err(de::Error::custom)
    }
}

/// Parse a whitespace delimited list of architectures.
///
/// This is the format of `Architecture` fields in source package paragraphs.
pub fn parse_architecture_list(s: &str) -> Result<Vec<Architecture>> {
    s.split_ascii_whitespace().map(Architecture::parse).collect()
}

/// A set of architectures restricting a dependency possibility.
///
/// This is the `[amd64 i386]` or `[!amd64 !i386]` suffix of a dependency. An empty
/// set matches every architecture.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct ArchitectureSet {
    architectures: Vec<Architecture>,
    negated: bool,
}

impl ArchitectureSet {
    pub fn new(architectures: Vec<Architecture>, negated: bool) -> Self {
        Self {
            architectures,
            negated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.architectures.is_empty()
    }

    /// Whether the set is negated (`[!amd64]`).
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn iter(&self) -> impl Iterator<Item = &Architecture> {
        self.architectures.iter()
    }

    /// Whether an architecture is matched by this set.
    pub fn matches(&self, arch: &Architecture) -> bool {
        if self.architectures.is_empty() {
            return true;
        }

        self.architectures.iter().any(|a| a.is(arch)) != self.negated
    }
}

impl Display for ArchitectureSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let prefix = if self.negated { "!" } else { "" };

        write!(
            f,
            "[{}]",
            self.architectures
                .iter()
                .map(|a| format!("{}{}", prefix, a))
                .collect::<Vec<_>>()
                .join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basics() -> Result<()> {
        let arch = Architecture::parse("amd64")?;
        assert_eq!(arch.abi(), "base");
        assert_eq!(arch.libc(), "gnu");
        assert_eq!(arch.os(), "linux");
        assert_eq!(arch.cpu(), "amd64");

        assert_eq!(
            Architecture::parse("armhf")?,
            Architecture::new("eabihf", "gnu", "linux", "arm")
        );
        assert_eq!(
            Architecture::parse("x32")?,
            Architecture::new("x32", "gnu", "linux", "amd64")
        );
        assert_eq!(
            Architecture::parse("musl-linux-armhf")?,
            Architecture::new("eabihf", "musl", "linux", "arm")
        );
        assert_eq!(
            Architecture::parse("openbsd-amd64")?,
            Architecture::new("base", "bsd", "openbsd", "amd64")
        );
        assert_eq!(
            Architecture::parse("linux-any")?,
            Architecture::new("base", "gnu", "linux", "any")
        );
        assert_eq!(
            Architecture::parse("any-amd64")?,
            Architecture::new("any", "any", "any", "amd64")
        );
        assert_eq!(Architecture::parse("any")?, Architecture::any());
        assert_eq!(Architecture::parse("all")?, Architecture::all());
        assert_eq!(
            Architecture::parse("base-gnu-linux-amd64")?,
            Architecture::parse("amd64")?
        );

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Architecture::parse(""), Err(ArchitectureError::Empty));
        assert_eq!(Architecture::parse(" "), Err(ArchitectureError::Empty));
        for s in ["amd64-", "-amd64", "a-b-c-d-e", "AMD64", "amd_64"] {
            assert!(
                matches!(
                    Architecture::parse(s),
                    Err(ArchitectureError::UnknownAlias(_))
                ),
                "{}",
                s
            );
        }
        assert!(matches!(
            Architecture::parse("base-gnu-linux-all"),
            Err(ArchitectureError::AllMixed(_))
        ));
        assert!(matches!(
            Architecture::parse("any-all"),
            Err(ArchitectureError::AllMixed(_))
        ));
    }

    #[test]
    fn display() -> Result<()> {
        for s in [
            "amd64",
            "armhf",
            "x32",
            "all",
            "any",
            "linux-any",
            "musl-linux-armhf",
            "kfreebsd-i386",
            "netbsd-sparc",
            "netbsd-any",
            "any-amd64",
        ] {
            assert_eq!(Architecture::parse(s)?.to_string(), s);
        }

        assert_eq!(
            Architecture::parse("any-any-any-amd64")?.to_string(),
            "any-amd64"
        );
        assert_eq!(Architecture::parse("base-gnu-linux-arm64")?.to_string(), "arm64");
        assert_eq!(Architecture::parse("gnu-linux-arm64")?.to_string(), "arm64");

        Ok(())
    }

    #[test]
    fn compare_x32() -> Result<()> {
        let x32 = Architecture::parse("x32")?;
        let any_amd64 = Architecture::parse("any-amd64")?;

        assert!(x32.is(&any_amd64));
        assert!(any_amd64.is(&x32));

        Ok(())
    }

    #[test]
    fn compare_basics() -> Result<()> {
        let arch = Architecture::parse("amd64")?;

        for s in ["base-gnu-linux-amd64", "linux-any", "any", "base-gnu-linux-any"] {
            let other = Architecture::parse(s)?;
            assert!(arch.is(&other), "{}", s);
            assert!(other.is(&arch), "{}", s);
        }

        for s in [
            "all",
            "i386",
            "base-gnuu-linux-amd64",
            "base-gnu-linuxx-amd64",
            "base-gnu-linux-amd644",
            "kfreebsd-any",
        ] {
            let other = Architecture::parse(s)?;
            assert!(!arch.is(&other), "{}", s);
            assert!(!other.is(&arch), "{}", s);
        }

        Ok(())
    }

    #[test]
    fn compare_wildcards() -> Result<()> {
        let all = Architecture::all();
        let any = Architecture::any();

        assert!(!all.is(&any));
        assert!(!any.is(&all));
        assert!(all.is(&all));
        assert!(!all.is_wildcard());
        assert!(any.is_wildcard());

        // Wildcards never match each other, not even themselves.
        assert!(!any.is(&any));
        assert!(!any.is(&Architecture::parse("linux-any")?));

        Ok(())
    }

    #[test]
    fn architecture_list() -> Result<()> {
        let arches = parse_architecture_list("amd64  arm64\ni386 ")?;
        assert_eq!(arches.len(), 3);
        assert_eq!(arches[2].cpu(), "i386");
        assert!(parse_architecture_list("")?.is_empty());
        assert!(parse_architecture_list("amd64 -i386").is_err());

        Ok(())
    }

    #[test]
    fn set_matches() -> Result<()> {
        let amd64 = Architecture::parse("amd64")?;
        let armhf = Architecture::parse("armhf")?;

        let empty = ArchitectureSet::default();
        assert!(empty.matches(&amd64));
        assert!(empty.matches(&Architecture::all()));

        let only_amd64 = ArchitectureSet::new(vec![amd64.clone()], false);
        assert!(only_amd64.matches(&amd64));
        assert!(!only_amd64.matches(&armhf));

        let not_sparc = ArchitectureSet::new(vec![Architecture::parse("sparc")?], true);
        assert!(not_sparc.matches(&amd64));
        assert!(not_sparc.matches(&armhf));

        let linux = ArchitectureSet::new(vec![Architecture::parse("linux-any")?], false);
        assert!(linux.matches(&amd64));
        assert!(!linux.matches(&Architecture::parse("kfreebsd-amd64")?));

        assert_eq!(not_sparc.to_string(), "[!sparc]");
        assert_eq!(
            ArchitectureSet::new(vec![amd64, armhf], false).to_string(),
            "[amd64 armhf]"
        );

        Ok(())
    }
}
