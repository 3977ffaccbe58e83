// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling.

[PackageVersion] parses, renders, and orders version strings of the form
`[epoch:]upstream_version[-debian_revision]`.

Two orderings are exposed. [PackageVersion::compare_precedence()] is the
ordering defined by the Debian Policy Manual and used by `dpkg`. Under it,
textually distinct versions may be equivalent (`1.01` and `1.1`, or `1.0`
and `1.0-0`). The [Ord] implementation refines that ordering with a
structural tiebreak so it agrees with [Eq].

[PackageVersion::comparable_string()] encodes a version into a string whose
plain byte ordering is identical to [Ord]. This allows versions to be sorted
or indexed by stores that only know how to compare bytes. The encoding is
invertible via [PackageVersion::from_comparable_string()].
*/

use {
    serde::{de, Deserialize, Deserializer, Serialize, Serializer},
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        str::FromStr,
    },
    thiserror::Error,
};

/// Maximum number of digits in the epoch component.
pub const MAX_EPOCH_DIGITS: usize = 8;

/// Maximum number of consecutive digits in `upstream_version` or `debian_revision`.
///
/// Digit run lengths are encoded as a single character in comparable strings.
pub const MAX_DIGIT_RUN: usize = 25;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,

    #[error("version string contains whitespace: {0:?}")]
    EmbeddedWhitespace(String),

    #[error("the epoch component is not a number of at most 8 digits: {0}")]
    BadEpoch(String),

    #[error("{0} component is empty: {1}")]
    EmptyComponent(&'static str, String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),

    #[error("version has a run of more than 25 digits: {0}")]
    OversizedDigitRun(String),

    #[error("upstream_version does not start with a digit: {0}")]
    UpstreamNotDigitLeading(String),

    #[error("malformed comparable version string: {0:?}")]
    MalformedComparableString(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

// Bytes used by the comparable string encoding. Within a non-digit run the
// order is: tilde, end of component, end of run, letters, other punctuation.
const KEY_TILDE: u8 = 0x01;
const KEY_COMPONENT_END: u8 = 0x02;
const KEY_RUN_END: u8 = 0x03;
// Count bytes share their range with letters. They are only ever compared
// against other count bytes since a digit run always follows `KEY_RUN_END`.
const KEY_COUNT_BASE: u8 = b'A';

/// Punctuation permitted outside of tildes, in policy order, with its encoded byte.
const KEY_PUNCTUATION: [(char, u8); 4] = [('+', 0x7b), ('-', 0x7c), ('.', 0x7d), (':', 0x7e)];

/// A Debian package version.
///
/// Debian package versions consist of multiple sub-components and have rules about
/// sorting. The semantics are defined at
/// <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>. This type
/// attempts to implement all the details.
///
/// The concise version is the format is `[epoch:]upstream_version[-debian_revision]`
/// and each component has rules about what characters are allowed.
///
/// Instances are immutable once parsed.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PackageVersion {
    epoch: u32,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    ///
    /// Surrounding whitespace is ignored. Parsing is permissive in the same way
    /// `dpkg` is for foreign repositories: the upstream version may start with any
    /// permitted character. Use [Self::parse_strict()] to also require a leading digit.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() {
            return Err(VersionError::Empty);
        }
        if s.chars().any(|c| c.is_whitespace()) {
            return Err(VersionError::EmbeddedWhitespace(s.to_string()));
        }

        // Epoch is the part before the first colon, if present.
        // upstream_version and debian_revision are discovered by splitting on last hyphen.
        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, remainder)) => (Some(epoch), remainder),
            None => (None, s),
        };

        let epoch = if let Some(epoch) = epoch {
            if epoch.is_empty()
                || epoch.len() > MAX_EPOCH_DIGITS
                || !epoch.chars().all(|c| c.is_ascii_digit())
            {
                return Err(VersionError::BadEpoch(s.to_string()));
            }

            u32::from_str(epoch).map_err(|_| VersionError::BadEpoch(s.to_string()))?
        } else {
            0
        };

        let (upstream, debian) = match remainder.rsplit_once('-') {
            Some((upstream, debian)) => (upstream, Some(debian)),
            None => (remainder, None),
        };

        if upstream.is_empty() {
            return Err(VersionError::EmptyComponent(
                "upstream_version",
                s.to_string(),
            ));
        }

        // The upstream_version must contain only alphanumerics and the characters
        // . + - : ~ (full stop, plus, hyphen, colon, tilde). Hyphens can only be present
        // if there is a debian_revision, which the split above guarantees.
        if !upstream
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | ':' | '~'))
        {
            return Err(VersionError::UpstreamVersionIllegalChar(s.to_string()));
        }

        if let Some(debian) = debian {
            if debian.is_empty() {
                return Err(VersionError::EmptyComponent(
                    "debian_revision",
                    s.to_string(),
                ));
            }

            // It must contain only alphanumerics and the characters + . ~ (plus, full stop, tilde)
            if !debian
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '~'))
            {
                return Err(VersionError::DebianRevisionIllegalChar(s.to_string()));
            }
        }

        if longest_digit_run(upstream) > MAX_DIGIT_RUN
            || debian.map(longest_digit_run).unwrap_or(0) > MAX_DIGIT_RUN
        {
            return Err(VersionError::OversizedDigitRun(s.to_string()));
        }

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision: debian.map(|x| x.to_string()),
        })
    }

    /// Parse a version string enforcing that the upstream version starts with a digit.
    ///
    /// The policy manual says upstream versions *should* start with a digit. Many
    /// in-the-wild versions don't, which is why [Self::parse()] doesn't enforce it.
    pub fn parse_strict(s: &str) -> Result<Self> {
        let v = Self::parse(s)?;

        if !v.upstream_version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(VersionError::UpstreamNotDigitLeading(s.trim().to_string()));
        }

        Ok(v)
    }

    /// The `epoch` component of the version string.
    ///
    /// `0` if not present.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// `upstream` component of the version string.
    ///
    /// This is the main part of the version number.
    ///
    /// It is typically the original version of the software from which this package came. Although
    /// it may be massaged to be compatible with packaging requirements.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// `debian_revision` component of the version string.
    ///
    /// The part of the version string that specifies the version of the Debian package based on
    /// the upstream version.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }

    /// Whether this is a native version, which lacks a `debian_revision`.
    pub fn is_native(&self) -> bool {
        self.debian_revision.is_none()
    }

    /// Compare against another version using Debian policy precedence.
    ///
    /// Epochs are compared numerically. Then the upstream and debian components are
    /// compared using the policy algorithm. A missing debian revision compares like `0`.
    ///
    /// This can return [Ordering::Equal] for versions that are not equal according
    /// to [Eq]. Use this when evaluating version constraints.
    pub fn compare_precedence(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_component(&self.upstream_version, &other.upstream_version))
            .then_with(|| {
                compare_component(
                    self.debian_revision.as_deref().unwrap_or(""),
                    other.debian_revision.as_deref().unwrap_or(""),
                )
            })
    }

    /// Obtain a string whose byte ordering matches the [Ord] ordering of versions.
    ///
    /// The string is made of printable ASCII plus a few low control characters.
    pub fn comparable_string(&self) -> String {
        let mut key = String::new();

        push_digit_run(&mut key, &self.epoch.to_string());
        key.push(KEY_COMPONENT_END as char);
        push_precedence_component(&mut key, &self.upstream_version);
        push_precedence_component(&mut key, self.revision_or_empty());
        key.push_str(&self.structure_key());

        key
    }

    /// Reconstruct a version from the output of [Self::comparable_string()].
    pub fn from_comparable_string(s: &str) -> Result<Self> {
        let malformed = || VersionError::MalformedComparableString(s.to_string());

        let mut decoder = KeyDecoder {
            data: s.as_bytes(),
            offset: 0,
        };

        let epoch_digits = decoder.digit_run().ok_or_else(malformed)?;
        if epoch_digits.len() > MAX_EPOCH_DIGITS || decoder.next() != Some(KEY_COMPONENT_END) {
            return Err(malformed());
        }
        let epoch = if epoch_digits.is_empty() {
            0
        } else {
            u32::from_str(&epoch_digits).map_err(|_| malformed())?
        };

        let upstream_runs = decoder.precedence_component().ok_or_else(malformed)?;
        let revision_runs = decoder.precedence_component().ok_or_else(malformed)?;
        let upstream_zeros = decoder.zero_padding().ok_or_else(malformed)?;
        let has_revision = match decoder.next() {
            Some(b) if b == KEY_COUNT_BASE => false,
            Some(b) if b == KEY_COUNT_BASE + 1 => true,
            _ => return Err(malformed()),
        };
        let revision_zeros = decoder.zero_padding().ok_or_else(malformed)?;

        if decoder.next().is_some() {
            return Err(malformed());
        }

        let upstream_version = assemble_component(upstream_runs, upstream_zeros).ok_or_else(malformed)?;
        let revision = assemble_component(revision_runs, revision_zeros).ok_or_else(malformed)?;

        let debian_revision = if has_revision {
            Some(revision)
        } else if revision.is_empty() {
            None
        } else {
            return Err(malformed());
        };

        let v = Self {
            epoch,
            upstream_version,
            debian_revision,
        };

        // Round trip through the parser so only parseable versions are produced.
        // Non-canonical encodings of a valid version are rejected too.
        match Self::parse(&v.to_string()) {
            Ok(parsed) if parsed == v && parsed.comparable_string() == s => Ok(v),
            _ => Err(malformed()),
        }
    }

    fn revision_or_empty(&self) -> &str {
        self.debian_revision.as_deref().unwrap_or("")
    }

    /// Encodes what policy precedence ignores: zero padding of numbers and revision presence.
    fn structure_key(&self) -> String {
        let mut key = String::new();

        push_zero_padding(&mut key, &self.upstream_version);
        key.push((KEY_COUNT_BASE + u8::from(self.debian_revision.is_some())) as char);
        push_zero_padding(&mut key, self.revision_or_empty());

        key
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // [epoch:]upstream_version[-debian_revision]
        // A colon in upstream_version requires an explicit epoch to parse back.
        if self.epoch != 0 || self.upstream_version.contains(':') {
            write!(f, "{}:", self.epoch)?;
        }

        f.write_str(&self.upstream_version)?;

        if let Some(revision) = &self.debian_revision {
            write!(f, "-{}", revision)?;
        }

        Ok(())
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialOrd<Self> for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_precedence(other)
            .then_with(|| self.structure_key().cmp(&other.structure_key()))
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;

        Self::parse(&s).map_err(de::Error::custom)
    }
}

fn longest_digit_run(s: &str) -> usize {
    s.split(|c: char| !c.is_ascii_digit())
        .map(|run| run.len())
        .max()
        .unwrap_or(0)
}

/// Split a string on the first digit character.
///
/// Returns the leading component with non-digits and everything else afterwards.
/// Either value can be an empty string.
fn split_first_digit(s: &str) -> (&str, &str) {
    s.split_at(s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len()))
}

/// Split a string on the first non-digit character.
fn split_first_nondigit(s: &str) -> (&str, &str) {
    s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()))
}

/// Split a version component into alternating (non-digit, digit) runs.
///
/// Only the first non-digit run can be empty. Only the last digit run can be empty.
fn runs(s: &str) -> Vec<(&str, &str)> {
    let mut res = vec![];
    let mut remaining = s;

    while !remaining.is_empty() {
        let (nondigit, rest) = split_first_digit(remaining);
        let (digits, rest) = split_first_nondigit(rest);
        res.push((nondigit, digits));
        remaining = rest;
    }

    res
}

/// Weight of a character in a non-digit run. [None] is the end of the run.
fn char_order(c: Option<char>) -> i32 {
    match c {
        None => 0,
        Some('~') => -1,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

fn lexical_compare(a: &str, b: &str) -> Ordering {
    // The lexical comparison is a comparison of ASCII values modified so that all the letters sort
    // earlier than all the non-letters and so that a tilde sorts before anything, even the end of a
    // part.
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();

    loop {
        match (a_chars.next(), b_chars.next()) {
            (None, None) => return Ordering::Equal,
            (a_char, b_char) => match char_order(a_char).cmp(&char_order(b_char)) {
                Ordering::Equal => {}
                res => return res,
            },
        }
    }
}

fn strip_leading_zeros(digits: &str) -> &str {
    digits.trim_start_matches('0')
}

/// Compare two runs of digits numerically. An empty run counts as zero.
fn numeric_compare(a: &str, b: &str) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);

    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare a version component string using Debian rules.
fn compare_component(a: &str, b: &str) -> Ordering {
    // The comparison consists of iterations of a 2 step process until both inputs are exhausted.
    //
    // Step 1: Initial part of each string consisting of non-digit characters is compared using
    // a custom lexical sort.
    //
    // Step 2: Initial part of remaining string consisting of digit characters is compared using
    // numerical sort.
    //
    // An exhausted input behaves as an empty non-digit run followed by the number zero.
    let a_runs = runs(a);
    let b_runs = runs(b);

    for pos in 0..std::cmp::max(a_runs.len(), b_runs.len()) {
        let (a_nondigit, a_digits) = a_runs.get(pos).copied().unwrap_or(("", ""));
        let (b_nondigit, b_digits) = b_runs.get(pos).copied().unwrap_or(("", ""));

        match lexical_compare(a_nondigit, b_nondigit) {
            Ordering::Equal => {}
            res => return res,
        }

        match numeric_compare(a_digits, b_digits) {
            Ordering::Equal => {}
            res => return res,
        }
    }

    Ordering::Equal
}

fn encode_char(c: char) -> char {
    match c {
        '~' => KEY_TILDE as char,
        c => KEY_PUNCTUATION
            .iter()
            .find(|(p, _)| *p == c)
            .map(|(_, b)| *b as char)
            .unwrap_or(c),
    }
}

fn decode_char(b: u8) -> Option<char> {
    match b {
        KEY_TILDE => Some('~'),
        b if b.is_ascii_alphabetic() => Some(b as char),
        b => KEY_PUNCTUATION
            .iter()
            .find(|(_, p)| *p == b)
            .map(|(c, _)| *c),
    }
}

/// Append a length-prefixed digit run with leading zeros removed.
fn push_digit_run(key: &mut String, digits: &str) {
    let significant = strip_leading_zeros(digits);

    key.push((KEY_COUNT_BASE + significant.len() as u8) as char);
    key.push_str(significant);
}

/// Append the precedence-relevant encoding of a version component.
///
/// The first pair of runs is always written, even for an empty component. An
/// exhausted component compares like an empty non-digit run followed by zero, so
/// `""`, `"0"` and the leading `0` of `"0~"` must all encode that same pair.
fn push_precedence_component(key: &mut String, s: &str) {
    let mut runs = runs(s);
    if runs.is_empty() {
        runs.push(("", ""));
    }

    for (nondigit, digits) in runs {
        key.extend(nondigit.chars().map(encode_char));
        key.push(KEY_RUN_END as char);
        push_digit_run(key, digits);
    }

    key.push(KEY_COMPONENT_END as char);
}

/// Append the leading zero count of every digit run of a version component.
fn push_zero_padding(key: &mut String, s: &str) {
    for (_, digits) in runs(s) {
        let zeros = digits.len() - strip_leading_zeros(digits).len();
        key.push((KEY_COUNT_BASE + zeros as u8) as char);
    }

    key.push(KEY_COMPONENT_END as char);
}

/// Rebuild a component from its decoded runs and leading zero counts.
fn assemble_component(runs: Vec<(String, String)>, zeros: Vec<usize>) -> Option<String> {
    // An empty component has a single empty pair and no padding entries.
    if zeros.is_empty() {
        return match runs.as_slice() {
            [(nondigit, digits)] if nondigit.is_empty() && digits.is_empty() => Some(String::new()),
            _ => None,
        };
    }

    if runs.len() != zeros.len() {
        return None;
    }

    Some(
        runs.into_iter()
            .zip(zeros)
            .map(|((nondigit, digits), zeros)| format!("{}{}{}", nondigit, "0".repeat(zeros), digits))
            .collect(),
    )
}

struct KeyDecoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> KeyDecoder<'a> {
    fn next(&mut self) -> Option<u8> {
        let b = self.data.get(self.offset).copied();
        if b.is_some() {
            self.offset += 1;
        }
        b
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    fn digit_run(&mut self) -> Option<String> {
        let count = self.next()?.checked_sub(KEY_COUNT_BASE)? as usize;
        if count > MAX_DIGIT_RUN {
            return None;
        }

        let digits = self.data.get(self.offset..self.offset + count)?;
        self.offset += count;

        if digits.first() == Some(&b'0') || !digits.iter().all(|b| b.is_ascii_digit()) {
            return None;
        }

        Some(digits.iter().map(|b| *b as char).collect())
    }

    fn precedence_component(&mut self) -> Option<Vec<(String, String)>> {
        let mut runs = vec![];

        loop {
            let mut nondigit = String::new();
            loop {
                match self.next()? {
                    KEY_RUN_END => break,
                    b => nondigit.push(decode_char(b)?),
                }
            }

            // Only the first non-digit run can be empty.
            if nondigit.is_empty() && !runs.is_empty() {
                return None;
            }

            let digits = self.digit_run()?;
            runs.push((nondigit, digits));

            if self.peek()? == KEY_COMPONENT_END {
                self.offset += 1;
                return Some(runs);
            }
        }
    }

    fn zero_padding(&mut self) -> Option<Vec<usize>> {
        let mut zeros = vec![];

        loop {
            match self.next()? {
                KEY_COMPONENT_END => return Some(zeros),
                b => zeros.push(b.checked_sub(KEY_COUNT_BASE)? as usize),
            }
        }
    }
}
