//! Core artifact naming and ordering.
//!
//! Layout: `core.<YYYY>-<MM>-<DD>_<unix-seconds>.<nanos:9>.<tag>[.<n>]`
//!
//! The `(unix-seconds, nanos)` pair is the ordering key. Names that belong to
//! the namespace but carry no stamp (`core.1234`, `core.0001`) order before
//! every stamped name, among themselves by natural order.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};

/// Prefix shared by every entry of the core namespace.
pub const CORE_PREFIX: &str = "core.";

/// Prefix of in-progress staging files. Never part of the core namespace.
pub const PARTIAL_PREFIX: &str = ".core-partial.";

const MAX_TAG_CHARS: usize = 128;
const UNKNOWN_TAG: &str = "unknown";

/// Whether `name` is part of the core namespace.
pub fn is_core_name(name: &str) -> bool {
    name.starts_with(CORE_PREFIX)
}

/// Make an executable name safe to embed in a file name.
///
/// Path separators, NUL and control characters become `_`. An empty tag
/// becomes `unknown`.
pub fn sanitize_tag(executable: &str) -> String {
    let tag: String = executable
        .chars()
        .take(MAX_TAG_CHARS)
        .map(|c| if c == '/' || c.is_control() { '_' } else { c })
        .collect();
    if tag.is_empty() {
        UNKNOWN_TAG.to_string()
    } else {
        tag
    }
}

/// File name of a captured core dump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoreName(String);

impl CoreName {
    /// Name for a dump of `executable` captured at `at`.
    pub fn generate(at: DateTime<Utc>, executable: &str) -> Self {
        // Leap seconds report nanos >= 1e9; keep the field nine digits wide.
        let nanos = at.timestamp_subsec_nanos().min(999_999_999);
        Self(format!(
            "{CORE_PREFIX}{}_{}.{nanos:09}.{}",
            at.format("%Y-%m-%d"),
            at.timestamp(),
            sanitize_tag(executable),
        ))
    }

    /// Wrap an existing directory entry name if it belongs to the namespace.
    pub fn parse(name: &str) -> Option<Self> {
        is_core_name(name).then(|| Self(name.to_string()))
    }

    /// The same name with a collision counter appended. `0` is the name itself.
    pub fn with_collision_suffix(&self, attempt: u32) -> Self {
        if attempt == 0 {
            self.clone()
        } else {
            Self(format!("{}.{attempt}", self.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Capture stamp embedded in the name, if any.
    pub fn stamp(&self) -> Option<(i64, u32)> {
        parse_stamp(&self.0)
    }

    pub fn order_key(&self) -> OrderKey {
        match self.stamp() {
            Some((secs, nanos)) => OrderKey::Stamped { secs, nanos },
            None => OrderKey::Unstamped(self.0.clone()),
        }
    }
}

impl fmt::Display for CoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CoreName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract `(unix-seconds, nanos)` from a stamped name.
///
/// Accepts the current layout and the older
/// `core.<Y>-<m>-<d>_<unix-seconds>.<tag>` layout, which yields `nanos = 0`.
fn parse_stamp(name: &str) -> Option<(i64, u32)> {
    let rest = name.strip_prefix(CORE_PREFIX)?;
    let (date, rest) = rest.split_once('_')?;
    if date.is_empty() || !date.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        return None;
    }

    let (secs, rest) = rest.split_once('.').unwrap_or((rest, ""));
    if !is_all_digits(secs) {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;

    let nanos = match rest.split_once('.') {
        Some((frac, _tag)) if frac.len() == 9 && is_all_digits(frac) => frac.parse().ok()?,
        _ => 0,
    };
    Some((secs, nanos))
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Age ordering of namespace entries, oldest first.
#[derive(Debug, Clone)]
pub enum OrderKey {
    /// No parseable stamp; ordered by [`natural_cmp`] of the full name.
    Unstamped(String),
    Stamped { secs: i64, nanos: u32 },
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Unstamped(a), Self::Unstamped(b)) => natural_cmp(a, b),
            (Self::Unstamped(_), Self::Stamped { .. }) => Ordering::Less,
            (Self::Stamped { .. }, Self::Unstamped(_)) => Ordering::Greater,
            (
                Self::Stamped { secs: a, nanos: a_nanos },
                Self::Stamped { secs: b, nanos: b_nanos },
            ) => (a, a_nanos).cmp(&(b, b_nanos)),
        }
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderKey {}

/// Compare strings treating runs of ASCII digits as numbers, so `core.9`
/// sorts before `core.10` and `core.0002` equals `core.2`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chunks = Chunks(a);
    let mut b_chunks = Chunks(b);
    loop {
        match (a_chunks.next(), b_chunks.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunk(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_chunk(x: &str, y: &str) -> Ordering {
    if is_all_digits(x) && is_all_digits(y) {
        let x = x.trim_start_matches('0');
        let y = y.trim_start_matches('0');
        x.len().cmp(&y.len()).then_with(|| x.cmp(y))
    } else {
        x.cmp(y)
    }
}

/// Maximal runs of digits / non-digits.
struct Chunks<'a>(&'a str);

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.0.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = self
            .0
            .find(|c: char| c.is_ascii_digit() != digit)
            .unwrap_or(self.0.len());
        let (chunk, rest) = self.0.split_at(end);
        self.0 = rest;
        Some(chunk)
    }
}
