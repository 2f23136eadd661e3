//! Release tag calculation

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// A `MAJOR.MINOR.PATCH[-RC<n>]` tag; `rc == 0` is a final release
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionTag {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub rc: u64,
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.rc > 0 {
            write!(f, "-RC{}", self.rc)?;
        }
        Ok(())
    }
}

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-RC(\d+))?$").expect("tag regex is valid")
});

/// Parse a tag. Absent or malformed input yields the zero tag.
pub fn parse_version(tag: Option<&str>) -> VersionTag {
    let Some(tag) = tag else {
        return VersionTag::default();
    };
    let Some(caps) = TAG_PATTERN.captures(tag.trim()) else {
        return VersionTag::default();
    };

    let field = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    match (field(1), field(2), field(3), field(4)) {
        (Some(major), Some(minor), Some(patch), Some(rc)) => VersionTag {
            major,
            minor,
            patch,
            rc,
        },
        _ => VersionTag::default(),
    }
}

/// Compute the next release-candidate tag from the production and staging tags.
///
/// Staging counts as ahead when any of major, minor or patch is greater than
/// production's, each checked on its own. This keeps the legacy release
/// behavior; it is neither a first-differing-field nor a full semver
/// comparison. Ahead: bump staging's RC counter. Otherwise: bump
/// production's patch and start at `RC1`. Counters saturate at `u64::MAX`.
pub fn calculate_next_tag(prod_tag: Option<&str>, preprod_tag: Option<&str>) -> String {
    let prod = parse_version(prod_tag);
    let preprod = parse_version(preprod_tag);

    let ahead = preprod.major > prod.major
        || preprod.minor > prod.minor
        || preprod.patch > prod.patch;

    let next = if ahead {
        VersionTag {
            rc: preprod.rc.saturating_add(1),
            ..preprod
        }
    } else {
        VersionTag {
            patch: prod.patch.saturating_add(1),
            rc: 1,
            ..prod
        }
    };
    next.to_string()
}
