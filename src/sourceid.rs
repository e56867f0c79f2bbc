//! `SourceID` — the canonical channel identifier (spec.md §3).
//!
//! Treated as an opaque key outside of equality and substring/glob
//! matching, per spec.md's explicit instruction. The dotted
//! `NET.STA.LOC.CHAN` rendering matches the original implementation and
//! spec.md §8's scenario notation (`NET.STA..BHZ`).

use std::fmt;

/// Network/station/location/channel identity of a seismic channel.
/// Does *not* carry the publication version — that lives alongside it on
/// `TraceId`/`Record`, since spec.md models `TraceID` as `(SourceID,
/// publication-version)`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SourceId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl SourceId {
    #[must_use]
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        location: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            location: location.into(),
            channel: channel.into(),
        }
    }

    /// Parses `NET.STA.LOC.CHAN`, where `LOC` may be empty (blank location,
    /// e.g. `NET.STA..CHAN`) or the literal `--` used in selection files
    /// to mean "blank location" (spec.md §6 selection-file grammar).
    pub fn parse(text: &str) -> crate::Result<Self> {
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 4 {
            return Err(crate::Error::Config(format!(
                "source id {text:?} must have exactly 4 dot-separated fields"
            )));
        }
        let location = if parts[2] == "--" { "" } else { parts[2] };
        Ok(Self::new(parts[0], parts[1], location, parts[3]))
    }

    /// Whether `ignoring pubversion`, this id and `other` share the same
    /// NSLC identity (used by the Record Writer's regroup pass, spec.md
    /// §4.6, which groups "consecutive `TraceID`s that share SourceID
    /// (ignoring pub-version)").
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        self == other
    }

    /// Tests `pattern` against this id's dotted rendering. `pattern` may
    /// contain `*` (any run of characters) and `?` (any single character),
    /// the only wildcard syntax spec.md's `-m`/selection-file matching
    /// needs (full regex is reserved for legacy `-M`/`-R`, compiled
    /// upstream of this core).
    #[must_use]
    pub fn matches_glob(&self, pattern: &str) -> bool {
        crate::glob::glob_match(pattern, &self.to_string())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}
