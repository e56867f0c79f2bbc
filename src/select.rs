//! Selection Filter (spec.md §4.3).

use crate::config::Config;
use crate::sourceid::SourceId;
use crate::time::Nstime;

/// One line of a selections file: `NET STA LOC CHAN [QUAL] [START] [END]`
/// (spec.md §6 grammar).
#[derive(Clone, Debug)]
pub struct SelectionEntry {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub quality: Option<u8>,
    pub start: Option<Nstime>,
    pub end: Option<Nstime>,
}

impl SelectionEntry {
    #[must_use]
    pub fn matches_source(&self, id: &SourceId) -> bool {
        field_matches(&self.network, &id.network)
            && field_matches(&self.station, &id.station)
            && field_matches(&self.location, &id.location)
            && field_matches(&self.channel, &id.channel)
    }

    #[must_use]
    pub fn overlaps(&self, start: Nstime, end: Nstime) -> bool {
        let after_start = self.start.map_or(true, |s| end >= s);
        let before_end = self.end.map_or(true, |e| start <= e);
        after_start && before_end
    }
}

fn field_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" || pattern.is_empty() {
        return true;
    }
    crate::glob::glob_match(pattern, value)
}

/// Parses one selections-file line. Returns `Ok(None)` for blank/comment
/// lines and lines missing NSLC (skipped with a warning upstream, per
/// spec.md §6).
pub fn parse_selection_line(line: &str) -> crate::Result<Option<SelectionEntry>> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Ok(None);
    }

    let location = if fields[2] == "--" { "" } else { fields[2] };

    let quality = fields.get(4).and_then(|q| {
        if q.len() == 1 && q.chars().next().unwrap().is_ascii_alphabetic() {
            Some(q.as_bytes()[0])
        } else {
            None
        }
    });

    let time_fields: Vec<&str> = fields[if quality.is_some() { 5 } else { 4 }..].to_vec();
    let start = time_fields.first().map(|s| parse_scenario_time(s)).transpose()?;
    let end = time_fields.get(1).map(|s| parse_scenario_time(s)).transpose()?;

    Ok(Some(SelectionEntry {
        network: fields[0].to_string(),
        station: fields[1].to_string(),
        location: location.to_string(),
        channel: fields[3].to_string(),
        quality,
        start,
        end,
    }))
}

/// Parses `YYYY-DDD,HH:MM:SS[.fffffffff]`, spec.md §8's scenario notation
/// and the format `-ts`/`-te` and selection files share.
pub fn parse_scenario_time(text: &str) -> crate::Result<Nstime> {
    let time_part = text.split_once(',').map(|(_, t)| t);
    let (year_str, doy_str) = date_part_split(text)?;
    let year: i32 = year_str
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad year in time {text:?}")))?;
    let doy: u32 = doy_str
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad day-of-year in time {text:?}")))?;

    let (hour, minute, second, nanos) = match time_part {
        None => (0, 0, 0, 0),
        Some(t) => parse_time_of_day(t)?,
    };

    Nstime::from_calendar(year, doy, hour, minute, second, nanos)
}

fn date_part_split(text: &str) -> crate::Result<(&str, &str)> {
    let date = text.split(',').next().unwrap_or(text);
    date.split_once('-')
        .ok_or_else(|| crate::Error::Config(format!("expected YYYY-DDD in time {text:?}")))
}

fn parse_time_of_day(t: &str) -> crate::Result<(u32, u32, u32, u32)> {
    let mut parts = t.splitn(3, ':');
    let hour: u32 = parts
        .next()
        .unwrap_or("0")
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad hour in time {t:?}")))?;
    let minute: u32 = parts
        .next()
        .unwrap_or("0")
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad minute in time {t:?}")))?;
    let sec_field = parts.next().unwrap_or("0");
    let (sec_str, frac_str) = sec_field.split_once('.').unwrap_or((sec_field, ""));
    let second: u32 = sec_str
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad second in time {t:?}")))?;
    let nanos: u32 = if frac_str.is_empty() {
        0
    } else {
        let mut digits = frac_str.to_string();
        digits.truncate(9);
        while digits.len() < 9 {
            digits.push('0');
        }
        digits
            .parse()
            .map_err(|_| crate::Error::Config(format!("bad fractional seconds in time {t:?}")))?
    };
    Ok((hour, minute, second, nanos))
}

#[derive(Clone, Debug, Default)]
pub struct Selections {
    pub entries: Vec<SelectionEntry>,
}

impl Selections {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parse(text: &str) -> crate::Result<Self> {
        let mut entries = Vec::new();
        for line in text.lines() {
            if let Some(entry) = parse_selection_line(line)? {
                entries.push(entry);
            }
        }
        Ok(Self { entries })
    }
}

/// Outcome of applying the Selection Filter to one candidate record.
#[derive(Debug)]
pub enum Decision {
    Reject,
    /// Admitted, with an optional effective selection-window intersection
    /// (`SelectBound`) to record on the `Record`.
    Admit(Option<(Nstime, Nstime)>),
}

/// Legacy `-M`/`-R` regex match/reject (spec.md §6), evaluated against the
/// dotted `NET.STA.LOC.CHAN` rendering of `source_id`. Without the `cli`
/// feature there's no `regex` dependency to compile against, so both
/// flags are unreachable (the CLI is the only place that sets them) and
/// this is just `true`.
#[cfg(feature = "cli")]
fn match_regex_ok(config: &Config, source_id: &SourceId) -> bool {
    let text = source_id.to_string();
    if let Some(pat) = &config.match_regex {
        match regex::Regex::new(pat) {
            Ok(re) => {
                if !re.is_match(&text) {
                    return false;
                }
            }
            Err(err) => {
                log::warn!("invalid match regex {pat:?}: {err}");
                return false;
            }
        }
    }
    if let Some(pat) = &config.reject_regex {
        match regex::Regex::new(pat) {
            Ok(re) => {
                if re.is_match(&text) {
                    return false;
                }
            }
            Err(err) => {
                log::warn!("invalid reject regex {pat:?}: {err}");
                return false;
            }
        }
    }
    true
}

#[cfg(not(feature = "cli"))]
fn match_regex_ok(_config: &Config, _source_id: &SourceId) -> bool {
    true
}

/// Applies the global time window, match/reject patterns and the
/// selections list (if any) to one candidate record.
#[must_use]
pub fn apply(config: &Config, source_id: &SourceId, start: Nstime, end: Nstime) -> Decision {
    if let Some(gs) = config.global_start {
        if end < gs {
            return Decision::Reject;
        }
    }
    if let Some(ge) = config.global_end {
        if start > ge {
            return Decision::Reject;
        }
    }
    if let Some(pat) = &config.match_pattern {
        if !source_id.matches_glob(pat) {
            return Decision::Reject;
        }
    }
    if !match_regex_ok(config, source_id) {
        return Decision::Reject;
    }

    if config.selections.is_empty() {
        return Decision::Admit(None);
    }

    let mut bound: Option<(Nstime, Nstime)> = None;
    let mut matched_any = false;
    let mut disjoint = false;

    for entry in &config.selections.entries {
        if !entry.matches_source(source_id) || !entry.overlaps(start, end) {
            continue;
        }
        matched_any = true;
        let window_start = entry.start.unwrap_or(start).max(start);
        let window_end = entry.end.unwrap_or(end).min(end);

        bound = match bound {
            None => Some((window_start, window_end)),
            Some((bs, be)) => {
                let new_start = bs.max(window_start);
                let new_end = be.min(window_end);
                if new_start > new_end {
                    disjoint = true;
                    None
                } else {
                    Some((new_start, new_end))
                }
            }
        };
    }

    if !matched_any {
        return Decision::Reject;
    }
    if disjoint {
        // SPEC_FULL.md §9 open question: conflicting disjoint selections
        // against one record clear the SelectBound and skip pruning for
        // it, logging a warning upstream (caller's responsibility).
        return Decision::Admit(None);
    }

    let bound = bound.filter(|(s, e)| *s > start || *e < end);
    Decision::Admit(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn t(n: i64) -> Nstime {
        Nstime::from_nanos(n)
    }

    fn sid(chan: &str) -> SourceId {
        SourceId::new("NET", "STA", "", chan)
    }

    #[test]
    fn parses_scenario_time_with_fraction() -> crate::Result<()> {
        let t = parse_scenario_time("2020-100,00:00:03.5")?;
        let (y, doy, h, m, s, n) = t.to_calendar();
        assert_eq!((y, doy, h, m, s, n), (2020, 100, 0, 0, 3, 500_000_000));
        Ok(())
    }

    #[test]
    fn parses_scenario_time_without_fraction() -> crate::Result<()> {
        let t = parse_scenario_time("2020-100,00:00:10")?;
        let (_, _, _, _, s, n) = t.to_calendar();
        assert_eq!((s, n), (10, 0));
        Ok(())
    }

    #[test]
    fn parses_selection_line_with_blank_location() -> crate::Result<()> {
        let entry = parse_selection_line("NET STA -- BHZ").unwrap().unwrap();
        assert_eq!(entry.location, "");
        Ok(())
    }

    #[test]
    fn skips_comment_and_blank_lines() -> crate::Result<()> {
        assert!(parse_selection_line("# a comment").unwrap().is_none());
        assert!(parse_selection_line("   ").unwrap().is_none());
        Ok(())
    }

    #[test]
    fn skips_lines_missing_nslc() -> crate::Result<()> {
        assert!(parse_selection_line("NET STA BHZ").unwrap().is_none());
        Ok(())
    }

    #[test]
    fn global_window_rejects_fully_before_start() {
        let mut cfg = Config::default();
        cfg.global_start = Some(t(1000));
        match apply(&cfg, &sid("BHZ"), t(0), t(999)) {
            Decision::Reject => {}
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn match_pattern_filters_source_id() {
        let mut cfg = Config::default();
        cfg.match_pattern = Some("*BHE*".into());
        match apply(&cfg, &sid("BHZ"), t(0), t(100)) {
            Decision::Reject => {}
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[cfg(feature = "cli")]
    #[test]
    fn match_regex_admits_matching_channel() {
        let mut cfg = Config::default();
        cfg.match_regex = Some(r"\.BH[ZNE]$".into());
        match apply(&cfg, &sid("BHZ"), t(0), t(100)) {
            Decision::Admit(_) => {}
            other => panic!("expected admit, got {other:?}"),
        }
    }

    #[cfg(feature = "cli")]
    #[test]
    fn reject_regex_rejects_matching_channel() {
        let mut cfg = Config::default();
        cfg.reject_regex = Some(r"\.BHZ$".into());
        match apply(&cfg, &sid("BHZ"), t(0), t(100)) {
            Decision::Reject => {}
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn selection_partial_overlap_produces_select_bound() -> crate::Result<()> {
        let mut cfg = Config::default();
        cfg.selections = Selections {
            entries: vec![SelectionEntry {
                network: "NET".into(),
                station: "STA".into(),
                location: "".into(),
                channel: "BHZ".into(),
                quality: None,
                start: Some(t(30)),
                end: None,
            }],
        };
        match apply(&cfg, &sid("BHZ"), t(0), t(100)) {
            Decision::Admit(Some((s, e))) => {
                assert_eq!(s, t(30));
                assert_eq!(e, t(100));
            }
            other => panic!("expected bounded admit, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn disjoint_selections_clear_bound() {
        let mut cfg = Config::default();
        cfg.selections = Selections {
            entries: vec![
                SelectionEntry {
                    network: "NET".into(),
                    station: "STA".into(),
                    location: "".into(),
                    channel: "BHZ".into(),
                    quality: None,
                    start: Some(t(0)),
                    end: Some(t(10)),
                },
                SelectionEntry {
                    network: "NET".into(),
                    station: "STA".into(),
                    location: "".into(),
                    channel: "BHZ".into(),
                    quality: None,
                    start: Some(t(50)),
                    end: Some(t(60)),
                },
            ],
        };
        match apply(&cfg, &sid("BHZ"), t(0), t(100)) {
            Decision::Admit(None) => {}
            other => panic!("expected unbounded admit after disjoint clear, got {other:?}"),
        }
    }
}
