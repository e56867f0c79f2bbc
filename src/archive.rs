//! The templated archive sink (spec.md §6 "Archive templating", §5
//! resource model). spec.md treats this as an external collaborator —
//! `open_for(record) -> stream` / `write(stream, bytes)` — this module is
//! the concrete implementation a runnable crate needs.
//!
//! A template path is `/`-separated; each segment is expanded
//! record-by-record. `%`-flags are "defining": every record sharing their
//! expansion goes to the same file, and they form the lookup key. `#`-flags
//! are "non-defining": only the *first* record to reach a given file has
//! its value baked into the path.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::fd_table::FdTable;
use crate::sourceid::SourceId;
use crate::time::Nstime;

/// Everything the template language (spec.md §6 table) can expand.
#[derive(Clone, Debug)]
pub struct ExpandedFields {
    pub source_id: SourceId,
    pub time: Nstime,
    pub pubversion: u8,
    pub legacy_quality: Option<u8>,
    pub record_length: u32,
    pub sample_rate: f64,
}

impl ExpandedFields {
    fn quality_string(&self) -> String {
        match self.legacy_quality {
            Some(q) => (q as char).to_string(),
            None if (1..=4).contains(&self.pubversion) => {
                // A v3 record whose publication version happens to fall
                // in the legacy 1..4 range still renders as a digit, not
                // a letter — only actual v2 quality bytes get letters.
                self.pubversion.to_string()
            }
            None => self.pubversion.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
enum Token {
    Literal(String),
    Flag { defining: bool, flag: FlagKind },
}

#[derive(Copy, Clone, Debug)]
enum FlagKind {
    Network,
    Station,
    Location,
    Channel,
    Year4,
    Year2,
    DayOfYear,
    Hour,
    Minute,
    Second,
    FracSeconds4,
    Nanoseconds9,
    PubVersion,
    Quality,
    RecordLength,
    SampleRateInt,
    SampleRateFloat,
}

fn parse_flag(c: char) -> crate::Result<FlagKind> {
    Ok(match c {
        'n' => FlagKind::Network,
        's' => FlagKind::Station,
        'l' => FlagKind::Location,
        'c' => FlagKind::Channel,
        'Y' => FlagKind::Year4,
        'y' => FlagKind::Year2,
        'j' => FlagKind::DayOfYear,
        'H' => FlagKind::Hour,
        'M' => FlagKind::Minute,
        'S' => FlagKind::Second,
        'F' => FlagKind::FracSeconds4,
        'N' => FlagKind::Nanoseconds9,
        'v' => FlagKind::PubVersion,
        'q' => FlagKind::Quality,
        'L' => FlagKind::RecordLength,
        'r' => FlagKind::SampleRateInt,
        'R' => FlagKind::SampleRateFloat,
        other => {
            return Err(crate::Error::Config(format!(
                "unknown archive template flag '{other}'"
            )))
        }
    })
}

fn expand_flag(flag: FlagKind, fields: &ExpandedFields) -> String {
    let (year, doy, hour, minute, second, nanos) = fields.time.to_calendar();
    match flag {
        FlagKind::Network => fields.source_id.network.clone(),
        FlagKind::Station => fields.source_id.station.clone(),
        FlagKind::Location => fields.source_id.location.clone(),
        FlagKind::Channel => fields.source_id.channel.clone(),
        FlagKind::Year4 => format!("{year:04}"),
        FlagKind::Year2 => format!("{:02}", year.rem_euclid(100)),
        FlagKind::DayOfYear => format!("{doy:03}"),
        FlagKind::Hour => format!("{hour:02}"),
        FlagKind::Minute => format!("{minute:02}"),
        FlagKind::Second => format!("{second:02}"),
        FlagKind::FracSeconds4 => format!("{:04}", nanos / 100_000),
        FlagKind::Nanoseconds9 => format!("{nanos:09}"),
        FlagKind::PubVersion => fields.pubversion.to_string(),
        FlagKind::Quality => fields.quality_string(),
        FlagKind::RecordLength => fields.record_length.to_string(),
        FlagKind::SampleRateInt => format!("{}", fields.sample_rate.round() as i64),
        FlagKind::SampleRateFloat => format!("{:.6}", fields.sample_rate),
    }
}

/// A parsed archive template. Preset layouts (spec.md §6) are just
/// pre-parsed instances of this.
#[derive(Clone, Debug)]
pub struct Template {
    tokens: Vec<Token>,
}

impl Template {
    pub fn parse(pattern: &str) -> crate::Result<Self> {
        if pattern.is_empty() {
            return Err(crate::Error::Config("archive template must not be empty".into()));
        }
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '%' | '#' => {
                    let defining = c == '%';
                    match chars.next() {
                        Some('%') if !defining => literal.push('%'),
                        Some('#') if defining => literal.push('#'),
                        Some(flag_char) => {
                            if !literal.is_empty() {
                                tokens.push(Token::Literal(std::mem::take(&mut literal)));
                            }
                            tokens.push(Token::Flag {
                                defining,
                                flag: parse_flag(flag_char)?,
                            });
                        }
                        None => {
                            return Err(crate::Error::Config(
                                "archive template ends with a dangling '%'/'#'".into(),
                            ))
                        }
                    }
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(Self { tokens })
    }

    /// `CHAN = %n.%s.%l.%c`
    pub fn chan() -> Self {
        Self::parse("%n.%s.%l.%c").expect("built-in preset is always valid")
    }

    /// `BUD = %n/%s/%s.%n.%l.%c.%Y.%j`
    pub fn bud() -> Self {
        Self::parse("%n/%s/%s.%n.%l.%c.%Y.%j").expect("built-in preset is always valid")
    }

    /// `SDS = %Y/%n/%s/%c.D/%n.%s.%l.%c.D.%Y.%j`
    pub fn sds() -> Self {
        Self::parse("%Y/%n/%s/%c.D/%n.%s.%l.%c.D.%Y.%j").expect("built-in preset is always valid")
    }

    /// `CDAY = %n.%s.%l.%c.%Y.%j`
    pub fn cday() -> Self {
        Self::parse("%n.%s.%l.%c.%Y.%j").expect("built-in preset is always valid")
    }

    /// Grouping key: the concatenation of only the defining (`%`) flags'
    /// expansions, which is stable across every record destined for the
    /// same file regardless of what its non-defining fields say.
    fn key(&self, fields: &ExpandedFields) -> String {
        let mut key = String::new();
        for token in &self.tokens {
            if let Token::Flag { defining: true, flag } = token {
                key.push('\u{1}');
                key.push_str(&expand_flag(*flag, fields));
            }
        }
        key
    }

    /// The full path, expanding every flag (defining and non-defining)
    /// from `fields`. Only called once per file, for the first record
    /// that reaches it.
    fn expand_path(&self, fields: &ExpandedFields) -> PathBuf {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Flag { flag, .. } => out.push_str(&expand_flag(*flag, fields)),
            }
        }
        PathBuf::from(out)
    }
}

struct OpenStream {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Multiplexes writes across many template-expanded files, evicting the
/// least-recently-written one when the open-file cap is reached (spec.md
/// §5).
pub struct Multiplexer {
    template: Template,
    open: FdTable<String, OpenStream>,
    /// Paths this run has already created, so a file evicted under fd
    /// pressure and later revisited is reopened in append mode instead of
    /// being truncated again (matches `dsarchive.c`'s `O_RDWR | O_CREAT |
    /// O_APPEND`, spec.md §5).
    created_paths: FxHashSet<PathBuf>,
}

impl Multiplexer {
    #[must_use]
    pub fn new(template: Template, max_open: usize) -> Self {
        Self {
            template,
            open: FdTable::new(max_open),
            created_paths: FxHashSet::default(),
        }
    }

    /// `open_for(record) -> stream` / `write(stream, bytes)` from spec.md
    /// §1's collaborator interface, collapsed into one call: look up (or
    /// create) the stream for `fields`' file, then write `bytes` to it.
    pub fn write(&mut self, fields: &ExpandedFields, bytes: &[u8]) -> crate::Result<()> {
        let key = self.template.key(fields);

        if self.open.get_mut(&key).is_none() {
            let path = self.template.expand_path(fields);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let file = if self.created_paths.insert(path.clone()) {
                File::create(&path)?
            } else {
                OpenOptions::new().create(true).append(true).open(&path)?
            };
            log::debug!("archive: opened {}", path.display());
            self.open.insert(
                key.clone(),
                OpenStream {
                    path,
                    writer: BufWriter::new(file),
                },
                |_key, evicted| {
                    log::debug!("archive: evicting {} under fd pressure", evicted.path.display());
                    let _ = evicted.writer.flush();
                },
            );
        }

        let stream = self.open.get_mut(&key).expect("just inserted or already present");
        stream.writer.write_all(bytes)?;
        Ok(())
    }

    /// Flushes and closes every still-open stream. Called at program end.
    pub fn close_all(&mut self) -> crate::Result<()> {
        let mut first_err = None;
        self.open.drain(|_key, mut stream| {
            if let Err(err) = stream.writer.flush() {
                first_err.get_or_insert(err);
            }
        });
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Resolves one of spec.md §6's preset layout names (`-CHAN`, `-BUD`,
/// `-SDS`, ...) to its template, or `None` if `name` isn't a preset.
#[must_use]
pub fn preset(name: &str) -> Option<Template> {
    match name {
        "CHAN" | "VCHAN" | "QCHAN" => Some(Template::chan()),
        "CDAY" => Some(Template::cday()),
        "SDAY" => Some(Template::parse("%n.%s.%l.%c.%Y.%j.%H").expect("valid preset")),
        "BUD" => Some(Template::bud()),
        "SDS" => Some(Template::sds()),
        other if other.starts_with("CSS ") => {
            let dir = other.trim_start_matches("CSS ").trim();
            Some(Template::parse(&format!("{dir}/%n.%s.%l.%c.%Y.%j")).expect("valid preset"))
        }
        _ => None,
    }
}
