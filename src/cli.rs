//! Command-line surface (spec.md §6), behind the `cli` feature.
//!
//! `clap` maps the stable flag table 1:1 onto a derive struct; a second
//! pass (not clap's job) expands `@listfile` indirection and
//! `file@start:end` byte ranges, exactly as the original tool's
//! `addfile`/`addlistfile` do after its own `getopt`-style loop.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use crate::archive::{self, Template};
use crate::config::{Config, PruneMode, VersionOverride};
use crate::select::{parse_scenario_time, Selections};
use crate::write::sink::{ArchiveSink, SingleFileSink, SinkHandle};
use crate::InputFile;

/// `dataselect` — reconcile, prune and rewrite miniSEED input into one
/// file and/or an Archive of files.
#[derive(Parser, Debug)]
#[command(name = "dataselect", version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print the extended help text, including the archive template table.
    #[arg(short = 'H', long = "help-extended")]
    pub help_extended: bool,

    /// `-tt SEC`: override the default half-sample-period time tolerance.
    #[arg(long = "tt")]
    pub time_tolerance: Option<f64>,

    /// `-rt DIFF`: override the relative sample-rate tolerance.
    #[arg(long = "rt")]
    pub rate_tolerance: Option<f64>,

    /// `-E`: disable "best version wins"; all publication versions equal.
    #[arg(short = 'E')]
    pub disable_best_version: bool,

    /// `-s FILE`: load a selections file.
    #[arg(short = 's')]
    pub selections_file: Option<PathBuf>,

    /// `-ts T`: global start time (`YYYY-DDD,HH:MM:SS[.fffffffff]`).
    #[arg(long = "ts")]
    pub time_start: Option<String>,

    /// `-te T`: global end time.
    #[arg(long = "te")]
    pub time_end: Option<String>,

    /// `-m PAT`: SourceID glob, auto-wrapped with `*...*`.
    #[arg(short = 'm')]
    pub match_pattern: Option<String>,

    /// `-M PAT`: legacy match regex (`@file` reads the pattern from a file).
    #[arg(short = 'M')]
    pub match_regex: Option<String>,

    /// `-R PAT`: legacy reject regex.
    #[arg(short = 'R')]
    pub reject_regex: Option<String>,

    /// `-snd`: skip non-miniSEED data instead of erroring.
    #[arg(long = "snd")]
    pub skip_non_data: bool,

    /// `-o FILE`: single output file, overwritten (`-` = stdout).
    #[arg(short = 'o')]
    pub output: Option<String>,

    /// `+o FILE`: single output file, appended. Not representable as a
    /// normal clap flag (`+` is not an option prefix clap recognizes), so
    /// [`split_plus_o`] extracts it from the raw argument list first.
    #[arg(skip)]
    pub output_append: Option<String>,

    /// `-A FMT`: add an archive sink with a custom template. Repeatable.
    #[arg(short = 'A')]
    pub archive: Vec<String>,

    #[arg(long = "CHAN")]
    pub chan: bool,
    #[arg(long = "VCHAN")]
    pub vchan: bool,
    #[arg(long = "QCHAN")]
    pub qchan: bool,
    #[arg(long = "CDAY")]
    pub cday: bool,
    #[arg(long = "SDAY")]
    pub sday: bool,
    #[arg(long = "BUD")]
    pub bud: bool,
    #[arg(long = "SDS")]
    pub sds: bool,
    /// `-CSS DIR`.
    #[arg(long = "CSS")]
    pub css: Option<String>,

    /// `-Pr`: whole-record prune mode.
    #[arg(long = "Pr")]
    pub prune_record: bool,
    /// `-Ps`: sample-level prune mode.
    #[arg(long = "Ps")]
    pub prune_sample: bool,
    /// `-Pe`: edges-only prune mode.
    #[arg(long = "Pe")]
    pub prune_edges: bool,

    /// `-Q {R,D,Q,M,1..255}`: re-stamp publication version/quality on write.
    #[arg(short = 'Q')]
    pub version_override: Option<String>,

    /// `-Sd`: split input records at day boundaries.
    #[arg(long = "Sd")]
    pub split_day: bool,
    /// `-Sh`: split input records at hour boundaries.
    #[arg(long = "Sh")]
    pub split_hour: bool,
    /// `-Sm`: split input records at minute boundaries.
    #[arg(long = "Sm")]
    pub split_minute: bool,

    /// `-out FILE`: summary of output records (`-` stdout, `--` stderr).
    #[arg(long = "out")]
    pub out_path: Option<String>,
    /// `-outprefix STR`.
    #[arg(long = "outprefix", default_value = "")]
    pub out_prefix: String,

    /// Positional input files/listfiles/byte-ranged files.
    pub inputs: Vec<String>,
}

/// Pulls a `+o FILE` pair (if present) out of the raw argument list before
/// handing the rest to clap, since `+`-prefixed flags aren't something
/// clap's derive parser understands. Returns the remaining arguments and
/// the append-target path, if any.
#[must_use]
pub fn split_plus_o(args: &[String]) -> (Vec<String>, Option<String>) {
    let mut remaining = Vec::with_capacity(args.len());
    let mut append_to = None;
    let mut iter = args.iter().cloned();
    while let Some(arg) = iter.next() {
        if arg == "+o" {
            append_to = iter.next();
        } else {
            remaining.push(arg);
        }
    }
    (remaining, append_to)
}

impl Cli {
    pub fn parse_from_env() -> Self {
        let raw: Vec<String> = std::env::args().collect();
        let (rest, append) = split_plus_o(&raw);
        let mut cli = Self::parse_from(rest);
        cli.output_append = append;
        cli
    }
}

/// One resolved input: a concrete file path plus any `@start:end` byte
/// range, after `@listfile` indirection has been fully expanded.
struct ResolvedInput {
    path: PathBuf,
    byte_range: Option<(u64, u64)>,
}

/// Expands `@listfile` / `file@start:end` input specs (spec.md §6,
/// SPEC_FULL.md §2), recursively, `#`-comments stripped.
fn expand_inputs(specs: &[String]) -> crate::Result<Vec<ResolvedInput>> {
    let mut out = Vec::new();
    for spec in specs {
        expand_one(spec, &mut out, 0)?;
    }
    Ok(out)
}

const MAX_LISTFILE_DEPTH: u32 = 16;

fn expand_one(spec: &str, out: &mut Vec<ResolvedInput>, depth: u32) -> crate::Result<()> {
    if let Some(list_path) = spec.strip_prefix('@') {
        if depth >= MAX_LISTFILE_DEPTH {
            return Err(crate::Error::Config(format!(
                "listfile nesting too deep while expanding {list_path:?}"
            )));
        }
        let text = std::fs::read_to_string(list_path)?;
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if !line.is_empty() {
                expand_one(line, out, depth + 1)?;
            }
        }
        return Ok(());
    }

    let (path, byte_range) = parse_byte_range(spec)?;
    out.push(ResolvedInput { path, byte_range });
    Ok(())
}

/// Parses `file@start:end` (spec.md §6: "separator normalized to `-`
/// internally"; both `@start:end` and `@start-end` are accepted here).
fn parse_byte_range(spec: &str) -> crate::Result<(PathBuf, Option<(u64, u64)>)> {
    let Some((path, range)) = spec.rsplit_once('@') else {
        return Ok((PathBuf::from(spec), None));
    };
    let sep = if range.contains(':') { ':' } else { '-' };
    let Some((start, end)) = range.split_once(sep) else {
        return Err(crate::Error::Config(format!(
            "bad byte range {range:?} in input spec {spec:?}"
        )));
    };
    let start: u64 = start
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad range start in {spec:?}")))?;
    let end: u64 = end
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad range end in {spec:?}")))?;
    Ok((PathBuf::from(path), Some((start, end))))
}

fn parse_version_override(text: &str) -> crate::Result<VersionOverride> {
    if text.len() == 1 && text.chars().next().unwrap().is_ascii_alphabetic() {
        return Ok(VersionOverride::Quality(text.as_bytes()[0]));
    }
    let n: u8 = text
        .parse()
        .map_err(|_| crate::Error::Config(format!("bad -Q value {text:?}")))?;
    Ok(VersionOverride::Numeric(n))
}

/// Builds the run-wide [`Config`] from parsed flags. Input expansion and
/// sink construction are kept separate since they own resources
/// ([`Config`] doesn't).
fn build_config(cli: &Cli) -> crate::Result<Config> {
    let mut config = Config {
        time_tolerance_seconds: cli.time_tolerance,
        sample_rate_tolerance: cli.rate_tolerance.unwrap_or(0.0001),
        best_version: !cli.disable_best_version,
        verbosity: cli.verbose,
        skip_non_data: cli.skip_non_data,
        summary_path: cli.out_path.clone(),
        summary_prefix: cli.out_prefix.clone(),
        ..Config::default()
    };

    if let Some(path) = &cli.selections_file {
        let text = std::fs::read_to_string(path)?;
        config.selections = Selections::parse(&text)?;
    }
    if let Some(t) = &cli.time_start {
        config.global_start = Some(parse_scenario_time(t)?);
    }
    if let Some(t) = &cli.time_end {
        config.global_end = Some(parse_scenario_time(t)?);
    }
    config.match_pattern = cli.match_pattern.as_ref().map(|p| crate::glob::wrap_substring(p));
    config.match_regex = read_pattern_arg(&cli.match_regex)?;
    config.reject_regex = read_pattern_arg(&cli.reject_regex)?;

    config.prune_mode = match (cli.prune_record, cli.prune_sample, cli.prune_edges) {
        (true, false, false) => Some(PruneMode::Record),
        (false, true, false) => Some(PruneMode::Sample),
        (false, false, true) => Some(PruneMode::EdgesOnly),
        (false, false, false) => None,
        _ => return Err(crate::Error::Config("-Pr, -Ps and -Pe are mutually exclusive".into())),
    };

    config.version_override = cli.version_override.as_deref().map(parse_version_override).transpose()?;

    config.split = match (cli.split_day, cli.split_hour, cli.split_minute) {
        (true, false, false) => Some(crate::config::SplitGranularity::Day),
        (false, true, false) => Some(crate::config::SplitGranularity::Hour),
        (false, false, true) => Some(crate::config::SplitGranularity::Minute),
        (false, false, false) => None,
        _ => return Err(crate::Error::Config("-Sd, -Sh and -Sm are mutually exclusive".into())),
    };

    Ok(config)
}

/// `-M`/`-R` accept either a literal pattern or `@file` to read it from a
/// file, the same `@`-indirection spirit as listfiles (spec.md §6).
fn read_pattern_arg(arg: &Option<String>) -> crate::Result<Option<String>> {
    match arg {
        None => Ok(None),
        Some(text) => match text.strip_prefix('@') {
            Some(path) => Ok(Some(std::fs::read_to_string(path)?.trim().to_string())),
            None => Ok(Some(text.clone())),
        },
    }
}

/// Archive sinks raise the process's open-file ceiling before running, so
/// the multiplexer is allowed a generous cap rather than the conservative
/// default; the exact figure the caller picks only matters as a ceiling.
const ARCHIVE_MAX_OPEN: usize = 64;

fn build_sinks(cli: &Cli) -> crate::Result<Vec<SinkHandle>> {
    let mut sinks = Vec::new();

    match (&cli.output, &cli.output_append) {
        (Some(_), Some(_)) => {
            return Err(crate::Error::Config("-o and +o are mutually exclusive".into()))
        }
        (Some(path), None) if path == "-" => sinks.push(SinkHandle::from(SingleFileSink::stdout())),
        (Some(path), None) => sinks.push(SinkHandle::from(SingleFileSink::create(path, false)?)),
        (None, Some(path)) => sinks.push(SinkHandle::from(SingleFileSink::create(path, true)?)),
        (None, None) => {}
    }

    for fmt in &cli.archive {
        let template = Template::parse(fmt)?;
        sinks.push(SinkHandle::from(ArchiveSink::new(archive::Multiplexer::new(template, ARCHIVE_MAX_OPEN))));
    }

    let preset_flags: [(bool, &str); 7] = [
        (cli.chan, "CHAN"),
        (cli.vchan, "VCHAN"),
        (cli.qchan, "QCHAN"),
        (cli.cday, "CDAY"),
        (cli.sday, "SDAY"),
        (cli.bud, "BUD"),
        (cli.sds, "SDS"),
    ];
    for (enabled, name) in preset_flags {
        if enabled {
            let template = archive::preset(name).expect("named preset is always known");
            sinks.push(SinkHandle::from(ArchiveSink::new(archive::Multiplexer::new(template, ARCHIVE_MAX_OPEN))));
        }
    }
    if let Some(dir) = &cli.css {
        let template = archive::preset(&format!("CSS {dir}")).expect("CSS preset always parses");
        sinks.push(SinkHandle::from(ArchiveSink::new(archive::Multiplexer::new(template, ARCHIVE_MAX_OPEN))));
    }

    Ok(sinks)
}

fn write_summary(cli: &Cli, summaries: &[crate::write::SummaryEntry]) -> crate::Result<()> {
    let Some(path) = &cli.out_path else {
        return Ok(());
    };
    let mut lines = String::new();
    for entry in summaries {
        lines.push_str(&entry.to_line(&cli.out_prefix));
        lines.push('\n');
    }
    match path.as_str() {
        "-" => print!("{lines}"),
        "--" => eprint!("{lines}"),
        _ => std::fs::write(path, lines)?,
    }
    Ok(())
}

const EXTENDED_HELP: &str = "\
Archive template flags (each preceded by '%' for a defining/grouping key, or\n\
'#' for a non-defining, first-record-wins value):\n\
  n s l c    network / station / location / channel\n\
  Y y        4-digit / 2-digit year\n\
  j H M S    day-of-year, hour, minute, second\n\
  F          fractional seconds, 4-digit\n\
  N          nanoseconds, 9-digit\n\
  v          publication version, decimal\n\
  q          legacy quality letter (R/D/Q/M) or decimal version\n\
  L          record length in bytes\n\
  r R        sample rate rounded to integer / 6-decimal float\n\
  %% ##       literal '%' or '#'\n\
\n\
Preset layouts: CHAN, VCHAN, QCHAN, CDAY, SDAY, BUD, SDS, CSS DIR.\n";

/// Parses arguments, runs the pipeline, writes the summary file, and
/// returns the process exit code spec.md §6 specifies (0 success, 1 any
/// critical failure).
pub fn run() -> i32 {
    let cli = Cli::parse_from_env();

    if cli.help_extended {
        print!("{EXTENDED_HELP}");
        return 0;
    }

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    match run_inner(&cli) {
        Ok(()) => 0,
        Err(err) => {
            crate::error::print_critical(std::io::stderr(), &err);
            1
        }
    }
}

fn run_inner(cli: &Cli) -> crate::Result<()> {
    if cli.inputs.is_empty() {
        return Err(crate::Error::Config("no input files given".into()));
    }

    let config = build_config(cli)?;
    let resolved = expand_inputs(&cli.inputs)?;
    let inputs: Vec<InputFile<'_>> = resolved
        .iter()
        .map(|r| InputFile {
            path: r.path.as_path(),
            byte_range: r.byte_range,
        })
        .collect();

    let mut sinks = build_sinks(cli)?;
    let summaries = crate::run(&inputs, &config, &mut sinks)?;
    write_summary(cli, &summaries)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn plus_o_is_extracted_from_raw_args() {
        let args = vec!["dataselect".to_string(), "+o".to_string(), "out.mseed".to_string(), "in.mseed".to_string()];
        let (rest, append) = split_plus_o(&args);
        assert_eq!(append, Some("out.mseed".to_string()));
        assert_eq!(rest, vec!["dataselect".to_string(), "in.mseed".to_string()]);
    }

    #[test]
    fn byte_range_accepts_colon_and_dash() -> crate::Result<()> {
        let (p, r) = parse_byte_range("a.mseed@10:20")?;
        assert_eq!(p, PathBuf::from("a.mseed"));
        assert_eq!(r, Some((10, 20)));
        let (p, r) = parse_byte_range("a.mseed@10-20")?;
        assert_eq!(p, PathBuf::from("a.mseed"));
        assert_eq!(r, Some((10, 20)));
        Ok(())
    }

    #[test]
    fn plain_path_has_no_byte_range() -> crate::Result<()> {
        let (p, r) = parse_byte_range("a.mseed")?;
        assert_eq!(p, PathBuf::from("a.mseed"));
        assert_eq!(r, None);
        Ok(())
    }

    #[test]
    fn listfile_expands_recursively() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let inner = dir.path().join("inner.lst");
        std::fs::write(&inner, "b.mseed\n# comment\nc.mseed@0:10\n")?;
        let outer = dir.path().join("outer.lst");
        std::fs::write(&outer, format!("a.mseed\n@{}\n", inner.display()))?;

        let specs = vec![format!("@{}", outer.display())];
        let resolved = expand_inputs(&specs)?;
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].path, PathBuf::from("a.mseed"));
        assert_eq!(resolved[1].path, PathBuf::from("b.mseed"));
        assert_eq!(resolved[2].byte_range, Some((0, 10)));
        Ok(())
    }

    #[test]
    fn version_override_parses_letter_and_number() -> crate::Result<()> {
        assert_eq!(parse_version_override("M")?, VersionOverride::Quality(b'M'));
        assert_eq!(parse_version_override("3")?, VersionOverride::Numeric(3));
        assert!(parse_version_override("").is_err());
        Ok(())
    }
}
