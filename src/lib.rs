//! Time-ordered reconciliation, overlap pruning and archive write-out for
//! miniSEED seismic data.
//!
//! The pipeline runs strictly sequentially, one phase at a time over the
//! whole [`TraceList`]: ingest, then per-segment coverage analysis and
//! pruning, then reconciliation, then the Record Writer. [`run`] wires the
//! phases together the way a caller (the `dataselect` binary, or any other
//! embedder) is expected to.

pub mod archive;
pub mod codec;
pub mod config;
pub mod coverage;
pub mod error;
pub mod fd_table;
pub mod fileref;
pub mod glob;
pub mod ingest;
pub mod mergesort;
pub mod prune;
pub mod reconcile;
pub mod record;
pub mod recordlist;
pub mod segment;
pub mod select;
pub mod sourceid;
pub mod time;
pub mod traceid;
pub mod tracelist;
pub mod write;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, Result};

use std::path::Path;

use write::sink::SinkHandle;
use write::SummaryEntry;

/// One input file as the caller names it: a path and an optional
/// `file@start:end` byte-range restriction (spec.md §6).
pub struct InputFile<'a> {
    pub path: &'a Path,
    pub byte_range: Option<(u64, u64)>,
}

/// Headroom added on top of the exact descriptor count a run expects to
/// need, so a slightly-off estimate (a late-opened summary file, a sink
/// reopening after eviction) doesn't immediately hit the raised ceiling.
const FD_HEADROOM: u64 = 16;

/// Archive sinks cap their own open-file count independently (the
/// `Multiplexer`'s `max_open` constructor argument); this is just a
/// reasonable estimate of that cap for sizing the process-wide
/// `RLIMIT_NOFILE` request before any sink is actually built.
const ASSUMED_ARCHIVE_FDS: u64 = 64;

/// Runs the full pipeline over `inputs`, writing every surviving record to
/// every sink in `sinks`, then closes them. Returns one [`SummaryEntry`]
/// per `(SourceId, pubversion)` pair actually written, for the `-out`
/// summary file.
pub fn run(inputs: &[InputFile<'_>], config: &config::Config, sinks: &mut [SinkHandle]) -> Result<Vec<SummaryEntry>> {
    let wanted_fds = inputs.len() as u64 + ASSUMED_ARCHIVE_FDS + FD_HEADROOM;
    if let Err(err) = fd_table::raise_nofile_limit(wanted_fds) {
        log::warn!("could not raise the open-file-descriptor limit: {err}");
    }

    let mut tl = tracelist::TraceList::new();
    for input in inputs {
        ingest::add_input_file(&mut tl, input.path, input.byte_range);
    }

    let admitted = ingest::ingest_all(&mut tl, config)?;
    log::info!("admitted {admitted} record(s) from {} file(s)", inputs.len());

    for trace_idx in 0..tl.trace_ids.len() {
        for seg_idx in 0..tl.trace_ids[trace_idx].segments.len() {
            let cov = coverage::findcoverage(&tl, trace_idx, seg_idx, config);
            prune::trimtrace(&mut tl, trace_idx, seg_idx, &cov, config);
        }
    }

    reconcile::reconcile(&mut tl);

    let summaries = write::write_traces(&mut tl, config, sinks)?;
    for sink in sinks.iter_mut() {
        sink.close()?;
    }

    close_all_files(&mut tl);
    Ok(summaries)
}

fn close_all_files(tl: &mut tracelist::TraceList) {
    for file_ref in &mut tl.file_refs {
        file_ref.close();
    }
}
