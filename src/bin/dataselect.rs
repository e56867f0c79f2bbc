//! Thin entry point: all behavior lives in `mseed_dataselect::cli`.

fn main() {
    std::process::exit(mseed_dataselect::cli::run());
}
