use std::io::{self, Write};

use serde::Serialize;

use crate::cache::{CacheReport, CacheStatus};
use crate::compare::{ComparisonReport, Timing};
use crate::domain::{ImageId, Record};

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResult {
    pub remote: Timing,
    pub local: Timing,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_cache_report(report: &CacheReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_status(status: &CacheStatus) -> io::Result<()> {
        Self::print_json(status)
    }

    pub fn print_comparison(report: &ComparisonReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_profile(result: &ProfileResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_ids(ids: &[ImageId]) -> io::Result<()> {
        Self::print_json(ids)
    }

    /// One compact JSON object per line, so large dumps can be streamed.
    pub fn print_record(record: &Record) -> io::Result<()> {
        let json = serde_json::to_string(record).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
