use std::fmt::Debug;
use std::time::Instant;

use serde::Serialize;

use crate::domain::{ImageId, Record};
use crate::error::VgError;
use crate::source::{RecordSource, RecordSourceExt};

#[derive(Debug, Clone, Copy)]
pub struct CompareOptions {
    /// Also require identical region sequences, not just header fields.
    pub check_regions: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            check_regions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub compared: usize,
    pub checked_regions: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub records: usize,
    pub total_secs: f64,
    pub per_record_secs: Option<f64>,
}

/// Walks both sources in lockstep and fails on the first field that
/// differs. Errors from either source are returned unchanged.
pub fn compare<R, L>(
    remote: &R,
    local: &L,
    options: CompareOptions,
) -> Result<ComparisonReport, VgError>
where
    R: RecordSource + ?Sized,
    L: RecordSource + ?Sized,
{
    check_id_lists(remote.ids(), local.ids())?;

    let mut compared = 0usize;
    for (remote_record, local_record) in remote.records().zip(local.records()) {
        let remote_record = remote_record?;
        let local_record = local_record?;
        compare_records(&remote_record, &local_record, options)?;
        compared += 1;
    }

    tracing::info!(compared, "sources agree");
    Ok(ComparisonReport {
        compared,
        checked_regions: options.check_regions,
    })
}

pub fn compare_records(
    remote: &Record,
    local: &Record,
    options: CompareOptions,
) -> Result<(), VgError> {
    let id = remote.id();
    check_field(id, "id", &remote.image.id, &local.image.id)?;
    check_field(id, "coco_id", &remote.image.coco_id, &local.image.coco_id)?;
    check_field(id, "flickr_id", &remote.image.flickr_id, &local.image.flickr_id)?;

    if options.check_regions {
        check_field(
            id,
            "region_count",
            &remote.regions.len(),
            &local.regions.len(),
        )?;
        for (position, (r, l)) in remote.regions.iter().zip(&local.regions).enumerate() {
            check_field(id, &format!("regions[{position}]"), r, l)?;
        }
    }
    Ok(())
}

/// Drains `source` and reports how long it took.
pub fn profile<S: RecordSource + ?Sized>(source: &S) -> Result<Timing, VgError> {
    let start = Instant::now();
    let mut records = 0usize;
    for record in source.records() {
        record?;
        records += 1;
    }
    let total_secs = start.elapsed().as_secs_f64();
    Ok(Timing {
        records,
        total_secs,
        per_record_secs: (records > 0).then(|| total_secs / records as f64),
    })
}

fn check_id_lists(remote: &[ImageId], local: &[ImageId]) -> Result<(), VgError> {
    if let Some((r, l)) = remote.iter().zip(local).find(|(r, l)| r != l) {
        return Err(mismatch(*r, "requested_id", r, l));
    }
    if remote.len() != local.len() {
        let longer = if remote.len() > local.len() { remote } else { local };
        let id = longer[remote.len().min(local.len())];
        return Err(mismatch(id, "record_count", &remote.len(), &local.len()));
    }
    Ok(())
}

fn check_field<T: PartialEq + Debug>(
    id: ImageId,
    field: &str,
    remote: &T,
    local: &T,
) -> Result<(), VgError> {
    if remote == local {
        return Ok(());
    }
    Err(mismatch(id, field, remote, local))
}

fn mismatch<T: Debug + ?Sized>(id: ImageId, field: &str, remote: &T, local: &T) -> VgError {
    let remote = format!("{remote:?}");
    let local = format!("{local:?}");
    tracing::error!(%id, field, %remote, %local, "record mismatch");
    VgError::Mismatch {
        id,
        field: field.to_string(),
        remote,
        local,
    }
}
