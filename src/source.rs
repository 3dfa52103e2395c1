use std::iter::FusedIterator;

use crate::domain::{ImageId, Record};
use crate::error::VgError;

/// A fixed list of image ids plus a way to turn one id into a record.
pub trait RecordSource {
    fn ids(&self) -> &[ImageId];

    fn fetch_record(&self, id: ImageId) -> Result<Record, VgError>;
}

/// Lazy iteration over any [`RecordSource`], including trait objects.
///
/// `records` walks the id list from the start on every call, one fetch per
/// `next()`, and stops for good after the first error.
pub trait RecordSourceExt: RecordSource {
    fn records(&self) -> Records<'_, Self> {
        Records {
            source: self,
            position: 0,
            failed: false,
        }
    }
}

impl<S: RecordSource + ?Sized> RecordSourceExt for S {}

pub struct Records<'a, S: ?Sized> {
    source: &'a S,
    position: usize,
    failed: bool,
}

impl<S: RecordSource + ?Sized> Iterator for Records<'_, S> {
    type Item = Result<Record, VgError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let id = *self.source.ids().get(self.position)?;
        self.position += 1;
        let result = self.source.fetch_record(id);
        self.failed = result.is_err();
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = self.source.ids().len().saturating_sub(self.position);
        (0, Some(remaining))
    }
}

impl<S: RecordSource + ?Sized> FusedIterator for Records<'_, S> {}
