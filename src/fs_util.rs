use std::fmt;
use std::fs;
use std::io::{self, BufReader};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use serde::de::{self, DeserializeOwned, Deserializer, SeqAccess, Visitor};
use zip::ZipArchive;

use crate::error::VgError;

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), VgError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| VgError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| VgError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| VgError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(VgError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| VgError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| VgError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| VgError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| VgError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// First file named `file_name` anywhere below `root`.
pub fn find_file(root: &Path, file_name: &str) -> Result<Option<PathBuf>, VgError> {
    Ok(walk_dir(root)?
        .into_iter()
        .find(|path| path.is_file() && path.file_name().is_some_and(|name| name == file_name)))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), VgError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| VgError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| VgError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| VgError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}

/// Streams the elements of a top-level JSON array through `callback`
/// without holding the whole array in memory. The first callback error
/// stops the scan and is returned as-is.
pub fn for_each_json_element<T, F>(path: &Utf8Path, mut callback: F) -> Result<(), VgError>
where
    T: DeserializeOwned,
    F: FnMut(T) -> Result<(), VgError>,
{
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| VgError::Filesystem(format!("open {path}: {err}")))?;
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
    let mut failure = None;
    let visitor = ElementVisitor {
        callback: &mut callback,
        failure: &mut failure,
        marker: PhantomData::<fn() -> T>,
    };
    if let Err(err) = (&mut deserializer).deserialize_seq(visitor) {
        return Err(failure.unwrap_or_else(|| VgError::Decode(format!("{path}: {err}"))));
    }
    deserializer
        .end()
        .map_err(|err| VgError::Decode(format!("{path}: {err}")))
}

struct ElementVisitor<'a, T, F> {
    callback: &'a mut F,
    failure: &'a mut Option<VgError>,
    marker: PhantomData<fn() -> T>,
}

impl<'de, T, F> Visitor<'de> for ElementVisitor<'_, T, F>
where
    T: DeserializeOwned,
    F: FnMut(T) -> Result<(), VgError>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a JSON array")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(item) = seq.next_element::<T>()? {
            if let Err(err) = (self.callback)(item) {
                *self.failure = Some(err);
                return Err(de::Error::custom("element callback failed"));
            }
        }
        Ok(())
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, VgError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| VgError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| VgError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn streams_array_elements_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("numbers.json")).unwrap();
        fs::write(path.as_std_path(), b"[3, 1, 2]").unwrap();

        let mut seen = Vec::new();
        for_each_json_element(&path, |value: u32| {
            seen.push(value);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![3, 1, 2]);
    }

    #[test]
    fn callback_error_is_returned_unchanged() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("numbers.json")).unwrap();
        fs::write(path.as_std_path(), b"[1, 2, 3]").unwrap();

        let mut calls = 0;
        let err = for_each_json_element(&path, |_: u32| {
            calls += 1;
            Err(VgError::Filesystem("stop".to_string()))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert_matches!(err, VgError::Filesystem(message) if message == "stop");
    }

    #[test]
    fn non_array_is_a_decode_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("object.json")).unwrap();
        fs::write(path.as_std_path(), b"{\"a\": 1}").unwrap();

        let err = for_each_json_element(&path, |_: u32| Ok(())).unwrap_err();
        assert_matches!(err, VgError::Decode(_));
    }
}
