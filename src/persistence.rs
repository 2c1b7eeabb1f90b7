//! Compressed `.npz` output
//!
//! Every array goes into its own zip archive as a single `arr_0.npy` entry,
//! the layout `numpy.savez_compressed(path, array)` produces, so
//! `np.load(path)["arr_0"]` reads it back unchanged.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use npyz::{AutoSerialize, Deserialize, WriterBuilder};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{ExtractionError, Result};
use crate::pipeline::BatchTensors;

/// Key of the single array stored in each archive
pub const ARRAY_KEY: &str = "arr_0";

const NPZ_EXTENSION: &str = "npz";

/// Append `.npz` unless the path already ends with it
pub fn npz_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    match path.extension() {
        Some(ext) if ext == NPZ_EXTENSION => path.to_path_buf(),
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".");
            name.push(NPZ_EXTENSION);
            PathBuf::from(name)
        }
    }
}

/// Write `array` under [`ARRAY_KEY`] and return the path actually written
pub fn write_npz<P, S, D>(path: P, array: &ArrayBase<S, D>) -> Result<PathBuf>
where
    P: AsRef<Path>,
    S: Data,
    S::Elem: AutoSerialize + Copy,
    D: Dimension,
{
    let path = npz_path(path);
    let file = BufWriter::new(File::create(&path)?);
    let mut inner = write_npz_to(file, array)?;
    inner.flush()?;
    Ok(path)
}

/// Write an archive to any seekable sink, returning the sink
pub fn write_npz_to<W, S, D>(sink: W, array: &ArrayBase<S, D>) -> Result<W>
where
    W: Write + Seek,
    S: Data,
    S::Elem: AutoSerialize + Copy,
    D: Dimension,
{
    let payload_bytes = (array.len() * std::mem::size_of::<S::Elem>()) as u64;
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(payload_bytes >= u64::from(u32::MAX));

    let mut zip = ZipWriter::new(sink);
    zip.start_file(format!("{ARRAY_KEY}.npy"), options)?;

    let shape: Vec<u64> = array.shape().iter().map(|&d| d as u64).collect();
    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(&shape)
        .writer(&mut zip)
        .begin_nd()?;
    // Logical iteration is row-major whatever the memory layout
    writer.extend(array.iter().copied())?;
    writer.finish()?;

    Ok(zip.finish()?)
}

/// Shape and row-major data of one stored array
#[derive(Debug, Clone, PartialEq)]
pub struct NpzArray<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> NpzArray<T> {
    pub fn into_array(self) -> Result<ArrayD<T>> {
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data)?)
    }
}

/// Read a named array, or the first one when `name` is `None`
pub fn read_npz<T, P>(path: P, name: Option<&str>) -> Result<NpzArray<T>>
where
    T: Deserialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    read_npz_from(file, name).map_err(|err| match err {
        ExtractionError::MissingArray { name, .. } => ExtractionError::MissingArray {
            name,
            path: path.display().to_string(),
        },
        other => other,
    })
}

pub fn read_npz_from<T, R>(source: R, name: Option<&str>) -> Result<NpzArray<T>>
where
    T: Deserialize,
    R: Read + Seek,
{
    let mut archive = ZipArchive::new(source)?;
    let missing = |err: ZipError| match err {
        ZipError::FileNotFound => ExtractionError::MissingArray {
            name: name.unwrap_or(ARRAY_KEY).to_string(),
            path: String::new(),
        },
        other => ExtractionError::Archive(other),
    };
    let entry = match name {
        Some(name) => archive.by_name(&format!("{name}.npy")).map_err(missing)?,
        None => archive.by_index(0).map_err(missing)?,
    };

    let npy = npyz::NpyFile::new(entry)?;
    let shape = npy.shape().iter().map(|&d| d as usize).collect();
    let data = npy.into_vec::<T>()?;
    Ok(NpzArray { shape, data })
}

/// Destinations for the three arrays of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub occupancy: PathBuf,
    pub attacks: PathBuf,
    pub labels: PathBuf,
}

impl OutputPaths {
    pub fn new(
        occupancy: impl Into<PathBuf>,
        attacks: impl Into<PathBuf>,
        labels: impl Into<PathBuf>,
    ) -> Self {
        Self {
            occupancy: occupancy.into(),
            attacks: attacks.into(),
            labels: labels.into(),
        }
    }
}

/// Persist a batch; returns the paths with `.npz` applied
pub fn write_batch(batch: &BatchTensors, paths: &OutputPaths) -> Result<OutputPaths> {
    let occupancy = write_npz(&paths.occupancy, &batch.occupancy)?;
    info!(
        "wrote occupancy {:?} to {}",
        batch.occupancy.shape(),
        occupancy.display()
    );
    let attacks = write_npz(&paths.attacks, &batch.attacks)?;
    info!(
        "wrote attacks {:?} to {}",
        batch.attacks.shape(),
        attacks.display()
    );
    let labels = write_npz(&paths.labels, &batch.labels)?;
    info!("wrote {} labels to {}", batch.labels.len(), labels.display());

    Ok(OutputPaths {
        occupancy,
        attacks,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};
    use std::io::Cursor;

    #[test]
    fn test_npz_extension() {
        assert_eq!(npz_path("out/data.npz"), PathBuf::from("out/data.npz"));
        assert_eq!(npz_path("out/data"), PathBuf::from("out/data.npz"));
        assert_eq!(npz_path("out/data.npy"), PathBuf::from("out/data.npy.npz"));
    }

    #[test]
    fn test_in_memory_archive() {
        let array = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 12 + j * 4 + k) as u8);
        let buffer = write_npz_to(Cursor::new(Vec::new()), &array).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(buffer.get_ref().clone())).unwrap();
        assert_eq!(archive.len(), 1);
        assert!(archive.by_name("arr_0.npy").is_ok());

        let stored: NpzArray<u8> = read_npz_from(Cursor::new(buffer.into_inner()), None).unwrap();
        assert_eq!(stored.shape, vec![2, 3, 4]);
        assert_eq!(stored.data, (0..24).collect::<Vec<u8>>());
    }

    #[test]
    fn test_transposed_view_is_written_in_logical_order() {
        let array = array![[1i64, 2, 3], [4, 5, 6]];
        let buffer = write_npz_to(Cursor::new(Vec::new()), &array.t()).unwrap();
        let stored: NpzArray<i64> =
            read_npz_from(Cursor::new(buffer.into_inner()), Some(ARRAY_KEY)).unwrap();
        assert_eq!(stored.shape, vec![3, 2]);
        assert_eq!(stored.data, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_file_roundtrip_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let labels = array![1i64, 0, -1];
        let written = write_npz(dir.path().join("labels"), &labels).unwrap();
        assert_eq!(written, dir.path().join("labels.npz"));

        let stored = read_npz::<i64, _>(&written, Some("arr_0")).unwrap();
        assert_eq!(stored.shape, vec![3]);
        let restored = stored.into_array().unwrap();
        assert_eq!(restored, labels.into_dyn());

        match read_npz::<i64, _>(&written, Some("arr_1")) {
            Err(ExtractionError::MissingArray { name, path }) => {
                assert_eq!(name, "arr_1");
                assert!(path.ends_with("labels.npz"));
            }
            other => panic!("expected MissingArray, got {other:?}"),
        }
    }
}
