//! In-memory splits and the split-name → split mapping returned by a load.
use crate::catalog::Registration;
use crate::features::{decode_image, validate_schema, ClassLabel, FeatureValue};
use crate::DatasetError;
use ndarray::{Array1, Array3, Array4, Axis};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field, Row};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::ops::Index;
use std::path::PathBuf;

/// The default trait to implement to get the simplest API
pub trait Dataset {
    /// The type of objects contained in the dataset
    type Item;

    /// The length of the dataset
    fn len(&self) -> usize;

    /// Get item at specific index. Should return `None` if and only if
    /// `index >= dataset.len()`.
    fn get(&self, index: usize) -> Option<Self::Item>;

    /// Whether the dataset has no items
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generic structure to iterate over [`Dataset`].
pub struct DatasetIterator<'a, D> {
    dataset: &'a D,
    index: usize,
}

/// Iterate of the dataset in order
pub fn iter<D: Dataset>(dataset: &D) -> DatasetIterator<'_, D> {
    DatasetIterator { dataset, index: 0 }
}

impl<'a, D: Dataset> Iterator for DatasetIterator<'a, D> {
    type Item = D::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let object = self.dataset.get(self.index);
        self.index += 1;
        object
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

/// One record of a split.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// `(image, label)`, when loaded as supervised
    Pair(Array3<u8>, i64),
    /// Feature name to value otherwise
    Features(BTreeMap<String, FeatureValue>),
}

impl Record {
    /// Borrow the `(image, label)` pair, `None` for feature records.
    pub fn as_pair(&self) -> Option<(&Array3<u8>, i64)> {
        match self {
            Record::Pair(image, label) => Some((image, *label)),
            Record::Features(_) => None,
        }
    }

    /// Take the `(image, label)` pair, `None` for feature records.
    pub fn into_pair(self) -> Option<(Array3<u8>, i64)> {
        match self {
            Record::Pair(image, label) => Some((image, label)),
            Record::Features(_) => None,
        }
    }
}

/// A named partition of a dataset, fully decoded in memory.
pub struct Split {
    name: String,
    images: Array4<u8>,
    labels: Array1<i64>,
    image_key: String,
    label_key: String,
    as_supervised: bool,
}

fn image_bytes<'a>(row: &'a Row, column: &str) -> Option<&'a [u8]> {
    row.get_column_iter()
        .find(|(name, _)| name.as_str() == column)
        .and_then(|(_, field)| match field {
            Field::Group(image) => image.get_column_iter().find_map(|(name, field)| {
                match (name.as_str(), field) {
                    ("bytes", Field::Bytes(bytes)) => Some(bytes.data()),
                    _ => None,
                }
            }),
            Field::Bytes(bytes) => Some(bytes.data()),
            _ => None,
        })
}

fn label_of(row: &Row, column: &str) -> Option<i64> {
    row.get_column_iter()
        .find(|(name, _)| name.as_str() == column)
        .and_then(|(_, field)| match field {
            Field::Long(v) => Some(*v),
            Field::Int(v) => Some(i64::from(*v)),
            Field::Short(v) => Some(i64::from(*v)),
            Field::Byte(v) => Some(i64::from(*v)),
            _ => None,
        })
}

/// Buffers for `rows` records, the count coming from untrusted footers.
fn preallocate(
    split: &str,
    rows: usize,
    (height, width, channels): (usize, usize, usize),
) -> Result<(Vec<u8>, Vec<i64>), DatasetError> {
    let corrupted = |reason: String| DatasetError::Corrupted {
        split: split.to_string(),
        index: 0,
        reason,
    };
    let pixel_count = rows
        .checked_mul(height * width * channels)
        .ok_or_else(|| corrupted(format!("{rows} rows do not fit in memory")))?;
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(pixel_count)
        .map_err(|e| corrupted(format!("{rows} rows: {e}")))?;
    let mut labels = Vec::new();
    labels
        .try_reserve_exact(rows)
        .map_err(|e| corrupted(format!("{rows} rows: {e}")))?;
    Ok((pixels, labels))
}

impl Split {
    /// Read and decode every row of the parquet shards of a split.
    pub fn from_parquet_files(
        name: &str,
        paths: &[PathBuf],
        registration: &Registration,
        as_supervised: bool,
    ) -> Result<Self, DatasetError> {
        let (height, width, channels) = registration.image_shape;
        let classes = ClassLabel::new(registration.class_names.iter().copied());
        let corrupted = |index: usize, reason: String| DatasetError::Corrupted {
            split: name.to_string(),
            index,
            reason,
        };

        let mut expected_rows: usize = 0;
        for path in paths {
            let mut local_file = File::open(path)?;
            let metadata = parquet2::read::read_metadata(&mut local_file)?;
            validate_schema(&path.display().to_string(), metadata.schema(), registration)?;
            expected_rows = expected_rows
                .checked_add(metadata.num_rows)
                .ok_or_else(|| corrupted(0, "row count overflows".to_string()))?;
        }

        let (mut pixels, mut labels) = preallocate(name, expected_rows, registration.image_shape)?;
        for path in paths {
            log::debug!("decoding {}", path.display());
            let reader = SerializedFileReader::new(File::open(path)?)?;
            for row in reader.get_row_iter(None)? {
                let row = row?;
                let index = labels.len();
                let bytes = image_bytes(&row, registration.image_column)
                    .ok_or_else(|| corrupted(index, "missing image bytes".to_string()))?;
                let image = decode_image(bytes, registration.image_shape)
                    .map_err(|e| corrupted(index, e.to_string()))?;
                let label = label_of(&row, registration.label_column)
                    .ok_or_else(|| corrupted(index, "missing label".to_string()))?;
                if !classes.contains(label) {
                    return Err(corrupted(
                        index,
                        format!("label {label} outside of 0..{}", classes.num_classes()),
                    ));
                }
                pixels.extend(image.iter());
                labels.push(label);
            }
        }

        let images = Array4::from_shape_vec((labels.len(), height, width, channels), pixels)?;
        log::info!("split {name}: {} examples", labels.len());
        Ok(Self {
            name: name.to_string(),
            images,
            labels: Array1::from_vec(labels),
            image_key: registration.image_column.to_string(),
            label_key: registration.label_column.to_string(),
            as_supervised,
        })
    }

    /// The split name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether records are `(image, label)` pairs
    pub fn as_supervised(&self) -> bool {
        self.as_supervised
    }

    /// All images, `(n, height, width, channels)`
    pub fn images(&self) -> &Array4<u8> {
        &self.images
    }

    /// All labels
    pub fn labels(&self) -> &Array1<i64> {
        &self.labels
    }

    /// The first `n` records in order
    pub fn take(&self, n: usize) -> std::iter::Take<DatasetIterator<'_, Self>> {
        iter(self).take(n)
    }
}

impl Dataset for Split {
    type Item = Record;

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Option<Self::Item> {
        if index >= self.len() {
            return None;
        }
        let image = self.images.index_axis(Axis(0), index).to_owned();
        let label = self.labels[index];
        if self.as_supervised {
            return Some(Record::Pair(image, label));
        }
        let mut features = BTreeMap::new();
        features.insert(self.image_key.clone(), FeatureValue::Image(image));
        features.insert(self.label_key.clone(), FeatureValue::ClassLabel(label));
        Some(Record::Features(features))
    }
}

impl fmt::Debug for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = &self.images.shape()[1..];
        let image_spec = format!("{shape:?}: u8");
        let element_spec = if self.as_supervised {
            format!("({image_spec}, []: i64)")
        } else {
            format!(
                "{{{}: {image_spec}, {}: []: i64}}",
                self.image_key, self.label_key
            )
        };
        f.debug_struct("Split")
            .field("name", &self.name)
            .field("num_examples", &self.len())
            .field("element_spec", &format_args!("{element_spec}"))
            .finish()
    }
}

/// Split name to [`Split`], the handle returned by a load.
#[derive(Default)]
pub struct DatasetDict {
    splits: BTreeMap<String, Split>,
}

impl DatasetDict {
    pub(crate) fn insert(&mut self, split: Split) {
        self.splits.insert(split.name.clone(), split);
    }

    /// Look a split up by name
    pub fn get(&self, name: &str) -> Option<&Split> {
        self.splits.get(name)
    }

    /// Split names in order
    pub fn splits(&self) -> impl Iterator<Item = &str> {
        self.splits.keys().map(String::as_str)
    }

    /// Number of splits
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    /// Whether no split was loaded
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Iterate over `(name, split)` in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Split)> {
        self.splits.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Index<&str> for DatasetDict {
    type Output = Split;

    fn index(&self, name: &str) -> &Split {
        &self.splits[name]
    }
}

impl fmt::Debug for DatasetDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.splits.iter()).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::{resolve, DatasetRequest};
    use crate::features::tests::png;
    use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use std::path::Path;
    use std::sync::Arc;

    const SCHEMA: &str = "
        message schema {
            optional group image {
                optional binary bytes;
                optional binary path (UTF8);
            }
            optional int64 label;
        }
    ";

    /// A directory under the system temp dir, emptied for each test.
    pub(crate) fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hub-datasets-{}-{test}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Write rows shaped like the hub's image datasets.
    pub(crate) fn write_parquet(path: &Path, rows: &[(Vec<u8>, i64)]) {
        let schema = Arc::new(parse_message_type(SCHEMA).unwrap());
        let props = Arc::new(WriterProperties::builder().build());
        let file = File::create(path).unwrap();
        let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();
        let mut row_group = writer.next_row_group().unwrap();

        let bytes: Vec<ByteArray> = rows.iter().map(|(b, _)| ByteArray::from(b.clone())).collect();
        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<ByteArrayType>()
            .write_batch(&bytes, Some(&vec![2; rows.len()]), None)
            .unwrap();
        column.close().unwrap();

        // every path is null: the group is defined, the field is not
        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<ByteArrayType>()
            .write_batch(&[], Some(&vec![1; rows.len()]), None)
            .unwrap();
        column.close().unwrap();

        let labels: Vec<i64> = rows.iter().map(|(_, l)| *l).collect();
        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<Int64Type>()
            .write_batch(&labels, Some(&vec![1; rows.len()]), None)
            .unwrap();
        column.close().unwrap();

        row_group.close().unwrap();
        writer.close().unwrap();
    }

    pub(crate) fn digit_rows(n: usize) -> Vec<(Vec<u8>, i64)> {
        (0..n)
            .map(|i| (png(28, 28, i as u8), (i % 10) as i64))
            .collect()
    }

    fn mnist() -> &'static Registration {
        resolve(&DatasetRequest::parse("mnist").unwrap()).unwrap()
    }

    #[test]
    fn supervised_records() {
        let dir = scratch_dir("supervised_records");
        let path = dir.join("0000.parquet");
        write_parquet(&path, &digit_rows(12));

        let split = Split::from_parquet_files("train", &[path], mnist(), true).unwrap();
        assert_eq!(split.len(), 12);
        assert_eq!(split.images().shape(), &[12, 28, 28, 1]);
        assert!(split.get(12).is_none());

        let mut count = 0;
        for (i, record) in iter(&split).enumerate() {
            let (image, label) = record.as_pair().unwrap();
            assert_eq!(image.shape(), &[28, 28, 1]);
            assert_eq!(image[[0, 0, 0]], i as u8);
            assert_eq!(label, (i % 10) as i64);
            count += 1;
        }
        assert_eq!(count, 12);
        assert_eq!(split.take(5).count(), 5);
    }

    #[test]
    fn feature_records() {
        let dir = scratch_dir("feature_records");
        let path = dir.join("0000.parquet");
        write_parquet(&path, &digit_rows(3));

        let split = Split::from_parquet_files("test", &[path], mnist(), false).unwrap();
        let record = split.get(2).unwrap();
        assert!(record.as_pair().is_none());
        match record {
            Record::Features(features) => {
                assert_eq!(features["label"], FeatureValue::ClassLabel(2));
                assert!(matches!(&features["image"], FeatureValue::Image(i) if i.shape() == &[28, 28, 1]));
            }
            record => panic!("Unexpected {record:?}"),
        }
    }

    #[test]
    fn shards_are_concatenated() {
        let dir = scratch_dir("shards_are_concatenated");
        let first = dir.join("0000.parquet");
        let second = dir.join("0001.parquet");
        write_parquet(&first, &digit_rows(4));
        write_parquet(&second, &digit_rows(6));

        let split = Split::from_parquet_files("train", &[first, second], mnist(), true).unwrap();
        assert_eq!(split.len(), 10);
        assert_eq!(split.labels()[4], 0);
        assert_eq!(split.labels()[9], 5);
    }

    #[test]
    fn out_of_range_label() {
        let dir = scratch_dir("out_of_range_label");
        let path = dir.join("0000.parquet");
        let mut rows = digit_rows(2);
        rows.push((png(28, 28, 0), 10));
        write_parquet(&path, &rows);

        match Split::from_parquet_files("train", &[path], mnist(), true) {
            Err(DatasetError::Corrupted { index, split, .. }) => {
                assert_eq!(index, 2);
                assert_eq!(split, "train");
            }
            other => panic!("Unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn absurd_row_counts() {
        let (pixels, labels) = preallocate("train", 10, (28, 28, 1)).unwrap();
        assert!(pixels.capacity() >= 7_840);
        assert!(labels.capacity() >= 10);

        match preallocate("train", usize::MAX / 2, (28, 28, 1)) {
            Err(err @ DatasetError::Corrupted { .. }) => {
                assert_eq!(err.kind(), crate::ErrorKind::DatasetUnavailable)
            }
            other => panic!("Unexpected {:?}", other.map(|(p, _)| p.capacity())),
        }
        assert!(preallocate("train", usize::MAX / 1_000, (1, 1, 1)).is_err());
    }

    #[test]
    fn not_a_parquet_file() {
        let dir = scratch_dir("not_a_parquet_file");
        let path = dir.join("0000.parquet");
        std::fs::write(&path, b"garbage").unwrap();
        let err = Split::from_parquet_files("train", &[path], mnist(), true).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DatasetUnavailable);
    }

    #[test]
    fn handle_repr() {
        let dir = scratch_dir("handle_repr");
        let path = dir.join("0000.parquet");
        write_parquet(&path, &digit_rows(2));

        let mut dict = DatasetDict::default();
        dict.insert(Split::from_parquet_files("test", &[path], mnist(), true).unwrap());
        assert_eq!(dict.splits().collect::<Vec<_>>(), vec!["test"]);
        assert_eq!(dict["test"].len(), 2);
        assert_eq!(
            format!("{dict:?}"),
            "{\"test\": Split { name: \"test\", num_examples: 2, \
             element_spec: ([28, 28, 1]: u8, []: i64) }}"
        );
    }
}
