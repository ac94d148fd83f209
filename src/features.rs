//! Feature declarations and the decoding of raw parquet values into them.
use crate::catalog::Registration;
use crate::DatasetError;
use ndarray::{Array3, ErrorKind as ShapeErrorKind, ShapeError};
use parquet2::metadata::SchemaDescriptor;
use parquet2::schema::types::PhysicalType;
use std::collections::BTreeMap;
use std::fmt;

/// A categorical label with named classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabel {
    names: Vec<String>,
}

impl ClassLabel {
    /// Create from the class names, indexed by label.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// All class names, indexed by label
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of `label`, `None` if out of range.
    pub fn int2str(&self, label: i64) -> Option<&str> {
        usize::try_from(label)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Label of `name`, `None` if unknown.
    pub fn str2int(&self, name: &str) -> Option<i64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| i64::try_from(i).ok())
    }

    /// Whether `label` is one of the classes
    pub fn contains(&self, label: i64) -> bool {
        self.int2str(label).is_some()
    }
}

/// A declared feature of every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    /// An `u8` image of fixed `(height, width, channels)`
    Image {
        /// `(height, width, channels)`
        shape: (usize, usize, usize),
    },
    /// A scalar `i64` class label
    ClassLabel(ClassLabel),
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Image { shape: (h, w, c) } => {
                write!(f, "Image(shape=({h}, {w}, {c}), dtype=uint8)")
            }
            Feature::ClassLabel(label) => write!(
                f,
                "ClassLabel(shape=(), dtype=int64, num_classes={})",
                label.num_classes()
            ),
        }
    }
}

/// The named features of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturesDict {
    features: BTreeMap<String, Feature>,
}

impl FeaturesDict {
    /// The `image` and `label` features of a registered dataset.
    pub fn from_registration(registration: &Registration) -> Self {
        let mut features = BTreeMap::new();
        features.insert(
            registration.image_column.to_string(),
            Feature::Image {
                shape: registration.image_shape,
            },
        );
        features.insert(
            registration.label_column.to_string(),
            Feature::ClassLabel(ClassLabel::new(registration.class_names.iter().copied())),
        );
        Self { features }
    }

    /// Look a feature up by name
    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    /// Iterate over `(name, feature)` in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The first class label feature, if any.
    pub fn class_label(&self) -> Option<&ClassLabel> {
        self.features.values().find_map(|f| match f {
            Feature::ClassLabel(label) => Some(label),
            _ => None,
        })
    }
}

impl fmt::Display for FeaturesDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FeaturesDict({{")?;
        for (name, feature) in &self.features {
            writeln!(f, "    '{name}': {feature},")?;
        }
        write!(f, "}})")
    }
}

/// A decoded feature value.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    /// Pixels in `(height, width, channels)` order
    Image(Array3<u8>),
    /// The class index
    ClassLabel(i64),
}

/// Decode an encoded image (PNG) into `shape`.
pub fn decode_image(bytes: &[u8], shape: (usize, usize, usize)) -> Result<Array3<u8>, DatasetError> {
    let (height, width, channels) = shape;
    let image = image::load_from_memory(bytes)?;
    if image.height() as usize != height || image.width() as usize != width {
        return Err(ShapeError::from_kind(ShapeErrorKind::IncompatibleShape).into());
    }
    let raw = match channels {
        1 => image.to_luma8().into_raw(),
        3 => image.to_rgb8().into_raw(),
        _ => return Err(ShapeError::from_kind(ShapeErrorKind::Unsupported).into()),
    };
    Ok(Array3::from_shape_vec(shape, raw)?)
}

/// Check that a parquet footer carries the image and label columns of
/// `registration`.
pub fn validate_schema(
    file: &str,
    schema: &SchemaDescriptor,
    registration: &Registration,
) -> Result<(), DatasetError> {
    let mismatch = |reason: String| DatasetError::SchemaMismatch {
        file: file.to_string(),
        reason,
    };
    let find = |path: &[&str]| {
        schema
            .columns()
            .iter()
            .find(|c| c.path_in_schema.iter().map(String::as_str).eq(path.iter().copied()))
    };

    let image = find(&[registration.image_column, "bytes"]).ok_or_else(|| {
        mismatch(format!("missing column {}.bytes", registration.image_column))
    })?;
    if image.descriptor.primitive_type.physical_type != PhysicalType::ByteArray {
        return Err(mismatch(format!(
            "{}.bytes is not binary",
            registration.image_column
        )));
    }

    let label = find(&[registration.label_column])
        .ok_or_else(|| mismatch(format!("missing column {}", registration.label_column)))?;
    match label.descriptor.primitive_type.physical_type {
        PhysicalType::Int32 | PhysicalType::Int64 => Ok(()),
        other => Err(mismatch(format!(
            "{} is {other:?}, expected an integer",
            registration.label_column
        ))),
    }
}
