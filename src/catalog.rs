//! The registry of datasets that can be requested by name.
use crate::version::{Version, VersionPattern};
use crate::DatasetError;

const DIGIT_NAMES: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

const FASHION_NAMES: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

/// Everything needed to fetch and describe a registered dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The catalog name, `mnist`
    pub name: &'static str,
    /// The version served for this name
    pub version: Version,
    /// Canonical repository on the [hub](https://huggingface.co/datasets)
    pub repo_id: &'static str,
    /// The config directory inside the parquet conversion
    pub config: &'static str,
    /// Splits the dataset is published with
    pub splits: &'static [&'static str],
    /// `(height, width, channels)` of every image
    pub image_shape: (usize, usize, usize),
    /// Parquet column holding the encoded image struct
    pub image_column: &'static str,
    /// Parquet column holding the integer label
    pub label_column: &'static str,
    /// One name per class, indexed by label
    pub class_names: &'static [&'static str],
    /// Short human description
    pub description: &'static str,
    /// Where the dataset comes from
    pub homepage: &'static str,
    /// How to cite it
    pub citation: &'static str,
}

static REGISTRY: [Registration; 2] = [
    Registration {
        name: "mnist",
        version: Version::new(3, 0, 1),
        repo_id: "ylecun/mnist",
        config: "mnist",
        splits: &["train", "test"],
        image_shape: (28, 28, 1),
        image_column: "image",
        label_column: "label",
        class_names: &DIGIT_NAMES,
        description: "The MNIST database of handwritten digits.",
        homepage: "http://yann.lecun.com/exdb/mnist/",
        citation: "LeCun, Y., Cortes, C. & Burges, C. The MNIST database of handwritten digits (2010)",
    },
    Registration {
        name: "fashion_mnist",
        version: Version::new(3, 0, 1),
        repo_id: "zalando-datasets/fashion_mnist",
        config: "fashion_mnist",
        splits: &["train", "test"],
        image_shape: (28, 28, 1),
        image_column: "image",
        label_column: "label",
        class_names: &FASHION_NAMES,
        description: "Fashion-MNIST is a dataset of Zalando's article images, \
                      a drop-in replacement for MNIST.",
        homepage: "https://github.com/zalandoresearch/fashion-mnist",
        citation: "Xiao, H., Rasul, K. & Vollgraf, R. Fashion-MNIST (2017), arXiv:1708.07747",
    },
];

/// Names of every registered dataset, sorted.
pub fn list_builders() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.iter().map(|r| r.name).collect();
    names.sort_unstable();
    names
}

/// A parsed `name[:version]` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRequest {
    /// The catalog name
    pub name: String,
    /// Optional pinned version
    pub version: Option<VersionPattern>,
}

impl DatasetRequest {
    /// Parse `mnist`, `mnist:3.0.1` or `mnist:3.*.*`.
    pub fn parse(request: &str) -> Result<Self, DatasetError> {
        let (name, version) = match request.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (request, None),
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(DatasetError::unavailable(request, "empty dataset name"));
        }
        let version = version
            .map(|v| {
                v.parse::<VersionPattern>()
                    .map_err(|_| DatasetError::IncompatibleVersion {
                        name: name.to_string(),
                        requested: v.to_string(),
                        available: available_version(name),
                    })
            })
            .transpose()?;
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

fn available_version(name: &str) -> String {
    REGISTRY
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.version.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Look a request up in the registry.
pub fn resolve(request: &DatasetRequest) -> Result<&'static Registration, DatasetError> {
    let registration = REGISTRY
        .iter()
        .find(|r| r.name == request.name)
        .ok_or_else(|| {
            DatasetError::unavailable(
                &request.name,
                format!("not registered, choose from {:?}", list_builders()),
            )
        })?;
    if let Some(pattern) = &request.version {
        if !pattern.matches(&registration.version) {
            return Err(DatasetError::IncompatibleVersion {
                name: request.name.clone(),
                requested: pattern.to_string(),
                available: registration.version.to_string(),
            });
        }
    }
    Ok(registration)
}
