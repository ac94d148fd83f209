use crate::catalog::Registration;
use crate::features::FeaturesDict;
use crate::version::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Size and location of one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitInfo {
    /// `train`, `test`...
    pub name: String,
    /// Number of records
    pub num_examples: usize,
    /// Local shards, or remote file names when described without downloading
    pub shard_paths: Vec<PathBuf>,
}

/// Read-only description of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    /// The catalog name
    pub name: String,
    /// The version served
    pub version: Version,
    /// Canonical repository on the hub
    pub repo_id: String,
    /// Short human description
    pub description: String,
    /// Where the dataset comes from
    pub homepage: String,
    /// How to cite it
    pub citation: String,
    /// The declared features of every record
    pub features: FeaturesDict,
    /// `(input, label)` feature names used for supervised pairs
    pub supervised_keys: (String, String),
    /// Splits by name
    pub splits: BTreeMap<String, SplitInfo>,
}

impl DatasetInfo {
    pub(crate) fn new(registration: &Registration, splits: BTreeMap<String, SplitInfo>) -> Self {
        Self {
            name: registration.name.to_string(),
            version: registration.version,
            repo_id: registration.repo_id.to_string(),
            description: registration.description.to_string(),
            homepage: registration.homepage.to_string(),
            citation: registration.citation.to_string(),
            features: FeaturesDict::from_registration(registration),
            supervised_keys: (
                registration.image_column.to_string(),
                registration.label_column.to_string(),
            ),
            splits,
        }
    }

    /// `name/version`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// Total number of records over all splits.
    pub fn num_examples(&self) -> usize {
        self.splits.values().map(|s| s.num_examples).sum()
    }
}

impl fmt::Display for DatasetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DatasetInfo(")?;
        writeln!(f, "    name='{}',", self.name)?;
        writeln!(f, "    full_name='{}',", self.full_name())?;
        writeln!(f, "    description=\"{}\",", self.description)?;
        writeln!(f, "    homepage='{}',", self.homepage)?;
        writeln!(f, "    repo_id='{}',", self.repo_id)?;
        let features = self.features.to_string().replace('\n', "\n    ");
        writeln!(f, "    features={features},")?;
        writeln!(
            f,
            "    supervised_keys=('{}', '{}'),",
            self.supervised_keys.0, self.supervised_keys.1
        )?;
        writeln!(f, "    splits={{")?;
        for (name, split) in &self.splits {
            writeln!(f, "        '{name}': <SplitInfo num_examples={}>,", split.num_examples)?;
        }
        writeln!(f, "    }},")?;
        writeln!(f, "    citation=\"{}\",", self.citation)?;
        write!(f, ")")
    }
}
