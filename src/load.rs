//! Requesting a registered dataset by name.
use crate::catalog::{resolve, DatasetRequest, Registration};
use crate::features::validate_schema;
use crate::hub::{select_splits, HubDataset};
use crate::info::{DatasetInfo, SplitInfo};
use crate::split::{Dataset, DatasetDict, Split};
use crate::DatasetError;
use hf_hub::{api::tokio::ApiBuilder, Cache};
use std::collections::BTreeMap;
use std::path::PathBuf;

type SplitFiles = BTreeMap<String, Vec<PathBuf>>;

/// Falls back to `cached` when the hub could not be reached. Any other
/// failure (a split missing from the listing, a bad file) is kept.
fn or_cached<F>(
    downloaded: Result<SplitFiles, DatasetError>,
    id: &str,
    cached: F,
) -> Result<SplitFiles, DatasetError>
where
    F: FnOnce() -> Result<SplitFiles, DatasetError>,
{
    match downloaded {
        Err(DatasetError::ApiError(err)) => {
            log::warn!("cannot reach {id} ({err}), falling back to the local cache");
            cached()
        }
        other => other,
    }
}

/// How a dataset should be loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    with_info: bool,
    as_supervised: bool,
    data_dir: Option<PathBuf>,
    download: bool,
    progress: bool,
    split: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            with_info: false,
            as_supervised: false,
            data_dir: None,
            download: true,
            progress: false,
            split: None,
        }
    }
}

impl LoadOptions {
    /// Default options: every split, feature records, no info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also return the [`DatasetInfo`]
    pub fn with_info(mut self, with_info: bool) -> Self {
        self.with_info = with_info;
        self
    }

    /// Return `(image, label)` pairs instead of feature maps
    pub fn as_supervised(mut self, as_supervised: bool) -> Self {
        self.as_supervised = as_supervised;
        self
    }

    /// Use `data_dir` as the hub cache instead of the default one
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// When `false`, only files already in the cache are used
    pub fn download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    /// Show download progress bars
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Load a single split
    pub fn split(mut self, split: impl Into<String>) -> Self {
        self.split = Some(split.into());
        self
    }
}

/// A resolved dataset, ready to be described or materialized.
pub struct DatasetBuilder {
    registration: &'static Registration,
    hub: HubDataset,
    options: LoadOptions,
}

/// Resolve `name` (`mnist`, `mnist:3.*.*`) without fetching anything.
pub fn builder(name: &str, options: &LoadOptions) -> Result<DatasetBuilder, DatasetError> {
    let request = DatasetRequest::parse(name)?;
    let registration = resolve(&request)?;
    if let Some(split) = &options.split {
        if !registration.splits.contains(&split.as_str()) {
            return Err(DatasetError::UnknownSplit {
                name: registration.name.to_string(),
                split: split.clone(),
                available: registration.splits.iter().map(|s| s.to_string()).collect(),
            });
        }
    }

    let mut api = ApiBuilder::new().with_progress(options.progress);
    let cache = match &options.data_dir {
        Some(data_dir) => {
            api = api.with_cache_dir(data_dir.clone());
            Cache::new(data_dir.clone())
        }
        None => Cache::default(),
    };
    let hub = HubDataset::new(api.build()?, cache, registration.repo_id);
    Ok(DatasetBuilder {
        registration,
        hub,
        options: options.clone(),
    })
}

/// Load `name` as a split-name → split mapping, and its info when
/// `with_info` was requested.
pub async fn load(
    name: &str,
    options: &LoadOptions,
) -> Result<(DatasetDict, Option<DatasetInfo>), DatasetError> {
    builder(name, options)?.as_dataset().await
}

impl DatasetBuilder {
    /// The registry entry this builder was resolved to
    pub fn registration(&self) -> &'static Registration {
        self.registration
    }

    fn wanted_splits(&self) -> Vec<&str> {
        match &self.options.split {
            Some(split) => vec![split.as_str()],
            None => self.registration.splits.to_vec(),
        }
    }

    /// Describe the dataset from the remote parquet footers, without
    /// downloading the data.
    pub async fn info_from_remote(&self) -> Result<DatasetInfo, DatasetError> {
        let wanted = self.wanted_splits();
        let listing = self.hub.remote_split_files(self.registration.config).await?;
        let mut splits = BTreeMap::new();
        for (name, rfilenames) in select_splits(self.hub.id(), listing, &wanted)? {
            let mut num_examples = 0;
            for rfilename in &rfilenames {
                let metadata = self.hub.parquet_metadata(rfilename).await?;
                validate_schema(rfilename, metadata.schema(), self.registration)?;
                num_examples += metadata.num_rows;
            }
            let shard_paths = rfilenames.into_iter().map(PathBuf::from).collect();
            splits.insert(
                name.clone(),
                SplitInfo {
                    name,
                    num_examples,
                    shard_paths,
                },
            );
        }
        Ok(DatasetInfo::new(self.registration, splits))
    }

    async fn split_files(&self) -> Result<SplitFiles, DatasetError> {
        let wanted = self.wanted_splits();
        let config = self.registration.config;
        if !self.options.download {
            return self.hub.cached_split_files(config, &wanted);
        }
        let downloaded = self.hub.download_split_files(config, &wanted).await;
        or_cached(downloaded, self.hub.id(), || {
            self.hub.cached_split_files(config, &wanted)
        })
    }

    /// Fetch (or reuse from the cache) and decode every requested split.
    pub async fn as_dataset(&self) -> Result<(DatasetDict, Option<DatasetInfo>), DatasetError> {
        log::info!(
            "loading {}/{} from {}",
            self.registration.name,
            self.registration.version,
            self.hub.id()
        );
        let files = self.split_files().await?;

        let mut dataset = DatasetDict::default();
        let mut splits = BTreeMap::new();
        for (name, paths) in files {
            let split = Split::from_parquet_files(
                &name,
                &paths,
                self.registration,
                self.options.as_supervised,
            )?;
            splits.insert(
                name.clone(),
                SplitInfo {
                    name,
                    num_examples: split.len(),
                    shard_paths: paths,
                },
            );
            dataset.insert(split);
        }

        let info = self
            .options
            .with_info
            .then(|| DatasetInfo::new(self.registration, splits));
        Ok((dataset, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::iter;
    use crate::split::tests::{digit_rows, scratch_dir, write_parquet};
    use crate::ErrorKind;
    use hf_hub::api::tokio::ApiError;
    use std::path::Path;

    /// Lay out `data_dir` the way the hub client caches the parquet conversion.
    fn fake_cache(data_dir: &Path, sizes: &[(&str, usize)]) {
        let repo = data_dir.join("datasets--ylecun--mnist");
        let refs = repo.join("refs").join("refs").join("convert");
        std::fs::create_dir_all(&refs).unwrap();
        std::fs::write(refs.join("parquet"), "0123456789abcdef").unwrap();
        for (split, size) in sizes {
            let dir = repo
                .join("snapshots")
                .join("0123456789abcdef")
                .join("mnist")
                .join(split);
            std::fs::create_dir_all(&dir).unwrap();
            write_parquet(&dir.join("0000.parquet"), &digit_rows(*size));
        }
    }

    #[test]
    fn default_options() {
        let options = LoadOptions::new();
        assert!(!options.with_info);
        assert!(!options.as_supervised);
        assert!(options.download);
        assert_eq!(options.split, None);
    }

    #[tokio::test]
    async fn unknown_dataset() {
        let options = LoadOptions::new().with_info(true).as_supervised(true);
        let err = load("not_a_real_dataset", &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatasetUnavailable);
    }

    #[tokio::test]
    async fn pinned_version() {
        let options = LoadOptions::new().with_info(true).as_supervised(true);
        let err = load("mnist:2.*.*", &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleVersion);
    }

    #[test]
    fn unknown_split() {
        let options = LoadOptions::new().split("validation");
        match builder("mnist", &options) {
            Err(DatasetError::UnknownSplit { split, available, .. }) => {
                assert_eq!(split, "validation");
                assert_eq!(available, vec!["train", "test"]);
            }
            Err(err) => panic!("Unexpected {err:?}"),
            Ok(_) => panic!("Expected an unknown split"),
        }
    }

    #[tokio::test]
    async fn load_from_cache() {
        let data_dir = scratch_dir("load_from_cache");
        fake_cache(&data_dir, &[("train", 20), ("test", 5)]);
        let options = LoadOptions::new()
            .with_info(true)
            .as_supervised(true)
            .download(false)
            .data_dir(&data_dir);

        let (dataset, info) = load("mnist", &options).await.unwrap();
        assert_eq!(dataset.splits().collect::<Vec<_>>(), vec!["test", "train"]);
        assert_eq!(dataset["train"].len(), 20);
        assert_eq!(dataset["test"].len(), 5);
        for (_, split) in dataset.iter() {
            for record in iter(split) {
                let (image, label) = record.into_pair().unwrap();
                assert_eq!(image.shape(), &[28, 28, 1]);
                assert!((0..=9).contains(&label));
            }
        }

        let info = info.unwrap();
        assert_eq!(info.full_name(), "mnist/3.0.1");
        assert_eq!(info.splits["train"].num_examples, 20);
        assert_eq!(info.splits["test"].num_examples, 5);

        // same request, same shape
        let (again, info) = load("mnist", &options).await.unwrap();
        assert!(info.is_some());
        assert_eq!(again.len(), dataset.len());
        assert_eq!(again["train"].len(), 20);
    }

    #[tokio::test]
    async fn single_split_without_info() {
        let data_dir = scratch_dir("single_split_without_info");
        fake_cache(&data_dir, &[("train", 3), ("test", 2)]);
        let options = LoadOptions::new()
            .download(false)
            .data_dir(&data_dir)
            .split("test");

        let (dataset, info) = load("mnist", &options).await.unwrap();
        assert!(info.is_none());
        assert_eq!(dataset.splits().collect::<Vec<_>>(), vec!["test"]);
        assert!(dataset["test"].get(0).unwrap().as_pair().is_none());
    }

    #[tokio::test]
    async fn empty_cache() {
        let data_dir = scratch_dir("empty_cache");
        let options = LoadOptions::new().download(false).data_dir(&data_dir);
        let err = load("mnist", &options).await.unwrap_err();
        assert!(matches!(err, DatasetError::DatasetUnavailable { .. }));
    }

    #[test]
    fn unreachable_hub_uses_cache() {
        let cached = || {
            let mut files = SplitFiles::new();
            files.insert("test".to_string(), vec![PathBuf::from("test.parquet")]);
            Ok(files)
        };
        let unreachable = Err(DatasetError::ApiError(ApiError::MissingHeader(
            reqwest::header::CONTENT_RANGE,
        )));
        let files = or_cached(unreachable, "ylecun/mnist", cached).unwrap();
        assert_eq!(files["test"], vec![PathBuf::from("test.parquet")]);
    }

    #[test]
    fn listing_errors_are_kept() {
        let missing = Err(DatasetError::unavailable(
            "ylecun/mnist",
            "no parquet files for split test",
        ));
        let err = or_cached(missing, "ylecun/mnist", || {
            panic!("the cache must not be consulted")
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatasetUnavailable);

        let downloaded = Ok(SplitFiles::new());
        let files = or_cached(downloaded, "ylecun/mnist", || {
            panic!("the cache must not be consulted")
        })
        .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn download_falls_back_to_cache() {
        let data_dir = scratch_dir("download_falls_back_to_cache");
        fake_cache(&data_dir, &[("train", 4), ("test", 3)]);
        let options = LoadOptions::new()
            .with_info(true)
            .as_supervised(true)
            .data_dir(&data_dir);

        // offline this comes from the cache, online from the hub
        let (dataset, info) = load("mnist", &options).await.unwrap();
        assert!(info.is_some());
        assert_eq!(dataset.splits().collect::<Vec<_>>(), vec!["test", "train"]);
        for (_, split) in dataset.iter() {
            assert!(!split.is_empty());
            assert!(split.get(0).unwrap().as_pair().is_some());
        }
    }

    #[tokio::test]
    #[ignore = "requires network access to the hub"]
    async fn mnist_end_to_end() {
        let options = LoadOptions::new().with_info(true).as_supervised(true);
        let (dataset, info) = load("mnist", &options).await.unwrap();
        let info = info.unwrap();
        assert_eq!(dataset["train"].len(), 60_000);
        assert_eq!(dataset["test"].len(), 10_000);
        assert_eq!(info.splits["train"].num_examples, 60_000);
        for record in dataset["train"].take(100) {
            let (image, label) = record.into_pair().unwrap();
            assert_eq!(image.shape(), &[28, 28, 1]);
            assert!((0..=9).contains(&label));
        }
        assert!(dataset["test"]
            .labels()
            .iter()
            .all(|label| (0..=9).contains(label)));
    }

    #[tokio::test]
    #[ignore = "requires network access to the hub"]
    async fn mnist_remote_info() {
        let info = builder("mnist", &LoadOptions::new())
            .unwrap()
            .info_from_remote()
            .await
            .unwrap();
        assert_eq!(info.splits["train"].num_examples, 60_000);
        assert_eq!(info.splits["test"].num_examples, 10_000);
    }

    #[tokio::test]
    #[ignore = "requires network access to the hub"]
    async fn single_split_download() {
        let data_dir = scratch_dir("single_split_download");
        let options = LoadOptions::new().data_dir(&data_dir).split("test");
        let (dataset, _) = load("mnist", &options).await.unwrap();
        assert_eq!(dataset["test"].len(), 10_000);
        let cached = data_dir.join("datasets--ylecun--mnist").join("snapshots");
        let train_shards = std::fs::read_dir(&cached)
            .unwrap()
            .flatten()
            .filter(|snapshot| snapshot.path().join("mnist").join("train").exists())
            .count();
        assert_eq!(train_shards, 0);
    }
}
