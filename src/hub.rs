//! Access to the parquet conversion of a dataset repository on the hub.
use crate::DatasetError;
use hf_hub::{
    api::tokio::{Api, ApiError},
    Cache, Repo, RepoType,
};
use parquet2::{metadata::FileMetaData, read::deserialize_metadata};
use reqwest::header::{CONTENT_RANGE, RANGE};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// When fetching parquet metadata, we fetch more than the last 8 bytes
/// in order to optimize round trips if the metadata is small enough
/// A very minimal metadata is 2kB, so 100kB covers most small datasets while
/// it should be minimal overhead of modern connections
const PARQUET_METADATA_MIN_SIZE: usize = 100_000;

const PARQUET_MAGIC: [u8; 4] = [b'P', b'A', b'R', b'1'];

/// The revision where the hub keeps the parquet conversion of every dataset.
pub const PARQUET_REVISION: &str = "refs/convert/parquet";

/// The core struct used to interact with a dataset repository
pub struct HubDataset {
    api: Api,
    cache: Cache,
    id: String,
    repo: Repo,
}

impl HubDataset {
    /// The id is the canonical hub name: you can look for names on the [hub](https://huggingface.co/datasets)
    pub fn new(api: Api, cache: Cache, id: &str) -> Self {
        let repo = Repo::with_revision(
            id.to_string(),
            RepoType::Dataset,
            PARQUET_REVISION.to_string(),
        );
        Self {
            api,
            cache,
            id: id.to_string(),
            repo,
        }
    }

    /// The repository id on the hub.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lists the available parquet files on the remote.
    pub async fn remote_files(&self) -> Result<Vec<String>, ApiError> {
        let info = self.api.repo(self.repo.clone()).info().await?;
        let mut filenames = Vec::with_capacity(info.siblings.len());
        for sibling in info.siblings {
            if sibling.rfilename.ends_with(".parquet") {
                filenames.push(sibling.rfilename);
            }
        }
        Ok(filenames)
    }

    /// Remote parquet files of `config`, grouped by split and sorted.
    pub async fn remote_split_files(
        &self,
        config: &str,
    ) -> Result<BTreeMap<String, Vec<String>>, ApiError> {
        let mut splits: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for rfilename in self.remote_files().await? {
            if let Some(split) = split_of(config, &rfilename) {
                splits.entry(split).or_default().push(rfilename);
            }
        }
        for files in splits.values_mut() {
            files.sort();
        }
        Ok(splits)
    }

    /// Fetches only the footer of a remote parquet file.
    pub async fn parquet_metadata(
        &self,
        remote_filename: &str,
    ) -> Result<FileMetaData, DatasetError> {
        let url = self.api.repo(self.repo.clone()).url(remote_filename);
        let response = self
            .api
            .client()
            .get(&url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?
            .error_for_status()?;
        let headers = response.headers();
        let content_range = headers
            .get(CONTENT_RANGE)
            .ok_or(ApiError::MissingHeader(CONTENT_RANGE))?
            .to_str()?;

        let size: usize = content_range
            .split('/')
            .last()
            .ok_or(ApiError::InvalidHeader(CONTENT_RANGE))?
            .parse()?;
        if size < PARQUET_MAGIC.len() * 2 + 4 {
            return Err(DatasetError::InvalidParquetMagic);
        }

        let start = size.saturating_sub(PARQUET_METADATA_MIN_SIZE);
        let response = self
            .api
            .client()
            .get(&url)
            .header(RANGE, format!("bytes={start}-{}", size - 1))
            .send()
            .await?
            .error_for_status()?;
        let buffer = response.bytes().await?;
        let metadata = match locate_footer(&buffer, size)? {
            Footer::Fetched(footer) => {
                deserialize_metadata(footer, max_metadata_size(footer.len()))?
            }
            Footer::Missing { start, stop } => {
                log::debug!(
                    "footer of {remote_filename} is {} bytes, fetching it",
                    stop + 1 - start
                );
                let response = self
                    .api
                    .client()
                    .get(&url)
                    .header(RANGE, format!("bytes={start}-{stop}"))
                    .send()
                    .await?
                    .error_for_status()?;
                let footer = response.bytes().await?;
                deserialize_metadata(&footer[..], max_metadata_size(footer.len()))?
            }
        };

        Ok(metadata)
    }

    /// Downloads (or reuses from the cache) the parquet files of `splits`
    /// in `config`. Every requested split must be listed on the remote.
    pub async fn download_split_files(
        &self,
        config: &str,
        splits: &[&str],
    ) -> Result<BTreeMap<String, Vec<PathBuf>>, DatasetError> {
        let listing = self.remote_split_files(config).await?;
        let selected = select_splits(&self.id, listing, splits)?;
        let repo = self.api.repo(self.repo.clone());
        let mut files = BTreeMap::new();
        for (split, rfilenames) in selected {
            let mut filenames = Vec::with_capacity(rfilenames.len());
            for rfilename in rfilenames {
                log::debug!("fetching {rfilename}");
                filenames.push(repo.get(&rfilename).await?);
            }
            files.insert(split, filenames);
        }
        Ok(files)
    }

    /// Resolves the default shard layout from the local cache only.
    pub fn cached_split_files(
        &self,
        config: &str,
        splits: &[&str],
    ) -> Result<BTreeMap<String, Vec<PathBuf>>, DatasetError> {
        let cache = self.cache.repo(self.repo.clone());
        let mut files = BTreeMap::new();
        for split in splits {
            let rfilename = format!("{config}/{split}/0000.parquet");
            let path = cache.get(&rfilename).ok_or_else(|| {
                DatasetError::unavailable(
                    self.id(),
                    format!("{rfilename} is not in the local cache"),
                )
            })?;
            files.insert(split.to_string(), vec![path]);
        }
        Ok(files)
    }
}

/// Maps a `config/split/0000.parquet` path of the conversion to its split name.
pub fn split_of(config: &str, rfilename: &str) -> Option<String> {
    let rest = rfilename.strip_suffix(".parquet")?;
    let mut parts = rest.split('/');
    if parts.next()? != config {
        return None;
    }
    let split = parts.next()?;
    let _shard = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(split.to_string())
}

/// Keep the listed files of `wanted`, failing if one of them is not listed.
pub fn select_splits(
    id: &str,
    mut listing: BTreeMap<String, Vec<String>>,
    wanted: &[&str],
) -> Result<BTreeMap<String, Vec<String>>, DatasetError> {
    let mut selected = BTreeMap::new();
    for split in wanted {
        let files = listing
            .remove(*split)
            .filter(|files| !files.is_empty())
            .ok_or_else(|| {
                DatasetError::unavailable(id, format!("no parquet files for split {split}"))
            })?;
        selected.insert(split.to_string(), files);
    }
    Ok(selected)
}

/// Where the footer of a parquet file is, given the tail of the file.
#[derive(Debug, PartialEq, Eq)]
pub enum Footer<'a> {
    /// The tail already contains the whole footer
    Fetched(&'a [u8]),
    /// The footer starts before the tail, fetch the inclusive byte range
    Missing {
        /// First byte of the footer
        start: usize,
        /// Last byte of the footer
        stop: usize,
    },
}

/// Locate the footer from `tail`, the last bytes of a `size` bytes file.
pub fn locate_footer(tail: &[u8], size: usize) -> Result<Footer<'_>, DatasetError> {
    let len = tail.len();
    if len < 8 || len > size || tail[len - 4..] != PARQUET_MAGIC {
        return Err(DatasetError::InvalidParquetMagic);
    }
    let mut footer_len = [0u8; 4];
    footer_len.copy_from_slice(&tail[len - 8..len - 4]);
    let footer_len: usize = i32::from_le_bytes(footer_len).try_into()?;

    // the file starts with the magic too
    let available = size.saturating_sub(8 + PARQUET_MAGIC.len());
    if footer_len > available {
        return Err(DatasetError::InvalidParquetFooter { footer_len, size });
    }
    if footer_len <= len - 8 {
        Ok(Footer::Fetched(&tail[len - 8 - footer_len..len - 8]))
    } else {
        Ok(Footer::Missing {
            start: size - 8 - footer_len,
            stop: size - 9,
        })
    }
}

// a highly nested but sparse struct could result in many allocations
fn max_metadata_size(footer_len: usize) -> usize {
    footer_len * 2 + 1024
}
