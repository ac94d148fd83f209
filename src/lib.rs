#![deny(missing_docs)]
//! This crate is a small dataset catalog in the spirit of
//! [tensorflow-datasets](https://www.tensorflow.org/datasets): datasets are requested by
//! their registered name and come back as a mapping of split names to records.
//!
//! The data itself is the parquet conversion the [hub](https://huggingface.co/datasets)
//! keeps for every dataset, downloaded once into the local hub cache.
//!
//! ```no_run
//! # async fn run() -> Result<(), hub_datasets::DatasetError> {
//! use hub_datasets::{load, Dataset, LoadOptions};
//!
//! let options = LoadOptions::new().with_info(true).as_supervised(true);
//! let (mnist, info) = load("mnist", &options).await?;
//! assert_eq!(mnist["test"].len(), 10_000);
//! println!("{}", info.unwrap());
//! # Ok(())
//! # }
//! ```
pub mod catalog;
mod error;
pub mod features;
pub mod hub;
mod info;
mod load;
pub mod split;
pub mod version;

pub use catalog::list_builders;
pub use error::{DatasetError, ErrorKind};
pub use info::{DatasetInfo, SplitInfo};
pub use load::{builder, load, DatasetBuilder, LoadOptions};
pub use split::{iter, Dataset, DatasetDict, DatasetIterator, Record, Split};
