use hub_datasets::{load, DatasetError, LoadOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), DatasetError> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let options = LoadOptions::new().with_info(true).as_supervised(true);
    let (mnist_dataset, _mnist_info) = load("mnist", &options).await?;

    println!("{mnist_dataset:?}");
    Ok(())
}
