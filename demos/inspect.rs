use hub_datasets::{builder, list_builders, LoadOptions};

#[tokio::main]
async fn main() {
    env_logger::init();
    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| panic!("Give a dataset name, choose from {:?}", list_builders()));

    let builder = builder(&name, &LoadOptions::new()).unwrap();
    let info = builder.info_from_remote().await.unwrap();
    println!("{info}");
    for (split, split_info) in &info.splits {
        println!("");
        println!("--{}/{split}--", builder.registration().config);
        for shard in &split_info.shard_paths {
            println!("Filename: {}", shard.display());
        }
        println!("Count: {}", split_info.num_examples);
    }
}
