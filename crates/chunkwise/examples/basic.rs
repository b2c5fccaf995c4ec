use std::path::Path;

use chunkwise::{
    chunkwise, log::enable_tracing_by_env, InputItem, NormalizedInputOptions,
    NormalizedOutputOptions, ScanTransform,
};
use sugar_path::SugarPath;

#[tokio::main]
async fn main() {
    enable_tracing_by_env();
    let root = Path::new("./examples/basic-app").resolve();
    let mut compiler = chunkwise(NormalizedInputOptions {
        input: vec![
            InputItem::new("main", "./src/index.js"),
            InputItem::new("admin", "./src/admin.js"),
        ],
        root: root.clone(),
        ..Default::default()
    })
    .with_transform(ScanTransform::new());

    let output = compiler
        .write(&NormalizedOutputOptions {
            dir: root.join("dist"),
            ..Default::default()
        })
        .await
        .unwrap();

    for asset in &output.assets {
        println!("{:<40} {:>6} bytes  {}", asset.file_name, asset.bytes.len(), asset.name);
    }
}
