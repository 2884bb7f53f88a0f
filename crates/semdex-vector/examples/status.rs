use semdex_core::config::Config;
use semdex_core::traits::IndexStore;
use semdex_vector::open_store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    let store = open_store(&settings).await?;
    println!("index: {} (table '{}', dim {})", settings.index_uri().display(), settings.index.table, store.dim());
    let mut total = 0usize;
    for (name, root) in settings.roots() {
        let n = store.count(&name).await?;
        total += n;
        println!("{:<16} {:>8} chunks  {}", name, n, root.display());
    }
    println!("total: {} chunks", total);
    Ok(())
}
