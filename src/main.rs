use std::sync::Arc;

use yase::{BufferPool, DiskPageFile, PageFile, SkipList, Table};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let root = std::env::temp_dir().join("yase-demo");
    let pool = Arc::new(BufferPool::new(16));

    let data_file: Arc<dyn PageFile> = Arc::new(DiskPageFile::new(1, root.join("data"))?);
    let dir_file: Arc<dyn PageFile> = Arc::new(DiskPageFile::new(2, root.join("dir"))?);
    pool.register_file(data_file);
    pool.register_file(dir_file);

    let table = Table::new(pool, 1, 2);
    let index = SkipList::new(4, 16);

    for (n, word) in ["yase", "skip", "list", "page"].iter().enumerate() {
        let rid = table
            .insert(word.as_bytes())
            .expect("demo pool should never be exhausted");
        index.insert((n as u32).to_be_bytes().to_vec(), rid);
        log::info!("inserted {word:?} at {rid}");
    }

    for (key, rid) in index.forward_scan(None, true, None) {
        let record = table.read(rid).expect("record must exist");
        let len = record.iter().position(|&b| b == 0).unwrap_or(record.len());
        log::info!(
            "key={:?} rid={rid} record={:?}",
            u32::from_be_bytes(key.try_into().unwrap()),
            std::str::from_utf8(&record[..len]).unwrap_or("<binary>")
        );
    }

    Ok(())
}
