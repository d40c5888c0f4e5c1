use std::fs;
use std::io::Read;

use sha1::{Digest, Sha1};

pub const ROOT: &str = "launcher";
pub const RUNTIME_ROOT: &str = "launcher/runtime";

/// Create the data directories the daemon writes into.
pub fn init_dirs() -> std::io::Result<()> {
    fs::create_dir_all(ROOT)?;
    fs::create_dir_all(RUNTIME_ROOT)?;
    Ok(())
}

pub async fn get_sha1(path: &str) -> anyhow::Result<String> {
    let path = path.to_string();
    tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let mut hasher = Sha1::new();
        let mut file = fs::File::options().read(true).open(path)?;
        let mut buffer = [0; 32768];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await?
}
