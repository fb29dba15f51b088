use anyhow::{Context, Result};
use std::io::Write;

/// Write content atomically: write to temp file, fsync, rename.
pub fn atomic_write(path: &str, content: &[u8]) -> Result<()> {
    let dir = std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(std::path::Path::new("."));
    let temp_path = dir.join(format!(".{}.{}.tmp", std::process::id(), temp_suffix()));

    let mut file = std::fs::File::create(&temp_path)
        .with_context(|| format!("cannot create temp file for {path}"))?;
    file.write_all(content)
        .with_context(|| format!("cannot write temp file for {path}"))?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(err).with_context(|| format!("cannot rename temp to {path}"));
    }
    Ok(())
}

fn temp_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{nanos:x}")
}
