use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{
    config::{Config, WatchMapping},
    error::Error,
    magnet, series, AlistClient,
};

/// One pass over every watch directory. Returns how many files were archived.
pub async fn run_cycle(client: &AlistClient, config: &Config) -> usize {
    let mut archived = 0;
    for mapping in config.watch.iter() {
        match scan_dir(client, config, mapping).await {
            Ok(n) => archived += n,
            Err(e) => error!("[{}] scan failed: {e:#}", mapping.category),
        }
    }
    archived
}

/// Processes every descriptor file currently in `mapping.local`.
pub async fn scan_dir(client: &AlistClient, config: &Config, mapping: &WatchMapping) -> Result<usize> {
    let tag = format!("[{}]", mapping.category);
    if tokio::fs::metadata(&mapping.local).await.is_err() {
        warn!("{tag} watch directory missing, skipped: {}", mapping.local.display());
        return Ok(0);
    }
    tokio::fs::create_dir_all(&config.processed_dir)
        .await
        .with_context(|| format!("cannot create {}", config.processed_dir.display()))?;

    let mut archived = 0;
    for path in list_files(&mapping.local, &config.processed_dir).await? {
        let filename = file_name(&path);
        info!("{tag} found {filename}");
        match process_file(client, config, mapping, &path).await {
            Ok(Some(dest)) => {
                info!("{tag} archived to {}", dest.display());
                archived += 1;
            }
            Ok(None) => warn!("{tag} no magnet link in {filename}, skipped"),
            Err(e) => error!("{tag} {filename} left in place: {e:#}"),
        }
    }
    Ok(archived)
}

/// Non-hidden regular entries, sorted by name.
async fn list_files(dir: &Path, processed_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot list {}", dir.display()))?;
    let mut files = vec![];
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with('.') || path == processed_dir {
            continue;
        }
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => continue,
            Ok(_) => files.push(path),
            Err(e) => debug!("cannot stat {}: {e}", path.display()),
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `Ok(None)`: nothing to submit. `Ok(Some(_))`: submitted and archived.
pub async fn process_file(
    client: &AlistClient,
    config: &Config,
    mapping: &WatchMapping,
    path: &Path,
) -> Result<Option<PathBuf>> {
    let tag = format!("[{}]", mapping.category);
    let filename = file_name(path);

    let Some(magnet) = magnet::extract(path).await? else {
        return Ok(None);
    };
    debug!("{tag} magnet {magnet}");

    let target = series::save_path(&filename, &mapping.cloud);
    if target == mapping.cloud {
        info!("{tag} not an episode, using base path {target}");
    } else {
        info!("{tag} save path {target}");
    }

    submit(client, &magnet, &target, &tag).await?;

    let dir = archive_dir(config, mapping, &target);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("cannot create {}", dir.display()))?;
    let dest = dir.join(&filename);
    move_file(path, &dest).await?;
    Ok(Some(dest))
}

/// Waits for the remote folder, then adds the offline download.
pub async fn submit(client: &AlistClient, magnet: &str, save_path: &str, tag: &str) -> Result<(), Error> {
    if let Err(e) = client.ensure_path_ready(save_path, tag).await {
        error!("{tag} remote folder not ready, task cancelled");
        return Err(e);
    }
    info!("{tag} submitting offline download");
    client.add_offline_download(magnet, save_path).await
}

/// Mirrors the part of `target` below the mapping's cloud base.
pub fn archive_dir(config: &Config, mapping: &WatchMapping, target: &str) -> PathBuf {
    let relative = target
        .strip_prefix(mapping.cloud.as_str())
        .map(|r| r.trim_matches('/'))
        .unwrap_or_default();
    let mut dir = config.processed_dir.clone();
    if config.archive_by_category {
        dir.push(&mapping.category);
    }
    if !relative.is_empty() {
        dir.push(relative);
    }
    dir
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::rename(from, to).await {
        debug!("rename {} failed ({e}), copying instead", from.display());
        tokio::fs::copy(from, to)
            .await
            .with_context(|| format!("cannot copy {} to {}", from.display(), to.display()))?;
        tokio::fs::remove_file(from)
            .await
            .with_context(|| format!("cannot remove {}", from.display()))?;
    }
    Ok(())
}
