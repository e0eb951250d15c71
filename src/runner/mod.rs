use crate::{AlistClient, Config};
use anyhow::{Context, Result};
use notify::Watcher;
use std::{
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};
#[cfg(unix)]
use tokio::signal::unix as signal;
use tokio::sync::broadcast;

pub mod watch;

/// Where the configuration comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Env,
    /// A TOML file, reloaded whenever it changes.
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Reload,
    Stop,
}

struct Reloader {
    event: broadcast::Sender<Control>,
}
impl Reloader {
    pub fn new(tx: broadcast::Sender<Control>) -> Self {
        Self { event: tx }
    }
}
impl notify::EventHandler for Reloader {
    fn handle_event(&mut self, event: notify::Result<notify::Event>) {
        match event {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                debug!("config event {:?}", event.kind);
                self.event.send(Control::Reload).ok();
            }
            Ok(_) => {}
            Err(e) => error!("watch config file error: {:?}", e),
        }
    }
}

pub async fn run(source: Source) -> Result<()> {
    let (tx, mut rx) = broadcast::channel(16);

    let stop_tx = tx.clone();
    tokio::spawn(async move {
        match forward_signals(signal, stop_tx).await {
            Ok(()) => {
                warn!("second signal received, exiting immediately");
                std::process::exit(130);
            }
            Err(e) => error!("cannot listen for signals: {e:#}"),
        }
    });

    match source {
        Source::Env => {
            let config = Config::from_env()?;
            run_config(config, &mut rx).await?;
            Ok(())
        }
        Source::File(path) => {
            let mut config = load_config(&path).await?;
            let mut watcher = notify::recommended_watcher(Reloader::new(tx.clone()))?;
            watcher.watch(&path, notify::RecursiveMode::NonRecursive)?;
            loop {
                match run_config(config.clone(), &mut rx).await? {
                    Control::Stop => return Ok(()),
                    Control::Reload => {
                        if drain_reloads(&mut rx) == Control::Stop {
                            return Ok(());
                        }
                        info!("change in config file detected, reloading");
                        match load_config(&path).await {
                            Ok(new) => config = new,
                            Err(e) => error!("reload failed, keeping previous config: {e:#}"),
                        }
                    }
                }
            }
        }
    }
}

/// The first signal asks for a stop after the current cycle; returns on the
/// second one so the caller can exit without waiting.
async fn forward_signals<S, F>(mut signal: S, stop: broadcast::Sender<Control>) -> Result<()>
where
    S: FnMut() -> F,
    F: Future<Output = Result<()>>,
{
    signal().await?;
    info!("stopping after the current cycle, signal again to exit now");
    stop.send(Control::Stop).ok();
    signal().await
}

/// One editor save fires several events; a reload covers all queued ones.
/// A queued stop wins.
fn drain_reloads(control: &mut broadcast::Receiver<Control>) -> Control {
    use broadcast::error::TryRecvError;
    loop {
        match control.try_recv() {
            Ok(Control::Reload) | Err(TryRecvError::Lagged(_)) => continue,
            Ok(Control::Stop) | Err(TryRecvError::Closed) => return Control::Stop,
            Err(TryRecvError::Empty) => return Control::Reload,
        }
    }
}

#[cfg(unix)]
async fn signal() -> Result<()> {
    let mut sig_term = signal::signal(signal::SignalKind::terminate())?;

    tokio::select! {
        _ = sig_term.recv() => {
            info!("received sigterm");
            Ok(())
        }
        r = tokio::signal::ctrl_c() => {
            r?;
            info!("ctrl-c received");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
async fn signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received");
    Ok(())
}

/// Scans the watch directories until told to stop or reload. Control
/// messages are only looked at between cycles.
async fn run_config(config: Config, control: &mut broadcast::Receiver<Control>) -> Result<Control> {
    info!("archive root: {}", config.processed_dir.display());
    info!("alist host: {}", config.alist.host);
    for mapping in config.watch.iter() {
        info!(
            "[{}] watching {} -> {}",
            mapping.category,
            mapping.local.display(),
            mapping.cloud
        );
    }

    let client = AlistClient::from_config(&config.alist)?;
    if client.login().await.is_err() {
        error!("login at startup failed, will retry on demand");
    }

    let interval = Duration::from_secs(config.interval_s);
    loop {
        let archived = watch::run_cycle(&client, &config).await;
        debug!("cycle done, {archived} file(s) archived");
        tokio::select! {
            c = next_control(control) => return Ok(c),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn next_control(control: &mut broadcast::Receiver<Control>) -> Control {
    loop {
        match control.recv().await {
            Ok(c) => return c,
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("missed {n} control messages"),
            Err(broadcast::error::RecvError::Closed) => return Control::Stop,
        }
    }
}

async fn load_config(path: &Path) -> Result<Config> {
    let config_str = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot read config path {}", path.display()))?;
    let mut config = toml::from_str::<Config>(&config_str).context("Config file corrupted")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn queued_reloads_collapse_into_one() {
        let (tx, mut rx) = broadcast::channel(16);
        for _ in 0..4 {
            tx.send(Control::Reload).unwrap();
        }
        assert_eq!(next_reload(&mut rx), Control::Reload);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_behind_reloads_is_kept() {
        let (tx, mut rx) = broadcast::channel(16);
        tx.send(Control::Reload).unwrap();
        tx.send(Control::Reload).unwrap();
        tx.send(Control::Stop).unwrap();
        tx.send(Control::Reload).unwrap();
        assert_eq!(next_reload(&mut rx), Control::Stop);
    }

    /// What `run` does with the first message: take it, then drain.
    fn next_reload(rx: &mut broadcast::Receiver<Control>) -> Control {
        assert_eq!(rx.try_recv().unwrap(), Control::Reload);
        drain_reloads(rx)
    }

    #[tokio::test]
    async fn second_signal_ends_forwarding() {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<()>();
        let signal_rx = std::sync::Arc::new(tokio::sync::Mutex::new(signal_rx));
        let (stop_tx, mut stop_rx) = broadcast::channel(4);

        let fake_signal = move || {
            let signal_rx = signal_rx.clone();
            async move {
                signal_rx.lock().await.recv().await;
                Ok(())
            }
        };
        let forwarding = tokio::spawn(forward_signals(fake_signal, stop_tx));

        signal_tx.send(()).unwrap();
        assert_eq!(stop_rx.recv().await.unwrap(), Control::Stop);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!forwarding.is_finished());

        signal_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), forwarding)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
