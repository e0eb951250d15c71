use super::AlistClient;
use crate::error::Error;
use tokio::time::Instant;

impl AlistClient {
    /// Makes sure every directory of `full_path` exists, top-down.
    ///
    /// Alist may report `mkdir` as done before the listing shows the new
    /// folder, so each created segment is polled until `fs/get` confirms it.
    /// A segment that does not show up within `ready_timeout` fails the whole
    /// call; deeper segments are not touched.
    pub async fn ensure_path_ready(&self, full_path: &str, tag: &str) -> Result<(), Error> {
        info!("{tag} checking remote path {full_path}");

        let mut current = String::new();
        for (i, part) in full_path.split('/').filter(|p| !p.is_empty()).enumerate() {
            let parent = if current.is_empty() {
                "/".to_string()
            } else {
                current.clone()
            };
            current = format!("{current}/{part}");

            if self.path_exists(&current).await {
                continue;
            }

            info!("{tag} [step {}] missing, creating {current}", i + 1);
            if let Err(e) = self.mkdir(&current).await {
                error!("{tag} [step {}] {e:#}", i + 1);
            }
            self.refresh_listing(&parent).await;

            if !self.wait_until_exists(&current).await {
                let waited = self.options().ready_timeout;
                error!("{tag} [step {}] {current} still missing after {waited:?}", i + 1);
                return Err(Error::Timeout {
                    path: current,
                    waited,
                });
            }
            info!("{tag} [step {}] confirmed {current}", i + 1);
        }

        info!("{tag} remote path ready: {full_path}");
        Ok(())
    }

    async fn wait_until_exists(&self, path: &str) -> bool {
        let options = self.options();
        let start = Instant::now();
        while start.elapsed() < options.ready_timeout {
            if self.path_exists(path).await {
                return true;
            }
            tokio::time::sleep(options.ready_poll).await;
        }
        false
    }
}
