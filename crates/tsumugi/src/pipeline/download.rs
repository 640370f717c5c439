use std::path::Path;

use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{error::TsumugiResult, http::HttpClient, mpd::TrackKind, sequence::FragmentPlan};

/// Result of downloading one fragment plan into a single file.
#[derive(Debug, Clone)]
pub struct TrackDownload {
    pub kind: TrackKind,
    pub total: usize,
    /// Fragments that could not be fetched and are missing from the file.
    pub failed: Vec<Url>,
}

impl TrackDownload {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetches the fragments of `plan` strictly in order and writes them back to
/// back into `path`.
///
/// A fragment that fails to download is logged and skipped. Failing to write
/// the file aborts the track.
pub async fn download_track(
    client: &HttpClient,
    plan: &FragmentPlan,
    path: &Path,
) -> TsumugiResult<TrackDownload> {
    let total = plan.len();
    tracing::info!(
        "Downloading {} {} fragment(s) of {} to {}",
        total,
        plan.kind,
        plan.representation_id,
        path.display()
    );

    let mut file = tokio::fs::File::create(path).await?;
    let mut failed = Vec::new();
    for (index, url) in plan.urls.iter().enumerate() {
        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or(url.as_str());

        match client.fetch_bytes(url.clone()).await {
            Ok(bytes) => file.write_all(&bytes).await?,
            Err(e) => {
                tracing::error!("Processing {filename} failed, drop. {e}");
                failed.push(url.clone());
                continue;
            }
        }

        let downloaded = index + 1;
        let percentage = downloaded as f32 / total as f32 * 100.;
        tracing::info!(
            "Processing {filename} finished. ({downloaded} / {total} or {percentage:.2}%)"
        );
    }
    file.flush().await?;

    Ok(TrackDownload {
        kind: plan.kind,
        total,
        failed,
    })
}
