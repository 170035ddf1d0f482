use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin, SetDownloadBehaviorBehavior,
    SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

use super::actions;
use super::manager::BrowserSession;
use super::selector::Selector;

/// Longest a single download may take from click to completion
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A download that finished and was moved to its final name
#[derive(Debug, Clone)]
pub struct CompletedDownload {
    pub url: String,
    pub path: PathBuf,
}

/// Name to save a download under.
///
/// A caller-supplied name is used as-is. Otherwise the file is named after the
/// timestamp, keeping the extension of the suggested filename, or of the last
/// URL segment (query stripped), or none.
pub fn final_download_name(custom: Option<&str>, suggested: &str, url: &str, timestamp: &str) -> String {
    if let Some(name) = custom.filter(|n| !n.trim().is_empty()) {
        return name.to_string();
    }

    let from_suggested = extension_of(suggested);
    let from_url = || {
        let tail = url.rsplit('/').next().unwrap_or_default();
        let tail = tail.split(['?', '#']).next().unwrap_or_default();
        extension_of(tail)
    };

    match from_suggested.or_else(from_url) {
        Some(ext) => format!("{}.{}", timestamp, ext),
        None => timestamp.to_string(),
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_string)
}

/// Where the browser writes a download: the directory plus the download's guid
pub fn saved_path(directory: &Path, guid: &str) -> PathBuf {
    directory.join(guid)
}

/// Move a finished download onto its final name, replacing a file left there earlier
pub fn move_into_place(saved: &Path, target: &Path) -> Result<()> {
    if target.is_file() {
        std::fs::remove_file(target)
            .map_err(|e| anyhow!("Failed to replace existing download {:?}: {}", target, e))?;
    }
    std::fs::rename(saved, target).map_err(|e| anyhow!("Failed to rename download {:?} to {:?}: {}", saved, target, e))
}

/// Click `selector` and wait for the download it triggers.
///
/// The browser saves downloads under their guid, so nothing already in `directory`
/// can be mistaken for this one. Download events are subscribed before the click
/// so a fast download is not missed.
pub async fn click_and_download(
    session: &BrowserSession,
    page: &Page,
    selector: &Selector,
    directory: &Path,
    custom_name: Option<&str>,
    timestamp: &str,
) -> Result<CompletedDownload> {
    std::fs::create_dir_all(directory)
        .map_err(|e| anyhow!("Failed to create download directory {:?}: {}", directory, e))?;
    let directory = directory.canonicalize().unwrap_or_else(|_| directory.to_path_buf());

    let behavior = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::AllowAndName)
        .download_path(directory.to_string_lossy().to_string())
        .events_enabled(true)
        .build()
        .map_err(|e| anyhow!("Failed to build download params: {}", e))?;

    let (mut began, mut progress) = {
        let guard = session.browser.lock().await;
        let browser = guard.as_ref().ok_or_else(|| anyhow!("Browser is closed"))?;
        browser
            .execute(behavior)
            .await
            .map_err(|e| anyhow!("Failed to enable downloads: {}", e))?;
        let began = browser
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(|e| anyhow!("Failed to listen for downloads: {}", e))?;
        let progress = browser
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(|e| anyhow!("Failed to listen for download progress: {}", e))?;
        (began, progress)
    };

    actions::click(page, selector).await?;

    let wait = async {
        let Some(started) = began.next().await else {
            return Err(anyhow!("Download event stream closed"));
        };
        tracing::info!("Download started: {}", started.url);

        while let Some(update) = progress.next().await {
            if update.guid != started.guid {
                continue;
            }
            match update.state {
                DownloadProgressState::Completed => return Ok(started),
                DownloadProgressState::Canceled => {
                    return Err(anyhow!("Download of {} was canceled", started.url))
                }
                DownloadProgressState::InProgress => {}
            }
        }
        Err(anyhow!("Download progress stream closed"))
    };

    let started = timeout(DOWNLOAD_TIMEOUT, wait)
        .await
        .map_err(|_| anyhow!("Download did not complete within {}s", DOWNLOAD_TIMEOUT.as_secs()))??;

    let name = final_download_name(custom_name, &started.suggested_filename, &started.url, timestamp);
    let target = directory.join(&name);
    move_into_place(&saved_path(&directory, &started.guid), &target)?;

    Ok(CompletedDownload {
        url: started.url.clone(),
        path: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "20240501093000";

    #[test]
    fn test_custom_name_used_verbatim() {
        assert_eq!(final_download_name(Some("report.xlsx"), "a.csv", "https://x/y.pdf", TS), "report.xlsx");
        assert_eq!(final_download_name(Some("report"), "a.csv", "", TS), "report");
    }

    #[test]
    fn test_extension_from_suggested_name() {
        assert_eq!(final_download_name(None, "export.tar.gz", "https://x/file.zip", TS), "20240501093000.gz");
        assert_eq!(final_download_name(Some("  "), "data.csv", "", TS), "20240501093000.csv");
    }

    #[test]
    fn test_extension_from_url_tail() {
        assert_eq!(
            final_download_name(None, "", "https://host/files/report.pdf?token=abc", TS),
            "20240501093000.pdf"
        );
        assert_eq!(final_download_name(None, "download", "https://host/get.xlsx#top", TS), "20240501093000.xlsx");
    }

    #[test]
    fn test_saved_path_is_guid_in_directory() {
        let guid = "6f1c2a9e-7d4b-4c35-9a51-0e8b2f3d4c11";
        assert_eq!(saved_path(Path::new("/tmp/downloads"), guid), Path::new("/tmp/downloads").join(guid));
    }

    #[test]
    fn test_move_into_place_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.csv");
        std::fs::write(&target, "previous run").unwrap();
        let saved = saved_path(dir.path(), "0c9d7e52-guid");
        std::fs::write(&saved, "fresh").unwrap();

        move_into_place(&saved, &target).unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "fresh");
        assert!(!saved.exists());
    }

    #[test]
    fn test_move_into_place_missing_download() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.csv");
        assert!(move_into_place(&dir.path().join("absent-guid"), &target).is_err());
    }

    #[test]
    fn test_no_extension_available() {
        assert_eq!(final_download_name(None, "", "https://host/download/", TS), TS);
        assert_eq!(final_download_name(None, "", "https://host/download?id=1.2", TS), TS);
    }
}
