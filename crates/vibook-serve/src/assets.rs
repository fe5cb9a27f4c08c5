use std::path::Path;
use std::time::Duration;

use serde::Serialize;

/// An example image served under `/assets` together with a suggested question.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExampleAsset {
    /// The file name inside the assets directory.
    pub file_name: &'static str,
    /// Where the image is downloaded from when missing.
    pub url: &'static str,
    /// The question suggested on the page for this image.
    pub question: &'static str,
}

/// The example book covers shown on the page.
pub const EXAMPLE_ASSETS: &[ExampleAsset] = &[
    ExampleAsset {
        file_name: "book_example_1.jpg",
        url: "https://cdn0.fahasa.com/media/catalog/product/d/i/dieu-ky-dieu-cua-tiem-tap-hoa-namiya---tai-ban-2020.jpg",
        question: "What is the title of this book?",
    },
    ExampleAsset {
        file_name: "book_example_2.jpg",
        url: "https://cdn0.fahasa.com/media/catalog/product/d/r/dr.-stone_bia_tap-26.jpg",
        question: "Which volume is this?",
    },
];

// the cdn rejects requests without a browser user agent
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(thiserror::Error, Debug)]
enum AssetError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What a prefetch run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The http client used for asset downloads.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
}

/// Download the assets that are not yet present in `dir`, one after the other.
///
/// Existing files are left untouched. Failures are logged and counted, never returned.
pub async fn prefetch_assets(
    client: &reqwest::Client,
    dir: &Path,
    assets: &[ExampleAsset],
) -> PrefetchReport {
    let mut report = PrefetchReport::default();

    for asset in assets {
        let path = dir.join(asset.file_name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            report.skipped += 1;
            continue;
        }

        log::info!("Downloading example image: {}...", asset.file_name);
        match download(client, asset.url, &path).await {
            Ok(()) => {
                report.downloaded += 1;
                log::info!("...done.");
            }
            Err(e) => {
                report.failed += 1;
                log::error!("❌ Failed to download {}: {e}", asset.file_name);
            }
        }
    }

    report
}

async fn download(client: &reqwest::Client, url: &str, path: &Path) -> Result<(), AssetError> {
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    // a partial file would be skipped forever, so only the complete download is moved in place
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, path).await?;

    Ok(())
}
