use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::error::{MaeError, Result};

const PROGRESS_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// Upper bound on the buffer reserved from a server-reported content length.
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;


/// Makes sure `path` exists, downloading it from `url` when absent.
///
/// The body is streamed into a sibling `.part` file that is renamed into place once
/// the transfer completes. Existing files are trusted as-is.
pub fn ensure_file(path: impl AsRef<Path>, url: &str) -> Result<PathBuf> {
    let path = path.as_ref();

    if path.exists() {
        debug!(path = %path.display(), "using cached file");
        return Ok(path.to_path_buf());
    }

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(path);
    info!(url, path = %path.display(), "downloading");

    let written = match download_to(url, &partial) {
        Ok(written) => written,
        Err(err) => {
            let _ = fs::remove_file(&partial);
            return Err(err);
        }
    };

    fs::rename(&partial, path)?;
    info!(bytes = written, path = %path.display(), "download complete");

    Ok(path.to_path_buf())
}

/// Downloads `url` fully into memory.
pub fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let mut response = get(url)?;
    let mut bytes = Vec::with_capacity(preallocation(response.content_length()));
    response.read_to_end(&mut bytes)?;

    debug!(url, bytes = bytes.len(), "fetched");
    Ok(bytes)
}

pub fn fetch_image(url: &str) -> Result<DynamicImage> {
    let bytes = fetch_bytes(url)?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Opens `source` from disk, or over http(s) when it looks like a url.
pub fn open_image(source: &str) -> Result<DynamicImage> {
    if is_url(source) {
        fetch_image(source)
    } else {
        Ok(image::open(source)?)
    }
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn get(url: &str) -> Result<reqwest::blocking::Response> {
    reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .map_err(|source| MaeError::Download {
            url: url.to_string(),
            source,
        })
}

fn download_to(url: &str, destination: &Path) -> Result<u64> {
    let response = get(url)?;

    let progress = match response.content_length() {
        Some(total) => ProgressBar::new(total).with_style(
            ProgressStyle::with_template(PROGRESS_TEMPLATE)
                .map(|style| style.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        ),
        None => ProgressBar::new_spinner(),
    };
    if let Some(name) = destination.file_stem() {
        progress.set_message(name.to_string_lossy().into_owned());
    }

    let mut file = File::create(destination)?;
    let written = std::io::copy(&mut progress.wrap_read(response), &mut file)?;
    progress.finish_and_clear();

    Ok(written)
}

fn preallocation(content_length: Option<u64>) -> usize {
    content_length.unwrap_or_default().min(MAX_PREALLOCATION) as usize
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    // nothing listens on the discard port locally, so the request fails fast
    const UNREACHABLE: &str = "http://127.0.0.1:9/checkpoint.pth";

    #[test]
    fn existing_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.pth");
        fs::write(&path, b"cached").unwrap();

        let resolved = ensure_file(&path, UNREACHABLE).unwrap();

        assert_eq!(resolved, path);
        assert_eq!(fs::read(&path).unwrap(), b"cached");
    }

    #[test]
    fn network_failure_propagates_and_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources").join("weights.pth");

        let err = ensure_file(&path, UNREACHABLE).unwrap_err();

        assert!(matches!(err, MaeError::Download { .. }));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn partial_file_sits_next_to_target() {
        let partial = partial_path(Path::new("resources/mae.pth"));
        assert_eq!(partial, Path::new("resources/mae.pth.part"));
    }

    #[test]
    fn reported_length_only_sizes_small_buffers() {
        assert_eq!(preallocation(None), 0);
        assert_eq!(preallocation(Some(4096)), 4096);
        assert_eq!(preallocation(Some(u64::MAX)), MAX_PREALLOCATION as usize);
    }

    #[test]
    fn recognizes_urls() {
        assert!(is_url("https://example.com/fox.jpg"));
        assert!(!is_url("assets/fox.jpg"));
    }
}
