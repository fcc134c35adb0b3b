//! PNG export of a mounted chart through a download sink.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::ExportError;
use crate::mount::Container;
use crate::render::PngRenderer;

/// Host side of a browser-style download: bytes are published under a
/// temporary object URL, downloaded under a file name, then revoked.
pub trait DownloadSink {
    fn create_object_url(&mut self, png: Vec<u8>) -> Result<String, ExportError>;

    fn download(&mut self, url: &str, file_name: &str) -> Result<(), ExportError>;

    fn revoke_object_url(&mut self, url: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReceipt {
    pub file_name: String,
    pub byte_len: usize,
}

/// Rasterizes the chart mounted in `container` and downloads it as
/// `file_name`. The object URL is revoked whether or not the download
/// succeeds; the container is never modified.
pub fn export_as_image<R: PngRenderer>(
    container: &Container,
    renderer: &mut R,
    sink: &mut dyn DownloadSink,
    file_name: &str,
) -> Result<ExportReceipt, ExportError> {
    let root = container.chart_root().ok_or(ExportError::ChartNotFound)?;
    renderer
        .render(root.frame())
        .map_err(|e| ExportError::Raster(e.to_string()))?;
    let png = renderer
        .encode_png()
        .map_err(|e| ExportError::Raster(e.to_string()))?;
    let byte_len = png.len();

    let url = sink.create_object_url(png)?;
    let downloaded = sink.download(&url, file_name);
    sink.revoke_object_url(&url);
    if let Err(err) = &downloaded {
        warn!(file_name, error = %err, "chart export failed");
    }
    downloaded?;

    debug!(
        file_name,
        byte_len,
        generation = root.generation(),
        "chart exported"
    );
    Ok(ExportReceipt {
        file_name: file_name.to_owned(),
        byte_len,
    })
}

/// Keeps object URLs and downloads in memory.
#[derive(Debug, Default)]
pub struct MemoryDownloadSink {
    next_id: u64,
    objects: IndexMap<String, Vec<u8>>,
    downloads: Vec<(String, Vec<u8>)>,
}

impl MemoryDownloadSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed downloads as `(file name, bytes)`.
    #[must_use]
    pub fn downloads(&self) -> &[(String, Vec<u8>)] {
        &self.downloads
    }

    /// Object URLs that were created and not yet revoked.
    #[must_use]
    pub fn live_urls(&self) -> usize {
        self.objects.len()
    }
}

impl DownloadSink for MemoryDownloadSink {
    fn create_object_url(&mut self, png: Vec<u8>) -> Result<String, ExportError> {
        self.next_id += 1;
        let url = format!("blob:dynchart/{}", self.next_id);
        self.objects.insert(url.clone(), png);
        Ok(url)
    }

    fn download(&mut self, url: &str, file_name: &str) -> Result<(), ExportError> {
        let bytes = self.objects.get(url).cloned().ok_or_else(|| {
            ExportError::Sink(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("unknown object url `{url}`"),
            ))
        })?;
        self.downloads.push((file_name.to_owned(), bytes));
        Ok(())
    }

    fn revoke_object_url(&mut self, url: &str) {
        self.objects.shift_remove(url);
    }
}

/// Writes downloads into a directory.
#[derive(Debug)]
pub struct DirectoryDownloadSink {
    dir: PathBuf,
    pending: MemoryDownloadSink,
}

impl DirectoryDownloadSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pending: MemoryDownloadSink::new(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectoryDownloadSink {
    fn create_object_url(&mut self, png: Vec<u8>) -> Result<String, ExportError> {
        self.pending.create_object_url(png)
    }

    fn download(&mut self, url: &str, file_name: &str) -> Result<(), ExportError> {
        let bytes = self.pending.objects.get(url).ok_or_else(|| {
            ExportError::Sink(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("unknown object url `{url}`"),
            ))
        })?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(file_name), bytes)?;
        Ok(())
    }

    fn revoke_object_url(&mut self, url: &str) {
        self.pending.revoke_object_url(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Viewport;
    use crate::mount::RenderRoot;
    use crate::render::{Color, RasterRenderer, RectPrimitive, RenderFrame};

    struct FailingSink {
        inner: MemoryDownloadSink,
    }

    impl DownloadSink for FailingSink {
        fn create_object_url(&mut self, png: Vec<u8>) -> Result<String, ExportError> {
            self.inner.create_object_url(png)
        }

        fn download(&mut self, _url: &str, _file_name: &str) -> Result<(), ExportError> {
            Err(ExportError::Sink(std::io::Error::other("blocked")))
        }

        fn revoke_object_url(&mut self, url: &str) {
            self.inner.revoke_object_url(url);
        }
    }

    fn mounted() -> Container {
        let frame = RenderFrame::new(Viewport::new(20, 10)).with_rect(RectPrimitive::new(
            2.0,
            2.0,
            5.0,
            5.0,
            Color::rgb(1.0, 0.0, 0.0),
        ));
        let mut container = Container::new();
        container.mount(RenderRoot::new(1, frame));
        container
    }

    #[test]
    fn empty_container_has_no_chart() {
        let mut renderer = RasterRenderer::new(1, 1).expect("renderer");
        let mut sink = MemoryDownloadSink::new();
        let err = export_as_image(&Container::new(), &mut renderer, &mut sink, "grafico.png")
            .expect_err("no chart");
        assert!(matches!(err, ExportError::ChartNotFound));
        assert_eq!(err.alert_message(), "Gráfico não encontrado para exportação");
        assert!(sink.downloads().is_empty());
    }

    #[test]
    fn exports_png_and_revokes_url() {
        let container = mounted();
        let mut renderer = RasterRenderer::new(1, 1).expect("renderer");
        let mut sink = MemoryDownloadSink::new();
        let receipt =
            export_as_image(&container, &mut renderer, &mut sink, "grafico.png").expect("export");

        assert_eq!(receipt.file_name, "grafico.png");
        let (name, bytes) = &sink.downloads()[0];
        assert_eq!(name, "grafico.png");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(sink.live_urls(), 0);
        assert_eq!(container, mounted());
    }

    #[test]
    fn url_is_revoked_when_download_fails() {
        let mut renderer = RasterRenderer::new(1, 1).expect("renderer");
        let mut sink = FailingSink {
            inner: MemoryDownloadSink::new(),
        };
        let err = export_as_image(&mounted(), &mut renderer, &mut sink, "grafico.png")
            .expect_err("blocked");
        assert!(matches!(err, ExportError::Sink(_)));
        assert_eq!(sink.inner.live_urls(), 0);
    }
}
