//! Progress reporting for directory ingestion.
//!
//! The server uses [`NoopProgress`]; [`BarProgress`] draws an `indicatif`
//! bar for interactive runs.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

pub trait IngestProgress: Send + Sync {
    /// Number of files that will be loaded.
    fn start(&self, _files: u64) {}
    /// One file loaded and chunked (or failed, `chunks == 0`).
    fn file_done(&self, _path: &Path, _chunks: usize) {}
    /// Embedding and storage phase started.
    fn storing(&self, _chunks: usize) {}
    fn finish(&self, _msg: &str) {}
}

#[derive(Default, Clone, Copy)]
pub struct NoopProgress;
impl IngestProgress for NoopProgress {}

pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Self { pb }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestProgress for BarProgress {
    fn start(&self, files: u64) {
        self.pb.set_length(files);
    }
    fn file_done(&self, path: &Path, chunks: usize) {
        self.pb.inc(1);
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        self.pb.set_message(format!("{name} ({chunks} chunks)"));
    }
    fn storing(&self, chunks: usize) {
        self.pb.set_message(format!("embedding {chunks} chunks"));
    }
    fn finish(&self, msg: &str) {
        self.pb.finish_with_message(msg.to_string());
    }
}
