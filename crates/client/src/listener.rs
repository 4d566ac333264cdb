use std::path::Path;

use tracing::{info, warn};
use unfurl_common::error::ConvertError;
use unfurl_common::model::ConvertedDocument;

/// Notified once per top-level conversion with the result or the failure.
pub trait ConversionListener {
    fn on_converted(&mut self, source: &Path, doc: &ConvertedDocument);
    fn on_failed(&mut self, source: &Path, err: &ConvertError);
}

/// Inventory listener: logs each outcome and keeps counts for the summary.
#[derive(Default)]
pub struct LogListener {
    pub converted: usize,
    pub unconverted: usize,
    pub failed: usize,
    pub children: usize,
}

impl ConversionListener for LogListener {
    fn on_converted(&mut self, source: &Path, doc: &ConvertedDocument) {
        if doc.is_converted {
            self.converted += 1;
            self.children += doc.raw_children.len() + doc.children.len();
            info!(
                "converted {} ({} children)",
                source.display(),
                doc.raw_children.len() + doc.children.len()
            );
        } else {
            self.unconverted += 1;
            info!("no conversion for {}", source.display());
        }
    }

    fn on_failed(&mut self, source: &Path, err: &ConvertError) {
        self.failed += 1;
        warn!("failed to convert {}: {err}", source.display());
    }
}
