//! services/api/src/adapters/measure.rs
//!
//! A server-side stand-in for the host's layout primitive. It greedily wraps
//! words using an average glyph width, which is deterministic for identical
//! inputs and close enough to real typesetting to produce stable page counts.

use async_trait::async_trait;
use reading_engine_core::domain::Block;
use reading_engine_core::pagination::MeasureRequest;
use reading_engine_core::ports::{PortError, PortResult, TextMeasurer};

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_RATIO: f64 = 0.5;
const HEADING_SCALE: f64 = 1.5;
/// Vertical gap after each block, in lines.
const BLOCK_SPACING_LINES: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatingMeasurer;

impl EstimatingMeasurer {
    pub fn new() -> Self {
        Self
    }

    fn block_height(block: &Block, request: &MeasureRequest) -> f64 {
        let font_size = if block.is_heading() {
            request.font_size_px * HEADING_SCALE
        } else {
            request.font_size_px
        };
        let line_height = font_size * request.line_height_ratio;
        let glyph_width = font_size * GLYPH_WIDTH_RATIO;
        let chars_per_line = ((request.render_width / glyph_width).floor() as usize).max(1);

        let lines = wrapped_line_count(&block.text, chars_per_line);
        (lines as f64 + BLOCK_SPACING_LINES) * line_height
    }
}

/// Greedy word wrap. Words longer than a line are broken across lines.
fn wrapped_line_count(text: &str, chars_per_line: usize) -> usize {
    let mut lines = 0usize;
    let mut used = 0usize;
    for word in text.split_whitespace() {
        let len = word.chars().count();
        let needed = if used == 0 { len } else { used + 1 + len };
        if needed <= chars_per_line {
            used = needed;
            continue;
        }
        if used > 0 {
            lines += 1;
        }
        lines += len / chars_per_line;
        used = len % chars_per_line;
    }
    if used > 0 {
        lines += 1;
    }
    lines.max(1)
}

#[async_trait]
impl TextMeasurer for EstimatingMeasurer {
    async fn measure(&self, blocks: &[Block], request: &MeasureRequest) -> PortResult<f64> {
        if !(request.render_width.is_finite() && request.render_width > 0.0)
            || !(request.font_size_px.is_finite() && request.font_size_px > 0.0)
            || !(request.line_height_ratio.is_finite() && request.line_height_ratio > 0.0)
        {
            return Err(PortError::Unexpected(format!(
                "Cannot lay out text with {:?}",
                request
            )));
        }

        let flowed: f64 = blocks
            .iter()
            .map(|block| Self::block_height(block, request))
            .sum();
        // Content flows across columns, so each column set holds `column_count` times more.
        Ok(flowed / f64::from(request.column_count.max(1)))
    }
}
