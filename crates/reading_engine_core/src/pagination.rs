//! crates/reading_engine_core/src/pagination.rs
//!
//! Divides continuously flowed content into viewport-sized pages.
//!
//! The engine is stateless: callers re-run [`paginate`] whenever the content or
//! any display parameter changes, then reconcile the reader's position against
//! the new page count.

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Block, DisplayParameters};
use crate::ports::TextMeasurer;

/// What the host measurement primitive is asked to lay out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasureRequest {
    pub render_width: f64,
    pub column_count: u32,
    pub font_size_px: f64,
    pub line_height_ratio: f64,
}

impl MeasureRequest {
    pub fn for_display(params: &DisplayParameters) -> Self {
        Self {
            render_width: params.render_width(),
            column_count: params.column_count.max(1),
            font_size_px: params.font_size_px,
            line_height_ratio: params.line_height_ratio,
        }
    }
}

/// Viewports shorter than one pixel are treated as not laid out yet.
pub const MIN_VIEWPORT_HEIGHT: f64 = 1.0;
/// Page numbers are stored in signed 32-bit columns.
pub const MAX_PAGES: u32 = i32::MAX as u32;

/// Page count plus the linear page/offset mapping for one pagination pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaginationResult {
    total_pages: u32,
    page_height: f64,
}

impl PaginationResult {
    /// A one-page result, used whenever the rendered height cannot be trusted.
    pub fn single_page(page_height: f64) -> Self {
        Self {
            total_pages: 1,
            page_height: sanitize_page_height(page_height),
        }
    }

    /// `ceil(rendered_height / viewport_height)`, within `[1, MAX_PAGES]`.
    pub fn from_rendered_height(rendered_height: f64, viewport_height: f64) -> Self {
        if !is_usable(rendered_height) || !is_usable_viewport(viewport_height) {
            return Self::single_page(viewport_height);
        }
        // Float to int casts saturate, so an absurd height cannot wrap around.
        let total_pages = ((rendered_height / viewport_height).ceil() as u32).clamp(1, MAX_PAGES);
        Self {
            total_pages,
            page_height: viewport_height,
        }
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn page_height(&self) -> f64 {
        self.page_height
    }

    /// Clamps any requested page into `[1, total_pages]`.
    pub fn clamp_page(&self, page: u32) -> u32 {
        page.clamp(1, self.total_pages)
    }

    /// Scroll offset of the top of a page. `offset_for_page(1) == 0`.
    pub fn offset_for_page(&self, page: u32) -> f64 {
        f64::from(self.clamp_page(page) - 1) * self.page_height
    }

    /// The page showing the given scroll offset.
    pub fn page_for_offset(&self, offset: f64) -> u32 {
        if !offset.is_finite() || offset <= 0.0 || self.page_height <= 0.0 {
            return 1;
        }
        let page = (offset / self.page_height).floor() as u32;
        self.clamp_page(page.saturating_add(1))
    }
}

fn is_usable(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_usable_viewport(value: f64) -> bool {
    value.is_finite() && value >= MIN_VIEWPORT_HEIGHT
}

fn sanitize_page_height(page_height: f64) -> f64 {
    if is_usable_viewport(page_height) {
        page_height
    } else {
        0.0
    }
}

/// Computes the pagination of `blocks` under `params`.
///
/// Never fails: a measurement error or a degenerate height (zero, negative, NaN)
/// from a host surface that is not ready yet yields a single page.
pub async fn paginate(
    blocks: &[Block],
    params: &DisplayParameters,
    measurer: &dyn TextMeasurer,
) -> PaginationResult {
    if blocks.is_empty() {
        return PaginationResult::single_page(params.viewport_height);
    }

    let request = MeasureRequest::for_display(params);
    let rendered_height = match measurer.measure(blocks, &request).await {
        Ok(height) => height,
        Err(e) => {
            warn!("Text measurement failed, falling back to a single page: {}", e);
            return PaginationResult::single_page(params.viewport_height);
        }
    };

    if !is_usable(rendered_height) {
        warn!(
            "Host reported a degenerate content height ({}), falling back to a single page.",
            rendered_height
        );
        return PaginationResult::single_page(params.viewport_height);
    }

    let result = PaginationResult::from_rendered_height(rendered_height, params.viewport_height);
    debug!(
        total_pages = result.total_pages(),
        rendered_height,
        viewport_height = params.viewport_height,
        "Pagination computed"
    );
    result
}
