use std::path::Path;

use cadscan_core::document::Document;
use cadscan_core::geometry::BoundingBox;
use cadscan_core::records::ExtractionResult;
use cadscan_io::{DocumentLoader, ResultSaver};
use tracing::info;

use crate::errors::ExtractError;
use crate::extract::{ExtractionStats, Extractor};
use crate::search::{MAX_SEARCH_ITERATIONS, SearchOutcome, WindowSearch};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// 缺省时取查询框高度。
    pub step: Option<f64>,
    pub max_iterations: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            step: None,
            max_iterations: MAX_SEARCH_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionRequest {
    pub bbox: BoundingBox,
    /// `None` 表示不搜索线性标注。
    pub search: Option<SearchOptions>,
}

impl ExtractionRequest {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            search: Some(SearchOptions::default()),
        }
    }

    pub fn without_search(bbox: BoundingBox) -> Self {
        Self { bbox, search: None }
    }
}

/// 窗口搜索的结果摘要，标注本身已并入 `ExtractionResult`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSummary {
    pub found: usize,
    pub iterations: u32,
    /// 命中时为命中的窗口，否则为最后扫描的窗口。
    pub window: Option<BoundingBox>,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub result: ExtractionResult,
    pub stats: ExtractionStats,
    pub search: Option<SearchSummary>,
}

/// 先按查询框提取各类实体，再按需搜索线性标注。
pub fn run(document: &Document, request: &ExtractionRequest) -> Extraction {
    let (mut result, stats) = Extractor::new(document, request.bbox).extract_with_stats();

    let search = request.search.map(|options| {
        let step = options.step.unwrap_or_else(|| request.bbox.height());
        let outcome = WindowSearch::new(request.bbox, step)
            .max_iterations(options.max_iterations)
            .run(document);
        match outcome {
            SearchOutcome::Found {
                window,
                iterations,
                dimensions,
            } => {
                let found = dimensions.len();
                result.linear_dimensions = Some(dimensions);
                SearchSummary {
                    found,
                    iterations,
                    window: Some(window),
                }
            }
            SearchOutcome::Exhausted {
                iterations,
                last_window,
            } => SearchSummary {
                found: 0,
                iterations,
                window: last_window,
            },
        }
    });

    Extraction {
        result,
        stats,
        search,
    }
}

/// 读取图纸、提取并写出结果。读取或写出失败时不会产生输出文件。
pub fn process<L, S>(
    loader: &L,
    saver: &S,
    input: &Path,
    output: &Path,
    request: &ExtractionRequest,
) -> Result<Extraction, ExtractError>
where
    L: DocumentLoader,
    S: ResultSaver,
{
    let document = loader.load(input)?;
    let extraction = run(&document, request);
    saver.save(&extraction.result, output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        records = extraction.result.record_count(),
        skipped = extraction.stats.skipped + document.skipped_entities(),
        "提取完成"
    );
    Ok(extraction)
}
