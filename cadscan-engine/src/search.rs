//! 移动窗口搜索：查询框内没有线性标注时，保持框的大小不变，交替向下、向上平移，
//! 直到找到标注或达到迭代上限。

use cadscan_core::document::Document;
use cadscan_core::geometry::BoundingBox;
use cadscan_core::records::LinearDimensionRecord;
use tracing::{debug, info};

use crate::extract::extract_linear_dimensions;

pub const MAX_SEARCH_ITERATIONS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[inline]
    pub fn flipped(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found {
        window: BoundingBox,
        iterations: u32,
        dimensions: Vec<LinearDimensionRecord>,
    },
    /// 达到迭代上限仍未找到，不视为错误。
    Exhausted {
        iterations: u32,
        last_window: Option<BoundingBox>,
    },
}

impl SearchOutcome {
    #[inline]
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }

    pub fn iterations(&self) -> u32 {
        match self {
            SearchOutcome::Found { iterations, .. } | SearchOutcome::Exhausted { iterations, .. } => {
                *iterations
            }
        }
    }
}

/// 搜索状态。上下两侧各自累计偏移量，轮流前进一步，
/// 窗口序列为：原始框、下移 1 步、上移 1 步、下移 2 步、上移 2 步……
///
/// 作为 `Iterator` 时依次产出待扫描的窗口。计数超过 `max_iterations` 才停止，
/// 因此最多扫描 `max_iterations + 1` 个窗口。
#[derive(Debug, Clone)]
pub struct WindowSearch {
    origin: BoundingBox,
    step: f64,
    max_iterations: u32,
    up_offset: f64,
    down_offset: f64,
    direction: Direction,
    pending: BoundingBox,
    iterations: u32,
    last_scanned: Option<BoundingBox>,
}

impl WindowSearch {
    pub fn new(origin: BoundingBox, step: f64) -> Self {
        Self {
            origin,
            step,
            max_iterations: MAX_SEARCH_ITERATIONS,
            up_offset: 0.0,
            down_offset: 0.0,
            direction: Direction::Up,
            pending: origin,
            iterations: 0,
            last_scanned: None,
        }
    }

    /// 步长取查询框高度。
    pub fn with_default_step(origin: BoundingBox) -> Self {
        Self::new(origin, origin.height())
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[inline]
    pub fn origin(&self) -> BoundingBox {
        self.origin
    }

    #[inline]
    pub fn step(&self) -> f64 {
        self.step
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn run(self, document: &Document) -> SearchOutcome {
        self.run_with(|window| extract_linear_dimensions(document, window))
    }

    /// 用给定的扫描函数驱动搜索。
    pub fn run_with<F>(mut self, mut scan: F) -> SearchOutcome
    where
        F: FnMut(BoundingBox) -> Vec<LinearDimensionRecord>,
    {
        while let Some(window) = self.next() {
            let dimensions = scan(window);
            if !dimensions.is_empty() {
                info!(
                    window = %window,
                    iterations = self.iterations,
                    found = dimensions.len(),
                    "在查询框内找到线性标注"
                );
                return SearchOutcome::Found {
                    window,
                    iterations: self.iterations,
                    dimensions,
                };
            }
            debug!(window = %window, "查询框内没有线性标注，移动查询框");
        }

        info!(
            iterations = self.iterations,
            max_iterations = self.max_iterations,
            "达到迭代上限，未找到线性标注"
        );
        SearchOutcome::Exhausted {
            iterations: self.iterations,
            last_window: self.last_scanned,
        }
    }

    fn advance(&mut self) {
        self.direction = self.direction.flipped();
        self.pending = match self.direction {
            Direction::Down => {
                self.down_offset += self.step;
                self.origin.shifted_y(-self.down_offset)
            }
            Direction::Up => {
                self.up_offset += self.step;
                self.origin.shifted_y(self.up_offset)
            }
        };
    }
}

impl Iterator for WindowSearch {
    type Item = BoundingBox;

    fn next(&mut self) -> Option<BoundingBox> {
        if self.iterations > self.max_iterations {
            return None;
        }
        let window = self.pending;
        self.iterations += 1;
        self.last_scanned = Some(window);
        self.advance();
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadscan_core::document::{Dimension, Entity};
    use cadscan_core::geometry::Point3;

    fn origin() -> BoundingBox {
        BoundingBox::new(0.0, 100.0, 50.0, 120.0)
    }

    #[test]
    fn windows_alternate_with_independent_offsets() {
        let windows: Vec<(f64, f64)> = WindowSearch::new(origin(), 10.0)
            .take(5)
            .map(|window| (window.ymin, window.ymax))
            .collect();
        assert_eq!(
            windows,
            vec![
                (100.0, 120.0),
                (90.0, 110.0),
                (110.0, 130.0),
                (80.0, 100.0),
                (120.0, 140.0),
            ]
        );
    }

    #[test]
    fn default_step_is_box_height() {
        let mut search = WindowSearch::with_default_step(origin());
        assert_eq!(search.step(), 20.0);
        assert_eq!(search.direction(), Direction::Up);
        search.next();
        assert_eq!(search.direction(), Direction::Down);
        assert_eq!(search.next().map(|w| w.ymin), Some(80.0));
        assert_eq!(search.iterations(), 2);
    }

    #[test]
    fn iterator_stops_at_ceiling() {
        let search = WindowSearch::new(origin(), 1.0).max_iterations(7);
        assert_eq!(search.count(), 8);
    }

    #[test]
    fn exhausted_without_dimensions() {
        let document = Document::new();
        let outcome = WindowSearch::new(origin(), 10.0).run(&document);
        assert!(!outcome.is_found());
        assert_eq!(outcome.iterations(), MAX_SEARCH_ITERATIONS + 1);
        match outcome {
            SearchOutcome::Exhausted { last_window, .. } => {
                // 第 1001 个窗口是上移 500 步
                let last = last_window.expect("至少扫描过一个窗口");
                assert_eq!(last.ymin, 100.0 + 5000.0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn finds_dimension_below_origin() {
        let mut document = Document::new();
        // 水平标注，代表点 (25, 95)
        document.add_entity(Entity::Dimension(Dimension::linear(
            Point3::new(25.0, 95.0, 0.0),
            Point3::new(0.0, 90.0, 0.0),
            Point3::new(50.0, 100.0, 0.0),
        )));

        let outcome = WindowSearch::new(origin(), 10.0).run(&document);
        match outcome {
            SearchOutcome::Found {
                window,
                iterations,
                dimensions,
            } => {
                assert_eq!(iterations, 2);
                assert_eq!(window, BoundingBox::new(0.0, 90.0, 50.0, 110.0));
                assert_eq!(dimensions.len(), 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn scan_count_exceeds_ceiling_by_one() {
        let mut scans = 0;
        let outcome = WindowSearch::new(origin(), 10.0).run_with(|_| {
            scans += 1;
            Vec::new()
        });
        assert_eq!(scans, 1001);
        assert_eq!(outcome.iterations(), 1001);
    }

    #[test]
    fn zero_step_rescans_the_same_window() {
        let mut scanned = Vec::new();
        let outcome = WindowSearch::new(origin(), 0.0)
            .max_iterations(3)
            .run_with(|window| {
                scanned.push(window);
                Vec::new()
            });
        assert_eq!(outcome.iterations(), 4);
        assert!(scanned.iter().all(|window| *window == origin()));
    }
}
