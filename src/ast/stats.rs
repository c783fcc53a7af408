//! Statistics about the size of expression trees.

use std::fmt;

use hdrhistogram::Histogram;

use crate::ast::{ExprData, ExprKind};

#[derive(Debug)]
pub struct Stats {
    pub num_exprs: u64,
    pub num_constants: u64,
    pub num_blocks: u64,
    pub num_throws: u64,
    /// Depths of the leaves of the tree.
    depths: Histogram<u64>,
}

impl Stats {
    pub fn of(expr: &ExprData) -> Self {
        let mut stats = Stats::default();
        stats.visit(expr, 1);
        stats
    }

    pub fn depths_summary(&self) -> HistogramSummary {
        HistogramSummary::new(&self.depths)
    }

    fn visit(&mut self, e: &ExprData, depth: u64) {
        self.num_exprs += 1;
        match &e.kind {
            ExprKind::Constant(_) => self.num_constants += 1,
            ExprKind::Block(_, _) => self.num_blocks += 1,
            ExprKind::Throw(_) => self.num_throws += 1,
            _ => {}
        }
        let children = e.children();
        if children.is_empty() {
            self.depths += depth;
        }
        for child in children {
            self.visit(child, depth + 1);
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            num_exprs: 0,
            num_constants: 0,
            num_blocks: 0,
            num_throws: 0,
            depths: Histogram::new(0).unwrap(),
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[num_exprs={num_exprs} num_constants={num_constants} num_blocks={num_blocks} num_throws={num_throws} depths={depths}]",
            num_exprs = self.num_exprs,
            num_constants = self.num_constants,
            num_blocks = self.num_blocks,
            num_throws = self.num_throws,
            depths = self.depths_summary(),
        )
    }
}

/// Stores some bits of information about the distribution of values in a histogram.
pub struct HistogramSummary {
    pub len: u64,
    pub mean: f64,
    pub low: u64,
    pub high: u64,
    pub p50: u64,
    pub p90: u64,
}

impl HistogramSummary {
    fn new(h: &Histogram<u64>) -> Self {
        HistogramSummary {
            len: h.len(),
            mean: h.mean(),
            low: h.min(),
            high: h.max(),
            p50: h.value_at_quantile(0.5),
            p90: h.value_at_quantile(0.90),
        }
    }
}

impl fmt::Display for HistogramSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[n={len} m={mean:.3} [{low}, {high}] p50={p50} p90={p90}]",
            len = self.len,
            mean = self.mean,
            low = self.low,
            high = self.high,
            p50 = self.p50,
            p90 = self.p90,
        )
    }
}

#[cfg(test)]
mod test {
    use crate::ast::{BinOpKind, ExprBuilder, IntKind, TyKind};

    use super::Stats;

    #[test]
    fn counts_nodes_and_leaf_depths() {
        let b = ExprBuilder::new();
        let x = b.param("x", TyKind::Int(IntKind::I32));
        let expr = b.binary(
            BinOpKind::Add,
            b.i32_lit(1),
            b.binary(BinOpKind::Mul, x, b.i32_lit(2)),
        );
        let stats = Stats::of(&expr);
        assert_eq!(stats.num_exprs, 5);
        assert_eq!(stats.num_constants, 2);
        let depths = stats.depths_summary();
        assert_eq!(depths.len, 3);
        assert_eq!((depths.low, depths.high), (2, 3));
    }
}
