//! Purpose: Assemble scan descriptors from resolved key bounds without performing any I/O.
//! Exports: `ScanBoundary`, `ScanPlan`, `build_scan_plan`.
//! Role: Pure planning layer consumed by scanner builders and the store connection.
//! Invariants: No side effects; output depends only on the inputs.
//! Invariants: `cache_size == 0` means "engine default" and is passed through untouched.
//! Invariants: Lower bound is inclusive, upper bound exclusive; `None` leaves that side open.

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanBoundary {
    pub lower: Option<Vec<u8>>,
    pub upper: Option<Vec<u8>>,
}

impl ScanBoundary {
    pub fn new(lower: Option<Vec<u8>>, upper: Option<Vec<u8>>) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// True when both sides are bounded and the range cannot hold any key.
    pub fn is_empty_range(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => lower >= upper,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScanPlan {
    pub table: String,
    pub cache_size: u32,
    pub bounds: ScanBoundary,
}

impl ScanPlan {
    pub fn lower(&self) -> Option<&[u8]> {
        self.bounds.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[u8]> {
        self.bounds.upper.as_deref()
    }
}

pub fn build_scan_plan(
    table: impl Into<String>,
    cache_size: u32,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
) -> ScanPlan {
    ScanPlan {
        table: table.into(),
        cache_size,
        bounds: ScanBoundary::new(lower, upper),
    }
}
