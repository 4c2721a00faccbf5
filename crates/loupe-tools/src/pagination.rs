//! Shared pagination rule for every V1 query tool (spec.md §4.7): `limit`
//! clamps into `[1, 200]` with a per-tool default, `offset` defaults to 0,
//! and callers fetch `limit + 1` rows so `truncated` can be derived without
//! a second `COUNT(*)` query.

pub const MAX_LIMIT: u32 = 200;

pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(requested_limit: Option<u32>, requested_offset: Option<u32>, default_limit: u32) -> Self {
        let limit = requested_limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT);
        let offset = requested_offset.unwrap_or(0);
        Self { limit, offset }
    }

    /// Rows to actually request from the store.
    pub fn fetch_limit(&self) -> u32 {
        self.limit + 1
    }

    /// Splits a `limit + 1`-sized fetch into the page to return plus whether
    /// more rows existed beyond it.
    pub fn truncate<T>(&self, mut rows: Vec<T>) -> (Vec<T>, bool) {
        let truncated = rows.len() as u32 > self.limit;
        rows.truncate(self.limit as usize);
        (rows, truncated)
    }
}
