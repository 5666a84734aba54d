use rust_decimal::Decimal;
use serde::Serialize;

use remit_core::WithdrawalRequest;

const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

/// 1-based page selector with a clamped page size.
#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> usize {
        ((self.page - 1) * self.limit) as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of results plus the totals the caller needs for paging UI.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn assemble(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let total_pages = (total.div_ceil(u64::from(request.limit))) as u32;
        Self {
            items,
            page: request.page,
            limit: request.limit,
            total,
            total_pages,
        }
    }
}

/// Operator view of the pending queue: one page of requests plus the
/// queue-wide pending totals.
#[derive(Clone, Debug, Serialize)]
pub struct PendingListing {
    pub requests: Page<WithdrawalRequest>,
    pub pending_count: u64,
    pub pending_amount: Decimal,
}
