use chrono::{DateTime, Utc};

use remit_core::{UserId, WithdrawalMethod, WithdrawalStatus};

/// Sort key for withdrawal request listings.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RequestSort {
    #[default]
    CreatedAt,
    Amount,
}

/// Filter describing which withdrawal requests to load from storage.
///
/// Defaults to all requests, newest first.
#[derive(Clone, Debug, Default)]
pub struct RequestFilter {
    pub user: Option<UserId>,
    pub status: Option<WithdrawalStatus>,
    pub method: Option<WithdrawalMethod>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort: RequestSort,
    pub ascending: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl RequestFilter {
    pub fn for_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_status(mut self, status: WithdrawalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_method(mut self, method: WithdrawalMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn sorted_by(mut self, sort: RequestSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}
