use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::warn;

use remit_core::{
    Amount, BalanceAccount, CreditEvent, PaymentDetails, RequestId, UserId, WithdrawalRequest,
    WithdrawalStatus,
};
use uuid::Uuid;

use crate::{
    CreationGuards, Decision, LedgerError, LedgerResult, LedgerStore, RequestFilter, RequestSort,
    WithdrawalStats,
};

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS balance_accounts (
    user_id TEXT PRIMARY KEY,
    withdrawable TEXT NOT NULL,
    pending TEXT NOT NULL,
    total_withdrawn TEXT NOT NULL,
    lifetime_earnings TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS withdrawal_requests (
    request_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    method TEXT NOT NULL,
    details TEXT NOT NULL,
    status TEXT NOT NULL,
    transaction_reference TEXT,
    rejection_reason TEXT,
    processed_by TEXT,
    processed_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS withdrawal_idx_user_status
    ON withdrawal_requests(user_id, status);
CREATE INDEX IF NOT EXISTS withdrawal_idx_created
    ON withdrawal_requests(created_at);
CREATE TABLE IF NOT EXISTS credit_events (
    event_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    source_purchase_id TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS credit_idx_user_created
    ON credit_events(user_id, created_at);
"#;

const BUSY_RETRIES: u32 = 3;

const REQUEST_COLUMNS: &str = "request_id, user_id, amount, details, status, \
     transaction_reference, rejection_reason, processed_by, processed_at, created_at";

/// SQLite-backed ledger store used by the live service.
///
/// Mutations run inside immediate transactions, which serializes writers
/// per database and therefore per user account.
#[derive(Clone, Debug)]
pub struct SqliteLedgerStore {
    path: PathBuf,
}

impl SqliteLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let store = Self { path: path.into() };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;",
        )?;
        Ok(conn)
    }

    /// Run `op` inside an immediate transaction, retrying a bounded number
    /// of times when the database is locked by another writer.
    fn with_tx<T>(
        &self,
        op: impl Fn(&rusqlite::Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut attempt = 0;
        loop {
            let mut conn = self.connect()?;
            let outcome: LedgerResult<T> = (|| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let value = op(&tx)?;
                tx.commit()?;
                Ok(value)
            })();
            match outcome {
                Err(LedgerError::Busy) if attempt < BUSY_RETRIES => {
                    attempt += 1;
                    warn!(attempt, "ledger transaction found the store busy, retrying");
                    std::thread::sleep(std::time::Duration::from_millis(25 * u64::from(attempt)));
                }
                other => return other,
            }
        }
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn credit(&self, event: &CreditEvent) -> LedgerResult<BalanceAccount> {
        if event.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(event.amount));
        }
        self.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO credit_events (
                    event_id, user_id, amount, source_purchase_id, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.id.to_string(),
                    event.user_id.as_str(),
                    decimal_text(event.amount),
                    event.source_purchase_id,
                    event.created_at.to_rfc3339(),
                ],
            )?;
            if inserted == 0 {
                return Err(LedgerError::DuplicateCreditEvent(
                    event.source_purchase_id.clone(),
                ));
            }
            let mut account = load_account(tx, &event.user_id)?;
            account.withdrawable += event.amount;
            account.lifetime_earnings += event.amount;
            account.updated_at = Utc::now();
            store_account(tx, &account)?;
            Ok(account)
        })
    }

    fn lock(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
        self.with_tx(|tx| apply_lock(tx, user, amount))
    }

    fn release(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
        self.with_tx(|tx| apply_release(tx, user, amount))
    }

    fn commit(&self, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
        self.with_tx(|tx| apply_commit(tx, user, amount))
    }

    fn balance(&self, user: &UserId) -> LedgerResult<BalanceAccount> {
        let conn = self.connect()?;
        load_account(&conn, user)
    }

    fn create_request(
        &self,
        request: &WithdrawalRequest,
        guards: &CreationGuards,
    ) -> LedgerResult<WithdrawalRequest> {
        self.with_tx(|tx| {
            let pending_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM withdrawal_requests
                 WHERE user_id = ?1 AND status = 'pending'",
                params![request.user_id.as_str()],
                |row| row.get(0),
            )?;
            if pending_count >= i64::from(guards.max_pending_requests) {
                return Err(LedgerError::TooManyRequests {
                    pending_count: pending_count as u32,
                    max_allowed: guards.max_pending_requests,
                });
            }

            let window_start = request.created_at - guards.duplicate_window;
            let first_requested_at: Option<String> = tx
                .query_row(
                    "SELECT created_at FROM withdrawal_requests
                     WHERE user_id = ?1 AND status = 'pending'
                       AND method = ?2 AND amount = ?3 AND created_at >= ?4
                     ORDER BY created_at ASC LIMIT 1",
                    params![
                        request.user_id.as_str(),
                        request.method().as_str(),
                        decimal_text(request.amount),
                        window_start.to_rfc3339(),
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(raw) = first_requested_at {
                return Err(LedgerError::DuplicateRequest {
                    first_requested_at: parse_timestamp(&raw)?,
                });
            }

            apply_lock(tx, &request.user_id, request.amount)?;
            insert_request(tx, request)?;
            Ok(request.clone())
        })
    }

    fn decide_request(&self, id: RequestId, decision: &Decision) -> LedgerResult<WithdrawalRequest> {
        self.with_tx(|tx| {
            let mut request = get_request(tx, id)?.ok_or(LedgerError::RequestNotFound(id))?;
            if request.status != WithdrawalStatus::Pending {
                return Err(LedgerError::RequestNotPending {
                    id,
                    status: request.status,
                });
            }

            match decision {
                Decision::Approve {
                    transaction_reference,
                    ..
                } => {
                    apply_commit(tx, &request.user_id, request.amount)?;
                    request.transaction_reference = Some(transaction_reference.clone());
                }
                Decision::Reject { reason, .. } => {
                    apply_release(tx, &request.user_id, request.amount)?;
                    request.rejection_reason = Some(reason.clone());
                }
            }
            request.status = decision.status();
            request.processed_by = Some(decision.operator().clone());
            request.processed_at = Some(decision.decided_at());

            tx.execute(
                "UPDATE withdrawal_requests
                 SET status = ?2, transaction_reference = ?3, rejection_reason = ?4,
                     processed_by = ?5, processed_at = ?6
                 WHERE request_id = ?1",
                params![
                    request.id.to_string(),
                    request.status.as_str(),
                    request.transaction_reference,
                    request.rejection_reason,
                    request.processed_by.as_ref().map(|op| op.to_string()),
                    request.processed_at.map(|ts| ts.to_rfc3339()),
                ],
            )?;
            Ok(request)
        })
    }

    fn update_details(
        &self,
        id: RequestId,
        details: &PaymentDetails,
    ) -> LedgerResult<WithdrawalRequest> {
        self.with_tx(|tx| {
            let mut request = get_request(tx, id)?.ok_or(LedgerError::RequestNotFound(id))?;
            if request.status != WithdrawalStatus::Pending {
                return Err(LedgerError::RequestNotPending {
                    id,
                    status: request.status,
                });
            }
            request.details = details.clone();
            tx.execute(
                "UPDATE withdrawal_requests SET method = ?2, details = ?3 WHERE request_id = ?1",
                params![
                    request.id.to_string(),
                    request.method().as_str(),
                    details_text(details)?,
                ],
            )?;
            Ok(request)
        })
    }

    fn find_request(&self, id: RequestId) -> LedgerResult<Option<WithdrawalRequest>> {
        let conn = self.connect()?;
        get_request(&conn, id)
    }

    fn query_requests(&self, filter: &RequestFilter) -> LedgerResult<Vec<WithdrawalRequest>> {
        let conn = self.connect()?;
        let mut sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM withdrawal_requests
             WHERE (?1 IS NULL OR user_id = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR method = ?3)
               AND (?4 IS NULL OR created_at >= ?4)
               AND (?5 IS NULL OR created_at <= ?5)
             ORDER BY "
        );
        sql.push_str(match filter.sort {
            RequestSort::CreatedAt => "created_at",
            RequestSort::Amount => "CAST(amount AS REAL)",
        });
        sql.push_str(if filter.ascending { " ASC" } else { " DESC" });
        sql.push_str(", request_id LIMIT ?6 OFFSET ?7");

        let mut params: Vec<Value> = filter_params(filter);
        params.push(Value::Integer(
            filter.limit.map(|v| v as i64).unwrap_or(-1),
        ));
        params.push(Value::Integer(
            filter.offset.map(|v| v as i64).unwrap_or(0),
        ));

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut requests = Vec::new();
        while let Some(row) = rows.next()? {
            requests.push(row_to_request(row)?);
        }
        Ok(requests)
    }

    fn count_requests(&self, filter: &RequestFilter) -> LedgerResult<u64> {
        let conn = self.connect()?;
        let params = filter_params(filter);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM withdrawal_requests
             WHERE (?1 IS NULL OR user_id = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR method = ?3)
               AND (?4 IS NULL OR created_at >= ?4)
               AND (?5 IS NULL OR created_at <= ?5)",
            params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn withdrawal_stats(&self) -> LedgerResult<WithdrawalStats> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT status, amount FROM withdrawal_requests")?;
        let mut rows = stmt.query([])?;
        let mut stats = WithdrawalStats::default();
        while let Some(row) = rows.next()? {
            let status_raw: String = row.get(0)?;
            let amount_raw: String = row.get(1)?;
            let status =
                WithdrawalStatus::from_str(&status_raw).map_err(LedgerError::Serialization)?;
            stats.absorb(status, parse_decimal(&amount_raw)?);
        }
        Ok(stats)
    }

    fn credit_events(
        &self,
        user: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<Vec<CreditEvent>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, user_id, amount, source_purchase_id, created_at
             FROM credit_events
             WHERE user_id = ?1 AND (?2 IS NULL OR created_at >= ?2)
             ORDER BY created_at ASC",
        )?;
        let params: Vec<Value> = vec![
            Value::from(user.as_str().to_string()),
            optional_text(since.map(|ts| ts.to_rfc3339())),
        ];
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(row_to_event(row)?);
        }
        Ok(events)
    }
}

fn filter_params(filter: &RequestFilter) -> Vec<Value> {
    vec![
        optional_text(filter.user.as_ref().map(|id| id.to_string())),
        optional_text(filter.status.map(|s| s.as_str().to_string())),
        optional_text(filter.method.map(|m| m.as_str().to_string())),
        optional_text(filter.created_after.map(|ts| ts.to_rfc3339())),
        optional_text(filter.created_before.map(|ts| ts.to_rfc3339())),
    ]
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

fn details_text(details: &PaymentDetails) -> LedgerResult<String> {
    serde_json::to_string(details)
        .map_err(|err| LedgerError::Serialization(format!("invalid payment details: {err}")))
}

fn parse_decimal(text: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(text)
        .map_err(|err| LedgerError::Serialization(format!("invalid decimal {text}: {err}")))
}

fn parse_timestamp(text: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {text}: {err}")))
}

fn load_account(conn: &Connection, user: &UserId) -> LedgerResult<BalanceAccount> {
    let row = conn
        .query_row(
            "SELECT withdrawable, pending, total_withdrawn, lifetime_earnings, updated_at
             FROM balance_accounts WHERE user_id = ?1",
            params![user.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;
    match row {
        Some((withdrawable, pending, total_withdrawn, lifetime_earnings, updated_at)) => {
            Ok(BalanceAccount {
                user_id: user.clone(),
                withdrawable: parse_decimal(&withdrawable)?,
                pending: parse_decimal(&pending)?,
                total_withdrawn: parse_decimal(&total_withdrawn)?,
                lifetime_earnings: parse_decimal(&lifetime_earnings)?,
                updated_at: parse_timestamp(&updated_at)?,
            })
        }
        None => Ok(BalanceAccount::empty(user.clone())),
    }
}

fn store_account(conn: &Connection, account: &BalanceAccount) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO balance_accounts (
            user_id, withdrawable, pending, total_withdrawn, lifetime_earnings, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
            withdrawable = excluded.withdrawable,
            pending = excluded.pending,
            total_withdrawn = excluded.total_withdrawn,
            lifetime_earnings = excluded.lifetime_earnings,
            updated_at = excluded.updated_at",
        params![
            account.user_id.as_str(),
            decimal_text(account.withdrawable),
            decimal_text(account.pending),
            decimal_text(account.total_withdrawn),
            decimal_text(account.lifetime_earnings),
            account.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn apply_lock(conn: &Connection, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let mut account = load_account(conn, user)?;
    if account.withdrawable < amount {
        return Err(LedgerError::InsufficientBalance {
            available: account.withdrawable,
        });
    }
    account.withdrawable -= amount;
    account.pending += amount;
    account.updated_at = Utc::now();
    store_account(conn, &account)?;
    Ok(account)
}

fn apply_release(conn: &Connection, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let mut account = load_account(conn, user)?;
    if account.pending < amount {
        return Err(LedgerError::InsufficientPending {
            pending: account.pending,
            requested: amount,
        });
    }
    account.pending -= amount;
    account.withdrawable += amount;
    account.updated_at = Utc::now();
    store_account(conn, &account)?;
    Ok(account)
}

fn apply_commit(conn: &Connection, user: &UserId, amount: Amount) -> LedgerResult<BalanceAccount> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let mut account = load_account(conn, user)?;
    if account.pending < amount {
        return Err(LedgerError::InsufficientPending {
            pending: account.pending,
            requested: amount,
        });
    }
    account.pending -= amount;
    account.total_withdrawn += amount;
    account.updated_at = Utc::now();
    store_account(conn, &account)?;
    Ok(account)
}

fn insert_request(conn: &Connection, request: &WithdrawalRequest) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO withdrawal_requests (
            request_id, user_id, amount, method, details, status,
            transaction_reference, rejection_reason, processed_by, processed_at, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            request.id.to_string(),
            request.user_id.as_str(),
            decimal_text(request.amount),
            request.method().as_str(),
            details_text(&request.details)?,
            request.status.as_str(),
            request.transaction_reference,
            request.rejection_reason,
            request.processed_by.as_ref().map(|op| op.to_string()),
            request.processed_at.map(|ts| ts.to_rfc3339()),
            request.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn get_request(conn: &Connection, id: RequestId) -> LedgerResult<Option<WithdrawalRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM withdrawal_requests WHERE request_id = ?1"
    ))?;
    let mut rows = stmt.query(params![id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_request(row)?)),
        None => Ok(None),
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> LedgerResult<WithdrawalRequest> {
    let request_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let amount: String = row.get(2)?;
    let details: String = row.get(3)?;
    let status: String = row.get(4)?;
    let transaction_reference: Option<String> = row.get(5)?;
    let rejection_reason: Option<String> = row.get(6)?;
    let processed_by: Option<String> = row.get(7)?;
    let processed_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;

    Ok(WithdrawalRequest {
        id: RequestId::from_str(&request_id).map_err(|err| {
            LedgerError::Serialization(format!("invalid request id {request_id}: {err}"))
        })?,
        user_id: UserId::from(user_id),
        amount: parse_decimal(&amount)?,
        details: serde_json::from_str(&details).map_err(|err| {
            LedgerError::Serialization(format!("invalid payment details payload: {err}"))
        })?,
        status: WithdrawalStatus::from_str(&status).map_err(LedgerError::Serialization)?,
        transaction_reference,
        rejection_reason,
        processed_by: processed_by.map(remit_core::OperatorId::from),
        processed_at: processed_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> LedgerResult<CreditEvent> {
    let event_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let amount: String = row.get(2)?;
    let source_purchase_id: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(CreditEvent {
        id: Uuid::parse_str(&event_id).map_err(|err| {
            LedgerError::Serialization(format!("invalid event id {event_id}: {err}"))
        })?,
        user_id: UserId::from(user_id),
        amount: parse_decimal(&amount)?,
        source_purchase_id,
        created_at: parse_timestamp(&created_at)?,
    })
}
