//! SQLite schema. Monetary columns are canonical decimal TEXT and are only
//! ever aggregated in Rust, never via SQL SUM (SQLite would coerce them to
//! binary floats). Date columns are `YYYY-MM-DD` TEXT.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id              INTEGER PRIMARY KEY,
    tenant_id       INTEGER NOT NULL,
    name            TEXT NOT NULL,
    phone           TEXT,
    is_defaulter    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL DEFAULT (date('now'))
);

CREATE TABLE IF NOT EXISTS loans (
    id                      INTEGER PRIMARY KEY,
    tenant_id               INTEGER NOT NULL,
    loan_number             TEXT NOT NULL,
    loan_type               TEXT NOT NULL,
    borrower_id             INTEGER NOT NULL REFERENCES customers(id),
    guarantor_id            INTEGER REFERENCES customers(id),
    principal_amount        TEXT NOT NULL,
    interest_rate           TEXT NOT NULL,
    disbursement_date       TEXT NOT NULL,
    status                  TEXT NOT NULL DEFAULT 'ACTIVE',
    version                 INTEGER NOT NULL DEFAULT 0,
    is_migrated             INTEGER NOT NULL DEFAULT 0,

    -- monthly variant
    remaining_principal     TEXT,
    -- remaining principal at migration time; billing base for migrated loans
    migrated_remaining_principal TEXT,
    billing_principal       TEXT,
    advance_interest_amount TEXT,
    monthly_due_day         INTEGER,
    interest_paid_through   TEXT,
    expected_months         INTEGER,

    -- daily variant
    term_days               INTEGER,
    total_repayment_amount  TEXT,
    daily_payment_amount    TEXT,
    term_end_date           TEXT,
    grace_days              INTEGER,
    total_collected         TEXT,

    created_by              INTEGER NOT NULL,
    created_at              TEXT NOT NULL DEFAULT (date('now')),
    closed_at               TEXT,
    closed_by               INTEGER,
    defaulted_at            TEXT,
    defaulted_by            INTEGER,
    written_off_at          TEXT,
    written_off_by          INTEGER,
    cancelled_at            TEXT,
    cancelled_by            INTEGER,

    UNIQUE (tenant_id, loan_number)
);

CREATE INDEX IF NOT EXISTS idx_loans_tenant_status ON loans (tenant_id, status);

CREATE TABLE IF NOT EXISTS penalties (
    id               INTEGER PRIMARY KEY,
    tenant_id        INTEGER NOT NULL,
    loan_id          INTEGER NOT NULL REFERENCES loans(id),
    days_overdue     INTEGER NOT NULL,
    months_charged   INTEGER NOT NULL,
    amount           TEXT NOT NULL,
    waived_amount    TEXT NOT NULL DEFAULT '0',
    amount_collected TEXT NOT NULL DEFAULT '0',
    status           TEXT NOT NULL DEFAULT 'PENDING',
    was_overridden   INTEGER NOT NULL DEFAULT 0,
    imposed_date     TEXT NOT NULL,
    imposed_by       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_penalties_loan ON penalties (loan_id);

CREATE TABLE IF NOT EXISTS transactions (
    id                        INTEGER PRIMARY KEY,
    tenant_id                 INTEGER NOT NULL,
    loan_id                   INTEGER NOT NULL REFERENCES loans(id),
    penalty_id                INTEGER REFERENCES penalties(id),
    txn_type                  TEXT NOT NULL,
    amount                    TEXT NOT NULL,
    transaction_date          TEXT NOT NULL,
    effective_date            TEXT,
    approval_status           TEXT NOT NULL DEFAULT 'PENDING',
    corrected_transaction_id  INTEGER REFERENCES transactions(id),
    collected_by              INTEGER NOT NULL,
    approved_by               INTEGER,
    approved_at               TEXT,
    rejected_by               INTEGER,
    rejected_at               TEXT,
    rejection_reason          TEXT,
    notes                     TEXT,
    created_at                TEXT NOT NULL DEFAULT (date('now'))
);

CREATE INDEX IF NOT EXISTS idx_txns_loan ON transactions (loan_id, txn_type);
CREATE INDEX IF NOT EXISTS idx_txns_tenant_status ON transactions (tenant_id, approval_status);

CREATE TABLE IF NOT EXISTS principal_returns (
    id                        INTEGER PRIMARY KEY,
    tenant_id                 INTEGER NOT NULL,
    loan_id                   INTEGER NOT NULL REFERENCES loans(id),
    transaction_id            INTEGER NOT NULL REFERENCES transactions(id),
    amount                    TEXT NOT NULL,
    remaining_principal_after TEXT NOT NULL,
    return_date               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_returns_loan ON principal_returns (loan_id, return_date);

CREATE TABLE IF NOT EXISTS fund_entries (
    id          INTEGER PRIMARY KEY,
    tenant_id   INTEGER NOT NULL,
    entry_type  TEXT NOT NULL,
    amount      TEXT NOT NULL,
    entry_date  TEXT NOT NULL,
    notes       TEXT
);

CREATE TABLE IF NOT EXISTS expenses (
    id           INTEGER PRIMARY KEY,
    tenant_id    INTEGER NOT NULL,
    amount       TEXT NOT NULL,
    expense_date TEXT NOT NULL,
    category     TEXT,
    notes        TEXT,
    is_deleted   INTEGER NOT NULL DEFAULT 0
);
"#;
