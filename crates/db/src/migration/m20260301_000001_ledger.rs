//! Ledger schema migration.
//!
//! Creates the chart of accounts, the journal, the cash/bank mirror, the
//! approval tables, the source registries and the guard triggers that keep
//! posted history immutable.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: CHART OF ACCOUNTS
        // ============================================================
        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(CASH_BANKS_SQL).await?;

        // ============================================================
        // PART 3: SOURCE REGISTRIES
        // ============================================================
        db.execute_unprepared(SOURCES_SQL).await?;

        // ============================================================
        // PART 4: JOURNAL
        // ============================================================
        db.execute_unprepared(JOURNAL_ENTRIES_SQL).await?;
        db.execute_unprepared(JOURNAL_LINES_SQL).await?;
        db.execute_unprepared(JOURNAL_COUNTERS_SQL).await?;

        // ============================================================
        // PART 5: APPROVAL WORKFLOW
        // ============================================================
        db.execute_unprepared(APPROVALS_SQL).await?;

        // ============================================================
        // PART 6: RECONCILIATION
        // ============================================================
        db.execute_unprepared(DRIFT_ALERTS_SQL).await?;

        // ============================================================
        // PART 7: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE account_type AS ENUM (
    'ASSET',
    'LIABILITY',
    'EQUITY',
    'REVENUE',
    'EXPENSE'
);

CREATE TYPE source_type AS ENUM (
    'SALE',
    'PURCHASE',
    'PAYMENT',
    'TRANSFER',
    'MANUAL'
);

CREATE TYPE entry_status AS ENUM ('DRAFT', 'POSTED', 'VOID');

CREATE TYPE approver_role AS ENUM (
    'employee',
    'finance',
    'manager',
    'director',
    'admin'
);

CREATE TYPE approval_status AS ENUM ('PENDING', 'APPROVED', 'REJECTED');

CREATE TYPE action_status AS ENUM (
    'PENDING',
    'APPROVED',
    'REJECTED',
    'ESCALATED'
);

CREATE TYPE drift_kind AS ENUM ('ACCOUNT', 'HEADER', 'MIRROR');
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    code VARCHAR(20) NOT NULL UNIQUE,
    name VARCHAR(255) NOT NULL,
    account_type account_type NOT NULL,
    parent_id UUID REFERENCES accounts(id) ON DELETE RESTRICT,
    is_header BOOLEAN NOT NULL DEFAULT false,
    is_active BOOLEAN NOT NULL DEFAULT true,
    balance NUMERIC(20, 2) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_account_not_own_parent CHECK (parent_id IS NULL OR parent_id <> id)
);

CREATE INDEX idx_accounts_parent ON accounts(parent_id) WHERE parent_id IS NOT NULL;
CREATE INDEX idx_accounts_type ON accounts(account_type);
";

const CASH_BANKS_SQL: &str = r"
CREATE TABLE cash_banks (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    account_number VARCHAR(50),
    account_id UUID NOT NULL UNIQUE REFERENCES accounts(id) ON DELETE RESTRICT,
    balance NUMERIC(20, 2) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const SOURCES_SQL: &str = r"
CREATE TABLE sales (
    id BIGSERIAL PRIMARY KEY,
    reference VARCHAR(100) NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE purchases (
    id BIGSERIAL PRIMARY KEY,
    reference VARCHAR(100) NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE payments (
    id BIGSERIAL PRIMARY KEY,
    reference VARCHAR(100) NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE transfers (
    id BIGSERIAL PRIMARY KEY,
    reference VARCHAR(100) NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const JOURNAL_ENTRIES_SQL: &str = r"
CREATE TABLE journal_entries (
    id UUID PRIMARY KEY,
    entry_number VARCHAR(40) UNIQUE,
    source_type source_type NOT NULL,
    source_id BIGINT,
    entry_date DATE NOT NULL,
    description TEXT NOT NULL,
    status entry_status NOT NULL DEFAULT 'DRAFT',
    total_debit NUMERIC(20, 2) NOT NULL DEFAULT 0,
    total_credit NUMERIC(20, 2) NOT NULL DEFAULT 0,
    reverses_entry_id UUID REFERENCES journal_entries(id),
    reversed_by_entry_id UUID REFERENCES journal_entries(id),
    void_reason TEXT,
    voided_at TIMESTAMPTZ,
    posted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_source_id_pairing CHECK (
        (source_type = 'MANUAL' AND source_id IS NULL)
        OR (source_type <> 'MANUAL' AND source_id IS NOT NULL)
    ),
    CONSTRAINT chk_posted_has_number CHECK (status <> 'POSTED' OR entry_number IS NOT NULL),
    CONSTRAINT chk_totals_non_negative CHECK (total_debit >= 0 AND total_credit >= 0)
);

-- Exactly one live originating entry per business event.
-- Compensating entries share the source but are excluded.
CREATE UNIQUE INDEX uq_journal_entries_source
    ON journal_entries(source_type, source_id)
    WHERE source_type <> 'MANUAL' AND status <> 'VOID' AND reverses_entry_id IS NULL;

CREATE UNIQUE INDEX uq_journal_entries_reverses
    ON journal_entries(reverses_entry_id)
    WHERE reverses_entry_id IS NOT NULL;

CREATE INDEX idx_journal_entries_date ON journal_entries(entry_date, entry_number);
CREATE INDEX idx_journal_entries_status ON journal_entries(status);
";

const JOURNAL_LINES_SQL: &str = r"
CREATE TABLE journal_lines (
    id UUID PRIMARY KEY,
    entry_id UUID NOT NULL REFERENCES journal_entries(id) ON DELETE RESTRICT,
    account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    line_number INTEGER NOT NULL,
    debit NUMERIC(20, 2) NOT NULL DEFAULT 0,
    credit NUMERIC(20, 2) NOT NULL DEFAULT 0,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (entry_id, line_number),
    CONSTRAINT chk_debit_xor_credit CHECK (
        (debit > 0 AND credit = 0) OR (debit = 0 AND credit > 0)
    ),
    CONSTRAINT chk_line_number_positive CHECK (line_number > 0)
);

CREATE INDEX idx_journal_lines_account ON journal_lines(account_id);
";

const JOURNAL_COUNTERS_SQL: &str = r"
CREATE TABLE journal_entry_counters (
    prefix VARCHAR(20) NOT NULL,
    year INTEGER NOT NULL,
    last_value BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (prefix, year),
    CONSTRAINT chk_counter_positive CHECK (last_value > 0)
);
";

const APPROVALS_SQL: &str = r"
CREATE TABLE approval_requests (
    id UUID PRIMARY KEY,
    source_type source_type NOT NULL,
    source_id BIGINT NOT NULL,
    amount NUMERIC(20, 2) NOT NULL,
    status approval_status NOT NULL DEFAULT 'PENDING',
    rejection_reason TEXT,
    resubmitted_from UUID REFERENCES approval_requests(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    completed_at TIMESTAMPTZ,
    CONSTRAINT chk_approval_not_manual CHECK (source_type <> 'MANUAL')
);

-- One live (pending or approved) request per source.
CREATE UNIQUE INDEX uq_approval_requests_live
    ON approval_requests(source_type, source_id)
    WHERE status IN ('PENDING', 'APPROVED');

CREATE INDEX idx_approval_requests_source
    ON approval_requests(source_type, source_id, created_at DESC);

CREATE TABLE approval_steps (
    id UUID PRIMARY KEY,
    request_id UUID NOT NULL REFERENCES approval_requests(id) ON DELETE CASCADE,
    step_order INTEGER NOT NULL,
    role approver_role NOT NULL,
    escalated_from UUID REFERENCES approval_steps(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    -- Deferrable so escalation can shift later steps in one statement.
    CONSTRAINT uq_approval_steps_order UNIQUE (request_id, step_order)
        DEFERRABLE INITIALLY IMMEDIATE,
    CONSTRAINT chk_step_order_positive CHECK (step_order > 0)
);

CREATE TABLE approval_actions (
    id UUID PRIMARY KEY,
    step_id UUID NOT NULL UNIQUE REFERENCES approval_steps(id) ON DELETE CASCADE,
    status action_status NOT NULL DEFAULT 'PENDING',
    actor_id UUID,
    actor_role approver_role,
    comment TEXT,
    acted_at TIMESTAMPTZ,
    CONSTRAINT chk_resolved_has_actor CHECK (
        status = 'PENDING' OR (actor_id IS NOT NULL AND acted_at IS NOT NULL)
    )
);
";

const DRIFT_ALERTS_SQL: &str = r"
CREATE TABLE balance_drift_alerts (
    id UUID PRIMARY KEY,
    kind drift_kind NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    cash_bank_id UUID REFERENCES cash_banks(id),
    code VARCHAR(20) NOT NULL,
    cached_balance NUMERIC(20, 2) NOT NULL,
    expected_balance NUMERIC(20, 2) NOT NULL,
    difference NUMERIC(20, 2) NOT NULL,
    details JSONB NOT NULL DEFAULT '{}',
    detected_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_drift_alerts_detected ON balance_drift_alerts(detected_at DESC);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: guard_journal_line
-- Lines are written only while their entry is a draft and only
-- against active, non-header accounts.
-- ============================================================
CREATE OR REPLACE FUNCTION guard_journal_line()
RETURNS TRIGGER AS $$
DECLARE
    entry_status_val entry_status;
    acct RECORD;
BEGIN
    IF TG_OP = 'DELETE' THEN
        SELECT status INTO entry_status_val FROM journal_entries WHERE id = OLD.entry_id;
        IF entry_status_val <> 'DRAFT' THEN
            RAISE EXCEPTION 'Cannot delete lines of a % journal entry', entry_status_val;
        END IF;
        RETURN OLD;
    END IF;

    SELECT status INTO entry_status_val FROM journal_entries WHERE id = NEW.entry_id;
    IF entry_status_val <> 'DRAFT' THEN
        RAISE EXCEPTION 'Cannot write lines of a % journal entry', entry_status_val;
    END IF;

    IF TG_OP = 'UPDATE' AND OLD.entry_id <> NEW.entry_id THEN
        RAISE EXCEPTION 'Cannot move a journal line to another entry';
    END IF;

    SELECT is_header, is_active, code INTO acct FROM accounts WHERE id = NEW.account_id;
    IF acct.is_header THEN
        RAISE EXCEPTION 'Account % is a header account and cannot receive lines', acct.code;
    END IF;
    IF NOT acct.is_active THEN
        RAISE EXCEPTION 'Account % is inactive', acct.code;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_guard_journal_line
BEFORE INSERT OR UPDATE OR DELETE ON journal_lines
FOR EACH ROW
EXECUTE FUNCTION guard_journal_line();

-- ============================================================
-- FUNCTION: guard_journal_entry
-- DRAFT -> POSTED | VOID; POSTED keeps its content, only the
-- void audit columns may be filled once; VOID is terminal.
-- ============================================================
CREATE OR REPLACE FUNCTION guard_journal_entry()
RETURNS TRIGGER AS $$
BEGIN
    IF TG_OP = 'DELETE' THEN
        IF OLD.status <> 'DRAFT' THEN
            RAISE EXCEPTION 'Cannot delete a % journal entry', OLD.status;
        END IF;
        RETURN OLD;
    END IF;

    IF OLD.status = 'VOID' THEN
        RAISE EXCEPTION 'Cannot modify a void journal entry';
    END IF;

    IF OLD.status = 'POSTED' THEN
        IF NEW.status <> 'POSTED'
            OR NEW.entry_number IS DISTINCT FROM OLD.entry_number
            OR NEW.source_type <> OLD.source_type
            OR NEW.source_id IS DISTINCT FROM OLD.source_id
            OR NEW.entry_date <> OLD.entry_date
            OR NEW.description <> OLD.description
            OR NEW.total_debit <> OLD.total_debit
            OR NEW.total_credit <> OLD.total_credit
            OR NEW.reverses_entry_id IS DISTINCT FROM OLD.reverses_entry_id
            OR NEW.posted_at IS DISTINCT FROM OLD.posted_at THEN
            RAISE EXCEPTION
                'Cannot modify posted journal entry %. Void it with a compensating entry instead.',
                OLD.entry_number;
        END IF;
        IF OLD.reversed_by_entry_id IS NOT NULL
            AND NEW.reversed_by_entry_id IS DISTINCT FROM OLD.reversed_by_entry_id THEN
            RAISE EXCEPTION 'Journal entry % is already voided', OLD.entry_number;
        END IF;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_guard_journal_entry
BEFORE UPDATE OR DELETE ON journal_entries
FOR EACH ROW
EXECUTE FUNCTION guard_journal_entry();

-- ============================================================
-- FUNCTION: check_posted_entry_balance
-- Deferred: a posted entry has >= 2 lines whose sums match its
-- totals and balance within 0.01.
-- ============================================================
CREATE OR REPLACE FUNCTION check_posted_entry_balance()
RETURNS TRIGGER AS $$
DECLARE
    sum_debit NUMERIC(20, 2);
    sum_credit NUMERIC(20, 2);
    line_count INTEGER;
BEGIN
    IF NEW.status <> 'POSTED' THEN
        RETURN NEW;
    END IF;

    SELECT COALESCE(SUM(debit), 0), COALESCE(SUM(credit), 0), COUNT(*)
    INTO sum_debit, sum_credit, line_count
    FROM journal_lines
    WHERE entry_id = NEW.id;

    IF line_count < 2 THEN
        RAISE EXCEPTION 'Posted journal entry % has % line(s)', NEW.entry_number, line_count;
    END IF;

    IF abs(sum_debit - sum_credit) >= 0.01 THEN
        RAISE EXCEPTION 'Journal entry % is not balanced. Debit: %, Credit: %',
            NEW.entry_number, sum_debit, sum_credit;
    END IF;

    IF sum_debit <> NEW.total_debit OR sum_credit <> NEW.total_credit THEN
        RAISE EXCEPTION 'Journal entry % totals do not match its lines', NEW.entry_number;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE CONSTRAINT TRIGGER trg_check_posted_balance
AFTER INSERT OR UPDATE ON journal_entries
DEFERRABLE INITIALLY DEFERRED
FOR EACH ROW
EXECUTE FUNCTION check_posted_entry_balance();

-- ============================================================
-- FUNCTION: guard_account_hierarchy
-- Parents are headers of the same type; headers with lines
-- cannot be created by flipping the flag.
-- ============================================================
CREATE OR REPLACE FUNCTION guard_account_hierarchy()
RETURNS TRIGGER AS $$
DECLARE
    parent RECORD;
BEGIN
    IF NEW.parent_id IS NOT NULL THEN
        SELECT is_header, account_type, code INTO parent FROM accounts WHERE id = NEW.parent_id;
        IF NOT parent.is_header THEN
            RAISE EXCEPTION 'Parent account % is not a header', parent.code;
        END IF;
        IF parent.account_type <> NEW.account_type THEN
            RAISE EXCEPTION 'Account % type % differs from parent % type %',
                NEW.code, NEW.account_type, parent.code, parent.account_type;
        END IF;
    END IF;

    IF TG_OP = 'UPDATE' AND NEW.is_header AND NOT OLD.is_header
        AND EXISTS (SELECT 1 FROM journal_lines WHERE account_id = NEW.id) THEN
        RAISE EXCEPTION 'Account % has journal lines and cannot become a header', NEW.code;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_guard_account_hierarchy
BEFORE INSERT OR UPDATE OF parent_id, account_type, is_header ON accounts
FOR EACH ROW
EXECUTE FUNCTION guard_account_hierarchy();

CREATE OR REPLACE FUNCTION forbid_account_delete()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Accounts are never deleted; deactivate % instead', OLD.code;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_forbid_account_delete
BEFORE DELETE ON accounts
FOR EACH ROW
EXECUTE FUNCTION forbid_account_delete();
";

const DROP_ALL_SQL: &str = r"
-- Drop triggers
DROP TRIGGER IF EXISTS trg_forbid_account_delete ON accounts;
DROP TRIGGER IF EXISTS trg_guard_account_hierarchy ON accounts;
DROP TRIGGER IF EXISTS trg_check_posted_balance ON journal_entries;
DROP TRIGGER IF EXISTS trg_guard_journal_entry ON journal_entries;
DROP TRIGGER IF EXISTS trg_guard_journal_line ON journal_lines;

-- Drop functions
DROP FUNCTION IF EXISTS forbid_account_delete();
DROP FUNCTION IF EXISTS guard_account_hierarchy();
DROP FUNCTION IF EXISTS check_posted_entry_balance();
DROP FUNCTION IF EXISTS guard_journal_entry();
DROP FUNCTION IF EXISTS guard_journal_line();

-- Drop tables (reverse order of creation)
DROP TABLE IF EXISTS balance_drift_alerts CASCADE;
DROP TABLE IF EXISTS approval_actions CASCADE;
DROP TABLE IF EXISTS approval_steps CASCADE;
DROP TABLE IF EXISTS approval_requests CASCADE;
DROP TABLE IF EXISTS journal_entry_counters CASCADE;
DROP TABLE IF EXISTS journal_lines CASCADE;
DROP TABLE IF EXISTS journal_entries CASCADE;
DROP TABLE IF EXISTS transfers CASCADE;
DROP TABLE IF EXISTS payments CASCADE;
DROP TABLE IF EXISTS purchases CASCADE;
DROP TABLE IF EXISTS sales CASCADE;
DROP TABLE IF EXISTS cash_banks CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;

-- Drop enums
DROP TYPE IF EXISTS drift_kind CASCADE;
DROP TYPE IF EXISTS action_status CASCADE;
DROP TYPE IF EXISTS approval_status CASCADE;
DROP TYPE IF EXISTS approver_role CASCADE;
DROP TYPE IF EXISTS entry_status CASCADE;
DROP TYPE IF EXISTS source_type CASCADE;
DROP TYPE IF EXISTS account_type CASCADE;
";
