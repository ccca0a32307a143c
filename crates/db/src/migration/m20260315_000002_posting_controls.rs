//! Posting controls migration.
//!
//! Adds closed accounting periods, the approval signal outbox and the
//! storage guards that refuse postings into a closed period or for a source
//! without an existing, approved record.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(PERIODS_SQL).await?;
        db.execute_unprepared(SIGNALS_SQL).await?;
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const PERIODS_SQL: &str = r"
CREATE TABLE accounting_periods (
    id UUID PRIMARY KEY,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    is_closed BOOLEAN NOT NULL DEFAULT true,
    description TEXT,
    closed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    reopened_at TIMESTAMPTZ,
    reopen_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_period_dates CHECK (end_date >= start_date),
    CONSTRAINT chk_reopen_has_reason CHECK (
        is_closed OR (reopened_at IS NOT NULL AND reopen_reason IS NOT NULL)
    )
);

CREATE INDEX idx_accounting_periods_closed
    ON accounting_periods(start_date, end_date)
    WHERE is_closed;
";

const SIGNALS_SQL: &str = r"
-- Terminal approval outcomes, written in the deciding transaction and
-- marked delivered once every listener has seen them.
CREATE TABLE approval_signals (
    id UUID PRIMARY KEY,
    request_id UUID NOT NULL UNIQUE REFERENCES approval_requests(id),
    source_type source_type NOT NULL,
    source_id BIGINT NOT NULL,
    approved BOOLEAN NOT NULL,
    reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    delivered_at TIMESTAMPTZ
);

CREATE INDEX idx_approval_signals_pending
    ON approval_signals(created_at)
    WHERE delivered_at IS NULL;
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: check_posted_entry_source
-- Deferred: an originating non-manual entry may be POSTED only
-- when its source record exists and the newest approval request
-- for that source is APPROVED. Compensating entries are exempt.
-- ============================================================
CREATE OR REPLACE FUNCTION check_posted_entry_source()
RETURNS TRIGGER AS $$
DECLARE
    source_found BOOLEAN;
    latest_status approval_status;
BEGIN
    IF NEW.status <> 'POSTED'
        OR NEW.source_type = 'MANUAL'
        OR NEW.reverses_entry_id IS NOT NULL
        OR (TG_OP = 'UPDATE' AND OLD.status = 'POSTED') THEN
        RETURN NEW;
    END IF;

    source_found := CASE NEW.source_type
        WHEN 'SALE' THEN EXISTS (SELECT 1 FROM sales WHERE id = NEW.source_id)
        WHEN 'PURCHASE' THEN EXISTS (SELECT 1 FROM purchases WHERE id = NEW.source_id)
        WHEN 'PAYMENT' THEN EXISTS (SELECT 1 FROM payments WHERE id = NEW.source_id)
        WHEN 'TRANSFER' THEN EXISTS (SELECT 1 FROM transfers WHERE id = NEW.source_id)
        ELSE false
    END;
    IF NOT source_found THEN
        RAISE EXCEPTION 'Journal entry % references missing % record %',
            NEW.entry_number, NEW.source_type, NEW.source_id;
    END IF;

    SELECT status INTO latest_status
    FROM approval_requests
    WHERE source_type = NEW.source_type AND source_id = NEW.source_id
    ORDER BY created_at DESC, id DESC
    LIMIT 1;

    IF latest_status IS DISTINCT FROM 'APPROVED' THEN
        RAISE EXCEPTION 'Journal entry % posts % % without an approved request (latest: %)',
            NEW.entry_number, NEW.source_type, NEW.source_id, COALESCE(latest_status::text, 'none');
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE CONSTRAINT TRIGGER trg_check_posted_source
AFTER INSERT OR UPDATE ON journal_entries
DEFERRABLE INITIALLY DEFERRED
FOR EACH ROW
EXECUTE FUNCTION check_posted_entry_source();

-- ============================================================
-- FUNCTION: guard_closed_period
-- Nothing dated inside a closed period becomes POSTED.
-- ============================================================
CREATE OR REPLACE FUNCTION guard_closed_period()
RETURNS TRIGGER AS $$
BEGIN
    IF NEW.status = 'POSTED'
        AND (TG_OP = 'INSERT' OR OLD.status <> 'POSTED')
        AND EXISTS (
            SELECT 1 FROM accounting_periods
            WHERE is_closed AND NEW.entry_date BETWEEN start_date AND end_date
        ) THEN
        RAISE EXCEPTION 'Cannot post journal entry % on % inside a closed period',
            NEW.entry_number, NEW.entry_date;
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_guard_closed_period
BEFORE INSERT OR UPDATE ON journal_entries
FOR EACH ROW
EXECUTE FUNCTION guard_closed_period();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_guard_closed_period ON journal_entries;
DROP TRIGGER IF EXISTS trg_check_posted_source ON journal_entries;

DROP FUNCTION IF EXISTS guard_closed_period();
DROP FUNCTION IF EXISTS check_posted_entry_source();

DROP TABLE IF EXISTS approval_signals CASCADE;
DROP TABLE IF EXISTS accounting_periods CASCADE;
";
