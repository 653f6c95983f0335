//! SQL DDL for initializing the embedded database (§6 "Persisted state").
//! SQLite via `sqlx`; the `DATABASE_URL`/`database_url` knob is the
//! seam where a networked backend would plug in (see DESIGN.md).

pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Accounts (C1). `extension` and `model_mappings` are opaque JSON blobs the
-- store never interprets (§4.1).
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS accounts (
    id                      TEXT PRIMARY KEY NOT NULL,
    channel                 TEXT NOT NULL,
    label                   TEXT NOT NULL,
    client_id               TEXT NOT NULL,
    client_secret           TEXT NOT NULL,
    refresh_token           TEXT NOT NULL,
    access_token            TEXT,
    token_expires_at        TEXT,
    extension               TEXT NOT NULL DEFAULT '{}',
    model_mappings          TEXT NOT NULL DEFAULT '[]',
    enabled                 INTEGER NOT NULL DEFAULT 1,
    weight                  INTEGER NOT NULL DEFAULT 50,
    rate_limit_per_hour     INTEGER NOT NULL DEFAULT 20,
    cooldown_until          TEXT,
    last_used_at            TEXT,
    request_count           INTEGER NOT NULL DEFAULT 0,
    success_count           INTEGER NOT NULL DEFAULT 0,
    error_count             INTEGER NOT NULL DEFAULT 0,
    error_streak            INTEGER NOT NULL DEFAULT 0,
    last_refresh_status     TEXT,
    last_refresh_at         TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accounts_channel ON accounts(channel);

-- ---------------------------------------------------------------------------
-- Call log (C3): sliding-window per-account request tally.
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS call_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id  TEXT NOT NULL,
    ts          TEXT NOT NULL,
    model       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_call_logs_account_ts ON call_logs(account_id, ts);

-- ---------------------------------------------------------------------------
-- Usage (C10).
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS usage (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    ts                      TEXT NOT NULL,
    model                   TEXT NOT NULL,
    channel                 TEXT NOT NULL,
    account_id              TEXT,
    input_tokens            INTEGER NOT NULL,
    output_tokens           INTEGER NOT NULL,
    cache_creation_tokens   INTEGER NOT NULL DEFAULT 0,
    cache_read_tokens       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_usage_ts ON usage(ts);

-- ---------------------------------------------------------------------------
-- Admins (bcrypt-hashed, §6 session-cookie/X-Admin-Key alternative).
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS admins (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    username        TEXT NOT NULL UNIQUE,
    password_hash   TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
"#;
