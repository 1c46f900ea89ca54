//! SQL schema for the persistent store.

pub const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS orders (
    order_id            TEXT PRIMARY KEY,
    account_role        TEXT NOT NULL,
    side                TEXT NOT NULL,
    product             TEXT NOT NULL,
    kind                TEXT NOT NULL,
    validity            TEXT NOT NULL,
    security_id         TEXT NOT NULL,
    exchange_segment    TEXT NOT NULL,
    quantity            INTEGER NOT NULL,
    disclosed_quantity  INTEGER NOT NULL,
    price               TEXT NOT NULL,
    trigger_price       TEXT,
    status              TEXT NOT NULL,
    filled_quantity     INTEGER NOT NULL,
    average_fill_price  TEXT,
    stop_loss_value     TEXT,
    profit_target_value TEXT,
    leg_kind            TEXT,
    parent_order_id     TEXT,
    slice_group_id      TEXT,
    created_at_ts       INTEGER NOT NULL,
    updated_at_ts       INTEGER NOT NULL,
    completed_at_ts     INTEGER
);

CREATE TABLE IF NOT EXISTS copy_mappings (
    leader_order_id     TEXT PRIMARY KEY,
    follower_order_id   TEXT UNIQUE,
    leader_quantity     INTEGER NOT NULL,
    follower_quantity   INTEGER NOT NULL,
    sizing_strategy     TEXT NOT NULL,
    capital_ratio       REAL,
    status              TEXT NOT NULL,
    last_error          TEXT,
    created_at_ts       INTEGER NOT NULL,
    updated_at_ts       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS bracket_order_legs (
    parent_order_id     TEXT NOT NULL,
    leg_kind            TEXT NOT NULL,
    leg_order_id        TEXT NOT NULL,
    status              TEXT NOT NULL,
    PRIMARY KEY (parent_order_id, leg_kind),
    FOREIGN KEY (parent_order_id) REFERENCES orders(order_id)
);

CREATE TABLE IF NOT EXISTS order_events (
    order_id    TEXT NOT NULL,
    sequence    INTEGER NOT NULL,
    kind        TEXT NOT NULL,
    payload     TEXT NOT NULL,
    ts          INTEGER NOT NULL,
    PRIMARY KEY (order_id, sequence)
);

CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    action      TEXT NOT NULL,
    role        TEXT NOT NULL,
    request     TEXT NOT NULL,
    response    TEXT,
    status      TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    error       TEXT,
    ts          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS funds (
    account_role    TEXT PRIMARY KEY,
    available       REAL NOT NULL,
    utilized        REAL NOT NULL,
    collateral      REAL NOT NULL,
    captured_at_ts  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS instruments (
    security_id TEXT PRIMARY KEY,
    symbol      TEXT NOT NULL,
    lot_size    INTEGER NOT NULL,
    tick_size   TEXT NOT NULL,
    premium     REAL
);

CREATE TABLE IF NOT EXISTS watermark (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    last_leader_event_ts INTEGER NOT NULL
);

INSERT OR IGNORE INTO watermark (id, last_leader_event_ts) VALUES (1, 0);
"#;
