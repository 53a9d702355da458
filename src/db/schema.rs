//! Database schema definitions

pub const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS access_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip TEXT NOT NULL,
    visitor_id TEXT,                 -- NULL when the client sent none
    user_agent TEXT NOT NULL DEFAULT '',
    path TEXT NOT NULL,
    method TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    response_time_ms REAL NOT NULL,
    referer TEXT NOT NULL DEFAULT '',
    device_type TEXT NOT NULL,
    os TEXT NOT NULL,
    browser TEXT NOT NULL,
    created_at BIGINT NOT NULL       -- Unix epoch milliseconds, UTC
)
"#;

// For date range filtering and ordering
pub const CREATE_INDEX_CREATED_AT: &str =
    "CREATE INDEX IF NOT EXISTS idx_access_logs_created_at ON access_logs(created_at)";

pub const CREATE_INDEX_IP: &str =
    "CREATE INDEX IF NOT EXISTS idx_access_logs_ip ON access_logs(ip)";

pub const CREATE_INDEX_VISITOR: &str =
    "CREATE INDEX IF NOT EXISTS idx_access_logs_visitor ON access_logs(visitor_id)";

pub const CREATE_INDEX_PATH: &str =
    "CREATE INDEX IF NOT EXISTS idx_access_logs_path ON access_logs(path)";
