//! Access log queries and aggregate statistics

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{AccessLogEntry, AccessLogRow, Database};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;
const TOP_LIMIT: i64 = 10;

const RANGE_FILTER: &str = "WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at <= ?2)";

// instr() keeps the substring match case-sensitive, unlike LIKE
const LOG_FILTER: &str = "WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at <= ?2) \
     AND (?3 IS NULL OR instr(ip, ?3) > 0) AND (?4 IS NULL OR instr(path, ?4) > 0)";

/// Page number and size after clamping out-of-range input to the defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit
            .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self { page, limit }
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Inclusive bounds on `created_at`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Bounds that fail to parse are dropped rather than rejected
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.and_then(parse_timestamp),
            end: end.and_then(parse_timestamp),
        }
    }

    /// Like `parse`, but an absent bound defaults to the trailing `days` window
    pub fn parse_or_trailing(start: Option<&str>, end: Option<&str>, days: i64) -> Self {
        let now = Utc::now();
        let start = start.filter(|s| !s.is_empty());
        let end = end.filter(|s| !s.is_empty());
        Self {
            start: match start {
                Some(s) => parse_timestamp(s),
                None => Some(now - Duration::days(days)),
            },
            end: match end {
                Some(s) => parse_timestamp(s),
                None => Some(now),
            },
        }
    }

    fn bounds(&self) -> (Option<i64>, Option<i64>) {
        (
            self.start.map(|d| d.timestamp_millis()),
            self.end.map(|d| d.timestamp_millis()),
        )
    }
}

/// Accepts RFC 3339, naive date-times with `T` or a space, and `YYYY-MM-DD` (all read as UTC)
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub range: DateRange,
    pub ip: Option<String>,
    pub path: Option<String>,
}

impl LogFilter {
    fn ip(&self) -> Option<&str> {
        self.ip.as_deref().filter(|s| !s.is_empty())
    }

    fn path(&self) -> Option<&str> {
        self.path.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub entries: Vec<AccessLogEntry>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathCount {
    pub path: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsCount {
    pub os: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowserCount {
    pub browser: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewStats {
    pub total_visits: i64,
    pub unique_visitors: i64,
    pub avg_response_time: f64,
    pub top_pages: Vec<PathCount>,
    pub visitor_trends: Vec<DayCount>,
    pub device_stats: BTreeMap<String, i64>,
    pub os_stats: Vec<OsCount>,
    pub browser_stats: Vec<BrowserCount>,
}

impl Database {
    /// Filtered access log, newest first
    pub async fn query_logs(&self, pagination: Pagination, filter: &LogFilter) -> Result<LogPage> {
        let (start, end) = filter.range.bounds();

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM access_logs {}", LOG_FILTER))
            .bind(start)
            .bind(end)
            .bind(filter.ip())
            .bind(filter.path())
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<AccessLogRow> = sqlx::query_as(&format!(
            r#"
            SELECT id, ip, visitor_id, user_agent, path, method, status_code, response_time_ms, referer, device_type, os, browser, created_at
            FROM access_logs
            {}
            ORDER BY created_at DESC, id DESC
            LIMIT ?5 OFFSET ?6
            "#,
            LOG_FILTER
        ))
        .bind(start)
        .bind(end)
        .bind(filter.ip())
        .bind(filter.path())
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(LogPage {
            entries: rows.into_iter().map(AccessLogEntry::from).collect(),
            total,
            page: pagination.page,
            limit: pagination.limit,
            pages: (total + pagination.limit - 1) / pagination.limit,
        })
    }

    /// Aggregate statistics over the entries inside `range`
    pub async fn overview(&self, range: &DateRange) -> Result<OverviewStats> {
        let (total_visits, unique_visitors, avg_response_time, top_pages, visitor_trends, device_stats, os_stats, browser_stats) = tokio::try_join!(
            self.count_visits(range),
            self.count_unique_visitors(range),
            self.average_response_time(range),
            self.grouped_counts("path", range, Some(TOP_LIMIT)),
            self.daily_counts(range),
            self.grouped_counts("device_type", range, None),
            self.grouped_counts("os", range, Some(TOP_LIMIT)),
            self.grouped_counts("browser", range, Some(TOP_LIMIT)),
        )?;

        Ok(OverviewStats {
            total_visits,
            unique_visitors,
            avg_response_time,
            top_pages: top_pages.into_iter().map(|(path, count)| PathCount { path, count }).collect(),
            visitor_trends,
            device_stats: device_stats.into_iter().collect(),
            os_stats: os_stats.into_iter().map(|(os, count)| OsCount { os, count }).collect(),
            browser_stats: browser_stats.into_iter().map(|(browser, count)| BrowserCount { browser, count }).collect(),
        })
    }

    async fn count_visits(&self, range: &DateRange) -> Result<i64> {
        let (start, end) = range.bounds();
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM access_logs {}", RANGE_FILTER))
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Distinct visitor ids; distinct IPs only when no entry in range has an id
    async fn count_unique_visitors(&self, range: &DateRange) -> Result<i64> {
        let (start, end) = range.bounds();
        let (by_visitor,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(DISTINCT visitor_id) FROM access_logs {}",
            RANGE_FILTER
        ))
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        if by_visitor != 0 {
            return Ok(by_visitor);
        }

        let (by_ip,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(DISTINCT ip) FROM access_logs {}", RANGE_FILTER))
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;
        Ok(by_ip)
    }

    async fn average_response_time(&self, range: &DateRange) -> Result<f64> {
        let (start, end) = range.bounds();
        let (avg,): (Option<f64>,) = sqlx::query_as(&format!(
            "SELECT AVG(response_time_ms) FROM access_logs {}",
            RANGE_FILTER
        ))
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok((avg.unwrap_or(0.0) * 100.0).round() / 100.0)
    }

    /// `column` is always one of our own column names, never client input
    async fn grouped_counts(&self, column: &'static str, range: &DateRange, limit: Option<i64>) -> Result<Vec<(String, i64)>> {
        let (start, end) = range.bounds();
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            r#"
            SELECT {column}, COUNT(*) as count
            FROM access_logs
            {RANGE_FILTER}
            GROUP BY {column}
            ORDER BY count DESC, {column} ASC
            LIMIT ?3
            "#
        ))
        .bind(start)
        .bind(end)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn daily_counts(&self, range: &DateRange) -> Result<Vec<DayCount>> {
        let (start, end) = range.bounds();
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            r#"
            SELECT date(created_at / 1000, 'unixepoch') as day, COUNT(*) as count
            FROM access_logs
            {}
            GROUP BY day
            ORDER BY day
            "#,
            RANGE_FILTER
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(date, count)| DayCount { date, count }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(ip: &str, path: &str, at: DateTime<Utc>) -> AccessLogEntry {
        AccessLogEntry::new(ip.to_string(), "GET".to_string(), path.to_string(), 200).at(at)
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    async fn seeded(entries: &[AccessLogEntry]) -> Database {
        let db = Database::in_memory().await.unwrap();
        for e in entries {
            db.insert_log(e).await.unwrap();
        }
        db
    }

    #[test]
    fn pagination_clamps_to_defaults() {
        assert_eq!(Pagination::new(Some(0), Some(500)), Pagination::new(Some(1), Some(50)));
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, limit: 50 });
        assert_eq!(Pagination::new(Some(-3), Some(0)), Pagination { page: 1, limit: 50 });
        assert_eq!(Pagination::new(Some(7), Some(100)), Pagination { page: 7, limit: 100 });
    }

    #[test]
    fn timestamps_in_common_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-05T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-05"), Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn trailing_window_fills_absent_bounds_only() {
        let range = DateRange::parse_or_trailing(None, None, 30);
        let span = range.end.unwrap() - range.start.unwrap();
        assert_eq!(span.num_days(), 30);

        let range = DateRange::parse_or_trailing(Some("garbage"), Some("2024-03-05"), 30);
        assert_eq!(range.start, None);
        assert!(range.end.is_some());
    }

    #[tokio::test]
    async fn logs_are_newest_first_with_page_count() {
        let db = seeded(&[
            entry("10.0.0.1", "/api/notes", day(1, 8)),
            entry("10.0.0.2", "/api/notes/a.md", day(3, 8)),
            entry("10.0.0.3", "/api/notes/b.md", day(2, 8)),
        ])
        .await;

        let page = db.query_logs(Pagination::new(Some(1), Some(2)), &LogFilter::default()).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
        let ips: Vec<&str> = page.entries.iter().map(|e| e.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.2", "10.0.0.3"]);

        let page = db.query_logs(Pagination::new(Some(2), Some(2)), &LogFilter::default()).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].created_at, day(1, 8));
    }

    #[tokio::test]
    async fn out_of_range_pagination_matches_defaults() {
        let db = seeded(&[entry("1.1.1.1", "/api/notes", day(1, 1))]).await;
        let clamped = db.query_logs(Pagination::new(Some(0), Some(500)), &LogFilter::default()).await.unwrap();
        let defaults = db.query_logs(Pagination::new(Some(1), Some(50)), &LogFilter::default()).await.unwrap();
        assert_eq!((clamped.page, clamped.limit, clamped.total), (defaults.page, defaults.limit, defaults.total));
        assert_eq!(clamped.entries, defaults.entries);
    }

    #[tokio::test]
    async fn logs_filter_by_range_ip_and_path() {
        let db = seeded(&[
            entry("192.168.1.10", "/api/notes/Rust.md", day(1, 8)),
            entry("192.168.1.11", "/api/notes/rust.md", day(2, 8)),
            entry("10.0.0.1", "/api/notes/go.md", day(3, 8)),
        ])
        .await;

        let filter = LogFilter { ip: Some("192.168".to_string()), ..LogFilter::default() };
        assert_eq!(db.query_logs(Pagination::new(None, None), &filter).await.unwrap().total, 2);

        // Substring match is case-sensitive
        let filter = LogFilter { path: Some("rust".to_string()), ..LogFilter::default() };
        let page = db.query_logs(Pagination::new(None, None), &filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].ip, "192.168.1.11");

        // Both bounds are inclusive
        let filter = LogFilter {
            range: DateRange { start: Some(day(2, 8)), end: Some(day(3, 8)) },
            ..LogFilter::default()
        };
        assert_eq!(db.query_logs(Pagination::new(None, None), &filter).await.unwrap().total, 2);

        // Unparseable bounds are ignored
        let filter = LogFilter { range: DateRange::parse(Some("not a date"), None), ..LogFilter::default() };
        assert_eq!(db.query_logs(Pagination::new(None, None), &filter).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn overview_ranks_top_pages() {
        let db = seeded(&[
            entry("1.1.1.1", "/a", day(1, 8)),
            entry("1.1.1.1", "/a", day(1, 9)),
            entry("2.2.2.2", "/b", day(2, 8)),
        ])
        .await;

        let stats = db.overview(&DateRange::default()).await.unwrap();
        assert_eq!(stats.total_visits, 3);
        assert_eq!(
            stats.top_pages,
            vec![
                PathCount { path: "/a".to_string(), count: 2 },
                PathCount { path: "/b".to_string(), count: 1 },
            ]
        );
        assert_eq!(
            stats.visitor_trends,
            vec![
                DayCount { date: "2024-03-01".to_string(), count: 2 },
                DayCount { date: "2024-03-02".to_string(), count: 1 },
            ]
        );
        assert_eq!(stats.device_stats.get("Unknown"), Some(&3));
    }

    #[tokio::test]
    async fn unique_visitors_fall_back_to_ip_only_without_any_id() {
        let db = seeded(&[
            entry("1.1.1.1", "/a", day(1, 8)),
            entry("2.2.2.2", "/a", day(1, 9)),
            entry("3.3.3.3", "/a", day(1, 10)),
        ])
        .await;
        assert_eq!(db.overview(&DateRange::default()).await.unwrap().unique_visitors, 3);

        // One identified visitor hides the anonymous IPs entirely
        db.insert_log(&entry("4.4.4.4", "/a", day(1, 11)).with_visitor_id(Some("v-1".to_string())))
            .await
            .unwrap();
        assert_eq!(db.overview(&DateRange::default()).await.unwrap().unique_visitors, 1);
    }

    #[tokio::test]
    async fn overview_averages_and_groups_agents() {
        let chrome = crate::user_agent::parse("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0 Safari/537.36");
        let firefox = crate::user_agent::parse("Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0");
        let db = seeded(&[
            entry("1.1.1.1", "/a", day(1, 8)).with_response_time(1.0).with_user_agent("c".to_string(), &chrome),
            entry("1.1.1.1", "/a", day(1, 8)).with_response_time(2.0).with_user_agent("c".to_string(), &chrome),
            entry("1.1.1.1", "/a", day(5, 8)).with_response_time(2.0).with_user_agent("f".to_string(), &firefox),
        ])
        .await;

        let stats = db.overview(&DateRange::default()).await.unwrap();
        assert_eq!(stats.avg_response_time, 1.67);
        assert_eq!(stats.browser_stats[0], BrowserCount { browser: "Chrome".to_string(), count: 2 });
        assert_eq!(stats.os_stats.len(), 2);
        assert_eq!(stats.device_stats.get("PC"), Some(&3));

        let range = DateRange { start: Some(day(4, 0)), end: None };
        let stats = db.overview(&range).await.unwrap();
        assert_eq!(stats.total_visits, 1);
        assert_eq!(stats.avg_response_time, 2.0);
    }

    #[tokio::test]
    async fn overview_of_empty_store() {
        let db = Database::in_memory().await.unwrap();
        let stats = db.overview(&DateRange::default()).await.unwrap();
        assert_eq!(stats.total_visits, 0);
        assert_eq!(stats.unique_visitors, 0);
        assert_eq!(stats.avg_response_time, 0.0);
        assert!(stats.top_pages.is_empty());
        assert!(stats.device_stats.is_empty());
    }
}
