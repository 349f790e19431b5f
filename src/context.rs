use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::debug;

use crate::config::QueryLimits;
use crate::error::{LogQueryError, Result};
use crate::model::{Dialect, SearchRequest, TimeRange, Timeframe};
use crate::query::{detect_dialect, optimize_query};

/// Fully resolved, bounds-checked view of one `query_logs` call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub query: String,
    pub optimized_query: String,
    pub dialect: Dialect,
    pub time_range: TimeRange,
    pub limit: u32,
    pub page: u32,
    pub offset: u32,
    pub include_archive: bool,
}

impl QueryContext {
    pub fn build(request: &SearchRequest, limits: &QueryLimits) -> Result<Self> {
        Self::build_at(request, limits, Utc::now())
    }

    /// Same as [`QueryContext::build`] with an explicit "now".
    pub fn build_at(
        request: &SearchRequest,
        limits: &QueryLimits,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(LogQueryError::InvalidInput("query must not be empty".into()));
        }

        let time_range = resolve_time_range(request, now)?;
        let max_window = Duration::hours(limits.max_window_hours);
        if time_range.span() > max_window {
            return Err(LogQueryError::RangeTooWide {
                requested_secs: time_range.span().num_seconds(),
                max_secs: max_window.num_seconds(),
            });
        }

        let limit = resolve_limit(request.limit, limits);
        let page = resolve_page(request.page, limits)?;
        let offset = (page - 1).saturating_mul(limit);

        let dialect = detect_dialect(query);
        let include_archive =
            time_range.start < now - Duration::hours(limits.archive_threshold_hours);
        // a later page needs the stage to reach past max_limit
        let stage_limit = limits.max_limit.max(offset.saturating_add(limit));
        let optimized_query = optimize_query(query, dialect, stage_limit);

        debug!(
            dialect = dialect.as_str(),
            start = %time_range.start,
            end = %time_range.end,
            limit,
            page,
            include_archive,
            "query context built"
        );

        Ok(Self {
            query: query.to_string(),
            optimized_query,
            dialect,
            time_range,
            limit,
            page,
            offset,
            include_archive,
        })
    }

    /// Rows the remote call must return so that this page can be sliced out.
    pub fn remote_limit(&self) -> u32 {
        self.offset.saturating_add(self.limit)
    }
}

fn resolve_time_range(request: &SearchRequest, now: DateTime<Utc>) -> Result<TimeRange> {
    let timeframe = request.timeframe.unwrap_or(Timeframe::LastHour);
    let range = match timeframe.duration() {
        Some(window) => TimeRange {
            start: now - window,
            end: now,
        },
        None => {
            let start = parse_required(request.start_date.as_deref(), "startDate")?;
            let end = parse_required(request.end_date.as_deref(), "endDate")?;
            TimeRange { start, end }
        }
    };
    if range.start >= range.end {
        return Err(LogQueryError::InvalidInput(format!(
            "start {} must be before end {}",
            range.start, range.end
        )));
    }
    Ok(range)
}

fn parse_required(input: Option<&str>, field: &str) -> Result<DateTime<Utc>> {
    let raw = input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            LogQueryError::InvalidInput(format!("{field} is required when timeframe is custom"))
        })?;
    parse_timestamp(raw)
        .ok_or_else(|| LogQueryError::InvalidInput(format!("{field} is not ISO-8601: {raw}")))
}

/// RFC 3339 first; offset-less timestamps are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| naive.and_utc())
}

fn resolve_limit(requested: Option<i64>, limits: &QueryLimits) -> u32 {
    let wanted = requested.unwrap_or(i64::from(limits.default_limit));
    wanted.clamp(i64::from(limits.min_limit), i64::from(limits.max_limit)) as u32
}

fn resolve_page(requested: Option<i64>, limits: &QueryLimits) -> Result<u32> {
    let page = requested.unwrap_or(1).max(1);
    if page > i64::from(limits.max_page) {
        return Err(LogQueryError::PageOutOfRange {
            page: u32::try_from(page).unwrap_or(u32::MAX),
            max_page: limits.max_page,
        });
    }
    Ok(page as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap()
    }

    fn req(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            ..Default::default()
        }
    }

    fn custom(start: &str, end: &str) -> SearchRequest {
        SearchRequest {
            query: "error".into(),
            timeframe: Some(Timeframe::Custom),
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_to_trailing_hour() {
        let now = fixed_now();
        let ctx = QueryContext::build_at(&req("error"), &QueryLimits::default(), now).unwrap();
        assert_eq!(ctx.time_range.end, now);
        assert_eq!(ctx.time_range.start, now - Duration::hours(1));
        assert_eq!(ctx.limit, 10);
        assert_eq!(ctx.page, 1);
        assert_eq!(ctx.offset, 0);
        assert!(!ctx.include_archive);
        assert_eq!(ctx.dialect, Dialect::Lucene);
        assert_eq!(ctx.optimized_query, "\"error\"");
    }

    #[test]
    fn one_hour_preset_tracks_wall_clock() {
        let mut request = req("error");
        request.timeframe = Some(Timeframe::LastHour);
        let before = Utc::now();
        let ctx = QueryContext::build(&request, &QueryLimits::default()).unwrap();
        let after = Utc::now();
        assert!(ctx.time_range.end >= before && ctx.time_range.end <= after);
        assert_eq!(ctx.time_range.span(), Duration::hours(1));
    }

    #[test]
    fn presets_resolve_their_window() {
        let now = fixed_now();
        for (tf, hours) in [
            (Timeframe::Last15Minutes, Duration::minutes(15)),
            (Timeframe::Last6Hours, Duration::hours(6)),
            (Timeframe::Last24Hours, Duration::hours(24)),
        ] {
            let mut request = req("x");
            request.timeframe = Some(tf);
            let ctx = QueryContext::build_at(&request, &QueryLimits::default(), now).unwrap();
            assert_eq!(ctx.time_range.span(), hours);
        }
    }

    #[test]
    fn custom_range_is_exact_and_reaches_archive() {
        let now = fixed_now();
        let ctx = QueryContext::build_at(
            &custom("2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z"),
            &QueryLimits::default(),
            now,
        )
        .unwrap();
        assert_eq!(
            ctx.time_range.start,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).single().unwrap()
        );
        assert_eq!(
            ctx.time_range.end,
            Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).single().unwrap()
        );
        assert!(ctx.include_archive);
    }

    #[test]
    fn recent_custom_range_skips_archive() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).single().unwrap();
        let ctx = QueryContext::build_at(
            &custom("2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z"),
            &QueryLimits::default(),
            now,
        )
        .unwrap();
        assert!(!ctx.include_archive);
    }

    #[test]
    fn window_over_a_day_is_rejected() {
        let limits = QueryLimits::default();
        let ok = custom("2024-01-15T00:00:00Z", "2024-01-16T00:00:00Z");
        assert!(QueryContext::build_at(&ok, &limits, fixed_now()).is_ok());

        let wide = custom("2024-01-15T00:00:00Z", "2024-01-16T00:00:01Z");
        let err = QueryContext::build_at(&wide, &limits, fixed_now()).unwrap_err();
        assert!(matches!(err, LogQueryError::RangeTooWide { max_secs: 86_400, .. }));
    }

    #[test]
    fn custom_requires_both_parseable_dates() {
        let limits = QueryLimits::default();
        let mut missing = custom("2024-01-15T10:00:00Z", "");
        missing.end_date = None;
        assert!(matches!(
            QueryContext::build_at(&missing, &limits, fixed_now()),
            Err(LogQueryError::InvalidInput(_))
        ));

        let garbage = custom("yesterday", "2024-01-15T11:00:00Z");
        assert!(matches!(
            QueryContext::build_at(&garbage, &limits, fixed_now()),
            Err(LogQueryError::InvalidInput(_))
        ));

        let reversed = custom("2024-01-15T11:00:00Z", "2024-01-15T10:00:00Z");
        assert!(matches!(
            QueryContext::build_at(&reversed, &limits, fixed_now()),
            Err(LogQueryError::InvalidInput(_))
        ));
    }

    #[test]
    fn offsetless_timestamps_are_utc() {
        let ts = parse_timestamp("2024-01-15T10:00:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).single().unwrap());
        let offset = parse_timestamp("2024-01-15T12:00:00+02:00").unwrap();
        assert_eq!(offset, ts);
    }

    #[test]
    fn empty_query_is_invalid() {
        let err = QueryContext::build_at(&req("   "), &QueryLimits::default(), fixed_now());
        assert!(matches!(err, Err(LogQueryError::InvalidInput(_))));
    }

    #[test]
    fn limit_is_clamped() {
        let limits = QueryLimits::default();
        for (requested, expected) in [
            (Some(200), 50),
            (Some(0), 1),
            (Some(-4), 1),
            (Some(25), 25),
            (None, 10),
        ] {
            let mut request = req("x");
            request.limit = requested;
            let ctx = QueryContext::build_at(&request, &limits, fixed_now()).unwrap();
            assert_eq!(ctx.limit, expected, "{requested:?}");
        }
    }

    #[test]
    fn page_bounds_and_offset() {
        let limits = QueryLimits::default();
        let mut request = req("x");
        request.limit = Some(20);
        request.page = Some(3);
        let ctx = QueryContext::build_at(&request, &limits, fixed_now()).unwrap();
        assert_eq!(ctx.page, 3);
        assert_eq!(ctx.offset, 40);
        assert_eq!(ctx.remote_limit(), 60);

        request.page = Some(0);
        let ctx = QueryContext::build_at(&request, &limits, fixed_now()).unwrap();
        assert_eq!(ctx.page, 1);

        request.page = Some(i64::from(limits.max_page));
        assert!(QueryContext::build_at(&request, &limits, fixed_now()).is_ok());

        request.page = Some(i64::from(limits.max_page) + 1);
        let err = QueryContext::build_at(&request, &limits, fixed_now()).unwrap_err();
        assert!(matches!(err, LogQueryError::PageOutOfRange { page: 21, max_page: 20 }));
    }

    #[test]
    fn dataprime_query_gets_limit_stage() {
        let ctx = QueryContext::build_at(
            &req("source logs | filter $m.severity == ERROR"),
            &QueryLimits::default(),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(ctx.dialect, Dialect::Dataprime);
        assert!(ctx.optimized_query.ends_with("| limit 50"));
    }

    #[test]
    fn dataprime_limit_stage_covers_later_pages() {
        let mut request = req("source logs | filter $m.severity == ERROR");
        request.limit = Some(25);
        request.page = Some(3);
        let ctx = QueryContext::build_at(&request, &QueryLimits::default(), fixed_now()).unwrap();
        assert_eq!(ctx.remote_limit(), 75);
        assert_eq!(
            ctx.optimized_query,
            "source logs | filter $m.severity == ERROR | limit 75"
        );

        request.page = Some(2);
        let ctx = QueryContext::build_at(&request, &QueryLimits::default(), fixed_now()).unwrap();
        assert!(ctx.optimized_query.ends_with("| limit 50"));
    }
}
