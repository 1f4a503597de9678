//! Security event monitoring.
//!
//! ```text
//! SecurityReport ──► record ──► ring buffer (capacity N)
//!                      │
//!                      ├─► per-minute blocked / high-risk windows ──► alert
//!                      └─► per-session violation counts ───────────► alert
//! ```
//!
//! Alerts are emitted through `tracing::warn!` and kept in the ring as
//! [`EventType::SecurityAlert`] events. Nothing here blocks a query; the
//! monitor only observes what the validator decided.

use std::{collections::VecDeque, fmt, str::FromStr, sync::Mutex, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::warn;

use crate::{
    config::MonitorConfig,
    error::{AppError, AppResult, input_error, serialization_error},
    injection::{RiskLevel, preview},
    validator::SecurityReport
};

const PREVIEW_CHARS: usize = 100;
const SLOW_CHECK_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    QueryValidation,
    SecurityAlert
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueryValidation => "query_validation",
            Self::SecurityAlert => "security_alert"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    HighBlockRate,
    HighRiskRate,
    SessionAbuse
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HighBlockRate => "HIGH_BLOCK_RATE",
            Self::HighRiskRate => "HIGH_RISK_RATE",
            Self::SessionAbuse => "SESSION_ABUSE"
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub timestamp:     DateTime<Utc>,
    pub event_type:    EventType,
    pub risk_level:    RiskLevel,
    pub query_hash:    String,
    pub query_preview: String,
    pub violations:    Vec<String>,
    pub warnings:      Vec<String>,
    pub blocked:       bool,
    pub check_time_ms: f64,
    pub session_id:    Option<String>
}

#[derive(Debug, Clone, Serialize)]
pub struct LastViolation {
    pub timestamp:  DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub query_hash: String,
    pub violations: Vec<String>
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub overview:        Overview,
    pub recent_activity: RecentActivity,
    pub violations:      ViolationSummary,
    pub performance:     Performance
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub uptime_hours:             f64,
    pub total_queries:            u64,
    pub blocked_queries:          u64,
    pub high_risk_queries:        u64,
    pub block_rate:               f64,
    pub high_risk_rate:           f64,
    pub sessions_with_violations: usize
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub events_last_hour:    usize,
    pub blocked_last_hour:   usize,
    pub high_risk_last_hour: usize
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationSummary {
    pub by_type:        Vec<(String, u64)>,
    pub by_risk_level:  IndexMap<RiskLevel, u64>,
    pub last_violation: Option<LastViolation>
}

#[derive(Debug, Clone, Serialize)]
pub struct Performance {
    pub avg_check_time_ms:     f64,
    pub total_check_time_ms:   f64,
    pub queries_with_warnings: u64
}

/// Activity over a trailing time window.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodReport {
    pub period:            String,
    pub summary:           PeriodSummary,
    pub top_violations:    Vec<(String, u64)>,
    pub risk_distribution: IndexMap<RiskLevel, usize>,
    pub recommendations:   Vec<String>
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodSummary {
    pub total_events:             usize,
    pub blocked_queries:          usize,
    pub critical_events:          usize,
    pub high_risk_events:         usize,
    pub sessions_analyzed:        usize,
    pub sessions_with_violations: usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(input_error(format!("Unsupported export format: {}", other)))
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    started_at:               DateTime<Utc>,
    events:                   VecDeque<SecurityEvent>,
    total_queries:            u64,
    blocked_queries:          u64,
    high_risk_queries:        u64,
    queries_with_warnings:    u64,
    total_check_time_ms:      f64,
    violations_by_type:       IndexMap<String, u64>,
    violations_by_risk:       IndexMap<RiskLevel, u64>,
    /// Sessions that produced violations, oldest first
    session_violations:       IndexMap<String, usize>,
    recent_blocked:           VecDeque<DateTime<Utc>>,
    recent_high_risk:         VecDeque<DateTime<Utc>>,
    last_violation:           Option<LastViolation>
}

impl MonitorState {
    fn new() -> Self {
        Self {
            started_at:               Utc::now(),
            events:                   VecDeque::new(),
            total_queries:            0,
            blocked_queries:          0,
            high_risk_queries:        0,
            queries_with_warnings:    0,
            total_check_time_ms:      0.0,
            violations_by_type:       IndexMap::new(),
            violations_by_risk:       IndexMap::new(),
            session_violations:       IndexMap::new(),
            recent_blocked:           VecDeque::new(),
            recent_high_risk:         VecDeque::new(),
            last_violation:           None
        }
    }
}

/// Bounded in-memory record of security decisions.
#[derive(Debug)]
pub struct SecurityMonitor {
    config: MonitorConfig,
    state:  Mutex<MonitorState>
}

impl Default for SecurityMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl SecurityMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState::new())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner()
        }
    }

    /// Distinct violation types and sessions kept, same bound as the ring
    fn tracked_keys(&self) -> usize {
        self.config.capacity.max(1)
    }

    fn push_event(&self, state: &mut MonitorState, event: SecurityEvent) {
        if state.events.len() >= self.config.capacity.max(1) {
            state.events.pop_front();
        }
        state.events.push_back(event);
    }

    /// Record one validation outcome and return its event id.
    pub fn record(
        &self,
        query: &str,
        report: &SecurityReport,
        session_id: Option<&str>,
        check_time: Duration
    ) -> String {
        let now = Utc::now();
        let id = format!("{}_{}", now.to_rfc3339(), report.query_hash);
        if !self.config.enabled {
            return id;
        }

        let event = SecurityEvent {
            timestamp:     now,
            event_type:    EventType::QueryValidation,
            risk_level:    report.risk_level,
            query_hash:    report.query_hash.clone(),
            query_preview: preview(query, PREVIEW_CHARS),
            violations:    report.violations.clone(),
            warnings:      report.warnings.clone(),
            blocked:       !report.is_safe,
            check_time_ms: check_time.as_secs_f64() * 1000.0,
            session_id:    session_id.filter(|s| !s.is_empty()).map(str::to_string)
        };

        let mut state = self.lock();
        self.update_counters(&mut state, &event);
        let alerts = self.check_alerts(&mut state, &event);
        self.push_event(&mut state, event);

        for (kind, message, severity) in alerts {
            warn!(alert = %kind, severity = %severity, "{}", message);
            let alert = SecurityEvent {
                timestamp:     now,
                event_type:    EventType::SecurityAlert,
                risk_level:    severity,
                query_hash:    "alert".to_string(),
                query_preview: format!("Alert: {}", kind),
                violations:    vec![message],
                warnings:      Vec::new(),
                blocked:       false,
                check_time_ms: 0.0,
                session_id:    None
            };
            self.push_event(&mut state, alert);
        }

        id
    }

    fn update_counters(&self, state: &mut MonitorState, event: &SecurityEvent) {
        state.total_queries += 1;
        state.total_check_time_ms += event.check_time_ms;

        if event.blocked {
            state.blocked_queries += 1;
            state.recent_blocked.push_back(event.timestamp);
        }
        if event.risk_level >= RiskLevel::High {
            state.high_risk_queries += 1;
            state.recent_high_risk.push_back(event.timestamp);
        }
        if !event.warnings.is_empty() {
            state.queries_with_warnings += 1;
        }

        for violation in &event.violations {
            let key = violation
                .split_once(':')
                .map_or(violation.as_str(), |(head, _)| head);
            *count_key(&mut state.violations_by_type, key, self.tracked_keys()) += 1;
        }
        *state.violations_by_risk.entry(event.risk_level).or_default() += 1;

        if event.violations.is_empty() {
            return;
        }
        if let Some(session) = &event.session_id {
            *count_key(&mut state.session_violations, session, self.tracked_keys()) += 1;
        }
        state.last_violation = Some(LastViolation {
            timestamp:  event.timestamp,
            risk_level: event.risk_level,
            query_hash: event.query_hash.clone(),
            violations: event.violations.clone()
        });
    }

    fn check_alerts(
        &self,
        state: &mut MonitorState,
        event: &SecurityEvent
    ) -> Vec<(AlertKind, String, RiskLevel)> {
        let cutoff = event.timestamp - TimeDelta::minutes(1);
        for window in [&mut state.recent_blocked, &mut state.recent_high_risk] {
            while window.front().is_some_and(|t| *t <= cutoff) {
                window.pop_front();
            }
        }

        let mut alerts = Vec::new();
        let blocked = state.recent_blocked.len();
        if blocked > self.config.blocked_per_minute {
            alerts.push((
                AlertKind::HighBlockRate,
                format!("High rate of blocked queries: {} in last minute", blocked),
                RiskLevel::Critical
            ));
        }
        let high_risk = state.recent_high_risk.len();
        if high_risk > self.config.high_risk_per_minute {
            alerts.push((
                AlertKind::HighRiskRate,
                format!("High rate of risky queries: {} in last minute", high_risk),
                RiskLevel::High
            ));
        }
        if let Some(session) = &event.session_id
            && let Some(count) = state.session_violations.get(session)
            && *count > self.config.violations_per_session
        {
            alerts.push((
                AlertKind::SessionAbuse,
                format!("Session {} has {} violations", session, count),
                RiskLevel::High
            ));
        }
        alerts
    }

    /// Alerts still held in the ring, oldest first
    pub fn alerts(&self) -> Vec<SecurityEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.event_type == EventType::SecurityAlert)
            .cloned()
            .collect()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        let state = self.lock();
        let skip = state.events.len().saturating_sub(limit);
        state.events.iter().skip(skip).cloned().collect()
    }

    pub fn dashboard(&self) -> Dashboard {
        let state = self.lock();
        let now = Utc::now();
        let hour_ago = now - TimeDelta::hours(1);
        let recent: Vec<&SecurityEvent> = state
            .events
            .iter()
            .filter(|e| e.timestamp > hour_ago)
            .collect();

        let total = state.total_queries;
        Dashboard {
            overview:        Overview {
                uptime_hours:             (now - state.started_at).num_milliseconds() as f64
                    / 3_600_000.0,
                total_queries:            total,
                blocked_queries:          state.blocked_queries,
                high_risk_queries:        state.high_risk_queries,
                block_rate:               round2(percent(state.blocked_queries, total)),
                high_risk_rate:           round2(percent(state.high_risk_queries, total)),
                sessions_with_violations: state.session_violations.len()
            },
            recent_activity: RecentActivity {
                events_last_hour:    recent.len(),
                blocked_last_hour:   recent.iter().filter(|e| e.blocked).count(),
                high_risk_last_hour: recent
                    .iter()
                    .filter(|e| e.risk_level >= RiskLevel::High)
                    .count()
            },
            violations:      ViolationSummary {
                by_type:        top_n(state.violations_by_type.iter().map(|(k, v)| (k.clone(), *v)), 10),
                by_risk_level:  state.violations_by_risk.clone(),
                last_violation: state.last_violation.clone()
            },
            performance:     Performance {
                avg_check_time_ms:     if total == 0 {
                    0.0
                } else {
                    state.total_check_time_ms / total as f64
                },
                total_check_time_ms:   state.total_check_time_ms,
                queries_with_warnings: state.queries_with_warnings
            }
        }
    }

    /// Activity of the last `hours` hours, `None` when nothing happened.
    pub fn report(&self, hours: u32) -> Option<PeriodReport> {
        let state = self.lock();
        let start = TimeDelta::try_hours(i64::from(hours))
            .and_then(|span| Utc::now().checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let events: Vec<&SecurityEvent> = state
            .events
            .iter()
            .filter(|e| e.timestamp > start)
            .collect();
        if events.is_empty() {
            return None;
        }

        let count_level = |level: RiskLevel| events.iter().filter(|e| e.risk_level == level).count();
        let sessions: IndexSet<&str> = events.iter().filter_map(|e| e.session_id.as_deref()).collect();
        let violating_sessions: IndexSet<&str> = events
            .iter()
            .filter(|e| !e.violations.is_empty())
            .filter_map(|e| e.session_id.as_deref())
            .collect();

        let mut patterns: IndexMap<String, u64> = IndexMap::new();
        for violation in events.iter().flat_map(|e| &e.violations) {
            *patterns.entry(violation.clone()).or_default() += 1;
        }

        let mut risk_distribution = IndexMap::new();
        for level in [RiskLevel::Critical, RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
            risk_distribution.insert(level, count_level(level));
        }

        Some(PeriodReport {
            period: format!("Last {} hours", hours),
            summary: PeriodSummary {
                total_events:             events.len(),
                blocked_queries:          events.iter().filter(|e| e.blocked).count(),
                critical_events:          count_level(RiskLevel::Critical),
                high_risk_events:         count_level(RiskLevel::High),
                sessions_analyzed:        sessions.len(),
                sessions_with_violations: violating_sessions.len()
            },
            top_violations: top_n(patterns.into_iter(), 10),
            risk_distribution,
            recommendations: recommendations(&events)
        })
    }

    /// Serialize the newest `limit` events.
    pub fn export(&self, format: ExportFormat, limit: usize) -> AppResult<String> {
        let events = self.recent_events(limit);
        match format {
            ExportFormat::Json => {
                serde_json::to_string_pretty(&events).map_err(|e| serialization_error("JSON", e))
            }
            ExportFormat::Csv => {
                let mut lines = vec![
                    "timestamp,event_type,risk_level,blocked,violations_count,warnings_count"
                        .to_string()
                ];
                lines.extend(events.iter().map(|e| {
                    format!(
                        "{},{},{},{},{},{}",
                        e.timestamp.to_rfc3339(),
                        e.event_type.as_str(),
                        e.risk_level,
                        e.blocked,
                        e.violations.len(),
                        e.warnings.len()
                    )
                }));
                Ok(lines.join("\n"))
            }
        }
    }

    pub fn reset(&self) {
        *self.lock() = MonitorState::new();
    }
}

fn recommendations(events: &[&SecurityEvent]) -> Vec<String> {
    let mut out = Vec::new();

    let blocked = events.iter().filter(|e| e.blocked).count();
    if blocked > 10 {
        out.push(format!(
            "High number of blocked queries ({}). Review input validation.",
            blocked
        ));
    }

    if events
        .iter()
        .any(|e| e.violations.iter().any(|v| v.to_lowercase().contains("injection")))
    {
        out.push("SQL injection attempts detected. Implement parameterized queries.".to_string());
    }

    let mut per_session: IndexMap<&str, usize> = IndexMap::new();
    for event in events.iter().filter(|e| !e.violations.is_empty()) {
        if let Some(session) = event.session_id.as_deref() {
            *per_session.entry(session).or_default() += event.violations.len();
        }
    }
    let noisy = per_session.values().filter(|count| **count > 5).count();
    if noisy > 0 {
        out.push(format!(
            "Sessions with repeated violations: {}. Consider rate limiting.",
            noisy
        ));
    }

    let slow = events.iter().filter(|e| e.check_time_ms > SLOW_CHECK_MS).count();
    if slow as f64 > events.len() as f64 * 0.1 {
        out.push(
            "High security check overhead detected. Consider optimizing security rules."
                .to_string()
        );
    }

    out
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Counter for `key`; the oldest key is evicted once `cap` keys are held
fn count_key<'a, V: Default>(map: &'a mut IndexMap<String, V>, key: &str, cap: usize) -> &'a mut V {
    if !map.contains_key(key) && map.len() >= cap {
        map.shift_remove_index(0);
    }
    map.entry(key.to_string()).or_default()
}

fn top_n(items: impl Iterator<Item = (String, u64)>, n: usize) -> Vec<(String, u64)> {
    let mut items: Vec<(String, u64)> = items.collect();
    items.sort_by(|a, b| b.1.cmp(&a.1));
    items.truncate(n);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::SecurityValidator;

    fn blocked_report() -> SecurityReport {
        SecurityValidator::default().validate("SELECT * FROM users; DROP TABLE users")
    }

    #[test]
    fn test_ring_buffer_capacity() {
        let monitor = SecurityMonitor::new(MonitorConfig {
            capacity: 3,
            ..Default::default()
        });
        let report = SecurityValidator::default().validate("SELECT id FROM t LIMIT 1");
        for _ in 0..5 {
            monitor.record("SELECT id FROM t LIMIT 1", &report, None, Duration::ZERO);
        }
        assert_eq!(monitor.recent_events(10).len(), 3);
        assert_eq!(monitor.dashboard().overview.total_queries, 5);
    }

    #[test]
    fn test_block_rate_alert() {
        let monitor = SecurityMonitor::new(MonitorConfig {
            blocked_per_minute: 2,
            ..Default::default()
        });
        let report = blocked_report();
        for _ in 0..3 {
            monitor.record("x", &report, None, Duration::ZERO);
        }
        let alerts = monitor.alerts();
        assert!(
            alerts
                .iter()
                .any(|a| a.query_preview == "Alert: HIGH_BLOCK_RATE")
        );
    }

    #[test]
    fn test_session_abuse_alert() {
        let monitor = SecurityMonitor::new(MonitorConfig {
            violations_per_session: 1,
            blocked_per_minute: 100,
            high_risk_per_minute: 100,
            ..Default::default()
        });
        let report = blocked_report();
        monitor.record("x", &report, Some("s1"), Duration::ZERO);
        assert!(monitor.alerts().is_empty());
        monitor.record("x", &report, Some("s1"), Duration::ZERO);
        assert_eq!(monitor.alerts().len(), 1);
        assert_eq!(monitor.dashboard().overview.sessions_with_violations, 1);
    }

    #[test]
    fn test_disabled_monitor_records_nothing() {
        let monitor = SecurityMonitor::new(MonitorConfig {
            enabled: false,
            ..Default::default()
        });
        monitor.record("x", &blocked_report(), None, Duration::ZERO);
        assert_eq!(monitor.dashboard().overview.total_queries, 0);
    }

    #[test]
    fn test_report_and_recommendations() {
        let monitor = SecurityMonitor::default();
        assert!(monitor.report(24).is_none());
        monitor.record("x", &blocked_report(), None, Duration::ZERO);
        let report = monitor.report(24).expect("events present");
        assert_eq!(report.summary.blocked_queries, 1);
        assert_eq!(report.summary.critical_events, 1);
        assert!(
            report
                .recommendations
                .iter()
                .any(|r| r.contains("parameterized"))
        );
    }

    #[test]
    fn test_report_with_huge_window_keeps_everything() {
        let monitor = SecurityMonitor::default();
        monitor.record("x", &blocked_report(), None, Duration::ZERO);
        let report = monitor.report(u32::MAX).expect("events present");
        assert_eq!(report.summary.total_events, 1);
    }

    #[test]
    fn test_violation_keys_bounded_like_ring() {
        let monitor = SecurityMonitor::new(MonitorConfig {
            capacity: 3,
            violations_per_session: 100,
            blocked_per_minute: 100,
            high_risk_per_minute: 100,
            ..Default::default()
        });
        let mut report = blocked_report();
        for i in 0..6 {
            report.violations = vec![format!("Rule{}: tripped", i)];
            monitor.record("x", &report, Some(&format!("s{}", i)), Duration::ZERO);
        }

        let dashboard = monitor.dashboard();
        assert_eq!(dashboard.overview.sessions_with_violations, 3);
        let kinds: Vec<&str> = dashboard
            .violations
            .by_type
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(kinds.len(), 3);
        assert!(!kinds.contains(&"Rule0"));
        assert!(kinds.contains(&"Rule5"));
    }

    #[test]
    fn test_export_formats() {
        let monitor = SecurityMonitor::default();
        monitor.record("x", &blocked_report(), None, Duration::ZERO);
        let csv = monitor.export(ExportFormat::Csv, 10).unwrap();
        assert!(csv.starts_with("timestamp,event_type"));
        assert!(csv.lines().nth(1).unwrap().contains(",query_validation,critical,true,"));
        let json = monitor.export(ExportFormat::Json, 10).unwrap();
        assert!(json.contains("\"event_type\": \"query_validation\""));
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_reset_clears_everything() {
        let monitor = SecurityMonitor::default();
        monitor.record("x", &blocked_report(), None, Duration::ZERO);
        monitor.reset();
        assert_eq!(monitor.dashboard().overview.total_queries, 0);
        assert!(monitor.recent_events(10).is_empty());
    }
}
