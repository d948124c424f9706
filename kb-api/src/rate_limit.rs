use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::RateLimitConfig;

/// The decision plus the header values a 429 (or a successful response)
/// reports back to the client, per §6's rate-limit header contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub global_limit: u32,
    pub global_remaining: u32,
    pub ip_limit: u32,
    pub ip_remaining: u32,
    pub reset_unix: i64,
}

struct RateLimiterState {
    day: NaiveDate,
    global_count: u32,
    per_ip: HashMap<String, u32>,
}

impl RateLimiterState {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            global_count: 0,
            per_ip: HashMap::new(),
        }
    }
}

/// In-memory, single-process rate limiter (§5, §9 "mutable singletons"):
/// a global counter and a per-IP counter map, both reset at the UTC day
/// boundary, guarded by one mutex so `hit` is atomic.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<RateLimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RateLimiterState::new(Utc::now().date_naive())),
        }
    }

    /// Record one request attempt from `ip` at `now`, returning whether it
    /// is allowed along with the header values to report either way.
    pub fn hit(&self, ip: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let today = now.date_naive();
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        if state.day != today {
            *state = RateLimiterState::new(today);
        }

        let would_exceed_global = state.global_count >= self.config.global_per_day;
        let ip_count = state.per_ip.entry(ip.to_string()).or_insert(0);
        let would_exceed_ip = *ip_count >= self.config.per_ip_per_day;
        let allowed = !would_exceed_ip && !would_exceed_global;

        if allowed {
            *ip_count += 1;
            state.global_count += 1;
        }

        let reset_unix = (today.succ_opt().unwrap_or(today))
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();

        RateLimitDecision {
            allowed,
            global_limit: self.config.global_per_day,
            global_remaining: self.config.global_per_day.saturating_sub(state.global_count),
            ip_limit: self.config.per_ip_per_day,
            ip_remaining: self.config.per_ip_per_day.saturating_sub(*state.per_ip.get(ip).unwrap_or(&0)),
            reset_unix,
        }
    }
}

/// Client IP resolution order (§6): `cf-connecting-ip`, `x-real-ip`, the
/// first entry of `x-forwarded-for`, else the socket peer address.
pub fn resolve_client_ip(
    cf_connecting_ip: Option<&str>,
    x_real_ip: Option<&str>,
    x_forwarded_for: Option<&str>,
    socket_peer: &str,
) -> String {
    if let Some(ip) = cf_connecting_ip.map(str::trim).filter(|s| !s.is_empty()) {
        return ip.to_string();
    }
    if let Some(ip) = x_real_ip.map(str::trim).filter(|s| !s.is_empty()) {
        return ip.to_string();
    }
    if let Some(first) = x_forwarded_for.and_then(|s| s.split(',').next()).map(str::trim).filter(|s| !s.is_empty()) {
        return first.to_string();
    }
    socket_peer.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            global_per_day: 3,
            per_ip_per_day: 2,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn allows_requests_under_both_limits() {
        let limiter = RateLimiter::new(config());
        let decision = limiter.hit("1.2.3.4", at(2026, 1, 1, 0));
        assert!(decision.allowed);
    }

    #[test]
    fn denies_after_per_ip_limit_reached() {
        let limiter = RateLimiter::new(config());
        limiter.hit("1.2.3.4", at(2026, 1, 1, 0));
        limiter.hit("1.2.3.4", at(2026, 1, 1, 1));
        let third = limiter.hit("1.2.3.4", at(2026, 1, 1, 2));
        assert!(!third.allowed);
    }

    #[test]
    fn denies_after_global_limit_reached_even_for_new_ips() {
        let limiter = RateLimiter::new(config());
        limiter.hit("1.1.1.1", at(2026, 1, 1, 0));
        limiter.hit("2.2.2.2", at(2026, 1, 1, 0));
        limiter.hit("3.3.3.3", at(2026, 1, 1, 0));
        let fourth = limiter.hit("4.4.4.4", at(2026, 1, 1, 0));
        assert!(!fourth.allowed);
    }

    #[test]
    fn resets_at_the_utc_day_boundary() {
        let limiter = RateLimiter::new(config());
        limiter.hit("1.2.3.4", at(2026, 1, 1, 23));
        limiter.hit("1.2.3.4", at(2026, 1, 1, 23));
        let next_day = limiter.hit("1.2.3.4", at(2026, 1, 2, 0));
        assert!(next_day.allowed);
    }

    #[test]
    fn client_ip_resolution_prefers_cf_header() {
        let ip = resolve_client_ip(Some("9.9.9.9"), Some("8.8.8.8"), Some("7.7.7.7, 6.6.6.6"), "5.5.5.5:1234");
        assert_eq!(ip, "9.9.9.9");
    }

    #[test]
    fn client_ip_resolution_falls_back_through_the_chain() {
        let ip = resolve_client_ip(None, None, Some("7.7.7.7, 6.6.6.6"), "5.5.5.5:1234");
        assert_eq!(ip, "7.7.7.7");
    }

    #[test]
    fn client_ip_resolution_falls_back_to_socket_peer() {
        let ip = resolve_client_ip(None, None, None, "5.5.5.5:1234");
        assert_eq!(ip, "5.5.5.5:1234");
    }
}
