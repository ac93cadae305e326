//! TEMPORAL resolver: time values, always computed fresh

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde_json::json;

use token_types::{
    CostImpact, ResolverId, ResolverOutcome, Token, TokenError, TokenResult, TokenType,
};

use crate::context::ResolverContext;

use super::TokenResolver;

/// Resolves `{TEMPORAL:type:frequency:identifier}` from the context
/// clock. Every outcome carries a zero TTL so nothing downstream ever
/// caches a time value.
///
/// Supported kinds: `now` (RFC 3339 timestamp), `date`, `time`,
/// `epoch` (seconds), and `schedule` (next boundary of the frequency
/// segment, one of `hourly`, `daily`, `weekly`).
pub struct TemporalResolver {
    id: ResolverId,
}

impl TemporalResolver {
    pub fn new() -> Self {
        Self {
            id: ResolverId::new("temporal-primary"),
        }
    }
}

impl Default for TemporalResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenResolver for TemporalResolver {
    fn id(&self) -> ResolverId {
        self.id.clone()
    }

    fn token_type(&self) -> TokenType {
        TokenType::Temporal
    }

    async fn resolve(&self, token: &Token, ctx: &ResolverContext) -> TokenResult<ResolverOutcome> {
        let now = ctx.now;
        let value = match token.namespace.as_str() {
            "now" | "timestamp" => json!(now.to_rfc3339()),
            "date" => json!(now.format("%Y-%m-%d").to_string()),
            "time" => json!(now.format("%H:%M:%S").to_string()),
            "epoch" => json!(now.timestamp()),
            "schedule" => json!(next_boundary(now, &token.scope, token)?.to_rfc3339()),
            other => {
                return Err(TokenError::ResolutionFailure {
                    token: token.placeholder.clone(),
                    reason: format!("unknown temporal kind '{}'", other),
                })
            }
        };
        Ok(ResolverOutcome::new(value)
            .with_ttl_secs(0)
            .with_cost(CostImpact {
                compute_units: 1,
                ..Default::default()
            }))
    }
}

/// Next boundary of `frequency`, strictly after `now`.
fn next_boundary(now: DateTime<Utc>, frequency: &str, token: &Token) -> TokenResult<DateTime<Utc>> {
    let invalid = || TokenError::ResolutionFailure {
        token: token.placeholder.clone(),
        reason: "schedule boundary out of calendar range".to_string(),
    };
    match frequency {
        "hourly" => {
            let hour_start = now
                .date_naive()
                .and_hms_opt(now.hour(), 0, 0)
                .ok_or_else(invalid)?;
            Ok(Utc.from_utc_datetime(&hour_start) + Duration::hours(1))
        }
        "daily" => {
            let next_day = now.date_naive().succ_opt().ok_or_else(invalid)?;
            let midnight = next_day.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
            Ok(Utc.from_utc_datetime(&midnight))
        }
        "weekly" => {
            // always the coming Monday, a full week out when today is Monday
            let days_ahead = 7 - i64::from(now.weekday().num_days_from_monday());
            let next_monday = now.date_naive() + Duration::days(days_ahead);
            let midnight = next_monday.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
            Ok(Utc.from_utc_datetime(&midnight))
        }
        other => Err(TokenError::ResolutionFailure {
            token: token.placeholder.clone(),
            reason: format!("unknown schedule frequency '{}'", other),
        }),
    }
}
