use std::time::Duration;

use chrono::{Days, NaiveDate};
use tracing::debug;
use tse_store::models::{DateRange, HistorySeries, Snapshot};

use super::{MarketControlPlane, Resolved};
use crate::error::QueryError;
use crate::normalizer::{normalize_history, normalize_snapshot, tehran_today};

impl MarketControlPlane {
    /// Resolves `symbol_or_name` and returns its latest trading snapshot.
    ///
    /// # Errors
    /// Propagates resolution failures (`NotFound`, `Ambiguous`), fetch
    /// failures (`InstrumentNotFound`, `UpstreamUnavailable`), and
    /// `MalformedData`; returns `Timeout` when the deadline passes first.
    pub async fn get_stock_info(
        &self,
        symbol_or_name: &str,
        deadline: Option<Duration>,
    ) -> Result<Resolved<Snapshot>, QueryError> {
        let resolved = self
            .with_deadline("get_stock_info", deadline, async {
                let instrument = self.resolve(symbol_or_name).await?;
                let raw = self.fetcher.fetch_snapshot(&instrument.identifier).await?;
                let snapshot = normalize_snapshot(&raw)
                    .map_err(|detail| QueryError::malformed(&instrument.identifier, detail))?;
                Ok((instrument, snapshot))
            })
            .await;

        let (instrument, data) = resolved?;
        Ok(Resolved {
            instrument,
            data,
            warning: self.catalog.take_warning(),
        })
    }

    /// Resolves `symbol_or_name` and returns its daily sessions within
    /// `start..=end`.
    ///
    /// A missing `end` means today on the exchange clock; a missing `start`
    /// covers the configured default number of days ending at `end`. The range
    /// is validated before anything is resolved or fetched.
    ///
    /// # Errors
    /// Returns `InvalidRange` for a reversed or oversized range, otherwise the
    /// same errors as [`Self::get_stock_info`].
    pub async fn get_stock_history(
        &self,
        symbol_or_name: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        deadline: Option<Duration>,
    ) -> Result<Resolved<HistorySeries>, QueryError> {
        let range = self.history_range(start, end)?;

        let resolved = self
            .with_deadline("get_stock_history", deadline, async {
                let instrument = self.resolve(symbol_or_name).await?;
                let raw = self
                    .fetcher
                    .fetch_history(&instrument.identifier, range)
                    .await?;
                let series = normalize_history(&raw)
                    .map_err(|detail| QueryError::malformed(&instrument.identifier, detail))?;
                let available = series.len();
                let series = series.within(range);
                debug!(
                    identifier = %instrument.identifier,
                    available,
                    returned = series.len(),
                    "history restricted to range"
                );
                Ok((instrument, series))
            })
            .await;

        let (instrument, data) = resolved?;
        Ok(Resolved {
            instrument,
            data,
            warning: self.catalog.take_warning(),
        })
    }

    /// Fills in defaults and checks ordering and span.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidRange` when `start > end` or the range
    /// covers more days than allowed.
    pub fn history_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DateRange, QueryError> {
        let end = end.unwrap_or_else(tehran_today);
        let start = start.unwrap_or_else(|| {
            let back = u64::from(self.config.default_history_days.saturating_sub(1));
            end.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
        });
        let range = DateRange::new(start, end);

        if !range.is_ordered() {
            return Err(QueryError::InvalidRange {
                start,
                end,
                reason: String::from("start is after end"),
            });
        }
        let max = self.config.max_history_span_days;
        if range.span_days() > i64::from(max) {
            return Err(QueryError::InvalidRange {
                start,
                end,
                reason: format!(
                    "range covers {} days, more than the maximum of {max}",
                    range.span_days()
                ),
            });
        }
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::fetcher::{TransportFuture, TransportResponse, UpstreamTransport};

    struct EmptyUpstream;

    impl UpstreamTransport for EmptyUpstream {
        fn get<'a>(&'a self, _url: &'a str, _timeout: Duration) -> TransportFuture<'a> {
            Box::pin(async { Ok(TransportResponse::ok("{}")) })
        }
    }

    fn control(config: PipelineConfig) -> MarketControlPlane {
        MarketControlPlane::from_transport(Arc::new(EmptyUpstream), config)
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn default_start_covers_default_days() {
        let control = control(PipelineConfig::default().with_default_history_days(10));
        let range = control
            .history_range(None, Some(date(2024, 1, 10)))
            .expect("range");
        assert_eq!(range.start, date(2024, 1, 1));
        assert_eq!(range.span_days(), 10);
    }

    #[test]
    fn reversed_range_is_rejected() {
        let control = control(PipelineConfig::default());
        let err = control
            .history_range(Some(date(2024, 2, 1)), Some(date(2024, 1, 1)))
            .expect_err("reversed");
        assert_eq!(err.kind(), "invalid_range");
    }

    #[test]
    fn oversized_range_is_rejected() {
        let control = control(PipelineConfig::default().with_max_history_span_days(30));
        assert!(control
            .history_range(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)))
            .is_err());
        assert!(control
            .history_range(Some(date(2024, 1, 1)), Some(date(2024, 1, 30)))
            .is_ok());
    }
}
