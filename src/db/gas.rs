//! Gas-history reads for the fan-out. The `blocks` table is written by the
//! external gas producer; each round duration maps to a sampling stride so
//! long horizons do not flood the initial payload.

use sqlx::postgres::PgExecutor;
use sqlx::Row;

use crate::errors::IndexerError;
use crate::models::GasBlock;

/// Sampling stride for a round duration: 12-minute rounds every 4th block,
/// 3-hour rounds every 5th, 30-day rounds every 40th, everything else dense.
pub fn sampling_rate(round_duration: i64) -> i64 {
    match round_duration {
        960 => 4,
        13200 => 5,
        2631600 => 40,
        _ => 1,
    }
}

pub async fn get_blocks<'e, E: PgExecutor<'e>>(
    exec: E,
    start_timestamp: i64,
    end_timestamp: i64,
    round_duration: i64,
) -> Result<Vec<GasBlock>, IndexerError> {
    let rows = sqlx::query(
        "SELECT block_number, timestamp, basefee, is_confirmed,
                twelve_min_twap, three_hour_twap, thirty_day_twap
         FROM blocks
         WHERE timestamp BETWEEN $1 AND $2
         AND block_number % $3 = 0
         ORDER BY block_number ASC",
    )
    .bind(start_timestamp)
    .bind(end_timestamp)
    .bind(sampling_rate(round_duration))
    .fetch_all(exec)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(GasBlock {
                block_number: row.try_get("block_number")?,
                timestamp: row.try_get("timestamp")?,
                basefee: row.try_get("basefee")?,
                is_confirmed: row.try_get("is_confirmed")?,
                twelve_min_twap: row.try_get("twelve_min_twap")?,
                three_hour_twap: row.try_get("three_hour_twap")?,
                thirty_day_twap: row.try_get("thirty_day_twap")?,
            })
        })
        .collect::<Result<_, sqlx::Error>>()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_rates() {
        assert_eq!(sampling_rate(960), 4);
        assert_eq!(sampling_rate(13200), 5);
        assert_eq!(sampling_rate(2631600), 40);
        assert_eq!(sampling_rate(0), 1);
        assert_eq!(sampling_rate(12345), 1);
    }

    #[test]
    fn test_three_hour_sampling_selects_every_fifth_block() {
        let sampled: Vec<i64> = (0..100).filter(|n| n % sampling_rate(13200) == 0).collect();
        assert_eq!(sampled.first(), Some(&0));
        assert_eq!(sampled.last(), Some(&95));
        assert_eq!(sampled.len(), 20);
        assert!(sampled.windows(2).all(|w| w[1] - w[0] == 5));
    }
}
