use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completion of one logical series for one subject.
///
/// A logical series may span several catalog series ids when the server
/// re-created it; `series_ids` lists all of them and `primary_series_id` is
/// the most recently watched one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShowProgress {
    pub series_name: String,
    pub primary_series_id: String,
    pub series_ids: Vec<String>,
    pub total_episodes: u32,
    pub watched_episodes: u32,
    pub progress: f64,
    pub last_watched: Option<DateTime<Utc>>,
    pub seasons: Vec<SeasonProgress>,
    pub next_episode: Option<NextEpisode>,
    pub secondary_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonProgress {
    pub season_id: String,
    pub season_number: u32,
    pub name: String,
    pub total_episodes: u32,
    pub watched_episodes: u32,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextEpisode {
    pub episode_id: String,
    pub season_number: u32,
    pub episode_number: u32,
    pub name: String,
    pub runtime_minutes: u32,
}

/// Percent with one decimal, 0 when there is nothing to watch
pub fn percent(watched: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (watched as f64 / total as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_to_one_decimal() {
        assert_eq!(percent(1, 3), 33.3);
        assert_eq!(percent(2, 3), 66.7);
        assert_eq!(percent(10, 10), 100.0);
    }

    #[test]
    fn test_percent_with_zero_total() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(5, 0), 0.0);
    }
}
