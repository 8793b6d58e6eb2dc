// Core type definitions for Daybook

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One completed exchange in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

/// Knobs passed through to the generation engine, plus the assembler's
/// per-read wait bound
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub top_p: f64,
    pub top_k: u32,
    pub temperature: f64,
    pub num_beams: u32,
    pub read_timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            do_sample: true,
            top_p: 0.9,
            top_k: 50,
            temperature: 0.7,
            num_beams: 1,
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Mood as reported in the assistant's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Excellent,
    Good,
    Neutral,
    Bad,
    #[serde(rename = "Very Bad")]
    VeryBad,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Excellent => "Excellent",
            Mood::Good => "Good",
            Mood::Neutral => "Neutral",
            Mood::Bad => "Bad",
            Mood::VeryBad => "Very Bad",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Excellent" => Ok(Mood::Excellent),
            "Good" => Ok(Mood::Good),
            "Neutral" => Ok(Mood::Neutral),
            "Bad" => Ok(Mood::Bad),
            "Very Bad" => Ok(Mood::VeryBad),
            _ => Err(()),
        }
    }
}

/// Fully typed daily-activity record built from one finished generation.
/// Fields the reply never mentioned carry their defaults; the record is
/// built whole in memory before it is handed to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub day: u32,
    pub steps_walked: i64,
    pub hours_slept: f64,
    pub water_intake_liters: f64,
    pub exercise_duration_minutes: i64,
    pub mood: Option<Mood>,
    pub calories_intake: i64,
    pub productivity_score: i64,
    pub work_done: String,
}

impl ActivityRecord {
    /// An all-defaults record for the given day; the session overlays
    /// whatever fields the extractor found.
    pub fn empty(day: u32) -> Self {
        Self {
            day,
            steps_walked: 0,
            hours_slept: 0.0,
            water_intake_liters: 0.0,
            exercise_duration_minutes: 0,
            mood: None,
            calories_intake: 0,
            productivity_score: 0,
            work_done: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_round_trip() {
        for mood in [
            Mood::Excellent,
            Mood::Good,
            Mood::Neutral,
            Mood::Bad,
            Mood::VeryBad,
        ] {
            assert_eq!(mood.as_str().parse::<Mood>().unwrap(), mood);
        }
    }

    #[test]
    fn test_mood_rejects_unknown() {
        assert!("Meh".parse::<Mood>().is_err());
        assert!("good".parse::<Mood>().is_err());
        assert!("".parse::<Mood>().is_err());
    }

    #[test]
    fn test_very_bad_serializes_with_space() {
        let json = serde_json::to_string(&Mood::VeryBad).unwrap();
        assert_eq!(json, "\"Very Bad\"");
    }
}
