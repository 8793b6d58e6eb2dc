// Session orchestration: prompt -> worker -> assembler -> extraction ->
// typed record

use std::sync::Arc;

use crate::engine::EngineHandle;
use crate::error::SessionError;
use crate::extract::{self, ActivityExtractor, RawExtraction};
use crate::prompt::{build_prompt, STOP_MARKER};
use crate::stop::{EosStop, StopPredicate};
use crate::stream::{spawn_worker, StreamAssembler};
use crate::types::{ActivityRecord, ConversationTurn, GenerationParams, Mood};

/// Llama-convention end-of-sequence id, used when the caller does not
/// supply its own predicate.
const DEFAULT_EOS_ID: u32 = 2;

/// What one completed session produced.
#[derive(Debug)]
pub struct SessionOutcome {
    /// The finished reply text, marker-free.
    pub final_text: String,
    /// `Ok(None)` when the reply contained no recognizable activity
    /// field; `Err` is always a coercion failure. Either way the text
    /// above was generated successfully and is the caller's to keep.
    pub record: Result<Option<ActivityRecord>, SessionError>,
}

/// One conversation against a shared generation engine. Owns the history;
/// nothing else reads or writes it.
pub struct Session {
    engine: EngineHandle,
    stop: Arc<dyn StopPredicate>,
    extractor: ActivityExtractor,
    history: Vec<ConversationTurn>,
}

impl Session {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            stop: Arc::new(EosStop::new(DEFAULT_EOS_ID)),
            extractor: ActivityExtractor::new(),
            history: Vec::new(),
        }
    }

    pub fn with_stop_predicate(mut self, stop: Arc<dyn StopPredicate>) -> Self {
        self.stop = stop;
        self
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Run one request/response/extraction cycle. Each emitted cumulative
    /// partial is handed to `on_partial` as it becomes available.
    ///
    /// Timeouts and engine failures propagate without touching history or
    /// attempting extraction. On normal completion the finished turn is
    /// appended to history and the reply is mined for activity fields;
    /// `day` keys the resulting record, since the day is caller input
    /// rather than something the reply states.
    pub async fn run(
        &mut self,
        message: &str,
        day: u32,
        params: &GenerationParams,
        on_partial: impl FnMut(&str),
    ) -> Result<SessionOutcome, SessionError> {
        let prompt = build_prompt(&self.history, message);
        tracing::debug!(prompt_len = prompt.len(), day, "starting session");

        let worker = spawn_worker(
            self.engine.clone(),
            prompt,
            params.clone(),
            self.stop.clone(),
        );
        let assembler = StreamAssembler::new(worker, STOP_MARKER, params);
        let final_text = assembler.drain(on_partial).await?;

        let raw = self.extractor.extract(&final_text);
        let record = if raw.is_empty() {
            Ok(None)
        } else {
            build_record(day, &raw).map(Some)
        };

        self.history.push(ConversationTurn {
            user: message.to_string(),
            assistant: final_text.clone(),
        });
        tracing::debug!(
            reply_len = final_text.len(),
            has_record = matches!(record, Ok(Some(_))),
            "session completed"
        );

        Ok(SessionOutcome { final_text, record })
    }
}

/// Coerce raw captures into a typed record. Absent fields keep their
/// defaults; a capture that will not convert is a hard error, never a
/// silent zero.
pub fn build_record(day: u32, raw: &RawExtraction) -> Result<ActivityRecord, SessionError> {
    let mut record = ActivityRecord::empty(day);

    if let Some(value) = raw.get(extract::STEPS_WALKED) {
        record.steps_walked = coerce_int(extract::STEPS_WALKED, value)?;
    }
    if let Some(value) = raw.get(extract::HOURS_SLEPT) {
        record.hours_slept = coerce_real(extract::HOURS_SLEPT, value)?;
    }
    if let Some(value) = raw.get(extract::WATER_INTAKE) {
        record.water_intake_liters = coerce_real(extract::WATER_INTAKE, value)?;
    }
    if let Some(value) = raw.get(extract::EXERCISE_DURATION) {
        record.exercise_duration_minutes = coerce_int(extract::EXERCISE_DURATION, value)?;
    }
    if let Some(value) = raw.get(extract::MOOD) {
        record.mood = Some(coerce_mood(value)?);
    }
    if let Some(value) = raw.get(extract::CALORIES_INTAKE) {
        record.calories_intake = coerce_int(extract::CALORIES_INTAKE, value)?;
    }
    if let Some(value) = raw.get(extract::PRODUCTIVITY_SCORE) {
        record.productivity_score = coerce_int(extract::PRODUCTIVITY_SCORE, value)?;
    }
    if let Some(value) = raw.get(extract::WORK_DONE) {
        record.work_done = value.clone();
    }

    Ok(record)
}

fn coerce_int(field: &'static str, value: &str) -> Result<i64, SessionError> {
    value.parse().map_err(|_| SessionError::Coercion {
        field,
        value: value.to_string(),
    })
}

fn coerce_real(field: &'static str, value: &str) -> Result<f64, SessionError> {
    value.parse().map_err(|_| SessionError::Coercion {
        field,
        value: value.to_string(),
    })
}

/// The raw mood capture is the whole match ("Good mood"); the enum value
/// is the phrase before the keyword.
fn coerce_mood(value: &str) -> Result<Mood, SessionError> {
    value
        .strip_suffix(" mood")
        .and_then(|phrase| phrase.parse().ok())
        .ok_or_else(|| SessionError::Coercion {
            field: extract::MOOD,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::ScriptedEngine;
    use crate::error::SessionError;
    use std::time::Duration;

    fn session_over(engine: ScriptedEngine) -> Session {
        Session::new(EngineHandle::new(Arc::new(engine)))
            .with_stop_predicate(Arc::new(EosStop::new(u32::MAX)))
    }

    fn fast_params() -> GenerationParams {
        GenerationParams {
            read_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_cycle_builds_record_and_appends_history() {
        let mut session = session_over(ScriptedEngine::new(&[
            "You walked 8000 steps",
            " and had 7.5 hours of sleep",
            STOP_MARKER,
        ]));

        let mut partials = Vec::new();
        let outcome = session
            .run("how was my day?", 3, &fast_params(), |p| {
                partials.push(p.to_string())
            })
            .await
            .unwrap();

        assert_eq!(
            outcome.final_text,
            "You walked 8000 steps and had 7.5 hours of sleep"
        );
        assert_eq!(partials.len(), 2);

        let record = outcome.record.unwrap().unwrap();
        assert_eq!(record.day, 3);
        assert_eq!(record.steps_walked, 8000);
        assert_eq!(record.hours_slept, 7.5);
        assert_eq!(record.calories_intake, 0);
        assert!(record.mood.is_none());

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].user, "how was my day?");
        assert_eq!(session.history()[0].assistant, outcome.final_text);
    }

    #[tokio::test]
    async fn test_no_fields_returns_text_without_record() {
        let mut session =
            session_over(ScriptedEngine::new(&["Just a friendly reply, nothing to log"]));

        let outcome = session
            .run("hi", 1, &fast_params(), |_| {})
            .await
            .unwrap();

        assert!(outcome.record.unwrap().is_none());
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_history_untouched() {
        let mut session = session_over(ScriptedEngine::new(&["partial"]).failing("gpu fell over"));

        let err = session
            .run("hello", 1, &fast_params(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Generation(_)));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_leaves_history_untouched() {
        let params = GenerationParams {
            read_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let mut session = session_over(
            ScriptedEngine::new(&["slow", " reply"])
                .with_delay_from(Duration::from_millis(300), 0),
        );

        let err = session.run("hello", 1, &params, |_| {}).await.unwrap_err();

        assert!(matches!(err, SessionError::ReadTimeout { .. }));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_carries_into_next_prompt() {
        // Two turns against the same session; the second prompt must
        // contain the first turn verbatim.
        let engine = Arc::new(ScriptedEngine::new(&["fine, thanks"]));
        let handle = EngineHandle::new(engine);
        let mut session = Session::new(handle.clone())
            .with_stop_predicate(Arc::new(EosStop::new(u32::MAX)));

        session.run("how are you?", 1, &fast_params(), |_| {}).await.unwrap();
        session.run("and now?", 1, &fast_params(), |_| {}).await.unwrap();

        assert_eq!(session.history().len(), 2);
        let rendered = build_prompt(session.history(), "next");
        assert!(rendered.contains("how are you?"));
        assert!(rendered.contains("fine, thanks"));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_serialize_on_engine() {
        let engine = Arc::new(
            ScriptedEngine::new(&["a", "b", "c", "d"])
                .with_delay_from(Duration::from_millis(5), 0),
        );
        let handle = EngineHandle::new(engine.clone());

        let mut first = Session::new(handle.clone())
            .with_stop_predicate(Arc::new(EosStop::new(u32::MAX)));
        let mut second = Session::new(handle)
            .with_stop_predicate(Arc::new(EosStop::new(u32::MAX)));

        let params = fast_params();
        let (one, two) = tokio::join!(
            first.run("first", 1, &params, |_| {}),
            second.run("second", 1, &params, |_| {}),
        );

        assert_eq!(one.unwrap().final_text, "abcd");
        assert_eq!(two.unwrap().final_text, "abcd");
        assert!(!engine.overlap_seen.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_coercion_error_instead_of_silent_default() {
        let mut raw = RawExtraction::new();
        raw.insert(extract::STEPS_WALKED, "abc".to_string());

        let err = build_record(1, &raw).unwrap_err();
        match err {
            SessionError::Coercion { field, value } => {
                assert_eq!(field, extract::STEPS_WALKED);
                assert_eq!(value, "abc");
            }
            other => panic!("expected coercion error, got {other:?}"),
        }
    }

    #[test]
    fn test_mood_coercion_strips_keyword() {
        let mut raw = RawExtraction::new();
        raw.insert(extract::MOOD, "Very Bad mood".to_string());

        let record = build_record(2, &raw).unwrap();
        assert_eq!(record.mood, Some(Mood::VeryBad));
    }

    #[test]
    fn test_mood_coercion_rejects_garbage() {
        let mut raw = RawExtraction::new();
        raw.insert(extract::MOOD, "Sideways mood".to_string());
        assert!(build_record(2, &raw).is_err());
    }

    #[tokio::test]
    async fn test_every_field_coerces_end_to_end() {
        let text = "10000 steps, 8 hours of sleep, 2 liters of water, 30 minutes of exercise, \
                    Good mood, 1800 calories, productivity score of 7, work done: reviewed PRs";
        let mut session = session_over(ScriptedEngine::new(&[text]));

        let outcome = session.run("log my day", 9, &fast_params(), |_| {}).await.unwrap();
        let record = outcome.record.unwrap().unwrap();
        assert_eq!(record.day, 9);
        assert_eq!(record.mood, Some(Mood::Good));
        assert_eq!(record.productivity_score, 7);
        assert_eq!(record.work_done, "reviewed PRs");
    }
}
