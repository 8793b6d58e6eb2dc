// Streaming pipeline: the generation worker and the stream assembler
//
// The worker runs the blocking generation call off the consumer's thread
// and forwards decoded chunks through a bounded channel. The assembler
// turns that channel into a terminating sequence of cumulative partial
// output, gated by the stop marker and a per-read timeout.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineHandle;
use crate::error::{EngineError, SessionError};
use crate::stop::StopPredicate;
use crate::types::GenerationParams;

const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Handle to one in-flight generation call. There is at most one worker
/// per session; the channel closes exactly once, after the last chunk,
/// and failures surface through the join handle, never as a chunk.
pub struct GenerationWorker {
    rx: mpsc::Receiver<String>,
    join: Option<JoinHandle<Result<(), EngineError>>>,
    cancel: CancellationToken,
}

impl GenerationWorker {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        // An abandoned session must not leave the engine producing
        // tokens nobody will read.
        self.cancel.cancel();
    }
}

/// Start the blocking generation call on a dedicated blocking task.
/// Must be called from within a tokio runtime.
pub fn spawn_worker(
    engine: EngineHandle,
    prompt: String,
    params: GenerationParams,
    stop: Arc<dyn StopPredicate>,
) -> GenerationWorker {
    let (tx, rx) = mpsc::channel::<String>(CHUNK_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();

    let join = tokio::task::spawn_blocking(move || {
        let result = engine.generate(
            &prompt,
            &params,
            stop.as_ref(),
            &worker_cancel,
            &mut |chunk| tx.blocking_send(chunk.to_string()).is_ok(),
        );
        // tx drops here, closing the channel after the last chunk.
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "generation worker failed");
        }
        result
    });

    GenerationWorker {
        rx,
        join: Some(join),
        cancel,
    }
}

/// Consumes the worker's chunk channel with a bounded wait per read and
/// assembles cumulative partial output. The sequence is finite and not
/// restartable; a session is consumed at most once.
pub struct StreamAssembler {
    worker: GenerationWorker,
    stop_marker: String,
    read_timeout: std::time::Duration,
    cumulative: String,
    done: bool,
}

impl StreamAssembler {
    pub fn new(worker: GenerationWorker, stop_marker: &str, params: &GenerationParams) -> Self {
        Self {
            worker,
            stop_marker: stop_marker.to_string(),
            read_timeout: params.read_timeout,
            cumulative: String::new(),
            done: false,
        }
    }

    /// Next cumulative partial, `Ok(None)` once the sequence has ended.
    ///
    /// The chunk whose arrival makes the cumulative text contain the stop
    /// marker is never emitted: the sequence terminates and the value
    /// from before that chunk stands as the final output. A read timeout
    /// ends the session with the accumulated text retained in the error.
    pub async fn next_partial(&mut self) -> Result<Option<String>, SessionError> {
        if self.done {
            return Ok(None);
        }

        let received = tokio::time::timeout(self.read_timeout, self.worker.rx.recv()).await;
        match received {
            Err(_elapsed) => {
                self.done = true;
                self.worker.cancel.cancel();
                tracing::warn!(
                    partial_len = self.cumulative.len(),
                    "read timeout while waiting for next chunk"
                );
                Err(SessionError::ReadTimeout {
                    partial: self.cumulative.clone(),
                })
            }
            Ok(Some(chunk)) => {
                let mut candidate = self.cumulative.clone();
                candidate.push_str(&chunk);
                if candidate.contains(&self.stop_marker) {
                    // Break before yield: the caller only ever sees
                    // marker-free partial text.
                    self.done = true;
                    self.worker.cancel.cancel();
                    return Ok(None);
                }
                self.cumulative = candidate;
                Ok(Some(self.cumulative.clone()))
            }
            Ok(None) => {
                // Channel closed by the producer. Zero chunks is a valid
                // empty completion; an engine error surfaces here.
                self.done = true;
                self.collect_worker_result().await?;
                Ok(None)
            }
        }
    }

    /// Drain the remaining sequence, handing each emitted partial to
    /// `on_partial`, and return the final text.
    pub async fn drain(
        mut self,
        mut on_partial: impl FnMut(&str),
    ) -> Result<String, SessionError> {
        while let Some(partial) = self.next_partial().await? {
            on_partial(&partial);
        }
        Ok(self.cumulative)
    }

    /// Text assembled so far.
    pub fn partial_text(&self) -> &str {
        &self.cumulative
    }

    async fn collect_worker_result(&mut self) -> Result<(), SessionError> {
        let join = match self.worker.join.take() {
            Some(join) => join,
            None => return Ok(()),
        };
        match join.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Generation(e)),
            Err(join_err) => Err(SessionError::Generation(EngineError::new(format!(
                "generation worker panicked: {join_err}"
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::ScriptedEngine;
    use crate::engine::EngineHandle;
    use crate::prompt::STOP_MARKER;
    use crate::stop::EosStop;
    use std::time::Duration;

    fn assemble(engine: ScriptedEngine, params: GenerationParams) -> StreamAssembler {
        let handle = EngineHandle::new(Arc::new(engine));
        let stop = Arc::new(EosStop::new(u32::MAX));
        let worker = spawn_worker(handle, "prompt".to_string(), params.clone(), stop);
        StreamAssembler::new(worker, STOP_MARKER, &params)
    }

    fn fast_params() -> GenerationParams {
        GenerationParams {
            read_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_break_before_yield_on_marker() {
        let mut assembler = assemble(
            ScriptedEngine::new(&["Hello", " there", STOP_MARKER]),
            fast_params(),
        );

        let mut emitted = Vec::new();
        while let Some(partial) = assembler.next_partial().await.unwrap() {
            emitted.push(partial);
        }

        assert_eq!(emitted, vec!["Hello".to_string(), "Hello there".to_string()]);
        assert_eq!(assembler.partial_text(), "Hello there");
        assert!(!emitted.last().unwrap().contains(STOP_MARKER));
    }

    #[tokio::test]
    async fn test_marker_cancels_worker() {
        let engine = ScriptedEngine::new(&["Hi", STOP_MARKER, "never", "read"]);
        let handle = EngineHandle::new(Arc::new(engine));
        let params = fast_params();
        let worker = spawn_worker(
            handle,
            "prompt".to_string(),
            params.clone(),
            Arc::new(EosStop::new(u32::MAX)),
        );
        let cancel = worker.cancel_token();
        let mut assembler = StreamAssembler::new(worker, STOP_MARKER, &params);

        while assembler.next_partial().await.unwrap().is_some() {}
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_assembler_cancels_worker() {
        // An abandoned mid-stream session must still stop the engine.
        let engine =
            ScriptedEngine::new(&["a", "b", "c"]).with_delay_from(Duration::from_millis(20), 0);
        let handle = EngineHandle::new(Arc::new(engine));
        let params = fast_params();
        let worker = spawn_worker(
            handle,
            "prompt".to_string(),
            params.clone(),
            Arc::new(EosStop::new(u32::MAX)),
        );
        let cancel = worker.cancel_token();
        let mut assembler = StreamAssembler::new(worker, STOP_MARKER, &params);

        assert!(assembler.next_partial().await.unwrap().is_some());
        assert!(!cancel.is_cancelled());
        drop(assembler);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_channel_close_without_marker() {
        let final_text = assemble(ScriptedEngine::new(&["one", " two"]), fast_params())
            .drain(|_| {})
            .await
            .unwrap();
        assert_eq!(final_text, "one two");
    }

    #[tokio::test]
    async fn test_zero_chunks_is_empty_completion() {
        let final_text = assemble(ScriptedEngine::new(&[]), fast_params())
            .drain(|_| {})
            .await
            .unwrap();
        assert_eq!(final_text, "");
    }

    #[tokio::test]
    async fn test_read_timeout_retains_partial() {
        let params = GenerationParams {
            read_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        // First chunk arrives promptly, the second is delayed past the
        // read window; the accumulated text must survive in the error.
        let engine = ScriptedEngine::new(&["early", " late"])
            .with_delay_from(Duration::from_millis(500), 1);
        let mut assembler = assemble(engine, params);

        let err = loop {
            match assembler.next_partial().await {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected timeout, got completion"),
                Err(e) => break e,
            }
        };
        match err {
            SessionError::ReadTimeout { partial } => assert_eq!(partial, "early"),
            other => panic!("expected read timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_engine_error_surfaces_after_close() {
        let err = assemble(
            ScriptedEngine::new(&["partial"]).failing("backend exploded"),
            fast_params(),
        )
        .drain(|_| {})
        .await
        .unwrap_err();

        match err {
            SessionError::Generation(e) => assert!(e.to_string().contains("backend exploded")),
            other => panic!("expected generation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_production_order() {
        let chunks: Vec<String> = (0..10).map(|i| format!("[{i}]")).collect();
        let refs: Vec<&str> = chunks.iter().map(|s| s.as_str()).collect();
        let final_text = assemble(ScriptedEngine::new(&refs), fast_params())
            .drain(|_| {})
            .await
            .unwrap();
        assert_eq!(final_text, chunks.concat());
    }
}
