use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "designer.timing";

/// Wall-clock record of one user request, written to the timing logs.
///
/// A timer dropped without `finish` is logged with status `aborted`, which
/// covers handlers that bail out early through `?`.
#[derive(Debug)]
pub struct CommandTimer {
    command: &'static str,
    chat_id: i64,
    user_id: Option<i64>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    completed: bool,
}

impl CommandTimer {
    pub fn start(command: &'static str, chat_id: i64, user_id: Option<i64>) -> Self {
        let timer = CommandTimer {
            command,
            chat_id,
            user_id,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            completed: false,
        };
        info!(
            target: TIMING_TARGET,
            event = "command_received",
            command = timer.command,
            chat_id = timer.chat_id,
            user_id = ?timer.user_id,
            received_at = %timer.started_at.to_rfc3339(),
        );
        timer
    }

    pub fn finish(&mut self, status: &str, detail: Option<&str>) {
        if self.completed {
            return;
        }
        self.completed = true;
        info!(
            target: TIMING_TARGET,
            event = "command_completed",
            command = self.command,
            chat_id = self.chat_id,
            user_id = ?self.user_id,
            started_at = %self.started_at.to_rfc3339(),
            completed_at = %Utc::now().to_rfc3339(),
            duration_s = self.started_perf.elapsed().as_secs_f64(),
            status,
            detail = detail.unwrap_or_default(),
        );
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        self.finish("aborted", None);
    }
}

/// Wraps one model call with request/response timing events.
pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let metadata = metadata.unwrap_or_else(|| JsonValue::Object(Default::default()));
    let started_perf = Instant::now();
    info!(
        target: TIMING_TARGET,
        event = "llm_request",
        provider,
        model,
        operation,
        started_at = %Utc::now().to_rfc3339(),
        metadata = %metadata,
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    info!(
        target: TIMING_TARGET,
        event = "llm_response",
        provider,
        model,
        operation,
        completed_at = %Utc::now().to_rfc3339(),
        duration_s = started_perf.elapsed().as_secs_f64(),
        status,
        metadata = %metadata,
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_the_call_result_through() {
        let ok: Result<u8, String> =
            log_llm_timing("fake", "model", "op", None, || async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));

        let err: Result<u8, String> = log_llm_timing("fake", "model", "op", None, || async {
            Err("boom".to_string())
        })
        .await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn finish_is_recorded_once() {
        let mut timer = CommandTimer::start("generate", 1, Some(2));
        timer.finish("rejected", Some("busy"));
        assert!(timer.completed);
        timer.finish("success", None);
        assert!(timer.completed);
    }
}
