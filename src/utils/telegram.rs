use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

// Telegram clears a chat action after roughly five seconds.
const ACTION_REFRESH_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps a chat action ("uploading photo...") visible while a design is
/// generated. The action stops when the indicator is stopped or dropped.
pub struct ChatActionIndicator {
    chat_id: ChatId,
    task: Option<JoinHandle<()>>,
}

impl ChatActionIndicator {
    pub fn stop(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(chat_id = self.chat_id.0, "Chat action indicator stopped");
        }
    }
}

impl Drop for ChatActionIndicator {
    fn drop(&mut self) {
        self.abort();
    }
}

pub fn start_chat_action_heartbeat(
    bot: Bot,
    chat_id: ChatId,
    action: ChatAction,
) -> ChatActionIndicator {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ACTION_REFRESH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = bot.send_chat_action(chat_id, action.clone()).await {
                warn!(chat_id = chat_id.0, "send_chat_action failed: {err}");
            }
        }
    });

    ChatActionIndicator {
        chat_id,
        task: Some(task),
    }
}
