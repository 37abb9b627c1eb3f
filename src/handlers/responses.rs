use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto, MessageId};
use teloxide::RequestError;
use tracing::warn;

use crate::designer::render::{ResultsView, View};
use crate::llm::media::{decode_data_uri, extension_for_mime};

const TELEGRAM_RETRY_ATTEMPTS: usize = 3;

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

pub async fn send_message_with_retry(bot: &Bot, chat_id: ChatId, text: &str) -> Result<Message> {
    let mut delay = Duration::from_secs_f32(1.5);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match bot.send_message(chat_id, text.to_string()).await {
            Ok(message) => return Ok(message),
            Err(err) => {
                if !telegram_retryable_error(&err) || attempt == TELEGRAM_RETRY_ATTEMPTS {
                    return Err(err.into());
                }
                warn!("send_message attempt {} failed: {err}", attempt);
                if let RequestError::RetryAfter(wait) = err {
                    tokio::time::sleep(wait.duration()).await;
                } else {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

/// Splits text into chunks of at most `max_chars`, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            for ch in line.chars() {
                if current_len == max_chars {
                    chunks.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                current.push(ch);
                current_len += 1;
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
        .into_iter()
        .map(|chunk| chunk.trim_end().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

fn photo_from_data_uri(uri: &str, stem: &str) -> Option<InputFile> {
    let (mime_type, bytes) = decode_data_uri(uri)?;
    Some(InputFile::memory(bytes).file_name(format!("{stem}.{}", extension_for_mime(&mime_type))))
}

async fn send_images(bot: &Bot, chat_id: ChatId, results: &ResultsView) -> Result<()> {
    let Some(after) = photo_from_data_uri(&results.after_data_uri, "after") else {
        warn!("Generated image could not be decoded from its data URI");
        send_message_with_retry(bot, chat_id, "The generated image could not be displayed.")
            .await?;
        return Ok(());
    };

    let before = results
        .before_data_uri
        .as_deref()
        .and_then(|uri| photo_from_data_uri(uri, "before"));

    match before {
        Some(before) => {
            let media = vec![
                InputMedia::Photo(InputMediaPhoto::new(before).caption("Before")),
                InputMedia::Photo(InputMediaPhoto::new(after).caption(results.after_label)),
            ];
            bot.send_media_group(chat_id, media).await?;
        }
        None => {
            bot.send_photo(chat_id, after)
                .caption(results.after_label)
                .await?;
        }
    }
    Ok(())
}

/// Sends everything a finished view shows: alert, images and advice panels.
pub async fn deliver_view(bot: &Bot, chat_id: ChatId, view: &View, max_length: usize) -> Result<()> {
    if let Some(alert) = &view.alert {
        send_message_with_retry(bot, chat_id, &format!("⚠️ {alert}")).await?;
    }

    let Some(results) = &view.results else {
        return Ok(());
    };

    send_images(bot, chat_id, results).await?;

    for panel in &results.panels {
        let text = format!("{}\n\n{}", panel.kind.title(), panel.body);
        for chunk in split_message(&text, max_length) {
            send_message_with_retry(bot, chat_id, &chunk).await?;
        }
    }
    Ok(())
}

pub async fn delete_quietly(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(err) = bot.delete_message(chat_id, message_id).await {
        warn!("Failed to delete message {}: {err}", message_id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(split_message("hello\nworld", 100), vec!["hello\nworld"]);
    }

    #[test]
    fn splits_on_line_boundaries() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn hard_splits_overlong_lines() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = split_message("ééééé", 5);
        assert_eq!(chunks, vec!["ééééé"]);
    }

    #[test]
    fn decodes_photo_payloads() {
        assert!(photo_from_data_uri("data:image/png;base64,AAEC", "after").is_some());
        assert!(photo_from_data_uri("not a uri", "after").is_none());
    }
}
