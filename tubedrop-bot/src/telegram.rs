use async_trait::async_trait;
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use tracing::warn;

use tubedrop::{Artifact, Delivery, Error, MediaKind, Outcome, Progress, Result};

/// Delivers one request's progress and artifact into a chat.
///
/// Progress edits a single status message in place so the chat does not fill
/// up with intermediate updates.
pub struct TelegramDelivery {
    bot: Bot,
    chat_id: ChatId,
    status: MessageId,
}

impl TelegramDelivery {
    /// Post the initial status message for a request.
    pub async fn begin(bot: Bot, chat_id: ChatId, stage: Progress) -> ResponseResult<Self> {
        let status = bot.send_message(chat_id, stage.message()).await?;
        Ok(Self {
            bot,
            chat_id,
            status: status.id,
        })
    }

    /// Replace the status message with the request's terminal message.
    pub async fn finish(&self, outcome: &Outcome) {
        let result = match outcome {
            Outcome::Completed { .. } => {
                if let Err(e) = self.bot.delete_message(self.chat_id, self.status).await {
                    warn!(chat = self.chat_id.0, error = %e, "failed to delete status message");
                }
                self.bot
                    .send_message(self.chat_id, outcome.message())
                    .await
                    .map(|_| ())
            }
            _ => self
                .bot
                .edit_message_text(self.chat_id, self.status, outcome.message())
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!(chat = self.chat_id.0, error = %e, "failed to report outcome");
        }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn progress(&self, stage: Progress) -> Result<()> {
        self.bot
            .edit_message_text(self.chat_id, self.status, stage.message())
            .await
            .map(|_| ())
            .map_err(|e| Error::Delivery(e.to_string()))
    }

    async fn deliver(&self, artifact: &Artifact) -> Result<()> {
        let file = InputFile::file(artifact.path.clone());
        let sent = match artifact.kind {
            MediaKind::Video => {
                self.bot
                    .send_video(self.chat_id, file)
                    .caption(artifact.caption())
                    .supports_streaming(true)
                    .await
            }
            MediaKind::Audio => {
                self.bot
                    .send_audio(self.chat_id, file)
                    .caption(artifact.caption())
                    .title(artifact.title.clone())
                    .await
            }
        };
        sent.map(|_| ()).map_err(|e| Error::Delivery(e.to_string()))
    }
}
