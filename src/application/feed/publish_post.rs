//! PublishPostHandler - entry point of the write path.
//!
//! Publishes `PostCreated` on the in-process bus and waits for the
//! subscribers. The fan-out subscriber only holds the caller for audience
//! resolution, so an unreachable audience is still reported to whoever
//! created the post while per-recipient publishing runs in the background.

use std::sync::Arc;

use tracing::warn;

use crate::domain::feed::PostCreatedEvent;
use crate::domain::foundation::{DomainError, ErrorCode, PostId, UserId};
use crate::ports::{DispatchReport, EventPublisher, HandlerResult};

#[derive(Debug, Clone)]
pub struct PublishPostCommand {
    pub author_id: UserId,
    pub post_id: PostId,
    pub text: String,
}

pub struct PublishPostHandler {
    publisher: Arc<dyn EventPublisher>,
}

impl PublishPostHandler {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// # Errors
    ///
    /// The first subscriber error, or `HandlerFailed` if a subscriber panicked.
    pub async fn handle(&self, cmd: PublishPostCommand) -> Result<DispatchReport, DomainError> {
        let event = PostCreatedEvent::new(cmd.post_id, cmd.author_id, cmd.text);
        let post_id = event.post_id.clone();
        let report = self.publisher.publish(event.into()).wait().await;

        for outcome in &report.outcomes {
            match &outcome.result {
                HandlerResult::Succeeded => {}
                HandlerResult::Failed(e) => {
                    warn!(post_id = %post_id, handler = outcome.handler, error = %e, "Post subscriber failed");
                    return Err(e.clone());
                }
                HandlerResult::Panicked(msg) => {
                    return Err(DomainError::new(
                        ErrorCode::HandlerFailed,
                        format!("{} panicked: {}", outcome.handler, msg),
                    ));
                }
            }
        }
        Ok(report)
    }
}
