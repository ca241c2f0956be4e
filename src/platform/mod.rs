use anyhow::Result;
use async_trait::async_trait;

use crate::domain::DuelAction;

#[cfg(test)]
pub mod testing;

/// Opaque handle to a platform message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef(pub i64);

/// Opaque handle to a platform channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRef(pub i64);

/// A button press delivered by the platform, already stripped down to what
/// the state machine needs.
#[derive(Debug, Clone, Copy)]
pub struct Interaction {
    pub actor_id: i64,
    pub channel: Option<ChannelRef>,
    pub message: Option<MessageRef>,
}

/// A message posted in a channel the bot watches. The adapter decides
/// whether an attachment counts as an image before events reach the core.
#[derive(Debug, Clone, Copy)]
pub struct MessageEvent {
    pub channel: ChannelRef,
    pub sender_id: i64,
    pub message: MessageRef,
    pub has_image_attachment: bool,
}

/// Minimum capability surface the duel lifecycle needs from the chat
/// platform. The real adapter (gateway connection, embed rendering,
/// permission overwrites) lives outside this crate; the lifecycle only
/// ever talks through this trait.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Direct message with optional interactive controls attached.
    async fn send_direct_message(
        &self,
        user_id: i64,
        text: &str,
        controls: &[DuelAction],
    ) -> Result<MessageRef>;

    /// Short-lived reply visible only to the actor.
    async fn send_ephemeral(&self, user_id: i64, text: &str) -> Result<()>;

    async fn send_channel_message(
        &self,
        channel: ChannelRef,
        text: &str,
        controls: &[DuelAction],
    ) -> Result<MessageRef>;

    async fn edit_message_text(
        &self,
        channel: ChannelRef,
        message: MessageRef,
        text: &str,
    ) -> Result<()>;

    /// Strip the interactive controls from a message, leaving its text.
    async fn clear_message_controls(
        &self,
        channel: Option<ChannelRef>,
        message: MessageRef,
    ) -> Result<()>;

    async fn delete_message(
        &self,
        channel: Option<ChannelRef>,
        message: MessageRef,
    ) -> Result<()>;

    /// Create the isolated duel channel, visible to the listed members and
    /// the moderators only.
    async fn create_duel_space(&self, name: &str, member_ids: &[i64]) -> Result<ChannelRef>;

    /// Freeze a duel channel while a dispute is under review.
    async fn lock_duel_space(&self, channel: ChannelRef) -> Result<()>;

    async fn delete_duel_space(&self, channel: ChannelRef) -> Result<()>;

    async fn display_name(&self, user_id: i64) -> String;

    /// Bots and other non-player accounts cannot be challenged.
    async fn is_service_account(&self, user_id: i64) -> Result<bool>;

    async fn is_moderator(&self, user_id: i64) -> Result<bool>;
}
