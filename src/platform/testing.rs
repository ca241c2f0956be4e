use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{ChannelRef, Gateway, MessageRef};
use crate::domain::DuelAction;

/// Everything the lifecycle asked the platform to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    DirectMessage {
        user_id: i64,
        text: String,
        controls: Vec<DuelAction>,
    },
    Ephemeral {
        user_id: i64,
        text: String,
    },
    ChannelMessage {
        channel: ChannelRef,
        text: String,
        controls: Vec<DuelAction>,
    },
    EditMessage {
        channel: ChannelRef,
        message: MessageRef,
    },
    ClearControls {
        message: MessageRef,
    },
    DeleteMessage {
        message: MessageRef,
    },
    CreateSpace {
        name: String,
        member_ids: Vec<i64>,
    },
    LockSpace {
        channel: ChannelRef,
    },
    DeleteSpace {
        channel: ChannelRef,
    },
}

/// Scripted in-memory gateway for lifecycle tests.
#[derive(Default)]
pub struct MockGateway {
    pub calls: Mutex<Vec<GatewayCall>>,
    pub moderators: HashSet<i64>,
    pub service_accounts: HashSet<i64>,
    pub fail_direct_messages: bool,
    pub fail_space_creation: bool,
    next_id: AtomicI64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts of every ephemeral reply sent to `user_id`.
    pub fn ephemerals_for(&self, user_id: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Ephemeral { user_id: u, text } if u == user_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_spaces(&self) -> Vec<ChannelRef> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::DeleteSpace { channel } => Some(channel),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn send_direct_message(
        &self,
        user_id: i64,
        text: &str,
        controls: &[DuelAction],
    ) -> Result<MessageRef> {
        if self.fail_direct_messages {
            bail!("direct messages disabled for user {user_id}");
        }
        self.record(GatewayCall::DirectMessage {
            user_id,
            text: text.to_string(),
            controls: controls.to_vec(),
        });
        Ok(MessageRef(self.next_id()))
    }

    async fn send_ephemeral(&self, user_id: i64, text: &str) -> Result<()> {
        self.record(GatewayCall::Ephemeral {
            user_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_channel_message(
        &self,
        channel: ChannelRef,
        text: &str,
        controls: &[DuelAction],
    ) -> Result<MessageRef> {
        self.record(GatewayCall::ChannelMessage {
            channel,
            text: text.to_string(),
            controls: controls.to_vec(),
        });
        Ok(MessageRef(self.next_id()))
    }

    async fn edit_message_text(
        &self,
        channel: ChannelRef,
        message: MessageRef,
        _text: &str,
    ) -> Result<()> {
        self.record(GatewayCall::EditMessage { channel, message });
        Ok(())
    }

    async fn clear_message_controls(
        &self,
        _channel: Option<ChannelRef>,
        message: MessageRef,
    ) -> Result<()> {
        self.record(GatewayCall::ClearControls { message });
        Ok(())
    }

    async fn delete_message(
        &self,
        _channel: Option<ChannelRef>,
        message: MessageRef,
    ) -> Result<()> {
        self.record(GatewayCall::DeleteMessage { message });
        Ok(())
    }

    async fn create_duel_space(&self, name: &str, member_ids: &[i64]) -> Result<ChannelRef> {
        if self.fail_space_creation {
            bail!("missing manage-channels permission");
        }
        self.record(GatewayCall::CreateSpace {
            name: name.to_string(),
            member_ids: member_ids.to_vec(),
        });
        Ok(ChannelRef(self.next_id()))
    }

    async fn lock_duel_space(&self, channel: ChannelRef) -> Result<()> {
        self.record(GatewayCall::LockSpace { channel });
        Ok(())
    }

    async fn delete_duel_space(&self, channel: ChannelRef) -> Result<()> {
        self.record(GatewayCall::DeleteSpace { channel });
        Ok(())
    }

    async fn display_name(&self, user_id: i64) -> String {
        format!("player-{user_id}")
    }

    async fn is_service_account(&self, user_id: i64) -> Result<bool> {
        Ok(self.service_accounts.contains(&user_id))
    }

    async fn is_moderator(&self, user_id: i64) -> Result<bool> {
        Ok(self.moderators.contains(&user_id))
    }
}
