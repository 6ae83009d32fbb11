//! In-memory repository doubles for store and facade tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use abode_core::{
    Conversation, ConversationFilters, ConversationId, ConversationRepository, ConversationStatus,
    DeliveryState, Message, MessageId, MessagePage, MessageType, NewConversation, NewMessage,
    RepositoryError, SearchFilters, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;
use parking_lot::Mutex;

mock! {
    pub Repository {}

    #[async_trait]
    impl ConversationRepository for Repository {
        async fn list_conversations(
            &self,
            filters: &ConversationFilters,
        ) -> abode_core::Result<Vec<Conversation>>;
        async fn list_messages(
            &self,
            conversation_id: &ConversationId,
            page: u32,
            limit: u32,
        ) -> abode_core::Result<MessagePage>;
        async fn create_message(&self, message: &NewMessage) -> abode_core::Result<Message>;
        async fn create_conversation(
            &self,
            conversation: &NewConversation,
        ) -> abode_core::Result<Conversation>;
        async fn mark_read(
            &self,
            conversation_id: &ConversationId,
            participant_id: &UserId,
        ) -> abode_core::Result<()>;
        async fn soft_delete_message(&self, message_id: &MessageId) -> abode_core::Result<()>;
        async fn set_conversation_status(
            &self,
            conversation_id: &ConversationId,
            status: ConversationStatus,
        ) -> abode_core::Result<()>;
        async fn search_messages(
            &self,
            conversation_id: &ConversationId,
            filters: &SearchFilters,
        ) -> abode_core::Result<Vec<Message>>;
    }
}

/// Fixed base time for fixtures.
pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(minute)
}

/// A confirmed text message.
pub fn message(id: &str, conversation: &str, sender: &str, minute: i64) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: ConversationId::from(conversation),
        sender_id: UserId::from(sender),
        content: format!("text of {id}"),
        message_type: MessageType::Text,
        attachments: Vec::new(),
        read_by: BTreeMap::from([(UserId::from(sender), at(minute))]),
        created_at: at(minute),
        is_deleted: false,
        correlation_id: None,
        delivery: DeliveryState::Confirmed,
    }
}

/// An active two-party conversation.
pub fn conversation(id: &str, participants: &[&str], minute: i64) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        participants: participants.iter().map(|p| UserId::from(*p)).collect(),
        property_id: None,
        last_message: None,
        unread_count: BTreeMap::new(),
        status: ConversationStatus::Active,
        created_at: at(minute),
        updated_at: at(minute),
    }
}

#[derive(Default)]
struct FakeData {
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    next_id: u64,
}

/// Behavioural fake with failure injection and call counters.
#[derive(Default)]
pub struct FakeRepository {
    data: Mutex<FakeData>,
    failures: Mutex<HashMap<&'static str, RepositoryError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    scripted_lists: Mutex<VecDeque<(Duration, Vec<Conversation>)>>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation; its thread's newest message becomes the preview.
    pub fn seed(&self, mut conversation: Conversation, thread: Vec<Message>) {
        let mut data = self.data.lock();
        let mut thread = thread;
        thread.sort_by(abode_core::order_cmp);
        conversation.last_message = thread.last().cloned();
        let _ = data.messages.insert(conversation.id.clone(), thread);
        data.conversations.push(conversation);
    }

    /// Make every call to `op` fail with `err` until cleared.
    pub fn fail(&self, op: &'static str, err: RepositoryError) {
        let _ = self.failures.lock().insert(op, err);
    }

    pub fn clear_failure(&self, op: &'static str) {
        let _ = self.failures.lock().remove(op);
    }

    /// Queue a canned `list_conversations` response delivered after `delay`.
    pub fn script_list(&self, delay: Duration, conversations: Vec<Conversation>) {
        self.scripted_lists.lock().push_back((delay, conversations));
    }

    /// Change a stored status without going through the trait.
    pub fn set_status(&self, id: &str, status: ConversationStatus) {
        let mut data = self.data.lock();
        if let Some(c) = data.conversations.iter_mut().find(|c| c.id.as_str() == id) {
            c.status = status;
        }
    }

    /// Overwrite a stored unread counter.
    pub fn set_unread(&self, id: &str, user: &str, count: u32) {
        let mut data = self.data.lock();
        if let Some(c) = data.conversations.iter_mut().find(|c| c.id.as_str() == id) {
            let _ = c.unread_count.insert(UserId::from(user), count);
        }
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn stored_conversation(&self, id: &str) -> Option<Conversation> {
        let data = self.data.lock();
        data.conversations.iter().find(|c| c.id.as_str() == id).cloned()
    }

    pub fn stored_thread(&self, id: &str) -> Vec<Message> {
        let data = self.data.lock();
        data.messages.get(&ConversationId::from(id)).cloned().unwrap_or_default()
    }

    fn enter(&self, op: &'static str) -> abode_core::Result<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        match self.failures.lock().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConversationRepository for FakeRepository {
    async fn list_conversations(
        &self,
        filters: &ConversationFilters,
    ) -> abode_core::Result<Vec<Conversation>> {
        self.enter("list_conversations")?;
        let scripted = self.scripted_lists.lock().pop_front();
        if let Some((delay, conversations)) = scripted {
            tokio::time::sleep(delay).await;
            return Ok(conversations);
        }
        let data = self.data.lock();
        let mut list: Vec<Conversation> = data
            .conversations
            .iter()
            .filter(|c| filters.property_id.as_ref().is_none_or(|p| c.property_id.as_ref() == Some(p)))
            .filter(|c| filters.participant_id.as_ref().is_none_or(|u| c.participants.contains(u)))
            .filter(|c| match filters.status {
                Some(status) => c.status == status,
                None => c.status != ConversationStatus::Archived,
            })
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(list)
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> abode_core::Result<MessagePage> {
        self.enter("list_messages")?;
        let data = self.data.lock();
        let thread = data
            .messages
            .get(conversation_id)
            .ok_or_else(|| RepositoryError::conversation_not_found(conversation_id.as_str()))?;
        let total = thread.len();
        let end = total.saturating_sub((page as usize - 1) * limit as usize);
        let start = end.saturating_sub(limit as usize);
        Ok(MessagePage {
            messages: thread[start..end].to_vec(),
            total: u32::try_from(total).unwrap(),
        })
    }

    async fn create_message(&self, new: &NewMessage) -> abode_core::Result<Message> {
        self.enter("create_message")?;
        let mut data = self.data.lock();
        data.next_id += 1;
        let stored = Message {
            id: MessageId::from(format!("srv-{}", data.next_id)),
            conversation_id: new.conversation_id.clone(),
            sender_id: new.sender_id.clone(),
            content: new.content.clone(),
            message_type: new.message_type,
            attachments: new.attachments.clone(),
            read_by: BTreeMap::from([(new.sender_id.clone(), new.created_at)]),
            created_at: new.created_at,
            is_deleted: false,
            correlation_id: new.correlation_id.clone(),
            delivery: DeliveryState::Confirmed,
        };
        let conversation = data
            .conversations
            .iter_mut()
            .find(|c| c.id == new.conversation_id)
            .ok_or_else(|| RepositoryError::conversation_not_found(new.conversation_id.as_str()))?;
        if conversation.status == ConversationStatus::Blocked {
            return Err(RepositoryError::Rejected("conversation is blocked".into()));
        }
        for p in &conversation.participants {
            if *p != new.sender_id {
                *conversation.unread_count.entry(p.clone()).or_insert(0) += 1;
            }
        }
        conversation.last_message = Some(stored.clone());
        conversation.updated_at = new.created_at;
        data.messages
            .entry(new.conversation_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn create_conversation(&self, new: &NewConversation) -> abode_core::Result<Conversation> {
        self.enter("create_conversation")?;
        let mut data = self.data.lock();
        data.next_id += 1;
        let id = ConversationId::from(format!("conv-{}", data.next_id));
        let first = Message {
            id: MessageId::from(format!("srv-{}", data.next_id)),
            conversation_id: id.clone(),
            sender_id: new.creator_id.clone(),
            content: new.initial_message.content.clone(),
            message_type: new.initial_message.message_type,
            attachments: new.initial_message.attachments.clone(),
            read_by: BTreeMap::from([(new.creator_id.clone(), new.created_at)]),
            created_at: new.created_at,
            is_deleted: false,
            correlation_id: None,
            delivery: DeliveryState::Confirmed,
        };
        let conversation = Conversation {
            id: id.clone(),
            participants: new.participant_ids.clone(),
            property_id: new.property_id.clone(),
            last_message: Some(first.clone()),
            unread_count: new
                .participant_ids
                .iter()
                .filter(|p| **p != new.creator_id)
                .map(|p| (p.clone(), 1))
                .collect(),
            status: ConversationStatus::Active,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        let _ = data.messages.insert(id, vec![first]);
        data.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        participant_id: &UserId,
    ) -> abode_core::Result<()> {
        self.enter("mark_read")?;
        let mut data = self.data.lock();
        let now = Utc::now();
        if let Some(thread) = data.messages.get_mut(conversation_id) {
            for m in thread {
                let _ = m.read_by.entry(participant_id.clone()).or_insert(now);
            }
        }
        let conversation = data
            .conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| RepositoryError::conversation_not_found(conversation_id.as_str()))?;
        let _ = conversation.unread_count.remove(participant_id);
        Ok(())
    }

    async fn soft_delete_message(&self, message_id: &MessageId) -> abode_core::Result<()> {
        self.enter("soft_delete_message")?;
        let mut data = self.data.lock();
        let message = data
            .messages
            .values_mut()
            .flatten()
            .find(|m| &m.id == message_id)
            .ok_or_else(|| RepositoryError::message_not_found(message_id.as_str()))?;
        message.is_deleted = true;
        Ok(())
    }

    async fn set_conversation_status(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> abode_core::Result<()> {
        self.enter("set_conversation_status")?;
        let mut data = self.data.lock();
        let conversation = data
            .conversations
            .iter_mut()
            .find(|c| &c.id == conversation_id)
            .ok_or_else(|| RepositoryError::conversation_not_found(conversation_id.as_str()))?;
        conversation.status = status;
        Ok(())
    }

    async fn search_messages(
        &self,
        conversation_id: &ConversationId,
        filters: &SearchFilters,
    ) -> abode_core::Result<Vec<Message>> {
        self.enter("search_messages")?;
        let data = self.data.lock();
        let query = filters.query.as_deref().unwrap_or_default().to_lowercase();
        Ok(data
            .messages
            .get(conversation_id)
            .map(|thread| {
                thread
                    .iter()
                    .filter(|m| !m.is_deleted && m.content.to_lowercase().contains(&query))
                    .filter(|m| {
                        filters.message_types.is_empty()
                            || filters.message_types.contains(&m.message_type)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
