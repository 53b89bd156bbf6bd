//! Inbound message handling
//!
//! The group-chat flow: chat-room commands, mention/command triggers that
//! dispatch immediately, wake-word routing, and buffering of plain messages
//! until the debounce window closes. Private chats route and dispatch
//! directly without any chat-room state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use chatroom_core::{
    ChatMessage, ChatRoomManager, ChatTransport, Config, DifyClient, FlushPayload, ModelRouter,
    ModelSpec, RoomKey, SweepEvent, UserStatus, BotStore, Error as CoreError, RANKING_LIMIT,
    SWITCH_SUFFIX, UNKNOWN_USER,
};

use crate::error::Result;
use crate::messages::*;

/// Shared state for all message handlers
pub struct BotState {
    pub config: Config,
    pub manager: ChatRoomManager,
    pub router: ModelRouter,
    pub dify: DifyClient,
    pub transport: Arc<dyn ChatTransport>,
    pub store: Arc<dyn BotStore>,
}

/// Handle one inbound message
pub async fn handle_message(state: &Arc<BotState>, msg: &ChatMessage) -> Result<()> {
    if !state.config.enable {
        return Ok(());
    }

    notify_idle_users(state).await?;

    if msg.is_group {
        handle_group(state, msg).await
    } else {
        handle_private(state, msg).await
    }
}

/// Run the idle sweep and notify affected users
pub async fn notify_idle_users(state: &Arc<BotState>) -> Result<()> {
    if !state.config.chatroom_enable {
        return Ok(());
    }
    notify_sweep_events(state, state.manager.sweep()).await
}

/// Deliver the at-notifications for a batch of sweep events
async fn notify_sweep_events(
    state: &Arc<BotState>,
    events: Vec<(RoomKey, SweepEvent)>,
) -> Result<()> {
    for (key, event) in events {
        let text = match event {
            SweepEvent::Away => CHAT_AUTO_AWAY_MESSAGE,
            SweepEvent::Timeout => CHAT_TIMEOUT_MESSAGE,
        };
        send_at(state, &key, text).await?;
    }
    Ok(())
}

async fn handle_private(state: &Arc<BotState>, msg: &ChatMessage) -> Result<()> {
    let content = msg.content.trim();
    let query = strip_command_prefix(&state.config, content);
    if query.is_empty() {
        debug!("empty private query, ignoring");
        return Ok(());
    }

    let route = state.router.resolve(&query, &msg.sender_id);
    if route.is_switch {
        state
            .transport
            .send_text(&msg.from_id, &switch_confirmation(&route.model.name))
            .await?;
        return Ok(());
    }

    dispatch(state, msg, &route.model, &route.query, vec![]).await
}

async fn handle_group(state: &Arc<BotState>, msg: &ChatMessage) -> Result<()> {
    let content = msg.content.trim();
    let key = RoomKey::new(&msg.from_id, &msg.sender_id);

    if content == CMD_LEAVE {
        if state.manager.is_active(&key) {
            state.manager.leave(&key);
            send_at(state, &key, CHAT_LEAVE_MESSAGE).await?;
        }
        return Ok(());
    }

    if content.to_lowercase().ends_with(SWITCH_SUFFIX) {
        let route = state.router.resolve(content, &msg.sender_id);
        if route.is_switch {
            send_at(state, &key, &switch_confirmation(&route.model.name)).await?;
            return Ok(());
        }
    }

    // Wake words dispatch immediately, bypassing the buffer
    if let Some((model, query)) = state.router.wakeup_route(content) {
        if !query.is_empty() {
            dispatch(state, msg, &model, &query, vec![]).await?;
            return Ok(());
        }
    }

    let is_at = is_at_message(&state.config, content);
    let is_command = has_command_prefix(&state.config, content);

    if is_at || is_command {
        if !state.manager.is_active(&key) && state.config.chatroom_enable {
            state.manager.join(&key);
            send_at(state, &key, CHAT_JOIN_MESSAGE).await?;
        }
        let query = strip_mentions(&state.config, content);
        let query = strip_command_prefix(&state.config, &query);
        if query.is_empty() {
            send_at(state, &key, EMPTY_QUERY_MESSAGE).await?;
            return Ok(());
        }
        let route = state.router.resolve(&query, &msg.sender_id);
        if route.is_switch {
            send_at(state, &key, &switch_confirmation(&route.model.name)).await?;
            return Ok(());
        }
        return dispatch(state, msg, &route.model, &route.query, vec![]).await;
    }

    if !state.config.chatroom_enable {
        return Ok(());
    }

    match content {
        CMD_ROOM_STATUS => {
            let report = state.manager.format_room_status(&key.group_id);
            return send_at(state, &key, &report).await;
        }
        CMD_AWAY => {
            state.manager.set_status(&key, UserStatus::Away);
            return send_at(state, &key, CHAT_AWAY_MESSAGE).await;
        }
        CMD_BACK => {
            state.manager.set_status(&key, UserStatus::Active);
            return send_at(state, &key, CHAT_BACK_MESSAGE).await;
        }
        CMD_MY_STATS => {
            let nickname = nickname_or_placeholder(state, &key.user_id).await;
            let report = state.manager.format_user_stats(&key, &nickname);
            return send_at(state, &key, &report).await;
        }
        CMD_RANKING => {
            let report = state
                .manager
                .format_room_ranking(&key.group_id, state.transport.as_ref(), RANKING_LIMIT)
                .await;
            return send_at(state, &key, &report).await;
        }
        _ => {}
    }

    state.manager.touch(&key);
    if state.manager.status(&key) == UserStatus::Away {
        state.manager.set_status(&key, UserStatus::Active);
        send_at(state, &key, CHAT_BACK_MESSAGE).await?;
    }

    if !content.is_empty() {
        state.manager.record_chars(&key, content.chars().count() as u64);
        state.manager.buffer_message(&key, content, vec![]);
    }
    Ok(())
}

/// Consume flush payloads from the debounce engine, routing and dispatching
/// the coalesced text.
pub async fn run_flush_loop(state: Arc<BotState>, mut flush_rx: mpsc::UnboundedReceiver<FlushPayload>) {
    while let Some(payload) = flush_rx.recv().await {
        if payload.text.trim().is_empty() {
            continue;
        }
        debug!(
            group = %payload.key.group_id,
            user = %payload.key.user_id,
            "processing flushed buffer"
        );

        let route = state.router.resolve(&payload.text, &payload.key.user_id);
        let msg = ChatMessage::group_text(
            payload.key.group_id.clone(),
            payload.key.user_id.clone(),
            payload.text.clone(),
        );
        let result = if route.is_switch {
            send_at(&state, &payload.key, &switch_confirmation(&route.model.name)).await
        } else {
            dispatch(&state, &msg, &route.model, &route.query, payload.files).await
        };
        if let Err(e) = result {
            error!("failed to process flushed buffer: {}", e);
            let _ = send_at(&state, &payload.key, PROCESS_FAILED_MESSAGE).await;
        }
    }
}

/// Send the query to the backend and deliver the answer. Retries once after
/// clearing a stale conversation id.
async fn dispatch(
    state: &Arc<BotState>,
    msg: &ChatMessage,
    model: &Arc<ModelSpec>,
    query: &str,
    files: Vec<String>,
) -> Result<()> {
    if query.is_empty() {
        return Ok(());
    }
    if model.api_key.is_empty() {
        warn!(model = %model.name, "model has no API key configured");
        return reply(state, msg, NO_API_KEY_MESSAGE).await;
    }

    let Some(deduct) = check_points(state, msg, model).await? else {
        return Ok(());
    };

    let nickname = nickname_or_placeholder(state, &msg.sender_id).await;
    let mut inputs = HashMap::new();
    inputs.insert("user_wxid".to_string(), msg.sender_id.clone());
    inputs.insert("user_username".to_string(), nickname);

    let files: Vec<chatroom_core::FileRef> =
        files.into_iter().map(chatroom_core::FileRef::image).collect();
    let thread_id = state.store.thread_id(&msg.from_id).await?;

    let mut result = state
        .dify
        .chat_messages(model, query, &thread_id, &msg.from_id, inputs.clone(), files.clone())
        .await;
    if matches!(result, Err(CoreError::ConversationNotFound)) {
        info!("stale conversation id, retrying with a fresh one");
        state.store.save_thread_id(&msg.from_id, "").await?;
        result = state
            .dify
            .chat_messages(model, query, "", &msg.from_id, inputs, files)
            .await;
    }

    let answer = match result {
        Ok(answer) => answer,
        Err(e) => {
            error!(model = %model.name, "Dify call failed: {}", e);
            return reply(state, msg, DIFY_ERROR_MESSAGE).await;
        }
    };

    if !answer.conversation_id.is_empty() && answer.conversation_id != thread_id {
        state
            .store
            .save_thread_id(&msg.from_id, &answer.conversation_id)
            .await?;
    }
    if deduct > 0 {
        state.store.add_points(&msg.sender_id, -deduct).await?;
    }

    if answer.answer.is_empty() {
        warn!(model = %model.name, "backend returned an empty answer");
        return Ok(());
    }
    reply(state, msg, &answer.answer).await
}

/// Point gate: `Some(amount)` allows the request and names the amount to
/// deduct afterwards; `None` denies it (the notice is already sent).
async fn check_points(
    state: &Arc<BotState>,
    msg: &ChatMessage,
    model: &ModelSpec,
) -> Result<Option<i64>> {
    if model.price <= 0 {
        return Ok(Some(0));
    }
    if state.config.admin_ignore && state.config.is_admin(&msg.sender_id) {
        return Ok(Some(0));
    }
    if state.config.whitelist_ignore && state.store.in_whitelist(&msg.sender_id).await? {
        return Ok(Some(0));
    }
    if state.store.points(&msg.sender_id).await? >= model.price {
        return Ok(Some(model.price));
    }
    reply(state, msg, &insufficient_points(model.price)).await?;
    Ok(None)
}

async fn reply(state: &Arc<BotState>, msg: &ChatMessage, text: &str) -> Result<()> {
    if msg.is_group {
        let key = RoomKey::new(&msg.from_id, &msg.sender_id);
        send_at(state, &key, text).await
    } else {
        state.transport.send_text(&msg.from_id, text).await?;
        Ok(())
    }
}

async fn send_at(state: &Arc<BotState>, key: &RoomKey, text: &str) -> Result<()> {
    state
        .transport
        .send_at(
            &key.group_id,
            &format!("\n{}", text),
            std::slice::from_ref(&key.user_id),
        )
        .await?;
    Ok(())
}

async fn nickname_or_placeholder(state: &Arc<BotState>, user_id: &str) -> String {
    match state.transport.get_nickname(user_id).await {
        Ok(Some(name)) if !name.is_empty() => name,
        _ => UNKNOWN_USER.to_string(),
    }
}

fn is_at_message(config: &Config, content: &str) -> bool {
    config
        .robot_names
        .iter()
        .any(|name| content.contains(&format!("@{}", name)))
}

fn has_command_prefix(config: &Config, content: &str) -> bool {
    let command = content.split_whitespace().next().unwrap_or("");
    config.commands.iter().any(|c| c == command)
}

fn strip_mentions(config: &Config, content: &str) -> String {
    let mut query = content.to_string();
    for name in &config.robot_names {
        query = query.replace(&format!("@{}", name), "");
    }
    query.trim().to_string()
}

fn strip_command_prefix(config: &Config, content: &str) -> String {
    let command = content.split_whitespace().next().unwrap_or("");
    if config.commands.iter().any(|c| c == command) {
        content[command.len()..].trim().to_string()
    } else {
        content.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport double that records every outbound message
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_text(&self, target_id: &str, text: &str) -> chatroom_core::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((target_id.to_string(), text.to_string()));
            Ok(())
        }
        async fn send_at(
            &self,
            target_id: &str,
            text: &str,
            _mentioned: &[String],
        ) -> chatroom_core::Result<()> {
            self.send_text(target_id, text).await
        }
        async fn get_nickname(&self, _user_id: &str) -> chatroom_core::Result<Option<String>> {
            Ok(Some("测试用户".to_string()))
        }
    }

    /// In-memory store double
    struct TestStore {
        points: Mutex<HashMap<String, i64>>,
        threads: Mutex<HashMap<String, String>>,
    }

    impl TestStore {
        fn with_points(user: &str, points: i64) -> Self {
            let mut map = HashMap::new();
            map.insert(user.to_string(), points);
            Self {
                points: Mutex::new(map),
                threads: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl BotStore for TestStore {
        async fn points(&self, user_id: &str) -> chatroom_core::Result<i64> {
            Ok(*self.points.lock().unwrap().get(user_id).unwrap_or(&0))
        }
        async fn add_points(&self, user_id: &str, delta: i64) -> chatroom_core::Result<()> {
            *self
                .points
                .lock()
                .unwrap()
                .entry(user_id.to_string())
                .or_insert(0) += delta;
            Ok(())
        }
        async fn in_whitelist(&self, _user_id: &str) -> chatroom_core::Result<bool> {
            Ok(false)
        }
        async fn thread_id(&self, chat_id: &str) -> chatroom_core::Result<String> {
            Ok(self
                .threads
                .lock()
                .unwrap()
                .get(chat_id)
                .cloned()
                .unwrap_or_default())
        }
        async fn save_thread_id(&self, chat_id: &str, thread_id: &str) -> chatroom_core::Result<()> {
            self.threads
                .lock()
                .unwrap()
                .insert(chat_id.to_string(), thread_id.to_string());
            Ok(())
        }
    }

    fn test_config(price: i64) -> Config {
        Config::from_str(&format!(
            r#"
            default-model = "chat"
            robot-names = ["小助手"]

            [[model]]
            name = "chat"
            api-key = "test-key"
            base-url = "https://dify.invalid/v1"
            price = {}
            "#,
            price
        ))
        .unwrap()
    }

    fn make_state(
        config: Config,
        store: TestStore,
    ) -> (Arc<BotState>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let (manager, _flush_rx) = ChatRoomManager::new();
        let router = ModelRouter::new(&config);
        let state = Arc::new(BotState {
            config,
            manager,
            router,
            dify: DifyClient::new(None).unwrap(),
            transport: transport.clone(),
            store: Arc::new(store),
        });
        (state, transport)
    }

    fn group_msg(content: &str) -> ChatMessage {
        ChatMessage::group_text("group-1", "u1", content)
    }

    #[tokio::test]
    async fn test_mention_joins_chat_room() {
        let (state, transport) =
            make_state(test_config(10), TestStore::with_points("u1", 0));

        // the point gate denies before any network call happens
        handle_message(&state, &group_msg("@小助手 你好")).await.unwrap();

        let key = RoomKey::new("group-1", "u1");
        assert_eq!(state.manager.status(&key), UserStatus::Active);
        let sent = transport.sent();
        assert!(sent[0].1.contains("欢迎来到聊天室"));
        assert!(sent[1].1.contains("积分不够"));
    }

    #[tokio::test]
    async fn test_leave_command_removes_session() {
        let (state, transport) =
            make_state(test_config(10), TestStore::with_points("u1", 0));
        let key = RoomKey::new("group-1", "u1");
        state.manager.join(&key);

        handle_message(&state, &group_msg(CMD_LEAVE)).await.unwrap();

        assert_eq!(state.manager.status(&key), UserStatus::Inactive);
        assert!(transport.sent()[0].1.contains("已退出聊天室"));

        // leaving again is silent: no session, no notice
        handle_message(&state, &group_msg(CMD_LEAVE)).await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_away_user_comes_back_on_plain_message() {
        let (state, transport) =
            make_state(test_config(0), TestStore::with_points("u1", 0));
        let key = RoomKey::new("group-1", "u1");
        state.manager.join(&key);

        handle_message(&state, &group_msg(CMD_AWAY)).await.unwrap();
        assert_eq!(state.manager.status(&key), UserStatus::Away);

        handle_message(&state, &group_msg("我回来继续聊")).await.unwrap();
        assert_eq!(state.manager.status(&key), UserStatus::Active);
        assert!(transport.sent().last().unwrap().1.contains("欢迎回来"));
    }

    #[tokio::test]
    async fn test_plain_message_is_buffered_not_dispatched() {
        let (state, transport) =
            make_state(test_config(0), TestStore::with_points("u1", 0));
        let key = RoomKey::new("group-1", "u1");
        state.manager.join(&key);

        handle_message(&state, &group_msg("随便说点什么")).await.unwrap();

        // nothing went out; the text waits in the buffer
        assert!(transport.sent().is_empty());
        let (text, _files) = state.manager.drain_buffer(&key);
        assert_eq!(text, "随便说点什么");
        assert_eq!(state.manager.stats(&key).total_chars, 6);
    }

    #[tokio::test]
    async fn test_room_status_command() {
        let (state, transport) =
            make_state(test_config(0), TestStore::with_points("u1", 0));
        state.manager.join(&RoomKey::new("group-1", "u1"));

        handle_message(&state, &group_msg(CMD_ROOM_STATUS)).await.unwrap();
        assert!(transport.sent()[0].1.contains("聊天室状态"));
    }

    #[tokio::test]
    async fn test_my_stats_command_uses_nickname() {
        let (state, transport) =
            make_state(test_config(0), TestStore::with_points("u1", 0));
        state.manager.join(&RoomKey::new("group-1", "u1"));

        handle_message(&state, &group_msg(CMD_MY_STATS)).await.unwrap();
        assert!(transport.sent()[0].1.contains("测试用户 的聊天室数据"));
    }

    #[tokio::test]
    async fn test_switch_command_confirms_without_dispatch() {
        let config = Config::from_str(
            r#"
            default-model = "chat"

            [[model]]
            name = "draw"
            api-key = "k"
            base-url = "https://dify.invalid/v1"
            trigger-words = ["画画"]
            price = 0

            [[model]]
            name = "chat"
            api-key = "k"
            base-url = "https://dify.invalid/v1"
            price = 0
            "#,
        )
        .unwrap();
        let (state, transport) = make_state(config, TestStore::with_points("u1", 0));

        handle_message(&state, &group_msg("画画切换")).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("已切换到DRAW模型"));
    }

    #[tokio::test]
    async fn test_private_switch_command_confirms_to_peer() {
        let config = Config::from_str(
            r#"
            default-model = "chat"

            [[model]]
            name = "draw"
            api-key = "k"
            base-url = "https://dify.invalid/v1"
            trigger-words = ["画画"]
            price = 0

            [[model]]
            name = "chat"
            api-key = "k"
            base-url = "https://dify.invalid/v1"
            price = 0
            "#,
        )
        .unwrap();
        let (state, transport) = make_state(config, TestStore::with_points("u1", 0));

        let msg = ChatMessage::private_text("u1", "画画切换");
        handle_message(&state, &msg).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        // private replies go to the peer, not a group
        assert_eq!(sent[0].0, "u1");
        assert!(sent[0].1.contains("已切换到DRAW模型"));
    }

    #[tokio::test]
    async fn test_idle_sweep_notifies_away_then_timeout() {
        use chatroom_core::{AWAY_TIMEOUT, CHAT_TIMEOUT};
        use std::time::{Duration, Instant};

        let (state, transport) =
            make_state(test_config(0), TestStore::with_points("u1", 0));
        let key = RoomKey::new("group-1", "u1");
        state.manager.join(&key);

        let events = state
            .manager
            .sweep_at(Instant::now() + AWAY_TIMEOUT + Duration::from_secs(1));
        notify_sweep_events(&state, events).await.unwrap();
        assert_eq!(state.manager.status(&key), UserStatus::Away);
        assert!(transport.sent()[0].1.contains("已被自动设置为离开状态"));

        let events = state
            .manager
            .sweep_at(Instant::now() + CHAT_TIMEOUT + Duration::from_secs(1));
        notify_sweep_events(&state, events).await.unwrap();
        assert_eq!(state.manager.status(&key), UserStatus::Inactive);
        assert!(transport.sent()[1].1.contains("已被移出聊天室"));
    }

    #[tokio::test]
    async fn test_missing_api_key_notice() {
        let config = Config::from_str(
            r#"
            default-model = "chat"
            robot-names = ["小助手"]

            [[model]]
            name = "chat"
            api-key = ""
            base-url = "https://dify.invalid/v1"
            price = 0
            "#,
        )
        .unwrap();
        let (state, transport) = make_state(config, TestStore::with_points("u1", 0));

        handle_message(&state, &group_msg("@小助手 你好")).await.unwrap();
        assert!(transport
            .sent()
            .iter()
            .any(|(_, text)| text.contains(NO_API_KEY_MESSAGE)));
    }

    #[test]
    fn test_command_prefix_stripping() {
        let mut config = test_config(0);
        config.commands = vec!["ai".to_string()];
        assert!(has_command_prefix(&config, "ai 讲个笑话"));
        assert!(!has_command_prefix(&config, "aid 讲个笑话"));
        assert_eq!(strip_command_prefix(&config, "ai 讲个笑话"), "讲个笑话");
        assert_eq!(strip_command_prefix(&config, "讲个笑话"), "讲个笑话");
    }
}
