//! Interactive console front-end
//!
//! Stands in for the real messaging transport during local runs: stdin
//! lines become group messages in a simulated chat room, and outbound
//! messages are printed. Points and conversation ids live in memory.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use async_trait::async_trait;
use chatroom_core::{ChatMessage, ChatTransport, Result as CoreResult};

use crate::error::Result;
use crate::handler::{self, BotState};

const CONSOLE_ROOM: &str = "console-room";
const CONSOLE_USER: &str = "console-user";
const CONSOLE_NICKNAME: &str = "控制台用户";

/// Transport that prints outbound messages to stdout
pub struct ConsoleTransport;

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send_text(&self, target_id: &str, text: &str) -> CoreResult<()> {
        println!("[{}] {}", target_id, text.trim_start_matches('\n'));
        Ok(())
    }

    async fn send_at(&self, target_id: &str, text: &str, mentioned: &[String]) -> CoreResult<()> {
        println!(
            "[{}] @{} {}",
            target_id,
            mentioned.join(",@"),
            text.trim_start_matches('\n')
        );
        Ok(())
    }

    async fn get_nickname(&self, user_id: &str) -> CoreResult<Option<String>> {
        if user_id == CONSOLE_USER {
            Ok(Some(CONSOLE_NICKNAME.to_string()))
        } else {
            Ok(None)
        }
    }
}

/// In-memory bot store for console runs
pub struct MemoryStore {
    points: Mutex<HashMap<String, i64>>,
    threads: Mutex<HashMap<String, String>>,
    starting_points: i64,
}

impl MemoryStore {
    pub fn new(starting_points: i64) -> Self {
        Self {
            points: Mutex::new(HashMap::new()),
            threads: Mutex::new(HashMap::new()),
            starting_points,
        }
    }
}

#[async_trait]
impl chatroom_core::BotStore for MemoryStore {
    async fn points(&self, user_id: &str) -> CoreResult<i64> {
        Ok(*self
            .points
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_insert(self.starting_points))
    }

    async fn add_points(&self, user_id: &str, delta: i64) -> CoreResult<()> {
        *self
            .points
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_insert(self.starting_points) += delta;
        Ok(())
    }

    async fn in_whitelist(&self, _user_id: &str) -> CoreResult<bool> {
        Ok(false)
    }

    async fn thread_id(&self, chat_id: &str) -> CoreResult<String> {
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_thread_id(&self, chat_id: &str, thread_id: &str) -> CoreResult<()> {
        self.threads
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), thread_id.to_string());
        Ok(())
    }
}

/// Read stdin lines as group messages in a simulated chat room
pub async fn run_console(state: Arc<BotState>) -> Result<()> {
    info!("console mode: lines are group messages in '{}'", CONSOLE_ROOM);
    println!("chatroom-gateway console. @机器人名 或指令触发对话，Ctrl-D 退出。");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let msg = ChatMessage::group_text(CONSOLE_ROOM, CONSOLE_USER, line);
        if let Err(e) = handler::handle_message(&state, &msg).await {
            eprintln!("error: {}", e);
        }
    }

    println!();
    info!("console session ended");
    Ok(())
}
