//! Fixed user-visible message templates and chat commands

/// Chat commands matched against the full message content
pub const CMD_LEAVE: &str = "退出聊天";
pub const CMD_ROOM_STATUS: &str = "查看状态";
pub const CMD_AWAY: &str = "暂时离开";
pub const CMD_BACK: &str = "回来了";
pub const CMD_MY_STATS: &str = "我的统计";
pub const CMD_RANKING: &str = "聊天室排行";

pub const CHAT_JOIN_MESSAGE: &str = "✨ 欢迎来到聊天室！让我们开始愉快的对话吧~

💡 基础指引：
   📝 直接发消息与我对话
   🚪 发送\"退出聊天\"离开
   ⏰ 30分钟不说话自动暂离
   🔄 1小时无互动将退出

🎮 聊天指令：
   📊 发送\"查看状态\"
   📈 发送\"聊天室排行\"
   👤 发送\"我的统计\"
   💤 发送\"暂时离开\"

开始聊天吧！期待与你的精彩对话~ 🌟";

pub const CHAT_LEAVE_MESSAGE: &str = "👋 已退出聊天室，需要再次@我才能继续对话";
pub const CHAT_TIMEOUT_MESSAGE: &str =
    "由于您已经1小时没有活动，已被移出聊天室。如需继续对话，请重新发送消息。";
pub const CHAT_AWAY_MESSAGE: &str = "💤 已设置为离开状态，其他人将看到你正在休息";
pub const CHAT_BACK_MESSAGE: &str = "🌟 欢迎回来！已恢复活跃状态";
pub const CHAT_AUTO_AWAY_MESSAGE: &str = "由于您已经30分钟没有活动，已被自动设置为离开状态。";

pub const DIFY_ERROR_MESSAGE: &str = "🙅对不起，Dify出现错误！";
pub const PROCESS_FAILED_MESSAGE: &str = "消息处理失败，请稍后重试。";
pub const EMPTY_QUERY_MESSAGE: &str = "请输入你的问题或指令。";
pub const NO_API_KEY_MESSAGE: &str = "此模型API密钥未配置，请联系管理员";

pub fn insufficient_points(price: i64) -> String {
    format!("😭你的积分不够啦！需要 {} 积分", price)
}

pub fn switch_confirmation(model_name: &str) -> String {
    format!(
        "已切换到{}模型，将一直使用该模型直到下次切换。",
        model_name.to_uppercase()
    )
}
