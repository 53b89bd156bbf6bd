//! Model routing
//!
//! Resolves which backend model a piece of text is addressed to. Matching is
//! an ordered scan over the configured models and their word lists; the
//! first match wins, with no scoring or longest-match preference:
//!
//! 1. switch command (`<trigger>切换`), which selects and pins the model
//! 2. wake word (prefix or space-preceded anywhere in the text)
//! 3. trigger word (substring anywhere in the text)
//! 4. the user's sticky model, falling back to the configured default

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::{Config, ModelSpec};

/// Suffix marking a model-switch command
pub const SWITCH_SUFFIX: &str = "切换";

/// Outcome of routing one piece of text
#[derive(Debug, Clone)]
pub struct Route {
    pub model: Arc<ModelSpec>,
    /// The text with the matched word stripped; empty for switch commands
    pub query: String,
    pub is_switch: bool,
}

/// Keyword-driven model selector with optional per-user sticky choices
pub struct ModelRouter {
    models: Vec<Arc<ModelSpec>>,
    // Wake word -> model, in registration order. Duplicate words keep their
    // first position but point at the last-registered model.
    wakeup_map: Vec<(String, Arc<ModelSpec>)>,
    default_model: Arc<ModelSpec>,
    remember_user_model: bool,
    sticky: Mutex<HashMap<String, Arc<ModelSpec>>>,
}

impl ModelRouter {
    /// Build the router from the configured model list
    pub fn new(config: &Config) -> Self {
        let models: Vec<Arc<ModelSpec>> =
            config.models.iter().cloned().map(Arc::new).collect();
        let default_model = models
            .iter()
            .find(|m| m.name == config.default_model)
            .cloned()
            .unwrap_or_else(|| models[0].clone());

        let mut wakeup_map: Vec<(String, Arc<ModelSpec>)> = Vec::new();
        for model in &models {
            for word in &model.wakeup_words {
                if let Some(slot) = wakeup_map.iter_mut().find(|(w, _)| w == word) {
                    warn!(
                        wakeup_word = %word,
                        old_model = %slot.1.name,
                        new_model = %model.name,
                        "duplicate wake word, later registration wins"
                    );
                    slot.1 = model.clone();
                } else {
                    wakeup_map.push((word.clone(), model.clone()));
                }
            }
        }

        Self {
            models,
            wakeup_map,
            default_model,
            remember_user_model: config.remember_user_model,
            sticky: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the model a text is addressed to
    pub fn resolve(&self, text: &str, user_id: &str) -> Route {
        let lower = text.to_lowercase();

        if lower.ends_with(SWITCH_SUFFIX) {
            for model in &self.models {
                for trigger in &model.trigger_words {
                    if lower.starts_with(&trigger.to_lowercase()) {
                        info!(user = %user_id, model = %model.name, "model switch");
                        self.set_sticky(user_id, model.clone());
                        return Route {
                            model: model.clone(),
                            query: String::new(),
                            is_switch: true,
                        };
                    }
                }
            }
            // not a recognized switch command; treat as ordinary text
        }

        if let Some((model, query)) = self.wakeup_route(text) {
            return Route {
                model,
                query,
                is_switch: false,
            };
        }

        for model in &self.models {
            for trigger in &model.trigger_words {
                if lower.contains(&trigger.to_lowercase()) {
                    let query = strip_once_ci(text, trigger, None);
                    return Route {
                        model: model.clone(),
                        query,
                        is_switch: false,
                    };
                }
            }
        }

        Route {
            model: self.user_model(user_id),
            query: text.to_string(),
            is_switch: false,
        }
    }

    /// Match a wake word: either a prefix of the text or preceded by a
    /// space. Returns the model and the text with the wake word stripped.
    pub fn wakeup_route(&self, text: &str) -> Option<(Arc<ModelSpec>, String)> {
        let lower = text.to_lowercase();
        for (word, model) in &self.wakeup_map {
            let word_lower = word.to_lowercase();
            let start = if lower.starts_with(&word_lower) {
                Some(0)
            } else {
                lower.find(&format!(" {}", word_lower)).map(|pos| pos + 1)
            };
            if let Some(start) = start {
                let query = strip_once_ci(text, word, Some(start));
                info!(wakeup_word = %word, model = %model.name, "wake word matched");
                return Some((model.clone(), query));
            }
        }
        None
    }

    /// The user's pinned model, or the configured default
    pub fn user_model(&self, user_id: &str) -> Arc<ModelSpec> {
        if self.remember_user_model {
            if let Some(model) = self.sticky.lock().unwrap().get(user_id) {
                return model.clone();
            }
        }
        self.default_model.clone()
    }

    fn set_sticky(&self, user_id: &str, model: Arc<ModelSpec>) {
        if self.remember_user_model {
            self.sticky
                .lock()
                .unwrap()
                .insert(user_id.to_string(), model);
        }
    }

    /// Look up a configured model by name
    pub fn model(&self, name: &str) -> Option<Arc<ModelSpec>> {
        self.models.iter().find(|m| m.name == name).cloned()
    }

    /// The configured default model
    pub fn default_model(&self) -> Arc<ModelSpec> {
        self.default_model.clone()
    }
}

/// Remove one case-insensitive occurrence of `word` from `text` and trim.
/// When `at` is given it is the byte position of the match in the lowercased
/// text; otherwise the first occurrence is removed.
fn strip_once_ci(text: &str, word: &str, at: Option<usize>) -> String {
    let lower_text = text.to_lowercase();
    let lower_word = word.to_lowercase();
    let Some(start) = at.or_else(|| lower_text.find(&lower_word)) else {
        return text.trim().to_string();
    };
    let end = start + lower_word.len();

    // Byte offsets into the lowercased text normally map straight onto the
    // original (ASCII and CJK lowercase 1:1); fall back to the lowercased
    // text when lowercasing shifted the boundaries.
    if lower_text.len() == text.len()
        && text.is_char_boundary(start)
        && end <= text.len()
        && text.is_char_boundary(end)
    {
        let mut out = String::with_capacity(text.len() - (end - start));
        out.push_str(&text[..start]);
        out.push_str(&text[end..]);
        out.trim().to_string()
    } else {
        let mut out = String::new();
        out.push_str(&lower_text[..start]);
        out.push_str(&lower_text[end..]);
        out.trim().to_string()
    }
}
