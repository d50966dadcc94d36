//! Persona ("spirit") synthesis from the four questionnaire answers.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ChatMessage, CompletionService};

/// What each questionnaire answer talks about, in question order.
pub const QUESTION_THEMES: [&str; 4] = [
    "lingering attachment",
    "longing",
    "the mask and the truth behind it",
    "the meaning of existence",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiritProfile {
    pub name: String,
    pub traits: String,
    /// Hidden instruction that seeds the conversation.
    pub system_prompt: String,
    /// First assistant message shown to the user.
    pub opening_line: String,
}

impl SpiritProfile {
    fn normalized(mut self) -> Result<Self> {
        for (field, value) in [
            ("name", &mut self.name),
            ("traits", &mut self.traits),
            ("systemPrompt", &mut self.system_prompt),
            ("openingLine", &mut self.opening_line),
        ] {
            *value = value.trim().to_string();
            if value.is_empty() {
                bail!("spirit field '{field}' is empty");
            }
        }
        Ok(self)
    }
}

pub fn spirit_prompt(answers: &[&str; 4]) -> String {
    let mut prompt = String::from(
        "From the four answers below, create a 'spirit' persona that symbolizes the inner self of the person who wrote them.\n",
    );
    for (i, (theme, answer)) in QUESTION_THEMES.iter().zip(answers).enumerate() {
        prompt.push_str(&format!("{}. {}: {}\n", i + 1, theme, answer.trim()));
    }
    prompt.push_str(
        "\nAnswer with a JSON object with these keys:\n\
         - name: a lyrical, delicate name for the spirit.\n\
         - traits: a short description of its personality.\n\
         - openingLine: a quiet greeting that picks up a feeling or phrase from the answers and reinterprets it from the spirit's point of view.\n\
         - systemPrompt: conversation instructions for the spirit. It remembers the answers, listens and empathizes, sometimes asks questions to keep the conversation going, and lets its personality shift subtly as the user reveals more.\n\
         Write every value in the language the answers are written in.",
    );
    prompt
}

/// Ask the completion service for a persona built from `answers`.
pub async fn generate_spirit(
    llm: &dyn CompletionService,
    answers: [&str; 4],
) -> Result<SpiritProfile> {
    let value = llm
        .complete_json(&[ChatMessage::user(spirit_prompt(&answers))])
        .await?;
    let profile: SpiritProfile =
        serde_json::from_value(value).context("spirit JSON is missing fields")?;
    let profile = profile.normalized()?;
    info!("Generated spirit '{}'", profile.name);
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeltaStream;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedJson(serde_json::Value);

    #[async_trait]
    impl CompletionService for FixedJson {
        async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<DeltaStream> {
            bail!("not used")
        }

        async fn complete_json(&self, messages: &[ChatMessage]) -> Result<serde_json::Value> {
            assert!(messages[0].content.contains("the meaning of existence"));
            Ok(self.0.clone())
        }
    }

    #[test]
    fn prompt_lists_every_answer() {
        let prompt = spirit_prompt(&["a1", "a2", "a3", "a4"]);
        assert!(prompt.contains("1. lingering attachment: a1"));
        assert!(prompt.contains("4. the meaning of existence: a4"));
        assert!(prompt.contains("openingLine"));
    }

    #[tokio::test]
    async fn parses_and_trims_profile() {
        let llm = FixedJson(json!({
            "name": " Breath of Dawn ",
            "traits": "quiet, attentive",
            "systemPrompt": "You are Breath of Dawn.",
            "openingLine": "The loneliness of dawn, you said?"
        }));
        let spirit = generate_spirit(&llm, ["a", "b", "c", "d"]).await.unwrap();
        assert_eq!(spirit.name, "Breath of Dawn");
        assert_eq!(spirit.opening_line, "The loneliness of dawn, you said?");
    }

    #[tokio::test]
    async fn rejects_incomplete_profile() {
        let llm = FixedJson(json!({ "name": "x", "traits": "y", "systemPrompt": "", "openingLine": "z" }));
        assert!(generate_spirit(&llm, ["a", "b", "c", "d"]).await.is_err());

        let llm = FixedJson(json!({ "name": "x" }));
        assert!(generate_spirit(&llm, ["a", "b", "c", "d"]).await.is_err());
    }
}
