/*
    Structured chat messages and their rendering into the plain-text prompt a model was
    trained on, using the Jinja2 chat templates shipped with Hugging Face tokenizers.
*/

use minijinja::{context, AutoEscape, Environment, ErrorKind};
use serde::Serialize;

use crate::error::VqaError;

/// The author of a chat message.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking.
    User,
    /// The model's response.
    Assistant,
    /// Instructions given to the model.
    System,
}

/// A content block inside a message.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum Line {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// Placeholder marking where the image goes.
    Image,
}

/// A single chat turn.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// The ordered content blocks.
    pub content: Vec<Line>,
}

impl Message {
    /// A user turn made of one image placeholder followed by the question.
    pub fn user_with_image(question: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![
                Line::Image,
                Line::Text {
                    text: question.into(),
                },
            ],
        }
    }
}

/// A compiled chat template.
pub struct ChatTemplate {
    env: Environment<'static>,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

impl ChatTemplate {
    const NAME: &'static str = "chat";

    /// Compile a chat template from its Jinja2 source.
    pub fn new(source: impl Into<String>) -> Result<Self, VqaError> {
        let mut env = Environment::new();

        // plain text prompt, not HTML
        env.set_auto_escape_callback(|_| AutoEscape::None);
        // same whitespace handling transformers applies to chat templates
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_function("raise_exception", |message: String| -> Result<String, minijinja::Error> {
            Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
        });
        env.add_template_owned(Self::NAME, source.into())?;

        Ok(Self {
            env,
            bos_token: None,
            eos_token: None,
        })
    }

    /// Expose the tokenizer's special tokens to the template as `bos_token` and `eos_token`.
    pub fn with_special_tokens(mut self, bos_token: Option<String>, eos_token: Option<String>) -> Self {
        self.bos_token = bos_token;
        self.eos_token = eos_token;
        self
    }

    /// Render the messages into a prompt string without tokenizing it.
    ///
    /// # Arguments
    ///
    /// * `messages` - The conversation to render.
    /// * `add_generation_prompt` - Whether to append the cue that the assistant answers next.
    pub fn render(
        &self,
        messages: &[Message],
        add_generation_prompt: bool,
    ) -> Result<String, VqaError> {
        let template = self.env.get_template(Self::NAME)?;
        let rendered = template.render(context! {
            messages => messages,
            add_generation_prompt => add_generation_prompt,
            bos_token => self.bos_token.as_deref().unwrap_or_default(),
            eos_token => self.eos_token.as_deref().unwrap_or_default(),
        })?;
        Ok(rendered)
    }
}

/// Pick the chat template out of a `tokenizer_config.json` or `chat_template.json` document.
///
/// The template is either a plain string or a list of named templates, in which case
/// the one named `default` is used.
pub fn template_from_config(config: &serde_json::Value) -> Option<String> {
    match &config["chat_template"] {
        serde_json::Value::String(template) => Some(template.clone()),
        serde_json::Value::Array(templates) => templates
            .iter()
            .find(|t| t["name"] == "default")
            .and_then(|t| t["template"].as_str())
            .map(str::to_owned),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDEFICS_TEMPLATE: &str = "<|im_start|>{% for message in messages %}{{message['role'] | capitalize}}{% if message['content'][0]['type'] == 'image' %}{{':'}}{% else %}{{': '}}{% endif %}{% for line in message['content'] %}{% if line['type'] == 'text' %}{{line['text']}}{% elif line['type'] == 'image' %}{{ '<image>' }}{% endif %}{% endfor %}<end_of_utterance>\n{% endfor %}{% if add_generation_prompt %}{{ 'Assistant:' }}{% endif %}";

    #[test]
    fn user_message_layout() {
        let message = Message::user_with_image("What is the title of this book?");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content[0], Line::Image);
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "image"},
                    {"type": "text", "text": "What is the title of this book?"},
                ],
            })
        );
    }

    #[test]
    fn render_with_generation_prompt() -> Result<(), VqaError> {
        let template = ChatTemplate::new(IDEFICS_TEMPLATE)?;
        let messages = [Message::user_with_image("What is the title of this book?")];

        assert_eq!(
            template.render(&messages, true)?,
            "<|im_start|>User:<image>What is the title of this book?<end_of_utterance>\nAssistant:"
        );
        assert_eq!(
            template.render(&messages, false)?,
            "<|im_start|>User:<image>What is the title of this book?<end_of_utterance>\n"
        );
        Ok(())
    }

    #[test]
    fn render_special_tokens() -> Result<(), VqaError> {
        let template = ChatTemplate::new("{{ bos_token }}{{ messages[0]['content'][1]['text'] }}{{ eos_token }}")?
            .with_special_tokens(Some("<bos>".into()), Some("<eos>".into()));
        let rendered = template.render(&[Message::user_with_image("hi")], false)?;
        assert_eq!(rendered, "<bos>hi<eos>");
        Ok(())
    }

    #[test]
    fn raise_exception_fails_rendering() -> Result<(), VqaError> {
        let template = ChatTemplate::new(
            "{% if messages[0]['role'] != 'system' %}{{ raise_exception('system first') }}{% endif %}",
        )?;
        let err = template
            .render(&[Message::user_with_image("hi")], true)
            .unwrap_err();
        assert!(matches!(err, VqaError::JinjaError(_)));
        Ok(())
    }

    #[test]
    fn template_lookup_in_config() {
        let plain = serde_json::json!({"chat_template": "{{ messages }}"});
        assert_eq!(template_from_config(&plain).as_deref(), Some("{{ messages }}"));

        let named = serde_json::json!({"chat_template": [
            {"name": "tool_use", "template": "tools"},
            {"name": "default", "template": "chat"},
        ]});
        assert_eq!(template_from_config(&named).as_deref(), Some("chat"));

        let missing = serde_json::json!({"eos_token": "<eos>"});
        assert_eq!(template_from_config(&missing), None);
    }
}
