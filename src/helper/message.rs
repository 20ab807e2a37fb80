use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::engines::BackendKind;

/// Request document sent to the helper process.
///
/// ```json
/// {
///   "clipboard_text": "Hello",
///   "args": { "engine": "azure", "voice": "en-US-JennyNeural", "rate": 0, "volume": 100,
///             "listvoices": false, "return_audio_bytes": true, ... },
///   "config": { "TTS": { "engine": "azure", "voice_id": "...", "bypass_tts": "False" },
///               "azureTTS": { ... }, "translate": { "no_translate": "True" } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperPipeMessage {
    pub clipboard_text: String,
    pub args: HelperArgs,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Command-line style arguments understood by the helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperArgs {
    pub engine: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub rate: i32,
    #[serde(default = "default_volume")]
    pub volume: u32,
    #[serde(default)]
    pub listvoices: bool,
    #[serde(default)]
    pub return_audio_bytes: bool,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styledegree: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_volume() -> u32 {
    100
}

impl HelperPipeMessage {
    /// A speak request asking for the audio bytes back.
    pub fn speak(text: &str, engine: &str, voice: &str) -> Self {
        let mut config = Map::new();
        config.insert(
            "TTS".to_string(),
            json!({ "engine": engine, "voice_id": voice, "bypass_tts": "False" }),
        );
        config.insert("translate".to_string(), json!({ "no_translate": "True" }));

        Self {
            clipboard_text: text.to_string(),
            args: HelperArgs {
                engine: engine.to_string(),
                voice: voice.to_string(),
                rate: 0,
                volume: default_volume(),
                listvoices: false,
                return_audio_bytes: true,
                preview: false,
                verbose: false,
                style: None,
                styledegree: None,
                text: None,
            },
            config,
        }
    }

    /// A voice listing request. The reply carries a JSON voice list.
    pub fn list_voices(engine: &str) -> Self {
        let mut message = Self::speak("", engine, "");
        message.args.listvoices = true;
        message.args.return_audio_bytes = false;
        if let Some(tts) = message.config.get_mut("TTS") {
            tts["bypass_tts"] = json!("True");
        }
        message
    }

    pub fn with_prosody(mut self, rate: i32, volume: u32) -> Self {
        self.args.rate = rate;
        self.args.volume = volume;
        if let Some(tts) = self.config.get_mut("TTS") {
            tts["rate"] = json!(rate.to_string());
            tts["volume"] = json!(volume.to_string());
        }
        self
    }

    pub fn with_style(mut self, style: Option<String>) -> Self {
        self.args.style = style;
        self
    }

    /// Attach the backend's settings under the section name the helper expects.
    ///
    /// Cloud settings are renamed to the helper's `azureTTS` keys.
    pub fn with_backend_settings(mut self, kind: BackendKind, settings: &Value) -> Self {
        let section = match kind {
            BackendKind::Cloud => (
                "azureTTS",
                json!({
                    "key": settings.get("subscriptionKey").cloned().unwrap_or(Value::Null),
                    "location": settings.get("region").cloned().unwrap_or(Value::Null),
                    "voice": settings.get("voice").cloned().unwrap_or(Value::Null),
                    "style": settings.get("style").cloned().unwrap_or(Value::Null),
                    "role": settings.get("role").cloned().unwrap_or(Value::Null),
                }),
            ),
            BackendKind::LocalNeural => ("sherpaonnx", settings.clone()),
        };
        self.config.insert(section.0.to_string(), section.1);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_message_shape() {
        let message = HelperPipeMessage::speak("Hello", "azure", "en-US-JennyNeural").with_prosody(3, 80);
        let value: Value = serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();

        assert_eq!(value["clipboard_text"], "Hello");
        assert_eq!(value["args"]["engine"], "azure");
        assert_eq!(value["args"]["rate"], 3);
        assert_eq!(value["args"]["volume"], 80);
        assert_eq!(value["args"]["return_audio_bytes"], true);
        assert_eq!(value["config"]["TTS"]["voice_id"], "en-US-JennyNeural");
        assert_eq!(value["config"]["translate"]["no_translate"], "True");
        assert!(value["args"].get("style").is_none());
    }

    #[test]
    fn cloud_settings_use_helper_key_names() {
        let message = HelperPipeMessage::speak("x", "azure", "v").with_backend_settings(
            BackendKind::Cloud,
            &json!({ "subscriptionKey": "k", "region": "uksouth", "voice": "v" }),
        );
        let section = &message.config["azureTTS"];
        assert_eq!(section["key"], "k");
        assert_eq!(section["location"], "uksouth");
        assert_eq!(section["role"], Value::Null);
    }

    #[test]
    fn list_voices_bypasses_synthesis() {
        let message = HelperPipeMessage::list_voices("sherpaonnx");
        assert!(message.args.listvoices);
        assert!(!message.args.return_audio_bytes);
        assert_eq!(message.config["TTS"]["bypass_tts"], "True");
    }
}
